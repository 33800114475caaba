// SPDX-License-Identifier: Apache-2.0

//! Renders a source object definition in the destination engine's dialect.

use polystore_core::{Engine, ObjectSchema};

use super::types::MigrationCause;
use crate::islands::CreationStatement;

/// Dimension used for arrays created from flat (relational) data.
const DEFAULT_DIMENSION: &str = "[i=0:*,1000000,0]";

pub fn creation_statement(
    engine: Engine,
    name: &str,
    schema: &ObjectSchema,
) -> Result<CreationStatement, MigrationCause> {
    match engine {
        Engine::RelationalEngine | Engine::StreamEngine => {
            let columns: Vec<String> = schema
                .columns
                .iter()
                .map(|c| {
                    let mut column = format!("{} {}", c.name, c.data_type.sql_name());
                    if !c.nullable {
                        column.push_str(" NOT NULL");
                    }
                    column
                })
                .collect();
            Ok(CreationStatement::Immediate(format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                name,
                columns.join(", ")
            )))
        }
        Engine::ArrayEngine => {
            if schema.is_empty() {
                return Err(MigrationCause::unsupported_target(format!(
                    "array {} needs at least one attribute",
                    name
                )));
            }
            let attributes: Vec<String> = schema
                .columns
                .iter()
                .map(|c| {
                    let mut attribute = format!("{}:{}", c.name, c.data_type.array_name());
                    if !c.nullable {
                        attribute.push_str(" NOT NULL");
                    }
                    attribute
                })
                .collect();
            Ok(CreationStatement::Immediate(format!(
                "CREATE ARRAY {} <{}> {}",
                name,
                attributes.join(", "),
                DEFAULT_DIMENSION
            )))
        }
        Engine::WideColumnEngine => Ok(CreationStatement::Deferred {
            name: name.to_string(),
        }),
        Engine::DataflowEngine => Err(MigrationCause::unsupported_target(
            "dataflow engines do not accept migrated data",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::{ColumnDef, DataType};

    fn region() -> ObjectSchema {
        ObjectSchema::new(vec![
            ColumnDef::new("r_regionkey", DataType::Integer).not_null(),
            ColumnDef::new("r_name", DataType::Varchar { length: Some(25) }),
        ])
    }

    #[test]
    fn test_relational_statement() {
        let statement = creation_statement(Engine::RelationalEngine, "tpch.region", &region()).unwrap();
        assert_eq!(
            statement,
            CreationStatement::Immediate(
                "CREATE TABLE IF NOT EXISTS tpch.region (r_regionkey integer NOT NULL, r_name varchar(25))"
                    .into()
            )
        );
    }

    #[test]
    fn test_array_statement() {
        let statement = creation_statement(Engine::ArrayEngine, "region", &region()).unwrap();
        assert_eq!(
            statement,
            CreationStatement::Immediate(
                "CREATE ARRAY region <r_regionkey:int32 NOT NULL, r_name:string> [i=0:*,1000000,0]"
                    .into()
            )
        );
        assert!(creation_statement(Engine::ArrayEngine, "empty", &ObjectSchema::default()).is_err());
    }

    #[test]
    fn test_other_engines() {
        assert_eq!(
            creation_statement(Engine::WideColumnEngine, "t", &region()).unwrap(),
            CreationStatement::Deferred { name: "t".into() }
        );
        assert!(matches!(
            creation_statement(Engine::DataflowEngine, "t", &region()),
            Err(MigrationCause::UnsupportedTarget { .. })
        ));
    }
}
