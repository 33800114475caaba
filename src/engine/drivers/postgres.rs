// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Driver
//!
//! Implements `EngineConnector` for PostgreSQL using SQLx.
//!
//! ## Transaction Handling
//!
//! Each session holds one dedicated connection. Sessions that are not
//! auto-commit issue `BEGIN` when opened and keep every statement inside that
//! transaction until `commit()` or `abort()`; a new transaction starts right
//! after either so the session stays usable.
//!
//! ## Bulk Transfer
//!
//! Export and load go through `COPY ... TO STDOUT` / `COPY ... FROM STDIN`
//! in CSV or binary format. Row counts for exports are taken from the stream
//! itself.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use polystore_core::{
    ColumnDef, ConnectionDescriptor, DataFormat, DataType, Engine, EngineConnector, EngineError,
    EngineResult, EngineSession, ExportSink, LoadSource, ObjectSchema, SessionOptions,
};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, Postgres};
use sqlx::Row;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::migration::codec::{BinaryRowCounter, CsvRowCounter};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const COPY_CHUNK: usize = 64 * 1024;

/// PostgreSQL connector
#[derive(Debug, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(descriptor: &ConnectionDescriptor) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&descriptor.host)
            .port(descriptor.port)
            .username(&descriptor.user)
            .password(descriptor.password.expose());
        if let Some(database) = &descriptor.database {
            options = options.database(database);
        }
        options
    }
}

fn map_connect_error(err: sqlx::Error) -> EngineError {
    EngineError::connection_failed(err.to_string())
}

fn map_exec_error(err: sqlx::Error) -> EngineError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            EngineError::connection_failed(err.to_string())
        }
        other => EngineError::execution_error(other.to_string()),
    }
}

/// Double-quotes each dot-separated part of an object name.
fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// `(schema, table)` for catalog lookups; unqualified names live in `public`.
fn split_name(name: &str) -> (&str, &str) {
    name.split_once('.').unwrap_or(("public", name))
}

fn copy_options(format: DataFormat) -> &'static str {
    match format {
        DataFormat::Csv => "(FORMAT csv)",
        DataFormat::Binary => "(FORMAT binary)",
    }
}

#[async_trait]
impl EngineConnector for PostgresConnector {
    fn engine(&self) -> Engine {
        Engine::RelationalEngine
    }

    fn name(&self) -> &'static str {
        "postgres-copy"
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        options: SessionOptions,
    ) -> EngineResult<Box<dyn EngineSession>> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .connect_with(Self::connect_options(descriptor))
            .await
            .map_err(map_connect_error)?;
        let conn = pool.acquire().await.map_err(map_connect_error)?;

        let mut session = PostgresSession {
            pool,
            conn: Some(conn),
            options,
        };
        session.begin().await?;
        debug!(db = %descriptor.simple_string(), "Opened PostgreSQL session");
        Ok(Box::new(session))
    }
}

struct PostgresSession {
    pool: PgPool,
    /// Dedicated connection, released on close.
    conn: Option<PoolConnection<Postgres>>,
    options: SessionOptions,
}

impl PostgresSession {
    fn conn(&mut self) -> EngineResult<&mut PoolConnection<Postgres>> {
        self.conn
            .as_mut()
            .ok_or_else(|| EngineError::connection_failed("session is closed"))
    }

    async fn run(&mut self, statement: &str) -> EngineResult<u64> {
        let conn = self.conn()?;
        let result = sqlx::query(statement)
            .execute(&mut **conn)
            .await
            .map_err(map_exec_error)?;
        Ok(result.rows_affected())
    }

    async fn begin(&mut self) -> EngineResult<()> {
        if self.options.auto_commit {
            return Ok(());
        }
        self.run("BEGIN").await.map_err(|e| {
            EngineError::transaction_error(format!("Failed to begin transaction: {}", e))
        })?;
        if self.options.read_only {
            self.run("SET TRANSACTION READ ONLY").await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EngineSession for PostgresSession {
    fn engine(&self) -> Engine {
        Engine::RelationalEngine
    }

    async fn execute(&mut self, statement: &str) -> EngineResult<u64> {
        self.run(statement).await
    }

    async fn create_object_by_name(&mut self, name: &str) -> EngineResult<()> {
        self.run(&format!("CREATE TABLE {} ()", quote_ident(name)))
            .await
            .map(|_| ())
    }

    async fn drop_object_if_exists(&mut self, name: &str) -> EngineResult<()> {
        self.run(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))
            .await
            .map(|_| ())
    }

    async fn object_exists(&mut self, name: &str) -> EngineResult<bool> {
        let (schema, table) = split_name(name);
        let conn = self.conn()?;
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2)",
        )
        .bind(schema)
        .bind(table)
        .fetch_one(&mut **conn)
        .await
        .map_err(map_exec_error)?;
        row.try_get::<bool, _>(0).map_err(map_exec_error)
    }

    async fn ensure_namespace(&mut self, namespace: &str) -> EngineResult<()> {
        self.run(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(namespace)))
            .await
            .map(|_| ())
    }

    async fn describe_object(&mut self, name: &str) -> EngineResult<ObjectSchema> {
        let (schema, table) = split_name(name);
        let conn = self.conn()?;
        let rows = sqlx::query(
            "SELECT column_name::text, data_type::text, \
                    character_maximum_length::int4, numeric_precision::int4, \
                    numeric_scale::int4, is_nullable::text \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut **conn)
        .await
        .map_err(map_exec_error)?;

        if rows.is_empty() {
            return Err(EngineError::object_not_found(name));
        }

        let columns = rows
            .iter()
            .map(|row| {
                let column: String = row.try_get("column_name")?;
                let data_type: String = row.try_get("data_type")?;
                let length: Option<i32> = row.try_get("character_maximum_length")?;
                let precision: Option<i32> = row.try_get("numeric_precision")?;
                let scale: Option<i32> = row.try_get("numeric_scale")?;
                let nullable: String = row.try_get("is_nullable")?;

                let data_type = match DataType::parse(&data_type) {
                    DataType::Varchar { .. } => DataType::Varchar {
                        length: length.and_then(|l| u32::try_from(l).ok()),
                    },
                    DataType::Char { length: default } => DataType::Char {
                        length: length.and_then(|l| u32::try_from(l).ok()).unwrap_or(default),
                    },
                    DataType::Numeric { .. } => DataType::Numeric {
                        precision: precision.and_then(|p| u32::try_from(p).ok()),
                        scale: scale.and_then(|s| u32::try_from(s).ok()),
                    },
                    other => other,
                };
                let def = ColumnDef::new(column, data_type);
                Ok(if nullable == "NO" { def.not_null() } else { def })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(map_exec_error)?;
        Ok(ObjectSchema::new(columns))
    }

    async fn bulk_export(
        &mut self,
        object: &str,
        format: DataFormat,
        sink: ExportSink<'_>,
    ) -> EngineResult<u64> {
        let statement = format!("COPY {} TO STDOUT {}", quote_ident(object), copy_options(format));
        let conn = self.conn()?;
        let mut stream = conn.copy_out_raw(&statement).await.map_err(map_exec_error)?;

        let mut csv_rows = CsvRowCounter::new();
        let mut binary_rows = BinaryRowCounter::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_exec_error)?;
            match format {
                DataFormat::Csv => csv_rows.observe(&chunk),
                DataFormat::Binary => binary_rows.observe(&chunk)?,
            }
            sink.write_all(&chunk).await?;
        }
        sink.flush().await?;

        Ok(match format {
            DataFormat::Csv => csv_rows.finish(),
            DataFormat::Binary => binary_rows.rows(),
        })
    }

    async fn bulk_load(
        &mut self,
        object: &str,
        format: DataFormat,
        source: LoadSource<'_>,
    ) -> EngineResult<u64> {
        let statement = format!(
            "COPY {} FROM STDIN {}",
            quote_ident(object),
            copy_options(format)
        );
        let conn = self.conn()?;
        let mut copy = conn.copy_in_raw(&statement).await.map_err(map_exec_error)?;

        let mut chunk = vec![0u8; COPY_CHUNK];
        loop {
            let n = match source.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) => {
                    if let Err(abort) = copy.abort(e.to_string()).await {
                        warn!(error = %abort, "Failed to abort COPY FROM STDIN");
                    }
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            copy.send(&chunk[..n]).await.map_err(map_exec_error)?;
        }
        copy.finish().await.map_err(map_exec_error)
    }

    async fn commit(&mut self) -> EngineResult<()> {
        if self.options.auto_commit {
            return Ok(());
        }
        self.run("COMMIT").await.map_err(|e| {
            EngineError::transaction_error(format!("Failed to commit transaction: {}", e))
        })?;
        self.begin().await
    }

    async fn abort(&mut self) -> EngineResult<()> {
        if self.options.auto_commit {
            return Ok(());
        }
        self.run("ROLLBACK").await.map_err(|e| {
            EngineError::transaction_error(format!("Failed to rollback transaction: {}", e))
        })?;
        self.begin().await
    }

    async fn close(&mut self) -> EngineResult<()> {
        if let Some(mut conn) = self.conn.take() {
            if !self.options.auto_commit {
                // Pending work is discarded, matching a dropped connection.
                if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!(error = %e, "Failed to roll back on close");
                }
            }
            drop(conn);
        }
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("region"), "\"region\"");
        assert_eq!(quote_ident("staging.region"), "\"staging\".\"region\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("region"), ("public", "region"));
        assert_eq!(split_name("tpch.region"), ("tpch", "region"));
    }

    #[test]
    fn test_copy_options() {
        assert_eq!(copy_options(DataFormat::Csv), "(FORMAT csv)");
        assert_eq!(copy_options(DataFormat::Binary), "(FORMAT binary)");
    }
}
