// SPDX-License-Identifier: Apache-2.0

//! End-to-end migrations against the in-memory engine.

use std::sync::Arc;

use polystore_core::{
    ColumnDef, ConnectionDescriptor, DataFormat, DataType, DbId, Engine, ObjectSchema,
};
use polystore_lib::config::{MigrationConfig, RowCountPolicy};
use polystore_lib::engine::drivers::{MemoryConnector, SessionEvent};
use polystore_lib::engine::ConnectorRegistry;
use polystore_lib::migration::{
    MigrationCause, MigrationOrchestrator, MigrationState, MigrationStatsStore, MigrationTask,
};

const SOURCE: DbId = DbId(0);
const DESTINATION: DbId = DbId(5);

fn descriptor(dbid: DbId, engine: Engine) -> ConnectionDescriptor {
    ConnectionDescriptor {
        dbid,
        engine,
        host: "memory".to_string(),
        port: 0,
        database: Some("tpch".to_string()),
        user: "polystore".to_string(),
        password: String::from("secret").into(),
        bin_path: None,
    }
}

fn region_schema() -> ObjectSchema {
    ObjectSchema::new(vec![
        ColumnDef::new("r_regionkey", DataType::Integer).not_null(),
        ColumnDef::new("r_name", DataType::Varchar { length: Some(25) }),
        ColumnDef::new("r_comment", DataType::Text),
    ])
}

fn region_rows() -> Vec<Vec<Option<String>>> {
    [
        ("0", "AFRICA", Some("lar deposits")),
        ("1", "AMERICA", Some("hs use ironic, even requests. s")),
        ("2", "ASIA", None),
        ("3", "EUROPE", Some("ly final courts \"cajole\" furiously")),
        ("4", "MIDDLE EAST", Some("uickly special accounts\ncajole")),
    ]
    .into_iter()
    .map(|(key, name, comment)| {
        vec![
            Some(key.to_string()),
            Some(name.to_string()),
            comment.map(str::to_string),
        ]
    })
    .collect()
}

struct Fixture {
    relational: MemoryConnector,
    connectors: Arc<ConnectorRegistry>,
}

fn fixture() -> Fixture {
    let relational = MemoryConnector::new(Engine::RelationalEngine);
    relational
        .create_table(SOURCE, "region", region_schema(), None)
        .unwrap();
    relational
        .insert_rows(SOURCE, "region", region_rows())
        .unwrap();

    let mut connectors = ConnectorRegistry::new();
    connectors.register(Arc::new(relational.clone()));
    Fixture {
        relational,
        connectors: Arc::new(connectors),
    }
}

fn region_task(destination_object: &str) -> MigrationTask {
    MigrationTask::new(
        descriptor(SOURCE, Engine::RelationalEngine),
        "region",
        descriptor(DESTINATION, Engine::RelationalEngine),
        destination_object,
    )
}

#[tokio::test]
async fn test_five_rows_reach_an_empty_destination() {
    let fixture = fixture();
    let orchestrator =
        MigrationOrchestrator::new(fixture.connectors.clone(), MigrationConfig::default());

    let result = orchestrator.migrate(&region_task("region")).await.unwrap();

    assert_eq!(result.rows_extracted, 5);
    assert_eq!(result.rows_loaded, 5);
    assert!(result.is_complete());
    assert!(result.bytes_transferred > 0);
    assert!(result.end_time >= result.start_time);

    assert_eq!(
        fixture.relational.schema(DESTINATION, "region"),
        Some(region_schema())
    );
    assert_eq!(
        fixture.relational.rows(DESTINATION, "region"),
        Some(region_rows())
    );
    // Source untouched.
    assert_eq!(fixture.relational.rows(SOURCE, "region"), Some(region_rows()));
    assert_eq!(fixture.relational.probe().open_sessions(), 0);

    // The read-only source commits before the destination publishes.
    let events = fixture.relational.probe().events();
    let committed_at = |dbid: DbId| {
        events
            .iter()
            .position(|(_, d, e)| *d == dbid && *e == SessionEvent::Committed)
            .unwrap()
    };
    assert!(committed_at(SOURCE) < committed_at(DESTINATION));
}

#[tokio::test]
async fn test_constraint_filtered_rows_are_a_partial_load() {
    let fixture = fixture();
    fixture
        .relational
        .create_table(DESTINATION, "region", region_schema(), Some("r_regionkey"))
        .unwrap();
    fixture
        .relational
        .insert_rows(
            DESTINATION,
            "region",
            vec![
                vec![Some("1".into()), Some("AMERICA".into()), None],
                vec![Some("3".into()), Some("EUROPE".into()), None],
            ],
        )
        .unwrap();

    let config = MigrationConfig {
        drop_existing_destination: false,
        ..MigrationConfig::default()
    };
    let orchestrator = MigrationOrchestrator::new(fixture.connectors.clone(), config);

    let result = orchestrator.migrate(&region_task("region")).await.unwrap();

    assert_eq!(result.rows_extracted, 5);
    assert_eq!(result.rows_loaded, 3);
    assert_eq!(result.rows_missing(), 2);
    assert_eq!(
        fixture.relational.rows(DESTINATION, "region").map(|r| r.len()),
        Some(5)
    );
}

#[tokio::test]
async fn test_row_count_policy_can_reject_partial_loads() {
    let fixture = fixture();
    fixture
        .relational
        .create_table(DESTINATION, "region", region_schema(), Some("r_regionkey"))
        .unwrap();
    fixture
        .relational
        .insert_rows(
            DESTINATION,
            "region",
            vec![vec![Some("2".into()), Some("ASIA".into()), None]],
        )
        .unwrap();

    let config = MigrationConfig {
        drop_existing_destination: false,
        row_count_policy: RowCountPolicy::Fail { max_missing: 0 },
        ..MigrationConfig::default()
    };
    let orchestrator = MigrationOrchestrator::new(fixture.connectors.clone(), config);

    let err = orchestrator.migrate(&region_task("region")).await.unwrap_err();

    assert_eq!(err.state, MigrationState::Streaming);
    assert!(matches!(
        err.cause,
        MigrationCause::RowCountRejected {
            extracted: 5,
            loaded: 4,
            max_missing: 0
        }
    ));
    // The rejected load was rolled back.
    assert_eq!(
        fixture.relational.rows(DESTINATION, "region").map(|r| r.len()),
        Some(1)
    );
}

#[tokio::test]
async fn test_severed_export_fails_and_releases_both_sessions() {
    let fixture = fixture();
    fixture.relational.fail_export_after(2);
    let orchestrator =
        MigrationOrchestrator::new(fixture.connectors.clone(), MigrationConfig::default());

    let err = orchestrator
        .migrate(&region_task("region_copy"))
        .await
        .unwrap_err();

    assert_eq!(err.state, MigrationState::Streaming);
    assert!(matches!(err.cause, MigrationCause::Engine(_)));
    assert!(!err.is_timeout());

    let probe = fixture.relational.probe();
    assert_eq!(probe.count(SOURCE, SessionEvent::Aborted), 1);
    assert_eq!(probe.count(DESTINATION, SessionEvent::Aborted), 1);
    assert_eq!(probe.count(SOURCE, SessionEvent::Closed), 1);
    assert_eq!(probe.count(DESTINATION, SessionEvent::Closed), 1);
    assert_eq!(probe.count(DESTINATION, SessionEvent::Committed), 0);
    assert_eq!(probe.open_sessions(), 0);

    // Destination aborted before the source.
    let events = probe.events();
    let aborted_at = |dbid: DbId| {
        events
            .iter()
            .position(|(_, d, e)| *d == dbid && *e == SessionEvent::Aborted)
            .unwrap()
    };
    assert!(aborted_at(DESTINATION) < aborted_at(SOURCE));

    // Nothing from the failed attempt was published.
    assert!(!fixture
        .relational
        .objects(DESTINATION)
        .contains(&"region_copy".to_string()));
}

#[tokio::test]
async fn test_timeout_interrupts_both_tasks_and_aborts() {
    let fixture = fixture();
    fixture.relational.stall_loads();
    let config = MigrationConfig {
        timeout_ms: Some(200),
        ..MigrationConfig::default()
    };
    let orchestrator = MigrationOrchestrator::new(fixture.connectors.clone(), config);

    let err = orchestrator
        .migrate(&region_task("region_copy"))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.state, MigrationState::Streaming);
    assert!(matches!(err.cause, MigrationCause::Timeout { timeout_ms: 200 }));

    let probe = fixture.relational.probe();
    assert_eq!(probe.count(DESTINATION, SessionEvent::Aborted), 1);
    assert_eq!(probe.count(DESTINATION, SessionEvent::Committed), 0);
    assert_eq!(probe.count(SOURCE, SessionEvent::Closed), 1);
    assert_eq!(probe.count(DESTINATION, SessionEvent::Closed), 1);
    assert_eq!(probe.open_sessions(), 0);
    assert!(!fixture
        .relational
        .objects(DESTINATION)
        .contains(&"region_copy".to_string()));
}

#[tokio::test]
async fn test_aborted_migration_discards_new_namespace() {
    let fixture = fixture();
    fixture.relational.fail_export_after(1);
    let orchestrator =
        MigrationOrchestrator::new(fixture.connectors.clone(), MigrationConfig::default());

    assert!(orchestrator
        .migrate(&region_task("staging.region"))
        .await
        .is_err());
    assert!(fixture.relational.namespaces(DESTINATION).is_empty());
}

#[tokio::test]
async fn test_binary_format_keeps_nulls_apart_from_empty_strings() {
    let fixture = fixture();
    fixture
        .relational
        .insert_rows(
            SOURCE,
            "region",
            vec![vec![Some("5".into()), Some(String::new()), None]],
        )
        .unwrap();
    let orchestrator =
        MigrationOrchestrator::new(fixture.connectors.clone(), MigrationConfig::default());

    let task = region_task("region_bin").with_format(DataFormat::Binary);
    let result = orchestrator.migrate(&task).await.unwrap();

    assert_eq!(result.rows_extracted, 6);
    assert_eq!(result.rows_loaded, 6);
    let rows = fixture.relational.rows(DESTINATION, "region_bin").unwrap();
    assert_eq!(rows[5], vec![Some("5".to_string()), Some(String::new()), None]);
    assert_eq!(rows[..5], region_rows()[..]);
}

#[tokio::test]
async fn test_small_pipe_applies_backpressure_without_losing_rows() {
    let fixture = fixture();
    let many: Vec<Vec<Option<String>>> = (5..2005)
        .map(|key| {
            vec![
                Some(key.to_string()),
                Some(format!("REGION {}", key)),
                Some("x".repeat(40)),
            ]
        })
        .collect();
    fixture
        .relational
        .insert_rows(SOURCE, "region", many)
        .unwrap();

    let config = MigrationConfig {
        pipe_capacity_bytes: 64,
        ..MigrationConfig::default()
    };
    let orchestrator = MigrationOrchestrator::new(fixture.connectors.clone(), config);

    let result = orchestrator.migrate(&region_task("region")).await.unwrap();
    assert_eq!(result.rows_extracted, 2005);
    assert_eq!(result.rows_loaded, 2005);
}

#[tokio::test]
async fn test_explicit_ddl_and_namespace() {
    let fixture = fixture();
    let orchestrator =
        MigrationOrchestrator::new(fixture.connectors.clone(), MigrationConfig::default());

    let task = region_task("staging.region").with_ddl(
        "CREATE TABLE staging.region (r_regionkey bigint, r_name text, r_comment text)",
    );
    let result = orchestrator.migrate(&task).await.unwrap();

    assert_eq!(result.rows_loaded, 5);
    let schema = fixture
        .relational
        .schema(DESTINATION, "staging.region")
        .unwrap();
    assert_eq!(schema.columns[0].data_type, DataType::BigInt);
    assert!(schema.columns[0].nullable);
}

#[tokio::test]
async fn test_relational_to_array_translates_definition() {
    let fixture = fixture();
    let array = MemoryConnector::new(Engine::ArrayEngine);
    let mut connectors = ConnectorRegistry::new();
    connectors.register(Arc::new(fixture.relational.clone()));
    connectors.register(Arc::new(array.clone()));
    let orchestrator =
        MigrationOrchestrator::new(Arc::new(connectors), MigrationConfig::default());

    let task = MigrationTask::new(
        descriptor(SOURCE, Engine::RelationalEngine),
        "region",
        descriptor(DbId(1), Engine::ArrayEngine),
        "region_array",
    );
    let result = orchestrator.migrate(&task).await.unwrap();

    assert_eq!(result.rows_loaded, 5);
    let schema = array.schema(DbId(1), "region_array").unwrap();
    assert_eq!(schema.len(), 3);
    assert_eq!(schema.columns[0].data_type, DataType::Integer);
    assert!(!schema.columns[0].nullable);
    assert_eq!(schema.columns[1].data_type, DataType::Text);
}

#[tokio::test]
async fn test_dataflow_destination_is_rejected_before_connecting() {
    let fixture = fixture();
    let orchestrator =
        MigrationOrchestrator::new(fixture.connectors.clone(), MigrationConfig::default());

    let task = MigrationTask::new(
        descriptor(SOURCE, Engine::RelationalEngine),
        "region",
        descriptor(DbId(9), Engine::DataflowEngine),
        "region",
    );
    let err = orchestrator.migrate(&task).await.unwrap_err();

    assert_eq!(err.state, MigrationState::Init);
    assert!(matches!(err.cause, MigrationCause::UnsupportedTarget { .. }));
    assert!(fixture.relational.probe().events().is_empty());
}

#[tokio::test]
async fn test_monitor_receives_statistics_for_successful_migrations() {
    let fixture = fixture();
    let stats = Arc::new(MigrationStatsStore::default());
    let orchestrator =
        MigrationOrchestrator::new(fixture.connectors.clone(), MigrationConfig::default())
            .with_monitor(stats.clone());

    let result = orchestrator.migrate(&region_task("region")).await.unwrap();

    let recorded = stats.recent(10);
    assert_eq!(recorded.len(), 1);
    let record = &recorded[0];
    assert_eq!(record.migration_id, result.migration_id);
    assert_eq!(record.rows_extracted, 5);
    assert_eq!(record.rows_loaded, 5);
    assert_eq!(record.source_object, "region");
    assert_eq!(record.format, DataFormat::Csv);
    assert_eq!(record.migrator, "memory->memory");

    fixture.relational.fail_export_after(0);
    assert!(orchestrator.migrate(&region_task("region")).await.is_err());
    assert_eq!(stats.len(), 1);
}
