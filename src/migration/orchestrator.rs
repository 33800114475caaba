// SPDX-License-Identifier: Apache-2.0

//! Migration Orchestrator
//!
//! Moves one object between two database instances:
//!
//! 1. CONNECTING: open the source (read-only) and destination sessions,
//!    both with manual commit.
//! 2. SCHEMA_PREP: ensure the destination namespace, optionally drop an
//!    existing destination object, then create it from the supplied DDL or
//!    from the translated source definition.
//! 3. STREAMING: an export task and a load task run on a two-slot pool,
//!    joined by a bounded pipe.
//! 4. DONE: the source commits, then the destination, and the statistics
//!    are recorded.
//!
//! Any failure aborts the destination, then the source, and the sessions are
//! closed on every path.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use polystore_core::{
    DataFormat, Engine, EngineError, EngineResult, EngineSession, MigrationMonitor,
    MigrationStatistics, SessionOptions,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::ddl;
use super::pipe::{bounded_pipe, PipeReader, PipeWriter};
use super::pool::TaskPool;
use super::types::{
    MigrationCause, MigrationError, MigrationOutcome, MigrationResult, MigrationState,
    MigrationTask,
};
use crate::config::{MigrationConfig, RowCountPolicy};
use crate::engine::ConnectorRegistry;
use crate::islands::CreationStatement;
use crate::metrics;

const EXPORT_TASK: &str = "export";
const LOAD_TASK: &str = "load";

type SharedSession = Arc<Mutex<Box<dyn EngineSession>>>;

#[derive(Default)]
struct Sessions {
    source: Option<SharedSession>,
    destination: Option<SharedSession>,
}

impl Sessions {
    /// Destination first, then source.
    fn in_cleanup_order(&self) -> [(&'static str, Option<&SharedSession>); 2] {
        [
            ("destination", self.destination.as_ref()),
            ("source", self.source.as_ref()),
        ]
    }
}

struct Transfer {
    extracted: u64,
    loaded: u64,
    bytes: u64,
}

pub struct MigrationOrchestrator {
    connectors: Arc<ConnectorRegistry>,
    config: MigrationConfig,
    monitor: Option<Arc<dyn MigrationMonitor>>,
}

impl MigrationOrchestrator {
    pub fn new(connectors: Arc<ConnectorRegistry>, config: MigrationConfig) -> Self {
        Self {
            connectors,
            config,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn MigrationMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Runs one migration to completion. Row-count mismatches are reported in
    /// the result unless the row-count policy rejects them.
    pub async fn migrate(&self, task: &MigrationTask) -> MigrationOutcome {
        let migration_id = Uuid::new_v4();
        let span = info_span!(
            "migration",
            %migration_id,
            source = %task.source.simple_string(),
            source_object = %task.source_object,
            destination = %task.destination.simple_string(),
            destination_object = %task.destination_object,
            format = %task.format,
        );
        self.migrate_with_id(migration_id, task)
            .instrument(span)
            .await
    }

    async fn migrate_with_id(&self, migration_id: Uuid, task: &MigrationTask) -> MigrationOutcome {
        let start_time = Utc::now();
        let started = Instant::now();
        let mut state = MigrationState::Init;
        let mut sessions = Sessions::default();

        let outcome = self.run(task, &mut state, &mut sessions).await;
        if outcome.is_err() {
            abort_sessions(&sessions).await;
        }
        close_sessions(&sessions).await;

        let end_time = Utc::now();
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(transfer) => {
                info!(
                    state = %MigrationState::Done,
                    rows_extracted = transfer.extracted,
                    rows_loaded = transfer.loaded,
                    bytes = transfer.bytes,
                    duration_ms,
                    "Migration finished"
                );
                metrics::record_migration(duration_ms, transfer.extracted, transfer.loaded, true);
                if let Some(monitor) = &self.monitor {
                    monitor.record_migration(MigrationStatistics {
                        migration_id,
                        source: task.source.simple_string(),
                        destination: task.destination.simple_string(),
                        source_object: task.source_object.clone(),
                        destination_object: task.destination_object.clone(),
                        start_time,
                        end_time,
                        rows_extracted: transfer.extracted,
                        rows_loaded: transfer.loaded,
                        bytes_transferred: transfer.bytes,
                        format: task.format,
                        migrator: self.migrator_name(task),
                    });
                }
                Ok(MigrationResult {
                    migration_id,
                    rows_extracted: transfer.extracted,
                    rows_loaded: transfer.loaded,
                    bytes_transferred: transfer.bytes,
                    duration_ms,
                    start_time,
                    end_time,
                })
            }
            Err(cause) => {
                if matches!(cause, MigrationCause::Timeout { .. }) {
                    metrics::record_timeout();
                }
                metrics::record_migration(duration_ms, 0, 0, false);
                error!(
                    failed_in = %state,
                    state = %MigrationState::Failed,
                    error = %cause,
                    duration_ms,
                    "Migration failed"
                );
                Err(MigrationError {
                    migration_id,
                    state,
                    cause,
                })
            }
        }
    }

    async fn run(
        &self,
        task: &MigrationTask,
        state: &mut MigrationState,
        sessions: &mut Sessions,
    ) -> Result<Transfer, MigrationCause> {
        if task.destination.engine == Engine::DataflowEngine {
            return Err(MigrationCause::unsupported_target(format!(
                "{} does not accept migrated data",
                task.destination.simple_string()
            )));
        }

        *state = MigrationState::Connecting;
        let source = shared(
            self.connectors
                .connect(&task.source, SessionOptions::source())
                .await?,
        );
        sessions.source = Some(Arc::clone(&source));
        let destination = shared(
            self.connectors
                .connect(&task.destination, SessionOptions::destination())
                .await?,
        );
        sessions.destination = Some(Arc::clone(&destination));

        *state = MigrationState::SchemaPrep;
        self.prepare_destination(task, &source, &destination).await?;

        *state = MigrationState::Streaming;
        let transfer = self.stream(task, &source, &destination).await?;
        check_row_counts(self.config.row_count_policy, &transfer)?;

        // The destination publishes last.
        source.lock().await.commit().await?;
        destination.lock().await.commit().await?;
        Ok(transfer)
    }

    async fn prepare_destination(
        &self,
        task: &MigrationTask,
        source: &SharedSession,
        destination: &SharedSession,
    ) -> Result<(), MigrationCause> {
        let object = task.destination_object.as_str();
        let mut dest = destination.lock().await;

        if let Some((namespace, _)) = object.split_once('.') {
            dest.ensure_namespace(namespace).await?;
        }
        if self.config.drop_existing_destination {
            dest.drop_object_if_exists(object).await?;
        } else if dest.object_exists(object).await? {
            debug!(object, "Loading into existing destination object");
            return Ok(());
        }

        let statement = match &task.ddl {
            Some(ddl) => CreationStatement::Immediate(ddl.clone()),
            None => {
                let schema = source
                    .lock()
                    .await
                    .describe_object(&task.source_object)
                    .await?;
                ddl::creation_statement(task.destination.engine, object, &schema)?
            }
        };
        match statement {
            CreationStatement::Immediate(sql) => {
                debug!(statement = %sql, "Creating destination object");
                dest.execute(&sql).await?;
            }
            CreationStatement::Deferred { name } => {
                debug!(object = %name, "Creating destination object by name");
                dest.create_object_by_name(&name).await?;
            }
        }
        Ok(())
    }

    async fn stream(
        &self,
        task: &MigrationTask,
        source: &SharedSession,
        destination: &SharedSession,
    ) -> Result<Transfer, MigrationCause> {
        let (writer, reader) = bounded_pipe(self.config.pipe_capacity_bytes);
        let bytes = writer.byte_counter();

        let mut pool: TaskPool<EngineResult<u64>> = TaskPool::new(2);
        pool.spawn(
            EXPORT_TASK,
            export_into(Arc::clone(source), task.source_object.clone(), task.format, writer),
        );
        pool.spawn(
            LOAD_TASK,
            load_from(
                Arc::clone(destination),
                task.destination_object.clone(),
                task.format,
                reader,
            ),
        );

        let joint = async {
            let mut extracted = 0;
            let mut loaded = 0;
            while let Some((name, joined)) = pool.join_next().await {
                let output = joined.map_err(|err| {
                    if err.is_panic() {
                        MigrationCause::TaskPanicked { task: name }
                    } else {
                        MigrationCause::Engine(EngineError::Cancelled)
                    }
                })?;
                let Some(rows) = output else {
                    continue;
                };
                let rows = rows?;
                debug!(task = name, rows, "Transfer task finished");
                if name == EXPORT_TASK {
                    extracted = rows;
                } else {
                    loaded = rows;
                }
            }
            Ok::<_, MigrationCause>((extracted, loaded))
        };

        let joined = match self.config.timeout_ms {
            Some(timeout_ms) => {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), joint).await {
                    Ok(joined) => joined,
                    Err(_) => Err(MigrationCause::Timeout { timeout_ms }),
                }
            }
            None => joint.await,
        };
        pool.shutdown().await;

        let (extracted, loaded) = joined?;
        Ok(Transfer {
            extracted,
            loaded,
            bytes: bytes.load(Ordering::Relaxed),
        })
    }

    fn migrator_name(&self, task: &MigrationTask) -> String {
        let name = |engine: Engine| {
            self.connectors
                .get(engine)
                .map(|c| c.name())
                .unwrap_or("unknown")
        };
        format!(
            "{}->{}",
            name(task.source.engine),
            name(task.destination.engine)
        )
    }
}

fn shared(session: Box<dyn EngineSession>) -> SharedSession {
    Arc::new(Mutex::new(session))
}

async fn export_into(
    session: SharedSession,
    object: String,
    format: DataFormat,
    mut writer: PipeWriter,
) -> EngineResult<u64> {
    let mut session = session.lock().await;
    let exported = session.bulk_export(&object, format, &mut writer).await;
    // Ends the load task's input on success and failure alike.
    let closed = writer.shutdown().await;
    let rows = exported?;
    closed?;
    Ok(rows)
}

async fn load_from(
    session: SharedSession,
    object: String,
    format: DataFormat,
    mut reader: PipeReader,
) -> EngineResult<u64> {
    let mut session = session.lock().await;
    session.bulk_load(&object, format, &mut reader).await
}

fn check_row_counts(policy: RowCountPolicy, transfer: &Transfer) -> Result<(), MigrationCause> {
    let missing = transfer.extracted.saturating_sub(transfer.loaded);
    if missing == 0 {
        return Ok(());
    }
    match policy {
        RowCountPolicy::Ignore => Ok(()),
        RowCountPolicy::Warn => {
            warn!(
                rows_extracted = transfer.extracted,
                rows_loaded = transfer.loaded,
                "Destination accepted fewer rows than were extracted"
            );
            Ok(())
        }
        RowCountPolicy::Fail { max_missing } if missing > max_missing => {
            Err(MigrationCause::RowCountRejected {
                extracted: transfer.extracted,
                loaded: transfer.loaded,
                max_missing,
            })
        }
        RowCountPolicy::Fail { .. } => Ok(()),
    }
}

async fn abort_sessions(sessions: &Sessions) {
    for (side, session) in sessions.in_cleanup_order() {
        let Some(session) = session else {
            continue;
        };
        if let Err(e) = session.lock().await.abort().await {
            warn!(side, error = %e, "Failed to abort session");
        }
    }
}

async fn close_sessions(sessions: &Sessions) {
    for (side, session) in sessions.in_cleanup_order() {
        let Some(session) = session else {
            continue;
        };
        if let Err(e) = session.lock().await.close().await {
            warn!(side, error = %e, "Failed to close session");
        }
    }
}
