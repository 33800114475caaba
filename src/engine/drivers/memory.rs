// SPDX-License-Identifier: Apache-2.0

//! In-memory engine
//!
//! A transactional, process-local engine that understands just enough DDL
//! (`CREATE TABLE`, `CREATE ARRAY`, `DROP TABLE|ARRAY`) to act as any engine
//! family. Used for embedding, demos, and tests.
//!
//! ## Transactions
//!
//! Each session keeps an overlay of changed objects. Sessions opened with
//! auto-commit apply every change immediately; the others publish the overlay
//! on `commit` and discard it on `abort` or `close`.
//!
//! ## Data
//!
//! Values are stored as text. In CSV transfers an empty field is NULL; the
//! binary format keeps NULL and empty strings apart.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use polystore_core::{
    ColumnDef, ConnectionDescriptor, DataFormat, DataType, DbId, Engine, EngineConnector,
    EngineError, EngineResult, EngineSession, ExportSink, LoadSource, ObjectSchema,
    SessionOptions,
};
use regex::Regex;
use sqlparser::ast::{ColumnOption, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::migration::codec::{self, BinaryRowReader, CsvRecordSplitter, Decoded};

type Row = Vec<Option<String>>;

const DEFAULT_NAMESPACE: &str = "public";
const READ_CHUNK: usize = 8 * 1024;

static CREATE_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*create\s+array\s+([_@0-9a-zA-Z.]+)\s*<([^>]*)>")
        .expect("create array pattern")
});
static DROP_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*drop\s+(?:table|array)\s+(if\s+exists\s+)?([_@0-9a-zA-Z.]+)\s*;?\s*$")
        .expect("drop pattern")
});

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    schema: ObjectSchema,
    unique: Option<usize>,
    rows: Vec<Row>,
}

impl MemoryTable {
    fn conflicts(&self, row: &Row) -> bool {
        match self.unique {
            Some(idx) => match row.get(idx).and_then(Option::as_ref) {
                Some(value) => self
                    .rows
                    .iter()
                    .any(|r| r.get(idx).and_then(Option::as_ref) == Some(value)),
                None => false,
            },
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct Database {
    tables: BTreeMap<String, MemoryTable>,
    namespaces: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Faults {
    export_fails_after: Option<u64>,
    failing_objects: HashSet<String>,
    undroppable_objects: HashSet<String>,
    stall_loads: bool,
}

/// Lifecycle event observed on a memory session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    Committed,
    Aborted,
    Closed,
}

/// Records session lifecycle events for inspection.
#[derive(Debug, Default)]
pub struct ConnectionProbe {
    events: Mutex<Vec<(usize, DbId, SessionEvent)>>,
}

impl ConnectionProbe {
    fn record(&self, session: usize, dbid: DbId, event: SessionEvent) {
        self.events.lock().push((session, dbid, event));
    }

    pub fn events(&self) -> Vec<(usize, DbId, SessionEvent)> {
        self.events.lock().clone()
    }

    pub fn count(&self, dbid: DbId, event: SessionEvent) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(_, d, e)| *d == dbid && *e == event)
            .count()
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        let events = self.events.lock();
        let opened = events.iter().filter(|(_, _, e)| *e == SessionEvent::Opened).count();
        let closed = events.iter().filter(|(_, _, e)| *e == SessionEvent::Closed).count();
        opened.saturating_sub(closed)
    }
}

#[derive(Default)]
struct Shared {
    databases: Mutex<HashMap<DbId, Database>>,
    faults: Mutex<Faults>,
    probe: ConnectionProbe,
    next_session: AtomicUsize,
}

/// Connector for one engine family backed by process memory.
#[derive(Clone)]
pub struct MemoryConnector {
    engine: Engine,
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Creates (or replaces) a committed table. `unique` names a column whose
    /// values must be distinct; conflicting loaded rows are skipped.
    pub fn create_table(
        &self,
        dbid: DbId,
        name: &str,
        schema: ObjectSchema,
        unique: Option<&str>,
    ) -> EngineResult<()> {
        let unique = match unique {
            Some(column) => Some(
                schema
                    .columns
                    .iter()
                    .position(|c| c.name == column)
                    .ok_or_else(|| EngineError::object_not_found(column))?,
            ),
            None => None,
        };
        let mut databases = self.shared.databases.lock();
        databases.entry(dbid).or_default().tables.insert(
            name.to_string(),
            MemoryTable {
                schema,
                unique,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn insert_rows(&self, dbid: DbId, name: &str, rows: Vec<Row>) -> EngineResult<()> {
        let mut databases = self.shared.databases.lock();
        let table = databases
            .get_mut(&dbid)
            .and_then(|db| db.tables.get_mut(name))
            .ok_or_else(|| EngineError::object_not_found(name))?;
        for row in rows {
            if row.len() != table.schema.len() {
                return Err(EngineError::execution_error(format!(
                    "row has {} values, {} expects {}",
                    row.len(),
                    name,
                    table.schema.len()
                )));
            }
            table.rows.push(row);
        }
        Ok(())
    }

    /// Committed rows of `name`.
    pub fn rows(&self, dbid: DbId, name: &str) -> Option<Vec<Row>> {
        let databases = self.shared.databases.lock();
        databases
            .get(&dbid)
            .and_then(|db| db.tables.get(name))
            .map(|t| t.rows.clone())
    }

    /// Committed object names.
    pub fn objects(&self, dbid: DbId) -> Vec<String> {
        let databases = self.shared.databases.lock();
        databases
            .get(&dbid)
            .map(|db| db.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn schema(&self, dbid: DbId, name: &str) -> Option<ObjectSchema> {
        let databases = self.shared.databases.lock();
        databases
            .get(&dbid)
            .and_then(|db| db.tables.get(name))
            .map(|t| t.schema.clone())
    }

    pub fn probe(&self) -> &ConnectionProbe {
        &self.shared.probe
    }

    /// Makes every export fail with a severed connection after `rows` rows.
    pub fn fail_export_after(&self, rows: u64) {
        self.shared.faults.lock().export_fails_after = Some(rows);
    }

    /// Makes creating `name` fail.
    pub fn fail_creation_of(&self, name: &str) {
        self.shared
            .faults
            .lock()
            .failing_objects
            .insert(name.to_string());
    }

    /// Makes dropping `name` fail.
    pub fn fail_drop_of(&self, name: &str) {
        self.shared
            .faults
            .lock()
            .undroppable_objects
            .insert(name.to_string());
    }

    /// Makes every bulk load wait forever without reading its input.
    pub fn stall_loads(&self) {
        self.shared.faults.lock().stall_loads = true;
    }

    /// Committed namespaces, `public` excluded.
    pub fn namespaces(&self, dbid: DbId) -> Vec<String> {
        let databases = self.shared.databases.lock();
        databases
            .get(&dbid)
            .map(|db| db.namespaces.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EngineConnector for MemoryConnector {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        options: SessionOptions,
    ) -> EngineResult<Box<dyn EngineSession>> {
        if descriptor.engine != self.engine {
            return Err(EngineError::not_supported(format!(
                "memory connector for {} cannot open {}",
                self.engine,
                descriptor.simple_string()
            )));
        }
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        self.shared
            .databases
            .lock()
            .entry(descriptor.dbid)
            .or_default();
        self.shared
            .probe
            .record(id, descriptor.dbid, SessionEvent::Opened);
        debug!(session = id, db = %descriptor.simple_string(), "Opened memory session");

        Ok(Box::new(MemorySession {
            id,
            dbid: descriptor.dbid,
            engine: self.engine,
            options,
            shared: Arc::clone(&self.shared),
            overlay: BTreeMap::new(),
            pending_namespaces: BTreeSet::new(),
            closed: false,
        }))
    }
}

struct MemorySession {
    id: usize,
    dbid: DbId,
    engine: Engine,
    options: SessionOptions,
    shared: Arc<Shared>,
    /// Pending changes; `None` marks a pending drop.
    overlay: BTreeMap<String, Option<MemoryTable>>,
    pending_namespaces: BTreeSet<String>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed {
            Err(EngineError::connection_failed("session is closed"))
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        self.ensure_open()?;
        if self.options.read_only {
            return Err(EngineError::execution_error("session is read-only"));
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<MemoryTable> {
        if let Some(pending) = self.overlay.get(name) {
            return pending.clone();
        }
        let databases = self.shared.databases.lock();
        databases
            .get(&self.dbid)
            .and_then(|db| db.tables.get(name))
            .cloned()
    }

    fn stage(&mut self, name: &str, table: Option<MemoryTable>) {
        if self.options.auto_commit {
            let mut databases = self.shared.databases.lock();
            let db = databases.entry(self.dbid).or_default();
            match table {
                Some(table) => db.tables.insert(name.to_string(), table),
                None => db.tables.remove(name),
            };
        } else {
            self.overlay.insert(name.to_string(), table);
        }
    }

    fn create(&mut self, name: &str, table: MemoryTable, if_not_exists: bool) -> EngineResult<()> {
        self.ensure_writable()?;
        if self.shared.faults.lock().failing_objects.contains(name) {
            return Err(EngineError::execution_error(format!(
                "could not create {}",
                name
            )));
        }
        if self.lookup(name).is_some() {
            return if if_not_exists {
                Ok(())
            } else {
                Err(EngineError::object_exists(name))
            };
        }
        if let Some((namespace, _)) = name.split_once('.') {
            let databases = self.shared.databases.lock();
            let known = namespace == DEFAULT_NAMESPACE
                || self.pending_namespaces.contains(namespace)
                || databases
                    .get(&self.dbid)
                    .is_some_and(|db| db.namespaces.contains(namespace));
            if !known {
                return Err(EngineError::execution_error(format!(
                    "schema \"{}\" does not exist",
                    namespace
                )));
            }
        }
        self.stage(name, Some(table));
        Ok(())
    }

    fn create_table(&mut self, statement: &str) -> EngineResult<()> {
        let parsed = Parser::parse_sql(&PostgreSqlDialect {}, statement)
            .map_err(|e| EngineError::execution_error(e.to_string()))?;
        let Some(Statement::CreateTable(create)) = parsed.into_iter().next() else {
            return Err(EngineError::execution_error(format!(
                "unsupported statement: {}",
                statement
            )));
        };

        let mut unique = None;
        let columns = create
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let mut def = ColumnDef::new(
                    column.name.value.clone(),
                    DataType::parse(&column.data_type.to_string()),
                );
                for option in &column.options {
                    if matches!(option.option, ColumnOption::NotNull) {
                        def = def.not_null();
                    }
                    let text = option.option.to_string().to_ascii_uppercase();
                    if text.contains("UNIQUE") || text.contains("PRIMARY KEY") {
                        unique = Some(idx);
                    }
                }
                def
            })
            .collect();

        self.create(
            &create.name.to_string(),
            MemoryTable {
                schema: ObjectSchema::new(columns),
                unique,
                rows: Vec::new(),
            },
            create.if_not_exists,
        )
    }

    fn create_array(&mut self, name: &str, attributes: &str) -> EngineResult<()> {
        let columns = attributes
            .split(',')
            .filter(|a| !a.trim().is_empty())
            .map(|attribute| {
                let (name, kind) = attribute.split_once(':').ok_or_else(|| {
                    EngineError::execution_error(format!("bad array attribute '{}'", attribute))
                })?;
                let kind = kind.trim();
                let mut def = ColumnDef::new(
                    name.trim(),
                    DataType::parse(kind.trim_end_matches(" NOT NULL").trim_end_matches(" null")),
                );
                if kind.to_ascii_uppercase().ends_with("NOT NULL") {
                    def = def.not_null();
                }
                Ok(def)
            })
            .collect::<EngineResult<Vec<_>>>()?;
        self.create(
            name,
            MemoryTable {
                schema: ObjectSchema::new(columns),
                unique: None,
                rows: Vec::new(),
            },
            false,
        )
    }

    fn drop_object(&mut self, name: &str, if_exists: bool) -> EngineResult<()> {
        self.ensure_writable()?;
        if self.shared.faults.lock().undroppable_objects.contains(name) {
            return Err(EngineError::execution_error(format!(
                "could not drop {}",
                name
            )));
        }
        if self.lookup(name).is_none() {
            return if if_exists {
                Ok(())
            } else {
                Err(EngineError::object_not_found(name))
            };
        }
        self.stage(name, None);
        Ok(())
    }

    fn export_limit(&self) -> Option<u64> {
        self.shared.faults.lock().export_fails_after
    }

    fn decode_csv_record(record: &[u8], width: usize) -> EngineResult<Row> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(record);
        let mut fields = csv::StringRecord::new();
        if !reader
            .read_record(&mut fields)
            .map_err(|e| EngineError::io(e.to_string()))?
        {
            return Ok(Vec::new());
        }
        if fields.len() != width {
            return Err(EngineError::execution_error(format!(
                "CSV record has {} fields, expected {}",
                fields.len(),
                width
            )));
        }
        Ok(fields
            .iter()
            .map(|f| (!f.is_empty()).then(|| f.to_string()))
            .collect())
    }
}

#[async_trait]
impl EngineSession for MemorySession {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn execute(&mut self, statement: &str) -> EngineResult<u64> {
        self.ensure_open()?;
        if let Some(caps) = DROP_OBJECT.captures(statement) {
            self.drop_object(&caps[2], caps.get(1).is_some())?;
        } else if let Some(caps) = CREATE_ARRAY.captures(statement) {
            self.create_array(&caps[1], &caps[2])?;
        } else {
            self.create_table(statement)?;
        }
        Ok(0)
    }

    async fn create_object_by_name(&mut self, name: &str) -> EngineResult<()> {
        self.create(name, MemoryTable::default(), false)
    }

    async fn drop_object_if_exists(&mut self, name: &str) -> EngineResult<()> {
        self.drop_object(name, true)
    }

    async fn object_exists(&mut self, name: &str) -> EngineResult<bool> {
        self.ensure_open()?;
        Ok(self.lookup(name).is_some())
    }

    async fn ensure_namespace(&mut self, namespace: &str) -> EngineResult<()> {
        self.ensure_writable()?;
        if namespace == DEFAULT_NAMESPACE {
            return Ok(());
        }
        if self.options.auto_commit {
            let mut databases = self.shared.databases.lock();
            databases
                .entry(self.dbid)
                .or_default()
                .namespaces
                .insert(namespace.to_string());
        } else {
            self.pending_namespaces.insert(namespace.to_string());
        }
        Ok(())
    }

    async fn describe_object(&mut self, name: &str) -> EngineResult<ObjectSchema> {
        self.ensure_open()?;
        self.lookup(name)
            .map(|t| t.schema)
            .ok_or_else(|| EngineError::object_not_found(name))
    }

    async fn bulk_export(
        &mut self,
        object: &str,
        format: DataFormat,
        sink: ExportSink<'_>,
    ) -> EngineResult<u64> {
        self.ensure_open()?;
        let table = self
            .lookup(object)
            .ok_or_else(|| EngineError::object_not_found(object))?;
        let limit = self.export_limit();

        let mut buf = BytesMut::new();
        if format == DataFormat::Binary {
            codec::encode_header(&mut buf);
        }
        let mut written = 0u64;
        for row in &table.rows {
            if limit.is_some_and(|limit| written >= limit) {
                sink.write_all(&buf).await?;
                return Err(EngineError::connection_failed("connection severed"));
            }
            match format {
                DataFormat::Csv => {
                    let mut writer = csv::WriterBuilder::new()
                        .has_headers(false)
                        .from_writer(Vec::new());
                    writer
                        .write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))
                        .map_err(|e| EngineError::io(e.to_string()))?;
                    let record = writer
                        .into_inner()
                        .map_err(|e| EngineError::io(e.to_string()))?;
                    buf.extend_from_slice(&record);
                }
                DataFormat::Binary => {
                    codec::encode_tuple(&mut buf, row.iter().map(|v| v.as_deref().map(str::as_bytes)))?;
                }
            }
            written += 1;
            if buf.len() >= READ_CHUNK {
                sink.write_all(&buf.split()).await?;
            }
        }
        if format == DataFormat::Binary {
            codec::encode_trailer(&mut buf);
        }
        sink.write_all(&buf).await?;
        sink.flush().await?;
        Ok(written)
    }

    async fn bulk_load(
        &mut self,
        object: &str,
        format: DataFormat,
        source: LoadSource<'_>,
    ) -> EngineResult<u64> {
        self.ensure_writable()?;
        let mut table = self
            .lookup(object)
            .ok_or_else(|| EngineError::object_not_found(object))?;
        let width = table.schema.len();

        let stalled = self.shared.faults.lock().stall_loads;
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut incoming: Vec<Row> = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        match format {
            DataFormat::Csv => {
                let mut splitter = CsvRecordSplitter::new();
                loop {
                    let n = source.read(&mut chunk).await?;
                    if n == 0 {
                        break;
                    }
                    splitter.feed(&chunk[..n]);
                    while let Some(record) = splitter.next_record() {
                        incoming.push(Self::decode_csv_record(&record, width)?);
                    }
                }
                if let Some(record) = splitter.finish() {
                    incoming.push(Self::decode_csv_record(&record, width)?);
                }
                incoming.retain(|row| !row.is_empty());
            }
            DataFormat::Binary => {
                let mut reader = BinaryRowReader::new();
                'read: loop {
                    let n = source.read(&mut chunk).await?;
                    reader.feed(&chunk[..n]);
                    loop {
                        match reader.next_row()? {
                            Decoded::Row(fields) => incoming.push(
                                fields
                                    .iter()
                                    .map(|f| f.as_ref().map(|b| String::from_utf8_lossy(b).into_owned()))
                                    .collect(),
                            ),
                            Decoded::End => break 'read,
                            Decoded::NeedMore if n == 0 => {
                                return Err(EngineError::io("binary stream ended mid-tuple"))
                            }
                            Decoded::NeedMore => break,
                        }
                    }
                }
            }
        }

        let mut loaded = 0u64;
        for row in incoming {
            if row.len() != width {
                return Err(EngineError::execution_error(format!(
                    "row has {} values, {} expects {}",
                    row.len(),
                    object,
                    width
                )));
            }
            if table.conflicts(&row) {
                continue;
            }
            table.rows.push(row);
            loaded += 1;
        }
        self.stage(object, Some(table));
        Ok(loaded)
    }

    async fn commit(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        let pending = std::mem::take(&mut self.overlay);
        let namespaces = std::mem::take(&mut self.pending_namespaces);
        {
            let mut databases = self.shared.databases.lock();
            let db = databases.entry(self.dbid).or_default();
            db.namespaces.extend(namespaces);
            for (name, table) in pending {
                match table {
                    Some(table) => db.tables.insert(name, table),
                    None => db.tables.remove(&name),
                };
            }
        }
        self.shared
            .probe
            .record(self.id, self.dbid, SessionEvent::Committed);
        Ok(())
    }

    async fn abort(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        self.overlay.clear();
        self.pending_namespaces.clear();
        self.shared
            .probe
            .record(self.id, self.dbid, SessionEvent::Aborted);
        Ok(())
    }

    async fn close(&mut self) -> EngineResult<()> {
        if self.closed {
            return Ok(());
        }
        self.overlay.clear();
        self.pending_namespaces.clear();
        self.closed = true;
        self.shared
            .probe
            .record(self.id, self.dbid, SessionEvent::Closed);
        Ok(())
    }
}
