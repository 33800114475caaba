// SPDX-License-Identifier: Apache-2.0

//! Island scopes, backing engines, and database identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An island exposed by the federation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    Relational,
    Array,
    KeyValue,
    Text,
    Graph,
    Document,
    Stream,
    Myria,
    Cast,
}

impl Scope {
    pub const ALL: [Scope; 9] = [
        Scope::Relational,
        Scope::Array,
        Scope::KeyValue,
        Scope::Text,
        Scope::Graph,
        Scope::Document,
        Scope::Stream,
        Scope::Myria,
        Scope::Cast,
    ];

    /// Upper-case name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Scope::Relational => "RELATIONAL",
            Scope::Array => "ARRAY",
            Scope::KeyValue => "KEYVALUE",
            Scope::Text => "TEXT",
            Scope::Graph => "GRAPH",
            Scope::Document => "DOCUMENT",
            Scope::Stream => "STREAM",
            Scope::Myria => "MYRIA",
            Scope::Cast => "CAST",
        }
    }

    /// Keyword naming the scope inside a cast, e.g. `relational`.
    pub fn keyword(self) -> &'static str {
        match self {
            Scope::Relational => "relational",
            Scope::Array => "array",
            Scope::KeyValue => "keyvalue",
            Scope::Text => "text",
            Scope::Graph => "graph",
            Scope::Document => "document",
            Scope::Stream => "stream",
            Scope::Myria => "myria",
            Scope::Cast => "cast",
        }
    }

    /// Query prefix that selects the island, e.g. `bdrel`.
    pub fn tag(self) -> &'static str {
        match self {
            Scope::Relational => "bdrel",
            Scope::Array => "bdarray",
            Scope::KeyValue => "bdkv",
            Scope::Text => "bdtext",
            Scope::Graph => "bdgraph",
            Scope::Document => "bddoc",
            Scope::Stream => "bdstream",
            Scope::Myria => "bdmyria",
            Scope::Cast => "bdcast",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Scope> {
        let tag = tag.trim();
        Scope::ALL
            .into_iter()
            .find(|scope| scope.tag().eq_ignore_ascii_case(tag))
    }

    pub fn from_keyword(keyword: &str) -> Option<Scope> {
        let keyword = keyword.trim();
        Scope::ALL
            .into_iter()
            .find(|scope| scope.keyword().eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Backing database technology. Every dbid is owned by exactly one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Engine {
    RelationalEngine,
    ArrayEngine,
    StreamEngine,
    WideColumnEngine,
    DataflowEngine,
}

impl Engine {
    pub const ALL: [Engine; 5] = [
        Engine::RelationalEngine,
        Engine::ArrayEngine,
        Engine::StreamEngine,
        Engine::WideColumnEngine,
        Engine::DataflowEngine,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Engine::RelationalEngine => "RelationalEngine",
            Engine::ArrayEngine => "ArrayEngine",
            Engine::StreamEngine => "StreamEngine",
            Engine::WideColumnEngine => "WideColumnEngine",
            Engine::DataflowEngine => "DataflowEngine",
        }
    }

    /// Maps an engine name as stored in catalog rows (e.g. `PostgreSQL 9.4`,
    /// `scidb`, `Accumulo`) onto the engine family.
    pub fn from_catalog_name(raw: &str) -> Option<Engine> {
        let lower = raw.trim().to_ascii_lowercase();
        const PREFIXES: [(&str, Engine); 11] = [
            ("postgres", Engine::RelationalEngine),
            ("relational", Engine::RelationalEngine),
            ("scidb", Engine::ArrayEngine),
            ("array", Engine::ArrayEngine),
            ("sstore", Engine::StreamEngine),
            ("s-store", Engine::StreamEngine),
            ("stream", Engine::StreamEngine),
            ("accumulo", Engine::WideColumnEngine),
            ("widecolumn", Engine::WideColumnEngine),
            ("myria", Engine::DataflowEngine),
            ("dataflow", Engine::DataflowEngine),
        ];
        PREFIXES
            .iter()
            .find(|(prefix, _)| lower.starts_with(prefix))
            .map(|(_, engine)| *engine)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifier of a database instance registered in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DbId(pub u32);

impl fmt::Display for DbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
