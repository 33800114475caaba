// SPDX-License-Identifier: Apache-2.0

//! Shims render an engine-agnostic operator tree into engine-native text.

pub mod afl;
pub mod sql;
pub mod text;

use polystore_core::Engine;

use crate::error::IslandResult;
use crate::operators::Operator;

pub use afl::AflShim;
pub use sql::{SqlDialect, SqlShim};
pub use text::TextScanShim;

pub trait Shim: Send + Sync {
    fn name(&self) -> &'static str;

    /// Engine whose dialect this shim emits.
    fn engine(&self) -> Engine;

    fn render(&self, root: &Operator) -> IslandResult<String>;
}

pub static POSTGRES_SQL: SqlShim = SqlShim::new(SqlDialect::Postgres);
pub static ARRAY_AQL: SqlShim = SqlShim::new(SqlDialect::Aql);
pub static ARRAY_AFL: AflShim = AflShim;
pub static TEXT_SCAN: TextScanShim = TextScanShim;

pub(crate) static RELATIONAL_SHIMS: [&dyn Shim; 2] = [&POSTGRES_SQL, &ARRAY_AQL];
pub(crate) static ARRAY_SHIMS: [&dyn Shim; 1] = [&ARRAY_AFL];
pub(crate) static TEXT_SHIMS: [&dyn Shim; 1] = [&TEXT_SCAN];
