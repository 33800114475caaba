// SPDX-License-Identifier: Apache-2.0

//! Data migration between engines
//!
//! An export task and a load task connected by a bounded pipe, with DDL
//! translation for the destination and statistics for the monitor.

pub mod codec;
pub mod ddl;
pub mod monitor;
pub mod orchestrator;
pub mod pipe;
pub mod pool;
pub mod types;

pub use monitor::MigrationStatsStore;
pub use orchestrator::MigrationOrchestrator;
pub use types::{
    MigrationCause, MigrationError, MigrationOutcome, MigrationResult, MigrationState,
    MigrationTask,
};
