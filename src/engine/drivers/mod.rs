// SPDX-License-Identifier: Apache-2.0

// Engine drivers module

pub mod memory;
pub mod postgres;

pub use memory::{ConnectionProbe, MemoryConnector, SessionEvent};
pub use postgres::PostgresConnector;
