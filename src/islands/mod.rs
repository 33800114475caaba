// SPDX-License-Identifier: Apache-2.0

//! Island capabilities.
//!
//! Everything that differs between islands lives in one table of
//! `IslandCapabilities` records, looked up by `Scope` through the
//! `CapabilityRegistry`.

pub mod capabilities;
pub mod predicates;
pub mod registry;
pub mod shims;

pub use capabilities::IslandCapabilities;
pub use predicates::PredicateSyntax;
pub use registry::{CapabilityRegistry, CreationStatement};
pub use shims::Shim;
