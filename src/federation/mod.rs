// SPDX-License-Identifier: Apache-2.0

//! Island dispatch
//!
//! Tags are parsed into scopes, routed by island capabilities, and
//! multi-island plans get staging objects in the consuming island.

pub mod planner;
pub mod tagger;
pub mod transition;
pub mod types;

pub use planner::{plan_dispatch, CompilationContext};
pub use tagger::{parse, parse_cast, tag_scope};
pub use transition::{StagingHandle, TransitionManager};
pub use types::{CastSpec, IslandDispatch, TaggedQuery};
