//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use partition_ecs::prelude::*;
//! ```

pub use crate::component::{Bundle, Component, ComponentSet};
pub use crate::config::WorldConfig;
pub use crate::debug::{Diagnostics, WorldInspector};
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::processor::{Processor, ProcessorId, UpdateRate};
pub use crate::query::QueryCacheStats;
pub use crate::time::{FixedTime, Time};
pub use crate::world::World;
