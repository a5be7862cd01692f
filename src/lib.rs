// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Partition ECS - sparse-set Entity Component System
//!
//! Components live in one partition per type. Queries intersect partitions
//! starting from the smallest one, an optional cache memoizes results
//! between structural changes, and a priority scheduler runs processors
//! against the world once per tick.

pub mod component;
pub mod config;
pub mod debug;
pub mod entity;
pub mod error;
pub mod polymorphic;
pub mod prelude;
pub mod processor;
pub mod query;
pub mod storage;
pub mod time;
pub mod world;

#[cfg(test)]
mod tests;

pub use component::*;
pub use config::WorldConfig;
pub use entity::*;
pub use error::*;
pub use polymorphic::{BaseQueryIter, BaseQueryIterMut, PolyIter, PolymorphicIndex};
pub use processor::*;
pub use query::*;
pub use storage::{ComponentStore, Partition};
pub use world::*;
