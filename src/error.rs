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

//! Error types

use std::fmt;

use crate::entity::EntityId;
use crate::processor::ProcessorId;

/// ECS error type
///
/// Every variant is a synchronous contract violation reported to the
/// immediate caller. Nothing here is retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity was never created or has already been deleted
    UnknownEntity(EntityId),

    /// Entity does not hold a component of the requested type
    ComponentNotFound {
        entity: EntityId,
        component: &'static str,
    },

    /// Query type set is empty or names the same type twice
    InvalidQuery(String),

    /// Processor handle does not refer to a registered processor
    ProcessorNotFound(ProcessorId),

    /// Configuration could not be loaded or failed validation
    Config(String),
}

impl EcsError {
    pub(crate) fn component_not_found<T: ?Sized + 'static>(entity: EntityId) -> Self {
        EcsError::ComponentNotFound {
            entity,
            component: std::any::type_name::<T>(),
        }
    }
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::UnknownEntity(entity) => write!(f, "Unknown entity: {entity:?}"),
            EcsError::ComponentNotFound { entity, component } => {
                write!(f, "Component `{component}` not found on entity {entity:?}")
            }
            EcsError::InvalidQuery(msg) => write!(f, "Invalid query: {msg}"),
            EcsError::ProcessorNotFound(id) => write!(f, "Processor not found: {id:?}"),
            EcsError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<std::io::Error> for EcsError {
    fn from(err: std::io::Error) -> Self {
        EcsError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        EcsError::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
