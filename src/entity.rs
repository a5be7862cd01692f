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

//! Entity identifiers and the allocator that issues them.
//!
//! Ids are slotmap keys: a slot index plus a version. Freed slots are reused
//! immediately, but every free bumps the slot version, so a handle kept
//! across a delete/create cycle never compares equal to the new entity.

use std::any::TypeId;

use slotmap::{new_key_type, Key, SlotMap};
use smallvec::SmallVec;

use crate::component::MAX_QUERY_COMPONENTS;
use crate::error::{EcsError, Result};

new_key_type! {
    /// Unique entity identifier backed by slotmap's generational keys.
    pub struct EntityId;
}

impl EntityId {
    /// Raw 64-bit form (version in the high half, slot index in the low half).
    ///
    /// Only useful for logging and hashing outside the crate.
    pub fn to_bits(self) -> u64 {
        self.data().as_ffi()
    }
}

/// Component types held by one live entity (the reverse index).
pub type ComponentTypes = SmallVec<[TypeId; MAX_QUERY_COMPONENTS]>;

/// Issues and recycles entity ids
///
/// Each live entity maps to the list of component types it holds, which
/// lets deletion visit only the partitions the entity is actually in.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    entities: SlotMap<EntityId, ComponentTypes>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate room for `capacity` live entities
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entities: SlotMap::with_capacity_and_key(capacity),
        }
    }

    /// Allocate a fresh id that is not currently live
    pub fn create(&mut self) -> EntityId {
        self.entities.insert(ComponentTypes::new())
    }

    /// Free an id, returning the component types it still held
    pub fn destroy(&mut self, entity: EntityId) -> Result<ComponentTypes> {
        self.entities
            .remove(entity)
            .ok_or(EcsError::UnknownEntity(entity))
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Component types recorded for a live entity
    pub fn component_types(&self, entity: EntityId) -> Result<&[TypeId]> {
        self.entities
            .get(entity)
            .map(|types| types.as_slice())
            .ok_or(EcsError::UnknownEntity(entity))
    }

    /// Record that `entity` now holds `type_id`. Returns false if it already did.
    pub(crate) fn record_component(&mut self, entity: EntityId, type_id: TypeId) -> Result<bool> {
        let types = self
            .entities
            .get_mut(entity)
            .ok_or(EcsError::UnknownEntity(entity))?;
        if types.contains(&type_id) {
            return Ok(false);
        }
        types.push(type_id);
        Ok(true)
    }

    pub(crate) fn forget_component(&mut self, entity: EntityId, type_id: TypeId) {
        if let Some(types) = self.entities.get_mut(entity) {
            types.retain(|tid| *tid != type_id);
        }
    }

    /// Take the component list of an entity, leaving it live but empty
    pub(crate) fn take_components(&mut self, entity: EntityId) -> Result<ComponentTypes> {
        self.entities
            .get_mut(entity)
            .map(std::mem::take)
            .ok_or(EcsError::UnknownEntity(entity))
    }

    /// Free every id. Slot versions are bumped, so old handles stay dead.
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_unique() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.create();
        let b = alloc.create();
        assert_ne!(a, b);
        assert_eq!(alloc.len(), 2);
    }

    #[test]
    fn test_destroy_twice_fails() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.create();
        assert!(alloc.destroy(a).is_ok());
        assert_eq!(alloc.destroy(a), Err(EcsError::UnknownEntity(a)));
        assert!(!alloc.is_alive(a));
    }

    #[test]
    fn test_recycled_id_differs_from_stale_handle() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.create();
        alloc.destroy(a).unwrap();

        let b = alloc.create();
        assert_ne!(a, b);
        assert!(alloc.is_alive(b));
        assert!(!alloc.is_alive(a));
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<_> = (0..4).map(|_| alloc.create()).collect();
        alloc.clear();
        assert!(alloc.is_empty());

        let fresh = alloc.create();
        assert!(ids.iter().all(|id| *id != fresh));
        assert!(ids.iter().all(|id| !alloc.is_alive(*id)));
    }

    #[test]
    fn test_component_tracking() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.create();
        let tid = TypeId::of::<u8>();

        assert!(alloc.record_component(a, tid).unwrap());
        assert!(!alloc.record_component(a, tid).unwrap());
        assert_eq!(alloc.component_types(a).unwrap(), &[tid]);

        alloc.forget_component(a, tid);
        assert!(alloc.component_types(a).unwrap().is_empty());
    }
}
