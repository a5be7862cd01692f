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

//! Query engine and query cache
//!
//! A multi-component query picks the smallest requested partition as the
//! driver and checks every other partition for each of its entities. The
//! result is a snapshot of matching entity ids; component references are
//! fetched lazily while iterating.
//!
//! The cache memoizes those snapshots keyed by the ordered type signature.
//! Each entry carries the world generation it was computed at and is only
//! reused while that generation is current.

use std::any::TypeId;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::rc::Rc;

use lru::LruCache;
use smallvec::SmallVec;

use crate::component::{ComponentSet, MAX_QUERY_COMPONENTS};
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::polymorphic::PolymorphicIndex;
use crate::storage::ComponentStore;

/// Ordered list of requested component types
pub type QuerySignature = SmallVec<[TypeId; MAX_QUERY_COMPONENTS]>;

/// Reject empty signatures and signatures naming a type twice
pub fn validate_signature(types: &[TypeId]) -> Result<()> {
    if types.is_empty() {
        return Err(EcsError::InvalidQuery(
            "query must request at least one component type".to_string(),
        ));
    }
    for (i, type_id) in types.iter().enumerate() {
        if types[..i].contains(type_id) {
            return Err(EcsError::InvalidQuery(format!(
                "component type at position {i} is requested more than once"
            )));
        }
    }
    Ok(())
}

/// Entities holding every type in `types`, in driver-partition order.
///
/// A type id with no component partition is looked up as a polymorphic
/// base, so bases and concrete components mix freely in one signature.
/// The driver is the smallest partition; ties go to the type declared
/// first. A type with neither kind of partition yields an empty result.
pub fn intersect(
    store: &ComponentStore,
    index: &PolymorphicIndex,
    types: &[TypeId],
) -> Vec<EntityId> {
    let partitions: Option<SmallVec<[&[EntityId]; MAX_QUERY_COMPONENTS]>> = types
        .iter()
        .map(|type_id| partition_entities(store, index, *type_id))
        .collect();
    let Some(partitions) = partitions else {
        return Vec::new();
    };

    let mut driver = 0;
    for (i, entities) in partitions.iter().enumerate() {
        if entities.len() < partitions[driver].len() {
            driver = i;
        }
    }
    let Some(candidates) = partitions.get(driver) else {
        return Vec::new();
    };

    // Single-type fast path: nothing to filter
    if types.len() == 1 {
        return candidates.to_vec();
    }

    candidates
        .iter()
        .copied()
        .filter(|entity| {
            types
                .iter()
                .enumerate()
                .all(|(i, type_id)| i == driver || holds(store, index, *entity, *type_id))
        })
        .collect()
}

/// Component partition for `type_id`, else the base partition
fn partition_entities<'a>(
    store: &'a ComponentStore,
    index: &'a PolymorphicIndex,
    type_id: TypeId,
) -> Option<&'a [EntityId]> {
    store
        .entities_of(type_id)
        .or_else(|| index.base_entities(type_id))
}

fn holds(
    store: &ComponentStore,
    index: &PolymorphicIndex,
    entity: EntityId,
    type_id: TypeId,
) -> bool {
    if store.entities_of(type_id).is_some() {
        store.contains(entity, type_id)
    } else {
        index.contains(entity, type_id)
    }
}

/// Memoized query result
#[derive(Debug, Clone)]
struct CachedQuery {
    generation: u64,
    entities: Rc<[EntityId]>,
}

/// Bounded, generation-checked cache of query results
pub struct QueryCache {
    entries: LruCache<QuerySignature, CachedQuery>,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the cached snapshot for `signature` if it was computed at
    /// `generation`, otherwise run `compute` and store its result.
    pub fn get_or_compute<F>(
        &mut self,
        signature: &QuerySignature,
        generation: u64,
        compute: F,
    ) -> Rc<[EntityId]>
    where
        F: FnOnce() -> Vec<EntityId>,
    {
        if let Some(cached) = self.entries.get(signature) {
            if cached.generation == generation {
                self.hits += 1;
                return Rc::clone(&cached.entities);
            }
        }

        self.misses += 1;
        let entities: Rc<[EntityId]> = compute().into();
        self.entries.put(
            signature.clone(),
            CachedQuery {
                generation,
                entities: Rc::clone(&entities),
            },
        );
        entities
    }

    /// Drop every entry and reset counters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self, generation: u64) -> QueryCacheStats {
        QueryCacheStats {
            num_cached_queries: self.entries.len(),
            num_current_queries: self
                .entries
                .iter()
                .filter(|(_, cached)| cached.generation == generation)
                .count(),
            capacity: self.entries.cap().get(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

/// Statistics about the query cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCacheStats {
    /// Number of signatures with an entry (current or stale)
    pub num_cached_queries: usize,
    /// Entries computed at the current generation
    pub num_current_queries: usize,
    /// Maximum number of entries before LRU eviction
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Iterator over `(EntityId, (&A, &B, ..))`
pub struct QueryIter<'w, Q: ComponentSet> {
    partitions: Option<Q::Partitions<'w>>,
    entities: Rc<[EntityId]>,
    cursor: usize,
}

impl<'w, Q: ComponentSet> QueryIter<'w, Q> {
    pub(crate) fn new(store: &'w ComponentStore, entities: Rc<[EntityId]>) -> Self {
        Self {
            partitions: Q::partitions(store),
            entities,
            cursor: 0,
        }
    }

    /// Every entity in the snapshot, including ones already yielded
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }
}

impl<'w, Q: ComponentSet> Clone for QueryIter<'w, Q> {
    fn clone(&self) -> Self {
        Self {
            partitions: self.partitions,
            entities: Rc::clone(&self.entities),
            cursor: self.cursor,
        }
    }
}

impl<'w, Q: ComponentSet> Iterator for QueryIter<'w, Q> {
    type Item = (EntityId, Q::Refs<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let partitions = self.partitions?;
        loop {
            let entity = *self.entities.get(self.cursor)?;
            self.cursor += 1;
            if let Some(refs) = Q::fetch(partitions, entity) {
                return Some((entity, refs));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len().saturating_sub(self.cursor)))
    }
}

/// Iterator over `(EntityId, (&mut A, &mut B, ..))`
pub struct QueryIterMut<'w, Q: ComponentSet> {
    partitions: Option<Q::PartitionsMut>,
    entities: Rc<[EntityId]>,
    cursor: usize,
    _marker: PhantomData<&'w mut ComponentStore>,
}

impl<'w, Q: ComponentSet> QueryIterMut<'w, Q> {
    /// `entities` must not contain duplicates and `Q` must name distinct
    /// types; the world validates both before calling this.
    pub(crate) fn new(store: &'w mut ComponentStore, entities: Rc<[EntityId]>) -> Self {
        Self {
            partitions: Q::partitions_mut(store),
            entities,
            cursor: 0,
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: ComponentSet> Iterator for QueryIterMut<'w, Q> {
    type Item = (EntityId, Q::Muts<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let partitions = self.partitions?;
        loop {
            let entity = *self.entities.get(self.cursor)?;
            self.cursor += 1;
            // SAFETY: the store is exclusively borrowed for 'w, the types are
            // distinct, and the cursor visits each (unique) entity once.
            if let Some(muts) = unsafe { Q::fetch_mut(partitions, entity) } {
                return Some((entity, muts));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len().saturating_sub(self.cursor)))
    }
}
