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

//! World: entities, component partitions, queries and processors

use std::any::TypeId;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::Duration;

use smallvec::smallvec;
use tracing::{debug, trace, warn};

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::component::{Bundle, Component, ComponentSet};
use crate::config::WorldConfig;
use crate::entity::{EntityAllocator, EntityId};
use crate::error::{EcsError, Result};
use crate::polymorphic::{BaseQueryIter, BaseQueryIterMut, PolyIter, PolymorphicIndex};
use crate::processor::{Processor, ProcessorId, Scheduler};
use crate::query::{
    intersect, validate_signature, QueryCache, QueryCacheStats, QueryIter, QueryIterMut,
    QuerySignature,
};
use crate::storage::ComponentStore;

/// Cache key marker for polymorphic queries over base `B`
type PolymorphicKey<B> = PhantomData<fn(&B)>;

/// Central ECS world
///
/// Owns the entity allocator, the component store, the polymorphic index,
/// the optional query cache and the processor scheduler.
pub struct World {
    /// Live entities and the component types each one holds
    entities: EntityAllocator,

    /// One partition per component type
    store: ComponentStore,

    /// Base-type partitions fed by ancestor registrations
    polymorphic: PolymorphicIndex,

    /// Query result cache; `None` for a plain world
    query_cache: Option<RefCell<QueryCache>>,

    /// Registered processors in priority order
    scheduler: Scheduler,

    /// Bumped on every structural mutation; the cache validity token
    generation: u64,

    /// Entities queued by `delete_entity_deferred`
    pending_deletions: Vec<EntityId>,

    config: WorldConfig,
}

impl World {
    /// Create a new, empty world without query caching.
    pub fn new() -> Self {
        Self::build(WorldConfig::default())
    }

    /// Create a new, empty world that caches query results.
    pub fn cached() -> Self {
        Self::build(WorldConfig::cached())
    }

    /// Create a world from a validated configuration.
    pub fn with_config(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        let query_cache = config
            .query_cache
            .then(|| RefCell::new(QueryCache::new(config.cache_capacity())));
        Self {
            entities: EntityAllocator::with_capacity(config.entity_capacity),
            store: ComponentStore::new(),
            polymorphic: PolymorphicIndex::new(),
            query_cache,
            scheduler: Scheduler::new(),
            generation: 0,
            pending_deletions: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn is_cached(&self) -> bool {
        self.query_cache.is_some()
    }

    /// Structural mutation counter
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    // ========== Entities ==========

    /// Allocate a new entity with no components
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.entities.create();
        self.bump_generation();
        entity
    }

    /// Allocate a new entity and attach every component of `bundle`
    pub fn create_entity_with<B: Bundle>(&mut self, bundle: B) -> Result<EntityId> {
        let entity = self.create_entity();
        if let Err(err) = bundle.attach(self, entity) {
            // Keep creation all-or-nothing
            let _ = self.delete_entity(entity);
            return Err(err);
        }
        Ok(entity)
    }

    /// Delete an entity and every component it holds
    pub fn delete_entity(&mut self, entity: EntityId) -> Result<()> {
        let types = self.entities.destroy(entity)?;
        self.detach_all(entity, &types);
        self.bump_generation();
        Ok(())
    }

    /// Queue an entity for deletion at the start of the next `process` call
    pub fn delete_entity_deferred(&mut self, entity: EntityId) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::UnknownEntity(entity));
        }
        self.pending_deletions.push(entity);
        Ok(())
    }

    /// Delete every queued entity, returning how many were deleted.
    ///
    /// Duplicates and entities deleted in the meantime are skipped.
    pub fn flush_deletions(&mut self) -> usize {
        if self.pending_deletions.is_empty() {
            return 0;
        }
        let queued = std::mem::take(&mut self.pending_deletions);
        let deleted = queued
            .into_iter()
            .filter(|entity| self.delete_entity(*entity).is_ok())
            .count();
        trace!(deleted, "flushed deferred deletions");
        deleted
    }

    pub fn entity_exists(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterate every live entity id
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter()
    }

    // ========== Components ==========

    /// Attach a component, replacing any existing one of the same type
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<()> {
        let type_id = TypeId::of::<T>();
        let newly_added = self.entities.record_component(entity, type_id)?;
        self.store.insert(entity, component);
        if newly_added {
            self.polymorphic.on_attach(entity, type_id);
        }
        self.bump_generation();
        Ok(())
    }

    /// Detach and return a component
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<T> {
        self.ensure_alive(entity)?;
        let type_id = TypeId::of::<T>();
        let component = self
            .store
            .remove::<T>(entity)
            .ok_or_else(|| EcsError::component_not_found::<T>(entity))?;
        self.entities.forget_component(entity, type_id);
        self.polymorphic.on_detach(entity, type_id);
        self.bump_generation();
        Ok(component)
    }

    /// Detach every component but keep the entity alive
    pub fn remove_all_components(&mut self, entity: EntityId) -> Result<()> {
        let types = self.entities.take_components(entity)?;
        if types.is_empty() {
            return Ok(());
        }
        self.detach_all(entity, &types);
        self.bump_generation();
        Ok(())
    }

    fn detach_all(&mut self, entity: EntityId, types: &[TypeId]) {
        self.store.remove_all(entity, types);
        for type_id in types {
            self.polymorphic.on_detach(entity, *type_id);
        }
    }

    fn ensure_alive(&self, entity: EntityId) -> Result<()> {
        if self.entities.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::UnknownEntity(entity))
        }
    }

    /// Borrow one component of one entity
    pub fn component_for_entity<T: Component>(&self, entity: EntityId) -> Result<&T> {
        self.ensure_alive(entity)?;
        self.store
            .get::<T>(entity)
            .ok_or_else(|| EcsError::component_not_found::<T>(entity))
    }

    pub fn component_for_entity_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T> {
        self.ensure_alive(entity)?;
        self.store
            .get_mut::<T>(entity)
            .ok_or_else(|| EcsError::component_not_found::<T>(entity))
    }

    /// Like `component_for_entity`, but `None` instead of an error
    pub fn try_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.store.get::<T>(entity)
    }

    pub fn try_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.store.get_mut::<T>(entity)
    }

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.store.has::<T>(entity)
    }

    /// True if the entity holds every type in `Q`
    pub fn has_components<Q: ComponentSet>(&self, entity: EntityId) -> bool {
        Q::type_ids()
            .iter()
            .all(|type_id| self.store.contains(entity, *type_id))
    }

    /// Component types attached to a live entity, in attach order
    pub fn component_types_for_entity(&self, entity: EntityId) -> Result<&[TypeId]> {
        self.entities.component_types(entity)
    }

    // ========== Queries ==========

    /// Every `(entity, &T)`, streamed straight from T's partition
    pub fn get_component<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.store
            .partition::<T>()
            .into_iter()
            .flat_map(|partition| partition.iter())
    }

    pub fn get_component_mut<T: Component>(
        &mut self,
    ) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.store
            .partition_mut::<T>()
            .into_iter()
            .flat_map(|partition| partition.iter_mut())
    }

    /// Every entity holding all of `Q`'s types, with shared references
    ///
    /// ```
    /// use partition_ecs::World;
    ///
    /// struct Position(f32);
    /// struct Velocity(f32);
    ///
    /// let mut world = World::new();
    /// let e = world.create_entity_with((Position(0.0), Velocity(1.0))).unwrap();
    /// for (entity, (pos, vel)) in world.get_components::<(Position, Velocity)>().unwrap() {
    ///     assert_eq!(entity, e);
    ///     assert_eq!(pos.0 + vel.0, 1.0);
    /// }
    /// ```
    pub fn get_components<Q: ComponentSet>(&self) -> Result<QueryIter<'_, Q>> {
        let entities = self.query_entities(&Q::type_ids())?;
        Ok(QueryIter::new(&self.store, entities))
    }

    /// Every entity holding all of `Q`'s types, with mutable references
    pub fn get_components_mut<Q: ComponentSet>(&mut self) -> Result<QueryIterMut<'_, Q>> {
        let entities = self.query_entities(&Q::type_ids())?;
        Ok(QueryIterMut::new(&mut self.store, entities))
    }

    /// Entity ids matching an arbitrary type set, served from the cache
    /// when it is enabled and current.
    pub fn query_entities(&self, types: &[TypeId]) -> Result<Rc<[EntityId]>> {
        validate_signature(types)?;
        let entities = match &self.query_cache {
            Some(cache) => {
                let signature: QuerySignature = types.iter().copied().collect();
                cache
                    .borrow_mut()
                    .get_or_compute(&signature, self.generation, || {
                        intersect(&self.store, &self.polymorphic, types)
                    })
            }
            None => intersect(&self.store, &self.polymorphic, types).into(),
        };
        Ok(entities)
    }

    pub fn query_cache_stats(&self) -> Option<QueryCacheStats> {
        self.query_cache
            .as_ref()
            .map(|cache| cache.borrow().stats(self.generation))
    }

    /// Drop all cached query results
    pub fn clear_query_cache(&self) {
        if let Some(cache) = &self.query_cache {
            cache.borrow_mut().clear();
        }
    }

    // ========== Polymorphic lookup ==========

    /// Declare that component `C` can be viewed as `B`
    ///
    /// Entities already holding `C` are indexed immediately.
    ///
    /// ```
    /// use partition_ecs::World;
    ///
    /// trait Drawable {
    ///     fn layer(&self) -> u8;
    /// }
    /// struct Sprite;
    /// impl Drawable for Sprite {
    ///     fn layer(&self) -> u8 { 2 }
    /// }
    ///
    /// let mut world = World::new();
    /// world.register_ancestor::<Sprite, dyn Drawable>(|s| s, |s| s);
    /// let e = world.create_entity_with((Sprite,)).unwrap();
    /// let layers: Vec<_> = world.get_polymorphic::<dyn Drawable>().map(|(_, d)| d.layer()).collect();
    /// assert_eq!(layers, vec![2]);
    /// assert!(world.has_polymorphic::<dyn Drawable>(e));
    /// ```
    pub fn register_ancestor<C: Component, B: ?Sized + 'static>(
        &mut self,
        as_ref: fn(&C) -> &B,
        as_mut: fn(&mut C) -> &mut B,
    ) {
        if !self.polymorphic.register::<C, B>(as_ref, as_mut) {
            return;
        }

        let concrete = TypeId::of::<C>();
        let base = TypeId::of::<B>();
        let existing = self
            .store
            .entities_of(concrete)
            .map(|entities| entities.to_vec())
            .unwrap_or_default();
        for entity in &existing {
            self.polymorphic.attach_to_base(*entity, concrete, base);
        }
        debug!(
            component = std::any::type_name::<C>(),
            base = std::any::type_name::<B>(),
            backfilled = existing.len(),
            "ancestor registered"
        );
        self.bump_generation();
    }

    fn polymorphic_entities<B: ?Sized + 'static>(&self) -> Rc<[EntityId]> {
        let base = TypeId::of::<B>();
        match &self.query_cache {
            Some(cache) => {
                let signature: QuerySignature = smallvec![TypeId::of::<PolymorphicKey<B>>()];
                cache
                    .borrow_mut()
                    .get_or_compute(&signature, self.generation, || {
                        self.polymorphic.entities_of(base).to_vec()
                    })
            }
            None => self.polymorphic.entities_of(base).into(),
        }
    }

    /// Every entity with a component registered as satisfying `B`
    pub fn get_polymorphic<B: ?Sized + 'static>(&self) -> PolyIter<'_, B> {
        PolyIter::new(&self.store, &self.polymorphic, self.polymorphic_entities::<B>())
    }

    /// Visit every entity viewable as `B` with mutable access
    pub fn for_each_polymorphic_mut<B, F>(&mut self, mut f: F)
    where
        B: ?Sized + 'static,
        F: FnMut(EntityId, &mut B),
    {
        let entities = self.polymorphic_entities::<B>();
        for entity in entities.iter() {
            if let Some(view) = self.polymorphic.resolve_mut::<B>(&mut self.store, *entity) {
                f(*entity, view);
            }
        }
    }

    /// Entities viewable as `B` that also hold every type in `Q`
    ///
    /// ```
    /// use partition_ecs::World;
    ///
    /// trait Drawable {
    ///     fn layer(&self) -> u8;
    /// }
    /// struct Sprite;
    /// impl Drawable for Sprite {
    ///     fn layer(&self) -> u8 { 2 }
    /// }
    /// struct Position(f32);
    ///
    /// let mut world = World::new();
    /// world.register_ancestor::<Sprite, dyn Drawable>(|s| s, |s| s);
    /// world.create_entity_with((Sprite, Position(4.0))).unwrap();
    /// world.create_entity_with((Sprite,)).unwrap();
    /// let drawn: Vec<_> = world
    ///     .get_components_with_base::<dyn Drawable, (Position,)>()
    ///     .unwrap()
    ///     .map(|(_, (d, (pos,)))| (d.layer(), pos.0))
    ///     .collect();
    /// assert_eq!(drawn, vec![(2, 4.0)]);
    /// ```
    pub fn get_components_with_base<B, Q>(&self) -> Result<BaseQueryIter<'_, B, Q>>
    where
        B: ?Sized + 'static,
        Q: ComponentSet,
    {
        let entities = self.query_entities(&Self::base_signature::<B, Q>())?;
        Ok(BaseQueryIter::new(&self.store, &self.polymorphic, entities))
    }

    /// Mutable base view joined with mutable components. `InvalidQuery` if a
    /// type in `Q` is registered as satisfying `B`.
    pub fn get_components_with_base_mut<B, Q>(&mut self) -> Result<BaseQueryIterMut<'_, B, Q>>
    where
        B: ?Sized + 'static,
        Q: ComponentSet,
    {
        let entities = self.query_entities(&Self::base_signature::<B, Q>())?;
        BaseQueryIterMut::new(&mut self.store, &self.polymorphic, entities)
    }

    fn base_signature<B: ?Sized + 'static, Q: ComponentSet>() -> QuerySignature {
        let mut signature: QuerySignature = smallvec![TypeId::of::<B>()];
        signature.extend(Q::type_ids());
        signature
    }

    pub fn polymorphic_for_entity<B: ?Sized + 'static>(&self, entity: EntityId) -> Result<&B> {
        self.ensure_alive(entity)?;
        self.polymorphic
            .resolve::<B>(&self.store, entity)
            .ok_or_else(|| EcsError::component_not_found::<B>(entity))
    }

    pub fn polymorphic_for_entity_mut<B: ?Sized + 'static>(
        &mut self,
        entity: EntityId,
    ) -> Result<&mut B> {
        self.ensure_alive(entity)?;
        self.polymorphic
            .resolve_mut::<B>(&mut self.store, entity)
            .ok_or_else(|| EcsError::component_not_found::<B>(entity))
    }

    pub fn has_polymorphic<B: ?Sized + 'static>(&self, entity: EntityId) -> bool {
        self.polymorphic.contains(entity, TypeId::of::<B>())
    }

    // ========== Processors ==========

    /// Register a processor; lower priorities run first
    pub fn add_processor<P: Processor>(&mut self, processor: P, priority: i32) -> ProcessorId {
        self.scheduler.add(Box::new(processor), priority)
    }

    /// Register a processor at the configured default priority
    pub fn add_processor_default<P: Processor>(&mut self, processor: P) -> ProcessorId {
        let priority = self.config.default_priority;
        self.add_processor(processor, priority)
    }

    pub fn remove_processor(&mut self, id: ProcessorId) -> Result<()> {
        self.scheduler.remove(id)
    }

    /// First registered processor of type `P`, if it is not currently running
    pub fn get_processor<P: Processor>(&self) -> Option<&P> {
        self.scheduler.get::<P>()
    }

    pub fn get_processor_mut<P: Processor>(&mut self) -> Option<&mut P> {
        self.scheduler.get_mut::<P>()
    }

    pub fn processor_count(&self) -> usize {
        self.scheduler.len()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Advance one driver tick
    ///
    /// Flushes deferred deletions, then runs every processor in priority
    /// order. A processor error stops the tick and is returned; the
    /// processor stays registered.
    pub fn process(&mut self, dt: Duration) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.process", processors = self.scheduler.len()).entered();

        self.flush_deletions();

        for id in self.scheduler.order() {
            let Some(mut slot) = self.scheduler.check_out(id, dt) else {
                continue;
            };

            #[cfg(feature = "profiling")]
            let _guard = info_span!("processor", name = slot.name, runs = slot.runs).entered();

            let mut outcome = Ok(());
            for _ in 0..slot.runs {
                outcome = slot.processor.process(self, slot.step);
                if outcome.is_err() {
                    break;
                }
            }
            self.scheduler.check_in(id, slot.processor);

            if let Err(err) = outcome {
                warn!(processor = slot.name, error = %err, "processor failed, aborting tick");
                return Err(err);
            }
        }
        Ok(())
    }

    // ========== Maintenance ==========

    /// Remove every entity and component and drop cached queries.
    /// Processors and ancestor registrations are kept.
    pub fn clear_database(&mut self) {
        let entities = self.entities.len();
        self.entities.clear();
        self.store.clear();
        self.polymorphic.clear();
        self.pending_deletions.clear();
        self.clear_query_cache();
        self.bump_generation();
        debug!(entities, "database cleared");
    }

    /// Read-only access to the component store, for diagnostics
    pub fn store(&self) -> &ComponentStore {
        &self.store
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
