//! Polymorphic index: query a base view (usually a trait object) and match
//! every entity whose concrete component has been registered as satisfying it.
//!
//! Registration is explicit. `register::<Sprite, dyn Drawable>` records that
//! `Sprite` satisfies `dyn Drawable` and stores the projection functions.
//! Ancestors are resolved when a component is attached, so a query touches
//! one base partition and never walks a type hierarchy.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use ahash::AHashMap;
use slotmap::SecondaryMap;
use smallvec::SmallVec;

use crate::component::{Component, ComponentSet};
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::storage::{ComponentStore, ErasedPartition};

/// Projection from a type-erased component to base `B`
trait Projection<B: ?Sized> {
    fn project<'a>(&self, component: &'a dyn Any) -> Option<&'a B>;
    fn project_mut<'a>(&self, component: &'a mut dyn Any) -> Option<&'a mut B>;
}

/// Projection for one concrete component type `C`
struct Upcast<C, B: ?Sized> {
    as_ref: fn(&C) -> &B,
    as_mut: fn(&mut C) -> &mut B,
}

impl<C: Component, B: ?Sized + 'static> Projection<B> for Upcast<C, B> {
    fn project<'a>(&self, component: &'a dyn Any) -> Option<&'a B> {
        component.downcast_ref::<C>().map(self.as_ref)
    }

    fn project_mut<'a>(&self, component: &'a mut dyn Any) -> Option<&'a mut B> {
        component.downcast_mut::<C>().map(self.as_mut)
    }
}

type BoxedProjection<B: ?Sized> = Box<dyn Projection<B>>;

/// Entities satisfying one base, with the concrete types that satisfy it
#[derive(Default)]
struct BasePartition {
    sparse: SecondaryMap<EntityId, u32>,
    entities: Vec<EntityId>,
    // Attach order; the first entry is what queries return
    sources: Vec<SmallVec<[TypeId; 2]>>,
}

impl BasePartition {
    fn attach(&mut self, entity: EntityId, concrete: TypeId) {
        if let Some(&dense) = self.sparse.get(entity) {
            let sources = &mut self.sources[dense as usize];
            if !sources.contains(&concrete) {
                sources.push(concrete);
            }
            return;
        }
        // Keyed by slot index like `Partition`, so the length fits in u32
        self.sparse.insert(entity, self.entities.len() as u32);
        self.entities.push(entity);
        self.sources.push(smallvec::smallvec![concrete]);
    }

    fn detach(&mut self, entity: EntityId, concrete: TypeId) {
        let Some(&dense) = self.sparse.get(entity) else {
            return;
        };
        let dense = dense as usize;
        self.sources[dense].retain(|tid| *tid != concrete);
        if !self.sources[dense].is_empty() {
            return;
        }

        self.sparse.remove(entity);
        let last = self.entities.len() - 1;
        if dense != last {
            let moved = self.entities[last];
            self.sparse.insert(moved, dense as u32);
        }
        self.entities.swap_remove(dense);
        self.sources.swap_remove(dense);
    }

    fn primary_source(&self, entity: EntityId) -> Option<TypeId> {
        let dense = *self.sparse.get(entity)?;
        self.sources.get(dense as usize)?.first().copied()
    }
}

/// Ancestor registrations plus one partition per registered base
#[derive(Default)]
pub struct PolymorphicIndex {
    ancestors: AHashMap<TypeId, SmallVec<[TypeId; 4]>>,
    upcasts: AHashMap<(TypeId, TypeId), Box<dyn Any>>,
    bases: AHashMap<TypeId, BasePartition>,
}

impl PolymorphicIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `C` satisfies `B`. Returns false if it was already known,
    /// in which case the projections are replaced.
    pub fn register<C: Component, B: ?Sized + 'static>(
        &mut self,
        as_ref: fn(&C) -> &B,
        as_mut: fn(&mut C) -> &mut B,
    ) -> bool {
        let concrete = TypeId::of::<C>();
        let base = TypeId::of::<B>();
        let projection: BoxedProjection<B> = Box::new(Upcast { as_ref, as_mut });
        self.upcasts.insert((concrete, base), Box::new(projection));

        let ancestors = self.ancestors.entry(concrete).or_default();
        if ancestors.contains(&base) {
            return false;
        }
        ancestors.push(base);
        true
    }

    /// Bases registered for a concrete type
    pub fn ancestors_of(&self, concrete: TypeId) -> &[TypeId] {
        self.ancestors
            .get(&concrete)
            .map(|ancestors| ancestors.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_registrations(&self) -> bool {
        !self.ancestors.is_empty()
    }

    /// Fan an attach out to every base `concrete` satisfies
    pub fn on_attach(&mut self, entity: EntityId, concrete: TypeId) {
        let Some(ancestors) = self.ancestors.get(&concrete) else {
            return;
        };
        for base in ancestors {
            self.bases.entry(*base).or_default().attach(entity, concrete);
        }
    }

    /// Fan a detach out to every base `concrete` satisfies
    pub fn on_detach(&mut self, entity: EntityId, concrete: TypeId) {
        let Some(ancestors) = self.ancestors.get(&concrete) else {
            return;
        };
        for base in ancestors {
            if let Some(partition) = self.bases.get_mut(base) {
                partition.detach(entity, concrete);
            }
        }
    }

    /// Attach a single (entity, concrete) pair to one base; used to backfill
    /// after a late registration.
    pub(crate) fn attach_to_base(&mut self, entity: EntityId, concrete: TypeId, base: TypeId) {
        self.bases.entry(base).or_default().attach(entity, concrete);
    }

    pub fn entities_of(&self, base: TypeId) -> &[EntityId] {
        self.bases
            .get(&base)
            .map(|partition| partition.entities.as_slice())
            .unwrap_or(&[])
    }

    /// Base partition entities, `None` if nothing was ever attached to `base`
    pub fn base_entities(&self, base: TypeId) -> Option<&[EntityId]> {
        self.bases
            .get(&base)
            .map(|partition| partition.entities.as_slice())
    }

    /// Concrete types registered as satisfying `base`
    pub fn satisfying(&self, base: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.ancestors
            .iter()
            .filter(move |(_, ancestors)| ancestors.contains(&base))
            .map(|(concrete, _)| *concrete)
    }

    pub(crate) fn primary_source_of(&self, base: TypeId, entity: EntityId) -> Option<TypeId> {
        self.bases.get(&base)?.primary_source(entity)
    }

    pub fn contains(&self, entity: EntityId, base: TypeId) -> bool {
        self.bases
            .get(&base)
            .is_some_and(|partition| partition.sparse.contains_key(entity))
    }

    /// View `entity` as `B` through its earliest-attached satisfying component
    pub fn resolve<'s, B: ?Sized + 'static>(
        &self,
        store: &'s ComponentStore,
        entity: EntityId,
    ) -> Option<&'s B> {
        let base = TypeId::of::<B>();
        let concrete = self.bases.get(&base)?.primary_source(entity)?;
        let projection = self.projection::<B>(concrete, base)?;
        projection.project(store.get_any(entity, concrete)?)
    }

    pub fn resolve_mut<'s, B: ?Sized + 'static>(
        &self,
        store: &'s mut ComponentStore,
        entity: EntityId,
    ) -> Option<&'s mut B> {
        let base = TypeId::of::<B>();
        let concrete = self.bases.get(&base)?.primary_source(entity)?;
        let projection = self.projection::<B>(concrete, base)?;
        projection.project_mut(store.get_any_mut(entity, concrete)?)
    }

    fn projection<B: ?Sized + 'static>(
        &self,
        concrete: TypeId,
        base: TypeId,
    ) -> Option<&BoxedProjection<B>> {
        self.upcasts
            .get(&(concrete, base))?
            .downcast_ref::<BoxedProjection<B>>()
    }

    /// Drop base partitions, keep registrations
    pub fn clear(&mut self) {
        self.bases.clear();
    }
}

/// Iterator over `(EntityId, &B)` for a polymorphic query
pub struct PolyIter<'w, B: ?Sized + 'static> {
    store: &'w ComponentStore,
    index: &'w PolymorphicIndex,
    entities: Rc<[EntityId]>,
    cursor: usize,
    _marker: std::marker::PhantomData<fn() -> &'w B>,
}

impl<'w, B: ?Sized + 'static> PolyIter<'w, B> {
    pub(crate) fn new(
        store: &'w ComponentStore,
        index: &'w PolymorphicIndex,
        entities: Rc<[EntityId]>,
    ) -> Self {
        Self {
            store,
            index,
            entities,
            cursor: 0,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'w, B: ?Sized + 'static> Clone for PolyIter<'w, B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            index: self.index,
            entities: Rc::clone(&self.entities),
            cursor: self.cursor,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'w, B: ?Sized + 'static> Iterator for PolyIter<'w, B> {
    type Item = (EntityId, &'w B);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entity = *self.entities.get(self.cursor)?;
            self.cursor += 1;
            if let Some(view) = self.index.resolve::<B>(self.store, entity) {
                return Some((entity, view));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len().saturating_sub(self.cursor)))
    }
}

/// Iterator over `(EntityId, (&B, (&A, ..)))`: a base view joined with
/// concrete components
pub struct BaseQueryIter<'w, B: ?Sized + 'static, Q: ComponentSet> {
    store: &'w ComponentStore,
    index: &'w PolymorphicIndex,
    partitions: Option<Q::Partitions<'w>>,
    entities: Rc<[EntityId]>,
    cursor: usize,
    _marker: PhantomData<fn() -> &'w B>,
}

impl<'w, B: ?Sized + 'static, Q: ComponentSet> BaseQueryIter<'w, B, Q> {
    pub(crate) fn new(
        store: &'w ComponentStore,
        index: &'w PolymorphicIndex,
        entities: Rc<[EntityId]>,
    ) -> Self {
        Self {
            store,
            index,
            partitions: Q::partitions(store),
            entities,
            cursor: 0,
            _marker: PhantomData,
        }
    }
}

impl<'w, B: ?Sized + 'static, Q: ComponentSet> Iterator for BaseQueryIter<'w, B, Q> {
    type Item = (EntityId, (&'w B, Q::Refs<'w>));

    fn next(&mut self) -> Option<Self::Item> {
        let partitions = self.partitions?;
        loop {
            let entity = *self.entities.get(self.cursor)?;
            self.cursor += 1;
            let Some(view) = self.index.resolve::<B>(self.store, entity) else {
                continue;
            };
            if let Some(refs) = Q::fetch(partitions, entity) {
                return Some((entity, (view, refs)));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len().saturating_sub(self.cursor)))
    }
}

/// Mutable counterpart of [`BaseQueryIter`]
pub struct BaseQueryIterMut<'w, B: ?Sized + 'static, Q: ComponentSet> {
    index: &'w PolymorphicIndex,
    sources: SmallVec<[(TypeId, NonNull<dyn ErasedPartition>); 4]>,
    partitions: Option<Q::PartitionsMut>,
    entities: Rc<[EntityId]>,
    cursor: usize,
    _marker: PhantomData<(&'w mut ComponentStore, fn() -> &'w mut B)>,
}

impl<'w, B: ?Sized + 'static, Q: ComponentSet> BaseQueryIterMut<'w, B, Q> {
    /// Fails when a type in `Q` is itself registered as satisfying `B`,
    /// since the base view and the component could be the same value.
    /// `entities` must not contain duplicates.
    pub(crate) fn new(
        store: &'w mut ComponentStore,
        index: &'w PolymorphicIndex,
        entities: Rc<[EntityId]>,
    ) -> Result<Self> {
        let base = TypeId::of::<B>();
        let requested = Q::type_ids();
        let mut sources = SmallVec::new();
        for concrete in index.satisfying(base) {
            if requested.contains(&concrete) {
                return Err(EcsError::InvalidQuery(format!(
                    "a queried component is registered as {}; it would alias the base view",
                    std::any::type_name::<B>()
                )));
            }
            if let Some(partition) = store.erased_ptr(concrete) {
                sources.push((concrete, partition));
            }
        }

        Ok(Self {
            index,
            sources,
            partitions: Q::partitions_mut(store),
            entities,
            cursor: 0,
            _marker: PhantomData,
        })
    }

    fn view(&self, entity: EntityId) -> Option<&'w mut B> {
        let base = TypeId::of::<B>();
        let concrete = self.index.primary_source_of(base, entity)?;
        let (_, source) = self.sources.iter().find(|(tid, _)| *tid == concrete)?;
        let projection = self.index.projection::<B>(concrete, base)?;
        // SAFETY: the store is exclusively borrowed for 'w, no queried
        // partition is a source partition, and each entity is visited once.
        let value = unsafe { (*source.as_ptr()).value_any_ptr(entity)? };
        projection.project_mut(unsafe { &mut *value.as_ptr() })
    }
}

impl<'w, B: ?Sized + 'static, Q: ComponentSet> Iterator for BaseQueryIterMut<'w, B, Q> {
    type Item = (EntityId, (&'w mut B, Q::Muts<'w>));

    fn next(&mut self) -> Option<Self::Item> {
        let partitions = self.partitions?;
        loop {
            let entity = *self.entities.get(self.cursor)?;
            self.cursor += 1;
            let Some(view) = self.view(entity) else {
                continue;
            };
            // SAFETY: as in `view`; `Q`'s types are pairwise distinct
            if let Some(muts) = unsafe { Q::fetch_mut(partitions, entity) } {
                return Some((entity, (view, muts)));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len().saturating_sub(self.cursor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityAllocator;

    trait Shape {
        fn area(&self) -> f32;
        fn scale(&mut self, by: f32);
    }

    struct Square(f32);
    struct Circle(f32);

    impl Shape for Square {
        fn area(&self) -> f32 {
            self.0 * self.0
        }
        fn scale(&mut self, by: f32) {
            self.0 *= by;
        }
    }

    impl Shape for Circle {
        fn area(&self) -> f32 {
            3.0 * self.0 * self.0
        }
        fn scale(&mut self, by: f32) {
            self.0 *= by;
        }
    }

    fn index_with_shapes() -> PolymorphicIndex {
        let mut index = PolymorphicIndex::new();
        assert!(index.register::<Square, dyn Shape>(|s| s, |s| s));
        assert!(index.register::<Circle, dyn Shape>(|c| c, |c| c));
        index
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut index = index_with_shapes();
        assert!(!index.register::<Square, dyn Shape>(|s| s, |s| s));
        assert_eq!(index.ancestors_of(TypeId::of::<Square>()).len(), 1);
        assert!(index.ancestors_of(TypeId::of::<u8>()).is_empty());
    }

    #[test]
    fn test_resolve_through_concrete_partition() {
        let mut alloc = EntityAllocator::new();
        let mut store = ComponentStore::new();
        let mut index = index_with_shapes();

        let e = alloc.create();
        store.insert(e, Square(2.0));
        index.on_attach(e, TypeId::of::<Square>());

        let shape = index.resolve::<dyn Shape>(&store, e).unwrap();
        assert_eq!(shape.area(), 4.0);

        index.resolve_mut::<dyn Shape>(&mut store, e).unwrap().scale(2.0);
        assert_eq!(store.get::<Square>(e).unwrap().0, 4.0);
    }

    #[test]
    fn test_first_attached_source_wins() {
        let mut alloc = EntityAllocator::new();
        let mut store = ComponentStore::new();
        let mut index = index_with_shapes();

        let e = alloc.create();
        store.insert(e, Circle(1.0));
        index.on_attach(e, TypeId::of::<Circle>());
        store.insert(e, Square(1.0));
        index.on_attach(e, TypeId::of::<Square>());

        assert_eq!(index.entities_of(TypeId::of::<dyn Shape>()), &[e]);
        assert_eq!(index.resolve::<dyn Shape>(&store, e).unwrap().area(), 3.0);

        index.on_detach(e, TypeId::of::<Circle>());
        assert_eq!(index.resolve::<dyn Shape>(&store, e).unwrap().area(), 1.0);

        index.on_detach(e, TypeId::of::<Square>());
        assert!(!index.contains(e, TypeId::of::<dyn Shape>()));
    }

    #[test]
    fn test_detach_keeps_dense_index_consistent() {
        let mut alloc = EntityAllocator::new();
        let mut index = index_with_shapes();
        let ids: Vec<_> = (0..3).map(|_| alloc.create()).collect();
        for id in &ids {
            index.on_attach(*id, TypeId::of::<Square>());
        }

        index.on_detach(ids[0], TypeId::of::<Square>());
        let base = TypeId::of::<dyn Shape>();
        assert_eq!(index.entities_of(base), &[ids[2], ids[1]]);
        assert!(index.contains(ids[2], base));
        assert!(!index.contains(ids[0], base));
    }
}
