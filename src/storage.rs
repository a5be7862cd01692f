//! Component store: one sparse-set partition per component type.
//!
//! A partition keeps its entities and values in two parallel dense vectors,
//! so iterating a single component type walks contiguous memory and never
//! touches entities that lack it. The sparse side is a slotmap
//! `SecondaryMap`, which also rejects stale entity handles by version.

use std::any::{Any, TypeId};
use std::ptr::NonNull;

use ahash::AHashMap;
use slotmap::SecondaryMap;

use crate::component::Component;
use crate::entity::EntityId;

/// Dense storage for every instance of one component type
pub struct Partition<T> {
    sparse: SecondaryMap<EntityId, u32>,
    entities: Vec<EntityId>,
    data: Vec<T>,
}

impl<T: Component> Partition<T> {
    pub fn new() -> Self {
        Self {
            sparse: SecondaryMap::new(),
            entities: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Insert or replace. Returns the previous value if one was replaced.
    pub fn insert(&mut self, entity: EntityId, value: T) -> Option<T> {
        if let Some(&dense) = self.sparse.get(entity) {
            return Some(std::mem::replace(&mut self.data[dense as usize], value));
        }
        // One entry per slot index, and slot indices are u32, so this fits
        self.sparse.insert(entity, self.data.len() as u32);
        self.entities.push(entity);
        self.data.push(value);
        None
    }

    /// Swap-remove the value for `entity`
    pub fn remove(&mut self, entity: EntityId) -> Option<T> {
        let dense = self.sparse.remove(entity)? as usize;
        let last = self.data.len() - 1;
        if dense != last {
            let moved = self.entities[last];
            self.sparse.insert(moved, dense as u32);
        }
        self.entities.swap_remove(dense);
        Some(self.data.swap_remove(dense))
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.sparse.contains_key(entity)
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        let dense = *self.sparse.get(entity)?;
        self.data.get(dense as usize)
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        let dense = *self.sparse.get(entity)?;
        self.data.get_mut(dense as usize)
    }

    /// Pointer to the value for `entity` without borrowing the whole vector.
    ///
    /// # Safety
    /// `this` must point to a live partition, and the caller must not create
    /// two live `&mut` to the same value from the returned pointers.
    pub(crate) unsafe fn value_ptr(this: NonNull<Self>, entity: EntityId) -> Option<NonNull<T>> {
        let partition = this.as_ptr();
        let dense = *(*partition).sparse.get(entity)? as usize;
        if dense >= (*partition).data.len() {
            return None;
        }
        NonNull::new((*partition).data.as_mut_ptr().add(dense))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entities in dense order
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + Clone + '_ {
        self.entities.iter().copied().zip(self.data.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.entities.iter().copied().zip(self.data.iter_mut())
    }
}

impl<T: Component> Default for Partition<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased partition operations used where `T` is not known
pub(crate) trait ErasedPartition: 'static {
    fn remove_entity(&mut self, entity: EntityId) -> bool;
    fn contains(&self, entity: EntityId) -> bool;
    fn len(&self) -> usize;
    fn entities(&self) -> &[EntityId];
    fn get_any(&self, entity: EntityId) -> Option<&dyn Any>;
    fn get_any_mut(&mut self, entity: EntityId) -> Option<&mut dyn Any>;
    /// Pointer to one value without borrowing the dense vector
    fn value_any_ptr(&mut self, entity: EntityId) -> Option<NonNull<dyn Any>>;
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedPartition for Partition<T> {
    fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.remove(entity).is_some()
    }

    fn contains(&self, entity: EntityId) -> bool {
        Partition::contains(self, entity)
    }

    fn len(&self) -> usize {
        Partition::len(self)
    }

    fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    fn get_any(&self, entity: EntityId) -> Option<&dyn Any> {
        self.get(entity).map(|value| value as &dyn Any)
    }

    fn get_any_mut(&mut self, entity: EntityId) -> Option<&mut dyn Any> {
        self.get_mut(entity).map(|value| value as &mut dyn Any)
    }

    fn value_any_ptr(&mut self, entity: EntityId) -> Option<NonNull<dyn Any>> {
        // SAFETY: `self` is a live partition and no reference is created
        let ptr = unsafe { Partition::value_ptr(NonNull::from(self), entity)? };
        let ptr: NonNull<dyn Any> = ptr;
        Some(ptr)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Maps component type → partition
///
/// The store does not know which entities are alive; the world checks
/// liveness before calling in.
#[derive(Default)]
pub struct ComponentStore {
    partitions: AHashMap<TypeId, Box<dyn ErasedPartition>>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self {
            partitions: AHashMap::with_capacity(32),
        }
    }

    /// Insert or replace a component, creating its partition on first use
    pub fn insert<T: Component>(&mut self, entity: EntityId, value: T) -> Option<T> {
        self.partitions
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Partition::<T>::new()))
            .as_any_mut()
            .downcast_mut::<Partition<T>>()
            .and_then(|partition| partition.insert(entity, value))
    }

    pub fn remove<T: Component>(&mut self, entity: EntityId) -> Option<T> {
        self.partition_mut::<T>()?.remove(entity)
    }

    /// Remove `entity` from the partition for `type_id`
    pub fn remove_erased(&mut self, entity: EntityId, type_id: TypeId) -> bool {
        self.partitions
            .get_mut(&type_id)
            .is_some_and(|partition| partition.remove_entity(entity))
    }

    /// Remove `entity` from every partition in `types`, returning how many
    /// held it. An empty list is fine.
    pub fn remove_all(&mut self, entity: EntityId, types: &[TypeId]) -> usize {
        types
            .iter()
            .filter(|type_id| self.remove_erased(entity, **type_id))
            .count()
    }

    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.partition::<T>()?.get(entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.partition_mut::<T>()?.get_mut(entity)
    }

    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.contains(entity, TypeId::of::<T>())
    }

    pub fn contains(&self, entity: EntityId, type_id: TypeId) -> bool {
        self.partitions
            .get(&type_id)
            .is_some_and(|partition| partition.contains(entity))
    }

    pub fn partition<T: Component>(&self) -> Option<&Partition<T>> {
        self.partitions
            .get(&TypeId::of::<T>())?
            .as_any()
            .downcast_ref::<Partition<T>>()
    }

    pub fn partition_mut<T: Component>(&mut self) -> Option<&mut Partition<T>> {
        self.partitions
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<Partition<T>>()
    }

    /// Entities of a partition in dense order, or `None` if it never existed
    pub fn entities_of(&self, type_id: TypeId) -> Option<&[EntityId]> {
        self.partitions.get(&type_id).map(|partition| partition.entities())
    }

    pub fn partition_len(&self, type_id: TypeId) -> usize {
        self.partitions
            .get(&type_id)
            .map_or(0, |partition| partition.len())
    }

    pub(crate) fn get_any(&self, entity: EntityId, type_id: TypeId) -> Option<&dyn Any> {
        self.partitions.get(&type_id)?.get_any(entity)
    }

    pub(crate) fn get_any_mut(&mut self, entity: EntityId, type_id: TypeId) -> Option<&mut dyn Any> {
        self.partitions.get_mut(&type_id)?.get_any_mut(entity)
    }

    /// Raw handle to the partition for `type_id`, for iterators that hand
    /// out references into several partitions at once
    pub(crate) fn erased_ptr(&mut self, type_id: TypeId) -> Option<NonNull<dyn ErasedPartition>> {
        self.partitions
            .get_mut(&type_id)
            .map(|partition| NonNull::from(&mut **partition))
    }

    /// (type name, instance count) for every partition
    pub fn partition_sizes(&self) -> Vec<(&'static str, usize)> {
        self.partitions
            .values()
            .map(|partition| (partition.type_name(), partition.len()))
            .collect()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Drop every partition and every component
    pub fn clear(&mut self) {
        self.partitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityAllocator;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(u32);

    #[test]
    fn test_insert_replaces() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.create();
        let mut partition = Partition::new();

        assert_eq!(partition.insert(e, Health(10)), None);
        assert_eq!(partition.insert(e, Health(20)), Some(Health(10)));
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.get(e), Some(&Health(20)));
    }

    #[test]
    fn test_swap_remove_keeps_index_consistent() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<_> = (0..3).map(|_| alloc.create()).collect();
        let mut partition = Partition::new();
        for (i, id) in ids.iter().enumerate() {
            partition.insert(*id, Health(i as u32));
        }

        assert_eq!(partition.remove(ids[0]), Some(Health(0)));
        assert_eq!(partition.entities(), &[ids[2], ids[1]]);
        assert_eq!(partition.get(ids[2]), Some(&Health(2)));
        assert_eq!(partition.get(ids[1]), Some(&Health(1)));
        assert!(!partition.contains(ids[0]));
        assert_eq!(partition.remove(ids[0]), None);
    }

    #[test]
    fn test_insertion_order_iteration() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<_> = (0..5).map(|_| alloc.create()).collect();
        let mut partition = Partition::new();
        for (i, id) in ids.iter().enumerate() {
            partition.insert(*id, Health(i as u32));
        }

        let seen: Vec<_> = partition.iter().map(|(e, _)| e).collect();
        assert_eq!(seen, ids);
    }

    #[test]
    fn test_store_erased_removal() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.create();
        let mut store = ComponentStore::new();
        store.insert(e, Health(5));
        store.insert(e, 1.5f32);

        assert!(store.remove_erased(e, TypeId::of::<Health>()));
        assert!(!store.has::<Health>(e));
        assert!(store.has::<f32>(e));
        assert!(!store.remove_erased(e, TypeId::of::<Health>()));
        assert!(!store.remove_erased(e, TypeId::of::<u64>()));
    }

    #[test]
    fn test_remove_all_clears_listed_partitions() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.create();
        let mut store = ComponentStore::new();
        store.insert(e, Health(1));
        store.insert(e, 2.5f32);

        let types = [TypeId::of::<Health>(), TypeId::of::<f32>(), TypeId::of::<u8>()];
        assert_eq!(store.remove_all(e, &types), 2);
        assert!(!store.has::<Health>(e));
        assert!(!store.has::<f32>(e));
        assert_eq!(store.remove_all(e, &types), 0);
        assert_eq!(store.remove_all(e, &[]), 0);
    }

    #[test]
    fn test_get_any_downcasts() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.create();
        let mut store = ComponentStore::new();
        store.insert(e, Health(7));

        let any = store.get_any(e, TypeId::of::<Health>()).unwrap();
        assert_eq!(any.downcast_ref::<Health>(), Some(&Health(7)));
    }

    #[test]
    fn test_drop_called_on_remove() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut alloc = EntityAllocator::new();
        let a = alloc.create();
        let b = alloc.create();
        let mut store = ComponentStore::new();
        store.insert(a, Tracked);
        store.insert(b, Tracked);

        store.remove_erased(a, TypeId::of::<Tracked>());
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 1);
        store.clear();
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 2);
    }
}
