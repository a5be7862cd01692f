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

//! Component, ComponentSet and Bundle traits
//!
//! Components are data attached to entities.
//! Component sets name the types a multi-component query asks for.
//! Bundles group multiple components for creating an entity in one call.

use std::any::TypeId;
use std::ptr::NonNull;

use smallvec::{smallvec, SmallVec};

use crate::entity::EntityId;
use crate::error::Result;
use crate::storage::{ComponentStore, Partition};
use crate::world::World;

/// Maximum number of components supported by tuple implementations
pub const MAX_QUERY_COMPONENTS: usize = 8;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data). The world is
/// single-threaded, so `Send`/`Sync` are not required.
pub trait Component: 'static {}

/// Automatically implement Component for all valid types
impl<T: 'static> Component for T {}

/// An ordered tuple of component types used as a query
pub trait ComponentSet: 'static {
    /// Borrowed partitions, resolved once per query
    type Partitions<'w>: Copy
    where
        Self: 'w;

    /// Raw partition pointers for mutable iteration
    type PartitionsMut: Copy;

    /// Tuple of shared references yielded per entity
    type Refs<'w>
    where
        Self: 'w;

    /// Tuple of mutable references yielded per entity
    type Muts<'w>
    where
        Self: 'w;

    /// Type ids in declaration order
    fn type_ids() -> SmallVec<[TypeId; MAX_QUERY_COMPONENTS]>;

    /// Look up every partition, `None` if any type has never been stored
    fn partitions(store: &ComponentStore) -> Option<Self::Partitions<'_>>;

    fn partitions_mut(store: &mut ComponentStore) -> Option<Self::PartitionsMut>;

    fn fetch<'w>(partitions: Self::Partitions<'w>, entity: EntityId) -> Option<Self::Refs<'w>>;

    /// # Safety
    /// The pointers must come from `partitions_mut` on a store that is
    /// exclusively borrowed for `'w`, the type ids must be pairwise
    /// distinct, and each entity may be fetched at most once per borrow.
    unsafe fn fetch_mut<'w>(
        partitions: Self::PartitionsMut,
        entity: EntityId,
    ) -> Option<Self::Muts<'w>>;
}

// Macro for tuple ComponentSet implementations
macro_rules! impl_component_set {
    ($($T:ident),*) => {
        impl<$($T: Component),*> ComponentSet for ($($T,)*) {
            type Partitions<'w> = ($(&'w Partition<$T>,)*);
            type PartitionsMut = ($(NonNull<Partition<$T>>,)*);
            type Refs<'w> = ($(&'w $T,)*);
            type Muts<'w> = ($(&'w mut $T,)*);

            fn type_ids() -> SmallVec<[TypeId; MAX_QUERY_COMPONENTS]> {
                smallvec![$(TypeId::of::<$T>()),*]
            }

            #[allow(unused_variables)]
            fn partitions(store: &ComponentStore) -> Option<Self::Partitions<'_>> {
                Some(($(store.partition::<$T>()?,)*))
            }

            #[allow(unused_variables)]
            fn partitions_mut(store: &mut ComponentStore) -> Option<Self::PartitionsMut> {
                Some(($(NonNull::from(store.partition_mut::<$T>()?),)*))
            }

            #[allow(non_snake_case, unused_variables)]
            fn fetch<'w>(partitions: Self::Partitions<'w>, entity: EntityId) -> Option<Self::Refs<'w>> {
                let ($($T,)*) = partitions;
                Some(($($T.get(entity)?,)*))
            }

            #[allow(non_snake_case, unused_variables)]
            unsafe fn fetch_mut<'w>(
                partitions: Self::PartitionsMut,
                entity: EntityId,
            ) -> Option<Self::Muts<'w>> {
                let ($($T,)*) = partitions;
                Some(($(&mut *Partition::value_ptr($T, entity)?.as_ptr(),)*))
            }
        }
    };
}

// The empty set exists so that an empty query is a runtime error, not a
// missing impl.
impl_component_set!();
impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

/// Bundle of components
///
/// Allows creating entities with multiple components at once.
pub trait Bundle: 'static {
    /// Attach every component to `entity`
    fn attach(self, world: &mut World, entity: EntityId) -> Result<()>;
}

// DO NOT implement Bundle for T: Component
// This conflicts with tuple implementations
// Instead, implement only for tuples
macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            #[allow(non_snake_case, unused_variables)]
            fn attach(self, world: &mut World, entity: EntityId) -> Result<()> {
                let ($($T,)*) = self;
                $(world.add_component(entity, $T)?;)*
                Ok(())
            }
        }
    };
}

impl_bundle!();
impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
