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

//! Crate-level scenario tests spanning several modules

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    #![allow(clippy::module_inception)]
    use crate::{EcsError, EntityId, Result, World};
    use std::any::TypeId;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Mass(f32);

    fn populate(world: &mut World) -> Result<(EntityId, EntityId, EntityId)> {
        let a = world.create_entity_with((
            Position { x: 0.0, y: 0.0 },
            Velocity { x: 1.0, y: 0.0 },
        ))?;
        let b = world.create_entity_with((Position { x: 5.0, y: 5.0 },))?;
        let c = world.create_entity_with((
            Position { x: 2.0, y: 2.0 },
            Velocity { x: 0.0, y: 1.0 },
            Mass(3.0),
        ))?;
        Ok((a, b, c))
    }

    fn sorted(mut entities: Vec<EntityId>) -> Vec<EntityId> {
        entities.sort();
        entities
    }

    #[test]
    fn test_three_entity_queries() -> Result<()> {
        for mut world in [World::new(), World::cached()] {
            let (a, b, c) = populate(&mut world)?;

            let positions: Vec<_> = world.get_component::<Position>().map(|(e, _)| e).collect();
            assert_eq!(positions, vec![a, b, c]);

            let moving: Vec<_> = world
                .get_components::<(Position, Velocity)>()?
                .map(|(e, _)| e)
                .collect();
            assert_eq!(sorted(moving), sorted(vec![a, c]));

            let heavy: Vec<_> = world
                .get_components::<(Velocity, Mass)>()?
                .map(|(e, (_, mass))| (e, mass.0))
                .collect();
            assert_eq!(heavy, vec![(c, 3.0)]);
        }
        Ok(())
    }

    #[test]
    fn test_single_type_query_matches_one_tuple() -> Result<()> {
        let mut world = World::new();
        populate(&mut world)?;

        let streamed: Vec<_> = world
            .get_component::<Velocity>()
            .map(|(e, v)| (e, *v))
            .collect();
        let queried: Vec<_> = world
            .get_components::<(Velocity,)>()?
            .map(|(e, (v,))| (e, *v))
            .collect();
        assert_eq!(streamed, queried);
        Ok(())
    }

    #[test]
    fn test_cached_and_plain_worlds_agree() -> Result<()> {
        let mut plain = World::new();
        let mut cached = World::cached();

        for world in [&mut plain, &mut cached] {
            let (a, _, c) = populate(world)?;
            world.remove_component::<Velocity>(a)?;
            world.add_component(a, Mass(1.0))?;
            world.delete_entity(c)?;
            world.create_entity_with((Velocity { x: 9.0, y: 9.0 }, Mass(9.0)))?;
        }

        let collect = |world: &World| -> Result<Vec<(f32, f32)>> {
            Ok(world
                .get_components::<(Mass, Velocity)>()?
                .map(|(_, (m, v))| (m.0, v.x))
                .collect())
        };
        assert_eq!(collect(&plain)?, collect(&cached)?);
        assert_eq!(collect(&plain)?, vec![(9.0, 9.0)]);
        Ok(())
    }

    #[test]
    fn test_cache_reflects_mutations() -> Result<()> {
        let mut world = World::cached();
        let (a, _, c) = populate(&mut world)?;

        let count = |world: &World| world.get_components::<(Position, Velocity)>().map(|q| q.count());
        assert_eq!(count(&world)?, 2);
        assert_eq!(count(&world)?, 2);

        world.remove_component::<Velocity>(a)?;
        assert_eq!(count(&world)?, 1);

        world.delete_entity(c)?;
        assert_eq!(count(&world)?, 0);

        let stats = world.query_cache_stats().expect("cached world");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 3);
        Ok(())
    }

    #[test]
    fn test_mutable_query_writes_through() -> Result<()> {
        let mut world = World::cached();
        let (a, b, c) = populate(&mut world)?;

        for (_, (pos, vel)) in world.get_components_mut::<(Position, Velocity)>()? {
            pos.x += vel.x;
            pos.y += vel.y;
        }

        assert_eq!(
            *world.component_for_entity::<Position>(a)?,
            Position { x: 1.0, y: 0.0 }
        );
        assert_eq!(
            *world.component_for_entity::<Position>(b)?,
            Position { x: 5.0, y: 5.0 }
        );
        assert_eq!(
            *world.component_for_entity::<Position>(c)?,
            Position { x: 2.0, y: 3.0 }
        );
        Ok(())
    }

    #[test]
    fn test_invalid_queries() {
        let world = World::new();
        assert!(matches!(
            world.get_components::<()>(),
            Err(EcsError::InvalidQuery(_))
        ));
        assert!(matches!(
            world.get_components::<(Position, Position)>(),
            Err(EcsError::InvalidQuery(_))
        ));
        assert!(matches!(
            world.query_entities(&[]),
            Err(EcsError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_query_over_missing_partition_is_empty() -> Result<()> {
        let mut world = World::new();
        populate(&mut world)?;
        struct Unused;

        assert_eq!(world.get_components::<(Position, Unused)>()?.count(), 0);
        assert_eq!(world.get_component::<Unused>().count(), 0);
        Ok(())
    }

    #[test]
    fn test_query_entities_by_type_ids() -> Result<()> {
        let mut world = World::new();
        let (_, _, c) = populate(&mut world)?;

        let ids = world.query_entities(&[TypeId::of::<Mass>(), TypeId::of::<Position>()])?;
        assert_eq!(&*ids, &[c]);
        Ok(())
    }

    #[test]
    fn test_component_lookup_errors() -> Result<()> {
        let mut world = World::new();
        let (_, b, _) = populate(&mut world)?;

        assert!(matches!(
            world.component_for_entity::<Velocity>(b),
            Err(EcsError::ComponentNotFound { entity, .. }) if entity == b
        ));
        assert!(world.try_component::<Velocity>(b).is_none());

        world.delete_entity(b)?;
        assert_eq!(
            world.component_for_entity::<Position>(b),
            Err(EcsError::UnknownEntity(b))
        );
        Ok(())
    }

    #[test]
    fn test_has_components() -> Result<()> {
        let mut world = World::new();
        let (a, b, c) = populate(&mut world)?;

        assert!(world.has_components::<(Position, Velocity)>(a));
        assert!(!world.has_components::<(Position, Velocity)>(b));
        assert!(world.has_components::<(Position, Velocity, Mass)>(c));
        assert!(world.has_component::<Mass>(c));
        assert!(!world.has_component::<Mass>(a));
        Ok(())
    }

    #[test]
    fn test_component_types_for_entity_in_attach_order() -> Result<()> {
        let mut world = World::new();
        let (_, _, c) = populate(&mut world)?;

        assert_eq!(
            world.component_types_for_entity(c)?,
            &[
                TypeId::of::<Position>(),
                TypeId::of::<Velocity>(),
                TypeId::of::<Mass>()
            ]
        );
        Ok(())
    }

    #[test]
    fn test_replace_component_keeps_single_entry() -> Result<()> {
        let mut world = World::new();
        let e = world.create_entity();
        world.add_component(e, Mass(1.0))?;
        world.add_component(e, Mass(2.0))?;

        assert_eq!(world.get_component::<Mass>().count(), 1);
        assert_eq!(world.component_for_entity::<Mass>(e)?.0, 2.0);
        assert_eq!(world.component_types_for_entity(e)?.len(), 1);
        Ok(())
    }
}
