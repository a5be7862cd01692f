use partition_ecs::prelude::*;

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

fn spawn_movers(world: &mut World, count: usize) -> Vec<EntityId> {
    (0..count)
        .map(|i| {
            world
                .create_entity_with((
                    Position {
                        x: i as f32,
                        y: 0.0,
                    },
                    Velocity { x: 1.0, y: 1.0 },
                ))
                .unwrap()
        })
        .collect()
}

#[test]
fn test_query_cache_basic() {
    let mut world = World::cached();
    spawn_movers(&mut world, 100);

    // First query - builds cache
    let count1 = world.get_components::<(Position, Velocity)>().unwrap().count();
    assert_eq!(count1, 100);

    let stats = world.query_cache_stats().unwrap();
    assert_eq!(stats.num_cached_queries, 1);
    assert_eq!(stats.misses, 1);

    // Second query - served from cache
    let count2 = world.get_components::<(Position, Velocity)>().unwrap().count();
    assert_eq!(count2, 100);
    assert_eq!(world.query_cache_stats().unwrap().hits, 1);
}

#[test]
fn test_query_cache_invalidated_by_structural_change() {
    let mut world = World::cached();
    let movers = spawn_movers(&mut world, 50);

    assert_eq!(world.get_components::<(Position, Velocity)>().unwrap().count(), 50);

    world.remove_component::<Velocity>(movers[0]).unwrap();
    assert_eq!(world.get_components::<(Position, Velocity)>().unwrap().count(), 49);

    world.delete_entity(movers[1]).unwrap();
    assert_eq!(world.get_components::<(Position, Velocity)>().unwrap().count(), 48);

    spawn_movers(&mut world, 2);
    assert_eq!(world.get_components::<(Position, Velocity)>().unwrap().count(), 50);

    let stats = world.query_cache_stats().unwrap();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 4);
}

#[test]
fn test_in_place_edits_keep_cache_current() {
    let mut world = World::cached();
    spawn_movers(&mut world, 10);
    let generation = world.generation();

    for (_, (pos, vel)) in world.get_components_mut::<(Position, Velocity)>().unwrap() {
        pos.x += vel.x;
    }
    assert_eq!(world.generation(), generation);

    let total: f32 = world
        .get_components::<(Position, Velocity)>()
        .unwrap()
        .map(|(_, (pos, _))| pos.x)
        .sum();
    // 1 + 2 + .. + 10
    assert_eq!(total, 55.0);

    let stats = world.query_cache_stats().unwrap();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.num_current_queries, 1);
}

#[test]
fn test_signature_order_is_part_of_the_key() {
    let mut world = World::cached();
    spawn_movers(&mut world, 3);

    world.get_components::<(Position, Velocity)>().unwrap().count();
    world.get_components::<(Velocity, Position)>().unwrap().count();

    let stats = world.query_cache_stats().unwrap();
    assert_eq!(stats.num_cached_queries, 2);
    assert_eq!(stats.hits, 0);
}

#[test]
fn test_capacity_bounds_entries() {
    struct A;
    struct B;
    struct C;

    let config = WorldConfig {
        query_cache: true,
        query_cache_capacity: 2,
        ..WorldConfig::default()
    };
    let mut world = World::with_config(config).unwrap();
    world.create_entity_with((A, B, C)).unwrap();

    world.get_components::<(A, B)>().unwrap().count();
    world.get_components::<(B, C)>().unwrap().count();
    world.get_components::<(A, C)>().unwrap().count();

    let stats = world.query_cache_stats().unwrap();
    assert_eq!(stats.capacity, 2);
    assert_eq!(stats.num_cached_queries, 2);

    // (A, B) was least recently used and got evicted
    world.get_components::<(A, B)>().unwrap().count();
    assert_eq!(world.query_cache_stats().unwrap().misses, 4);
}

#[test]
fn test_clear_query_cache() {
    let mut world = World::cached();
    spawn_movers(&mut world, 5);
    world.get_components::<(Position, Velocity)>().unwrap().count();

    world.clear_query_cache();
    assert_eq!(world.query_cache_stats().unwrap(), QueryCacheStats {
        capacity: 128,
        ..QueryCacheStats::default()
    });
    assert_eq!(world.get_components::<(Position, Velocity)>().unwrap().count(), 5);
}

#[test]
fn test_plain_world_has_no_cache_stats() {
    let world = World::new();
    assert!(!world.is_cached());
    assert!(world.query_cache_stats().is_none());
}
