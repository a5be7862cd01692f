//! Debugging helpers: world inspection and frame diagnostics

use std::collections::VecDeque;
use std::time::Duration;

use crate::entity::EntityId;
use crate::query::QueryCacheStats;
use crate::world::World;

/// World inspector for debugging
pub struct WorldInspector;

impl WorldInspector {
    /// Get total entity count
    pub fn entity_count(world: &World) -> usize {
        world.entity_count()
    }

    /// One entry per component partition, largest first
    pub fn partition_summary(world: &World) -> Vec<PartitionInfo> {
        let mut infos: Vec<PartitionInfo> = world
            .store()
            .partition_sizes()
            .into_iter()
            .map(|(type_name, entity_count)| PartitionInfo {
                type_name,
                entity_count,
            })
            .collect();
        infos.sort_by(|a, b| {
            b.entity_count
                .cmp(&a.entity_count)
                .then_with(|| a.type_name.cmp(b.type_name))
        });
        infos
    }

    /// Snapshot of the counters worth logging once per frame
    pub fn summary(world: &World) -> WorldSummary {
        WorldSummary {
            entities: world.entity_count(),
            partitions: world.store().partition_count(),
            processors: world.processor_count(),
            generation: world.generation(),
            query_cache: world.query_cache_stats(),
        }
    }

    /// Print world summary to console
    pub fn print_summary(world: &World) {
        let summary = Self::summary(world);
        println!("=== World Summary ===");
        println!("Entities: {}", summary.entities);
        println!("Partitions: {}", summary.partitions);
        println!("Processors: {}", summary.processors);
        println!("Generation: {}", summary.generation);
        if let Some(stats) = summary.query_cache {
            println!(
                "Query cache: {}/{} current, {} hits, {} misses",
                stats.num_current_queries, stats.num_cached_queries, stats.hits, stats.misses
            );
        }

        println!("\n=== Partitions ===");
        for info in Self::partition_summary(world) {
            println!("{}: {} entities", info.type_name, info.entity_count);
        }

        println!("\n=== Processors ===");
        for name in world.scheduler().names() {
            println!("{name}");
        }
    }

    /// Print entity details
    pub fn print_entity(world: &World, entity: EntityId) {
        match world.component_types_for_entity(entity) {
            Ok(types) => {
                println!("=== Entity {entity:?} ===");
                println!("Components: {} types", types.len());
            }
            Err(_) => println!("Entity {entity:?} not found"),
        }
    }
}

/// Partition information for debugging
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionInfo {
    pub type_name: &'static str,
    pub entity_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorldSummary {
    pub entities: usize,
    pub partitions: usize,
    pub processors: usize,
    pub generation: u64,
    /// `None` for a world without a query cache
    pub query_cache: Option<QueryCacheStats>,
}

/// Rolling frame-time statistics for a driver loop
#[derive(Clone, Debug)]
pub struct Diagnostics {
    frame_times: VecDeque<Duration>,
    max_samples: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Keeps the last 60 samples
    pub fn new() -> Self {
        Self::with_samples(60)
    }

    pub fn with_samples(max_samples: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record_frame(&mut self, frame_time: Duration) {
        self.frame_times.push_back(frame_time);
        if self.frame_times.len() > self.max_samples {
            self.frame_times.pop_front();
        }
    }

    pub fn sample_count(&self) -> usize {
        self.frame_times.len()
    }

    /// Average frame time, zero with no samples
    pub fn avg_frame_time(&self) -> Duration {
        if self.frame_times.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.frame_times.iter().sum();
        total / self.frame_times.len() as u32
    }

    /// Frames per second derived from the average frame time
    pub fn fps(&self) -> f32 {
        let avg = self.avg_frame_time().as_secs_f32();
        if avg > 0.0 {
            1.0 / avg
        } else {
            0.0
        }
    }

    pub fn min_frame_time(&self) -> Option<Duration> {
        self.frame_times.iter().copied().min()
    }

    pub fn max_frame_time(&self) -> Option<Duration> {
        self.frame_times.iter().copied().max()
    }

    /// Print diagnostics
    pub fn print(&self) {
        println!("=== Diagnostics ===");
        println!("FPS: {:.1}", self.fps());
        println!("Avg Frame Time: {:?}", self.avg_frame_time());
        if let (Some(min), Some(max)) = (self.min_frame_time(), self.max_frame_time()) {
            println!("Min Frame Time: {min:?}");
            println!("Max Frame Time: {max:?}");
        }
    }
}
