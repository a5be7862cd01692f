//! Processor trait and the priority scheduler that runs processors each tick

use std::any::Any;
use std::time::Duration;

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::{EcsError, Result};
use crate::time::FixedTime;
use crate::World;

/// Processor ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(pub u64);

/// How often a processor's body runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateRate {
    /// Once per `World::process` call, with the raw delta
    #[default]
    EveryTick,
    /// `hz` times per second of accumulated delta, with the fixed timestep
    Fixed { hz: u32 },
}

/// Processor trait
///
/// Processors get the world passed in on every call rather than keeping a
/// reference to it, so they are free to hold any state of their own.
pub trait Processor: 'static {
    /// Get processor name, used in log output
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Update rate, read once when the processor is registered
    fn update_rate(&self) -> UpdateRate {
        UpdateRate::EveryTick
    }

    /// Run processor logic against the world
    fn process(&mut self, world: &mut World, dt: Duration) -> Result<()>;
}

/// Object-safe downcasting for registered processors
pub(crate) trait AnyProcessor: Processor {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<P: Processor> AnyProcessor for P {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Boxed processor
pub(crate) type BoxedProcessor = Box<dyn AnyProcessor>;

/// Registration record
struct ProcessorEntry {
    id: ProcessorId,
    priority: i32,
    name: &'static str,
    clock: Option<FixedTime>,
    // None while the processor is checked out and running
    processor: Option<BoxedProcessor>,
}

/// A processor taken out of the scheduler for one tick
pub(crate) struct CheckedOut {
    pub processor: BoxedProcessor,
    pub name: &'static str,
    pub runs: u32,
    pub step: Duration,
}

/// Priority-ordered processor list
///
/// Lower priority values run first; equal priorities run in registration
/// order.
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<ProcessorEntry>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, processor: BoxedProcessor, priority: i32) -> ProcessorId {
        let id = ProcessorId(self.next_id);
        self.next_id += 1;

        let name = processor.name();
        let clock = match processor.update_rate() {
            UpdateRate::EveryTick => None,
            UpdateRate::Fixed { hz: 0 } => {
                warn!(processor = name, "fixed update rate of 0 Hz, running every tick");
                None
            }
            UpdateRate::Fixed { hz } => Some(FixedTime::new(hz)),
        };

        let position = self
            .entries
            .iter()
            .position(|entry| entry.priority > priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            position,
            ProcessorEntry {
                id,
                priority,
                name,
                clock,
                processor: Some(processor),
            },
        );
        debug!(processor = name, ?id, priority, "processor registered");
        id
    }

    pub fn remove(&mut self, id: ProcessorId) -> Result<()> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(EcsError::ProcessorNotFound(id))?;
        let entry = self.entries.remove(position);
        debug!(processor = entry.name, ?id, "processor removed");
        Ok(())
    }

    pub fn contains(&self, id: ProcessorId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in execution order
    pub fn order(&self) -> SmallVec<[ProcessorId; 16]> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    /// Take a processor out for this tick and work out how often it runs.
    /// `None` if it was removed or is already running.
    pub(crate) fn check_out(&mut self, id: ProcessorId, dt: Duration) -> Option<CheckedOut> {
        let entry = self.entries.iter_mut().find(|entry| entry.id == id)?;
        let processor = entry.processor.take()?;
        let (runs, step) = match entry.clock.as_mut() {
            Some(clock) => (clock.tick(dt), clock.timestep()),
            None => (1, dt),
        };
        Some(CheckedOut {
            processor,
            name: entry.name,
            runs,
            step,
        })
    }

    /// Put a processor back. Dropped if it was removed while running.
    pub(crate) fn check_in(&mut self, id: ProcessorId, processor: BoxedProcessor) {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => entry.processor = Some(processor),
            None => debug!(?id, "processor removed during its own tick, dropping"),
        }
    }

    /// First registered processor of type `P`
    pub fn get<P: Processor>(&self) -> Option<&P> {
        self.entries
            .iter()
            .filter_map(|entry| entry.processor.as_ref())
            .find_map(|processor| processor.as_any().downcast_ref::<P>())
    }

    pub fn get_mut<P: Processor>(&mut self) -> Option<&mut P> {
        self.entries
            .iter_mut()
            .filter_map(|entry| entry.processor.as_mut())
            .find_map(|processor| processor.as_any_mut().downcast_mut::<P>())
    }

    /// Names in execution order
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name).collect()
    }
}
