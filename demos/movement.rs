//! Example: two processors at different fixed rates, driven headless
//!
//! A movement processor integrates velocities at 15 Hz and a render
//! processor copies physics positions into anything drawable at 60 Hz.
//! Keyboard input is replaced by a short script of velocity changes, and
//! the clock is paused and then slowed for a few frames.
//!
//! Run with: RUST_LOG=debug cargo run --example movement

use std::time::Duration;

use partition_ecs::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

const RESOLUTION: (f32, f32) = (720.0, 480.0);

#[derive(Debug, Default)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug)]
struct PhysicsBody {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Anything the render processor can place on screen
trait Renderable {
    fn set_position(&mut self, x: f32, y: f32);
    fn describe(&self) -> String;
}

#[derive(Debug)]
struct Sprite {
    color: &'static str,
    x: f32,
    y: f32,
}

impl Renderable for Sprite {
    fn set_position(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    fn describe(&self) -> String {
        format!("{} sprite at ({:.1}, {:.1})", self.color, self.x, self.y)
    }
}

struct MovementProcessor {
    max_x: f32,
    max_y: f32,
}

impl Processor for MovementProcessor {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn update_rate(&self) -> UpdateRate {
        UpdateRate::Fixed { hz: 15 }
    }

    fn process(&mut self, world: &mut World, dt: Duration) -> Result<()> {
        let step = dt.as_secs_f32();
        for (_, (vel, body)) in world.get_components_mut::<(Velocity, PhysicsBody)>()? {
            body.x = (body.x + vel.x * step).clamp(0.0, self.max_x - body.width);
            body.y = (body.y + vel.y * step).clamp(0.0, self.max_y - body.height);
        }
        Ok(())
    }
}

struct RenderProcessor;

impl Processor for RenderProcessor {
    fn name(&self) -> &'static str {
        "render"
    }

    fn update_rate(&self) -> UpdateRate {
        UpdateRate::Fixed { hz: 60 }
    }

    fn process(&mut self, world: &mut World, _dt: Duration) -> Result<()> {
        for (_, (renderable, (body,))) in
            world.get_components_with_base_mut::<dyn Renderable, (PhysicsBody,)>()?
        {
            renderable.set_position(body.x, body.y);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut world = World::cached();
    world.register_ancestor::<Sprite, dyn Renderable>(|s| s, |s| s);

    let player = world.create_entity_with((
        Velocity::default(),
        Sprite {
            color: "red",
            x: 100.0,
            y: 100.0,
        },
        PhysicsBody {
            x: 100.0,
            y: 100.0,
            width: 64.0,
            height: 64.0,
        },
    ))?;
    let enemy = world.create_entity_with((
        Sprite {
            color: "blue",
            x: 400.0,
            y: 250.0,
        },
        PhysicsBody {
            x: 400.0,
            y: 250.0,
            width: 64.0,
            height: 64.0,
        },
    ))?;

    world.add_processor(
        MovementProcessor {
            max_x: RESOLUTION.0,
            max_y: RESOLUTION.1,
        },
        0,
    );
    world.add_processor(RenderProcessor, 1);

    // (frame, velocity) pairs standing in for key presses and releases
    let script = [(0, (300.0, 0.0)), (60, (0.0, 300.0)), (120, (0.0, 0.0))];
    // Frames where the game is paused, then played back at half speed
    let (pause_at, resume_at, slow_until) = (30, 45, 75);

    let mut time = Time::new();
    let mut diagnostics = Diagnostics::new();
    let frame = Duration::from_secs_f64(1.0 / 60.0);

    for frame_index in 0..180 {
        if let Some((_, (x, y))) = script.iter().find(|(at, _)| *at == frame_index) {
            let vel = world.component_for_entity_mut::<Velocity>(player)?;
            vel.x = *x;
            vel.y = *y;
        }

        match frame_index {
            f if f == pause_at => time.pause(),
            f if f == resume_at => time.set_time_scale(0.5),
            f if f == slow_until => time.resume(),
            _ => {}
        }
        time.advance(frame);
        if time.is_paused() {
            continue;
        }
        world.process(time.delta())?;
        diagnostics.record_frame(time.delta());
    }

    for (entity, renderable) in world.get_polymorphic::<dyn Renderable>() {
        let role = if entity == enemy { "enemy" } else { "player" };
        info!(role, "{}", renderable.describe());
        println!("{role}: {}", renderable.describe());
    }

    println!("Simulated {:?} over {} frames", time.elapsed(), time.frame_count());
    WorldInspector::print_summary(&world);
    diagnostics.print();
    Ok(())
}
