//! Headless demo: a baseplate, a stack of bricks and a motorized cart

use std::sync::Arc;
use std::time::{Duration, Instant};
use studwork_engine::prelude::*;
use tracing::info;

const FRAME: Duration = Duration::from_millis(16);

fn main() -> Result<(), PhysicsError> {
    // Initialize logging
    studwork_engine::init_logging();
    info!("Starting studwork demo");

    let config = match std::env::args().nth(1) {
        Some(path) => PhysicsConfig::load(path)?,
        None => PhysicsConfig::default(),
    };
    let mut ws = Workspace::new(config)?;

    let (parts, joints) = build_scene();
    ws.load(parts, joints);
    let motors: Vec<Arc<Joint>> = ws
        .joints()
        .filter(|joint| matches!(joint.kind(), JointKind::VelocityMotor { .. }))
        .cloned()
        .collect();

    ws.physics().start()?;

    let mut last_time = Instant::now();
    for frame in 0..600u32 {
        std::thread::sleep(FRAME);
        let now = Instant::now();
        let dt = now.duration_since(last_time).as_secs_f64();
        last_time = now;

        match frame {
            120 => {
                for motor in &motors {
                    ws.physics().set_motor_velocity(motor, 6.0);
                }
                info!("Cart motors engaged");
            }
            300 => {
                info!("Detonating explosion at the brick stack");
                ws.explode(DVec3::new(-12.0, 2.0, 0.0), 8.0, 400.0);
            }
            _ => {}
        }

        let report = ws.step(dt);
        for hit in &report.explosion_hits {
            if let Some(part) = hit.part() {
                info!(part = part.name(), distance = hit.distance, "Caught in explosion");
            }
        }
        if !report.fallen.is_empty() {
            info!(count = report.fallen.len(), "Parts fell out of the world");
        }
        if frame % 60 == 0 {
            info!(
                frame,
                synced = report.synced,
                parts = ws.part_count(),
                assemblies = ws.physics().assemblies().len(),
                "Frame"
            );
        }
    }

    ws.physics().stop();
    info!("Demo finished");
    Ok(())
}

fn build_scene() -> (Vec<Arc<Part>>, Vec<Arc<Joint>>) {
    let mut parts = Vec::new();
    let mut joints = Vec::new();

    let baseplate = Part::new(
        "Baseplate",
        PartProperties::default()
            .with_size(DVec3::new(128.0, 1.0, 128.0))
            .with_position(DVec3::new(0.0, -0.5, 0.0))
            .with_anchored(true)
            .with_surfaces(Surfaces::brick()),
    );
    parts.push(baseplate);

    // Bricks resting on each other auto-join through their studs
    for level in 0..5 {
        let brick = Part::new(
            format!("Brick{level}"),
            PartProperties::default()
                .with_position(DVec3::new(-12.0, 0.6 + level as f64 * 1.2, 0.0))
                .with_surfaces(Surfaces::brick()),
        );
        parts.push(brick);
    }

    let chassis = Part::new(
        "Chassis",
        PartProperties::default()
            .with_size(DVec3::new(4.0, 1.0, 8.0))
            .with_position(DVec3::new(12.0, 2.5, 0.0)),
    );
    let deck = Part::new(
        "Deck",
        PartProperties::default()
            .with_size(DVec3::new(4.0, 1.0, 4.0))
            .with_position(DVec3::new(12.0, 3.5, 0.0)),
    );
    joints.push(Joint::weld(&chassis, &deck));

    for (index, (x, z)) in [(-2.5, -3.0), (2.5, -3.0), (-2.5, 3.0), (2.5, 3.0)]
        .into_iter()
        .enumerate()
    {
        let wheel = Part::new(
            format!("Wheel{index}"),
            PartProperties::default()
                .with_size(DVec3::new(1.0, 2.0, 2.0))
                .with_position(DVec3::new(12.0 + x, 1.0, z)),
        );
        // Axle along the chassis X axis
        joints.push(Joint::new(
            JointKind::VelocityMotor { max_velocity: 0.0 },
            &chassis,
            &wheel,
            Pose::from_position(DVec3::new(x, -1.5, z)),
            Pose::IDENTITY,
        ));
        parts.push(wheel);
    }
    parts.push(chassis);
    parts.push(deck);

    (parts, joints)
}
