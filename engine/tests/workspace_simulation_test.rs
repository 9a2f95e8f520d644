//! Workspace-level simulation through the public API

use std::time::{Duration, Instant};
use studwork_engine::prelude::*;
use tracing::info;

const DT: f64 = 1.0 / 60.0;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

#[test]
fn test_part_falls_and_rests_on_baseplate() {
    init_logging();

    let mut ws = Workspace::new(PhysicsConfig::default()).unwrap();
    let baseplate = ws.add_part(Part::new(
        "Baseplate",
        PartProperties::default()
            .with_size(DVec3::new(64.0, 1.0, 64.0))
            .with_position(DVec3::new(0.0, -0.5, 0.0))
            .with_anchored(true),
    ));
    let brick = ws.add_part(Part::new(
        "Brick",
        PartProperties::default().with_position(DVec3::new(0.0, 10.0, 0.0)),
    ));

    // Run physics for 2 seconds
    for i in 0..120 {
        ws.physics().tick(DT);
        ws.step(DT);
        if i % 30 == 0 {
            info!("Step {}: brick y={:.4}", i, brick.pose().position.y);
        }
    }

    let y = brick.pose().position.y;
    assert!(y < 10.0, "brick should have fallen, y = {y}");
    assert!(y > 0.0, "brick should rest on the baseplate, y = {y}");
    assert_eq!(baseplate.pose().position, DVec3::new(0.0, -0.5, 0.0));
}

#[test]
fn test_fallen_parts_leave_the_workspace() {
    init_logging();

    let config = PhysicsConfig {
        destroy_height: -20.0,
        ..Default::default()
    };
    let mut ws = Workspace::new(config).unwrap();
    let a = Part::new("A", PartProperties::default().with_position(DVec3::new(0.0, 5.0, 0.0)));
    let b = Part::new("B", PartProperties::default().with_position(DVec3::new(0.0, 6.2, 0.0)));
    ws.load([a.clone(), b.clone()], [Joint::weld(&a, &b)]);

    let mut fallen = Vec::new();
    for _ in 0..120 {
        ws.physics().tick(DT);
        fallen.extend(ws.step(DT).fallen);
    }

    assert_eq!(fallen.len(), 2);
    assert_eq!(ws.part_count(), 0);
    assert_eq!(ws.joint_count(), 0);
    ws.physics().tick(0.0);
    assert!(ws.physics().assemblies().is_empty());
}

#[test]
fn test_background_thread_drives_simulation() {
    init_logging();

    let mut ws = Workspace::new(PhysicsConfig::default()).unwrap();
    let brick = ws.add_part(Part::new(
        "Brick",
        PartProperties::default().with_position(DVec3::new(0.0, 50.0, 0.0)),
    ));
    ws.physics().start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while brick.pose().position.y >= 49.0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
        ws.step(DT);
    }
    ws.physics().stop();

    assert!(!ws.physics().is_running());
    assert!(brick.pose().position.y < 49.0);
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("physics.json");
    std::fs::write(&path, r#"{ "gravity": [0.0, -9.81, 0.0], "destroy_height": -100.0 }"#).unwrap();

    let config = PhysicsConfig::load(&path).unwrap();
    assert_eq!(config.gravity, DVec3::new(0.0, -9.81, 0.0));
    assert_eq!(config.destroy_height, -100.0);

    let ws = Workspace::new(config).unwrap();
    assert_eq!(ws.gravity(), DVec3::new(0.0, -9.81, 0.0));
    assert_eq!(ws.destroy_height(), -100.0);
}
