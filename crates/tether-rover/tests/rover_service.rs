// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rover service end-to-end over loopback, with an in-process backend.

use std::sync::Arc;

use parking_lot::Mutex;
use tether::{Error, Result};
use tether_rover::{
    LaserScan, Pose, RoverClient, RoverConfig, RoverCore, RoverServer, LASER_READINGS,
};

/// Scripted backend: integrates commanded motion into the reported pose.
#[derive(Default)]
struct FakeRover {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    pose: Pose,
    speed: f64,
    pending_heading: f64,
}

impl RoverCore for FakeRover {
    fn pose(&mut self) -> Result<Pose> {
        Ok(self.state.lock().pose)
    }

    fn laser_scan(&mut self) -> Result<LaserScan> {
        let state = self.state.lock();
        let mut distance = [0i32; LASER_READINGS];
        distance[0] = 1000;
        distance[90] = 2000;
        Ok(LaserScan {
            pose_taken: state.pose,
            distance,
        })
    }

    fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !speed.is_finite() {
            return Err(Error::InvalidArgument("speed must be finite".into()));
        }
        let mut state = self.state.lock();
        state.speed = speed;
        state.pose.x += speed;
        Ok(())
    }

    fn is_heading_done(&mut self) -> Result<bool> {
        Ok(self.state.lock().pending_heading == 0.0)
    }

    fn set_delta_heading(&mut self, delta: f64) -> Result<()> {
        let mut state = self.state.lock();
        state.pending_heading = delta;
        state.pose.theta += delta;
        state.pending_heading = 0.0;
        Ok(())
    }
}

fn start_service() -> (RoverServer, String) {
    let server = RoverServer::start(
        "127.0.0.1:*",
        Box::new(|config: &RoverConfig| {
            assert!(config.update_interval_ms > 0);
            Ok(Box::new(FakeRover::default()) as Box<dyn RoverCore>)
        }),
    )
    .expect("rover server starts");
    let address = server.address();
    (server, address)
}

#[test]
fn test_pose_tracks_commands() {
    let (server, address) = start_service();
    let rover = RoverClient::connect(
        &address,
        &RoverConfig {
            update_interval_ms: 50,
        },
    )
    .unwrap();

    assert_eq!(rover.pose().unwrap(), Pose::default());

    rover.set_speed(0.5).unwrap();
    rover.set_delta_heading(1.5).unwrap();

    let pose = rover.pose().unwrap();
    assert_eq!(pose.x, 0.5);
    assert_eq!(pose.theta, 1.5);

    assert!(rover.is_heading_done().unwrap());

    rover.close().unwrap();
    server.stop().unwrap();
}

#[test]
fn test_laser_scan_carries_pose() {
    let (server, address) = start_service();
    let rover = RoverClient::connect(
        &address,
        &RoverConfig {
            update_interval_ms: 50,
        },
    )
    .unwrap();

    rover.set_speed(2.0).unwrap();
    let scan = rover.laser_scan().unwrap();
    assert_eq!(scan.pose_taken.x, 2.0);
    assert_eq!(scan.distance.len(), LASER_READINGS);
    assert_eq!(scan.distance[0], 1000);
    assert_eq!(scan.distance[90], 2000);
    assert!(scan.distance[1..90].iter().all(|&reading| reading == 0));

    rover.close().unwrap();
    server.stop().unwrap();
}

#[test]
fn test_backend_errors_surface_to_the_client() {
    let (server, address) = start_service();
    let rover = RoverClient::connect(
        &address,
        &RoverConfig {
            update_interval_ms: 50,
        },
    )
    .unwrap();

    let result = rover.set_speed(f64::NAN);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    // The failed command left the session usable.
    assert!(rover.pose().is_ok());

    rover.close().unwrap();
    server.stop().unwrap();
}

#[test]
fn test_factory_failure_rejects_the_session() {
    let server = RoverServer::start(
        "127.0.0.1:*",
        Box::new(|_config: &RoverConfig| Err(Error::NotRecoverable("no hardware".into()))),
    )
    .unwrap();
    let address = server.address();

    let result = RoverClient::connect(
        &address,
        &RoverConfig {
            update_interval_ms: 50,
        },
    );
    assert!(matches!(result, Err(Error::NotRecoverable(_))));
    assert_eq!(server.session_count(), 0);

    server.stop().unwrap();
}

#[test]
fn test_sessions_are_isolated() {
    let (server, address) = start_service();

    let first = RoverClient::connect(
        &address,
        &RoverConfig {
            update_interval_ms: 50,
        },
    )
    .unwrap();
    let second = RoverClient::connect(
        &address,
        &RoverConfig {
            update_interval_ms: 50,
        },
    )
    .unwrap();
    assert_eq!(server.session_count(), 2);

    first.set_speed(1.0).unwrap();
    assert_eq!(second.pose().unwrap().x, 0.0);

    first.close().unwrap();
    assert_eq!(server.session_count(), 1);
    second.close().unwrap();
    assert_eq!(server.session_count(), 0);

    server.stop().unwrap();
}
