// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed rover client.

use std::time::Duration;

use tether::{Client, Result};

use crate::protocol::{Command, LaserScan, Pose, RoverConfig};

/// One timeout for every operation; the backends answer well within it.
const TIMEOUT: Duration = Duration::from_secs(3);

/// Handle to a remote rover session.
pub struct RoverClient {
    inner: Client<Command>,
}

impl RoverClient {
    /// Establish a session with the rover service at `address`.
    pub fn connect(address: &str, config: &RoverConfig) -> Result<Self> {
        Ok(Self {
            inner: Client::create(Command::Create, TIMEOUT, address, config)?,
        })
    }

    /// End the session, releasing the remote backend.
    pub fn close(self) -> Result<()> {
        self.inner.destroy(Command::Destroy, TIMEOUT)
    }

    /// Latest odometry pose.
    pub fn pose(&self) -> Result<Pose> {
        self.inner.request(Command::PoseGet, TIMEOUT, &())
    }

    /// Latest laser sweep.
    pub fn laser_scan(&self) -> Result<LaserScan> {
        self.inner.request(Command::LaserScanGet, TIMEOUT, &())
    }

    /// Set the forward speed in millimeters per second.
    pub fn set_speed(&self, speed: f64) -> Result<()> {
        self.inner.request(Command::SpeedSet, TIMEOUT, &speed)
    }

    /// Whether the last heading change has completed.
    pub fn is_heading_done(&self) -> Result<bool> {
        self.inner.request(Command::IsHeadingDone, TIMEOUT, &())
    }

    /// Turn in place by `delta` degrees.
    pub fn set_delta_heading(&self, delta: f64) -> Result<()> {
        self.inner.request(Command::DeltaHeadingSet, TIMEOUT, &delta)
    }
}
