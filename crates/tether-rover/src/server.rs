// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rover server: task table wiring the protocol onto a backend.

use tracing::debug;

use tether::{Decode, Encode, Error, Handle, OutputBuffer, Result, Server, ServerConfig, Task};

use crate::protocol::{Command, LaserScan, Pose, RoverConfig};

/// Contract of the robot backend driven by this service.
///
/// Implementations own their odometry and laser loops on their own threads;
/// these calls only sample or update state and must not block for long,
/// since they run on the server's dispatch thread.
pub trait RoverCore: Send {
    fn pose(&mut self) -> Result<Pose>;
    fn laser_scan(&mut self) -> Result<LaserScan>;
    fn set_speed(&mut self, speed: f64) -> Result<()>;
    fn is_heading_done(&mut self) -> Result<bool>;
    fn set_delta_heading(&mut self, delta: f64) -> Result<()>;
}

/// Creates one backend per session from its create-time configuration.
pub type RoverFactory = Box<dyn FnMut(&RoverConfig) -> Result<Box<dyn RoverCore>> + Send>;

fn ok_reply() -> OutputBuffer {
    let mut reply = OutputBuffer::new();
    0i32.encode(&mut reply);
    reply
}

fn failed_reply(e: &Error) -> OutputBuffer {
    let mut reply = OutputBuffer::new();
    e.code().encode(&mut reply);
    reply
}

/// Reply with `(0, outputs)` on success or `(code)` on failure.
fn result_reply<O: Encode>(result: Result<O>) -> OutputBuffer {
    match result {
        Ok(output) => {
            let mut reply = ok_reply();
            output.encode(&mut reply);
            reply
        }
        Err(e) => failed_reply(&e),
    }
}

/// Dispatch configuration for a rover service backed by `factory`.
pub fn rover_config(mut factory: RoverFactory) -> ServerConfig<Command, Box<dyn RoverCore>> {
    ServerConfig {
        create: Task::new(Command::Create, move |handle: &mut Handle<Box<dyn RoverCore>>, input| {
            let config = match RoverConfig::decode(input) {
                Ok(config) => config,
                Err(e) => return failed_reply(&e),
            };
            match factory(&config) {
                Ok(core) => {
                    debug!(
                        update_interval_ms = config.update_interval_ms,
                        "rover backend created"
                    );
                    handle.value = Some(core);
                    ok_reply()
                }
                Err(e) => failed_reply(&e),
            }
        }),
        destroy: Task::new(Command::Destroy, |handle: &mut Handle<Box<dyn RoverCore>>, _input| {
            if handle.value.take().is_some() {
                debug!("rover backend released");
            }
            ok_reply()
        }),
        tasks: vec![
            Task::new(Command::PoseGet, |handle: &mut Handle<Box<dyn RoverCore>>, _input| match handle.value.as_mut() {
                Some(core) => result_reply(core.pose()),
                None => failed_reply(&Error::NotSupported),
            }),
            Task::new(Command::LaserScanGet, |handle: &mut Handle<Box<dyn RoverCore>>, _input| {
                match handle.value.as_mut() {
                    Some(core) => result_reply(core.laser_scan()),
                    None => failed_reply(&Error::NotSupported),
                }
            }),
            Task::new(Command::SpeedSet, |handle: &mut Handle<Box<dyn RoverCore>>, input| {
                let speed = match f64::decode(input) {
                    Ok(speed) => speed,
                    Err(e) => return failed_reply(&e),
                };
                match handle.value.as_mut() {
                    Some(core) => result_reply(core.set_speed(speed)),
                    None => failed_reply(&Error::NotSupported),
                }
            }),
            Task::new(Command::IsHeadingDone, |handle: &mut Handle<Box<dyn RoverCore>>, _input| {
                match handle.value.as_mut() {
                    Some(core) => result_reply(core.is_heading_done()),
                    None => failed_reply(&Error::NotSupported),
                }
            }),
            Task::new(Command::DeltaHeadingSet, |handle: &mut Handle<Box<dyn RoverCore>>, input| {
                let delta = match f64::decode(input) {
                    Ok(delta) => delta,
                    Err(e) => return failed_reply(&e),
                };
                match handle.value.as_mut() {
                    Some(core) => result_reply(core.set_delta_heading(delta)),
                    None => failed_reply(&Error::NotSupported),
                }
            }),
        ],
    }
}

/// Rover RPC server bound to `address`.
pub struct RoverServer {
    inner: Server<Command, Box<dyn RoverCore>>,
}

impl RoverServer {
    pub fn start(address: &str, factory: RoverFactory) -> Result<Self> {
        Ok(Self {
            inner: Server::start(rover_config(factory), address)?,
        })
    }

    /// The bound address, with the concrete port.
    pub fn address(&self) -> String {
        self.inner.address().to_string()
    }

    pub fn session_count(&self) -> usize {
        self.inner.session_count()
    }

    pub fn stop(self) -> Result<()> {
        self.inner.stop()
    }
}
