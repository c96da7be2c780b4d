// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rover wire protocol: commands and the records crossing the wire.

use tether::{Decode, Encode, InputBuffer, OutputBuffer, Result};

/// Rover service commands.
///
/// The same values select request handlers and event callbacks.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Command {
    Create = 0,
    Destroy = 1,
    PoseGet = 2,
    LaserScanGet = 3,
    SpeedSet = 4,
    IsHeadingDone = 5,
    DeltaHeadingSet = 6,
}

impl tether::Command for Command {
    fn to_wire(self) -> i32 {
        self as i32
    }

    fn from_wire(code: i32) -> Option<Self> {
        use Command::*;
        [
            Create,
            Destroy,
            PoseGet,
            LaserScanGet,
            SpeedSet,
            IsHeadingDone,
            DeltaHeadingSet,
        ]
        .into_iter()
        .find(|cmd| *cmd as i32 == code)
    }
}

/// Backend configuration sent with the create command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoverConfig {
    /// Odometry update period, in milliseconds.
    pub update_interval_ms: i32,
}

impl Encode for RoverConfig {
    fn encode(&self, out: &mut OutputBuffer) {
        self.update_interval_ms.encode(out);
    }
}

impl<'a> Decode<'a> for RoverConfig {
    fn decode(input: &mut InputBuffer<'a>) -> Result<Self> {
        Ok(Self {
            update_interval_ms: i32::decode(input)?,
        })
    }
}

/// Planar pose estimate from odometry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Encode for Pose {
    fn encode(&self, out: &mut OutputBuffer) {
        self.x.encode(out);
        self.y.encode(out);
        self.theta.encode(out);
    }
}

impl<'a> Decode<'a> for Pose {
    fn decode(input: &mut InputBuffer<'a>) -> Result<Self> {
        Ok(Self {
            x: f64::decode(input)?,
            y: f64::decode(input)?,
            theta: f64::decode(input)?,
        })
    }
}

/// Beam readings in one laser sweep, one per angular degree.
pub const LASER_READINGS: usize = 360;

/// One full laser sweep, stamped with the pose it was taken at.
#[derive(Debug, Clone, PartialEq)]
pub struct LaserScan {
    pub pose_taken: Pose,
    /// Beam distances in millimeters. The sweep always carries exactly
    /// [`LASER_READINGS`] values; a mismatched count fails decoding.
    pub distance: [i32; LASER_READINGS],
}

impl Default for LaserScan {
    fn default() -> Self {
        Self {
            pose_taken: Pose::default(),
            distance: [0; LASER_READINGS],
        }
    }
}

impl Encode for LaserScan {
    fn encode(&self, out: &mut OutputBuffer) {
        self.pose_taken.encode(out);
        self.distance.encode(out);
    }
}

impl<'a> Decode<'a> for LaserScan {
    fn decode(input: &mut InputBuffer<'a>) -> Result<Self> {
        Ok(Self {
            pose_taken: Pose::decode(input)?,
            distance: <[i32; LASER_READINGS]>::decode(input)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether::{Command as _, Error};

    #[test]
    fn test_command_wire_values() {
        assert_eq!(Command::Create.to_wire(), 0);
        assert_eq!(Command::DeltaHeadingSet.to_wire(), 6);
        assert_eq!(Command::from_wire(3), Some(Command::LaserScanGet));
        assert_eq!(Command::from_wire(99), None);
    }

    #[test]
    fn test_pose_roundtrip() {
        let pose = Pose {
            x: 1.25,
            y: -3.5,
            theta: 0.7853981633974483,
        };
        let mut out = OutputBuffer::new();
        pose.encode(&mut out);
        assert_eq!(out.len(), 24);

        let bytes = out.into_bytes();
        let mut input = InputBuffer::new(&bytes);
        assert_eq!(Pose::decode(&mut input).unwrap(), pose);
    }

    #[test]
    fn test_laser_scan_roundtrip() {
        let mut distance = [0i32; LASER_READINGS];
        distance[0] = 1000;
        distance[90] = 2500;
        distance[359] = 40;
        let scan = LaserScan {
            pose_taken: Pose {
                x: 0.5,
                y: 0.5,
                theta: 0.0,
            },
            distance,
        };

        let mut out = OutputBuffer::new();
        scan.encode(&mut out);
        // pose (24 bytes) + length prefix (4 bytes) + 360 readings
        assert_eq!(out.len(), 28 + LASER_READINGS * 4);

        let bytes = out.into_bytes();
        let mut input = InputBuffer::new(&bytes);
        let decoded = LaserScan::decode(&mut input).unwrap();
        assert_eq!(decoded, scan);
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_laser_scan_with_wrong_count_is_bad_message() {
        let mut out = OutputBuffer::new();
        LaserScan::default().encode(&mut out);

        // Corrupt the length prefix that follows the pose.
        let mut bytes = out.into_bytes();
        bytes[24..28].copy_from_slice(&359i32.to_le_bytes());

        let mut input = InputBuffer::new(&bytes);
        let err = LaserScan::decode(&mut input).unwrap_err();
        assert!(matches!(err, Error::BadMessage(_)));
    }
}
