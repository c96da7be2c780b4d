// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed camera client.

use std::time::Duration;

use tracing::warn;

use tether::{Callback, Client, Decode, InputBuffer, Result};

use crate::protocol::{CameraConfig, CameraParams, Command, Image};

const TIMEOUT: Duration = Duration::from_secs(3);

/// Handler for frames arriving on the callback channel.
///
/// The image payload borrows the received message; copy it out if the frame
/// must outlive the call.
pub type FrameCallback = Box<dyn FnMut(&Image<'_>) + Send>;

/// Handle to a remote camera session.
pub struct CamClient {
    inner: Client<Command>,
}

impl CamClient {
    /// Establish a session with the camera service at `address`.
    pub fn connect(address: &str, config: &CameraConfig) -> Result<Self> {
        Ok(Self {
            inner: Client::create(Command::Create, TIMEOUT, address, config)?,
        })
    }

    /// End the session, releasing the remote backend.
    pub fn close(self) -> Result<()> {
        self.inner.destroy(Command::Destroy, TIMEOUT)
    }

    /// Current capture parameters.
    pub fn params(&self) -> Result<CameraParams> {
        self.inner.request(Command::ParametersGet, TIMEOUT, &())
    }

    /// Update capture parameters. A non-full `crop` is applied server-side
    /// to published frames.
    pub fn set_params(&self, params: &CameraParams) -> Result<()> {
        self.inner.request(Command::ParametersSet, TIMEOUT, params)
    }

    /// Enable (`Some`) or disable (`None`) per-frame delivery.
    pub fn set_frame_callback(&self, callback: Option<FrameCallback>) -> Result<()> {
        let wrapped = callback.map(|mut callback| -> Callback {
            Box::new(move |input: &mut InputBuffer<'_>| match Image::decode(input) {
                Ok(image) => callback(&image),
                Err(e) => warn!("frame payload did not match schema: {e}"),
            })
        });
        self.inner.set_callback(Command::CallbackSet, TIMEOUT, wrapped)
    }
}
