// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Camera server: task table wiring the protocol onto a backend.
//!
//! A requested crop is not forwarded to the backend. It is kept per session
//! and applied while encoding published frames, so the capture pipeline
//! keeps producing full frames and no intermediate copy is made.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use tether::{
    Command as _, Decode, Encode, Error, Handle, OutputBuffer, Result, Server, ServerConfig, Task,
};

use crate::protocol::{encode_cropped, CameraConfig, CameraParams, Command, Image, Roi};

/// Sink for captured frames, invoked from the backend's capture thread.
pub type FrameSink = Box<dyn FnMut(&Image<'_>) + Send>;

/// Contract of the camera backend driven by this service.
pub trait CameraCore: Send {
    fn params(&mut self) -> Result<CameraParams>;
    fn set_params(&mut self, params: &CameraParams) -> Result<()>;

    /// Register or clear the frame sink. While registered, the backend
    /// calls it once per captured frame.
    fn set_frame_sink(&mut self, sink: Option<FrameSink>) -> Result<()>;
}

/// Creates one backend per session from its create-time configuration.
pub type CamFactory = Box<dyn FnMut(&CameraConfig) -> Result<Box<dyn CameraCore>> + Send>;

/// Per-session server state: the backend plus the intercepted crop.
pub struct CamSession {
    core: Box<dyn CameraCore>,
    crop: Arc<Mutex<Option<Roi>>>,
}

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

/// Dispatch configuration for a camera service backed by `factory`.
pub fn cam_config(mut factory: CamFactory) -> ServerConfig<Command, CamSession> {
    ServerConfig {
        create: Task::new(Command::Create, move |handle: &mut Handle<CamSession>, input| {
            let config = match CameraConfig::decode(input) {
                Ok(config) => config,
                Err(e) => return failed_reply(&e),
            };
            match factory(&config) {
                Ok(core) => {
                    handle.value = Some(CamSession {
                        core,
                        crop: Arc::new(Mutex::new(None)),
                    });
                    ok_reply()
                }
                Err(e) => failed_reply(&e),
            }
        }),
        destroy: Task::new(Command::Destroy, |handle: &mut Handle<CamSession>, _input| {
            if let Some(mut session) = handle.value.take() {
                let _ = session.core.set_frame_sink(None);
            }
            ok_reply()
        }),
        tasks: vec![
            Task::new(Command::CallbackSet, |handle: &mut Handle<CamSession>, input| {
                let enable = match bool::decode(input) {
                    Ok(enable) => enable,
                    Err(e) => return failed_reply(&e),
                };
                let Some(publish) = handle.publish_fn() else {
                    return failed_reply(&Error::NotConnected("no publish channel".into()));
                };
                let Some(session) = handle.value.as_mut() else {
                    return failed_reply(&Error::NotSupported);
                };

                let result = if enable {
                    let crop = Arc::clone(&session.crop);
                    let sink: FrameSink = Box::new(move |image: &Image<'_>| {
                        let mut message = OutputBuffer::new();
                        Command::CallbackSet.to_wire().encode(&mut message);
                        let applied = match *crop.lock() {
                            Some(roi) => encode_cropped(image, &roi, &mut message),
                            None => {
                                image.encode(&mut message);
                                Ok(())
                            }
                        };
                        match applied {
                            Ok(()) => {
                                if let Err(e) = publish(message) {
                                    debug!("frame publish failed: {e}");
                                }
                            }
                            Err(e) => debug!("frame encoding failed: {e}"),
                        }
                    });
                    session.core.set_frame_sink(Some(sink))
                } else {
                    session.core.set_frame_sink(None)
                };

                match result {
                    Ok(()) => ok_reply(),
                    Err(e) => failed_reply(&e),
                }
            }),
            Task::new(Command::ParametersGet, |handle: &mut Handle<CamSession>, _input| {
                let Some(session) = handle.value.as_mut() else {
                    return failed_reply(&Error::NotSupported);
                };
                match session.core.params() {
                    Ok(params) => {
                        let mut reply = ok_reply();
                        params.encode(&mut reply);
                        reply
                    }
                    Err(e) => failed_reply(&e),
                }
            }),
            Task::new(Command::ParametersSet, |handle: &mut Handle<CamSession>, input| {
                let mut params = match CameraParams::decode(input) {
                    Ok(params) => params,
                    Err(e) => return failed_reply(&e),
                };
                let Some(session) = handle.value.as_mut() else {
                    return failed_reply(&Error::NotSupported);
                };

                // Intercept the crop so the backend keeps capturing full
                // frames; it is applied while encoding published frames.
                if params.crop.is_full() {
                    *session.crop.lock() = None;
                } else {
                    *session.crop.lock() = Some(params.crop);
                    params.crop = Roi::FULL;
                }

                match session.core.set_params(&params) {
                    Ok(()) => ok_reply(),
                    Err(e) => failed_reply(&e),
                }
            }),
        ],
    }
}

/// Camera RPC server bound to `address`.
pub struct CamServer {
    inner: Server<Command, CamSession>,
}

impl CamServer {
    pub fn start(address: &str, factory: CamFactory) -> Result<Self> {
        Ok(Self {
            inner: Server::start(cam_config(factory), address)?,
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
