// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Requester role: one message out, one reply in, strict alternation.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::OutputBuffer;
use crate::error::{Error, Result};
use crate::transport::address::Address;
use crate::transport::frame;
use crate::transport::CONNECT_TIMEOUT;

/// Synchronous request/reply socket.
///
/// The socket serializes concurrent callers, so at most one request is in
/// flight at any time. A reply that misses its deadline fails `timed_out`
/// and the underlying stream is rebuilt, resetting the request/reply state
/// machine for the next call.
#[derive(Debug)]
pub struct RequestSocket {
    address: Address,
    state: Mutex<Option<TcpStream>>,
    /// Clone of the live stream, used by `close()` to interrupt a blocked
    /// read without taking the state lock.
    cancel: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
}

impl RequestSocket {
    /// Connect to a replier. Establishment is bounded by the framework
    /// connect timeout; failure references the target address.
    pub fn connect(address: &str) -> Result<Self> {
        let address = Address::parse(address)?;
        let socket = Self {
            address,
            state: Mutex::new(None),
            cancel: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        let stream = socket.open()?;
        *socket.cancel.lock() = stream.try_clone().ok();
        *socket.state.lock() = Some(stream);
        Ok(socket)
    }

    /// The address this socket connects to.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Send one message and wait up to `timeout` for the reply payload.
    pub fn request(&self, message: OutputBuffer, timeout: Duration) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotConnected("socket closed".into()));
        }

        let mut guard = self.state.lock();
        if guard.is_none() {
            let stream = self.open()?;
            *self.cancel.lock() = stream.try_clone().ok();
            *guard = Some(stream);
        }
        let stream = guard.as_mut().expect("stream was just established");

        if let Err(e) = frame::write_frame(stream, &message.into_bytes()) {
            *guard = None;
            self.cancel.lock().take();
            return Err(self.disconnect_error("send failed", e));
        }

        // A zero timeout is not a valid socket option; clamp to the minimum.
        let deadline = timeout.max(Duration::from_millis(1));
        stream.set_read_timeout(Some(deadline))?;

        match frame::read_frame(stream) {
            Ok(payload) => Ok(payload),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                // Rebuild the stream so the next request starts clean
                // instead of reading this request's stale reply.
                match self.open() {
                    Ok(stream) => {
                        *self.cancel.lock() = stream.try_clone().ok();
                        *guard = Some(stream);
                    }
                    Err(_) => {
                        *guard = None;
                        self.cancel.lock().take();
                    }
                }
                Err(Error::TimedOut)
            }
            Err(e) => {
                *guard = None;
                self.cancel.lock().take();
                Err(self.disconnect_error("receive failed", e))
            }
        }
    }

    /// Abort any blocked request and make the socket unusable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(stream) = self.cancel.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn open(&self) -> Result<TcpStream> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotConnected("socket closed".into()));
        }
        let target = self.address.socket_addr()?;
        let stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT).map_err(|e| {
            Error::NotConnected(format!("could not connect to {}: {e}", self.address))
        })?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    fn disconnect_error(&self, what: &str, e: io::Error) -> Error {
        if self.closed.load(Ordering::Acquire) {
            Error::NotConnected("socket closed".into())
        } else {
            Error::NotConnected(format!("{what} on {}: {e}", self.address))
        }
    }
}

impl Drop for RequestSocket {
    fn drop(&mut self) {
        self.close();
    }
}
