// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed RPC client.
//!
//! A [`Client`] owns one requester socket and a freshly generated session
//! identifier. Requests carry `(identifier, command, inputs)`; replies carry
//! a leading error code followed by the outputs. `set_callback` attaches the
//! lazily-built callback monitor to the server's publish channel for this
//! session.
//!
//! Every public operation runs under the fault barrier: panics surface as
//! `state_not_recoverable`, never as an unwind across the API.

mod monitor;

pub use monitor::Callback;

use std::marker::PhantomData;
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::{Decode, DecodeOwned, Encode, InputBuffer, OutputBuffer};
use crate::error::{Error, Result};
use crate::fault;
use crate::guid::Guid;
use crate::transport::RequestSocket;
use crate::Command;

use monitor::CallbackMonitor;

pub struct Client<C: Command> {
    identifier: Guid,
    socket: RequestSocket,
    /// Publisher port reported in the create reply; the subscriber address
    /// is the requester address with this port substituted.
    callback_port: i32,
    monitor: Mutex<Option<CallbackMonitor>>,
    _command: PhantomData<C>,
}

impl<C: Command> Client<C> {
    /// Connect to `address` and establish a session with `cmd_create`.
    ///
    /// The create reply is expected to carry the callback port after the
    /// command outputs. On any failure the partially constructed client is
    /// torn down before the error is returned.
    pub fn create<I: Encode>(
        cmd_create: C,
        timeout: Duration,
        address: &str,
        input: &I,
    ) -> Result<Self> {
        fault::barrier(|| {
            let socket = RequestSocket::connect(address)?;
            let mut client = Self {
                identifier: Guid::generate(),
                socket,
                callback_port: 0,
                monitor: Mutex::new(None),
                _command: PhantomData,
            };
            client.callback_port = client.request(cmd_create, timeout, input)?;
            Ok(client)
        })
    }

    /// End the session with `cmd_destroy` and release local resources.
    ///
    /// Local cleanup happens whether or not the remote call succeeds; the
    /// remote error takes precedence.
    pub fn destroy(self, cmd_destroy: C, timeout: Duration) -> Result<()> {
        fault::barrier(|| {
            let result = self.request(cmd_destroy, timeout, &());
            drop(self);
            result
        })
    }

    /// Issue `cmd` with `input` and decode the outputs.
    ///
    /// The reply's leading error code gates the outputs: they are decoded
    /// only when it is zero.
    pub fn request<I: Encode, O: DecodeOwned>(
        &self,
        cmd: C,
        timeout: Duration,
        input: &I,
    ) -> Result<O> {
        fault::barrier(|| {
            let mut message = OutputBuffer::new();
            self.identifier.encode(&mut message);
            cmd.to_wire().encode(&mut message);
            input.encode(&mut message);

            let reply = self.socket.request(message, timeout)?;
            let mut reply = InputBuffer::new(&reply);
            let code = i32::decode(&mut reply)?;
            if code != 0 {
                return Err(Error::from_code(code));
            }
            O::decode(&mut reply)
        })
    }

    /// Enable or disable the event callback for `cmd`.
    ///
    /// The first use builds the callback monitor, subscribed to this
    /// session's identifier on the server's callback port. The server is
    /// then asked to enable (`Some`) or disable (`None`) emission; a remote
    /// failure while disabling still removes the local callback.
    pub fn set_callback(
        &self,
        cmd: C,
        timeout: Duration,
        callback: Option<Callback>,
    ) -> Result<()> {
        fault::barrier(|| {
            self.ensure_monitor()?;

            let enable = callback.is_some();
            let result: Result<()> = self.request(cmd, timeout, &enable);

            if result.is_ok() || !enable {
                if let Some(monitor) = self.monitor.lock().as_ref() {
                    monitor.set_callback(cmd.to_wire(), callback);
                }
                Ok(())
            } else {
                result
            }
        })
    }

    /// This session's identifier.
    pub fn identifier(&self) -> Guid {
        self.identifier
    }

    /// The callback port learned from the create reply.
    pub fn callback_port(&self) -> i32 {
        self.callback_port
    }

    fn ensure_monitor(&self) -> Result<()> {
        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            return Ok(());
        }

        let port = u16::try_from(self.callback_port).ok().filter(|&p| p != 0);
        let Some(port) = port else {
            return Err(Error::InvalidArgument(format!(
                "invalid callback port {}",
                self.callback_port
            )));
        };

        let address = self.socket.address().with_port(port);
        *monitor = Some(CallbackMonitor::spawn(&address, &self.identifier.to_string())?);
        Ok(())
    }
}

/// Event payload decoding helper for embedders: wraps a typed handler into a
/// raw [`Callback`], logging payloads that do not match the schema.
pub fn typed_callback<T, F>(mut handler: F) -> Callback
where
    T: for<'de> Decode<'de>,
    F: FnMut(T) + Send + 'static,
{
    Box::new(move |input: &mut InputBuffer<'_>| match T::decode(input) {
        Ok(value) => handler(value),
        Err(e) => tracing::warn!("event payload did not match schema: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    enum TestCommand {
        Create,
    }

    impl Command for TestCommand {
        fn to_wire(self) -> i32 {
            0
        }

        fn from_wire(code: i32) -> Option<Self> {
            (code == 0).then_some(TestCommand::Create)
        }
    }

    #[test]
    fn test_create_against_dead_endpoint_fails_not_connected() {
        let result: Result<Client<TestCommand>> = Client::create(
            TestCommand::Create,
            Duration::from_millis(100),
            "127.0.0.1:1",
            &(),
        );
        assert!(matches!(result, Err(Error::NotConnected(_))));
    }

    #[test]
    fn test_create_with_malformed_address_fails_invalid_argument() {
        let result: Result<Client<TestCommand>> = Client::create(
            TestCommand::Create,
            Duration::from_millis(100),
            "127.0.0.1",
            &(),
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
