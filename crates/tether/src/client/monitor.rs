// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Callback monitor: demultiplexes subscription messages into callbacks.
//!
//! One thread blocks on the subscriber socket. Each message carries a
//! leading 32-bit command value; the matching registered callback, if any,
//! runs with the remaining bytes of the message. Closing the subscriber is
//! how the thread is told to exit.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::codec::{Decode, InputBuffer};
use crate::error::{Error, Result};
use crate::fault;
use crate::transport::{Address, SubscriberSocket};

/// Handler invoked with the event payload that follows the command value.
///
/// The buffer references the received message in place; decode what the
/// command's schema defines and copy out anything that must outlive the
/// call.
pub type Callback = Box<dyn FnMut(&mut InputBuffer<'_>) + Send>;

pub(crate) struct CallbackMonitor {
    socket: Arc<SubscriberSocket>,
    callbacks: Arc<Mutex<HashMap<i32, Callback>>>,
    thread: Option<JoinHandle<()>>,
}

impl CallbackMonitor {
    /// Connect a subscriber for `channel` on `address` and start the
    /// monitoring thread.
    pub fn spawn(address: &Address, channel: &str) -> Result<Self> {
        let socket = Arc::new(SubscriberSocket::connect(&address.to_string(), channel)?);
        let callbacks: Arc<Mutex<HashMap<i32, Callback>>> = Arc::new(Mutex::new(HashMap::new()));

        let loop_socket = Arc::clone(&socket);
        let loop_callbacks = Arc::clone(&callbacks);
        let thread = std::thread::Builder::new()
            .name("tether-callbacks".into())
            .spawn(move || monitor_loop(&loop_socket, &loop_callbacks))
            .map_err(Error::Io)?;

        Ok(Self {
            socket,
            callbacks,
            thread: Some(thread),
        })
    }

    /// Install or replace the callback for `command`; `None` removes it.
    pub fn set_callback(&self, command: i32, callback: Option<Callback>) {
        let mut callbacks = self.callbacks.lock();
        match callback {
            Some(callback) => {
                callbacks.insert(command, callback);
            }
            None => {
                callbacks.remove(&command);
            }
        }
    }
}

impl Drop for CallbackMonitor {
    fn drop(&mut self) {
        self.socket.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn monitor_loop(socket: &SubscriberSocket, callbacks: &Mutex<HashMap<i32, Callback>>) {
    loop {
        let message = match socket.receive() {
            Ok(message) => message,
            // Connection loss is the shutdown signal.
            Err(Error::NotConnected(_)) => break,
            Err(e) => {
                warn!("callback receive failed: {e}");
                continue;
            }
        };

        let mut input = InputBuffer::new(&message);
        let command = match i32::decode(&mut input) {
            Ok(command) => command,
            Err(e) => {
                warn!("malformed callback message: {e}");
                continue;
            }
        };

        let mut callbacks = callbacks.lock();
        if let Some(callback) = callbacks.get_mut(&command) {
            // A panicking user callback must not take the loop down.
            if let Err(e) = fault::barrier(|| {
                callback(&mut input);
                Ok(())
            }) {
                error!("callback for command {command} failed: {e}");
            }
        }
    }
}
