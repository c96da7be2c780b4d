// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Tether - session-oriented RPC for device control services
//!
//! A typed request/reply layer paired with a per-session publish/subscribe
//! callback channel, over a message-oriented TCP transport with its own
//! binary codec.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tether::{Client, Command, OutputBuffer, Encode, Server, ServerConfig, Task};
//!
//! #[derive(Copy, Clone, PartialEq, Eq)]
//! enum Cmd { Create, Destroy, Ping }
//!
//! impl Command for Cmd {
//!     fn to_wire(self) -> i32 { self as i32 }
//!     fn from_wire(code: i32) -> Option<Self> {
//!         [Cmd::Create, Cmd::Destroy, Cmd::Ping].into_iter().find(|c| c.to_wire() == code)
//!     }
//! }
//!
//! fn main() -> tether::Result<()> {
//!     let config: ServerConfig<Cmd, ()> = ServerConfig {
//!         create: Task::new(Cmd::Create, |handle, _input| {
//!             handle.value = Some(());
//!             let mut reply = OutputBuffer::new();
//!             0i32.encode(&mut reply);
//!             reply
//!         }),
//!         destroy: Task::new(Cmd::Destroy, |handle, _input| {
//!             handle.value = None;
//!             let mut reply = OutputBuffer::new();
//!             0i32.encode(&mut reply);
//!             reply
//!         }),
//!         tasks: vec![],
//!     };
//!
//!     let server = Server::start(config, "127.0.0.1:*")?;
//!     let address = server.address().to_string();
//!
//!     let client: Client<Cmd> =
//!         Client::create(Cmd::Create, Duration::from_secs(3), &address, &())?;
//!     client.destroy(Cmd::Destroy, Duration::from_secs(3))?;
//!     server.stop()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Service Layer                           |
//! |        typed protocol crates (commands, records)             |
//! +--------------------------------------------------------------+
//! |                       RPC Layer                              |
//! |   Client / Server / Handle registry / Callback monitor       |
//! +--------------------------------------------------------------+
//! |                       Codec Layer                            |
//! |   Encode / Decode over OutputBuffer / InputBuffer            |
//! +--------------------------------------------------------------+
//! |                     Transport Layer                          |
//! |   Requester | Replier | Publisher | Subscriber over TCP      |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Typed request issuance and callback subscription |
//! | [`Server`] | Session registry and command dispatch |
//! | [`Guid`] | 128-bit session identifier, doubles as publish channel |
//! | [`OutputBuffer`] / [`InputBuffer`] | Append-only / cursor-advancing codec buffers |
//! | [`Error`] | Errno-space error codes shared with the wire |

/// Typed RPC client and callback monitor.
pub mod client;
/// Typed binary serialization (buffers, wire shapes).
pub mod codec;
mod error;
mod fault;
/// 128-bit session identifiers.
pub mod guid;
/// Session registry, dispatch table, publisher side-channel.
pub mod server;
/// Socket roles over framed TCP.
pub mod transport;

pub use client::{typed_callback, Callback, Client};
pub use codec::{Decode, DecodeOwned, Encode, InputBuffer, OutputBuffer};
pub use error::{Error, Result};
pub use guid::Guid;
pub use server::{Handle, PublishFn, Server, ServerConfig, Task};
pub use transport::Address;

/// A command enumeration shared by both sides of a service protocol.
///
/// Commands travel as 32-bit signed integers; the same value selects the
/// request handler on the request channel and the event callback on the
/// publish channel.
pub trait Command: Copy + Eq + Send + 'static {
    /// The 32-bit wire value of this command.
    fn to_wire(self) -> i32;

    /// Recover a command from its wire value.
    fn from_wire(code: i32) -> Option<Self>;
}
