// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message-oriented TCP transport.
//!
//! Four socket roles over length-prefix-framed TCP streams:
//!
//! | Role | Semantics |
//! |------|-----------|
//! | [`RequestSocket`] | connect, send one message, receive one reply, strict alternation |
//! | [`ReplySocket`] | bind, receive one message, send exactly one reply before the next receive |
//! | [`PublisherSocket`] | bind, fan out `(channel, body)` messages, lossy under congestion |
//! | [`SubscriberSocket`] | connect, filter by channel prefix, receive bodies one at a time |
//!
//! Indefinitely blocking calls (`process`, `receive`) pair their socket with
//! a poll waker so `close()` from another thread unblocks them with a
//! connection-lost error.

mod address;
mod frame;
mod publisher;
mod replier;
mod requester;
mod subscriber;

pub use address::{Address, Port};
pub use publisher::PublisherSocket;
pub use replier::ReplySocket;
pub use requester::RequestSocket;
pub use subscriber::SubscriberSocket;

use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

/// Bound on connection establishment (connect and bind handshakes).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener backlog.
const LISTEN_BACKLOG: i32 = 128;

/// Create a non-blocking TCP listener with `SO_REUSEADDR`.
pub(crate) fn bind_listener(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}
