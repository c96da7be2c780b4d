// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber role: channel-filtered receiver of published messages.
//!
//! Connects to a publisher and delivers message bodies whose channel frame
//! starts with the subscribed prefix. Connection establishment is
//! observable: the constructor blocks until the stream is writable or the
//! connect timeout elapses. `receive` blocks indefinitely but is cancellable
//! through `close()`.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::transport::address::Address;
use crate::transport::frame::FrameReader;
use crate::transport::CONNECT_TIMEOUT;

const WAKER_TOKEN: Token = Token(0);
const STREAM_TOKEN: Token = Token(1);
const MAX_EVENTS: usize = 16;

#[derive(Debug)]
struct Inner {
    poll: Poll,
    events: Events,
    stream: TcpStream,
    reader: FrameReader,
    frames: VecDeque<Vec<u8>>,
}

#[derive(Debug)]
pub struct SubscriberSocket {
    address: Address,
    channel: Vec<u8>,
    closed: AtomicBool,
    waker: Waker,
    inner: Mutex<Inner>,
}

impl SubscriberSocket {
    /// Connect to a publisher and subscribe to `channel` (prefix match).
    pub fn connect(address: &str, channel: &str) -> Result<Self> {
        let address = Address::parse(address)?;
        let target = address.socket_addr()?;

        let mut poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let mut events = Events::with_capacity(MAX_EVENTS);

        let mut stream = TcpStream::connect(target).map_err(|e| {
            Error::NotConnected(format!("could not connect to {address}: {e}"))
        })?;
        poll.registry()
            .register(&mut stream, STREAM_TOKEN, Interest::WRITABLE)?;

        wait_connected(&mut poll, &mut events, &stream, &address)?;

        let _ = stream.set_nodelay(true);
        poll.registry()
            .reregister(&mut stream, STREAM_TOKEN, Interest::READABLE)?;

        Ok(Self {
            address,
            channel: channel.as_bytes().to_vec(),
            closed: AtomicBool::new(false),
            waker,
            inner: Mutex::new(Inner {
                poll,
                events,
                stream,
                reader: FrameReader::new(),
                frames: VecDeque::new(),
            }),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Block until a message for the subscribed channel arrives and return
    /// its body. Messages for other channels are discarded silently.
    pub fn receive(&self) -> Result<Vec<u8>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::NotConnected("polling aborted".into()));
            }

            // Publications arrive as (channel, body) frame pairs.
            while inner.frames.len() >= 2 {
                let channel = inner.frames.pop_front().expect("frame pair");
                let body = inner.frames.pop_front().expect("frame pair");
                if channel.starts_with(&self.channel) {
                    return Ok(body);
                }
            }

            let Inner { poll, events, .. } = inner;
            match poll.poll(events, None) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }

            let mut readable = false;
            for event in inner.events.iter() {
                match event.token() {
                    WAKER_TOKEN => {} // closed flag re-checked at loop top
                    STREAM_TOKEN => readable |= event.is_readable(),
                    _ => {}
                }
            }

            if readable {
                match inner.reader.read_from(&mut inner.stream, &mut inner.frames) {
                    Ok(false) => {}
                    Ok(true) => {
                        return Err(Error::NotConnected(
                            "publisher closed the connection".into(),
                        ))
                    }
                    Err(e) => {
                        return Err(Error::NotConnected(format!(
                            "receive failed on {}: {e}",
                            self.address
                        )))
                    }
                }
            }
        }
    }

    /// Abort any blocked `receive`; the socket is not reusable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.waker.wake();
    }
}

impl Drop for SubscriberSocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Poll until the non-blocking connect completes, or fail with a connection
/// error referencing the target address once the timeout elapses.
fn wait_connected(
    poll: &mut Poll,
    events: &mut Events,
    stream: &TcpStream,
    address: &Address,
) -> Result<()> {
    let deadline = Instant::now() + CONNECT_TIMEOUT;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::NotConnected(format!(
                "could not connect to {address}: timed out"
            )));
        }
        match poll.poll(events, Some(deadline - now)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }

        for event in events.iter() {
            if event.token() != STREAM_TOKEN || !event.is_writable() {
                continue;
            }
            if let Some(e) = stream.take_error()? {
                return Err(Error::NotConnected(format!(
                    "could not connect to {address}: {e}"
                )));
            }
            match stream.peer_addr() {
                Ok(_) => return Ok(()),
                Err(e)
                    if e.kind() == io::ErrorKind::NotConnected
                        || e.raw_os_error() == Some(EINPROGRESS) =>
                {
                    // Still in flight; keep polling.
                }
                Err(e) => {
                    return Err(Error::NotConnected(format!(
                        "could not connect to {address}: {e}"
                    )))
                }
            }
        }
    }
}

/// EINPROGRESS: a non-blocking connect that has not completed yet.
const EINPROGRESS: i32 = 115;
