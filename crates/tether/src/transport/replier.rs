// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Replier role: receive one request, send exactly one reply.
//!
//! The socket accepts any number of requester connections and serves one
//! request at a time. Blocking in `process` is cancellable: `close()` wakes
//! the poll from any thread and the blocked call fails with a
//! connection-lost error, which is the normal exit signal for a serving
//! loop.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec::{InputBuffer, OutputBuffer};
use crate::error::{Error, Result};
use crate::transport::address::Address;
use crate::transport::frame::{self, FrameReader};
use crate::transport::bind_listener;

const WAKER_TOKEN: Token = Token(0);
const LISTENER_TOKEN: Token = Token(1);
const FIRST_CONN_TOKEN: usize = 2;
const MAX_EVENTS: usize = 128;

struct Conn {
    stream: TcpStream,
    reader: FrameReader,
    frames: VecDeque<Vec<u8>>,
    readable: bool,
    writable: bool,
}

struct Inner {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    conns: HashMap<Token, Conn>,
    next_token: usize,
}

pub struct ReplySocket {
    address: Address,
    closed: AtomicBool,
    waker: Waker,
    inner: Mutex<Inner>,
}

impl ReplySocket {
    /// Bind to `address`; a `*` port is system-assigned and the concrete
    /// value is readable back through [`address`](Self::address).
    pub fn bind(address: &str) -> Result<Self> {
        let requested = Address::parse_bind(address)?;
        let target = requested.socket_addr()?;
        let listener = bind_listener(target)
            .map_err(|e| Error::NotConnected(format!("could not bind to {requested}: {e}")))?;
        let local = listener.local_addr()?;
        let mut listener = TcpListener::from_std(listener);

        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            address: requested.with_port(local.port()),
            closed: AtomicBool::new(false),
            waker,
            inner: Mutex::new(Inner {
                poll,
                events: Events::with_capacity(MAX_EVENTS),
                listener,
                conns: HashMap::new(),
                next_token: FIRST_CONN_TOKEN,
            }),
        })
    }

    /// The bound address, with the concrete port.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Block until one request arrives, hand it to `work`, and send the
    /// returned buffer back as the reply.
    pub fn process<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&mut InputBuffer<'_>) -> OutputBuffer,
    {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut work = Some(work);

        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::NotConnected("polling aborted".into()));
            }

            drain_readable(inner);

            let ready = inner
                .conns
                .iter()
                .find_map(|(&token, conn)| (!conn.frames.is_empty()).then_some(token));
            if let Some(token) = ready {
                let request = inner
                    .conns
                    .get_mut(&token)
                    .expect("connection with a pending frame")
                    .frames
                    .pop_front()
                    .expect("frame queue is non-empty");

                let work = work.take().expect("process serves a single request");
                let mut input = InputBuffer::new(&request);
                let reply = work(&mut input);
                return self.send_reply(inner, token, &frame::frame(reply.as_bytes()));
            }

            self.poll_once(inner, None)?;
        }
    }

    /// Abort any blocked `process` call; the socket is not reusable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.waker.wake();
    }

    /// Wait for readiness and fold the events into per-connection flags.
    fn poll_once(&self, inner: &mut Inner, timeout: Option<Duration>) -> Result<()> {
        let Inner { poll, events, .. } = inner;
        match poll.poll(events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(Error::Io(e)),
        }
        let actions: Vec<(Token, bool, bool)> = events
            .iter()
            .map(|event| (event.token(), event.is_readable(), event.is_writable()))
            .collect();

        for (token, readable, writable) in actions {
            match token {
                WAKER_TOKEN => {} // the caller re-checks the closed flag
                LISTENER_TOKEN => accept_connections(inner),
                token => {
                    if let Some(conn) = inner.conns.get_mut(&token) {
                        conn.readable |= readable;
                        conn.writable |= writable;
                    }
                }
            }
        }
        Ok(())
    }

    /// Write the framed reply fully before the next receive. A peer that
    /// vanished mid-reply is dropped without failing the serving loop.
    fn send_reply(&self, inner: &mut Inner, token: Token, data: &[u8]) -> Result<()> {
        let mut written = 0usize;
        let mut watching_writable = false;

        loop {
            let Some(conn) = inner.conns.get_mut(&token) else {
                return Ok(());
            };

            match conn.stream.write(&data[written..]) {
                Ok(0) => {
                    debug!(token = token.0, "peer stopped accepting reply bytes");
                    remove_conn(inner, token);
                    return Ok(());
                }
                Ok(n) => {
                    written += n;
                    if written == data.len() {
                        if watching_writable {
                            let _ = inner.poll.registry().reregister(
                                &mut conn.stream,
                                token,
                                Interest::READABLE,
                            );
                            conn.writable = false;
                        }
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !watching_writable {
                        inner.poll.registry().reregister(
                            &mut conn.stream,
                            token,
                            Interest::READABLE | Interest::WRITABLE,
                        )?;
                        watching_writable = true;
                    }
                    loop {
                        if self.closed.load(Ordering::Acquire) {
                            return Err(Error::NotConnected("polling aborted".into()));
                        }
                        self.poll_once(inner, None)?;
                        let Some(conn) = inner.conns.get_mut(&token) else {
                            return Ok(());
                        };
                        if conn.writable {
                            conn.writable = false;
                            break;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("dropping connection while replying: {e}");
                    remove_conn(inner, token);
                    return Ok(());
                }
            }
        }
    }
}

impl Drop for ReplySocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pull bytes out of every connection flagged readable; completed frames
/// queue up per connection, closed peers are dropped.
fn drain_readable(inner: &mut Inner) {
    let mut dead = Vec::new();
    for (&token, conn) in inner.conns.iter_mut() {
        if !conn.readable {
            continue;
        }
        conn.readable = false;
        match conn.reader.read_from(&mut conn.stream, &mut conn.frames) {
            Ok(false) => {}
            Ok(true) => dead.push(token),
            Err(e) => {
                debug!("dropping connection: {e}");
                dead.push(token);
            }
        }
    }
    for token in dead {
        remove_conn(inner, token);
    }
}

fn accept_connections(inner: &mut Inner) {
    loop {
        match inner.listener.accept() {
            Ok((mut stream, _peer)) => {
                let _ = stream.set_nodelay(true);
                let token = Token(inner.next_token);
                inner.next_token += 1;
                if let Err(e) =
                    inner
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                {
                    warn!("could not register accepted connection: {e}");
                    continue;
                }
                inner.conns.insert(
                    token,
                    Conn {
                        stream,
                        reader: FrameReader::new(),
                        frames: VecDeque::new(),
                        // Data may already be buffered on a fresh connection.
                        readable: true,
                        writable: false,
                    },
                );
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("accept failed: {e}");
                return;
            }
        }
    }
}

fn remove_conn(inner: &mut Inner, token: Token) {
    if let Some(mut conn) = inner.conns.remove(&token) {
        let _ = inner.poll.registry().deregister(&mut conn.stream);
    }
}
