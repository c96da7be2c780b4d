// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher role: lossy fan-out of `(channel, body)` messages.
//!
//! A dedicated I/O thread accepts subscriber connections and drains
//! per-connection send queues. The queues are bounded by a small high-water
//! mark so stale events never pile up behind a slow subscriber; overflow
//! drops the new message for that subscriber only. `publish` itself only
//! enqueues and wakes the thread, so it blocks briefly and is not
//! cancellable.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec::OutputBuffer;
use crate::error::{Error, Result};
use crate::transport::address::Address;
use crate::transport::bind_listener;
use crate::transport::frame;

const WAKER_TOKEN: Token = Token(0);
const LISTENER_TOKEN: Token = Token(1);
const FIRST_CONN_TOKEN: usize = 2;
const MAX_EVENTS: usize = 128;

/// Per-subscriber queue bound, in messages. Kept small on purpose: under
/// congestion it is better to drop stale events than to buffer them.
const HIGH_WATER_MARK: usize = 3;

enum IoCommand {
    Publish(Vec<u8>),
    Shutdown,
}

pub struct PublisherSocket {
    address: Address,
    closed: AtomicBool,
    waker: Arc<Waker>,
    // Sender is Send but not Sync; the lock makes the socket shareable.
    commands: Mutex<Sender<IoCommand>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PublisherSocket {
    /// Bind to `address`; a `*` port is system-assigned and readable back
    /// through [`address`](Self::address).
    pub fn bind(address: &str) -> Result<Self> {
        let requested = Address::parse_bind(address)?;
        let target = requested.socket_addr()?;
        let listener = bind_listener(target)
            .map_err(|e| Error::NotConnected(format!("could not bind to {requested}: {e}")))?;
        let local = listener.local_addr()?;
        let mut listener = TcpListener::from_std(listener);

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let (commands, receiver) = channel();
        let thread = std::thread::Builder::new()
            .name("tether-publisher".into())
            .spawn(move || io_loop(poll, listener, receiver))
            .map_err(Error::Io)?;

        Ok(Self {
            address: requested.with_port(local.port()),
            closed: AtomicBool::new(false),
            waker,
            commands: Mutex::new(commands),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// The bound address, with the concrete port.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Queue `message` for every connected subscriber of `channel`.
    ///
    /// Delivery is unconfirmed and lossy under congestion; there is no
    /// feedback about drops beyond a debug log on the I/O thread.
    pub fn publish(&self, channel: &str, message: OutputBuffer) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotConnected("socket closed".into()));
        }

        let payload = message.into_bytes();
        let mut data = frame::frame(channel.as_bytes());
        data.extend_from_slice(&frame::frame(&payload));

        self.commands
            .lock()
            .send(IoCommand::Publish(data))
            .map_err(|_| Error::NotConnected("publisher thread exited".into()))?;
        self.waker.wake()?;
        Ok(())
    }

    /// Stop the I/O thread and drop every subscriber connection.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.commands.lock().send(IoCommand::Shutdown);
        let _ = self.waker.wake();
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PublisherSocket {
    fn drop(&mut self) {
        self.close();
    }
}

struct PubConn {
    stream: TcpStream,
    /// Serialized (channel, body) frame pairs awaiting transmission.
    queue: VecDeque<Vec<u8>>,
    /// Bytes of the queue front already written.
    offset: usize,
    watching_writable: bool,
}

fn io_loop(mut poll: Poll, mut listener: TcpListener, commands: Receiver<IoCommand>) {
    let mut events = Events::with_capacity(MAX_EVENTS);
    let mut conns: HashMap<Token, PubConn> = HashMap::new();
    let mut next_token = FIRST_CONN_TOKEN;

    loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            warn!("publisher poll failed: {e}");
            return;
        }

        let actions: Vec<(Token, bool, bool)> = events
            .iter()
            .map(|event| (event.token(), event.is_readable(), event.is_writable()))
            .collect();

        for (token, readable, writable) in actions {
            match token {
                WAKER_TOKEN => {
                    if drain_commands(&commands, &mut conns) {
                        return;
                    }
                }
                LISTENER_TOKEN => accept_subscribers(&poll, &mut listener, &mut conns, &mut next_token),
                token => {
                    if readable && check_disconnected(&poll, &mut conns, token) {
                        continue;
                    }
                    if writable {
                        flush_conn(&poll, &mut conns, token);
                    }
                }
            }
        }

        // Queues may have grown via commands; push what the kernel accepts.
        let tokens: Vec<Token> = conns
            .iter()
            .filter_map(|(&token, conn)| (!conn.queue.is_empty()).then_some(token))
            .collect();
        for token in tokens {
            flush_conn(&poll, &mut conns, token);
        }
    }
}

/// Apply queued commands; returns true on shutdown.
fn drain_commands(commands: &Receiver<IoCommand>, conns: &mut HashMap<Token, PubConn>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(IoCommand::Publish(data)) => {
                for conn in conns.values_mut() {
                    if conn.queue.len() >= HIGH_WATER_MARK {
                        debug!("subscriber queue full, dropping publication");
                        continue;
                    }
                    conn.queue.push_back(data.clone());
                }
            }
            Ok(IoCommand::Shutdown) | Err(TryRecvError::Disconnected) => return true,
            Err(TryRecvError::Empty) => return false,
        }
    }
}

fn accept_subscribers(
    poll: &Poll,
    listener: &mut TcpListener,
    conns: &mut HashMap<Token, PubConn>,
    next_token: &mut usize,
) {
    loop {
        match listener.accept() {
            Ok((mut stream, _peer)) => {
                let _ = stream.set_nodelay(true);
                let token = Token(*next_token);
                *next_token += 1;
                if let Err(e) = poll
                    .registry()
                    .register(&mut stream, token, Interest::READABLE)
                {
                    warn!("could not register subscriber: {e}");
                    continue;
                }
                conns.insert(
                    token,
                    PubConn {
                        stream,
                        queue: VecDeque::new(),
                        offset: 0,
                        watching_writable: false,
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

/// Subscribers never send payload data; readability means either a closed
/// peer or stray bytes to discard. Returns true when the connection is gone.
fn check_disconnected(poll: &Poll, conns: &mut HashMap<Token, PubConn>, token: Token) -> bool {
    let mut dead = false;
    if let Some(conn) = conns.get_mut(&token) {
        let mut sink = [0u8; 1024];
        loop {
            match conn.stream.read(&mut sink) {
                Ok(0) => {
                    dead = true;
                    break;
                }
                Ok(_) => {} // discard
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    dead = true;
                    break;
                }
            }
        }
    } else {
        return true;
    }

    if dead {
        remove_subscriber(poll, conns, token);
    }
    dead
}

fn flush_conn(poll: &Poll, conns: &mut HashMap<Token, PubConn>, token: Token) {
    let mut dead = false;
    if let Some(conn) = conns.get_mut(&token) {
        loop {
            let Some(front_len) = conn.queue.front().map(Vec::len) else {
                break;
            };
            let chunk = &conn.queue.front().expect("front exists")[conn.offset..];
            match conn.stream.write(chunk) {
                Ok(0) => {
                    dead = true;
                    break;
                }
                Ok(n) => {
                    conn.offset += n;
                    if conn.offset == front_len {
                        conn.queue.pop_front();
                        conn.offset = 0;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !conn.watching_writable {
                        conn.watching_writable = true;
                        let _ = poll.registry().reregister(
                            &mut conn.stream,
                            token,
                            Interest::READABLE | Interest::WRITABLE,
                        );
                    }
                    return;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("dropping subscriber: {e}");
                    dead = true;
                    break;
                }
            }
        }

        if !dead && conn.watching_writable {
            conn.watching_writable = false;
            let _ = poll
                .registry()
                .reregister(&mut conn.stream, token, Interest::READABLE);
        }
    }

    if dead {
        remove_subscriber(poll, conns, token);
    }
}

fn remove_subscriber(poll: &Poll, conns: &mut HashMap<Token, PubConn>, token: Token) {
    if let Some(mut conn) = conns.remove(&token) {
        let _ = poll.registry().deregister(&mut conn.stream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::address::Port;
    use crate::transport::subscriber::SubscriberSocket;
    use std::time::Duration;

    fn bound_publisher() -> (PublisherSocket, u16) {
        let publisher = PublisherSocket::bind("127.0.0.1:*").unwrap();
        let Port::Number(port) = publisher.address().port() else {
            panic!("bound socket must report its port");
        };
        (publisher, port)
    }

    #[test]
    fn test_bind_assigns_concrete_port() {
        let (_publisher, port) = bound_publisher();
        assert_ne!(port, 0);
    }

    #[test]
    fn test_publish_reaches_matching_subscriber() {
        let (publisher, port) = bound_publisher();
        let subscriber =
            SubscriberSocket::connect(&format!("127.0.0.1:{port}"), "alpha").unwrap();

        // The accept happens on the I/O thread; give it a moment.
        std::thread::sleep(Duration::from_millis(50));

        let mut message = OutputBuffer::new();
        message.write(b"payload");
        publisher.publish("alpha", message).unwrap();

        assert_eq!(subscriber.receive().unwrap(), b"payload");
    }

    #[test]
    fn test_channel_filter_discards_other_channels() {
        let (publisher, port) = bound_publisher();
        let subscriber =
            SubscriberSocket::connect(&format!("127.0.0.1:{port}"), "wanted").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let mut other = OutputBuffer::new();
        other.write(b"noise");
        publisher.publish("ignored", other).unwrap();

        let mut wanted = OutputBuffer::new();
        wanted.write(b"signal");
        publisher.publish("wanted", wanted).unwrap();

        assert_eq!(subscriber.receive().unwrap(), b"signal");
    }

    #[test]
    fn test_publish_after_close_is_not_connected() {
        let (publisher, _port) = bound_publisher();
        publisher.close();
        let err = publisher.publish("x", OutputBuffer::new()).unwrap_err();
        assert!(matches!(err, Error::NotConnected(_)));
    }
}
