// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC server: session registry, command dispatch, publish side-channel.
//!
//! A server binds a replier to the embedder's address and a publisher to the
//! same host on a system-assigned port (the *callback port*, reported to
//! clients in every create reply). One main-loop thread serves requests;
//! task procedures run synchronously on it, so a slow task stalls dispatch
//! for every session. That is deliberate: device backends own their own
//! threads and publish events through the session handle.
//!
//! Dispatch per request:
//! 1. decode `(identifier, command)` from the head of the message;
//! 2. a non-create command on an uninitialized session answers
//!    `operation_not_supported`;
//! 3. ordinary tasks are tried in configuration order (put frequent
//!    commands first);
//! 4. create installs the session's publish closure and appends the
//!    callback port to the reply; a create that leaves the value absent
//!    erases the entry; double create answers
//!    `connection_already_in_progress`;
//! 5. destroy runs its task and erases the entry;
//! 6. anything else answers `operation_not_supported`; a panicking task
//!    answers `state_not_recoverable`.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::codec::{Decode, Encode, InputBuffer, OutputBuffer};
use crate::error::{Error, Result};
use crate::fault;
use crate::guid::Guid;
use crate::transport::{Address, Port, PublisherSocket, ReplySocket};
use crate::Command;

/// Emits one message on the session's publish channel.
pub type PublishFn = Arc<dyn Fn(OutputBuffer) -> Result<()> + Send + Sync>;

/// Task procedure: consumes the request payload that follows the command,
/// returns the complete reply (leading error code included).
pub type TaskFn<T> = Box<dyn FnMut(&mut Handle<T>, &mut InputBuffer<'_>) -> OutputBuffer + Send>;

/// Server-side session state, keyed by the client's identifier.
pub struct Handle<T> {
    /// The embedder's session value. Only the create task moves it from
    /// `None` to `Some`; only the destroy task (or server stop) the reverse.
    pub value: Option<T>,
    publish: Option<PublishFn>,
}

impl<T> Handle<T> {
    fn new() -> Self {
        Self {
            value: None,
            publish: None,
        }
    }

    /// Emit `message` on this session's publish channel.
    pub fn publish(&self, message: OutputBuffer) -> Result<()> {
        match &self.publish {
            Some(publish) => publish(message),
            None => Err(Error::NotConnected("session has no publish channel".into())),
        }
    }

    /// Clone the publish closure for use from a backend thread.
    pub fn publish_fn(&self) -> Option<PublishFn> {
        self.publish.clone()
    }
}

/// One `(command, procedure)` dispatch entry.
pub struct Task<C, T> {
    pub cmd: C,
    pub run: TaskFn<T>,
}

impl<C, T> Task<C, T> {
    pub fn new<F>(cmd: C, run: F) -> Self
    where
        F: FnMut(&mut Handle<T>, &mut InputBuffer<'_>) -> OutputBuffer + Send + 'static,
    {
        Self {
            cmd,
            run: Box::new(run),
        }
    }
}

/// Dispatch configuration: the create and destroy tasks plus the ordinary
/// tasks in priority order.
pub struct ServerConfig<C, T> {
    pub create: Task<C, T>,
    pub destroy: Task<C, T>,
    pub tasks: Vec<Task<C, T>>,
}

pub struct Server<C: Command, T: Send + 'static> {
    replier: Arc<ReplySocket>,
    publisher: Arc<PublisherSocket>,
    callback_port: u16,
    handles: Arc<Mutex<HashMap<Guid, Handle<T>>>>,
    config: Arc<Mutex<ServerConfig<C, T>>>,
    thread: Option<JoinHandle<()>>,
}

impl<C: Command, T: Send + 'static> Server<C, T> {
    /// Bind to `address` and start serving.
    ///
    /// The publisher binds to the replier's host with a system-assigned
    /// port, which becomes the callback port appended to create replies.
    pub fn start(config: ServerConfig<C, T>, address: &str) -> Result<Self> {
        let replier = Arc::new(ReplySocket::bind(address)?);

        let publisher_address = replier.address().with_any_port();
        let publisher = Arc::new(PublisherSocket::bind(&publisher_address.to_string())?);
        let Port::Number(callback_port) = publisher.address().port() else {
            return Err(Error::NotConnected(
                "publisher did not report its bound port".into(),
            ));
        };

        let handles: Arc<Mutex<HashMap<Guid, Handle<T>>>> = Arc::new(Mutex::new(HashMap::new()));
        let config = Arc::new(Mutex::new(config));

        let loop_replier = Arc::clone(&replier);
        let loop_publisher = Arc::clone(&publisher);
        let loop_handles = Arc::clone(&handles);
        let loop_config = Arc::clone(&config);
        let thread = std::thread::Builder::new()
            .name("tether-server".into())
            .spawn(move || loop {
                let result = loop_replier.process(|input| {
                    dispatch(
                        &loop_publisher,
                        callback_port,
                        &loop_handles,
                        &loop_config,
                        input,
                    )
                });
                match result {
                    Ok(()) => {}
                    // Connection loss is the shutdown signal.
                    Err(Error::NotConnected(_)) => break,
                    Err(e) => error!("request processing failed: {e}"),
                }
            })
            .map_err(Error::Io)?;

        Ok(Self {
            replier,
            publisher,
            callback_port,
            handles,
            config,
            thread: Some(thread),
        })
    }

    /// The replier's bound address, with the concrete port.
    pub fn address(&self) -> &Address {
        self.replier.address()
    }

    /// The publisher's system-assigned port.
    pub fn callback_port(&self) -> u16 {
        self.callback_port
    }

    /// Number of live (created, not yet destroyed) sessions.
    pub fn session_count(&self) -> usize {
        self.handles
            .lock()
            .values()
            .filter(|handle| handle.value.is_some())
            .count()
    }

    /// Destroy every live session, stop the main loop, release the sockets.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        {
            let mut config = self.config.lock();
            let mut handles = self.handles.lock();
            for handle in handles.values_mut() {
                let empty: [u8; 0] = [];
                let mut input = InputBuffer::new(&empty);
                // Backend teardown failures cannot block shutdown.
                let _ = fault::barrier(|| Ok((config.destroy.run)(handle, &mut input)));
            }
            handles.clear();
        }

        self.replier.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.publisher.close();
    }
}

impl<C: Command, T: Send + 'static> Drop for Server<C, T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn error_reply(code: i32) -> OutputBuffer {
    let mut reply = OutputBuffer::new();
    code.encode(&mut reply);
    reply
}

fn run_task<T>(
    task: &mut TaskFn<T>,
    handle: &mut Handle<T>,
    input: &mut InputBuffer<'_>,
) -> OutputBuffer {
    match fault::barrier(|| Ok(task(handle, input))) {
        Ok(reply) => reply,
        Err(e) => {
            error!("task procedure failed: {e}");
            error_reply(e.code())
        }
    }
}

fn dispatch<C: Command, T>(
    publisher: &Arc<PublisherSocket>,
    callback_port: u16,
    handles: &Mutex<HashMap<Guid, Handle<T>>>,
    config: &Mutex<ServerConfig<C, T>>,
    input: &mut InputBuffer<'_>,
) -> OutputBuffer {
    let (identifier, code) = match <(Guid, i32)>::decode(input) {
        Ok(head) => head,
        Err(e) => {
            warn!("request head did not parse: {e}");
            return error_reply(Error::NotRecoverable(e.to_string()).code());
        }
    };

    let mut config = config.lock();
    let config = &mut *config;
    let create_code = config.create.cmd.to_wire();
    let destroy_code = config.destroy.cmd.to_wire();

    let mut handles = handles.lock();

    let initialized = handles
        .get(&identifier)
        .is_some_and(|handle| handle.value.is_some());
    if !initialized && code != create_code {
        return error_reply(Error::NotSupported.code());
    }

    // Ordinary commands first: configuration order expresses priority.
    for task in config.tasks.iter_mut() {
        if task.cmd.to_wire() == code {
            let handle = handles.entry(identifier).or_insert_with(Handle::new);
            return run_task(&mut task.run, handle, input);
        }
    }

    if code == create_code {
        let handle = handles.entry(identifier).or_insert_with(Handle::new);
        if handle.value.is_some() {
            return error_reply(Error::AlreadyInProgress.code());
        }

        let mut reply = run_task(&mut config.create.run, handle, input);

        if handle.value.is_none() {
            // The create task did not take the session; forget the entry.
            handles.remove(&identifier);
        } else {
            let channel = identifier.to_string();
            let publisher = Arc::clone(publisher);
            handle.publish = Some(Arc::new(move |message| publisher.publish(&channel, message)));
            (callback_port as i32).encode(&mut reply);
        }
        return reply;
    }

    if code == destroy_code {
        let handle = handles.entry(identifier).or_insert_with(Handle::new);
        let reply = run_task(&mut config.destroy.run, handle, input);
        handles.remove(&identifier);
        return reply;
    }

    error_reply(Error::NotSupported.code())
}
