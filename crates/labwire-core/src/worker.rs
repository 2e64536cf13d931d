//! Session worker: one task owns a session and serves requests from a channel.
//!
//! This is the message-passing alternative to sharing a session behind a mutex.
//! Each request carries a oneshot sender for its reply, so requests from many
//! tasks are serialized by the channel itself.
//!
//! ```text
//! Caller task                        Worker task
//! -----------                        -----------
//! 1. Build request with oneshot
//! 2. Send via mpsc channel    ------>
//!                                    3. Receive request
//!                                    4. Run it against the session
//!                                    5. Send reply
//! 6. Await oneshot receiver   <------
//! ```
//!
//! Dropping every [`WorkerHandle`] or sending [`SessionRequest::Shutdown`] stops
//! the worker and closes the session.

use crate::error::{LinkError, Result};
use crate::framer::Response;
use crate::session::Session;
use crate::table::PropertyTable;
use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default capacity of the request channel.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;

/// Requests served by a [`SessionWorker`].
///
/// Each variant includes a `oneshot::Sender` for the reply. Use the helper
/// constructors such as [`SessionRequest::query`] to get the matching receiver.
#[derive(Debug)]
pub enum SessionRequest {
    /// Write a command.
    Send {
        /// Command text
        command: String,
        /// Reply channel
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// Write a command and read its response.
    Query {
        /// Command text
        command: String,
        /// Deadline override
        timeout: Option<Duration>,
        /// Reply channel
        respond_to: oneshot::Sender<Result<Response>>,
    },
    /// Read a property by name.
    Get {
        /// Property name
        property: String,
        /// Reply channel
        respond_to: oneshot::Sender<Result<Value>>,
    },
    /// Write a property by name from user text.
    Set {
        /// Property name
        property: String,
        /// Value text
        value: String,
        /// Reply channel
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// Run a named action.
    Action {
        /// Action name
        action: String,
        /// Reply channel
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// Reopen the session from its configuration.
    Reopen {
        /// Reply channel
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// Close the session and stop the worker.
    Shutdown {
        /// Reply channel
        respond_to: oneshot::Sender<Result<()>>,
    },
}

impl SessionRequest {
    /// Build a `Send` request.
    pub fn send(command: impl Into<String>) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Send {
                command: command.into(),
                respond_to: tx,
            },
            rx,
        )
    }

    /// Build a `Query` request.
    pub fn query(
        command: impl Into<String>,
        timeout: Option<Duration>,
    ) -> (Self, oneshot::Receiver<Result<Response>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Query {
                command: command.into(),
                timeout,
                respond_to: tx,
            },
            rx,
        )
    }

    /// Build a `Get` request.
    pub fn get(property: impl Into<String>) -> (Self, oneshot::Receiver<Result<Value>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Get {
                property: property.into(),
                respond_to: tx,
            },
            rx,
        )
    }

    /// Build a `Set` request.
    pub fn set(
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Set {
                property: property.into(),
                value: value.into(),
                respond_to: tx,
            },
            rx,
        )
    }

    /// Build an `Action` request.
    pub fn action(action: impl Into<String>) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Action {
                action: action.into(),
                respond_to: tx,
            },
            rx,
        )
    }

    /// Build a `Reopen` request.
    pub fn reopen() -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Reopen { respond_to: tx }, rx)
    }

    /// Build a `Shutdown` request.
    pub fn shutdown() -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { respond_to: tx }, rx)
    }
}

/// Task that owns one session.
pub struct SessionWorker {
    name: String,
    session: Session,
    table: Arc<PropertyTable>,
    requests: mpsc::Receiver<SessionRequest>,
}

impl SessionWorker {
    /// Spawn a worker for `session` on the current runtime.
    pub fn spawn(
        name: impl Into<String>,
        session: Session,
        table: Arc<PropertyTable>,
        capacity: usize,
    ) -> (WorkerHandle, JoinHandle<()>) {
        let name = name.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = Self {
            name: name.clone(),
            session,
            table,
            requests: rx,
        };
        let join = tokio::spawn(worker.run());
        (WorkerHandle { name, requests: tx }, join)
    }

    async fn run(mut self) {
        tracing::debug!(instrument = %self.name, "session worker started");

        while let Some(request) = self.requests.recv().await {
            match request {
                SessionRequest::Send {
                    command,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.session.send(&command).await);
                }
                SessionRequest::Query {
                    command,
                    timeout,
                    respond_to,
                } => {
                    let result = match timeout {
                        Some(timeout) => self.session.query_within(&command, timeout).await,
                        None => self.session.query(&command).await,
                    };
                    let _ = respond_to.send(result);
                }
                SessionRequest::Get {
                    property,
                    respond_to,
                } => {
                    let result = match self.table.property(&property) {
                        Ok(p) => p.read_value(&mut self.session).await,
                        Err(e) => Err(e),
                    };
                    let _ = respond_to.send(result);
                }
                SessionRequest::Set {
                    property,
                    value,
                    respond_to,
                } => {
                    let result = match self.table.property(&property) {
                        Ok(p) => p.write_text(&mut self.session, &value).await,
                        Err(e) => Err(e),
                    };
                    let _ = respond_to.send(result);
                }
                SessionRequest::Action { action, respond_to } => {
                    let result = match self.table.action(&action) {
                        Ok(a) => self.session.send(&a.command).await,
                        Err(e) => Err(e),
                    };
                    let _ = respond_to.send(result);
                }
                SessionRequest::Reopen { respond_to } => {
                    let _ = respond_to.send(self.session.reopen().await);
                }
                SessionRequest::Shutdown { respond_to } => {
                    let _ = respond_to.send(self.session.close().await);
                    tracing::debug!(instrument = %self.name, "session worker shut down");
                    return;
                }
            }
        }

        // All handles dropped
        if let Err(e) = self.session.close().await {
            tracing::warn!(instrument = %self.name, error = %e, "close on worker exit failed");
        }
        tracing::debug!(instrument = %self.name, "session worker stopped");
    }
}

/// Cloneable handle to a [`SessionWorker`].
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    name: String,
    requests: mpsc::Sender<SessionRequest>,
}

impl WorkerHandle {
    /// Instrument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit a request built with one of the [`SessionRequest`] helpers.
    pub async fn submit<T>(
        &self,
        request: SessionRequest,
        reply: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.requests
            .send(request)
            .await
            .map_err(|_| LinkError::WorkerStopped(self.name.clone()))?;
        reply
            .await
            .map_err(|_| LinkError::WorkerStopped(self.name.clone()))?
    }

    /// Write a command.
    pub async fn send(&self, command: impl Into<String>) -> Result<()> {
        let (request, reply) = SessionRequest::send(command);
        self.submit(request, reply).await
    }

    /// Write a command and read its response.
    pub async fn query(&self, command: impl Into<String>) -> Result<Response> {
        let (request, reply) = SessionRequest::query(command, None);
        self.submit(request, reply).await
    }

    /// Read a property by name.
    pub async fn get(&self, property: impl Into<String>) -> Result<Value> {
        let (request, reply) = SessionRequest::get(property);
        self.submit(request, reply).await
    }

    /// Write a property by name.
    pub async fn set(&self, property: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let (request, reply) = SessionRequest::set(property, value);
        self.submit(request, reply).await
    }

    /// Run a named action.
    pub async fn action(&self, action: impl Into<String>) -> Result<()> {
        let (request, reply) = SessionRequest::action(action);
        self.submit(request, reply).await
    }

    /// Reopen the session.
    pub async fn reopen(&self) -> Result<()> {
        let (request, reply) = SessionRequest::reopen();
        self.submit(request, reply).await
    }

    /// Close the session and stop the worker.
    pub async fn shutdown(&self) -> Result<()> {
        let (request, reply) = SessionRequest::shutdown();
        self.submit(request, reply).await
    }
}
