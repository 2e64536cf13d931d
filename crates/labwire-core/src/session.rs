//! Command/response session.
//!
//! A [`Session`] owns one transport and one framer and turns them into a strictly
//! serialized command pipe:
//!
//! ```text
//!   Closed --open()--> Open --close() / I/O failure / stream closed--> Closed
//!                       ^                                               |
//!                       +-------------------reopen()--------------------+
//! ```
//!
//! # Pacing
//!
//! Many instruments drop characters if the next command arrives too soon. After
//! `send()` the session sleeps for `post_send_delay` before returning. After
//! `query()` it records a quiet deadline instead, and the next write waits until
//! that deadline has passed.
//!
//! # Exclusivity
//!
//! Every operation takes `&mut self`, so a query's write and read cannot be split
//! by another command. Callers that share a session use [`SharedSession`] and hold
//! the lock for the whole request/response pair, or hand the session to a
//! [`crate::worker::SessionWorker`].
//!
//! # Failure handling
//!
//! A timeout leaves the session open and the partial bytes buffered. The late
//! reply can still be collected with [`Session::receive`]. If the next operation
//! is a `send()` or `query()` instead, the session first discards the buffered
//! partial and any stale input, so a late reply is never read as the answer to a
//! newer command.
//!
//! An I/O error or a stream that ends closes the session; every later operation
//! fails with `NotOpen` until [`Session::reopen`] succeeds. Nothing reconnects on
//! its own.

use crate::config::{FramingConfig, SessionConfig, TimingPolicy};
use crate::error::{LinkError, Result};
use crate::framer::{Frame, Framer, Response};
use crate::transport::{self, DynTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::instrument;

/// Session shared between tasks. Hold the lock across each request/response pair.
pub type SharedSession = Arc<Mutex<Session>>;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is open and usable
    Open,
    /// Transport is closed; operations fail with `NotOpen`
    Closed,
}

/// One open link to one instrument.
pub struct Session {
    endpoint: String,
    transport: Option<DynTransport>,
    framer: Framer,
    timing: TimingPolicy,
    config: Option<SessionConfig>,
    quiet_until: Option<Instant>,
    awaiting_late_reply: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("timing", &self.timing)
            .finish()
    }
}

impl Session {
    /// Open a session from configuration.
    ///
    /// Framing and timing are validated first; endpoint settings the port
    /// cannot take fail the open with `Connection`. The configuration is kept so
    /// [`Session::reopen`] can rebuild the transport later. If opening fails no
    /// session exists.
    #[instrument(skip(config), fields(endpoint = %config.endpoint), err)]
    pub async fn open(config: SessionConfig) -> Result<Self> {
        config.validate_session()?;
        let transport = transport::open(&config.endpoint).await?;
        let mut session = Self::with_transport(transport, config.framing.clone(), config.timing)?;
        session.config = Some(config);
        tracing::info!("session opened");
        Ok(session)
    }

    /// Build a session around an already-open transport.
    ///
    /// Used for tests and for transports this crate does not open itself. Such a
    /// session cannot be reopened.
    pub fn with_transport(
        transport: DynTransport,
        framing: FramingConfig,
        timing: TimingPolicy,
    ) -> Result<Self> {
        timing.validate()?;
        let framer = Framer::new(framing.terminator)
            .with_trim(framing.trim)
            .with_max_frame_len(framing.max_frame_len);

        Ok(Self {
            endpoint: transport.endpoint().to_string(),
            transport: Some(transport),
            framer,
            timing,
            config: None,
            quiet_until: None,
            awaiting_late_reply: false,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match &self.transport {
            Some(transport) if transport.is_open() => SessionState::Open,
            _ => SessionState::Closed,
        }
    }

    /// Whether the session is open.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Endpoint identity.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Pacing and deadlines in effect.
    pub fn timing(&self) -> TimingPolicy {
        self.timing
    }

    /// Change the pacing and deadlines.
    pub fn set_timing(&mut self, timing: TimingPolicy) -> Result<()> {
        timing.validate()?;
        self.timing = timing;
        Ok(())
    }

    /// Whether an earlier response timed out and has not been collected or
    /// discarded yet.
    pub fn awaiting_late_reply(&self) -> bool {
        self.awaiting_late_reply
    }

    /// Framer owned by this session.
    pub fn framer(&self) -> &Framer {
        &self.framer
    }

    /// Write a command and wait out the post-send delay.
    #[instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    pub async fn send(&mut self, command: &str) -> Result<()> {
        let frame = self.framer.frame(command)?;
        self.ensure_open()?;
        self.resync().await?;
        self.wait_quiet().await;
        self.write_frame(&frame).await?;
        self.quiet_until = None;

        if !self.timing.post_send_delay.is_zero() {
            tokio::time::sleep(self.timing.post_send_delay).await;
        }
        Ok(())
    }

    /// Read one response with the default deadline.
    pub async fn receive(&mut self) -> Result<Response> {
        self.receive_within(self.timing.response_timeout).await
    }

    /// Read one response, waiting at most `timeout`.
    ///
    /// After a timed-out query this collects the late reply.
    #[instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    pub async fn receive_within(&mut self, timeout: Duration) -> Result<Response> {
        self.ensure_open()?;
        self.read_frame(timeout).await
    }

    /// Write a command and read its response with the default deadline.
    pub async fn query(&mut self, command: &str) -> Result<Response> {
        self.query_within(command, self.timing.response_timeout).await
    }

    /// Write a command and read its response, waiting at most `timeout` for it.
    ///
    /// The response deadline starts after the write completes.
    #[instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    pub async fn query_within(&mut self, command: &str, timeout: Duration) -> Result<Response> {
        let frame = self.framer.frame(command)?;
        self.ensure_open()?;
        self.resync().await?;
        self.wait_quiet().await;
        self.write_frame(&frame).await?;

        let result = self.read_frame(timeout).await;
        if self.is_open() {
            self.quiet_until = Some(Instant::now() + self.timing.post_send_delay);
        }
        result
    }

    /// Drop buffered partial frames and drain stale transport input.
    ///
    /// This is the recovery step after a timeout when the late response is not
    /// wanted. Returns the number of bytes discarded.
    #[instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    pub async fn discard_input(&mut self) -> Result<usize> {
        self.ensure_open()?;
        let buffered = self.framer.reset();
        self.awaiting_late_reply = false;
        let drained = match self.transport.as_mut() {
            Some(transport) => transport.clear_input().await,
            None => return Err(LinkError::NotOpen(self.endpoint.clone())),
        };
        let drained = match drained {
            Ok(n) => n,
            Err(e) => return Err(self.fail(e).await),
        };

        let total = buffered + drained;
        if total > 0 {
            tracing::warn!(discarded = total, "discarded stale input");
        }
        Ok(total)
    }

    /// Close the transport. Closing a closed session is a no-op.
    #[instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    pub async fn close(&mut self) -> Result<()> {
        self.framer.reset();
        self.quiet_until = None;
        self.awaiting_late_reply = false;
        if let Some(mut transport) = self.transport.take() {
            transport.close().await?;
            tracing::info!("session closed");
        }
        Ok(())
    }

    /// Close (if needed) and open the transport again from the stored
    /// configuration.
    #[instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    pub async fn reopen(&mut self) -> Result<()> {
        let Some(config) = self.config.clone() else {
            return Err(LinkError::Configuration(format!(
                "session on {} was built from an existing transport and cannot be reopened",
                self.endpoint
            )));
        };

        self.close().await?;
        let transport = transport::open(&config.endpoint).await?;
        self.endpoint = transport.endpoint().to_string();
        self.transport = Some(transport);
        tracing::info!("session reopened");
        Ok(())
    }

    /// Wrap into a [`SharedSession`].
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    // -------------------------------------------------------------------------
    // internals
    // -------------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(LinkError::NotOpen(self.endpoint.clone()))
        }
    }

    /// Throw away the remainder of a timed-out response before the next write.
    async fn resync(&mut self) -> Result<()> {
        if self.awaiting_late_reply {
            tracing::warn!("previous response timed out, discarding its remainder");
            self.discard_input().await?;
        }
        Ok(())
    }

    async fn wait_quiet(&mut self) {
        if let Some(until) = self.quiet_until.take() {
            if until > Instant::now() {
                tokio::time::sleep_until(until).await;
            }
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        tracing::debug!(command = %String::from_utf8_lossy(frame).trim_end(), "send");
        let result = match self.transport.as_mut() {
            Some(transport) => transport.write(frame).await,
            None => return Err(LinkError::NotOpen(self.endpoint.clone())),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn read_frame(&mut self, timeout: Duration) -> Result<Response> {
        let deadline = Instant::now() + timeout;
        let outcome = match self.transport.as_mut() {
            Some(transport) => self.framer.consume(transport.as_mut(), deadline).await,
            None => return Err(LinkError::NotOpen(self.endpoint.clone())),
        };

        match outcome {
            Ok(Frame::Complete(response)) => {
                tracing::debug!(response = %response.text(), "recv");
                self.awaiting_late_reply = false;
                Ok(response)
            }
            Ok(Frame::TimedOut { partial }) => {
                tracing::debug!(
                    partial = %String::from_utf8_lossy(&partial),
                    waited = ?timeout,
                    "response timed out"
                );
                self.awaiting_late_reply = true;
                Err(LinkError::Timeout {
                    waited: timeout,
                    partial,
                })
            }
            Ok(Frame::Closed { partial }) => {
                let reason = if partial.is_empty() {
                    "stream closed by peer while waiting for a response".to_string()
                } else {
                    format!(
                        "stream closed mid-frame after {:?}",
                        String::from_utf8_lossy(&partial)
                    )
                };
                Err(self.fail(LinkError::Protocol(reason)).await)
            }
            Err(e) if e.closes_session() => Err(self.fail(e).await),
            Err(e) => Err(e),
        }
    }

    /// Close the session after a transport-level failure and hand the error back.
    async fn fail(&mut self, error: LinkError) -> LinkError {
        tracing::warn!(error = %error, "transport failure, closing session");
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::warn!(error = %e, "close failed after transport failure");
            }
        }
        self.framer.reset();
        self.quiet_until = None;
        self.awaiting_late_reply = false;
        error
    }
}
