//! Error types for instrument links.
//!
//! Every fallible operation in this crate returns [`LinkError`]. The variants are
//! split along the lines a caller has to act on:
//!
//! - **Open-time**: `Connection`, `Configuration`. Permanent until the endpoint or
//!   the configuration is fixed. Line settings rejected while opening (bad data
//!   bits, zero baud rate) are `Connection`; [`crate::SessionConfig::validate`]
//!   reports the same problems as `Configuration` when checked ahead of time.
//! - **Transport**: `Io`, `Protocol`. The session is closed when one of these is
//!   returned and must be reopened explicitly.
//! - **Transient**: `Timeout`. The session stays open and the partial bytes are
//!   kept by the framer so a late terminator still completes the frame.
//! - **Caller mistakes**: `InvalidCommand`, `InvalidValue`, `ReadOnly`,
//!   `UnknownProperty`, `NotOpen`. Nothing is written to the wire.
//! - **Decode**: `Parse` carries the raw response text.
//!
//! Nothing in this crate retries on its own; [`LinkError::is_retryable`] tells the
//! caller which failures are worth another attempt.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the link error type.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Primary error type for transports, framing, sessions and property bindings.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The endpoint could not be opened.
    ///
    /// Missing device node, unreachable address, permission denied, connect
    /// timeout, or line settings rejected by the driver.
    #[error("Failed to open {endpoint}: {reason}")]
    Connection {
        /// Serial path or `host:port`
        endpoint: String,
        /// Underlying cause
        reason: String,
    },

    /// A read or write on an open transport failed.
    ///
    /// Broken pipe, device unplugged, peer reset. The owning session is closed.
    #[error("I/O error on {endpoint}: {source}")]
    Io {
        /// Serial path or `host:port`
        endpoint: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// No terminator arrived before the deadline.
    ///
    /// `partial` holds whatever was buffered when the deadline passed. Those bytes
    /// are still held by the framer.
    #[error("No response terminator within {waited:?} ({} partial bytes buffered)", .partial.len())]
    Timeout {
        /// How long the operation waited
        waited: Duration,
        /// Bytes received without a terminator
        partial: Vec<u8>,
    },

    /// The byte stream violated the framing rules.
    ///
    /// Stream closed in the middle of a frame, or a frame grew past the
    /// configured maximum length.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A response could not be decoded into the property's type.
    #[error("Failed to parse '{property}' from response {raw:?}: {reason}")]
    Parse {
        /// Property name
        property: String,
        /// Raw response text
        raw: String,
        /// Parser message
        reason: String,
    },

    /// Attempted to set a property that has no set command.
    #[error("Property '{0}' is read-only")]
    ReadOnly(String),

    /// Operation on a closed session.
    #[error("Session on {0} is not open")]
    NotOpen(String),

    /// The command cannot be framed, usually because it contains the terminator.
    #[error("Invalid command {command:?}: {reason}")]
    InvalidCommand {
        /// Offending command text
        command: String,
        /// Why it was rejected
        reason: String,
    },

    /// A value was rejected before encoding (out of range, unknown token).
    #[error("Invalid value for '{property}': {reason}")]
    InvalidValue {
        /// Property name
        property: String,
        /// Why it was rejected
        reason: String,
    },

    /// No property with this name is registered on the instrument.
    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    /// Semantically invalid configuration (empty terminator, zero timeout, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The session worker task has exited and can no longer serve requests.
    #[error("Session worker for {0} has stopped")]
    WorkerStopped(String),
}

impl LinkError {
    /// Whether the same operation may succeed if simply attempted again.
    ///
    /// Only timeouts qualify. Transport failures need a `reopen()` first and
    /// everything else needs a different request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LinkError::Timeout { .. })
    }

    /// Whether this error closed the session it came from.
    pub fn closes_session(&self) -> bool {
        matches!(self, LinkError::Io { .. } | LinkError::Protocol(_))
    }

    pub(crate) fn io(endpoint: impl Into<String>, source: std::io::Error) -> Self {
        LinkError::Io {
            endpoint: endpoint.into(),
            source,
        }
    }

    pub(crate) fn connection(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        LinkError::Connection {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}
