//! Core of the labwire instrument stack.
//!
//! Layers, leaves first:
//!
//! - [`transport`]: raw byte links (serial, TCP, in-memory)
//! - [`framer`]: terminator-delimited frames over a transport
//! - [`session`]: serialized command/response pipe with pacing and deadlines
//! - [`binding`], [`value`], [`token`]: typed properties declared as data
//! - [`table`], [`instrument`]: a driver's property catalog bound to a session
//! - [`worker`], [`blocking`]: message-passing and synchronous front ends
//!
//! [`mock`] provides scripted and simulated devices for tests.

pub mod binding;
pub mod blocking;
pub mod codec;
pub mod config;
pub mod error;
pub mod framer;
pub mod instrument;
pub mod mock;
pub mod session;
pub mod table;
pub mod token;
pub mod transport;
pub mod value;
pub mod worker;

pub use binding::{args, Args, Binding, Field, Property};
pub use config::{
    EndpointConfig, FlowControl, FramingConfig, Parity, SerialConfig, SessionConfig, TcpConfig,
    TimingPolicy,
};
pub use error::{LinkError, Result};
pub use framer::{Frame, Framer, Response, Terminator, TrimPolicy};
pub use instrument::Instrument;
pub use session::{Session, SessionState, SharedSession};
pub use table::{Action, PropertyTable};
pub use transport::{DynStream, DynTransport, ReadOutcome, StreamIO, StreamTransport, Transport};
pub use value::{Identification, PropertyType, StatusBits, Value};
pub use worker::{SessionRequest, SessionWorker, WorkerHandle};
