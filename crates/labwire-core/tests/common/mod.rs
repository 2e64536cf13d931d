//! Shared helpers for labwire-core integration tests.

#![allow(dead_code)]

use labwire_core::{
    FramingConfig, Session, StreamIO, StreamTransport, Terminator, TimingPolicy,
};
use std::time::Duration;

pub const TEST_TIMEOUT: Duration = Duration::from_millis(500);

pub fn timing() -> TimingPolicy {
    TimingPolicy::new(Duration::ZERO, TEST_TIMEOUT)
}

pub fn session_over<S: StreamIO + 'static>(stream: S, terminator: Terminator) -> Session {
    let transport = Box::new(StreamTransport::from_stream("test", stream));
    Session::with_transport(transport, FramingConfig::new(terminator), timing())
        .expect("valid test timing")
}
