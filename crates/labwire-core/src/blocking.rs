//! Blocking facade for synchronous callers.
//!
//! Polling loops that refresh a plot or a log file just want
//! `get(property)` to return a value. [`BlockingInstrument`] owns a
//! current-thread runtime and drives the async instrument on it, so such callers
//! never have to run an event loop themselves.
//!
//! Do not use it from inside an async context; `block_on` panics there.

use crate::binding::{Binding, Field};
use crate::config::SessionConfig;
use crate::error::{LinkError, Result};
use crate::framer::Response;
use crate::instrument::Instrument;
use crate::session::Session;
use crate::table::PropertyTable;
use crate::value::Value;
use tokio::runtime::{Builder, Runtime};

/// Synchronous wrapper around an [`Instrument`].
#[derive(Debug)]
pub struct BlockingInstrument {
    runtime: Runtime,
    instrument: Instrument,
}

impl BlockingInstrument {
    /// Open a session and attach `table`.
    pub fn open(name: impl Into<String>, config: SessionConfig, table: PropertyTable) -> Result<Self> {
        let runtime = build_runtime()?;
        let session = runtime.block_on(Session::open(config))?;
        Ok(Self {
            runtime,
            instrument: Instrument::new(name, session, table),
        })
    }

    /// Wrap an existing instrument.
    ///
    /// The instrument's transport must not be bound to another runtime's reactor
    /// (a serial or TCP stream opened elsewhere); in-memory streams are fine.
    pub fn from_instrument(instrument: Instrument) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            instrument,
        })
    }

    /// Underlying async instrument.
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Run an arbitrary future against the instrument.
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Read a typed property.
    pub fn get<T: Send + 'static>(&self, binding: &Binding<T>) -> Result<T> {
        self.runtime.block_on(self.instrument.get(binding))
    }

    /// Write a typed property.
    pub fn set<T: Send + 'static>(&self, binding: &Binding<T>, value: &T) -> Result<()> {
        self.runtime.block_on(self.instrument.set(binding, value))
    }

    /// Read one member of a composite property.
    pub fn get_field<T: Send + 'static, F: Send + 'static>(&self, field: &Field<T, F>) -> Result<F> {
        self.runtime.block_on(self.instrument.get_field(field))
    }

    /// Read a property by name.
    pub fn get_by_name(&self, property: &str) -> Result<Value> {
        self.runtime.block_on(self.instrument.get_by_name(property))
    }

    /// Write a property by name.
    pub fn set_by_name(&self, property: &str, value: &str) -> Result<()> {
        self.runtime.block_on(self.instrument.set_by_name(property, value))
    }

    /// Send a raw command and read the response.
    pub fn query(&self, command: &str) -> Result<Response> {
        self.runtime.block_on(self.instrument.query(command))
    }

    /// Close the session.
    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.instrument.close())
    }
}

fn build_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| LinkError::Configuration(format!("failed to start blocking runtime: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FramingConfig, TimingPolicy};
    use crate::framer::Terminator;
    use crate::mock::SimulatedDevice;
    use crate::transport::StreamTransport;
    use std::time::Duration;

    #[test]
    fn test_blocking_get_and_set_by_name() {
        // The simulated device runs on its own worker thread
        let device_runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let stream = device_runtime.block_on(async {
            SimulatedDevice::new(Terminator::lf())
                .with_register("RANGE?", "1")
                .spawn()
        });

        let transport = Box::new(StreamTransport::from_stream("sim", stream));
        let session = Session::with_transport(
            transport,
            FramingConfig::new(Terminator::lf()),
            TimingPolicy::new(Duration::ZERO, Duration::from_millis(500)),
        )
        .unwrap();
        let table = PropertyTable::new().with(std::sync::Arc::new(
            Binding::<u8>::read_write("range", "RANGE?", "RANGE {value}"),
        ));

        let blocking =
            BlockingInstrument::from_instrument(Instrument::new("sim", session, table)).unwrap();
        assert_eq!(blocking.get_by_name("range").unwrap(), Value::Int(1));
        blocking.set_by_name("range", "3").unwrap();
        assert_eq!(blocking.get_by_name("range").unwrap(), Value::Int(3));
        blocking.close().unwrap();
    }
}
