//! Jackson Labs Fury GPSDO Driver
//!
//! Serial: 115200 baud, 8N1, RTS/CTS hardware flow control, CR (\r)
//! terminator. Only identification is bound; anything else goes through raw
//! `query`.

use crate::factory::DriverFactory;
use labwire_core::{
    Binding, EndpointConfig, FlowControl, FramingConfig, Identification, Instrument,
    PropertyTable, Result, SerialConfig, Session, SessionConfig, Terminator, TimingPolicy,
};
use std::sync::Arc;
use std::time::Duration;

/// Serial baud rate.
pub const BAUD_RATE: u32 = 115_200;

/// Fury property table.
pub fn properties() -> (Arc<Binding<Identification>>, PropertyTable) {
    let identification = Arc::new(Binding::read_only("identification", "*IDN?"));
    let table = PropertyTable::new().with(identification.clone());
    (identification, table)
}

/// Session settings for a Fury on `port`.
pub fn session_config(port: &str) -> SessionConfig {
    SessionConfig::new(EndpointConfig::Serial(
        SerialConfig::new(port, BAUD_RATE).flow_control(FlowControl::Hardware),
    ))
    .with_framing(FramingConfig::new(Terminator::cr()))
    .with_timing(TimingPolicy::new(Duration::ZERO, Duration::from_secs(1)))
}

/// Factory for Fury units.
pub struct FuryFactory;

impl DriverFactory for FuryFactory {
    fn driver_type(&self) -> &'static str {
        "jackson_labs_fury"
    }

    fn name(&self) -> &'static str {
        "Jackson Labs Fury"
    }

    fn default_session(&self, address: &str) -> SessionConfig {
        session_config(address)
    }

    fn properties(&self) -> PropertyTable {
        properties().1
    }
}

/// Jackson Labs Fury GPS-disciplined oscillator.
#[derive(Debug, Clone)]
pub struct Fury {
    instrument: Instrument,
    identification: Arc<Binding<Identification>>,
}

impl Fury {
    /// Wrap an open session.
    pub fn from_session(session: Session) -> Self {
        let (identification, table) = properties();
        Self {
            instrument: Instrument::new("jackson_labs_fury", session, table),
            identification,
        }
    }

    /// Generic instrument handle.
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// `*IDN?`
    pub async fn identify(&self) -> Result<Identification> {
        self.instrument.get(&self.identification).await
    }
}
