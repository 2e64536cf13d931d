//! Lake Shore Model 218 Temperature Monitor Driver
//!
//! Reference: Lake Shore Model 218 User's Manual, table 6-1 and section 6.2
//!
//! Protocol Overview:
//! - Serial: 9600 baud, 7 data bits, odd parity, 1 stop bit, no flow control
//! - Terminator: LF (\n)
//! - Pacing: nothing may be sent for 50 ms after a command, or after a
//!   response completes, and no more than 20 exchanges per second
//!
//! Eight sensor inputs. `CRDG? 0` returns all eight Celsius readings in one
//! comma-separated reply; `CRDG? n` returns one.

use crate::factory::DriverFactory;
use labwire_core::{
    Action, Binding, EndpointConfig, FramingConfig, Identification, Instrument, Parity,
    PropertyTable, Result, SerialConfig, Session, SessionConfig, StatusBits, Terminator,
    TimingPolicy,
};
use std::sync::Arc;
use std::time::Duration;

/// Serial baud rate.
pub const BAUD_RATE: u32 = 9600;

/// Quiet time required after each exchange.
pub const COMMUNICATION_DELAY: Duration = Duration::from_millis(50);

/// Response deadline.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Number of sensor inputs.
pub const CHANNELS: usize = 8;

/// Every Model 218 property, typed.
#[derive(Debug)]
pub struct Monitor218Properties {
    /// `*IDN?`
    pub identification: Arc<Binding<Identification>>,
    /// `*ESE`, standard event status enable mask
    pub enabled_status_bits: Arc<Binding<u8>>,
    /// `*ESR?`, standard event status register
    pub event_status: Arc<Binding<StatusBits>>,
    /// `OPC`
    pub operation_complete: Arc<Binding<bool>>,
    /// `*SRE`, service request enable mask
    pub service_request_enable: Arc<Binding<u8>>,
    /// `*STB?`
    pub status_byte: Arc<Binding<StatusBits>>,
    /// `*TST?`
    pub self_test_failed: Arc<Binding<bool>>,
    /// `AOUT?`
    pub analog_output_percentage: Arc<Binding<f64>>,
    /// `BAUD`, as the instrument's baud code
    pub baud: Arc<Binding<u8>>,
    /// `CRDG? 0`
    pub celsius_all: Arc<Binding<Vec<f64>>>,
    /// `CRDG? 1` through `CRDG? 8`
    pub celsius: [Arc<Binding<f64>>; CHANNELS],
}

impl Monitor218Properties {
    /// Build the bindings.
    pub fn new() -> Self {
        Self {
            identification: Arc::new(Binding::read_only("identification", "*IDN?")),
            enabled_status_bits: Arc::new(Binding::read_write(
                "enabled_status_bits",
                "*ESE?",
                "*ESE {value}",
            )),
            event_status: Arc::new(Binding::read_only("event_status", "*ESR?")),
            operation_complete: Arc::new(Binding::read_write(
                "operation_complete",
                "OPC?",
                "OPC {value}",
            )),
            service_request_enable: Arc::new(Binding::read_write(
                "service_request_enable",
                "*SRE?",
                "*SRE {value}",
            )),
            status_byte: Arc::new(Binding::read_only("status_byte", "*STB?")),
            self_test_failed: Arc::new(Binding::read_only("self_test_failed", "*TST?")),
            analog_output_percentage: Arc::new(Binding::read_only(
                "analog_output_percentage",
                "AOUT?",
            )),
            baud: Arc::new(Binding::read_write("baud", "BAUD?", "BAUD {value}")),
            celsius_all: Arc::new(Binding::read_only("celsius_all", "CRDG? 0")),
            celsius: std::array::from_fn(|i| {
                let channel = i + 1;
                Arc::new(Binding::read_only(
                    format!("celsius_{channel}"),
                    format!("CRDG? {channel}"),
                ))
            }),
        }
    }

    /// Erased table for access by name.
    pub fn table(&self) -> PropertyTable {
        let mut table = PropertyTable::new()
            .with(self.identification.clone())
            .with(self.enabled_status_bits.clone())
            .with(self.event_status.clone())
            .with(self.operation_complete.clone())
            .with(self.service_request_enable.clone())
            .with(self.status_byte.clone())
            .with(self.self_test_failed.clone())
            .with(self.analog_output_percentage.clone())
            .with(self.baud.clone())
            .with(self.celsius_all.clone());
        for channel in &self.celsius {
            table = table.with(channel.clone());
        }
        table
            .with_action(Action::new("reset", "*RST", "Reset to power-up settings"))
            .with_action(Action::new(
                "clear_interface",
                "*CLS",
                "Clear status registers and the output queue",
            ))
    }
}

impl Default for Monitor218Properties {
    fn default() -> Self {
        Self::new()
    }
}

/// Session settings for a Model 218 on `port`.
pub fn session_config(port: &str) -> SessionConfig {
    SessionConfig::new(EndpointConfig::Serial(
        SerialConfig::new(port, BAUD_RATE)
            .data_bits(7)
            .parity(Parity::Odd)
            .stop_bits(1),
    ))
    .with_framing(FramingConfig::new(Terminator::lf()))
    .with_timing(TimingPolicy::new(COMMUNICATION_DELAY, RESPONSE_TIMEOUT))
}

/// Factory for Model 218 instruments.
pub struct TemperatureMonitor218Factory;

impl DriverFactory for TemperatureMonitor218Factory {
    fn driver_type(&self) -> &'static str {
        "lakeshore_218"
    }

    fn name(&self) -> &'static str {
        "Lake Shore 218 Temperature Monitor"
    }

    fn default_session(&self, address: &str) -> SessionConfig {
        session_config(address)
    }

    fn properties(&self) -> PropertyTable {
        Monitor218Properties::new().table()
    }
}

/// Model 218 temperature monitor.
#[derive(Debug, Clone)]
pub struct TemperatureMonitor218 {
    instrument: Instrument,
    props: Arc<Monitor218Properties>,
}

impl TemperatureMonitor218 {
    /// Wrap an open session.
    pub fn from_session(session: Session) -> Self {
        let props = Arc::new(Monitor218Properties::new());
        let instrument = Instrument::new("lakeshore_218", session, props.table());
        Self { instrument, props }
    }

    /// Generic instrument handle.
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Typed bindings.
    pub fn properties(&self) -> &Monitor218Properties {
        &self.props
    }

    /// All eight Celsius readings, channel 1 first.
    pub async fn celsius_all(&self) -> Result<Vec<f64>> {
        self.instrument.get(&self.props.celsius_all).await
    }

    /// Celsius reading of one channel (1-8).
    pub async fn celsius(&self, channel: usize) -> Result<f64> {
        let binding = channel
            .checked_sub(1)
            .and_then(|i| self.props.celsius.get(i))
            .ok_or_else(|| labwire_core::LinkError::InvalidValue {
                property: "celsius".to_string(),
                reason: format!("channel must be 1-{CHANNELS}, got {channel}"),
            })?;
        self.instrument.get(binding).await
    }

    /// Delete a user curve.
    pub async fn delete_curve(&self, curve: u8) -> Result<()> {
        self.instrument.send(&format!("CRVDEL {curve}")).await
    }

    /// `*CLS`
    pub async fn clear_interface(&self) -> Result<()> {
        self.instrument.run_action("clear_interface").await
    }

    /// `*RST`
    pub async fn reset(&self) -> Result<()> {
        self.instrument.run_action("reset").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_bindings() {
        let props = Monitor218Properties::new();
        assert_eq!(props.celsius[0].name(), "celsius_1");
        assert_eq!(props.celsius[7].query_command(), "CRDG? 8");
        assert_eq!(props.table().len(), 10 + CHANNELS);
    }

    #[test]
    fn test_all_readings_parse_as_list() {
        let props = Monitor218Properties::new();
        let readings = props
            .celsius_all
            .decode(&"+21.50,+21.75,-195.80,+0.000,+0.000,+0.000,+0.000,+0.000".into())
            .unwrap();
        assert_eq!(readings.len(), CHANNELS);
        assert_eq!(readings[2], -195.8);
    }

    #[test]
    fn test_pacing_is_fifty_ms() {
        let config = session_config("/dev/ttyUSB1");
        assert_eq!(config.timing.post_send_delay, Duration::from_millis(50));
        assert_eq!(config.framing.terminator, Terminator::lf());
    }
}
