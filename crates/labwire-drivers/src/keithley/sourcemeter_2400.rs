//! Keithley 2400 SourceMeter Driver
//!
//! Reference: Keithley Series 2400 SourceMeter User's Manual, section 18 (SCPI)
//!
//! Protocol Overview:
//! - Format: SCPI (`:SOURCE:CURRENT 0.000100`)
//! - Serial: 9600 baud, 8N1, RTS/CTS hardware flow control
//! - Terminator: CR (\r)
//! - Some replies carry a trailing space before the CR, so only trailing
//!   whitespace is trimmed
//!
//! The driver runs the instrument as a fixed current source with voltage
//! compliance.

use crate::factory::DriverFactory;
use labwire_core::{
    args, codec, Binding, EndpointConfig, FlowControl, FramingConfig, Identification, Instrument,
    PropertyTable, Response, Result, SerialConfig, Session, SessionConfig, Terminator,
    TimingPolicy, TrimPolicy,
};
use std::sync::Arc;
use std::time::Duration;

/// Serial baud rate.
pub const BAUD_RATE: u32 = 9600;

/// Response deadline.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default voltage compliance for [`SourceMeter2400::configure_current_source`].
pub const DEFAULT_COMPLIANCE_VOLTS: f64 = 3.1;

/// Default current range for [`SourceMeter2400::configure_current_source`].
pub const DEFAULT_MAX_CURRENT_AMPS: f64 = 20e-3;

fn scpi_float(value: f64) -> std::result::Result<String, String> {
    if value.is_finite() {
        Ok(codec::fixed(value, 6))
    } else {
        Err(format!("{value} is not a finite number"))
    }
}

/// Voltage and current from one `:MEASURE:VOLTAGE?`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMeterState {
    /// Volts
    pub voltage: f64,
    /// Amps
    pub current: f64,
}

/// Every 2400 property, typed.
#[derive(Debug)]
pub struct SourceMeterProperties {
    /// `*IDN?`
    pub identification: Arc<Binding<Identification>>,
    /// `:OUTPUT:STATE`
    pub output: Arc<Binding<bool>>,
    /// `:MEASURE:CURRENT?`
    pub current: Arc<Binding<f64>>,
    /// `:MEASURE:VOLTAGE?`, voltage and current
    pub voltage: Arc<Binding<(f64, f64)>>,
    /// `:SOURCE:CURRENT`, amps
    pub current_amplitude: Arc<Binding<f64>>,
}

impl SourceMeterProperties {
    /// Build the bindings.
    pub fn new() -> Self {
        Self {
            identification: Arc::new(Binding::read_only("identification", "*IDN?")),
            output: Arc::new(Binding::read_write(
                "output",
                ":OUTPUT:STATE?",
                ":OUTPUT:STATE {value}",
            )),
            current: Arc::new(Binding::read_only("current", ":MEASURE:CURRENT?")),
            voltage: Arc::new(Binding::read_only("voltage", ":MEASURE:VOLTAGE?")),
            current_amplitude: Arc::new(
                Binding::new("current_amplitude", ":SOURCE:CURRENT?", |r: &Response| {
                    codec::float(&r.text())
                })
                .settable_with(":SOURCE:CURRENT {value}", |v: &f64| {
                    Ok(args([("value", scpi_float(*v)?)]))
                }),
            ),
        }
    }

    /// Erased table for access by name.
    pub fn table(&self) -> PropertyTable {
        PropertyTable::new()
            .with(self.identification.clone())
            .with(self.output.clone())
            .with(self.current.clone())
            .with(self.voltage.clone())
            .with(self.current_amplitude.clone())
    }
}

impl Default for SourceMeterProperties {
    fn default() -> Self {
        Self::new()
    }
}

/// Session settings for a 2400 on `port`.
pub fn session_config(port: &str) -> SessionConfig {
    SessionConfig::new(EndpointConfig::Serial(
        SerialConfig::new(port, BAUD_RATE).flow_control(FlowControl::Hardware),
    ))
    .with_framing(FramingConfig::new(Terminator::cr()).trim(TrimPolicy::Trailing))
    .with_timing(TimingPolicy::new(Duration::ZERO, RESPONSE_TIMEOUT))
}

/// Factory for 2400 instruments.
pub struct SourceMeter2400Factory;

impl DriverFactory for SourceMeter2400Factory {
    fn driver_type(&self) -> &'static str {
        "keithley_2400"
    }

    fn name(&self) -> &'static str {
        "Keithley 2400 SourceMeter"
    }

    fn default_session(&self, address: &str) -> SessionConfig {
        session_config(address)
    }

    fn properties(&self) -> PropertyTable {
        SourceMeterProperties::new().table()
    }
}

/// Keithley 2400 source meter.
#[derive(Debug, Clone)]
pub struct SourceMeter2400 {
    instrument: Instrument,
    props: Arc<SourceMeterProperties>,
}

impl SourceMeter2400 {
    /// Wrap an open session.
    pub fn from_session(session: Session) -> Self {
        let props = Arc::new(SourceMeterProperties::new());
        let instrument = Instrument::new("keithley_2400", session, props.table());
        Self { instrument, props }
    }

    /// Generic instrument handle.
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Typed bindings.
    pub fn properties(&self) -> &SourceMeterProperties {
        &self.props
    }

    /// Turn the output on or off.
    pub async fn set_output(&self, on: bool) -> Result<()> {
        self.instrument.set(&self.props.output, &on).await
    }

    /// Measured current in amps.
    pub async fn measure_current(&self) -> Result<f64> {
        self.instrument.get(&self.props.current).await
    }

    /// Measured voltage and current.
    pub async fn state(&self) -> Result<SourceMeterState> {
        let (voltage, current) = self.instrument.get(&self.props.voltage).await?;
        Ok(SourceMeterState { voltage, current })
    }

    /// Programmed source current in amps.
    pub async fn current_amplitude(&self) -> Result<f64> {
        self.instrument.get(&self.props.current_amplitude).await
    }

    /// Program the source current in amps.
    pub async fn set_current_amplitude(&self, amps: f64) -> Result<()> {
        self.instrument
            .set(&self.props.current_amplitude, &amps)
            .await
    }

    /// Switch to fixed current sourcing with voltage compliance.
    ///
    /// The output is turned off first and the amplitude left at zero. The whole
    /// sequence runs under one session lock.
    pub async fn configure_current_source(&self, compliance: f64, max_current: f64) -> Result<()> {
        let compliance = scpi_float(compliance).map_err(|reason| invalid("compliance", reason))?;
        let max_current = scpi_float(max_current).map_err(|reason| invalid("max_current", reason))?;

        let mut session = self.instrument.session().lock().await;
        self.props.output.set(&mut session, &false).await?;
        session.send(":SOURCE:FUNC:MODE CURRENT").await?;
        session.send(":SOURCE:CURRENT:MODE FIX").await?;
        session
            .send(&format!(":SENSE:VOLT:PROT:LEV {compliance}"))
            .await?;
        session
            .send(&format!(":SOURCE:CURRENT:RANGE {max_current}"))
            .await?;
        self.props.current_amplitude.set(&mut session, &0.0).await
    }
}

fn invalid(property: &str, reason: String) -> labwire_core::LinkError {
    labwire_core::LinkError::InvalidValue {
        property: property.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_reply_parses_pair() {
        let props = SourceMeterProperties::new();
        let (v, i) = props
            .voltage
            .decode(&"+1.234560E+00,+1.000000E-04".into())
            .unwrap();
        assert_eq!(v, 1.23456);
        assert_eq!(i, 1.0e-4);
    }

    #[test]
    fn test_amplitude_template() {
        let props = SourceMeterProperties::new();
        assert_eq!(
            props.current_amplitude.encode(&1e-4).unwrap(),
            ":SOURCE:CURRENT 0.000100"
        );
        assert_eq!(props.output.encode(&true).unwrap(), ":OUTPUT:STATE 1");
    }

    #[test]
    fn test_cr_framing_trims_trailing_only() {
        let config = session_config("/dev/ttyUSB3");
        assert_eq!(config.framing.terminator, Terminator::cr());
        assert_eq!(config.framing.trim, TrimPolicy::Trailing);
    }
}
