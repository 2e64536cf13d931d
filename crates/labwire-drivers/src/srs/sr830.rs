//! Stanford Research Systems SR830 Lock-In Amplifier Driver
//!
//! Reference: SR830 DSP Lock-In Amplifier manual, chapter 5
//!
//! Protocol Overview:
//! - Serial: 19200 baud, 8N1, RTS/CTS hardware flow control
//! - Terminator: LF (\n)
//! - Settings are integer indices into tables in the manual (sensitivity
//!   0 = 2 nV through 26 = 1 V, time constant 0 = 10 us through 19 = 30 ks)
//! - Status registers can be read whole (`*ESR?`) or one bit at a time
//!   (`*ESR? 5` replies `0` or `1`)
//!
//! `SNAP?` reads two to six outputs at the same instant, which single
//! `OUTP?` queries cannot do.

use crate::factory::DriverFactory;
use labwire_core::{
    codec, Action, Binding, EndpointConfig, FlowControl, FramingConfig, Identification,
    Instrument, LinkError, PropertyTable, PropertyType, Response, Result, SerialConfig, Session,
    SessionConfig, StatusBits, Terminator, TimingPolicy,
};
use std::sync::Arc;
use std::time::Duration;

/// Serial baud rate.
pub const BAUD_RATE: u32 = 19200;

/// Spacing after each command.
pub const COMMUNICATION_DELAY: Duration = Duration::from_millis(1);

/// Response deadline.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Decimal places used for floating point settings.
const FLOAT_PRECISION: usize = 6;

labwire_core::wire_token! {
    /// Reference source (`FMOD`).
    pub enum ReferenceSource {
        /// External reference input
        External => ("0", "external"),
        /// Internal oscillator
        Internal => ("1", "internal"),
    }
}

labwire_core::wire_token! {
    /// Front panel access (`LOCL`).
    pub enum LocalMode {
        /// Front panel active
        Local => ("0", "local"),
        /// Front panel disabled except the local key
        Remote => ("1", "remote"),
        /// Front panel fully disabled
        LocalLockout => ("2", "lockout"),
    }
}

labwire_core::wire_token! {
    /// Values selectable in a `SNAP?` read.
    pub enum SnapParameter {
        /// X
        X => ("1", "X"),
        /// Y
        Y => ("2", "Y"),
        /// R
        R => ("3", "R"),
        /// Theta
        Theta => ("4", "theta"),
        /// Aux input 1
        Aux1 => ("5", "aux1"),
        /// Aux input 2
        Aux2 => ("6", "aux2"),
        /// Aux input 3
        Aux3 => ("7", "aux3"),
        /// Aux input 4
        Aux4 => ("8", "aux4"),
        /// Reference frequency
        ReferenceFrequency => ("9", "frequency"),
        /// Channel 1 display
        Ch1Display => ("10", "ch1"),
        /// Channel 2 display
        Ch2Display => ("11", "ch2"),
    }
}

// Named single-bit status queries: (property, register query, bit)
const STATUS_BITS: &[(&str, &str, u8)] = &[
    ("input_queue_overflow", "*ESR?", 0),
    ("output_queue_overflow", "*ESR?", 2),
    ("execution_or_parameter_error", "*ESR?", 4),
    ("illegal_command", "*ESR?", 5),
    ("key_pressed", "*ESR?", 6),
    ("power_on", "*ESR?", 7),
    ("no_scan_in_progress", "*STB?", 0),
    ("no_command_in_progress", "*STB?", 1),
    ("any_error_status", "*STB?", 2),
    ("any_lockin_status", "*STB?", 3),
    ("interface_output_buffer_nonempty", "*STB?", 4),
    ("any_standard_status", "*STB?", 5),
    ("service_request", "*STB?", 6),
    ("battery_error", "ERRS?", 1),
    ("ram_error", "ERRS?", 2),
    ("rom_error", "ERRS?", 4),
    ("gpib_error", "ERRS?", 5),
    ("dsp_error", "ERRS?", 6),
    ("math_error", "ERRS?", 7),
    ("input_overload", "LIAS?", 0),
    ("filter_overload", "LIAS?", 1),
    ("output_overload", "LIAS?", 2),
    ("reference_unlock", "LIAS?", 3),
    ("frequency_range_switch", "LIAS?", 4),
    ("time_constant_changed", "LIAS?", 5),
    ("triggered", "LIAS?", 6),
];

fn fixed_float(name: &str, query: &str, template: &str) -> Binding<f64> {
    Binding::new(name, query, |r: &Response| codec::float(&r.text())).settable_with(
        template,
        |v: &f64| {
            if v.is_finite() {
                Ok(labwire_core::args([("value", codec::fixed(*v, FLOAT_PRECISION))]))
            } else {
                Err(format!("{v} is not a finite number"))
            }
        },
    )
}

fn index_setting(name: &str, query: &str, template: &str, max: u8) -> Binding<u8> {
    Binding::read_write(name, query, template).validated(move |v: &u8| {
        if *v <= max {
            Ok(())
        } else {
            Err(format!("index must be 0-{max}, got {v}"))
        }
    })
}

/// Every SR830 property, typed.
#[derive(Debug)]
pub struct Sr830Properties {
    /// `*IDN?`
    pub identification: Arc<Binding<Identification>>,
    /// `PHAS`, degrees
    pub phase: Arc<Binding<f64>>,
    /// `FMOD`
    pub reference_source: Arc<Binding<ReferenceSource>>,
    /// `FREQ`, hertz
    pub reference_frequency: Arc<Binding<f64>>,
    /// `SENS`, index 0-26
    pub sensitivity: Arc<Binding<u8>>,
    /// `OFLT`, index 0-19
    pub time_constant: Arc<Binding<u8>>,
    /// `SRAT`, index 0-14
    pub sample_rate: Arc<Binding<u8>>,
    /// `LOCL`
    pub local: Arc<Binding<LocalMode>>,
    /// `OUTP? 1`
    pub x: Arc<Binding<f64>>,
    /// `OUTP? 2`
    pub y: Arc<Binding<f64>>,
    /// `OUTP? 3`
    pub r: Arc<Binding<f64>>,
    /// `OUTP? 4`
    pub theta: Arc<Binding<f64>>,
    /// `OAUX? 1` through `OAUX? 4`
    pub aux: [Arc<Binding<f64>>; 4],
    /// `SPTS?`
    pub stored_points: Arc<Binding<u32>>,
    /// `*ESR?`
    pub event_status: Arc<Binding<StatusBits>>,
    /// `*STB?`
    pub serial_poll_status: Arc<Binding<StatusBits>>,
    /// `ERRS?`
    pub error_status: Arc<Binding<StatusBits>>,
    /// `LIAS?`
    pub lockin_status: Arc<Binding<StatusBits>>,
    /// Single status bits, queried one at a time
    pub status_bits: Vec<Arc<Binding<bool>>>,
}

impl Sr830Properties {
    /// Build the bindings.
    pub fn new() -> Self {
        Self {
            identification: Arc::new(Binding::read_only("identification", "*IDN?")),
            phase: Arc::new(fixed_float("phase", "PHAS?", "PHAS {value}")),
            reference_source: Arc::new(Binding::read_write(
                "reference_source",
                "FMOD?",
                "FMOD {value}",
            )),
            reference_frequency: Arc::new(fixed_float(
                "reference_frequency",
                "FREQ?",
                "FREQ {value}",
            )),
            sensitivity: Arc::new(index_setting("sensitivity", "SENS?", "SENS {value}", 26)),
            time_constant: Arc::new(index_setting("time_constant", "OFLT?", "OFLT {value}", 19)),
            sample_rate: Arc::new(index_setting("sample_rate", "SRAT?", "SRAT {value}", 14)),
            local: Arc::new(Binding::read_write("local", "LOCL?", "LOCL {value}")),
            x: Arc::new(Binding::read_only("x", "OUTP? 1")),
            y: Arc::new(Binding::read_only("y", "OUTP? 2")),
            r: Arc::new(Binding::read_only("r", "OUTP? 3")),
            theta: Arc::new(Binding::read_only("theta", "OUTP? 4")),
            aux: std::array::from_fn(|i| {
                let input = i + 1;
                Arc::new(Binding::read_only(
                    format!("aux{input}"),
                    format!("OAUX? {input}"),
                ))
            }),
            stored_points: Arc::new(Binding::read_only("stored_points", "SPTS?")),
            event_status: Arc::new(Binding::read_only("event_status", "*ESR?")),
            serial_poll_status: Arc::new(Binding::read_only("serial_poll_status", "*STB?")),
            error_status: Arc::new(Binding::read_only("error_status", "ERRS?")),
            lockin_status: Arc::new(Binding::read_only("lockin_status", "LIAS?")),
            status_bits: STATUS_BITS
                .iter()
                .map(|(name, register, bit)| {
                    Arc::new(Binding::read_only(*name, format!("{register} {bit}")))
                })
                .collect(),
        }
    }

    /// Erased table for access by name.
    pub fn table(&self) -> PropertyTable {
        let mut table = PropertyTable::new()
            .with(self.identification.clone())
            .with(self.phase.clone())
            .with(self.reference_source.clone())
            .with(self.reference_frequency.clone())
            .with(self.sensitivity.clone())
            .with(self.time_constant.clone())
            .with(self.sample_rate.clone())
            .with(self.local.clone())
            .with(self.x.clone())
            .with(self.y.clone())
            .with(self.r.clone())
            .with(self.theta.clone())
            .with(self.stored_points.clone())
            .with(self.event_status.clone())
            .with(self.serial_poll_status.clone())
            .with(self.error_status.clone())
            .with(self.lockin_status.clone());
        for aux in &self.aux {
            table = table.with(aux.clone());
        }
        for bit in &self.status_bits {
            table = table.with(bit.clone());
        }

        table
            .with_action(Action::new("auto_gain", "AGAN", "Auto gain"))
            .with_action(Action::new("auto_reserve", "ARSV", "Auto reserve"))
            .with_action(Action::new("auto_phase", "APHS", "Auto phase"))
            .with_action(Action::new("auto_offset_x", "AOFF 1", "Auto offset X"))
            .with_action(Action::new("auto_offset_y", "AOFF 2", "Auto offset Y"))
            .with_action(Action::new("auto_offset_r", "AOFF 3", "Auto offset R"))
            .with_action(Action::new("trigger", "TRIG", "Software trigger"))
            .with_action(Action::new("clear_status", "*CLS", "Clear status registers"))
            .with_action(Action::new("reset", "*RST", "Reset to default configuration"))
    }
}

impl Default for Sr830Properties {
    fn default() -> Self {
        Self::new()
    }
}

/// Session settings for an SR830 on `port`.
pub fn session_config(port: &str) -> SessionConfig {
    SessionConfig::new(EndpointConfig::Serial(
        SerialConfig::new(port, BAUD_RATE).flow_control(FlowControl::Hardware),
    ))
    .with_framing(FramingConfig::new(Terminator::lf()))
    .with_timing(TimingPolicy::new(COMMUNICATION_DELAY, RESPONSE_TIMEOUT))
}

/// Factory for SR830 instruments.
pub struct Sr830Factory;

impl DriverFactory for Sr830Factory {
    fn driver_type(&self) -> &'static str {
        "srs_sr830"
    }

    fn name(&self) -> &'static str {
        "SRS SR830 Lock-In Amplifier"
    }

    fn default_session(&self, address: &str) -> SessionConfig {
        session_config(address)
    }

    fn properties(&self) -> PropertyTable {
        Sr830Properties::new().table()
    }
}

/// Render a `SNAP?` command for 2-6 parameters.
pub fn snap_command(parameters: &[SnapParameter]) -> Result<String> {
    if !(2..=6).contains(&parameters.len()) {
        return Err(LinkError::InvalidCommand {
            command: "SNAP?".to_string(),
            reason: format!("SNAP takes 2 to 6 parameters, got {}", parameters.len()),
        });
    }
    let codes: Vec<String> = parameters.iter().map(PropertyType::format_wire).collect();
    Ok(format!("SNAP? {}", codes.join(",")))
}

/// Reading and gain settings captured under one session lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sr830State {
    /// R in volts
    pub rms_voltage: f64,
    /// `OFLT` index
    pub time_constant: u8,
    /// `SENS` index
    pub sensitivity: u8,
}

/// SR830 lock-in amplifier.
#[derive(Debug, Clone)]
pub struct Sr830 {
    instrument: Instrument,
    props: Arc<Sr830Properties>,
}

impl Sr830 {
    /// Wrap an open session.
    pub fn from_session(session: Session) -> Self {
        let props = Arc::new(Sr830Properties::new());
        let instrument = Instrument::new("srs_sr830", session, props.table());
        Self { instrument, props }
    }

    /// Generic instrument handle.
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Typed bindings.
    pub fn properties(&self) -> &Sr830Properties {
        &self.props
    }

    /// R, the RMS magnitude, in volts.
    pub async fn r(&self) -> Result<f64> {
        self.instrument.get(&self.props.r).await
    }

    /// R with the time constant and sensitivity it was measured under.
    pub async fn state(&self) -> Result<Sr830State> {
        let mut session = self.instrument.session().lock().await;
        let rms_voltage = self.props.r.get(&mut session).await?;
        let time_constant = self.props.time_constant.get(&mut session).await?;
        let sensitivity = self.props.sensitivity.get(&mut session).await?;
        Ok(Sr830State {
            rms_voltage,
            time_constant,
            sensitivity,
        })
    }

    /// X and Y sampled together.
    pub async fn xy(&self) -> Result<(f64, f64)> {
        let values = self.snap(&[SnapParameter::X, SnapParameter::Y]).await?;
        Ok((values[0], values[1]))
    }

    /// Read several outputs at the same instant.
    pub async fn snap(&self, parameters: &[SnapParameter]) -> Result<Vec<f64>> {
        let command = snap_command(parameters)?;
        let response = self.instrument.query(&command).await?;
        let values = codec::float_list(&response.text()).map_err(|reason| LinkError::Parse {
            property: "snap".to_string(),
            raw: response.text().into_owned(),
            reason,
        })?;
        if values.len() != parameters.len() {
            return Err(LinkError::Parse {
                property: "snap".to_string(),
                raw: response.text().into_owned(),
                reason: format!("expected {} values, got {}", parameters.len(), values.len()),
            });
        }
        Ok(values)
    }

    /// Sensitivity index (0-26).
    pub async fn set_sensitivity(&self, index: u8) -> Result<()> {
        self.instrument.set(&self.props.sensitivity, &index).await
    }

    /// Time constant index (0-19).
    pub async fn set_time_constant(&self, index: u8) -> Result<()> {
        self.instrument.set(&self.props.time_constant, &index).await
    }

    /// Reference phase in degrees.
    pub async fn set_phase(&self, degrees: f64) -> Result<()> {
        self.instrument.set(&self.props.phase, &degrees).await
    }

    /// `AGAN`
    pub async fn auto_gain(&self) -> Result<()> {
        self.instrument.run_action("auto_gain").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_command() {
        assert_eq!(
            snap_command(&[SnapParameter::X, SnapParameter::Y, SnapParameter::Ch2Display])
                .unwrap(),
            "SNAP? 1,2,11"
        );
        assert!(snap_command(&[SnapParameter::R]).is_err());
        assert!(snap_command(&[SnapParameter::R; 7]).is_err());
    }

    #[test]
    fn test_float_settings_use_fixed_precision() {
        let props = Sr830Properties::new();
        assert_eq!(props.phase.encode(&-45.5).unwrap(), "PHAS -45.500000");
        assert_eq!(
            props.reference_frequency.encode(&1000.0).unwrap(),
            "FREQ 1000.000000"
        );
        assert!(props.phase.encode(&f64::NAN).is_err());
    }

    #[test]
    fn test_index_limits() {
        let props = Sr830Properties::new();
        assert_eq!(props.sensitivity.encode(&26).unwrap(), "SENS 26");
        assert!(props.sensitivity.encode(&27).is_err());
        assert!(props.time_constant.encode(&20).is_err());
        assert!(props.sample_rate.encode(&15).is_err());
    }

    #[test]
    fn test_status_bit_queries() {
        let props = Sr830Properties::new();
        let table = props.table();
        let bit = table.property("illegal_command").unwrap();
        assert_eq!(bit.query_command(), "*ESR? 5");
        assert!(bit.is_read_only());
        assert_eq!(
            table.property("reference_unlock").unwrap().query_command(),
            "LIAS? 3"
        );
        assert!(table.action("auto_offset_r").is_ok());
    }

    #[test]
    fn test_hardware_flow_control() {
        let config = session_config("/dev/ttyUSB2");
        let EndpointConfig::Serial(serial) = config.endpoint else {
            panic!("expected serial");
        };
        assert_eq!(serial.flow_control, FlowControl::Hardware);
        assert_eq!(serial.baud_rate, BAUD_RATE);
    }
}
