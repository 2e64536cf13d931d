//! Lake Shore Model 425 Gaussmeter Driver
//!
//! Reference: Lake Shore Model 425 User's Manual, chapter 6
//!
//! Protocol Overview:
//! - Format: ASCII commands, comma-separated replies
//! - Serial: 57600 baud, 7 data bits, odd parity, 1 stop bit, no flow control
//! - Terminator: LF (\n)
//! - Pacing: no new communication for 30 ms after a command is transmitted or
//!   after a response completes, and no more than 30 exchanges per second.
//!   The session enforces this with a 33 ms post-send delay.
//!
//! `RDGMODE` carries three settings at once (mode, DC filter, AC bandwidth).
//! They are exposed as fields of one composite property, so changing the
//! bandwidth rewrites the full triple.
//!
//! # Usage
//!
//! ```rust,ignore
//! use labwire_drivers::lakeshore::{Gaussmeter425, FieldUnit};
//!
//! let gaussmeter = Gaussmeter425::open("/dev/ttyUSB0").await?;
//! gaussmeter.set_unit(FieldUnit::Tesla).await?;
//! let field = gaussmeter.field().await?;
//! ```

use crate::factory::DriverFactory;
use anyhow::Context;
use labwire_core::{
    args, codec, Action, Binding, EndpointConfig, Field, FramingConfig, Identification,
    Instrument, Parity, PropertyTable, PropertyType, Response, Result, SerialConfig, Session,
    SessionConfig, StatusBits, Terminator, TimingPolicy, Value,
};
use std::sync::Arc;
use std::time::Duration;

/// Serial baud rate.
pub const BAUD_RATE: u32 = 57600;

/// Quiet time required after each exchange (1/30 s).
pub const COMMUNICATION_DELAY: Duration = Duration::from_micros(33_334);

/// Response deadline.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Tokens
// =============================================================================

labwire_core::wire_token! {
    /// Field display units (`UNIT`).
    pub enum FieldUnit {
        /// Gauss
        Gauss => ("1", "Gauss"),
        /// Tesla
        Tesla => ("2", "Tesla"),
        /// Oersted
        Oersted => ("3", "Oersted"),
        /// Ampere per meter
        AmperePerMeter => ("4", "Ampere/meter"),
    }
}

labwire_core::wire_token! {
    /// DC or RMS field measurement (`RDGMODE` first field).
    pub enum MeasurementMode {
        /// Static field
        Dc => ("1", "DC"),
        /// AC field, RMS value
        Rms => ("2", "RMS"),
    }
}

labwire_core::wire_token! {
    /// AC measurement bandwidth (`RDGMODE` third field).
    pub enum AcBandwidth {
        /// Wide band
        Wide => ("1", "wide"),
        /// Narrow band
        Narrow => ("2", "narrow"),
    }
}

// =============================================================================
// Composite readings
// =============================================================================

/// The `RDGMODE` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingMode {
    /// DC or RMS
    pub mode: MeasurementMode,
    /// DC filter enabled
    pub dc_filter: bool,
    /// AC bandwidth
    pub bandwidth: AcBandwidth,
}

impl PropertyType for ReadingMode {
    fn parse_wire(text: &str) -> std::result::Result<Self, String> {
        let (mode, dc_filter, bandwidth) = <(MeasurementMode, bool, AcBandwidth)>::parse_wire(text)?;
        Ok(Self {
            mode,
            dc_filter,
            bandwidth,
        })
    }

    fn format_wire(&self) -> String {
        (self.mode, self.dc_filter, self.bandwidth).format_wire()
    }

    fn parse_input(text: &str) -> std::result::Result<Self, String> {
        let (mode, dc_filter, bandwidth) = <(MeasurementMode, bool, AcBandwidth)>::parse_input(text)?;
        Ok(Self {
            mode,
            dc_filter,
            bandwidth,
        })
    }

    fn to_value(&self) -> Value {
        (self.mode, self.dc_filter, self.bandwidth).to_value()
    }
}

/// `OPST?` operational status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationalStatus(pub StatusBits);

impl OperationalStatus {
    /// Bit 0: no probe attached.
    pub fn no_probe(self) -> bool {
        self.0.bit(0)
    }

    /// Bit 1: field exceeds the selected range.
    pub fn field_overload(self) -> bool {
        self.0.bit(1)
    }

    /// Bit 2: a reading newer than the last `RDGFIELD?` is available.
    pub fn new_field_reading(self) -> bool {
        self.0.bit(2)
    }

    /// Bit 3: alarm condition.
    pub fn alarm(self) -> bool {
        self.0.bit(3)
    }

    /// Bit 4: probe not recognized.
    pub fn invalid_probe(self) -> bool {
        self.0.bit(4)
    }

    // Bit 5 is unused

    /// Bit 6: probe calibration error.
    pub fn calibration_error(self) -> bool {
        self.0.bit(6)
    }

    /// Bit 7: zero probe finished.
    pub fn zero_probe_done(self) -> bool {
        self.0.bit(7)
    }
}

impl PropertyType for OperationalStatus {
    fn parse_wire(text: &str) -> std::result::Result<Self, String> {
        StatusBits::parse_wire(text).map(Self)
    }

    fn format_wire(&self) -> String {
        self.0.format_wire()
    }

    fn to_value(&self) -> Value {
        self.0.to_value()
    }
}

// =============================================================================
// Property table
// =============================================================================

/// Every Model 425 property, typed.
#[derive(Debug)]
pub struct Gaussmeter425Properties {
    /// `*IDN?`
    pub identification: Arc<Binding<Identification>>,
    /// Firmware revision from `*IDN?`, as a number
    pub firmware_version: Arc<Binding<f64>>,
    /// `AUTO`
    pub auto_range: Arc<Binding<bool>>,
    /// `KEYST?`, code of the last key pressed
    pub last_key: Arc<Binding<u8>>,
    /// `LOCK`
    pub keyboard_lock: Arc<Binding<bool>>,
    /// `MXHOLD`
    pub max_hold: Arc<Binding<bool>>,
    /// `OPST?`
    pub operational_status: Arc<Binding<OperationalStatus>>,
    /// `OPST?` bit 0
    pub no_probe: Arc<Field<OperationalStatus, bool>>,
    /// `OPST?` bit 1
    pub field_overload: Arc<Field<OperationalStatus, bool>>,
    /// `OPST?` bit 2
    pub new_field_reading: Arc<Field<OperationalStatus, bool>>,
    /// `OPST?` bit 3
    pub alarm: Arc<Field<OperationalStatus, bool>>,
    /// `OPST?` bit 4
    pub invalid_probe: Arc<Field<OperationalStatus, bool>>,
    /// `OPST?` bit 6
    pub calibration_error: Arc<Field<OperationalStatus, bool>>,
    /// `OPST?` bit 7
    pub zero_probe_done: Arc<Field<OperationalStatus, bool>>,
    /// `PRBFCOMP`
    pub field_compensation: Arc<Binding<bool>>,
    /// `PRBSENS?`
    pub probe_sensitivity: Arc<Binding<f64>>,
    /// `RANGE`, 1 through 4
    pub range: Arc<Binding<u8>>,
    /// `RDGFIELD?`
    pub field: Arc<Binding<f64>>,
    /// `RDGMODE`
    pub reading_mode: Arc<Binding<ReadingMode>>,
    /// `RDGMODE` first field
    pub measurement_mode: Arc<Field<ReadingMode, MeasurementMode>>,
    /// `RDGMODE` second field
    pub dc_filter: Arc<Field<ReadingMode, bool>>,
    /// `RDGMODE` third field
    pub ac_bandwidth: Arc<Field<ReadingMode, AcBandwidth>>,
    /// `RDGMNMX?`
    pub min_max_field: Arc<Binding<(f64, f64)>>,
    /// `RDGMX?`
    pub max_field: Arc<Binding<f64>>,
    /// `RDGREL?`
    pub relative_field: Arc<Binding<f64>>,
    /// `REL`
    pub relative_mode: Arc<Binding<bool>>,
    /// `RELSP`
    pub relative_setpoint: Arc<Binding<f64>>,
    /// `TYPE?`
    pub probe_type: Arc<Binding<u8>>,
    /// `UNIT`
    pub unit: Arc<Binding<FieldUnit>>,
}

fn status_bit(
    name: &str,
    status: &Arc<Binding<OperationalStatus>>,
    project: fn(&OperationalStatus) -> bool,
) -> Arc<Field<OperationalStatus, bool>> {
    // Status bits are read-only; the inject half is never reached
    Arc::new(Field::new(name, Arc::clone(status), project, |_, _| {}))
}

impl Gaussmeter425Properties {
    /// Build the bindings.
    pub fn new() -> Self {
        let operational_status: Arc<Binding<OperationalStatus>> =
            Arc::new(Binding::read_only("operational_status", "OPST?"));
        let reading_mode = Arc::new(
            Binding::<ReadingMode>::read_only("reading_mode", "RDGMODE?").settable_with(
                "RDGMODE {mode}, {filter}, {bandwidth}",
                |m: &ReadingMode| {
                    Ok(args([
                        ("mode", m.mode.format_wire()),
                        ("filter", m.dc_filter.format_wire()),
                        ("bandwidth", m.bandwidth.format_wire()),
                    ]))
                },
            ),
        );

        Self {
            identification: Arc::new(Binding::read_only("identification", "*IDN?")),
            firmware_version: Arc::new(Binding::new(
                "firmware_version",
                "*IDN?",
                |r: &Response| Identification::parse_wire(&r.text())?.firmware_version(),
            )),
            auto_range: Arc::new(Binding::read_write("auto_range", "AUTO?", "AUTO {value}")),
            last_key: Arc::new(Binding::read_only("last_key", "KEYST?")),
            keyboard_lock: Arc::new(Binding::read_write("keyboard_lock", "LOCK?", "LOCK {value}")),
            max_hold: Arc::new(Binding::read_write("max_hold", "MXHOLD?", "MXHOLD {value}")),
            no_probe: status_bit("no_probe", &operational_status, |s| s.no_probe()),
            field_overload: status_bit("field_overload", &operational_status, |s| {
                s.field_overload()
            }),
            new_field_reading: status_bit("new_field_reading", &operational_status, |s| {
                s.new_field_reading()
            }),
            alarm: status_bit("alarm", &operational_status, |s| s.alarm()),
            invalid_probe: status_bit("invalid_probe", &operational_status, |s| s.invalid_probe()),
            calibration_error: status_bit("calibration_error", &operational_status, |s| {
                s.calibration_error()
            }),
            zero_probe_done: status_bit("zero_probe_done", &operational_status, |s| {
                s.zero_probe_done()
            }),
            operational_status,
            field_compensation: Arc::new(Binding::read_write(
                "field_compensation",
                "PRBFCOMP?",
                "PRBFCOMP {value}",
            )),
            probe_sensitivity: Arc::new(Binding::read_only("probe_sensitivity", "PRBSENS?")),
            range: Arc::new(
                Binding::read_write("range", "RANGE?", "RANGE {value}").validated(|r: &u8| {
                    if (1..=4).contains(r) {
                        Ok(())
                    } else {
                        Err(format!("range must be 1-4, got {r}"))
                    }
                }),
            ),
            field: Arc::new(Binding::read_only("field", "RDGFIELD?")),
            measurement_mode: Arc::new(Field::new(
                "measurement_mode",
                Arc::clone(&reading_mode),
                |m: &ReadingMode| m.mode,
                |m, v| m.mode = v,
            )),
            dc_filter: Arc::new(Field::new(
                "dc_filter",
                Arc::clone(&reading_mode),
                |m: &ReadingMode| m.dc_filter,
                |m, v| m.dc_filter = v,
            )),
            ac_bandwidth: Arc::new(Field::new(
                "ac_bandwidth",
                Arc::clone(&reading_mode),
                |m: &ReadingMode| m.bandwidth,
                |m, v| m.bandwidth = v,
            )),
            reading_mode,
            min_max_field: Arc::new(Binding::read_only("min_max_field", "RDGMNMX?")),
            max_field: Arc::new(Binding::read_only("max_field", "RDGMX?")),
            relative_field: Arc::new(Binding::read_only("relative_field", "RDGREL?")),
            relative_mode: Arc::new(Binding::read_write("relative_mode", "REL?", "REL {value}")),
            relative_setpoint: Arc::new(
                Binding::new("relative_setpoint", "RELSP?", |r: &Response| {
                    codec::float(&r.text())
                })
                .settable_with("RELSP {value}", |v: &f64| {
                    Ok(args([("value", codec::scientific(*v, 3))]))
                }),
            ),
            probe_type: Arc::new(Binding::read_only("probe_type", "TYPE?")),
            unit: Arc::new(Binding::read_write("unit", "UNIT?", "UNIT {value}")),
        }
    }

    /// Erased table for access by name.
    pub fn table(&self) -> PropertyTable {
        PropertyTable::new()
            .with(self.identification.clone())
            .with(self.firmware_version.clone())
            .with(self.auto_range.clone())
            .with(self.last_key.clone())
            .with(self.keyboard_lock.clone())
            .with(self.max_hold.clone())
            .with(self.operational_status.clone())
            .with(self.no_probe.clone())
            .with(self.field_overload.clone())
            .with(self.new_field_reading.clone())
            .with(self.alarm.clone())
            .with(self.invalid_probe.clone())
            .with(self.calibration_error.clone())
            .with(self.zero_probe_done.clone())
            .with(self.field_compensation.clone())
            .with(self.probe_sensitivity.clone())
            .with(self.range.clone())
            .with(self.field.clone())
            .with(self.reading_mode.clone())
            .with(self.measurement_mode.clone())
            .with(self.dc_filter.clone())
            .with(self.ac_bandwidth.clone())
            .with(self.min_max_field.clone())
            .with(self.max_field.clone())
            .with(self.relative_field.clone())
            .with(self.relative_mode.clone())
            .with(self.relative_setpoint.clone())
            .with(self.probe_type.clone())
            .with(self.unit.clone())
            .with_action(Action::new("reset", "*RST", "Reset to power-up settings"))
            .with_action(Action::new(
                "factory_defaults",
                "DFLT 99",
                "Restore factory defaults",
            ))
            .with_action(Action::new("reset_max", "MXRST", "Clear the max hold reading"))
            .with_action(Action::new("zero_probe", "ZPROBE", "Start a zero probe"))
            .with_action(Action::new(
                "clear_zero_probe",
                "ZCLEAR",
                "Clear the zero probe offset",
            ))
    }
}

impl Default for Gaussmeter425Properties {
    fn default() -> Self {
        Self::new()
    }
}

/// Session settings for a Model 425 on `port`.
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

// =============================================================================
// Factory
// =============================================================================

/// Factory for Model 425 instruments.
pub struct Gaussmeter425Factory;

impl DriverFactory for Gaussmeter425Factory {
    fn driver_type(&self) -> &'static str {
        "lakeshore_425"
    }

    fn name(&self) -> &'static str {
        "Lake Shore 425 Gaussmeter"
    }

    fn default_session(&self, address: &str) -> SessionConfig {
        session_config(address)
    }

    fn properties(&self) -> PropertyTable {
        Gaussmeter425Properties::new().table()
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Model 425 gaussmeter.
#[derive(Debug, Clone)]
pub struct Gaussmeter425 {
    instrument: Instrument,
    props: Arc<Gaussmeter425Properties>,
}

impl Gaussmeter425 {
    /// Open the gaussmeter on a serial port.
    pub async fn open(port: &str) -> anyhow::Result<Self> {
        Self::open_with(session_config(port)).await
    }

    /// Open with explicit session settings.
    pub async fn open_with(config: SessionConfig) -> anyhow::Result<Self> {
        let endpoint = config.endpoint.to_string();
        let session = Session::open(config)
            .await
            .with_context(|| format!("Failed to open Lake Shore 425 on {endpoint}"))?;
        Ok(Self::from_session(session))
    }

    /// Wrap an open session.
    pub fn from_session(session: Session) -> Self {
        let props = Arc::new(Gaussmeter425Properties::new());
        let instrument = Instrument::new("lakeshore_425", session, props.table());
        Self { instrument, props }
    }

    /// Generic instrument handle (access by name, raw commands).
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Typed bindings.
    pub fn properties(&self) -> &Gaussmeter425Properties {
        &self.props
    }

    /// `*IDN?`
    pub async fn identification(&self) -> Result<Identification> {
        self.instrument.get(&self.props.identification).await
    }

    /// Current field reading in the selected units.
    pub async fn field(&self) -> Result<f64> {
        self.instrument.get(&self.props.field).await
    }

    /// Read the field only if the instrument reports a reading newer than the
    /// last one fetched.
    pub async fn poll_field(&self) -> Result<Option<f64>> {
        let mut session = self.instrument.session().lock().await;
        let status = self.props.operational_status.get(&mut session).await?;
        if !status.new_field_reading() {
            return Ok(None);
        }
        self.props.field.get(&mut session).await.map(Some)
    }

    /// Minimum and maximum field since the last reset.
    pub async fn min_max_field(&self) -> Result<(f64, f64)> {
        self.instrument.get(&self.props.min_max_field).await
    }

    /// Operational status byte.
    pub async fn status(&self) -> Result<OperationalStatus> {
        self.instrument.get(&self.props.operational_status).await
    }

    /// Field units.
    pub async fn unit(&self) -> Result<FieldUnit> {
        self.instrument.get(&self.props.unit).await
    }

    /// Change the field units.
    pub async fn set_unit(&self, unit: FieldUnit) -> Result<()> {
        self.instrument.set(&self.props.unit, &unit).await
    }

    /// Full `RDGMODE` triple.
    pub async fn reading_mode(&self) -> Result<ReadingMode> {
        self.instrument.get(&self.props.reading_mode).await
    }

    /// Switch between DC and RMS, keeping filter and bandwidth.
    pub async fn set_measurement_mode(&self, mode: MeasurementMode) -> Result<()> {
        self.instrument
            .set_field(&self.props.measurement_mode, mode)
            .await
    }

    /// Enable or disable the DC filter, keeping mode and bandwidth.
    pub async fn set_dc_filter(&self, enabled: bool) -> Result<()> {
        self.instrument.set_field(&self.props.dc_filter, enabled).await
    }

    /// Change the AC bandwidth, keeping mode and filter.
    pub async fn set_ac_bandwidth(&self, bandwidth: AcBandwidth) -> Result<()> {
        self.instrument
            .set_field(&self.props.ac_bandwidth, bandwidth)
            .await
    }

    /// Select a manual range (1-4). Rejected before any I/O when out of range.
    pub async fn set_range(&self, range: u8) -> Result<()> {
        self.instrument.set(&self.props.range, &range).await
    }

    /// Relative setpoint.
    pub async fn set_relative_setpoint(&self, setpoint: f64) -> Result<()> {
        self.instrument
            .set(&self.props.relative_setpoint, &setpoint)
            .await
    }

    /// Start a zero probe.
    pub async fn zero_probe(&self) -> Result<()> {
        self.instrument.run_action("zero_probe").await
    }

    /// Clear the max hold reading.
    pub async fn reset_max(&self) -> Result<()> {
        self.instrument.run_action("reset_max").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_mode_wire_format() {
        let mode = ReadingMode::parse_wire("1,0,2").unwrap();
        assert_eq!(mode.mode, MeasurementMode::Dc);
        assert!(!mode.dc_filter);
        assert_eq!(mode.bandwidth, AcBandwidth::Narrow);
        assert_eq!(mode.format_wire(), "1, 0, 2");

        assert!(ReadingMode::parse_wire("3,0,1").is_err());
        assert_eq!(
            ReadingMode::parse_input("RMS, on, wide").unwrap(),
            ReadingMode {
                mode: MeasurementMode::Rms,
                dc_filter: true,
                bandwidth: AcBandwidth::Wide,
            }
        );
    }

    #[test]
    fn test_status_bits() {
        let status = OperationalStatus::parse_wire("132").unwrap();
        assert!(status.new_field_reading());
        assert!(status.zero_probe_done());
        assert!(!status.no_probe());
        assert!(!status.calibration_error());
    }

    #[test]
    fn test_range_validation() {
        let props = Gaussmeter425Properties::new();
        assert_eq!(props.range.encode(&4).unwrap(), "RANGE 4");
        assert!(props.range.encode(&0).is_err());
        assert!(props.range.encode(&5).is_err());
    }

    #[test]
    fn test_set_templates() {
        let props = Gaussmeter425Properties::new();
        assert_eq!(props.unit.encode(&FieldUnit::AmperePerMeter).unwrap(), "UNIT 4");
        assert_eq!(props.auto_range.encode(&true).unwrap(), "AUTO 1");
        assert_eq!(
            props.relative_setpoint.encode(&1234.0).unwrap(),
            "RELSP 1.234E+03"
        );
        assert!(props.field.encode(&1.0).is_err());
    }

    #[test]
    fn test_table_names_are_unique() {
        let props = Gaussmeter425Properties::new();
        let table = props.table();
        assert_eq!(table.len(), 29);
        assert!(table.property("AC_BANDWIDTH").is_ok());
        assert!(table.action("zero_probe").is_ok());
        assert!(table.property("no_probe").unwrap().is_read_only());
    }

    #[test]
    fn test_session_config() {
        let config = session_config("/dev/ttyUSB0");
        config.validate().unwrap();
        let EndpointConfig::Serial(serial) = &config.endpoint else {
            panic!("expected serial");
        };
        assert_eq!(serial.data_bits, 7);
        assert_eq!(serial.parity, Parity::Odd);
        assert!(config.timing.post_send_delay >= Duration::from_millis(33));
    }
}
