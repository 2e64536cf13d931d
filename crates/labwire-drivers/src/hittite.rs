//! Hittite Signal Generator Driver
//!
//! Protocol Overview:
//! - Transport: raw TCP socket, port 50000
//! - Format: SCPI subset (`FREQ 10500000000.000000`, `POW -3.000000`,
//!   `OUTP ON`)
//! - Terminator: CR (\r)
//!
//! Lab units sit at one of two fixed addresses depending on the subnet; with no
//! address configured both are tried in order.

use crate::factory::DriverFactory;
use labwire_core::{
    args, codec, Binding, EndpointConfig, FramingConfig, Instrument, PropertyTable, Response,
    Result, Session, SessionConfig, TcpConfig, Terminator, TimingPolicy,
};
use std::sync::Arc;
use std::time::Duration;

/// TCP port of the command socket.
pub const DEFAULT_PORT: u16 = 50000;

/// Hosts tried when no address is configured.
pub const DEFAULT_HOSTS: [&str; 2] = ["192.168.1.70", "192.168.0.200"];

/// Response deadline.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

fn finite(value: f64) -> std::result::Result<String, String> {
    if value.is_finite() {
        Ok(codec::fixed(value, 6))
    } else {
        Err(format!("{value} is not a finite number"))
    }
}

/// Every Hittite property, typed.
#[derive(Debug)]
pub struct HittiteProperties {
    /// `OUTP`, written as `ON`/`OFF`
    pub output: Arc<Binding<bool>>,
    /// `FREQ`, hertz
    pub frequency: Arc<Binding<f64>>,
    /// `POW`, dBm
    pub power_dbm: Arc<Binding<f64>>,
}

impl HittiteProperties {
    /// Build the bindings.
    pub fn new() -> Self {
        Self {
            output: Arc::new(Binding::<bool>::read_only("output", "OUTP?").settable_with(
                "OUTP {value}",
                |on: &bool| Ok(args([("value", String::from(if *on { "ON" } else { "OFF" }))])),
            )),
            frequency: Arc::new(
                Binding::new("frequency", "FREQ?", |r: &Response| codec::float(&r.text()))
                    .settable_with("FREQ {value}", |v: &f64| {
                        if *v <= 0.0 {
                            return Err(format!("frequency must be positive, got {v}"));
                        }
                        Ok(args([("value", finite(*v)?)]))
                    }),
            ),
            power_dbm: Arc::new(
                Binding::new("power_dbm", "POW?", |r: &Response| codec::float(&r.text()))
                    .settable_with("POW {value}", |v: &f64| Ok(args([("value", finite(*v)?)]))),
            ),
        }
    }

    /// Erased table for access by name.
    pub fn table(&self) -> PropertyTable {
        PropertyTable::new()
            .with(self.output.clone())
            .with(self.frequency.clone())
            .with(self.power_dbm.clone())
    }
}

impl Default for HittiteProperties {
    fn default() -> Self {
        Self::new()
    }
}

/// Session settings for a generator at `address`.
///
/// `address` is `host` or `host:port`. An empty address selects
/// [`DEFAULT_HOSTS`].
pub fn session_config(address: &str) -> SessionConfig {
    let address = address.trim();
    let tcp = if address.is_empty() {
        TcpConfig::new(DEFAULT_HOSTS[0], DEFAULT_PORT).fallback(DEFAULT_HOSTS[1])
    } else {
        match address.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => TcpConfig::new(host, port),
                Err(_) => TcpConfig::new(address, DEFAULT_PORT),
            },
            None => TcpConfig::new(address, DEFAULT_PORT),
        }
    };

    SessionConfig::new(EndpointConfig::Tcp(tcp))
        .with_framing(FramingConfig::new(Terminator::cr()))
        .with_timing(TimingPolicy::new(Duration::ZERO, RESPONSE_TIMEOUT))
}

/// Factory for Hittite generators.
pub struct HittiteFactory;

impl DriverFactory for HittiteFactory {
    fn driver_type(&self) -> &'static str {
        "hittite"
    }

    fn name(&self) -> &'static str {
        "Hittite Signal Generator"
    }

    fn default_session(&self, address: &str) -> SessionConfig {
        session_config(address)
    }

    fn properties(&self) -> PropertyTable {
        HittiteProperties::new().table()
    }
}

/// Output settings captured under one session lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HittiteState {
    /// RF output enabled
    pub output_on: bool,
    /// Hertz
    pub frequency: f64,
    /// dBm
    pub power_dbm: f64,
}

/// Hittite microwave signal generator.
#[derive(Debug, Clone)]
pub struct Hittite {
    instrument: Instrument,
    props: Arc<HittiteProperties>,
}

impl Hittite {
    /// Wrap an open session.
    pub fn from_session(session: Session) -> Self {
        let props = Arc::new(HittiteProperties::new());
        let instrument = Instrument::new("hittite", session, props.table());
        Self { instrument, props }
    }

    /// Generic instrument handle.
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// `OUTP ON`
    pub async fn on(&self) -> Result<()> {
        self.instrument.set(&self.props.output, &true).await
    }

    /// `OUTP OFF`
    pub async fn off(&self) -> Result<()> {
        self.instrument.set(&self.props.output, &false).await
    }

    /// Output state, frequency and power.
    pub async fn state(&self) -> Result<HittiteState> {
        let mut session = self.instrument.session().lock().await;
        let output_on = self.props.output.get(&mut session).await?;
        let frequency = self.props.frequency.get(&mut session).await?;
        let power_dbm = self.props.power_dbm.get(&mut session).await?;
        Ok(HittiteState {
            output_on,
            frequency,
            power_dbm,
        })
    }

    /// Set the output frequency in hertz.
    pub async fn set_frequency(&self, hertz: f64) -> Result<()> {
        self.instrument.set(&self.props.frequency, &hertz).await
    }

    /// Set the output power in dBm.
    pub async fn set_power(&self, dbm: f64) -> Result<()> {
        self.instrument.set(&self.props.power_dbm, &dbm).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        let props = HittiteProperties::new();
        assert_eq!(props.output.encode(&true).unwrap(), "OUTP ON");
        assert_eq!(props.output.encode(&false).unwrap(), "OUTP OFF");
        assert_eq!(
            props.frequency.encode(&10.5e9).unwrap(),
            "FREQ 10500000000.000000"
        );
        assert_eq!(props.power_dbm.encode(&-3.0).unwrap(), "POW -3.000000");
        assert!(props.frequency.encode(&0.0).is_err());
    }

    #[test]
    fn test_default_hosts_with_fallback() {
        let EndpointConfig::Tcp(tcp) = session_config("").endpoint else {
            panic!("expected tcp");
        };
        assert_eq!(tcp.host, "192.168.1.70");
        assert_eq!(tcp.port, DEFAULT_PORT);
        assert_eq!(tcp.fallback_hosts, vec!["192.168.0.200".to_string()]);
        assert_eq!(tcp.connect_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_explicit_address() {
        let EndpointConfig::Tcp(tcp) = session_config("10.0.0.5:5025").endpoint else {
            panic!("expected tcp");
        };
        assert_eq!((tcp.host.as_str(), tcp.port), ("10.0.0.5", 5025));
        assert!(tcp.fallback_hosts.is_empty());

        let EndpointConfig::Tcp(tcp) = session_config("sg1.lab").endpoint else {
            panic!("expected tcp");
        };
        assert_eq!((tcp.host.as_str(), tcp.port), ("sg1.lab", DEFAULT_PORT));
    }
}
