//! Session configuration.
//!
//! A [`SessionConfig`] is everything needed to open one instrument link: where the
//! bytes go ([`EndpointConfig`]), how they are cut into frames ([`FramingConfig`])
//! and how long to wait ([`TimingPolicy`]). All of it deserializes from TOML:
//!
//! ```toml
//! [endpoint]
//! kind = "serial"
//! path = "/dev/ttyUSB0"
//! baud_rate = 57600
//! data_bits = 7
//! parity = "odd"
//!
//! [framing]
//! terminator = "\n"
//!
//! [timing]
//! post_send_delay = "33ms"
//! response_timeout = "1s"
//! ```

use crate::error::{LinkError, Result};
use crate::framer::{Terminator, TrimPolicy, DEFAULT_MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// =============================================================================
// Serial
// =============================================================================

/// Parity bit setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Flow control setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    /// No flow control
    #[default]
    None,
    /// XON/XOFF
    Software,
    /// RTS/CTS
    Hardware,
}

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (e.g. "/dev/ttyUSB0", "COM3")
    pub path: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits, 5 through 8
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity
    #[serde(default)]
    pub parity: Parity,
    /// Stop bits, 1 or 2
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Flow control
    #[serde(default)]
    pub flow_control: FlowControl,
}

impl SerialConfig {
    /// 8N1, no flow control.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            data_bits: default_data_bits(),
            parity: Parity::None,
            stop_bits: default_stop_bits(),
            flow_control: FlowControl::None,
        }
    }

    /// Replace the data bits.
    pub fn data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Replace the parity.
    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Replace the stop bits.
    pub fn stop_bits(mut self, stop_bits: u8) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Replace the flow control.
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

// =============================================================================
// TCP
// =============================================================================

/// TCP socket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Maximum time to wait for the connection to be established
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Hosts tried in order when `host` does not answer
    #[serde(default)]
    pub fallback_hosts: Vec<String>,
}

impl TcpConfig {
    /// Connect to `host:port` with the default connect timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: default_connect_timeout(),
            fallback_hosts: Vec::new(),
        }
    }

    /// Add a fallback host.
    pub fn fallback(mut self, host: impl Into<String>) -> Self {
        self.fallback_hosts.push(host.into());
        self
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_millis(500)
}

// =============================================================================
// Endpoint
// =============================================================================

/// Where an instrument is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointConfig {
    /// Serial line
    Serial(SerialConfig),
    /// TCP socket
    Tcp(TcpConfig),
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointConfig::Serial(serial) => write!(f, "serial:{}", serial.path),
            EndpointConfig::Tcp(tcp) => write!(f, "tcp:{}:{}", tcp.host, tcp.port),
        }
    }
}

impl EndpointConfig {
    /// Check the settings a driver would otherwise reject at open time.
    pub fn validate(&self) -> Result<()> {
        match self {
            EndpointConfig::Serial(serial) => {
                if serial.path.trim().is_empty() {
                    return Err(LinkError::Configuration(
                        "serial path must not be empty".to_string(),
                    ));
                }
                if serial.baud_rate == 0 {
                    return Err(LinkError::Configuration(
                        "baud rate must be non-zero".to_string(),
                    ));
                }
                if !(5..=8).contains(&serial.data_bits) {
                    return Err(LinkError::Configuration(format!(
                        "data bits must be 5-8, got {}",
                        serial.data_bits
                    )));
                }
                if !(1..=2).contains(&serial.stop_bits) {
                    return Err(LinkError::Configuration(format!(
                        "stop bits must be 1 or 2, got {}",
                        serial.stop_bits
                    )));
                }
            }
            EndpointConfig::Tcp(tcp) => {
                if tcp.host.trim().is_empty() {
                    return Err(LinkError::Configuration(
                        "tcp host must not be empty".to_string(),
                    ));
                }
                if tcp.port == 0 {
                    return Err(LinkError::Configuration(
                        "tcp port must be non-zero".to_string(),
                    ));
                }
                if tcp.connect_timeout.is_zero() {
                    return Err(LinkError::Configuration(
                        "connect timeout must be greater than zero".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Framing & timing
// =============================================================================

/// How commands and responses are delimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Terminator for commands and responses
    #[serde(default)]
    pub terminator: Terminator,
    /// Whitespace trimming applied to responses
    #[serde(default)]
    pub trim: TrimPolicy,
    /// Largest accepted frame in bytes
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

impl FramingConfig {
    /// Framing with the given terminator and default trim/limit.
    pub fn new(terminator: Terminator) -> Self {
        Self {
            terminator,
            trim: TrimPolicy::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Replace the trim policy.
    pub fn trim(mut self, trim: TrimPolicy) -> Self {
        self.trim = trim;
        self
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self::new(Terminator::default())
    }
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

/// Pacing and deadlines for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingPolicy {
    /// Quiet time after a command is written (or after a query's response)
    /// before the next write
    #[serde(with = "humantime_serde", default)]
    pub post_send_delay: Duration,
    /// Default deadline for a response
    #[serde(with = "humantime_serde", default = "default_response_timeout")]
    pub response_timeout: Duration,
}

impl TimingPolicy {
    /// Build a policy.
    pub fn new(post_send_delay: Duration, response_timeout: Duration) -> Self {
        Self {
            post_send_delay,
            response_timeout,
        }
    }

    /// Reject a zero response timeout.
    pub fn validate(&self) -> Result<()> {
        if self.response_timeout.is_zero() {
            return Err(LinkError::Configuration(
                "response timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            post_send_delay: Duration::ZERO,
            response_timeout: default_response_timeout(),
        }
    }
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(1)
}

// =============================================================================
// Session
// =============================================================================

/// Full configuration of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Where to connect
    pub endpoint: EndpointConfig,
    /// Framing rules
    #[serde(default)]
    pub framing: FramingConfig,
    /// Pacing and deadlines
    #[serde(default)]
    pub timing: TimingPolicy,
}

impl SessionConfig {
    /// Session over `endpoint` with default framing and timing.
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            framing: FramingConfig::default(),
            timing: TimingPolicy::default(),
        }
    }

    /// Replace the framing.
    pub fn with_framing(mut self, framing: FramingConfig) -> Self {
        self.framing = framing;
        self
    }

    /// Replace the timing.
    pub fn with_timing(mut self, timing: TimingPolicy) -> Self {
        self.timing = timing;
        self
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.endpoint.validate()?;
        self.validate_session()
    }

    /// Check framing and timing only. Endpoint settings are checked by
    /// [`crate::transport::open`], which reports them as `Connection` errors.
    pub fn validate_session(&self) -> Result<()> {
        self.timing.validate()?;
        if self.framing.max_frame_len == 0 {
            return Err(LinkError::Configuration(
                "max frame length must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
