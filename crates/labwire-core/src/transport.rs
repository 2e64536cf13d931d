//! Byte-stream transports.
//!
//! A [`Transport`] moves raw bytes. It knows nothing about terminators or
//! commands; that is the framer's job. Two implementations cover every
//! instrument here:
//!
//! - [`StreamTransport`] over any [`StreamIO`] (serial port, TCP socket, in-memory
//!   duplex pipe or mock port)
//! - the openers [`open_serial`] and [`open_tcp`], which build a `StreamTransport`
//!   from an [`EndpointConfig`]
//!
//! # Deadlines
//!
//! [`Transport::read`] takes an absolute deadline and reports expiry as
//! [`ReadOutcome::TimedOut`], which is distinct from end-of-stream
//! ([`ReadOutcome::Closed`]).

use crate::config::{EndpointConfig, TcpConfig};
use crate::error::{LinkError, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::instrument;

/// How long [`StreamTransport::clear_input`] keeps reading before it decides the
/// line is quiet.
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_millis(20);

// =============================================================================
// Stream trait
// =============================================================================

/// Trait alias for async byte streams.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can carry a
/// session:
/// - `tokio_serial::SerialStream` (real hardware)
/// - `tokio::net::TcpStream`
/// - `tokio::io::DuplexStream` and [`crate::mock::MockSerialPort`] (testing)
pub trait StreamIO: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamIO for T {}

/// Type-erased boxed stream.
pub type DynStream = Box<dyn StreamIO>;

/// Type-erased boxed transport, as owned by a session.
pub type DynTransport = Box<dyn Transport>;

// =============================================================================
// Transport trait
// =============================================================================

/// Outcome of a single [`Transport::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were appended to the buffer.
    Data(usize),
    /// The deadline passed with nothing received.
    TimedOut,
    /// The peer closed the stream.
    Closed,
}

/// Raw byte link to one instrument.
#[async_trait]
pub trait Transport: Send {
    /// Endpoint identity for logs and errors.
    fn endpoint(&self) -> &str;

    /// Whether the transport can still carry bytes.
    fn is_open(&self) -> bool;

    /// Write all of `bytes` and flush.
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Append whatever is available to `buf`, waiting until at least one byte
    /// arrives, the stream ends, or `deadline` passes.
    async fn read(&mut self, buf: &mut BytesMut, deadline: Instant) -> Result<ReadOutcome>;

    /// Discard stale input, returning how many bytes were dropped.
    async fn clear_input(&mut self) -> Result<usize>;

    /// Release the underlying handle. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}

// =============================================================================
// StreamTransport
// =============================================================================

/// [`Transport`] over any async byte stream.
pub struct StreamTransport {
    endpoint: String,
    stream: Option<DynStream>,
    drain_window: Duration,
}

impl StreamTransport {
    /// Wrap an already-open stream.
    pub fn new(endpoint: impl Into<String>, stream: DynStream) -> Self {
        Self {
            endpoint: endpoint.into(),
            stream: Some(stream),
            drain_window: DEFAULT_DRAIN_WINDOW,
        }
    }

    /// Wrap a concrete stream, boxing it.
    pub fn from_stream<S: StreamIO + 'static>(endpoint: impl Into<String>, stream: S) -> Self {
        Self::new(endpoint, Box::new(stream))
    }

    /// Replace the quiet window used by `clear_input`.
    pub fn with_drain_window(mut self, drain_window: Duration) -> Self {
        self.drain_window = drain_window;
        self
    }

    fn stream_mut(&mut self) -> Result<&mut DynStream> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(LinkError::NotOpen(self.endpoint.clone())),
        }
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("endpoint", &self.endpoint)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for StreamTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let endpoint = self.endpoint.clone();
        let stream = self.stream_mut()?;
        stream
            .write_all(bytes)
            .await
            .map_err(|e| LinkError::io(&endpoint, e))?;
        stream.flush().await.map_err(|e| LinkError::io(&endpoint, e))
    }

    async fn read(&mut self, buf: &mut BytesMut, deadline: Instant) -> Result<ReadOutcome> {
        let endpoint = self.endpoint.clone();
        let stream = self.stream_mut()?;
        buf.reserve(256);

        match tokio::time::timeout_at(deadline, stream.read_buf(buf)).await {
            Ok(Ok(0)) => Ok(ReadOutcome::Closed),
            Ok(Ok(n)) => Ok(ReadOutcome::Data(n)),
            Ok(Err(e)) => Err(LinkError::io(endpoint, e)),
            Err(_) => Ok(ReadOutcome::TimedOut),
        }
    }

    async fn clear_input(&mut self) -> Result<usize> {
        let window = self.drain_window;
        let stream = self.stream_mut()?;
        Ok(drain_stream(stream, window).await)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                // The handle is released on drop regardless
                tracing::debug!(endpoint = %self.endpoint, error = %e, "shutdown failed during close");
            }
            tracing::info!(endpoint = %self.endpoint, "transport closed");
        }
        Ok(())
    }
}

/// Read and discard bytes until nothing arrives for `window`.
///
/// Returns the number of bytes discarded. End-of-stream and read errors stop the
/// drain without being reported; the next real read will surface them.
pub async fn drain_stream<R: AsyncRead + Unpin + ?Sized>(port: &mut R, window: Duration) -> usize {
    let mut discard = [0u8; 256];
    let mut total_discarded = 0usize;

    loop {
        match tokio::time::timeout(window, port.read(&mut discard)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => total_discarded += n,
            Ok(Err(_)) => break,
            Err(_) => break,
        }
    }

    total_discarded
}

// =============================================================================
// Openers
// =============================================================================

/// Open the transport described by `endpoint`.
///
/// Line settings no port accepts (data bits outside 5-8, a zero baud rate) fail
/// here as `Connection` errors, the same as a port that refuses them.
pub async fn open(endpoint: &EndpointConfig) -> Result<DynTransport> {
    endpoint.validate().map_err(|e| match e {
        LinkError::Configuration(reason) => LinkError::connection(endpoint.to_string(), reason),
        other => other,
    })?;
    match endpoint {
        #[cfg(feature = "serial")]
        EndpointConfig::Serial(serial) => Ok(Box::new(open_serial(serial).await?)),
        #[cfg(not(feature = "serial"))]
        EndpointConfig::Serial(serial) => Err(LinkError::Configuration(format!(
            "serial support is not enabled; cannot open {}",
            serial.path
        ))),
        EndpointConfig::Tcp(tcp) => Ok(Box::new(open_tcp(tcp).await?)),
    }
}

/// Open a serial port using spawn_blocking.
///
/// Port opening can block on some platforms, so it is moved off the runtime.
#[cfg(feature = "serial")]
#[instrument(skip(config), fields(path = %config.path, baud = config.baud_rate), err)]
pub async fn open_serial(config: &crate::config::SerialConfig) -> Result<StreamTransport> {
    use crate::config::{FlowControl, Parity};
    use tokio_serial::SerialPortBuilderExt;

    let data_bits = match config.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        8 => tokio_serial::DataBits::Eight,
        other => {
            return Err(LinkError::connection(
                &config.path,
                format!("unsupported data bits {other}"),
            ))
        }
    };
    let stop_bits = match config.stop_bits {
        1 => tokio_serial::StopBits::One,
        2 => tokio_serial::StopBits::Two,
        other => {
            return Err(LinkError::connection(
                &config.path,
                format!("unsupported stop bits {other}"),
            ))
        }
    };
    let parity = match config.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    };
    let flow_control = match config.flow_control {
        FlowControl::None => tokio_serial::FlowControl::None,
        FlowControl::Software => tokio_serial::FlowControl::Software,
        FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
    };

    let path = config.path.clone();
    let baud_rate = config.baud_rate;
    let port = tokio::task::spawn_blocking(move || {
        tokio_serial::new(&path, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .open_native_async()
    })
    .await
    .map_err(|e| LinkError::connection(&config.path, format!("open task failed: {e}")))?
    .map_err(|e| LinkError::connection(&config.path, e))?;

    tracing::info!("serial port opened");
    Ok(StreamTransport::from_stream(config.path.clone(), port))
}

/// Connect to a TCP endpoint, trying fallback hosts in order.
#[instrument(skip(config), fields(host = %config.host, port = config.port), err)]
pub async fn open_tcp(config: &TcpConfig) -> Result<StreamTransport> {
    let mut failures = Vec::new();

    for host in std::iter::once(&config.host).chain(config.fallback_hosts.iter()) {
        let address = format!("{}:{}", host, config.port);
        match tokio::time::timeout(config.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%address, error = %e, "could not set TCP_NODELAY");
                }
                tracing::info!(%address, "tcp connection established");
                return Ok(StreamTransport::from_stream(address, stream));
            }
            Ok(Err(e)) => {
                tracing::warn!(%address, error = %e, "tcp connect failed");
                failures.push(format!("{address}: {e}"));
            }
            Err(_) => {
                tracing::warn!(%address, timeout = ?config.connect_timeout, "tcp connect timed out");
                failures.push(format!("{address}: timed out after {:?}", config.connect_timeout));
            }
        }
    }

    Err(LinkError::connection(
        format!("{}:{}", config.host, config.port),
        failures.join("; "),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_read_reports_data_then_timeout() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut transport = StreamTransport::from_stream("duplex", device);

        host.write_all(b"abc").await.unwrap();
        let mut buf = BytesMut::new();
        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(
            transport.read(&mut buf, deadline).await.unwrap(),
            ReadOutcome::Data(3)
        );
        assert_eq!(&buf[..], b"abc");

        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(
            transport.read(&mut buf, deadline).await.unwrap(),
            ReadOutcome::TimedOut
        );
    }

    #[tokio::test]
    async fn test_read_reports_closed_on_eof() {
        let (host, device) = tokio::io::duplex(64);
        let mut transport = StreamTransport::from_stream("duplex", device);
        drop(host);

        let mut buf = BytesMut::new();
        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(
            transport.read(&mut buf, deadline).await.unwrap(),
            ReadOutcome::Closed
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_host, device) = tokio::io::duplex(64);
        let mut transport = StreamTransport::from_stream("duplex", device);
        assert!(transport.is_open());

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_open());
        assert!(matches!(
            transport.write(b"X\n").await,
            Err(LinkError::NotOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_input_discards_stale_bytes() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut transport = StreamTransport::from_stream("duplex", device);

        host.write_all(b"stale data 12345").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.clear_input().await.unwrap(), 16);
        let mut buf = BytesMut::new();
        let deadline = Instant::now() + Duration::from_millis(10);
        assert_eq!(
            transport.read(&mut buf, deadline).await.unwrap(),
            ReadOutcome::TimedOut
        );
    }

    #[tokio::test]
    async fn test_open_tcp_falls_back_to_second_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        // An unresolvable name fails fast and the loopback fallback answers
        let config = TcpConfig::new("invalid.host.labwire.test", port).fallback("127.0.0.1");
        let transport = open_tcp(&config).await.unwrap();
        assert_eq!(transport.endpoint(), format!("127.0.0.1:{port}"));
    }

    #[tokio::test]
    async fn test_open_tcp_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = open_tcp(&TcpConfig::new("127.0.0.1", port)).await.unwrap_err();
        assert!(matches!(err, LinkError::Connection { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_open_rejects_line_settings_as_connection_error() {
        let endpoint = EndpointConfig::Serial(
            crate::config::SerialConfig::new("/dev/ttyUSB0", 9600).data_bits(9),
        );
        assert!(matches!(endpoint.validate(), Err(LinkError::Configuration(_))));

        let err = open(&endpoint).await.err().expect("expected open to fail");
        match err {
            LinkError::Connection { endpoint, reason } => {
                assert_eq!(endpoint, "serial:/dev/ttyUSB0");
                assert!(reason.contains("data bits"), "{reason}");
            }
            other => panic!("expected connection error, got {other:?}"),
        }
    }
}
