//! In-memory stand-ins for instruments.
//!
//! Two tools, for two styles of test:
//!
//! - [`mock_port`] returns a [`MockSerialPort`] (handed to the session) and a
//!   [`MockDeviceHarness`] (kept by the test) for scripted exchanges where every
//!   byte written is asserted.
//! - [`SimulatedDevice`] runs a small register-file device on a duplex pipe:
//!   `UNIT 2` stores `"2"` and a later `UNIT?` answers `"2"`. It can also echo
//!   every line back and add random reply delays.
//!
//! # Example
//!
//! ```rust,ignore
//! let (port, mut harness) = labwire_core::mock::mock_port();
//! let transport = Box::new(StreamTransport::from_stream("mock", port));
//! let mut session = Session::with_transport(transport, framing, timing)?;
//!
//! let query = tokio::spawn(async move { session.query("RDGFIELD?").await });
//! harness.expect_and_respond(b"RDGFIELD?\n", b"+1.0E+00\n").await;
//! assert_eq!(query.await??.text(), "+1.0E+00");
//! ```

use crate::framer::{Framer, Terminator, TrimPolicy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

// =============================================================================
// Scripted mock port
// =============================================================================

/// Session-facing half of a scripted mock link.
#[derive(Debug)]
pub struct MockSerialPort {
    writes: UnboundedSender<Vec<u8>>,
    replies: UnboundedReceiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

/// Test-facing half of a scripted mock link.
#[derive(Debug)]
pub struct MockDeviceHarness {
    writes: UnboundedReceiver<Vec<u8>>,
    replies: Option<UnboundedSender<Vec<u8>>>,
    unmatched: Vec<u8>,
}

/// Create a connected port/harness pair.
pub fn mock_port() -> (MockSerialPort, MockDeviceHarness) {
    let (writes_tx, writes_rx) = mpsc::unbounded_channel();
    let (replies_tx, replies_rx) = mpsc::unbounded_channel();

    (
        MockSerialPort {
            writes: writes_tx,
            replies: replies_rx,
            pending: VecDeque::new(),
        },
        MockDeviceHarness {
            writes: writes_rx,
            replies: Some(replies_tx),
            unmatched: Vec::new(),
        },
    )
}

impl MockSerialPort {
    fn fill(&mut self, buf: &mut ReadBuf<'_>) {
        let n = buf.remaining().min(self.pending.len());
        let chunk: Vec<u8> = self.pending.drain(..n).collect();
        buf.put_slice(&chunk);
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pending.is_empty() {
            match self.replies.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => self.pending.extend(chunk),
                // Harness gone: end-of-stream
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
        self.fill(buf);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.writes.send(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device harness dropped",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl MockDeviceHarness {
    /// Queue bytes for the session to read.
    ///
    /// # Errors
    /// Returns an error if the port was dropped or the harness was disconnected.
    pub fn send_response(&self, data: &[u8]) -> Result<(), &'static str> {
        match &self.replies {
            Some(tx) => tx
                .send(data.to_vec())
                .map_err(|_| "mock port dropped before response could be delivered"),
            None => Err("mock harness already disconnected"),
        }
    }

    /// Wait for the session to write exactly `expected` next.
    ///
    /// # Panics
    /// Panics if the bytes differ or do not arrive within two seconds.
    pub async fn expect_write(&mut self, expected: &[u8]) {
        let limit = Duration::from_secs(2);

        while self.unmatched.len() < expected.len() {
            match tokio::time::timeout(limit, self.writes.recv()).await {
                Ok(Some(chunk)) => self.unmatched.extend_from_slice(&chunk),
                Ok(None) => panic!("mock port dropped while expecting {:?}", String::from_utf8_lossy(expected)),
                Err(_) => panic!(
                    "timed out waiting for {:?}; received only {:?}",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&self.unmatched)
                ),
            }
        }

        let actual: Vec<u8> = self.unmatched.drain(..expected.len()).collect();
        assert_eq!(
            actual,
            expected,
            "unexpected write: wanted {:?}, got {:?}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(&actual)
        );
    }

    /// Expect a write, then queue a response.
    ///
    /// # Panics
    /// Panics under the same conditions as [`Self::expect_write`], or if the
    /// response cannot be delivered.
    pub async fn expect_and_respond(&mut self, expected: &[u8], response: &[u8]) {
        self.expect_write(expected).await;
        if let Err(e) = self.send_response(response) {
            panic!("{e}");
        }
    }

    /// Assert that nothing is written for `window`.
    ///
    /// # Panics
    /// Panics if any byte arrives.
    pub async fn expect_silence(&mut self, window: Duration) {
        assert!(
            self.unmatched.is_empty(),
            "unconsumed write {:?}",
            String::from_utf8_lossy(&self.unmatched)
        );
        if let Ok(Some(chunk)) = tokio::time::timeout(window, self.writes.recv()).await {
            panic!("expected silence, got {:?}", String::from_utf8_lossy(&chunk));
        }
    }

    /// Discard writes received so far.
    pub async fn drain_writes(&mut self) {
        while let Ok(Some(_)) =
            tokio::time::timeout(Duration::from_millis(50), self.writes.recv()).await
        {}
        self.unmatched.clear();
    }

    /// Stop delivering data; the session sees end-of-stream after queued bytes.
    pub fn disconnect(&mut self) {
        self.replies = None;
    }
}

// =============================================================================
// Simulated register device
// =============================================================================

/// Commands received by a [`SimulatedDevice`], in arrival order.
pub type CommandLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Echo,
    Registers,
}

/// Line-oriented device simulator served over a duplex pipe.
///
/// In register mode a command `NAME args` stores `args` under `NAME?`, and a
/// line containing `?` is answered with the stored text. Queries with no stored
/// value get no reply, which the session sees as a timeout.
#[derive(Debug)]
pub struct SimulatedDevice {
    terminator: Terminator,
    behavior: Behavior,
    registers: HashMap<String, String>,
    delay: Option<(Duration, Duration)>,
    rng: StdRng,
    log: CommandLog,
}

impl SimulatedDevice {
    /// Register-file device.
    pub fn new(terminator: Terminator) -> Self {
        Self {
            terminator,
            behavior: Behavior::Registers,
            registers: HashMap::new(),
            delay: None,
            rng: StdRng::from_entropy(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Device that answers every line with the line itself.
    pub fn echo(terminator: Terminator) -> Self {
        Self {
            behavior: Behavior::Echo,
            ..Self::new(terminator)
        }
    }

    /// Preload the reply to `query`.
    pub fn with_register(mut self, query: impl Into<String>, value: impl Into<String>) -> Self {
        self.registers.insert(query.into(), value.into());
        self
    }

    /// Delay each reply by a random duration in `min..=max`.
    pub fn with_random_delay(mut self, min: Duration, max: Duration) -> Self {
        self.delay = Some((min, max.max(min)));
        self
    }

    /// Use a fixed seed for the delay generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Handle to the received-command log.
    pub fn log(&self) -> CommandLog {
        Arc::clone(&self.log)
    }

    /// Start serving on the current runtime and return the session's end of
    /// the pipe.
    pub fn spawn(self) -> DuplexStream {
        let (session_end, device_end) = tokio::io::duplex(1024);
        tokio::spawn(self.run(device_end));
        session_end
    }

    async fn run(mut self, mut stream: DuplexStream) {
        let mut framer = Framer::new(self.terminator.clone()).with_trim(TrimPolicy::Both);
        let mut buf = [0u8; 256];

        loop {
            while let Some(line) = framer.next_frame() {
                let line = line.text().into_owned();
                self.log.lock().await.push(line.clone());

                if let Some(reply) = self.handle(&line) {
                    if let Some(delay) = self.next_delay() {
                        tokio::time::sleep(delay).await;
                    }
                    let mut out = reply.into_bytes();
                    out.extend_from_slice(self.terminator.as_bytes());
                    if stream.write_all(&out).await.is_err() {
                        return;
                    }
                }
            }

            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => framer.push(&buf[..n]),
            }
        }
    }

    fn handle(&mut self, line: &str) -> Option<String> {
        match self.behavior {
            Behavior::Echo => Some(line.to_string()),
            Behavior::Registers if line.contains('?') => self.registers.get(line).cloned(),
            Behavior::Registers => {
                if let Some((name, args)) = line.split_once(char::is_whitespace) {
                    self.registers
                        .insert(format!("{name}?"), args.trim().to_string());
                }
                None
            }
        }
    }

    fn next_delay(&mut self) -> Option<Duration> {
        let (min, max) = self.delay?;
        let micros = self
            .rng
            .gen_range(min.as_micros() as u64..=max.as_micros() as u64);
        Some(Duration::from_micros(micros))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_scripted_exchange() {
        let (mut port, mut harness) = mock_port();

        port.write_all(b"*IDN?\n").await.unwrap();
        harness
            .expect_and_respond(b"*IDN?\n", b"LSCI,MODEL425,0,1.2\n")
            .await;

        let mut buf = [0u8; 64];
        let n = port.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"LSCI,MODEL425,0,1.2\n");
    }

    #[tokio::test]
    async fn test_harness_disconnect_is_eof() {
        let (mut port, mut harness) = mock_port();
        harness.send_response(b"1").unwrap();
        harness.disconnect();

        let mut buf = [0u8; 8];
        assert_eq!(port.read(&mut buf).await.unwrap(), 1);
        assert_eq!(port.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_register_device_stores_sets() {
        let device = SimulatedDevice::new(Terminator::lf()).with_register("UNIT?", "1");
        let log = device.log();
        let mut stream = device.spawn();

        stream.write_all(b"UNIT?\nUNIT 2\nUNIT?\n").await.unwrap();
        let mut received = Vec::new();
        while received.iter().filter(|b| **b == b'\n').count() < 2 {
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"1\n2\n");
        assert_eq!(*log.lock().await, vec!["UNIT?", "UNIT 2", "UNIT?"]);
    }
}
