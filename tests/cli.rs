//! CLI parsing and commands against a local TCP instrument.

use clap::Parser;
use labwire::cli::{self, Cli, Command};
use labwire::config::{AppConfig, InstrumentConfig};
use labwire_core::{TimingPolicy, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[test]
fn parses_poll_with_durations() {
    let cli = Cli::try_parse_from([
        "labwire",
        "--log-level",
        "debug",
        "poll",
        "gaussmeter",
        "field",
        "--interval",
        "250ms",
        "--count",
        "3",
    ])
    .unwrap();

    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    assert_eq!(
        cli.command,
        Command::Poll {
            instrument: "gaussmeter".into(),
            property: "field".into(),
            interval: Duration::from_millis(250),
            count: Some(3),
        }
    );
}

#[test]
fn rejects_zero_interval() {
    assert!(Cli::try_parse_from(["labwire", "poll", "g", "field", "--interval", "0s"]).is_err());
}

#[test]
fn parses_query_timeout() {
    let cli = Cli::try_parse_from(["labwire", "query", "lockin", "OUTP? 3", "--timeout", "2s"])
        .unwrap();
    assert!(matches!(
        cli.command,
        Command::Query { timeout: Some(t), .. } if t == Duration::from_secs(2)
    ));
}

/// Accepts one connection, answers `POW?` with a fixed reading, and returns
/// every line received once the client disconnects.
async fn fake_generator(listener: TcpListener) -> Vec<String> {
    let (socket, _) = listener.accept().await.unwrap();
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    let mut received = Vec::new();
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\r', &mut line).await.unwrap() == 0 {
            return received;
        }
        let line = String::from_utf8(line).unwrap().trim_end().to_string();
        if line == "POW?" {
            write.write_all(b"-10.000000\r").await.unwrap();
        }
        received.push(line);
    }
}

fn config_for(port: u16) -> AppConfig {
    let mut config = AppConfig::default();
    config.instruments.insert(
        "lo".to_string(),
        InstrumentConfig {
            driver: "hittite".to_string(),
            address: Some(format!("127.0.0.1:{port}")),
            session: None,
            timing: None,
            enabled: true,
        },
    );
    config
}

#[tokio::test]
async fn set_and_poll_through_configured_instrument() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(fake_generator(listener));
    let config = config_for(port);

    let instrument = cli::open(&config, "lo").await.unwrap();
    instrument.set_by_name("frequency", "10.5e9").await.unwrap();
    cli::poll(&instrument, "power_dbm", Duration::from_millis(10), Some(3))
        .await
        .unwrap();
    instrument.close().await.unwrap();

    assert_eq!(
        server.await.unwrap(),
        vec!["FREQ 10500000000.000000", "POW?", "POW?", "POW?"]
    );
}

/// Answers the first `POW?` with an unterminated fragment and every later one
/// with a complete reading.
async fn stalling_generator(listener: TcpListener) -> usize {
    let (socket, _) = listener.accept().await.unwrap();
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    let mut queries = 0;
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\r', &mut line).await.unwrap() == 0 {
            return queries;
        }
        queries += 1;
        let reply: &[u8] = if queries == 1 { b"-1.0" } else { b"-2.000000\r" };
        write.write_all(reply).await.unwrap();
    }
}

#[tokio::test]
async fn poll_recovers_from_timed_out_read() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(stalling_generator(listener));
    let mut config = config_for(port);
    config.instruments.get_mut("lo").unwrap().timing = Some(TimingPolicy::new(
        Duration::ZERO,
        Duration::from_millis(100),
    ));

    let instrument = cli::open(&config, "lo").await.unwrap();
    cli::poll(&instrument, "power_dbm", Duration::from_millis(10), Some(2))
        .await
        .unwrap();
    // The stale fragment never reaches a later read
    assert_eq!(
        instrument.get_by_name("power_dbm").await.unwrap(),
        Value::Float(-2.0)
    );
    instrument.close().await.unwrap();

    assert_eq!(server.await.unwrap(), 3);
}

#[tokio::test]
async fn disabled_and_unknown_instruments_are_not_opened() {
    let mut config = config_for(1);
    config.instruments.get_mut("lo").unwrap().enabled = false;

    let err = cli::open(&config, "lo").await.unwrap_err();
    assert!(err.to_string().contains("disabled"));

    let err = cli::open(&config, "gaussmeter").await.unwrap_err();
    assert!(err.to_string().contains("Unknown instrument"));
}
