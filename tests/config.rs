//! Configuration loading from files and the environment.

use labwire::config::AppConfig;
use labwire::logging::LogFormat;
use labwire_core::{EndpointConfig, FlowControl, Terminator};
use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("LABWIRE_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn shipped_config_loads() {
    clear_env();
    let config = AppConfig::load_from(concat!(env!("CARGO_MANIFEST_DIR"), "/config/labwire.toml"))
        .unwrap();

    assert_eq!(config.instruments.len(), 6);
    assert!(!config.instruments["sourcemeter"].enabled);
    assert_eq!(config.enabled_instruments().count(), 5);

    let lockin = config.instruments["lockin"].session_config().unwrap();
    assert_eq!(lockin.timing.response_timeout, Duration::from_secs(2));

    let reference = config.instruments["reference"].session_config().unwrap();
    assert_eq!(reference.framing.terminator, Terminator::cr());
    let EndpointConfig::Serial(serial) = reference.endpoint else {
        panic!("expected serial endpoint");
    };
    assert_eq!(serial.flow_control, FlowControl::Hardware);
}

#[test]
#[serial]
fn environment_overrides_file() {
    clear_env();
    let file = write_config(
        r#"
        [logging]
        level = "info"

        [instruments.gaussmeter]
        driver = "lakeshore_425"
        address = "/dev/ttyUSB0"
        "#,
    );

    std::env::set_var("LABWIRE_LOGGING__LEVEL", "debug");
    std::env::set_var("LABWIRE_LOGGING__FORMAT", "json");
    std::env::set_var("LABWIRE_INSTRUMENTS__GAUSSMETER__ADDRESS", "/dev/ttyUSB7");
    let config = AppConfig::load_from(file.path());
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    let session = config.instruments["gaussmeter"].session_config().unwrap();
    assert_eq!(session.endpoint.to_string(), "serial:/dev/ttyUSB7");
}

#[test]
#[serial]
fn missing_file_uses_defaults() {
    clear_env();
    let config = AppConfig::load_from("/nonexistent/labwire.toml").unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Compact);
    assert!(config.instruments.is_empty());
}

#[test]
#[serial]
fn invalid_instrument_is_rejected_at_load() {
    clear_env();
    let zero_timeout = write_config(
        r#"
        [instruments.lockin]
        driver = "srs_sr830"
        address = "/dev/ttyUSB2"
        timing = { response_timeout = "0s" }
        "#,
    );
    let err = AppConfig::load_from(zero_timeout.path()).unwrap_err();
    assert!(err.to_string().contains("lockin"), "{err}");

    let bad_driver = write_config(
        r#"
        [instruments.scope]
        driver = "tektronix_dpo"
        address = "/dev/ttyUSB4"
        "#,
    );
    let err = AppConfig::load_from(bad_driver.path()).unwrap_err();
    assert!(err.to_string().contains("unknown driver"), "{err}");

    let bad_data_bits = write_config(
        r#"
        [instruments.monitor]
        driver = "lakeshore_218"

        [instruments.monitor.session.endpoint]
        kind = "serial"
        path = "/dev/ttyUSB1"
        baud_rate = 9600
        data_bits = 9
        "#,
    );
    let err = AppConfig::load_from(bad_data_bits.path()).unwrap_err();
    assert!(err.to_string().contains("data bits"), "{err}");
}
