//! Command-line interface.
//!
//! ```bash
//! labwire list
//! labwire properties gaussmeter
//! labwire get gaussmeter field
//! labwire set gaussmeter unit tesla
//! labwire query lockin "OUTP? 3"
//! labwire poll gaussmeter field --interval 250ms --count 20
//! ```

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::logging::LogFormat;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use humantime_serde::re::humantime;
use labwire_core::{Instrument, LinkError};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Talk to line-oriented lab instruments.
#[derive(Parser, Debug)]
#[command(name = "labwire", version)]
#[command(about = "Line-oriented instrument control", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level, overriding the configuration file
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format, overriding the configuration file
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// List configured instruments and available drivers
    List,

    /// Show the properties and actions of an instrument's driver
    Properties {
        /// Instrument name from the configuration
        instrument: String,
    },

    /// Read a property
    Get {
        /// Instrument name
        instrument: String,
        /// Property name
        property: String,
    },

    /// Write a property
    Set {
        /// Instrument name
        instrument: String,
        /// Property name
        property: String,
        /// New value, e.g. `tesla`, `on`, `1.5e-3`, `2,0,1`
        value: String,
    },

    /// Run a named action (reset, auto_gain, zero_probe, ...)
    Action {
        /// Instrument name
        instrument: String,
        /// Action name
        action: String,
    },

    /// Send a raw command and print the response
    Query {
        /// Instrument name
        instrument: String,
        /// Command text, without terminator
        command: String,
        /// Response deadline, overriding the driver's
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Send a raw command without reading a response
    Send {
        /// Instrument name
        instrument: String,
        /// Command text, without terminator
        command: String,
    },

    /// Read a property repeatedly
    Poll {
        /// Instrument name
        instrument: String,
        /// Property name
        property: String,
        /// Time between reads
        #[arg(long, default_value = "1s", value_parser = parse_duration)]
        interval: Duration,
        /// Stop after this many reads (default: until interrupted)
        #[arg(long)]
        count: Option<u64>,
    },
}

/// Parse `250ms`, `1s`, `2m`.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(text).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}

/// Run one command against a loaded configuration.
pub async fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::List => {
            list(config);
            Ok(())
        }
        Command::Properties { instrument } => properties(config, &instrument),
        Command::Get {
            instrument,
            property,
        } => {
            let instrument = open(config, &instrument).await?;
            let value = instrument.get_by_name(&property).await?;
            println!("{value}");
            close(&instrument).await
        }
        Command::Set {
            instrument,
            property,
            value,
        } => {
            let instrument = open(config, &instrument).await?;
            instrument.set_by_name(&property, &value).await?;
            close(&instrument).await
        }
        Command::Action { instrument, action } => {
            let instrument = open(config, &instrument).await?;
            instrument.run_action(&action).await?;
            close(&instrument).await
        }
        Command::Query {
            instrument,
            command,
            timeout,
        } => {
            let instrument = open(config, &instrument).await?;
            let response = {
                let mut session = instrument.session().lock().await;
                match timeout {
                    Some(timeout) => session.query_within(&command, timeout).await?,
                    None => session.query(&command).await?,
                }
            };
            println!("{}", response.text());
            close(&instrument).await
        }
        Command::Send {
            instrument,
            command,
        } => {
            let instrument = open(config, &instrument).await?;
            instrument.send(&command).await?;
            close(&instrument).await
        }
        Command::Poll {
            instrument,
            property,
            interval,
            count,
        } => {
            let instrument = open(config, &instrument).await?;
            tokio::select! {
                result = poll(&instrument, &property, interval, count) => result?,
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
            close(&instrument).await
        }
    }
}

fn list(config: &AppConfig) {
    if config.instruments.is_empty() {
        println!("No instruments configured.");
    }
    for (name, instrument) in &config.instruments {
        let endpoint = instrument
            .session_config()
            .map(|s| s.endpoint.to_string())
            .unwrap_or_else(|e| format!("<{e}>"));
        let state = if instrument.enabled { "" } else { " (disabled)" };
        println!("{name:<16} {:<18} {endpoint}{state}", instrument.driver);
    }

    println!();
    println!("Drivers:");
    for factory in labwire_drivers::DRIVERS {
        println!("  {:<18} {}", factory.driver_type(), factory.name());
    }
}

fn properties(config: &AppConfig, name: &str) -> Result<()> {
    let factory = config.instrument(name)?.factory()?;
    let table = factory.properties();

    println!("{} ({})", factory.name(), factory.driver_type());
    for property in table.properties() {
        let access = match property.set_template() {
            Some(template) => format!("set: {template}"),
            None => "read-only".to_string(),
        };
        println!("  {:<34} {:<14} {access}", property.name(), property.query_command());
    }
    if table.actions().next().is_some() {
        println!("Actions:");
        for action in table.actions() {
            println!("  {:<34} {:<14} {}", action.name, action.command, action.description);
        }
    }
    Ok(())
}

/// Open a configured instrument through its driver.
pub async fn open(config: &AppConfig, name: &str) -> Result<Instrument> {
    let instrument = config.instrument(name)?;
    if !instrument.enabled {
        bail!("instrument '{name}' is disabled in the configuration");
    }
    let factory = instrument.factory()?;
    let session = instrument.session_config()?;
    factory.build(name.to_string(), session).await
}

async fn close(instrument: &Instrument) -> Result<()> {
    instrument
        .close()
        .await
        .with_context(|| format!("failed to close '{}'", instrument.name()))
}

/// Read `property` every `interval`, printing each value.
///
/// A timed-out read is reported and its late reply discarded before the next
/// tick. A lost link is reopened once per failure; if that fails too, polling
/// stops.
pub async fn poll(
    instrument: &Instrument,
    property: &str,
    interval: Duration,
    count: Option<u64>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut reads = 0u64;

    while count.map_or(true, |limit| reads < limit) {
        ticker.tick().await;
        reads += 1;

        match instrument.get_by_name(property).await {
            Ok(value) => println!("{value}"),
            Err(e) if e.is_retryable() => {
                warn!(property, error = %e, "read timed out");
                instrument
                    .discard_input()
                    .await
                    .with_context(|| format!("failed to resync '{}'", instrument.name()))?;
            }
            Err(e) if e.closes_session() || matches!(e, LinkError::NotOpen(_)) => {
                warn!(error = %e, "link lost, reopening");
                instrument
                    .reopen()
                    .await
                    .with_context(|| format!("failed to reopen '{}'", instrument.name()))?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
