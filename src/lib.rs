//! # labwire
//!
//! Application layer over the instrument stack:
//!
//! - **`config`**: `labwire.toml` plus `LABWIRE_` environment overrides, naming
//!   each instrument's driver and address
//! - **`logging`**: tracing subscriber setup (pretty, compact or JSON)
//! - **`cli`**: the `labwire` command-line tool
//!
//! The protocol engine lives in `labwire-core` and the instrument drivers in
//! `labwire-drivers`; both are re-exported here.

pub mod cli;
pub mod config;
pub mod logging;

pub use labwire_core as core;
pub use labwire_drivers as drivers;
