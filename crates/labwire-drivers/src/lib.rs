//! Instrument drivers built on `labwire-core`.
//!
//! Each driver is a property table plus a thin typed wrapper around
//! [`labwire_core::Instrument`]. Drivers are found by the `driver` name used in
//! configuration files:
//!
//! | driver               | model                              | link            |
//! |----------------------|------------------------------------|-----------------|
//! | `lakeshore_425`      | Lake Shore 425 gaussmeter          | serial 57600 7O1 |
//! | `lakeshore_218`      | Lake Shore 218 temperature monitor | serial 9600 7O1 |
//! | `srs_sr830`          | SRS SR830 lock-in amplifier        | serial 19200    |
//! | `keithley_2400`      | Keithley 2400 source meter         | serial 9600     |
//! | `hittite`            | Hittite signal generator           | TCP 50000       |
//! | `jackson_labs_fury`  | Jackson Labs Fury GPSDO            | serial 115200   |

pub mod factory;
pub mod hittite;
pub mod jackson_labs;
pub mod keithley;
pub mod lakeshore;
pub mod srs;

pub use factory::DriverFactory;

/// Every driver in this crate.
pub static DRIVERS: &[&dyn DriverFactory] = &[
    &lakeshore::Gaussmeter425Factory,
    &lakeshore::TemperatureMonitor218Factory,
    &srs::Sr830Factory,
    &keithley::SourceMeter2400Factory,
    &hittite::HittiteFactory,
    &jackson_labs::FuryFactory,
];

/// Look up a driver by its configuration name (case-insensitive).
pub fn find_driver(driver_type: &str) -> Option<&'static dyn DriverFactory> {
    DRIVERS
        .iter()
        .copied()
        .find(|factory| factory.driver_type().eq_ignore_ascii_case(driver_type))
}

/// Names of all registered drivers.
pub fn driver_types() -> Vec<&'static str> {
    DRIVERS.iter().map(|factory| factory.driver_type()).collect()
}
