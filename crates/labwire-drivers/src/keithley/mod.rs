//! Keithley instruments.

pub mod sourcemeter_2400;

pub use sourcemeter_2400::{
    SourceMeter2400, SourceMeter2400Factory, SourceMeterProperties, SourceMeterState,
};
