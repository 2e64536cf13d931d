//! Lake Shore Cryotronics instruments.
//!
//! Both models speak 7O1 serial with LF termination and require a quiet gap
//! after every exchange; the gap differs per model and lives in each driver's
//! session settings.

pub mod gaussmeter_425;
pub mod temperature_218;

pub use gaussmeter_425::{
    AcBandwidth, FieldUnit, Gaussmeter425, Gaussmeter425Factory, Gaussmeter425Properties,
    MeasurementMode, OperationalStatus, ReadingMode,
};
pub use temperature_218::{Monitor218Properties, TemperatureMonitor218, TemperatureMonitor218Factory};
