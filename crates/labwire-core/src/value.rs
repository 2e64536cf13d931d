//! Property value types.
//!
//! [`PropertyType`] is how a Rust type travels over the wire: how it is parsed
//! from a response payload, how it is written into a command, and how it is shown
//! to a caller that only knows property names ([`Value`]).

use crate::codec;
use std::fmt;

// =============================================================================
// Value
// =============================================================================

/// Dynamically typed property value, used where the concrete type is erased.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Free text or an enumerated token label
    Text(String),
    /// Several values read together
    List(Vec<Value>),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// PropertyType
// =============================================================================

/// A type that can be read from and written to an instrument as text.
pub trait PropertyType: Sized + Clone + Send + Sync + 'static {
    /// Parse a response payload.
    fn parse_wire(text: &str) -> Result<Self, String>;

    /// Render the value as a command argument.
    fn format_wire(&self) -> String;

    /// Parse text typed by a person. Defaults to the wire syntax.
    fn parse_input(text: &str) -> Result<Self, String> {
        Self::parse_wire(text)
    }

    /// Erase into a [`Value`].
    fn to_value(&self) -> Value;
}

impl PropertyType for bool {
    fn parse_wire(text: &str) -> Result<Self, String> {
        codec::strict_bool(text)
    }

    fn format_wire(&self) -> String {
        String::from(if *self { "1" } else { "0" })
    }

    fn parse_input(text: &str) -> Result<Self, String> {
        codec::loose_bool(text)
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

macro_rules! integer_property {
    ($($ty:ty),+) => {
        $(
            impl PropertyType for $ty {
                fn parse_wire(text: &str) -> Result<Self, String> {
                    let wide = codec::int(text)?;
                    <$ty>::try_from(wide)
                        .map_err(|_| format!("{wide} is out of range for {}", stringify!($ty)))
                }

                fn format_wire(&self) -> String {
                    self.to_string()
                }

                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }
            }
        )+
    };
}

integer_property!(i64, i32, u8, u16, u32);

impl PropertyType for f64 {
    fn parse_wire(text: &str) -> Result<Self, String> {
        codec::float(text)
    }

    fn format_wire(&self) -> String {
        self.to_string()
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl PropertyType for String {
    fn parse_wire(text: &str) -> Result<Self, String> {
        Ok(text.to_string())
    }

    fn format_wire(&self) -> String {
        self.clone()
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl PropertyType for Vec<f64> {
    fn parse_wire(text: &str) -> Result<Self, String> {
        codec::float_list(text)
    }

    fn format_wire(&self) -> String {
        self.iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().copied().map(Value::Float).collect())
    }
}

impl<A: PropertyType, B: PropertyType> PropertyType for (A, B) {
    fn parse_wire(text: &str) -> Result<Self, String> {
        let [a, b] = codec::fields::<2>(text)?;
        Ok((A::parse_wire(a)?, B::parse_wire(b)?))
    }

    fn format_wire(&self) -> String {
        format!("{}, {}", self.0.format_wire(), self.1.format_wire())
    }

    fn parse_input(text: &str) -> Result<Self, String> {
        let [a, b] = codec::fields::<2>(text)?;
        Ok((A::parse_input(a)?, B::parse_input(b)?))
    }

    fn to_value(&self) -> Value {
        Value::List(vec![self.0.to_value(), self.1.to_value()])
    }
}

impl<A: PropertyType, B: PropertyType, C: PropertyType> PropertyType for (A, B, C) {
    fn parse_wire(text: &str) -> Result<Self, String> {
        let [a, b, c] = codec::fields::<3>(text)?;
        Ok((A::parse_wire(a)?, B::parse_wire(b)?, C::parse_wire(c)?))
    }

    fn format_wire(&self) -> String {
        format!(
            "{}, {}, {}",
            self.0.format_wire(),
            self.1.format_wire(),
            self.2.format_wire()
        )
    }

    fn parse_input(text: &str) -> Result<Self, String> {
        let [a, b, c] = codec::fields::<3>(text)?;
        Ok((A::parse_input(a)?, B::parse_input(b)?, C::parse_input(c)?))
    }

    fn to_value(&self) -> Value {
        Value::List(vec![
            self.0.to_value(),
            self.1.to_value(),
            self.2.to_value(),
        ])
    }
}

// =============================================================================
// Common composite readings
// =============================================================================

/// Reply to `*IDN?`: manufacturer, model, serial number, firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// Manufacturer
    pub manufacturer: String,
    /// Model
    pub model: String,
    /// Serial number
    pub serial: String,
    /// Firmware revision as reported
    pub firmware: String,
}

impl Identification {
    /// Firmware revision as a number, for instruments that report one (`1.2`).
    pub fn firmware_version(&self) -> Result<f64, String> {
        codec::float(&self.firmware)
    }
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (serial {}, firmware {})",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}

impl PropertyType for Identification {
    fn parse_wire(text: &str) -> Result<Self, String> {
        // Firmware strings may themselves contain commas on some models
        let mut parts = text.splitn(4, ',').map(str::trim);
        let mut next = |what: &str| {
            parts
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| format!("identification is missing the {what} field"))
        };
        Ok(Self {
            manufacturer: next("manufacturer")?,
            model: next("model")?,
            serial: next("serial")?,
            firmware: next("firmware")?,
        })
    }

    fn format_wire(&self) -> String {
        format!(
            "{},{},{},{}",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }

    fn to_value(&self) -> Value {
        Value::List(vec![
            Value::Text(self.manufacturer.clone()),
            Value::Text(self.model.clone()),
            Value::Text(self.serial.clone()),
            Value::Text(self.firmware.clone()),
        ])
    }
}

/// Status register byte read as a decimal integer (e.g. `OPST?`, `*ESR?`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusBits(pub u8);

impl StatusBits {
    /// Whether bit `n` (0 = least significant) is set.
    pub fn bit(self, n: u8) -> bool {
        n < 8 && self.0 & (1 << n) != 0
    }

    /// Indices of all set bits, lowest first.
    pub fn set_bits(self) -> Vec<u8> {
        (0..8).filter(|n| self.bit(*n)).collect()
    }
}

impl PropertyType for StatusBits {
    fn parse_wire(text: &str) -> Result<Self, String> {
        u8::parse_wire(text).map(StatusBits)
    }

    fn format_wire(&self) -> String {
        self.0.to_string()
    }

    fn to_value(&self) -> Value {
        Value::Int(i64::from(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_wire_is_strict_but_input_is_friendly() {
        assert!(bool::parse_wire("1").unwrap());
        assert!(bool::parse_wire("true").is_err());
        assert!(bool::parse_input("on").unwrap());
        assert_eq!(true.format_wire(), "1");
    }

    #[test]
    fn test_integer_range_checked() {
        assert_eq!(u8::parse_wire("+4").unwrap(), 4);
        assert!(u8::parse_wire("300").is_err());
        assert!(u8::parse_wire("-1").is_err());
    }

    #[test]
    fn test_tuple_round_trip_formatting() {
        let parsed = <(u8, bool, u8)>::parse_wire("1,0,2").unwrap();
        assert_eq!(parsed, (1, false, 2));
        assert_eq!(parsed.format_wire(), "1, 0, 2");
        assert!(<(u8, bool, u8)>::parse_wire("1,0").is_err());
    }

    #[test]
    fn test_identification() {
        let id = Identification::parse_wire("LSCI,MODEL425,4250001,1.2").unwrap();
        assert_eq!(id.model, "MODEL425");
        assert_eq!(id.firmware_version().unwrap(), 1.2);

        let keithley = Identification::parse_wire(
            "KEITHLEY INSTRUMENTS INC.,MODEL 2400,1234567,C30 Mar 17 2006 09:29:29/A02 /K/J",
        )
        .unwrap();
        assert!(keithley.firmware_version().is_err());

        assert!(Identification::parse_wire("LSCI,MODEL425").is_err());
    }

    #[test]
    fn test_status_bits() {
        let status = StatusBits::parse_wire("129").unwrap();
        assert!(status.bit(0));
        assert!(status.bit(7));
        assert!(!status.bit(1));
        assert_eq!(status.set_bits(), vec![0, 7]);
        assert!(!status.bit(9));
    }

    #[test]
    fn test_value_display() {
        let value = Value::List(vec![Value::Float(1.5), Value::Bool(true)]);
        assert_eq!(value.to_string(), "1.5, true");
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Text("x".into()).as_f64(), None);
    }
}
