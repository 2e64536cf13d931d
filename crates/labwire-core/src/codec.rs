//! Text codecs for response payloads and command arguments.
//!
//! Parsers return `Result<_, String>`; the binding that calls them attaches the
//! property name and the raw response to build a [`crate::LinkError::Parse`].

/// Parse a floating point reading such as `+1.234E+01` or `-0.5`.
pub fn float(text: &str) -> Result<f64, String> {
    let text = text.trim();
    text.parse::<f64>()
        .map_err(|e| format!("expected a number, got {text:?} ({e})"))
}

/// Parse a signed integer such as `+3` or `-12`.
pub fn int(text: &str) -> Result<i64, String> {
    let text = text.trim();
    text.parse::<i64>()
        .map_err(|e| format!("expected an integer, got {text:?} ({e})"))
}

/// Parse a device boolean. Only `0` and `1` are accepted.
pub fn strict_bool(text: &str) -> Result<bool, String> {
    match text.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(format!("expected 0 or 1, got {other:?}")),
    }
}

/// Parse a user-supplied boolean (`on`/`off`, `true`/`false`, `yes`/`no`, `1`/`0`).
pub fn loose_bool(text: &str) -> Result<bool, String> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Ok(true),
        "0" | "off" | "false" | "no" => Ok(false),
        other => Err(format!("expected on/off, true/false or 1/0, got {other:?}")),
    }
}

/// Split on commas and trim every field.
pub fn split_fields(text: &str) -> Vec<&str> {
    text.split(',').map(str::trim).collect()
}

/// Split into exactly `N` comma-separated fields.
pub fn fields<const N: usize>(text: &str) -> Result<[&str; N], String> {
    let parts = split_fields(text);
    let found = parts.len();
    <[&str; N]>::try_from(parts)
        .map_err(|_| format!("expected {N} comma-separated fields, got {found}"))
}

/// Parse a comma-separated list of numbers.
pub fn float_list(text: &str) -> Result<Vec<f64>, String> {
    split_fields(text).into_iter().map(float).collect()
}

/// Format a float in scientific notation with a signed two-digit exponent,
/// e.g. `scientific(1234.0, 3) == "1.234E+03"`.
pub fn scientific(value: f64, precision: usize) -> String {
    let formatted = format!("{value:.precision$E}");
    match formatted.split_once('E') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{mantissa}E{sign}{:02}", exp.abs())
            }
            Err(_) => formatted,
        },
        None => formatted,
    }
}

/// Format a float with a fixed number of decimals.
pub fn fixed(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_accepts_instrument_notation() {
        assert_eq!(float("+1.234E+01").unwrap(), 12.34);
        assert_eq!(float(" -0.5 ").unwrap(), -0.5);
        assert!(float("OVER").is_err());
        assert!(float("").is_err());
    }

    #[test]
    fn test_strict_bool_rejects_truthy_strings() {
        assert!(strict_bool("1").unwrap());
        assert!(!strict_bool("0").unwrap());
        // "0" must never read as true, and other text is an error rather than a guess
        assert!(strict_bool("false").is_err());
        assert!(strict_bool("2").is_err());
        assert!(strict_bool("").is_err());
    }

    #[test]
    fn test_loose_bool() {
        assert!(loose_bool("ON").unwrap());
        assert!(!loose_bool("false").unwrap());
        assert!(loose_bool("maybe").is_err());
    }

    #[test]
    fn test_fields_exact_count() {
        let [min, max] = fields::<2>("-1.0E+00, 2.5E+00").unwrap();
        assert_eq!(min, "-1.0E+00");
        assert_eq!(max, "2.5E+00");
        assert!(fields::<2>("1,2,3").is_err());
    }

    #[test]
    fn test_float_list() {
        assert_eq!(float_list("1.5,2,-3").unwrap(), vec![1.5, 2.0, -3.0]);
        assert!(float_list("1.5,,2").is_err());
    }

    #[test]
    fn test_scientific_matches_device_format() {
        assert_eq!(scientific(1234.0, 3), "1.234E+03");
        assert_eq!(scientific(0.001, 3), "1.000E-03");
        assert_eq!(scientific(0.0, 3), "0.000E+00");
        assert_eq!(scientific(-25.0, 2), "-2.50E+01");
    }

    #[test]
    fn test_fixed() {
        assert_eq!(fixed(3.1, 6), "3.100000");
        assert_eq!(fixed(0.02, 3), "0.020");
    }
}
