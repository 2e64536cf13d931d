//! Enumerated wire tokens.
//!
//! Instruments encode choices as small integers (`UNIT 2` means Tesla). The
//! [`wire_token!`](crate::wire_token) macro declares an enum together with its
//! immutable bidirectional table: variant, device code and display label.
//!
//! ```rust
//! labwire_core::wire_token! {
//!     /// Field units
//!     pub enum FieldUnit {
//!         Gauss => ("1", "Gauss"),
//!         Tesla => ("2", "Tesla"),
//!     }
//! }
//!
//! assert_eq!(FieldUnit::Tesla.code(), "2");
//! assert_eq!(FieldUnit::from_code("1"), Some(FieldUnit::Gauss));
//! assert_eq!(FieldUnit::from_label("tesla"), Some(FieldUnit::Tesla));
//! ```
//!
//! Wire parsing accepts only codes. Input parsing (CLI, config) accepts either the
//! code or the label, case-insensitively.

/// Declare an enumerated token type. See the [module docs](crate::token).
#[macro_export]
macro_rules! wire_token {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => ($code:literal, $label:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Code sent to and received from the device.
            pub fn code(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Human-readable label.
            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Look up a variant by device code.
            pub fn from_code(code: &str) -> Option<Self> {
                let code = code.trim();
                Self::ALL.iter().copied().find(|v| v.code() == code)
            }

            /// Look up a variant by label, ignoring case.
            pub fn from_label(label: &str) -> Option<Self> {
                let label = label.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label().eq_ignore_ascii_case(label))
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.label())
            }
        }

        impl $crate::value::PropertyType for $name {
            fn parse_wire(text: &str) -> ::std::result::Result<Self, String> {
                Self::from_code(text).ok_or_else(|| {
                    format!("unknown {} code {:?}", stringify!($name), text.trim())
                })
            }

            fn format_wire(&self) -> String {
                self.code().to_string()
            }

            fn parse_input(text: &str) -> ::std::result::Result<Self, String> {
                Self::from_code(text)
                    .or_else(|| Self::from_label(text))
                    .ok_or_else(|| {
                        let choices: Vec<&str> = Self::ALL.iter().map(|v| v.label()).collect();
                        format!(
                            "unknown {} {:?}, expected one of: {}",
                            stringify!($name),
                            text.trim(),
                            choices.join(", ")
                        )
                    })
            }

            fn to_value(&self) -> $crate::value::Value {
                $crate::value::Value::Text(self.label().to_string())
            }
        }
    };
}
