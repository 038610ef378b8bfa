//! Helper macros shared by the enum modules.

/// Generates `ALL`, `as_str`, `allowed`, `Display` and `FromStr` for a
/// lowercase string enum. `$err` builds the parse error from the rejected
/// input.
macro_rules! string_enum {
    ($ty:ident, $err:expr, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Every accepted value, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Returns the stored/wire representation.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }

            /// Comma separated list of accepted values (for error messages).
            pub fn allowed() -> String {
                Self::ALL
                    .iter()
                    .map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $ty {
            type Err = $crate::error::CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(($err)(other)),
                }
            }
        }
    };
}
