//! Macro for the string form of closed status enums
//!
//! Statuses, categories and platform kinds are stored as text columns and
//! appear in logs; this keeps the text form in one place per enum.
//!
//! # Example
//!
//! ```rust
//! use orderlink_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum FeedbackState {
//!     Pending,
//!     Written,
//! }
//!
//! impl_domain_status_conversions!(FeedbackState {
//!     Pending => "pending",
//!     Written => "written",
//! });
//!
//! assert_eq!(FeedbackState::Written.as_str(), "written");
//! assert_eq!("PENDING".parse::<FeedbackState>(), Ok(FeedbackState::Pending));
//! ```

/// Implements `as_str`, `Display` and case-insensitive `FromStr` for a
/// fieldless enum.
///
/// String forms must be lowercase literals; parsing lowercases its input
/// before matching.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Stable lowercase text form, as stored in the database.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
