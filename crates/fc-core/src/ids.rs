//! Typed ID wrappers providing compile-time safety for entity identifiers.
//!
//! Each ID type is a newtype over the `i64` row id assigned by the record
//! store, preventing accidental misuse (e.g., passing a `FrameId` where a
//! `JobId` is expected).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Generate a newtype ID wrapper over `i64`.
///
/// The macro produces a struct with:
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`, `Serialize`, `Deserialize`
/// - `Display` and `FromStr` delegating to the inner integer
/// - `From<i64>` and `Into<i64>` conversions
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(i64);

            impl $name {
                /// Wrap a raw row id.
                #[must_use]
                pub const fn new(raw: i64) -> Self {
                    Self(raw)
                }

                /// Return the inner row id.
                #[must_use]
                pub const fn get(&self) -> i64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = ParseIntError;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    s.trim().parse::<i64>().map(Self)
                }
            }

            impl From<i64> for $name {
                fn from(raw: i64) -> Self {
                    Self(raw)
                }
            }

            impl From<$name> for i64 {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

typed_id! {
    /// Identifier of one video's extraction job.
    JobId,
    /// Identifier of one stored frame.
    FrameId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_roundtrip() {
        let id = JobId::new(17);
        let s = id.to_string();
        assert_eq!(s, "17");
        assert_eq!(s.parse::<JobId>().unwrap(), id);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("abc".parse::<FrameId>().is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let id = FrameId::new(5);
        assert_eq!(serde_json::to_string(&id).unwrap(), "5");
        let back: FrameId = serde_json::from_str("5").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn conversions() {
        let id: JobId = 9.into();
        let raw: i64 = id.into();
        assert_eq!(raw, 9);
    }
}
