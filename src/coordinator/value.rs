//! `CoordinatorValue<T>`: the "dynamic polymorphism over coordinator values" pattern.
//!
//! Every value in the coordinator is an untyped string. Rather than letting
//! parse failures bubble up as transport errors, every typed read goes
//! through this three-way sum so callers are forced to decide what an
//! absent or malformed value means in their context.

use serde::de::DeserializeOwned;

/// The result of interpreting a raw coordinator string as a `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorValue<T> {
    /// The key existed and parsed successfully.
    Present(T),
    /// The key did not exist.
    Absent,
    /// The key existed but its value did not parse as `T`. Carries the
    /// original string for logging.
    Invalid(String),
}

impl<T> CoordinatorValue<T> {
    #[must_use]
    pub fn present(self) -> Option<T> {
        match self {
            CoordinatorValue::Present(v) => Some(v),
            _ => None,
        }
    }

    /// Treat `Invalid` the same as `Absent`, falling back to `default`.
    /// This is the common case per §7: "warn, overwrite with a safe default, proceed."
    #[must_use]
    pub fn or_default(self, default: T) -> T {
        match self {
            CoordinatorValue::Present(v) => v,
            CoordinatorValue::Absent | CoordinatorValue::Invalid(_) => default,
        }
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, CoordinatorValue::Present(_))
    }
}

/// Parse a raw `Option<String>` as a decimal `u64` (timestamps, counters).
#[must_use]
pub fn parse_u64(raw: Option<String>) -> CoordinatorValue<u64> {
    match raw {
        None => CoordinatorValue::Absent,
        Some(s) => match s.trim().parse::<u64>() {
            Ok(v) => CoordinatorValue::Present(v),
            Err(_) => CoordinatorValue::Invalid(s),
        },
    }
}

/// Parse a raw `Option<String>` as a decimal `u32`.
#[must_use]
pub fn parse_u32(raw: Option<String>) -> CoordinatorValue<u32> {
    match raw {
        None => CoordinatorValue::Absent,
        Some(s) => match s.trim().parse::<u32>() {
            Ok(v) => CoordinatorValue::Present(v),
            Err(_) => CoordinatorValue::Invalid(s),
        },
    }
}

/// Parse a raw `Option<String>` as a "1"/"0" boolean flag.
#[must_use]
pub fn parse_flag(raw: Option<String>) -> CoordinatorValue<bool> {
    match raw {
        None => CoordinatorValue::Absent,
        Some(s) => match s.trim() {
            "1" => CoordinatorValue::Present(true),
            "0" => CoordinatorValue::Present(false),
            _ => CoordinatorValue::Invalid(s),
        },
    }
}

/// Parse a raw `Option<String>` as JSON into any `Deserialize` type.
pub fn parse_json<T: DeserializeOwned>(raw: Option<String>) -> CoordinatorValue<T> {
    match raw {
        None => CoordinatorValue::Absent,
        Some(s) => match serde_json::from_str::<T>(&s) {
            Ok(v) => CoordinatorValue::Present(v),
            Err(e) => CoordinatorValue::Invalid(format!("{s} ({e})")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_u64() {
        assert_eq!(parse_u64(Some("42".into())), CoordinatorValue::Present(42));
    }

    #[test]
    fn absent_when_none() {
        assert_eq!(parse_u64(None), CoordinatorValue::Absent);
    }

    #[test]
    fn invalid_when_unparseable() {
        assert_eq!(
            parse_u64(Some("not-a-number".into())),
            CoordinatorValue::Invalid("not-a-number".into())
        );
    }

    #[test]
    fn or_default_treats_invalid_as_absent() {
        let v: CoordinatorValue<u64> = CoordinatorValue::Invalid("garbage".into());
        assert_eq!(v.or_default(0), 0);
    }

    #[test]
    fn flag_parses_one_and_zero() {
        assert_eq!(parse_flag(Some("1".into())), CoordinatorValue::Present(true));
        assert_eq!(parse_flag(Some("0".into())), CoordinatorValue::Present(false));
        assert!(matches!(
            parse_flag(Some("yes".into())),
            CoordinatorValue::Invalid(_)
        ));
    }
}
