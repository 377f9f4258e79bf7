//! `deserialize_with` helpers for option fields that may arrive as strings.
//!
//! Flat key/value and environment sources only produce string leaves.
//! Fields declared with these helpers accept both the native JSON type and
//! its string spelling:
//!
//! ```
//! #[derive(serde::Deserialize)]
//! struct Info {
//!     #[serde(deserialize_with = "tenancy_core::lenient::bool")]
//!     some_property: bool,
//! }
//!
//! let info: Info = serde_json::from_str(r#"{ "some_property": "true" }"#).unwrap();
//! assert!(info.some_property);
//! ```

use std::str::FromStr;

use serde::de::{Deserializer, Error};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Native(T),
    Text(String),
}

fn parse<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: std::fmt::Display,
{
    match Lenient::<T>::deserialize(deserializer)? {
        Lenient::Native(value) => Ok(value),
        Lenient::Text(text) => text.trim().parse().map_err(D::Error::custom),
    }
}

/// Accepts `true`, `false`, `"true"` and `"False"`.
///
/// # Errors
///
/// Fails when the value is neither a boolean nor a boolean string.
pub fn bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Lenient::<bool>::deserialize(deserializer)? {
        Lenient::Native(value) => Ok(value),
        Lenient::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(D::Error::custom(format!("invalid boolean: {other}"))),
        },
    }
}

/// Accepts a number or a string holding one.
///
/// # Errors
///
/// Fails when the string does not parse as `T`.
pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: std::fmt::Display,
{
    parse(deserializer)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Settings {
        #[serde(deserialize_with = "super::bool")]
        enabled: bool,
        #[serde(deserialize_with = "super::number")]
        retries: u32,
    }

    #[test]
    fn accepts_native_values() {
        let s: Settings = serde_json::from_value(json!({ "enabled": false, "retries": 3 })).unwrap();
        assert!(!s.enabled);
        assert_eq!(s.retries, 3);
    }

    #[test]
    fn accepts_string_values() {
        let s: Settings =
            serde_json::from_value(json!({ "enabled": "True", "retries": " 7 " })).unwrap();
        assert!(s.enabled);
        assert_eq!(s.retries, 7);
    }

    #[test]
    fn rejects_garbage() {
        let result: Result<Settings, _> =
            serde_json::from_value(json!({ "enabled": "yes", "retries": 1 }));
        assert!(result.is_err());
    }
}
