use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

/// Deserialize a string field through a fallible parser. The parser's
/// message already names the field kind, so only the offending value is
/// appended.
pub fn parse_via_string<'de, D, T, F>(deserializer: D, parser: F) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    F: FnOnce(&str) -> Result<T, String>,
{
    let raw = String::deserialize(deserializer)?;
    parser(&raw).map_err(|err| D::Error::custom(format!("{err} (got `{raw}`)")))
}
