use crate::shared::serde_ext::parse_via_string;
use serde::{Deserialize, Deserializer, Serialize};

pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    // Remote ids are GUIDs or numeric strings, script ids are dotted paths
    // like `vikingbot.base.upgrade`; both stay within this charset.
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-', '_' or '.'"
    ))
}

macro_rules! define_id_type {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                validate_identifier_value($kind, raw.trim())?;
                Ok(Self(raw.trim().to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                parse_via_string(deserializer, Self::parse)
            }
        }
    };
}

define_id_type!(EntityId, "entity id");
define_id_type!(ScriptId, "script id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_accepts_guids_and_numbers() {
        EntityId::parse("3f5a9c2e-61d4-4f7b-9a58-0c1de2b7a914").expect("guid");
        EntityId::parse("650").expect("numeric");
        EntityId::parse("").expect_err("empty");
        EntityId::parse("has space").expect_err("space");
    }

    #[test]
    fn script_id_accepts_dotted_paths() {
        ScriptId::parse("vikingbot.base.gathervip").expect("dotted");
    }
}
