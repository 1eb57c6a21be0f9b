//! Station identifier type.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error returned when parsing an invalid station id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid station id: {reason}")]
pub struct InvalidStationId {
    reason: &'static str,
}

/// A global station identifier such as `de:09162:1`.
///
/// Ids are trimmed on parse and must be non-empty without inner whitespace.
/// Any `StationId` value is valid by construction.
///
/// # Examples
///
/// ```
/// use tram_reliability::domain::StationId;
///
/// let id = StationId::parse(" de:09162:1 ").unwrap();
/// assert_eq!(id.as_str(), "de:09162:1");
///
/// assert!(StationId::parse("").is_err());
/// assert!(StationId::parse("de 09162").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId(String);

impl StationId {
    /// Parse a station id from a string.
    pub fn parse(s: &str) -> Result<Self, InvalidStationId> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(InvalidStationId {
                reason: "must not be empty",
            });
        }

        if trimmed.chars().any(char::is_whitespace) {
            return Err(InvalidStationId {
                reason: "must not contain whitespace",
            });
        }

        Ok(StationId(trimmed.to_string()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first three colon-separated segments (`de:09162:1:2:3` -> `de:09162:1`).
    ///
    /// Feed stop ids carry extra platform segments; this prefix is what links
    /// them back to a station.
    pub fn base(&self) -> &str {
        base_segments(&self.0)
    }
}

/// Cut an id down to its first three colon-separated segments.
pub(crate) fn base_segments(id: &str) -> &str {
    match id.match_indices(':').nth(2) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

impl fmt::Debug for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StationId({})", self.0)
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for StationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        StationId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_ids() {
        assert!(StationId::parse("de:09162:1").is_ok());
        assert!(StationId::parse("de:09162:70").is_ok());
        assert!(StationId::parse("A").is_ok());
    }

    #[test]
    fn parse_trims() {
        let id = StationId::parse("  de:09162:6\n").unwrap();
        assert_eq!(id.as_str(), "de:09162:6");
    }

    #[test]
    fn reject_empty() {
        assert!(StationId::parse("").is_err());
        assert!(StationId::parse("   ").is_err());
    }

    #[test]
    fn reject_inner_whitespace() {
        assert!(StationId::parse("de:09162 1").is_err());
        assert!(StationId::parse("de\t1").is_err());
    }

    #[test]
    fn base_keeps_three_segments() {
        let id = StationId::parse("de:09162:1:2:3").unwrap();
        assert_eq!(id.base(), "de:09162:1");

        let id = StationId::parse("de:09162:1").unwrap();
        assert_eq!(id.base(), "de:09162:1");

        let id = StationId::parse("de:09162").unwrap();
        assert_eq!(id.base(), "de:09162");
    }

    #[test]
    fn display_and_debug() {
        let id = StationId::parse("de:09162:1").unwrap();
        assert_eq!(format!("{}", id), "de:09162:1");
        assert_eq!(format!("{:?}", id), "StationId(de:09162:1)");
    }

    #[test]
    fn serde_roundtrip_as_plain_string() {
        let id = StationId::parse("de:09162:1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"de:09162:1\"");

        let back: StationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<StationId>("\"\"").is_err());
    }
}
