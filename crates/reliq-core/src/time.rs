//! Repository timestamp wrapper with RFC 3339 rendering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Returns the current UTC time.
#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// A repository timestamp, serialized as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoDateTime(pub OffsetDateTime);

impl RepoDateTime {
    /// Wrap an [`OffsetDateTime`].
    #[must_use]
    pub fn new(datetime: OffsetDateTime) -> Self {
        Self(datetime)
    }

    /// The current UTC time as a [`RepoDateTime`].
    #[must_use]
    pub fn now() -> Self {
        Self(now_utc())
    }

    /// The wrapped [`OffsetDateTime`].
    #[must_use]
    pub fn inner(&self) -> OffsetDateTime {
        self.0
    }

    /// Seconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.0.unix_timestamp()
    }
}

impl fmt::Display for RepoDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self.0.format(&Rfc3339).map_err(|_| fmt::Error)?;
        f.write_str(&formatted)
    }
}

impl FromStr for RepoDateTime {
    type Err = time::error::Parse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(OffsetDateTime::parse(s, &Rfc3339)?))
    }
}

impl From<OffsetDateTime> for RepoDateTime {
    fn from(value: OffsetDateTime) -> Self {
        Self(value)
    }
}

impl Serialize for RepoDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self.0.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for RepoDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_display_rfc3339() {
        let ts = RepoDateTime::new(datetime!(2024-03-01 12:30:00 UTC));
        assert_eq!(ts.to_string(), "2024-03-01T12:30:00Z");
    }

    #[test]
    fn test_parse_roundtrip() {
        let ts: RepoDateTime = "2024-03-01T12:30:00Z".parse().unwrap();
        assert_eq!(ts.to_string(), "2024-03-01T12:30:00Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("yesterday".parse::<RepoDateTime>().is_err());
    }
}
