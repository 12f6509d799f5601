use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;

/// Opaque incremental-results token: the largest issue timestamp a client
/// has already been given.
///
/// The wire form is URL-safe base64 of an RFC 3339 timestamp carrying full
/// sub-second precision, so encoding never rounds a timestamp down below an
/// issue that was already delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResultsCursor(DateTime<Utc>);

impl ResultsCursor {
    /// Cursor meaning "from the beginning".
    pub fn beginning() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn decode(token: &str) -> Result<Self, ModelError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim().trim_end_matches('='))
            .map_err(|_| ModelError::InvalidToken)?;
        let text = String::from_utf8(bytes).map_err(|_| ModelError::InvalidToken)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|instant| Self(instant.with_timezone(&Utc)))
            .map_err(|_| ModelError::InvalidToken)
    }
}

impl Default for ResultsCursor {
    fn default() -> Self {
        Self::beginning()
    }
}

impl fmt::Display for ResultsCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ResultsCursor {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for ResultsCursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for ResultsCursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::decode(&raw).map_err(serde::de::Error::custom)
    }
}
