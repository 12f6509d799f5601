use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse the hyphenated textual form. Anything else (braced,
            /// urn, simple) is rejected so ids in URLs stay canonical.
            pub fn parse(raw: &str) -> Result<Self, ModelError> {
                if raw.len() != 36 {
                    return Err(ModelError::InvalidId(raw.to_string()));
                }
                Uuid::parse_str(raw)
                    .map(Self)
                    .map_err(|_| ModelError::InvalidId(raw.to_string()))
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identity of one supervised plugin process, unique for the lifetime of
    /// the Plugin Service.
    SessionId
);
uuid_id!(
    /// Identity of one Task Engine scan.
    ScanId
);
uuid_id!(
    /// Identity of an artifact file reported by a plugin.
    FileId
);
uuid_id!(
    /// Server-assigned identity of an ingested issue.
    IssueId
);
