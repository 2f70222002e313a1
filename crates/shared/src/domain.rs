use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Sheet display format for vote timestamps (second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wire sentinel for a "neither option is better" decision.
pub const NEITHER_SENTINEL: &str = "neither";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(SessionId);
id_newtype!(PairId);

impl SessionId {
    /// Accepts participant-supplied free text; whitespace-only input is rejected.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptySessionId);
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// The participant's decision for one pair: one of the two option images, or
/// an explicit refusal to pick either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Winner {
    Image(String),
    Neither,
}

impl Winner {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyWinner);
        }
        if trimmed == NEITHER_SENTINEL {
            return Ok(Self::Neither);
        }
        Ok(Self::Image(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Image(name) => name,
            Self::Neither => NEITHER_SENTINEL,
        }
    }
}

impl Serialize for Winner {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Winner {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Winner::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One row of the durable vote log. Append-only: once constructed and
/// buffered, a record is never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub session_id: SessionId,
    pub pair_id: PairId,
    pub winner: Winner,
    pub timestamp: DateTime<Utc>,
}

impl VoteRecord {
    pub fn new(
        session_id: SessionId,
        pair_id: PairId,
        winner: Winner,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if session_id.0.trim().is_empty() {
            return Err(DomainError::EmptySessionId);
        }
        if pair_id.0.trim().is_empty() {
            return Err(DomainError::EmptyPairId);
        }
        Ok(Self {
            session_id,
            pair_id,
            winner,
            timestamp,
        })
    }

    /// Timestamp as written to the store, truncated to second precision.
    pub fn timestamp_cell(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}
