//! Record identity - the database-assigned `#cluster:position` id
//!
//! Every stored record lives at a position inside a cluster. The pair is the
//! record's identity for its whole life; the ORM never derives identity from
//! field values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;

/// Cluster id used by records that were never stored
pub const CLUSTER_ID_INVALID: i16 = -1;

/// Position used by records that were never stored
pub const CLUSTER_POS_INVALID: i64 = -1;

/// Record identifier (`#<cluster>:<position>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    cluster: i16,
    position: i64,
}

impl RecordId {
    /// Identity of a record that has not been stored yet
    pub const NEW: RecordId = RecordId {
        cluster: CLUSTER_ID_INVALID,
        position: CLUSTER_POS_INVALID,
    };

    pub const fn new(cluster: i16, position: i64) -> Self {
        Self { cluster, position }
    }

    pub fn cluster(&self) -> i16 {
        self.cluster
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Points at a real slot in a real cluster
    pub fn is_persistent(&self) -> bool {
        self.cluster >= 0 && self.position >= 0
    }

    /// Not yet assigned a position
    pub fn is_new(&self) -> bool {
        self.position < 0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::NEW
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster, self.position)
    }
}

impl FromStr for RecordId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidKey(format!("'{}' is not a record id", s));

        let body = s.trim();
        let body = body.strip_prefix('#').unwrap_or(body);
        let (cluster, position) = body.split_once(':').ok_or_else(invalid)?;

        let cluster: i16 = cluster.parse().map_err(|_| invalid())?;
        let position: i64 = position.parse().map_err(|_| invalid())?;

        if cluster < CLUSTER_ID_INVALID {
            return Err(invalid());
        }

        Ok(Self { cluster, position })
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
