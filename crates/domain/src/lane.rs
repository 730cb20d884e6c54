//! Lane/provider addressing.
//!
//! A [`LaneKey`] names one `(lane, provider)` pair.  Its string form
//! `"{lane}:{provider}"` is the bucket key used in the persisted ledger
//! state and in configuration files.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One `(lane, provider)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneKey {
    pub lane: String,
    pub provider: String,
}

impl LaneKey {
    pub fn new(lane: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            lane: lane.into(),
            provider: provider.into(),
        }
    }
}

impl fmt::Display for LaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lane, self.provider)
    }
}

impl FromStr for LaneKey {
    type Err = String;

    /// Split on the first `:`.  Provider names may themselves contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((lane, provider)) if !lane.is_empty() && !provider.is_empty() => {
                Ok(Self::new(lane, provider))
            }
            _ => Err(format!("invalid lane key '{s}' (expected 'lane:provider')")),
        }
    }
}

impl Serialize for LaneKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LaneKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
