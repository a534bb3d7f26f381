//! Small shared value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named append-only log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Every ingested sample
    Data,
    /// Samples flagged as anomalous, enriched with window statistics
    Anomalies,
}

impl Channel {
    /// All channels
    pub const ALL: [Channel; 2] = [Channel::Data, Channel::Anomalies];

    /// Get the channel name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Data => "data",
            Channel::Anomalies => "anomalies",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "data" => Ok(Channel::Data),
            "anomalies" | "anomaly" => Ok(Channel::Anomalies),
            other => Err(format!(
                "Unknown channel: {}. Available: data, anomalies",
                other
            )),
        }
    }
}
