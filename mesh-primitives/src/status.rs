//! Health status shared by agents and knowledge bases.

use serde::{Deserialize, Serialize};

/// Reported health of a registered agent or knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Resource is healthy and serving requests.
    Active,
    /// Resource is reachable but failing some probes.
    Degraded,
    /// Resource missed enough probes to be considered gone.
    Offline,
}

impl ResourceStatus {
    /// Returns the wire representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ResourceStatus::Degraded).unwrap(), "\"degraded\"");
        let parsed: ResourceStatus = serde_json::from_str("\"offline\"").unwrap();
        assert_eq!(parsed, ResourceStatus::Offline);
    }
}
