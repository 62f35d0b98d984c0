//! Network distance to a store node

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Measured round-trip distance to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Reachable(Duration),
    Unreachable,
}

impl Distance {
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable(_))
    }

    #[must_use]
    pub const fn latency(&self) -> Option<Duration> {
        match self {
            Self::Reachable(latency) => Some(*latency),
            Self::Unreachable => None,
        }
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    /// Lower latency sorts first; unreachable sorts after every latency.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::Reachable(a), Self::Reachable(b)) => a.cmp(b),
            (Self::Reachable(_), Self::Unreachable) => std::cmp::Ordering::Less,
            (Self::Unreachable, Self::Reachable(_)) => std::cmp::Ordering::Greater,
            (Self::Unreachable, Self::Unreachable) => std::cmp::Ordering::Equal,
        }
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reachable(latency) => write!(f, "{}ms", latency.as_millis()),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// One node's distance measurement, with when it was taken
#[derive(Debug, Clone)]
pub struct DistanceInfo {
    pub node: String,
    pub distance: Distance,
    pub measured_at: DateTime<Utc>,
}
