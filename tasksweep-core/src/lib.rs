use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod launch;
pub mod params;
pub mod report;
pub mod store;
pub mod sweep;
pub mod topology;

pub use store::{CellOutcome, ResultTable, Snapshot};
pub use sweep::{SweepDriver, SweepPlan};
pub use topology::{BindingPolicy, Topology};

/// Task-spawning discipline a workload is asked to exercise.
///
/// The label is handed to the workload process through its environment;
/// the driver never interprets it beyond the deferred special case
/// (deferred runs are serial, so only the minimum core count is swept).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchStrategy {
    Deferred,
    Optional,
    Async,
    Fork,
}

impl LaunchStrategy {
    pub const ALL: [LaunchStrategy; 4] = [
        LaunchStrategy::Deferred,
        LaunchStrategy::Optional,
        LaunchStrategy::Async,
        LaunchStrategy::Fork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchStrategy::Deferred => "deferred",
            LaunchStrategy::Optional => "optional",
            LaunchStrategy::Async => "async",
            LaunchStrategy::Fork => "fork",
        }
    }
}

impl fmt::Display for LaunchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaunchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deferred" => Ok(LaunchStrategy::Deferred),
            "optional" => Ok(LaunchStrategy::Optional),
            "async" => Ok(LaunchStrategy::Async),
            "fork" => Ok(LaunchStrategy::Fork),
            other => Err(format!(
                "unknown launch strategy '{}' (expected deferred, optional, async or fork)",
                other
            )),
        }
    }
}
