//! Result table and crash-resilient snapshot persistence.
//!
//! The table is a 4-level nested mapping
//! (workload -> strategy -> core count -> outcome) with exactly one
//! writer, the sweep driver. Persistence is a wholesale snapshot
//! overwrite after every cell: write to a sibling temp file, then rename
//! over the target, so an interrupted sweep always leaves the last
//! complete snapshot readable.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::LaunchStrategy;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Outcome of one executed sweep cell.
///
/// A cell that was never executed has no entry at all, keeping
/// "not run" distinct from "timed out" in the persisted table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CellOutcome {
    /// The workload printed a parseable (time, stddev) pair.
    Completed { time_ms: f64, stddev_ms: f64 },
    /// Budget exceeded, abnormal exit, or output without a matching pair.
    TimedOut,
}

impl CellOutcome {
    /// The measured pair, if the cell completed.
    pub fn sample(&self) -> Option<(f64, f64)> {
        match self {
            CellOutcome::Completed { time_ms, stddev_ms } => Some((*time_ms, *stddev_ms)),
            CellOutcome::TimedOut => None,
        }
    }
}

type CoreMap = BTreeMap<u32, CellOutcome>;
type StrategyMap = BTreeMap<String, CoreMap>;

/// Nested workload -> strategy -> core count -> outcome mapping.
///
/// Intermediate levels auto-create on first write; recording at an
/// existing key overwrites the prior outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultTable {
    entries: BTreeMap<String, StrategyMap>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        workload: &str,
        strategy: LaunchStrategy,
        core_count: u32,
        outcome: CellOutcome,
    ) {
        self.entries
            .entry(workload.to_string())
            .or_default()
            .entry(strategy.as_str().to_string())
            .or_default()
            .insert(core_count, outcome);
    }

    pub fn get(&self, workload: &str, strategy: &str, core_count: u32) -> Option<&CellOutcome> {
        self.entries
            .get(workload)?
            .get(strategy)?
            .get(&core_count)
    }

    /// Core counts recorded for one (workload, strategy) pair.
    pub fn core_counts(&self, workload: &str, strategy: &str) -> Vec<u32> {
        self.entries
            .get(workload)
            .and_then(|s| s.get(strategy))
            .map(|cores| cores.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of recorded cells.
    pub fn cell_count(&self) -> usize {
        self.entries
            .values()
            .flat_map(|s| s.values())
            .map(|cores| cores.len())
            .sum()
    }
}

/// Self-describing on-disk form of a [`ResultTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub written_at: String,
    pub results: ResultTable,
}

impl Snapshot {
    pub fn new(results: ResultTable) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            written_at: chrono::Utc::now().to_rfc3339(),
            results,
        }
    }

    /// Persist the whole snapshot, replacing any prior file atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), io::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Snapshot, io::Error> {
        let contents = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "unsupported snapshot version {} (expected {})",
                    snapshot.version, SNAPSHOT_VERSION
                ),
            ));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn completed(time_ms: f64, stddev_ms: f64) -> CellOutcome {
        CellOutcome::Completed { time_ms, stddev_ms }
    }

    #[test]
    fn record_auto_creates_intermediate_levels() {
        let mut table = ResultTable::new();
        table.record("fib", LaunchStrategy::Async, 4, completed(123.4, 5.6));

        assert_eq!(
            table.get("fib", "async", 4),
            Some(&completed(123.4, 5.6))
        );
        assert_eq!(table.get("fib", "async", 2), None);
        assert_eq!(table.get("fib", "deferred", 4), None);
        assert_eq!(table.get("sort", "async", 4), None);
    }

    #[test]
    fn table_is_empty_until_the_first_record() {
        let mut table = ResultTable::new();
        assert!(table.is_empty());

        table.record("fib", LaunchStrategy::Async, 1, completed(1.0, 0.1));
        assert!(!table.is_empty());
    }

    #[test]
    fn record_overwrites_identical_keys() {
        let mut table = ResultTable::new();
        table.record("fib", LaunchStrategy::Async, 1, completed(100.0, 1.0));
        table.record("fib", LaunchStrategy::Async, 1, CellOutcome::TimedOut);

        assert_eq!(table.get("fib", "async", 1), Some(&CellOutcome::TimedOut));
        assert_eq!(table.cell_count(), 1);
    }

    #[test]
    fn core_counts_are_sorted_per_strategy() {
        let mut table = ResultTable::new();
        table.record("fib", LaunchStrategy::Async, 4, completed(1.0, 0.1));
        table.record("fib", LaunchStrategy::Async, 1, completed(4.0, 0.1));
        table.record("fib", LaunchStrategy::Async, 2, completed(2.0, 0.1));

        assert_eq!(table.core_counts("fib", "async"), vec![1, 2, 4]);
        assert!(table.core_counts("fib", "deferred").is_empty());
    }

    #[test]
    fn snapshot_round_trips_exactly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");

        let mut table = ResultTable::new();
        table.record("fib", LaunchStrategy::Deferred, 1, completed(250.25, 3.5));
        table.record("fib", LaunchStrategy::Async, 1, completed(251.0, 2.0));
        table.record("fib", LaunchStrategy::Async, 2, CellOutcome::TimedOut);
        table.record("sort", LaunchStrategy::Optional, 8, completed(9000.0, 120.5));

        Snapshot::new(table.clone()).save(&path).unwrap();
        let loaded = Snapshot::load(&path).unwrap();

        assert_eq!(loaded.version, SNAPSHOT_VERSION);
        assert_eq!(loaded.results, table);
    }

    #[test]
    fn save_replaces_the_previous_snapshot_wholesale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");

        let mut first = ResultTable::new();
        first.record("fib", LaunchStrategy::Async, 1, completed(1.0, 0.1));
        first.record("sort", LaunchStrategy::Async, 1, completed(2.0, 0.2));
        Snapshot::new(first).save(&path).unwrap();

        let mut second = ResultTable::new();
        second.record("fib", LaunchStrategy::Async, 1, completed(3.0, 0.3));
        Snapshot::new(second.clone()).save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.results, second);
        assert_eq!(loaded.results.get("sort", "async", 1), None);
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results").join("results_gcc.json");

        Snapshot::new(ResultTable::new()).save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn load_rejects_future_snapshot_versions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        fs::write(
            &path,
            r#"{"version": 99, "written_at": "2026-01-01T00:00:00Z", "results": {}}"#,
        )
        .unwrap();

        let err = Snapshot::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        assert!(Snapshot::load("/nonexistent/results.json").is_err());
    }
}
