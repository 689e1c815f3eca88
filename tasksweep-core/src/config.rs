//! Sweep configuration: defaults, `tasksweep.toml`, environment overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::params::WorkloadSpec;
use crate::LaunchStrategy;

/// Numeric knobs of one sweep invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Smallest core count; the sweep doubles from here.
    #[serde(default = "default_min_cores")]
    pub min_cores: u32,

    /// Largest core count the doubling sequence may reach.
    #[serde(default = "default_max_cores")]
    pub max_cores: u32,

    /// Explicit core-count list; overrides the doubling sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_counts: Option<Vec<u32>>,

    /// Repeat count handed to each workload.
    #[serde(default = "default_repeats")]
    pub repeats: u32,

    /// Wall-clock budget per cell in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Threads-per-core binding policy (1 = balanced, 2 = compact).
    #[serde(default = "default_threads_per_core")]
    pub threads_per_core: u32,

    #[serde(default)]
    pub scale_timeout: bool,

    #[serde(default)]
    pub csv_output: bool,

    #[serde(default = "default_strategies")]
    pub strategies: Vec<LaunchStrategy>,

    /// Suite root; input paths and relative directories resolve here.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,

    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,
}

fn default_min_cores() -> u32 {
    1
}
fn default_max_cores() -> u32 {
    8
}
fn default_repeats() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    100
}
fn default_threads_per_core() -> u32 {
    1
}
fn default_strategies() -> Vec<LaunchStrategy> {
    vec![
        LaunchStrategy::Deferred,
        LaunchStrategy::Optional,
        LaunchStrategy::Async,
    ]
}
fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_bin_dir() -> PathBuf {
    PathBuf::from("bin")
}
fn default_results_file() -> PathBuf {
    PathBuf::from("results/results.json")
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            min_cores: default_min_cores(),
            max_cores: default_max_cores(),
            core_counts: None,
            repeats: default_repeats(),
            timeout_secs: default_timeout_secs(),
            threads_per_core: default_threads_per_core(),
            scale_timeout: false,
            csv_output: false,
            strategies: default_strategies(),
            root: default_root(),
            bin_dir: default_bin_dir(),
            results_file: default_results_file(),
        }
    }
}

impl SweepSettings {
    /// The swept core counts: the explicit list if given, otherwise the
    /// doubling sequence `min, 2*min, ...` capped at `max_cores`.
    pub fn core_counts(&self) -> Vec<u32> {
        if let Some(explicit) = &self.core_counts {
            return explicit.clone();
        }
        let mut counts = Vec::new();
        let mut n = self.min_cores.max(1);
        while n <= self.max_cores {
            counts.push(n);
            n *= 2;
        }
        counts
    }

    /// Binary directory resolved against the suite root.
    pub fn resolved_bin_dir(&self) -> PathBuf {
        if self.bin_dir.is_absolute() {
            self.bin_dir.clone()
        } else {
            self.root.join(&self.bin_dir)
        }
    }

    /// Snapshot path resolved against the suite root.
    pub fn resolved_results_file(&self) -> PathBuf {
        if self.results_file.is_absolute() {
            self.results_file.clone()
        } else {
            self.root.join(&self.results_file)
        }
    }
}

/// Complete tasksweep configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub sweep: SweepSettings,

    /// Per-workload overrides of the builtin argument table.
    #[serde(default)]
    pub workloads: BTreeMap<String, WorkloadSpec>,
}

impl SweepConfig {
    /// Load configuration with priority: env vars > config file > defaults.
    pub fn load() -> Self {
        let mut config = Self::from_file("tasksweep.toml").unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: SweepConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        Ok(())
    }

    /// Apply `TASKSWEEP_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TASKSWEEP_MIN_CORES") {
            if let Ok(n) = val.parse() {
                self.sweep.min_cores = n;
            }
        }
        if let Ok(val) = std::env::var("TASKSWEEP_MAX_CORES") {
            if let Ok(n) = val.parse() {
                self.sweep.max_cores = n;
            }
        }
        if let Ok(val) = std::env::var("TASKSWEEP_REPEATS") {
            if let Ok(n) = val.parse() {
                self.sweep.repeats = n;
            }
        }
        if let Ok(val) = std::env::var("TASKSWEEP_TIMEOUT") {
            if let Ok(n) = val.parse() {
                self.sweep.timeout_secs = n;
            }
        }
        if let Ok(val) = std::env::var("TASKSWEEP_THREADS_PER_CORE") {
            if let Ok(n) = val.parse() {
                self.sweep.threads_per_core = n;
            }
        }
        if let Ok(val) = std::env::var("TASKSWEEP_BIN_DIR") {
            self.sweep.bin_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TASKSWEEP_RESULTS") {
            self.sweep.results_file = PathBuf::from(val);
        }
    }
}
