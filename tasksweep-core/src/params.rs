//! Workload argument resolution.
//!
//! Maps a workload id to the positional arguments its binary expects.
//! Input-file arguments are resolved against the suite root so the
//! engine's working directory does not decide which file gets picked up.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Invocation arguments for one workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Whitespace-separated default arguments (possibly empty).
    #[serde(default)]
    pub args: String,

    /// Input file passed as the first argument, relative to the suite root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
}

impl WorkloadSpec {
    fn with_args(args: &str) -> Self {
        Self {
            args: args.to_string(),
            input: None,
        }
    }

    fn with_input(input: &str) -> Self {
        Self {
            args: String::new(),
            input: Some(PathBuf::from(input)),
        }
    }
}

/// Resolves workload ids to argument vectors.
#[derive(Debug, Clone)]
pub struct ParamResolver {
    root: PathBuf,
    specs: BTreeMap<String, WorkloadSpec>,
}

impl ParamResolver {
    /// Build a resolver from the builtin table, applying per-workload
    /// overrides (typically from `tasksweep.toml`) on top.
    pub fn new<P: AsRef<Path>>(root: P, overrides: &BTreeMap<String, WorkloadSpec>) -> Self {
        let mut specs = builtin_specs();
        for (name, spec) in overrides {
            specs.insert(name.clone(), spec.clone());
        }
        Self {
            root: root.as_ref().to_path_buf(),
            specs,
        }
    }

    /// Ordered workload ids known to this resolver.
    pub fn workloads(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }

    /// Resolve a workload id to its positional argument vector.
    ///
    /// Unknown ids resolve to no arguments; that is not an error.
    pub fn resolve(&self, workload: &str) -> Vec<String> {
        let Some(spec) = self.specs.get(workload) else {
            return Vec::new();
        };

        let mut argv = Vec::new();
        if let Some(input) = &spec.input {
            argv.push(self.root.join(input).display().to_string());
        }
        argv.extend(spec.args.split_whitespace().map(str::to_string));
        argv
    }
}

/// The builtin workload table with the suite's default arguments.
pub fn builtin_specs() -> BTreeMap<String, WorkloadSpec> {
    let mut specs = BTreeMap::new();
    specs.insert(
        "alignment".to_string(),
        WorkloadSpec::with_input("bin/input/alignment/prot.100.aa"),
    );
    specs.insert("fft".to_string(), WorkloadSpec::with_args("1000000"));
    specs.insert("fib".to_string(), WorkloadSpec::with_args("30"));
    specs.insert(
        "floorplan".to_string(),
        WorkloadSpec::with_input("bin/input/floorplan/input.15"),
    );
    specs.insert(
        "health".to_string(),
        WorkloadSpec::with_input("bin/input/health/medium.input"),
    );
    specs.insert("intersim".to_string(), WorkloadSpec::with_args("50"));
    specs.insert("nqueens".to_string(), WorkloadSpec::with_args("13"));
    specs.insert("pyramids".to_string(), WorkloadSpec::default());
    specs.insert(
        "qap".to_string(),
        WorkloadSpec::with_input("bin/input/qap/chr12c.dat"),
    );
    specs.insert("round".to_string(), WorkloadSpec::with_args("512 10"));
    specs.insert(
        "sort".to_string(),
        WorkloadSpec::with_args("100000000 8192 2048 128"),
    );
    specs.insert("sparselu".to_string(), WorkloadSpec::default());
    specs.insert("strassen".to_string(), WorkloadSpec::with_args("4096"));
    specs.insert(
        "uts".to_string(),
        WorkloadSpec::with_input("bin/input/uts/tiny.input"),
    );
    specs
}
