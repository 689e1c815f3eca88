//! Sweep execution over the (workload, strategy, core count) space.
//!
//! Cells run strictly one at a time: a timing is invalid if another
//! pinned process competes for the same cores, so there is no intra-sweep
//! parallelism by design. The whole result table is persisted after every
//! cell, making one cell the durability granularity.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::launch::{self, LaunchOutcome, LaunchSpec};
use crate::params::ParamResolver;
use crate::store::{CellOutcome, ResultTable, Snapshot};
use crate::topology::{self, BindingPolicy, Topology};
use crate::LaunchStrategy;

/// Environment contract of the workload binaries.
const ENV_REPEATS: &str = "INNCABS_REPEATS";
const ENV_LAUNCH_TYPES: &str = "INNCABS_LAUNCH_TYPES";
const ENV_MIN_OUTPUT: &str = "INNCABS_MIN_OUTPUT";
const ENV_TIMEOUT: &str = "INNCABS_TIMEOUT";
const ENV_CSV_OUTPUT: &str = "INNCABS_CSV_OUTPUT";

/// Fully resolved description of one sweep invocation.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    /// Ordered candidate workload ids.
    pub workloads: Vec<String>,
    /// Name fragments; empty selects every workload, otherwise a workload
    /// runs iff any fragment is a substring of its id.
    pub filters: Vec<String>,
    pub strategies: Vec<LaunchStrategy>,
    /// Ascending core counts.
    pub core_counts: Vec<u32>,
    pub repeats: u32,
    pub timeout_secs: u64,
    /// Scale the wall budget by the cell's core count, giving
    /// serial-equivalent headroom to runs that barely parallelize.
    pub scale_timeout: bool,
    /// Ask workloads for per-repeat timing output as well.
    pub csv_output: bool,
    pub binding: BindingPolicy,
    /// Pin each run to its affinity plan. Disabled only on hosts without
    /// a usable pinning facility; timings taken unpinned are suspect.
    pub pin: bool,
    /// Directory holding the compiled workload binaries.
    pub bin_dir: PathBuf,
    /// Snapshot target, overwritten after every cell.
    pub results_path: PathBuf,
}

impl SweepPlan {
    fn selected_workloads(&self) -> Vec<String> {
        self.workloads
            .iter()
            .filter(|w| {
                self.filters.is_empty() || self.filters.iter().any(|f| w.contains(f.as_str()))
            })
            .cloned()
            .collect()
    }

    fn min_core_count(&self) -> u32 {
        self.core_counts.first().copied().unwrap_or(1)
    }
}

/// Executes a [`SweepPlan`] cell by cell and owns the result table.
pub struct SweepDriver {
    plan: SweepPlan,
    topology: Topology,
    resolver: ParamResolver,
    table: ResultTable,
}

impl SweepDriver {
    pub fn new(plan: SweepPlan, topology: Topology, resolver: ParamResolver) -> Self {
        Self {
            plan,
            topology,
            resolver,
            table: ResultTable::new(),
        }
    }

    /// Run the whole sweep, persisting after every cell.
    ///
    /// Timeouts and unparseable output are recorded and swept past; an
    /// unwritable snapshot target aborts, leaving the last written
    /// snapshot authoritative.
    pub fn run(mut self) -> Result<ResultTable> {
        self.validate()?;

        let workloads = self.plan.selected_workloads();
        let min_cores = self.plan.min_core_count();

        for workload in &workloads {
            for &strategy in &self.plan.strategies {
                for &core_count in &self.plan.core_counts {
                    // Deferred launches are serial: a single data point at
                    // the minimum core count, nothing recorded above it.
                    if strategy == LaunchStrategy::Deferred && core_count > min_cores {
                        continue;
                    }

                    let outcome = self.run_cell(workload, strategy, core_count)?;
                    self.table.record(workload, strategy, core_count, outcome);

                    Snapshot::new(self.table.clone())
                        .save(&self.plan.results_path)
                        .with_context(|| {
                            format!(
                                "failed to persist result snapshot to {}",
                                self.plan.results_path.display()
                            )
                        })?;

                    print_cell_line(workload, strategy, core_count, &outcome);
                }
            }
        }

        Ok(self.table)
    }

    fn validate(&self) -> Result<()> {
        if self.plan.core_counts.is_empty() {
            bail!("sweep needs at least one core count");
        }
        if self.plan.core_counts.windows(2).any(|w| w[0] >= w[1]) {
            bail!("core counts must be strictly ascending");
        }
        if self.plan.strategies.is_empty() {
            bail!("sweep needs at least one launch strategy");
        }

        let max_cores = *self.plan.core_counts.last().unwrap() as usize;
        let demanded = max_cores * self.plan.binding.threads_per_core();
        if demanded > self.topology.total_logical() {
            bail!(
                "sweep requests {} logical processors but the machine has {}",
                demanded,
                self.topology.total_logical()
            );
        }
        Ok(())
    }

    fn run_cell(
        &self,
        workload: &str,
        strategy: LaunchStrategy,
        core_count: u32,
    ) -> Result<CellOutcome> {
        let spec = self.launch_spec(workload, strategy, core_count)?;
        let outcome = launch::run(&spec)
            .with_context(|| format!("failed to launch workload '{}'", workload))?;

        Ok(match outcome {
            LaunchOutcome::Exited { stdout, .. } => match launch::parse_sample(&stdout) {
                Some((time_ms, stddev_ms)) => CellOutcome::Completed { time_ms, stddev_ms },
                // Exit without a matching pair is indistinguishable from a
                // hang as far as the table is concerned.
                None => CellOutcome::TimedOut,
            },
            LaunchOutcome::TimedOut => CellOutcome::TimedOut,
        })
    }

    fn launch_spec(
        &self,
        workload: &str,
        strategy: LaunchStrategy,
        core_count: u32,
    ) -> Result<LaunchSpec> {
        let cpus = self.affinity_plan(core_count)?;

        let budget_secs = if self.plan.scale_timeout {
            self.plan.timeout_secs * core_count as u64
        } else {
            self.plan.timeout_secs
        };

        let mut env = BTreeMap::new();
        env.insert(ENV_REPEATS.to_string(), self.plan.repeats.to_string());
        env.insert(ENV_LAUNCH_TYPES.to_string(), strategy.as_str().to_string());
        env.insert(ENV_MIN_OUTPUT.to_string(), "true".to_string());
        env.insert(ENV_TIMEOUT.to_string(), (budget_secs * 1000).to_string());
        if self.plan.csv_output {
            env.insert(ENV_CSV_OUTPUT.to_string(), "true".to_string());
        }

        Ok(LaunchSpec {
            program: self.plan.bin_dir.join(workload),
            args: self.resolver.resolve(workload),
            env,
            cpus,
            budget: Duration::from_secs(budget_secs),
        })
    }

    fn affinity_plan(&self, core_count: u32) -> Result<Vec<usize>> {
        if !self.plan.pin {
            return Ok(Vec::new());
        }
        let core_count = core_count as usize;
        if self.topology.threads_per_core == 1 {
            Ok(topology::contiguous_plan(core_count))
        } else {
            topology::socket_aware_plan(core_count, &self.topology, self.plan.binding)
        }
    }
}

fn print_cell_line(
    workload: &str,
    strategy: LaunchStrategy,
    core_count: u32,
    outcome: &CellOutcome,
) {
    let result = match outcome {
        CellOutcome::Completed { time_ms, stddev_ms } => {
            format!("{:.2},{:.2}", time_ms, stddev_ms).bold().to_string()
        }
        CellOutcome::TimedOut => "timeout".red().bold().to_string(),
    };
    println!(
        "{} {} ({}, {}): {}",
        "CELL".green().bold(),
        workload.cyan(),
        strategy,
        core_count,
        result
    );
}
