//! Pivot result snapshots into delimited comparison tables.
//!
//! A report is a read-only join over the shared (workload, strategy,
//! core count) key across independently labeled snapshots, one
//! fixed-width block per workload. Missing levels render a sentinel
//! token instead of aborting, so a half-finished sweep still reports.

use std::path::Path;

use crate::store::{ResultTable, Snapshot};
use crate::LaunchStrategy;

/// One labeled snapshot feeding the report.
#[derive(Debug, Clone)]
pub struct ReportSource {
    /// Toolchain or variant label shown in column headers.
    pub label: String,
    /// `None` when the snapshot was missing or unreadable; every cell of
    /// this source then renders the missing token.
    pub table: Option<ResultTable>,
}

impl ReportSource {
    pub fn new(label: &str, table: ResultTable) -> Self {
        Self {
            label: label.to_string(),
            table: Some(table),
        }
    }

    /// Load a snapshot, degrading to an empty source on any read error.
    pub fn load<P: AsRef<Path>>(label: &str, path: P) -> Self {
        Self {
            label: label.to_string(),
            table: Snapshot::load(path).ok().map(|s| s.results),
        }
    }
}

/// What to pivot and how to render it.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    pub workloads: Vec<String>,
    pub strategies: Vec<LaunchStrategy>,
    /// Row order; the first entry doubles as the deferred lookup row.
    pub core_counts: Vec<u32>,
    pub missing_token: String,
    pub column_width: usize,
}

impl ReportSpec {
    fn min_core_count(&self) -> u32 {
        self.core_counts.first().copied().unwrap_or(1)
    }
}

/// Render every workload block to one string.
pub fn render(sources: &[ReportSource], spec: &ReportSpec) -> String {
    let mut out = String::new();
    for workload in &spec.workloads {
        render_block(&mut out, workload, sources, spec);
    }
    out
}

fn render_block(out: &mut String, workload: &str, sources: &[ReportSource], spec: &ReportSpec) {
    let w = spec.column_width;

    out.push_str(&format!("\n{}\n", workload));

    out.push_str(&format!("{:>8}", "#Cores ; "));
    for source in sources {
        for strategy in &spec.strategies {
            out.push_str(&format!(
                "{:>w$}",
                format!("{}:{} ms ; ", source.label, strategy)
            ));
            out.push_str(&format!(
                "{:>w$}",
                format!("{}:{} stddev ; ", source.label, strategy)
            ));
        }
    }
    out.push('\n');

    for &core_count in &spec.core_counts {
        out.push_str(&format!("{:>8}", format!("{} ; ", core_count)));
        for source in sources {
            for strategy in &spec.strategies {
                let (time, stddev) = cell(source, workload, *strategy, core_count, spec);
                out.push_str(&format!("{:>w$}", format!("{} ; ", time)));
                out.push_str(&format!("{:>w$}", format!("{} ; ", stddev)));
            }
        }
        out.push('\n');
    }
}

/// Resolve one (source, workload, strategy, core count) cell to its two
/// rendered columns.
fn cell(
    source: &ReportSource,
    workload: &str,
    strategy: LaunchStrategy,
    core_count: u32,
    spec: &ReportSpec,
) -> (String, String) {
    // Deferred cells only exist at the minimum core count; every row of
    // a deferred column reads that single entry.
    let lookup_cores = if strategy == LaunchStrategy::Deferred {
        spec.min_core_count()
    } else {
        core_count
    };

    let sample = source
        .table
        .as_ref()
        .and_then(|t| t.get(workload, strategy.as_str(), lookup_cores))
        .and_then(|outcome| outcome.sample());

    match sample {
        Some((time_ms, stddev_ms)) => (format!("{}", time_ms), format!("{}", stddev_ms)),
        None => (spec.missing_token.clone(), spec.missing_token.clone()),
    }
}
