use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use tasksweep_core::config::SweepConfig;
use tasksweep_core::params::ParamResolver;
use tasksweep_core::report::{self, ReportSource, ReportSpec};
use tasksweep_core::{BindingPolicy, LaunchStrategy, SweepDriver, SweepPlan, Topology};

#[derive(Parser)]
#[command(
    name = "tasksweep",
    version,
    about = "Drive parallel task benchmarks across workloads, launch strategies and core counts"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute the sweep, persisting a result snapshot after every cell
    Run(RunArgs),
    /// Pivot one or more result snapshots into comparison tables
    Report(ReportArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Workload name fragments; a workload runs iff any fragment matches
    filters: Vec<String>,

    /// Config file (default: tasksweep.toml in the current directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Smallest core count of the doubling sequence
    #[arg(long)]
    min_cores: Option<u32>,

    /// Largest core count of the doubling sequence
    #[arg(long)]
    max_cores: Option<u32>,

    /// Explicit comma-separated core counts, overriding min/max doubling
    #[arg(long, value_delimiter = ',')]
    cores: Option<Vec<u32>>,

    /// Repeat count handed to each workload
    #[arg(long)]
    repeats: Option<u32>,

    /// Wall-clock budget per cell in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Threads bound per physical core (1 = balanced, 2 = compact)
    #[arg(long)]
    threads_per_core: Option<u32>,

    /// Launch strategies to sweep, comma separated
    #[arg(long, value_delimiter = ',', value_parser = parse_strategy)]
    strategies: Option<Vec<LaunchStrategy>>,

    /// Directory holding the compiled workload binaries
    #[arg(long)]
    bin_dir: Option<PathBuf>,

    /// Snapshot file overwritten after every cell
    #[arg(long)]
    results: Option<PathBuf>,

    /// Toolchain label; names the snapshot results/results_<LABEL>.json
    /// unless --results is given
    #[arg(long)]
    toolchain: Option<String>,

    /// Scale the wall budget by each cell's core count
    #[arg(long)]
    scale_timeout: bool,

    /// Ask workloads for per-repeat timing output
    #[arg(long)]
    csv_output: bool,

    /// Launch unpinned, for hosts without a usable pinning facility
    #[arg(long)]
    no_pin: bool,
}

#[derive(Args)]
struct ReportArgs {
    /// Snapshot source as LABEL=PATH; repeat for side-by-side columns
    #[arg(long = "store", value_name = "LABEL=PATH", required = true)]
    stores: Vec<String>,

    /// Token rendered for missing or timed-out cells
    #[arg(long, default_value = "?")]
    missing: String,

    /// Comma-separated core counts to report (default: the sweep's)
    #[arg(long, value_delimiter = ',')]
    cores: Option<Vec<u32>>,

    /// Comma-separated workloads to report (default: the whole suite)
    #[arg(long, value_delimiter = ',')]
    workloads: Option<Vec<String>>,

    /// Comma-separated strategies to report (default: the sweep's)
    #[arg(long, value_delimiter = ',', value_parser = parse_strategy)]
    strategies: Option<Vec<LaunchStrategy>>,

    /// Value column width
    #[arg(long, default_value_t = 24)]
    width: usize,
}

fn parse_strategy(s: &str) -> Result<LaunchStrategy, String> {
    s.parse()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Report(args) => cmd_report(args),
    }
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            let mut c = SweepConfig::from_file(path)
                .map_err(|e| anyhow!("failed to read config {}: {}", path.display(), e))?;
            c.apply_env_overrides();
            c
        }
        None => SweepConfig::load(),
    };

    if let Some(v) = args.min_cores {
        config.sweep.min_cores = v;
    }
    if let Some(v) = args.max_cores {
        config.sweep.max_cores = v;
    }
    if args.cores.is_some() {
        config.sweep.core_counts = args.cores;
    }
    if let Some(v) = args.repeats {
        config.sweep.repeats = v;
    }
    if let Some(v) = args.timeout {
        config.sweep.timeout_secs = v;
    }
    if let Some(v) = args.threads_per_core {
        config.sweep.threads_per_core = v;
    }
    if let Some(v) = args.strategies {
        config.sweep.strategies = v;
    }
    if let Some(v) = args.bin_dir {
        config.sweep.bin_dir = v;
    }
    match (args.results, &args.toolchain) {
        (Some(path), _) => config.sweep.results_file = path,
        (None, Some(label)) => {
            config.sweep.results_file = PathBuf::from(format!("results/results_{}.json", label));
        }
        (None, None) => {}
    }
    if args.scale_timeout {
        config.sweep.scale_timeout = true;
    }
    if args.csv_output {
        config.sweep.csv_output = true;
    }

    let mut core_counts = config.sweep.core_counts();
    core_counts.sort_unstable();
    core_counts.dedup();
    if core_counts.is_empty() {
        bail!("no core counts to sweep (check --min-cores/--max-cores/--cores)");
    }

    let binding = BindingPolicy::from_threads_per_core(config.sweep.threads_per_core)?;
    let topology = Topology::detect();
    let resolver = ParamResolver::new(&config.sweep.root, &config.workloads);

    let plan = SweepPlan {
        workloads: resolver.workloads(),
        filters: args.filters,
        strategies: config.sweep.strategies.clone(),
        core_counts: core_counts.clone(),
        repeats: config.sweep.repeats,
        timeout_secs: config.sweep.timeout_secs,
        scale_timeout: config.sweep.scale_timeout,
        csv_output: config.sweep.csv_output,
        binding,
        pin: !args.no_pin,
        bin_dir: config.sweep.resolved_bin_dir(),
        results_path: config.sweep.resolved_results_file(),
    };

    println!("tasksweep - benchmark sweep runner");
    println!("==================================\n");
    println!(
        "Topology: {} socket(s) x {} core(s) x {} thread(s) = {} logical",
        topology.sockets,
        topology.cores_per_socket,
        topology.threads_per_core,
        topology.total_logical()
    );
    println!(
        "Core counts: {:?} | strategies: {} | repeats: {} | timeout: {}s\n",
        core_counts,
        plan.strategies
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(","),
        plan.repeats,
        plan.timeout_secs
    );

    let results_path = plan.results_path.clone();
    let table = SweepDriver::new(plan, topology, resolver)
        .run()
        .context("sweep aborted")?;

    if table.is_empty() {
        eprintln!(
            "{} no workload matched the given filters; nothing was recorded",
            "warning:".yellow().bold()
        );
        return Ok(());
    }

    println!(
        "\n{} {} cell(s) recorded -> {}",
        "Sweep complete:".green().bold(),
        table.cell_count(),
        results_path.display()
    );
    Ok(())
}

fn cmd_report(args: ReportArgs) -> Result<()> {
    let config = SweepConfig::load();

    let mut sources = Vec::new();
    for store in &args.stores {
        let (label, path) = parse_store_spec(store)?;
        let source = ReportSource::load(&label, &path);
        if source.table.is_none() {
            eprintln!(
                "{} snapshot {} is missing or unreadable; '{}' columns render '{}'",
                "warning:".yellow().bold(),
                path.display(),
                label,
                args.missing
            );
        }
        sources.push(source);
    }

    let spec = ReportSpec {
        workloads: args
            .workloads
            .unwrap_or_else(|| ParamResolver::new(".", &config.workloads).workloads()),
        core_counts: args.cores.unwrap_or_else(|| config.sweep.core_counts()),
        strategies: args.strategies.unwrap_or(config.sweep.strategies),
        missing_token: args.missing,
        column_width: args.width,
    };

    print!("{}", report::render(&sources, &spec));
    Ok(())
}

/// Split a `LABEL=PATH` store argument.
fn parse_store_spec(spec: &str) -> Result<(String, PathBuf)> {
    match spec.split_once('=') {
        Some((label, path)) if !label.is_empty() && !path.is_empty() => {
            Ok((label.to_string(), PathBuf::from(path)))
        }
        _ => bail!("invalid --store '{}', expected LABEL=PATH", spec),
    }
}
