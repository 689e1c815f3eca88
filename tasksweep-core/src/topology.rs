//! CPU topology detection and processor-pinning plans.
//!
//! Benchmark timings are only meaningful when a run is pinned to a known
//! set of logical processors, so the sweep driver asks this module for an
//! ordered id list per cell instead of touching processor numbering itself.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Machine shape as seen by the affinity planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub sockets: usize,
    pub cores_per_socket: usize,
    pub threads_per_core: usize,
}

impl Topology {
    pub fn new(sockets: usize, cores_per_socket: usize, threads_per_core: usize) -> Self {
        Self {
            sockets,
            cores_per_socket,
            threads_per_core,
        }
    }

    pub fn total_physical(&self) -> usize {
        self.sockets * self.cores_per_socket
    }

    pub fn total_logical(&self) -> usize {
        self.total_physical() * self.threads_per_core
    }

    /// Detect the machine topology from sysfs.
    ///
    /// Falls back to a flat single-socket layout sized by
    /// `available_parallelism` when sysfs is not usable, so planning
    /// still works on non-Linux hosts.
    pub fn detect() -> Topology {
        detect_from_sysfs().unwrap_or_else(fallback_topology)
    }
}

/// How many hardware threads of each selected physical core a run may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingPolicy {
    /// One thread per physical core.
    Balanced,
    /// Fill both sibling threads of every selected core.
    Compact,
}

impl BindingPolicy {
    pub fn threads_per_core(&self) -> usize {
        match self {
            BindingPolicy::Balanced => 1,
            BindingPolicy::Compact => 2,
        }
    }

    pub fn from_threads_per_core(n: u32) -> Result<Self> {
        match n {
            1 => Ok(BindingPolicy::Balanced),
            2 => Ok(BindingPolicy::Compact),
            other => bail!("threads-per-core binding must be 1 or 2, got {}", other),
        }
    }
}

/// Plain `0..core_count` pinning, for machines where no hyperthread or
/// socket awareness is required (one thread per core).
pub fn contiguous_plan(core_count: usize) -> Vec<usize> {
    (0..core_count).collect()
}

/// Socket-aware pinning under interleaved hyperthread numbering, where
/// physical core `c` owns logical ids `2c` (primary) and `2c + 1`
/// (sibling).
///
/// Physical cores are filled socket by socket. Under
/// [`BindingPolicy::Balanced`] a request larger than the physical core
/// count spills into the sibling ids, so any `core_count` up to the
/// logical processor total is satisfiable; under
/// [`BindingPolicy::Compact`] each selected core's sibling id is
/// appended after the primaries, so the plan length is `core_count * 2`.
pub fn socket_aware_plan(
    core_count: usize,
    topology: &Topology,
    binding: BindingPolicy,
) -> Result<Vec<usize>> {
    if core_count == 0 {
        bail!("core count must be at least 1");
    }
    let demanded = core_count * binding.threads_per_core();
    if demanded > topology.total_logical() {
        bail!(
            "requested {} logical processors but the machine has only {}",
            demanded,
            topology.total_logical()
        );
    }

    let physical = topology.total_physical();
    let plan = match binding {
        BindingPolicy::Balanced => {
            // Primaries in socket order, then spill into sibling ids once
            // every physical core is taken.
            let primaries = core_count.min(physical);
            let mut plan: Vec<usize> = (0..primaries).map(|c| 2 * c).collect();
            plan.extend((0..core_count - primaries).map(|c| 2 * c + 1));
            plan
        }
        BindingPolicy::Compact => {
            let mut plan: Vec<usize> = (0..core_count).map(|c| 2 * c).collect();
            let siblings: Vec<usize> = plan.iter().map(|&id| id + 1).collect();
            plan.extend(siblings);
            plan
        }
    };

    Ok(plan)
}

fn detect_from_sysfs() -> Option<Topology> {
    let cpu_base = Path::new("/sys/devices/system/cpu");
    if !cpu_base.exists() {
        return None;
    }

    let mut packages: BTreeSet<usize> = BTreeSet::new();
    let mut core_keys: BTreeSet<(usize, String)> = BTreeSet::new();
    let mut logical = 0usize;

    let entries = fs::read_dir(cpu_base).ok()?;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let name = name.to_string_lossy().to_string();
        if !name.starts_with("cpu") || !name[3..].chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        let topo = entry.path().join("topology");
        let package: usize = fs::read_to_string(topo.join("physical_package_id"))
            .ok()?
            .trim()
            .parse()
            .ok()?;
        // Sibling lists are identical for hyperthread pairs, so the set of
        // (package, siblings) keys counts physical cores.
        let siblings = fs::read_to_string(topo.join("thread_siblings_list"))
            .ok()?
            .trim()
            .to_string();

        packages.insert(package);
        core_keys.insert((package, siblings));
        logical += 1;
    }

    if packages.is_empty() || core_keys.is_empty() || logical == 0 {
        return None;
    }

    let sockets = packages.len();
    let physical = core_keys.len();
    if physical % sockets != 0 || logical % physical != 0 {
        return None;
    }

    Some(Topology {
        sockets,
        cores_per_socket: physical / sockets,
        threads_per_core: logical / physical,
    })
}

fn fallback_topology() -> Topology {
    let logical = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    Topology {
        sockets: 1,
        cores_per_socket: logical,
        threads_per_core: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_socket_ht() -> Topology {
        // 2 sockets x 4 cores x 2 threads = 16 logical.
        Topology::new(2, 4, 2)
    }

    #[test]
    fn contiguous_plan_counts_from_zero() {
        assert_eq!(contiguous_plan(4), vec![0, 1, 2, 3]);
        assert_eq!(contiguous_plan(1), vec![0]);
    }

    #[test]
    fn balanced_plan_stays_on_first_socket_when_it_fits() {
        let topo = two_socket_ht();
        let plan = socket_aware_plan(3, &topo, BindingPolicy::Balanced).unwrap();
        assert_eq!(plan, vec![0, 2, 4]);
        // First socket owns logical ids 0..8 under interleaved numbering.
        assert!(plan.iter().all(|&id| id < topo.cores_per_socket * 2));
    }

    #[test]
    fn balanced_plan_spans_sockets_without_duplicates() {
        let topo = two_socket_ht();
        let plan = socket_aware_plan(6, &topo, BindingPolicy::Balanced).unwrap();
        assert_eq!(plan.len(), 6);
        assert_eq!(plan, vec![0, 2, 4, 6, 8, 10]);
        let unique: BTreeSet<usize> = plan.iter().copied().collect();
        assert_eq!(unique.len(), plan.len());
    }

    #[test]
    fn compact_plan_appends_siblings() {
        let topo = two_socket_ht();
        let plan = socket_aware_plan(2, &topo, BindingPolicy::Compact).unwrap();
        assert_eq!(plan, vec![0, 2, 1, 3]);
    }

    #[test]
    fn balanced_plan_spills_into_sibling_ids() {
        let topo = two_socket_ht();
        // 8 physical cores; cores 9 and 10 land on siblings 1 and 3.
        let plan = socket_aware_plan(10, &topo, BindingPolicy::Balanced).unwrap();
        assert_eq!(plan, vec![0, 2, 4, 6, 8, 10, 12, 14, 1, 3]);
    }

    #[test]
    fn balanced_plan_reaches_every_logical_processor() {
        let topo = two_socket_ht();
        let plan = socket_aware_plan(16, &topo, BindingPolicy::Balanced).unwrap();
        assert_eq!(plan.len(), topo.total_logical());
        let unique: BTreeSet<usize> = plan.iter().copied().collect();
        assert_eq!(unique.len(), plan.len());
        assert!(plan.iter().all(|&id| id < topo.total_logical()));
    }

    #[test]
    fn oversized_request_is_a_configuration_error() {
        let topo = two_socket_ht();
        assert!(socket_aware_plan(17, &topo, BindingPolicy::Balanced).is_err());
        assert!(socket_aware_plan(9, &topo, BindingPolicy::Compact).is_err());
        assert!(socket_aware_plan(0, &topo, BindingPolicy::Balanced).is_err());
    }

    #[test]
    fn detect_always_returns_a_usable_shape() {
        let topo = Topology::detect();
        assert!(topo.sockets >= 1);
        assert!(topo.cores_per_socket >= 1);
        assert!(topo.threads_per_core >= 1);
        assert!(topo.total_logical() >= 1);
    }

    #[test]
    fn binding_policy_from_count() {
        assert_eq!(
            BindingPolicy::from_threads_per_core(1).unwrap(),
            BindingPolicy::Balanced
        );
        assert_eq!(
            BindingPolicy::from_threads_per_core(2).unwrap(),
            BindingPolicy::Compact
        );
        assert!(BindingPolicy::from_threads_per_core(3).is_err());
    }
}
