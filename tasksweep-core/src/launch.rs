//! Platform-abstracted workload process launch.
//!
//! One structured descriptor (argument vector, environment map, affinity
//! list, wall-clock budget) goes in; one classified outcome comes out.
//! Pinning uses `taskset -c` on POSIX hosts and an affinity bitmask via
//! `cmd /C start` on Windows. The budget is enforced here by polling the
//! child, so a stuck workload cannot stall the sweep, and the child is
//! killed and reaped before the next cell starts.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Everything needed to launch one workload run.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Logical processor ids the run is pinned to; empty = unpinned.
    pub cpus: Vec<usize>,
    /// Wall-clock execution budget.
    pub budget: Duration,
}

/// What the launch layer observed, before output parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchOutcome {
    /// The process exited within budget; stdout is captured verbatim.
    Exited { status_ok: bool, stdout: String },
    /// The budget ran out; the process was killed and reaped.
    TimedOut,
}

/// Run a workload synchronously under the descriptor's budget.
pub fn run(spec: &LaunchSpec) -> io::Result<LaunchOutcome> {
    let mut cmd = platform_command(spec);
    cmd.envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn()?;

    // Drain stdout on a separate thread; waiting first and reading after
    // would deadlock once the pipe buffer fills.
    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout not captured"))?;
    let reader = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout_pipe.read_to_string(&mut buf);
        buf
    });

    match wait_with_timeout(&mut child, spec.budget)? {
        Some(status) => Ok(LaunchOutcome::Exited {
            status_ok: status.success(),
            stdout: reader.join().unwrap_or_default(),
        }),
        None => {
            let _ = child.kill();
            child.wait()?;
            // Not joining the reader: a surviving grandchild could hold the
            // pipe open past the budget, and timeout output is discarded
            // anyway. The thread exits once the last writer is gone.
            drop(reader);
            Ok(LaunchOutcome::TimedOut)
        }
    }
}

/// Scan output for the first `<number>,<number>` substring.
///
/// This is the whole output contract: workloads print an aggregated
/// (time, stddev) pair; anything else means the run did not finish.
pub fn parse_sample(output: &str) -> Option<(f64, f64)> {
    let bytes = output.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let rest = &output[i..];
        let first_len = scan_number(rest)?;
        if let Some(pair) = match_pair(rest, first_len) {
            return Some(pair);
        }
        // Advance one character, not the whole token: a pair may start
        // inside a rejected candidate ("1.2.3,4" holds "2.3,4").
        i += 1;
    }
    None
}

/// Length of a leading `digits[.digits]` token, if any.
fn scan_number(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    let mut i = 0;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    if i == 0 {
        return None;
    }
    if i < b.len() && b[i] == b'.' {
        let mut j = i + 1;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if j > i + 1 {
            i = j;
        }
    }
    Some(i)
}

fn match_pair(s: &str, first_len: usize) -> Option<(f64, f64)> {
    if s.as_bytes().get(first_len) != Some(&b',') {
        return None;
    }
    let rest = &s[first_len + 1..];
    let second_len = scan_number(rest)?;

    let time: f64 = s[..first_len].parse().ok()?;
    let stddev: f64 = rest[..second_len].parse().ok()?;
    Some((time, stddev))
}

/// Render a cpu id list for `taskset -c`.
pub fn cpu_list(cpus: &[usize]) -> String {
    cpus.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a cpu id set as the bitmask Windows `start /AFFINITY` expects.
pub fn affinity_mask(cpus: &[usize]) -> u64 {
    cpus.iter().fold(0u64, |mask, &id| mask | (1u64 << id))
}

#[cfg(unix)]
fn platform_command(spec: &LaunchSpec) -> Command {
    if spec.cpus.is_empty() {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        return cmd;
    }
    let mut cmd = Command::new("taskset");
    cmd.arg("-c")
        .arg(cpu_list(&spec.cpus))
        .arg(&spec.program)
        .args(&spec.args);
    cmd
}

#[cfg(windows)]
fn platform_command(spec: &LaunchSpec) -> Command {
    let mut line = String::from("start /B /WAIT ");
    if !spec.cpus.is_empty() {
        line.push_str(&format!("/AFFINITY 0x{:x} ", affinity_mask(&spec.cpus)));
    }
    line.push_str(&format!("\"{}\"", spec.program.display()));
    for arg in &spec.args {
        line.push(' ');
        line.push_str(arg);
    }

    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

fn wait_with_timeout(child: &mut Child, budget: Duration) -> io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= budget {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sample_finds_the_first_pair() {
        assert_eq!(parse_sample("123.45,6.78"), Some((123.45, 6.78)));
        assert_eq!(parse_sample("time: 250,3 done"), Some((250.0, 3.0)));
        assert_eq!(
            parse_sample("warmup\n1410.2,88.125\ntrailing 5,5"),
            Some((1410.2, 88.125))
        );
    }

    #[test]
    fn parse_sample_skips_non_pairs() {
        // A lone number followed by text is not a pair; the scan continues.
        assert_eq!(parse_sample("12,ab then 3.5,0.25"), Some((3.5, 0.25)));
    }

    #[test]
    fn parse_sample_finds_a_pair_inside_a_rejected_candidate() {
        // "1.2.3,4": the leading "1.2" is no pair, but "2.3,4" is.
        assert_eq!(parse_sample("1.2.3,4"), Some((2.3, 4.0)));
        assert_eq!(parse_sample("v1.5 run 250,3"), Some((250.0, 3.0)));
    }

    #[test]
    fn parse_sample_rejects_output_without_a_pair() {
        assert_eq!(parse_sample(""), None);
        assert_eq!(parse_sample("no numbers here"), None);
        assert_eq!(parse_sample("lonely 42"), None);
        assert_eq!(parse_sample("trailing comma 42,"), None);
    }

    #[test]
    fn cpu_list_renders_comma_separated_ids() {
        assert_eq!(cpu_list(&[0, 2, 4, 6]), "0,2,4,6");
        assert_eq!(cpu_list(&[3]), "3");
    }

    #[test]
    fn affinity_mask_sets_one_bit_per_cpu() {
        assert_eq!(affinity_mask(&[0]), 0x1);
        assert_eq!(affinity_mask(&[0, 2]), 0x5);
        assert_eq!(affinity_mask(&[0, 2, 4, 6]), 0x55);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn spec(program: &str, args: &[&str], budget_ms: u64) -> LaunchSpec {
            LaunchSpec {
                program: PathBuf::from(program),
                args: args.iter().map(|s| s.to_string()).collect(),
                env: BTreeMap::new(),
                cpus: Vec::new(),
                budget: Duration::from_millis(budget_ms),
            }
        }

        #[test]
        fn captures_stdout_of_a_fast_process() {
            let outcome = run(&spec("/bin/echo", &["12.5,0.25"], 5_000)).unwrap();
            match outcome {
                LaunchOutcome::Exited { status_ok, stdout } => {
                    assert!(status_ok);
                    assert_eq!(parse_sample(&stdout), Some((12.5, 0.25)));
                }
                LaunchOutcome::TimedOut => panic!("echo should not time out"),
            }
        }

        #[test]
        fn kills_a_process_that_exceeds_its_budget() {
            let started = Instant::now();
            let outcome = run(&spec("/bin/sleep", &["30"], 200)).unwrap();
            assert_eq!(outcome, LaunchOutcome::TimedOut);
            // Bounded delay: budget plus cleanup, nowhere near the sleep.
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn environment_reaches_the_child() {
            let mut env = BTreeMap::new();
            env.insert("TASKSWEEP_MARKER".to_string(), "7,7".to_string());
            let outcome = run(&LaunchSpec {
                program: PathBuf::from("/bin/sh"),
                args: vec!["-c".to_string(), "echo $TASKSWEEP_MARKER".to_string()],
                env,
                cpus: Vec::new(),
                budget: Duration::from_secs(5),
            })
            .unwrap();
            match outcome {
                LaunchOutcome::Exited { stdout, .. } => {
                    assert_eq!(parse_sample(&stdout), Some((7.0, 7.0)));
                }
                LaunchOutcome::TimedOut => panic!("sh should not time out"),
            }
        }
    }
}
