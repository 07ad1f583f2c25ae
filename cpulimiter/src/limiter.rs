//! The duty-cycle controller: the piece that actually limits CPU usage.
//!
//! Single-threaded and cooperative with the kernel, per `spec.md` §5 —
//! there is one call to `limit_group` per invocation, and it runs to
//! completion (or to the quit latch) on the calling thread. This
//! replaces the teacher crate's background-thread-plus-channel design:
//! `spec.md` explicitly calls for no internal thread pool, so the
//! `Command`/`mpsc`/`parking_lot::RwLock` plumbing it used to hand the
//! limit to a worker thread has no role here.

use std::time::Duration;

use crate::clock;
use crate::error::Result;
use crate::pid::{self, Pid, Signal};
use crate::process_group::{ChildrenMode, ProcessGroup};
use crate::quit;
use crate::sysinfo;

/// The baseline time-slot length; slots never shrink below this.
const BASE_SLOT: Duration = Duration::from_millis(100);
/// Slots never grow past `5 * BASE_SLOT`.
const MAX_SLOT_FACTOR: u32 = 5;
/// Slots are reassessed at most this often.
const SLOT_REASSESS_INTERVAL_MS: u64 = 1000;
/// Guards the working-rate update against division by (near) zero.
const EPSILON: f64 = 1e-12;
/// The load average, in units of `N_CPU`, that the dynamic slot targets.
const LOAD_TARGET_FACTOR: f64 = 0.3;
/// Low-pass weight applied to the previous slot length at reassessment.
const SLOT_LOWPASS: f64 = 0.6;

/// A snapshot of the controller's state, handed to the optional
/// per-cycle callback (`--verbose`'s statistics line, in the `cpulimit`
/// binary).
#[derive(Copy, Clone, Debug)]
pub struct Stats {
    pub elapsed: Duration,
    pub working_rate: f64,
    /// Aggregate measured CPU usage, in cores; `-1.0` if still unknown.
    pub cpu_usage: f64,
    pub limit_cores: f64,
    pub live_count: usize,
}

/// Owns the `ProcessGroup` for the lifetime of one `limit_group` call and
/// guarantees the cleanup invariant from `spec.md` §4.F: whatever the
/// exit path, every live PID is sent `SIGCONT` before this value is
/// dropped. Absorbing this in a `Drop` impl, rather than duplicating a
/// cleanup call at every `return`/`?`/`break`, is what makes the
/// invariant hold even on the error path (`update()?` returning early).
struct ResumeGuard {
    group: ProcessGroup,
}

impl Drop for ResumeGuard {
    fn drop(&mut self) {
        broadcast(&mut self.group, Signal::SIGCONT);
    }
}

/// Sends `signal` to every PID in `group`'s live set.
///
/// A PID that can no longer be signalled (vanished, or permission lost
/// mid-run) is dropped from both `live` and `history` and the broadcast
/// continues with the rest — `spec.md` §4.F's "signal send semantics".
fn broadcast(group: &mut ProcessGroup, signal: Signal) {
    let targets: Vec<Pid> = group.live().to_vec();
    for target in targets {
        if let Err(e) = pid::kill(target, signal) {
            if matches!(e.raw_os_error(), Some(libc::ESRCH) | Some(libc::EPERM)) {
                group.forget(target);
            }
        }
    }
}

/// Best-effort priority boost so slot-boundary latency is not itself a
/// source of bias. Failure (e.g. not privileged enough) is silently
/// ignored, as specified.
fn raise_priority() {
    // SAFETY: `setpriority(PRIO_PROCESS, 0, _)` targets the calling
    // process; a refused priority change has no side effect beyond its
    // (ignored) return value.
    unsafe {
        libc::setpriority(libc::PRIO_PROCESS, 0, -20);
    }
}

/// Recomputes the time-slot length from the 1-minute load average.
///
/// Returns `current` unchanged if the load average cannot be read right
/// now (treated as "no information to act on" rather than an error).
fn next_time_slot(current: Duration, n_cpu: f64) -> Duration {
    let Some(load) = sysinfo::load_average_1m() else {
        return current;
    };
    let target = (n_cpu * LOAD_TARGET_FACTOR).max(EPSILON);
    let factor = load / target;
    let candidate = current
        .mul_f64(factor)
        .clamp(BASE_SLOT, BASE_SLOT * MAX_SLOT_FACTOR);
    let blended = current.mul_f64(SLOT_LOWPASS) + candidate.mul_f64(1.0 - SLOT_LOWPASS);
    blended.clamp(BASE_SLOT, BASE_SLOT * MAX_SLOT_FACTOR)
}

/// Runs the control loop until the tracked group becomes empty or the
/// quit latch is set.
///
/// `limit_cores` is the user-specified fraction of total CPU capacity,
/// in units of cores, in `(0, N_CPU]`. `on_cycle`, when present, is
/// invoked once per cycle with the current `Stats` — this is the seam
/// `--verbose` statistics printing hangs off of; the controller itself
/// has no notion of "verbose".
pub fn limit_group(
    target: Pid,
    limit_cores: f64,
    children_mode: ChildrenMode,
    mut on_cycle: Option<&mut dyn FnMut(&Stats)>,
) -> Result<()> {
    raise_priority();

    let n_cpu = sysinfo::cpu_count();
    let group = ProcessGroup::new(target, children_mode)?;
    let mut guard = ResumeGuard { group };

    let start = clock::now();
    let mut slot = BASE_SLOT;
    let mut last_slot_reassess = clock::now();
    let mut working_rate = (limit_cores / n_cpu).clamp(EPSILON, 1.0 - EPSILON);
    let mut suspended = false;

    loop {
        if quit::requested() {
            break;
        }

        guard.group.update()?;
        if guard.group.is_empty() {
            break;
        }

        let usage = guard.group.aggregate_cpu_usage();
        working_rate = if usage < 0.0 {
            limit_cores / n_cpu
        } else {
            working_rate * limit_cores / usage.max(EPSILON)
        };
        working_rate = working_rate.clamp(EPSILON, 1.0 - EPSILON);

        if clock::elapsed_ms(clock::now(), last_slot_reassess) >= SLOT_REASSESS_INTERVAL_MS {
            slot = next_time_slot(slot, n_cpu);
            last_slot_reassess = clock::now();
        }

        let work_dur = slot.mul_f64(working_rate);
        let sleep_dur = slot.saturating_sub(work_dur);

        if let Some(hook) = on_cycle.as_deref_mut() {
            hook(&Stats {
                elapsed: Duration::from_millis(clock::elapsed_ms(clock::now(), start)),
                working_rate,
                cpu_usage: usage,
                limit_cores,
                live_count: guard.group.live().len(),
            });
        }

        if quit::requested() {
            break;
        }
        if !work_dur.is_zero() {
            if suspended {
                broadcast(&mut guard.group, Signal::SIGCONT);
                suspended = false;
            }
            clock::sleep(work_dur);
        }

        if quit::requested() {
            break;
        }
        if !sleep_dur.is_zero() {
            if !suspended {
                broadcast(&mut guard.group, Signal::SIGSTOP);
                suspended = true;
            }
            clock::sleep(sleep_dur);
        }
    }

    // `guard` drops here: every live PID is resumed unconditionally,
    // whichever of the three `break`s above (or the `?` above them) got
    // us here.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_slot_stays_within_bounds_for_extreme_load() {
        let huge_load_slot = next_time_slot(BASE_SLOT, 1.0);
        assert!(huge_load_slot >= BASE_SLOT);
        assert!(huge_load_slot <= BASE_SLOT * MAX_SLOT_FACTOR);
    }

    #[test]
    fn limiting_a_dead_pid_returns_immediately() {
        let bogus = Pid::from(u32::MAX - 3);
        let result = limit_group(bogus, 1.0, ChildrenMode::Exclude, None);
        assert!(result.is_ok());
    }
}
