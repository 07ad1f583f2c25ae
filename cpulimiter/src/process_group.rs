//! Track the CPU usage of a process (and, optionally, its descendants)
//! across cycles.

use crate::clock;
use crate::error::{Error, Result};
use crate::history::{History, TrackedProcess};
use crate::pid::Pid;
use crate::process::{self, Filter};
use crate::sysinfo;

/// Indicates whether descendant processes should be tracked alongside
/// the target.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChildrenMode {
    Include,
    Exclude,
}

impl Default for ChildrenMode {
    fn default() -> Self {
        ChildrenMode::Exclude
    }
}

impl ChildrenMode {
    fn includes_descendants(self) -> bool {
        matches!(self, ChildrenMode::Include)
    }
}

/// The accuracy floor: a cycle shorter than this never advances smoothed
/// usage, since the sample would be dominated by measurement noise.
pub const MIN_DT_MS: u64 = 20;
/// The exponential-moving-average smoothing factor.
pub const ALPHA: f64 = 0.08;

/// The controller's view of the tracked set: the live snapshot from the
/// most recent cycle, plus the cross-cycle history that backs it.
pub struct ProcessGroup {
    target: Pid,
    children_mode: ChildrenMode,
    n_cpu: f64,
    history: History,
    live: Vec<Pid>,
    last_update_ts: clock::Instant,
}

impl ProcessGroup {
    /// Initializes the group and performs one `update` to populate
    /// initial state, per `spec.md` §4.D.
    pub fn new(target: Pid, children_mode: ChildrenMode) -> Result<Self> {
        let mut group = Self {
            target,
            children_mode,
            n_cpu: sysinfo::cpu_count(),
            history: History::new(),
            live: Vec::new(),
            last_update_ts: clock::now(),
        };
        group.update()?;
        Ok(group)
    }

    /// Refreshes `live` against the current process table and advances
    /// every tracked record's smoothed CPU usage.
    ///
    /// See `spec.md` §4.D for the exact per-field semantics; this is a
    /// direct transcription of that algorithm.
    pub fn update(&mut self) -> Result<()> {
        let t_now = clock::now();
        let dt_ms = clock::elapsed_ms(t_now, self.last_update_ts);

        self.live.clear();

        let filter = Filter {
            pid: self.target.get(),
            include_descendants: self.children_mode.includes_descendants(),
            want_command: false,
        };
        let iter = process::open_iterator(filter).map_err(Error::Enumerate)?;

        for snapshot in iter {
            self.live.push(snapshot.pid);

            match self.history.find_mut(snapshot.pid) {
                None => {
                    self.history.insert(TrackedProcess::new(
                        snapshot.pid,
                        snapshot.ppid,
                        snapshot.cumulative_cpu_time_ms,
                    ));
                }
                Some(record) => {
                    record.ppid = snapshot.ppid;

                    if dt_ms < MIN_DT_MS {
                        continue;
                    }

                    let delta_cpu_ms = snapshot.cumulative_cpu_time_ms as i128
                        - record.cumulative_cpu_time_ms as i128;
                    let sample = delta_cpu_ms as f64 / dt_ms as f64;

                    if sample < 0.0 {
                        // The cumulative counter went backward: the PID
                        // was reused by a new process instance.
                        record.cpu_usage = None;
                        record.cumulative_cpu_time_ms = snapshot.cumulative_cpu_time_ms;
                        continue;
                    }

                    let clamped = sample.clamp(0.0, self.n_cpu);
                    record.cpu_usage = Some(match record.cpu_usage {
                        None => clamped,
                        Some(prev) => (1.0 - ALPHA) * prev + ALPHA * clamped,
                    });
                    record.cumulative_cpu_time_ms = snapshot.cumulative_cpu_time_ms;
                }
            }
        }

        self.history.retain_only(&self.live);

        if dt_ms >= MIN_DT_MS || t_now < self.last_update_ts {
            self.last_update_ts = t_now;
        }

        Ok(())
    }

    /// The PIDs observed in the most recent successful `update`.
    pub fn live(&self) -> &[Pid] {
        &self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Sum of measured records' `cpu_usage`, or `-1` if every tracked
    /// record is still unmeasured.
    #[must_use]
    pub fn aggregate_cpu_usage(&self) -> f64 {
        let mut total = 0.0;
        let mut any_measured = false;
        for pid in &self.live {
            if let Some(usage) = self.history.find(*pid).and_then(|r| r.cpu_usage) {
                total += usage;
                any_measured = true;
            }
        }
        if any_measured {
            total
        } else {
            -1.0
        }
    }

    /// Drops a PID from both `live` and `history`, e.g. after a signal
    /// send fails because the process vanished mid-cycle.
    pub(crate) fn forget(&mut self, pid: Pid) {
        self.live.retain(|p| *p != pid);
        self.history.delete(pid);
    }
}

// `close(group)` from `spec.md` has no explicit method: dropping a
// `ProcessGroup` drops its `History` (freeing every tracked record) and
// its `live` vector, which is the whole of its owned state.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_for_nonexistent_pid_is_immediately_empty() {
        let bogus = Pid::from(u32::MAX - 2);
        let group = ProcessGroup::new(bogus, ChildrenMode::Exclude).unwrap();
        assert!(group.is_empty());
        assert_eq!(group.aggregate_cpu_usage(), -1.0);
    }

    #[test]
    fn group_for_self_tracks_at_least_one_process() {
        let me = Pid::from(std::process::id());
        let group = ProcessGroup::new(me, ChildrenMode::Exclude).unwrap();
        assert!(!group.is_empty());
        assert_eq!(group.live(), &[me]);
    }

    #[test]
    fn first_cycle_never_reports_measured_usage() {
        let me = Pid::from(std::process::id());
        let group = ProcessGroup::new(me, ChildrenMode::Exclude).unwrap();
        // The very first update has no prior sample to diff against, so
        // every record is still unmeasured.
        assert_eq!(group.aggregate_cpu_usage(), -1.0);
    }
}
