//! A PID-indexed table of tracked processes, persisted across cycles.

use std::collections::HashMap;

use crate::pid::Pid;

/// A process's record across the lifetime of one `ProcessGroup`.
///
/// `cpu_usage` is `None` on the cycle a PID first appears and until at
/// least `MIN_DT` has elapsed since the group's baseline timestamp — the
/// "unmeasured" sentinel from `spec.md` §3, expressed as `Option` rather
/// than a magic value.
#[derive(Clone, Debug)]
pub struct TrackedProcess {
    pub pid: Pid,
    pub ppid: Pid,
    pub cumulative_cpu_time_ms: u64,
    pub cpu_usage: Option<f64>,
}

impl TrackedProcess {
    pub(crate) fn new(pid: Pid, ppid: Pid, cumulative_cpu_time_ms: u64) -> Self {
        Self {
            pid,
            ppid,
            cumulative_cpu_time_ms,
            cpu_usage: None,
        }
    }
}

/// An associative store mapping `pid -> TrackedProcess`, surviving across
/// `ProcessGroup::update` cycles.
///
/// `std::collections::HashMap` already is an open-addressing table tuned
/// for exactly the churn-heavy, small-working-set profile `spec.md`
/// describes (see `DESIGN.md`), so this is a thin, purpose-named wrapper
/// rather than a hand-rolled hash table.
#[derive(Default)]
pub struct History {
    records: HashMap<u32, TrackedProcess>,
}

impl History {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    pub fn find(&self, pid: Pid) -> Option<&TrackedProcess> {
        self.records.get(&pid.get())
    }

    pub fn find_mut(&mut self, pid: Pid) -> Option<&mut TrackedProcess> {
        self.records.get_mut(&pid.get())
    }

    /// Inserts `record`; a no-op if the PID is already tracked.
    pub fn insert(&mut self, record: TrackedProcess) {
        self.records.entry(record.pid.get()).or_insert(record);
    }

    /// Removes and drops the record for `pid`, if any.
    pub fn delete(&mut self, pid: Pid) {
        self.records.remove(&pid.get());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes every record whose PID is not in `keep`.
    pub(crate) fn retain_only(&mut self, keep: &[Pid]) {
        self.records
            .retain(|pid, _| keep.iter().any(|k| k.get() == *pid));
    }
}

// `destroy()` from `spec.md` has no explicit counterpart here: dropping
// a `History` drops its `HashMap`, which drops every owned
// `TrackedProcess` — the same guarantee, expressed through ownership
// instead of a destructor call.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_a_no_op_on_duplicate_pid() {
        let mut history = History::new();
        let pid = Pid::from(42);
        history.insert(TrackedProcess::new(pid, Pid::from(1), 10));
        history.insert(TrackedProcess::new(pid, Pid::from(1), 999));
        assert_eq!(history.find(pid).unwrap().cumulative_cpu_time_ms, 10);
    }

    #[test]
    fn delete_removes_the_record() {
        let mut history = History::new();
        let pid = Pid::from(42);
        history.insert(TrackedProcess::new(pid, Pid::from(1), 10));
        history.delete(pid);
        assert!(history.find(pid).is_none());
    }

    #[test]
    fn retain_only_drops_everything_else() {
        let mut history = History::new();
        history.insert(TrackedProcess::new(Pid::from(1), Pid::from(0), 0));
        history.insert(TrackedProcess::new(Pid::from(2), Pid::from(1), 0));
        history.insert(TrackedProcess::new(Pid::from(3), Pid::from(1), 0));
        history.retain_only(&[Pid::from(1), Pid::from(3)]);
        assert!(history.find(Pid::from(2)).is_none());
        assert!(history.find(Pid::from(1)).is_some());
        assert!(history.find(Pid::from(3)).is_some());
    }
}
