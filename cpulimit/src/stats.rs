//! Plain-text statistics printing for `--verbose`.
//!
//! This is user-facing output on standard output, not diagnostics (those
//! go to standard error via plain `eprintln!` in `main`/`harness`), per
//! `spec.md` §6's stdout/stderr split — there is no logging crate in the
//! binary, only this one small formatter.

use cpulimiter::limiter::Stats;

pub struct Printer {
    cycles: u64,
}

impl Printer {
    pub fn new() -> Self {
        Self { cycles: 0 }
    }

    pub fn print(&mut self, stats: &Stats) {
        self.cycles += 1;
        let cpu = if stats.cpu_usage < 0.0 {
            "?".to_string()
        } else {
            format!("{:.2}", stats.cpu_usage)
        };
        println!(
            "[{:>6}] elapsed={:>7.1}s  cpu={:>5}  limit={:.2}  rate={:>5.1}%  live={}",
            self.cycles,
            stats.elapsed.as_secs_f64(),
            cpu,
            stats.limit_cores,
            stats.working_rate * 100.0,
            stats.live_count,
        );
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}
