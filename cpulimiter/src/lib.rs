//! A library for limiting a process's (and optionally its descendants')
//! CPU usage to a configured share of total capacity, by alternating
//! `SIGSTOP`/`SIGCONT` in measured duty cycles.
//!
//! This is a from-scratch rework of the original
//! [`cpulimit`](https://github.com/opsengine/cpulimit) model: process
//! discovery is abstracted over Linux, FreeBSD, and macOS behind
//! [`process`], the tracked set persists across cycles in
//! [`history`]/[`process_group`], and the control loop itself
//! ([`limiter::limit_group`]) runs single-threaded on the caller's
//! thread rather than handing the limit to a background worker.
//!
//! # Example
//!
//! ```no_run
//! use cpulimiter::{ChildrenMode, Pid};
//!
//! cpulimiter::quit::install().expect("install signal handler");
//! cpulimiter::limiter::limit_group(Pid::from(1048), 0.5, ChildrenMode::Exclude, None)
//!     .expect("limit process");
//! ```

pub mod clock;
pub mod error;
pub mod finder;
pub mod history;
pub mod limiter;
pub mod pid;
pub mod process;
pub mod process_group;
pub mod quit;
pub mod sysinfo;

pub use error::{Error, Result};
pub use pid::Pid;
pub use process_group::{ChildrenMode, ProcessGroup};
