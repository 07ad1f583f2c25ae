use thiserror::Error;

use crate::pid::Pid;

/// Errors surfaced by the library's public entry points.
///
/// Per-process transient failures (a vanished PID, a lost permission mid
/// loop) are not represented here: they are absorbed locally as the
/// specification requires (the record is simply dropped from the live
/// set). Only failures that abort a whole operation reach this type.
#[derive(Error, Debug)]
pub enum Error {
    /// The target exists but this process lacks permission to signal or
    /// inspect it.
    #[error("permission denied for process {0}")]
    PermissionDenied(Pid),

    /// The enumerator could not be opened at all (e.g. `/proc` is not
    /// mounted, or the OS refused to hand back a process list).
    #[error("could not enumerate processes: {0}")]
    Enumerate(#[source] std::io::Error),

    /// The resolved target PID is this controller's own PID.
    #[error("refusing to limit this process's own PID ({0})")]
    TargetIsSelf(Pid),

    /// A required OS facility (clock, signal installation, fork/exec)
    /// failed.
    #[error("system call failed: {0}")]
    System(#[source] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
