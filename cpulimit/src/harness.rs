//! Thin glue between the parsed CLI and the controller, per
//! `spec.md` §4.H: given a fully validated configuration, dispatch to
//! either spawn-then-limit or locate-then-limit.

use std::ffi::CString;
use std::time::Duration;

use cpulimiter::limiter::{self, Stats};
use cpulimiter::pid::Pid;
use cpulimiter::process_group::ChildrenMode;
use cpulimiter::{Error, Result};

use crate::stats::Printer;

/// How `locate_then_limit` should keep searching for its target.
pub enum Locator {
    Pid(Pid),
    Name(String),
}

/// Runs `limiter::limit_group` against `target`, wiring the `--verbose`
/// statistics printer in only when `verbose` is set.
///
/// The `Result` is propagated rather than reported here: `main` is the
/// single boundary that maps a fatal `Error` to an exit code, per
/// `spec.md` §7.
fn run_controller(
    target: Pid,
    limit_cores: f64,
    children_mode: ChildrenMode,
    verbose: bool,
) -> Result<()> {
    let mut printer = Printer::new();
    let mut cycle = |s: &Stats| printer.print(s);
    let hook: Option<&mut dyn FnMut(&Stats)> = if verbose { Some(&mut cycle) } else { None };
    limiter::limit_group(target, limit_cores, children_mode, hook)
}

/// Forks, execs `command` in a fresh process group, and limits the
/// resulting child until it exits or the quit latch is set.
///
/// Returns the exit code `main` should propagate on success: the
/// child's own exit status, `128 + N` if it died by signal `N`, or a
/// generic failure code if it could never be reaped. A fatal controller
/// error (enumerator open failure, clock/signal facility failure) is
/// returned as `Err` instead, so `main`'s single boundary can map it to
/// exit code 1 even though the child itself may have exited cleanly.
pub fn spawn_then_limit(
    command: &[String],
    limit_cores: f64,
    children_mode: ChildrenMode,
    verbose: bool,
) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        eprintln!("cpulimit: no command given to spawn");
        return Ok(1);
    };

    let mut fds = [0i32; 2];
    // SAFETY: `fds` has room for the two descriptors `pipe` writes back.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(Error::System(std::io::Error::last_os_error()));
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    // SAFETY: a bare `fork()` with no shared mutable state touched
    // between the call and the child's `exec`/`exit` is sound; both
    // branches close the pipe end they do not own before proceeding.
    let child_pid = unsafe { libc::fork() };
    if child_pid < 0 {
        return Err(Error::System(std::io::Error::last_os_error()));
    }

    if child_pid == 0 {
        // SAFETY: child branch — only async-signal-safe libc calls
        // before `execvp`, which either replaces this image or never
        // returns control past the diagnostic `exit`.
        unsafe {
            libc::close(read_fd);
            // New process group, so the whole tree can be signalled as
            // a unit during shutdown.
            libc::setpgid(0, 0);
            let ready = [0u8; 1];
            libc::write(write_fd, ready.as_ptr().cast(), 1);
            libc::close(write_fd);
        }
        exec_command(program, args);
    }

    // Parent.
    // SAFETY: plain fd bookkeeping on descriptors this process owns.
    unsafe { libc::close(write_fd) };
    let mut ready = [0u8; 1];
    // SAFETY: `ready` has room for the one byte `read` can return.
    unsafe { libc::read(read_fd, ready.as_mut_ptr().cast(), 1) };
    unsafe { libc::close(read_fd) };

    let child = Pid::from(child_pid as u32);
    let result = run_controller(child, limit_cores, children_mode, verbose);

    if cpulimiter::quit::requested() {
        // SAFETY: signalling the negated PID targets the whole process
        // group `setpgid` established above.
        unsafe {
            libc::kill(-child_pid, libc::SIGTERM);
        }
    }

    // Reap unconditionally, whether or not the controller errored, so
    // the child is never left a zombie; a fatal controller error still
    // overrides whatever status the child exited with, per `spec.md`
    // §7's "transient OS errors ... treated as fatal".
    let exit_status = reap(child_pid);
    result?;
    Ok(exit_status)
}

/// Waits for `pid` to exit and translates its status into this
/// process's exit code.
fn reap(pid: libc::pid_t) -> i32 {
    let mut status: libc::c_int = 0;
    // SAFETY: `status` is a valid out-parameter for `waitpid`.
    let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
    if rc < 0 {
        return 1;
    }
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        1
    }
}

/// Replaces the current (child) process image with `program`, or exits
/// `127` on failure, matching the conventional shell "command not
/// found / not executable" code.
fn exec_command(program: &str, args: &[String]) -> ! {
    let argv0 = CString::new(program).unwrap_or_default();
    let cargs: Vec<CString> = args
        .iter()
        .map(|a| CString::new(a.as_str()).unwrap_or_default())
        .collect();
    let mut argv: Vec<*const libc::c_char> = std::iter::once(argv0.as_ptr())
        .chain(cargs.iter().map(|a| a.as_ptr()))
        .collect();
    argv.push(std::ptr::null());

    // SAFETY: `argv` is NUL-terminated and every pointer stays valid for
    // the duration of this call, which either never returns or replaces
    // this process image entirely.
    unsafe {
        libc::execvp(argv0.as_ptr(), argv.as_ptr());
    }
    eprintln!(
        "cpulimit: exec of {program:?} failed: {}",
        std::io::Error::last_os_error()
    );
    std::process::exit(127);
}

/// Repeatedly locates the target via `locator` and limits it once
/// found, per `spec.md` §4.H's locate-then-limit loop.
///
/// Returns the exit code `main` should propagate on success: `0` on a
/// clean exit (lazy mode, quit latch, or target never found). A fatal
/// validation failure (self-targeting, an initial permission denial) or
/// a fatal controller error is returned as `Err`, so `main`'s single
/// boundary can map it to exit code 1.
pub fn locate_then_limit(
    locator: Locator,
    limit_cores: f64,
    children_mode: ChildrenMode,
    lazy: bool,
    verbose: bool,
) -> Result<i32> {
    let me = Pid::from(std::process::id());
    let mut first_probe = true;

    loop {
        if cpulimiter::quit::requested() {
            return Ok(0);
        }

        let found = match &locator {
            Locator::Pid(pid) => cpulimiter::finder::find_by_pid(*pid),
            Locator::Name(name) => cpulimiter::finder::find_by_name(name),
        };

        if found == 0 {
            println!("cpulimit: target not found");
            if lazy {
                return Ok(0);
            }
            first_probe = false;
            std::thread::sleep(Duration::from_secs(2));
            continue;
        }

        if found < 0 {
            let unreachable = Pid::from(found.unsigned_abs() as u32);
            if first_probe {
                return Err(Error::PermissionDenied(unreachable));
            }
            std::thread::sleep(Duration::from_secs(2));
            continue;
        }

        first_probe = false;
        let target = Pid::from(found as u32);
        if target == me {
            return Err(Error::TargetIsSelf(me));
        }

        run_controller(target, limit_cores, children_mode, verbose)?;

        if lazy || cpulimiter::quit::requested() {
            return Ok(0);
        }
        std::thread::sleep(Duration::from_secs(2));
    }
}
