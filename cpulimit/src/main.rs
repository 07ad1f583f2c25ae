//! Limit the CPU usage of a process.
//!
//! # Usage
//!
//! Limit process `4562` to 10% of one core:
//!
//! ```console
//! cpulimit --pid 4562 --limit 10
//! ```
//!
//! Locate a running process by executable name instead, and also limit
//! its children:
//!
//! ```console
//! cpulimit --exe firefox --limit 50 --include-children
//! ```
//!
//! Or spawn and limit a fresh command:
//!
//! ```console
//! cpulimit --limit 25 -- make -j8
//! ```
//!
//! Run `cpulimit --help` to list all the available options.

mod harness;
mod stats;

use std::process::ExitCode;

use clap::Parser;

use cpulimiter::pid::Pid;
use cpulimiter::process_group::ChildrenMode;

#[derive(Parser, Debug)]
#[clap(version, about, trailing_var_arg = true)]
struct Args {
    #[clap(
        short,
        long,
        parse(try_from_str),
        conflicts_with_all = &["exe", "command"],
        help = "Attach to an existing process by PID (implies --lazy)"
    )]
    pid: Option<Pid>,

    #[clap(
        short,
        long,
        conflicts_with_all = &["pid", "command"],
        help = "Locate a running process by executable name or absolute path"
    )]
    exe: Option<String>,

    #[clap(
        short,
        long,
        help = "Percent of total CPU capacity to allow, in (0, 100*N_CPU]"
    )]
    limit: f64,

    #[clap(short, long, help = "Print periodic control statistics")]
    verbose: bool,

    #[clap(
        short = 'z',
        long,
        help = "Exit once the target is gone or cannot be found"
    )]
    lazy: bool,

    #[clap(
        short = 'i',
        long = "include-children",
        help = "Also limit the CPU usage of descendant processes"
    )]
    include_children: bool,

    #[clap(help = "Command to spawn and limit (implies --lazy)")]
    command: Vec<String>,
}

/// What this invocation was asked to act on, resolved from exactly one
/// of the three mutually-exclusive CLI forms.
enum Target {
    Pid(Pid),
    Name(String),
    Spawn(Vec<String>),
}

fn resolve_target(args: &Args) -> Result<Target, String> {
    match (&args.pid, &args.exe, args.command.is_empty()) {
        (Some(pid), None, true) => Ok(Target::Pid(*pid)),
        (None, Some(name), true) => Ok(Target::Name(name.clone())),
        (None, None, false) => Ok(Target::Spawn(args.command.clone())),
        (None, None, true) => Err("exactly one of --pid, --exe, or a command must be given".into()),
        _ => Err("--pid, --exe, and a spawned command are mutually exclusive".into()),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let target = match resolve_target(&args) {
        Ok(t) => t,
        Err(message) => {
            eprintln!("cpulimit: {message}");
            return ExitCode::FAILURE;
        }
    };

    if let Target::Pid(pid) = &target {
        if let Some(max) = cpulimiter::pid::max_pid() {
            if pid.get() > max {
                eprintln!("cpulimit: pid {pid} exceeds the kernel's maximum PID ({max})");
                return ExitCode::FAILURE;
            }
        }
    }

    let n_cpu = cpulimiter::sysinfo::cpu_count();
    if !(args.limit > 0.0 && args.limit <= 100.0 * n_cpu) {
        eprintln!(
            "cpulimit: --limit must be in (0, {}], got {}",
            100.0 * n_cpu,
            args.limit
        );
        return ExitCode::FAILURE;
    }
    let limit_cores = args.limit / 100.0;

    if let Err(e) = cpulimiter::quit::install() {
        return report_error(cpulimiter::Error::System(e));
    }

    let children_mode = if args.include_children {
        ChildrenMode::Include
    } else {
        ChildrenMode::Exclude
    };

    let result = match target {
        Target::Spawn(command) => {
            harness::spawn_then_limit(&command, limit_cores, children_mode, args.verbose)
        }
        // PID targets always run lazily: there is nothing to retry
        // once a fixed PID is gone.
        Target::Pid(pid) => harness::locate_then_limit(
            harness::Locator::Pid(pid),
            limit_cores,
            children_mode,
            true,
            args.verbose,
        ),
        // Name-based search retries every 2s by default; `--lazy`
        // overrides that to a single attempt.
        Target::Name(name) => harness::locate_then_limit(
            harness::Locator::Name(name),
            limit_cores,
            children_mode,
            args.lazy,
            args.verbose,
        ),
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => report_error(e),
    }
}

/// The single boundary that maps a fatal `cpulimiter::Error` to this
/// process's exit code, per `spec.md` §7 and `SPEC_FULL.md` §7.
fn report_error(err: cpulimiter::Error) -> ExitCode {
    eprintln!("cpulimit: {err}");
    ExitCode::FAILURE
}
