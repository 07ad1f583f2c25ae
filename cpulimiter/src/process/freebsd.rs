//! FreeBSD backend: a `kinfo_proc` snapshot through the kernel's `sysctl`
//! virtual-memory interface (`CTL_KERN.KERN_PROC.KERN_PROC_ALL`).
//!
//! The `kinfo_proc` bindings below are partial: only the fields this
//! crate reads are named, the rest of the structure is opaque padding.
//! This follows the same "partial bindings, sized and ordered from the
//! kernel header" approach other process inspectors in this ecosystem
//! use for the BSD/Darwin `sysctl` process tables.

use std::io;
use std::mem;
use std::ptr;

use crate::pid::Pid;
use crate::process::Snapshot;

const CTL_KERN: libc::c_int = 1;
const KERN_PROC: libc::c_int = 14;
const KERN_PROC_ALL: libc::c_int = 0;
const KERN_PROC_PID: libc::c_int = 1;

/// `P_SYSTEM`: the process never has user context swapped, i.e. a
/// kernel thread.
const P_SYSTEM: i64 = 0x0000_0200;
/// `SZOMB` in `ki_stat`: a zombie awaiting reap.
const SZOMB: u8 = 5;

#[repr(C)]
struct TimeVal {
    tv_sec: i64,
    tv_usec: i64,
}

/// Partial view of FreeBSD's `struct kinfo_proc` (`sys/user.h`).
///
/// Fields preceding `ki_pid` are pointer/queue-head sized and carry no
/// information this crate needs; they are kept only to land subsequent
/// fields at (approximately) the right offsets.
#[repr(C)]
struct KinfoProc {
    ki_structsize: i32,
    ki_layout: i32,
    ki_args: u64,
    ki_paddr: u64,
    ki_addr: u64,
    ki_tracep: u64,
    ki_textvp: u64,
    ki_fd: u64,
    ki_vmspace: u64,
    ki_wchan: u64,
    ki_pid: i32,
    ki_ppid: i32,
    ki_pgid: i32,
    ki_tpgid: i32,
    ki_sid: i32,
    ki_tsid: i32,
    ki_jobc: i16,
    ki_spare_short1: i16,
    ki_tdev: u32,
    ki_siglist: [u32; 4],
    ki_sigmask: [u32; 4],
    ki_sigignore: [u32; 4],
    ki_sigcatch: [u32; 4],
    ki_uid: u32,
    ki_ruid: u32,
    ki_svuid: u32,
    ki_rgid: u32,
    ki_svgid: u32,
    ki_ngroups: i16,
    ki_spare_short2: i16,
    ki_groups: [u32; 16],
    ki_size: u64,
    ki_rssize: i64,
    ki_swrss: i64,
    ki_tsize: i64,
    ki_dsize: i64,
    ki_ssize: i64,
    ki_xstat: u16,
    ki_acflag: u16,
    ki_pctcpu: u32,
    ki_estcpu: u32,
    ki_slptime: u32,
    ki_swtime: u32,
    ki_cow: u32,
    /// Microseconds of CPU time consumed, user + system.
    ki_runtime: u64,
    ki_start: TimeVal,
    ki_childtime: TimeVal,
    ki_flag: i64,
    ki_kiflag: i64,
    ki_traceflag: i32,
    /// `SRUN`, `SSLEEP`, `SZOMB`, ... — see `sys/proc.h`.
    ki_stat: u8,
    ki_nice: i8,
    ki_lock: u8,
    ki_rqindex: u8,
    ki_oncpu: u8,
    ki_lastcpu: u8,
    ki_tdname: [u8; 17],
    ki_wmesg: [u8; 9],
    ki_login: [u8; 18],
    ki_lockname: [u8; 9],
    ki_comm: [u8; 20],
    // The real structure continues for a while past this point (jail
    // name, login class, paths, ...); none of it is read here.
    _tail: [u8; 256],
}

fn bytes_to_string(raw: &[u8]) -> Option<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&raw[..end]).into_owned())
}

fn is_viable(proc_: &KinfoProc) -> bool {
    if proc_.ki_flag & P_SYSTEM != 0 {
        return false;
    }
    if proc_.ki_stat == SZOMB {
        return false;
    }
    proc_.ki_ppid > 0
}

fn to_snapshot(proc_: &KinfoProc, want_command: bool) -> Option<Snapshot> {
    if !is_viable(proc_) {
        return None;
    }
    let cumulative_cpu_time_ms = proc_.ki_runtime / 1000;
    let command = if want_command {
        bytes_to_string(&proc_.ki_comm)
    } else {
        None
    };
    Some(Snapshot {
        pid: Pid::from(proc_.ki_pid as u32),
        ppid: Pid::from(proc_.ki_ppid as u32),
        cumulative_cpu_time_ms,
        command,
    })
}

fn sysctl_proc_table(mib: &[libc::c_int]) -> io::Result<Vec<u8>> {
    let mut len: libc::size_t = 0;
    // SAFETY: a null output buffer with a valid `len` pointer asks
    // `sysctl` for the required size only.
    let rc = unsafe {
        libc::sysctl(
            mib.as_ptr() as *mut libc::c_int,
            mib.len() as u32,
            ptr::null_mut(),
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    // The process table can grow between the size query and the real
    // read; pad generously and retry once if it still doesn't fit.
    let mut buf = vec![0u8; len + len / 4 + mem::size_of::<KinfoProc>()];
    let mut real_len = buf.len() as libc::size_t;
    // SAFETY: `buf` is sized by `real_len` and both are passed
    // consistently to `sysctl`.
    let rc = unsafe {
        libc::sysctl(
            mib.as_ptr() as *mut libc::c_int,
            mib.len() as u32,
            buf.as_mut_ptr() as *mut libc::c_void,
            &mut real_len,
            ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    buf.truncate(real_len);
    Ok(buf)
}

fn parse_entries(buf: &[u8]) -> Vec<&KinfoProc> {
    let stride = mem::size_of::<KinfoProc>();
    if stride == 0 {
        return Vec::new();
    }
    buf.chunks_exact(stride)
        .map(|chunk| {
            // SAFETY: `chunk` has exactly `size_of::<KinfoProc>()` bytes
            // and `KinfoProc` has no validity invariants beyond its raw
            // bit pattern (all fields are integers/byte arrays).
            unsafe { &*(chunk.as_ptr() as *const KinfoProc) }
        })
        .collect()
}

pub(crate) fn snapshot_all(want_command: bool) -> io::Result<Vec<Snapshot>> {
    let buf = sysctl_proc_table(&[CTL_KERN, KERN_PROC, KERN_PROC_ALL, 0])?;
    Ok(parse_entries(&buf)
        .into_iter()
        .filter_map(|p| to_snapshot(p, want_command))
        .collect())
}

pub(crate) fn snapshot_one(pid: Pid, want_command: bool) -> Option<Snapshot> {
    let buf = sysctl_proc_table(&[CTL_KERN, KERN_PROC, KERN_PROC_PID, pid.get() as libc::c_int]).ok()?;
    parse_entries(&buf)
        .into_iter()
        .find(|p| p.ki_pid as u32 == pid.get())
        .and_then(|p| to_snapshot(p, want_command))
}

/// FreeBSD exposes `ki_start`, but no start-time-based PID-reuse guard
/// is wired up for this platform yet; see `spec.md` §9's Open
/// Questions.
pub(crate) fn start_time(_pid: Pid) -> Option<u64> {
    None
}
