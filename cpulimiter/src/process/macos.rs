//! macOS backend: the live PID list plus per-PID `libproc` task/BSD info.
//!
//! Mirrors the approach `htop` and `bottom` both take on Darwin: there is
//! no `/proc`, so the kernel's `libproc` API (`proc_listallpids`,
//! `proc_pidinfo`) stands in for it.

use std::io;
use std::mem;
use std::sync::OnceLock;

use crate::pid::Pid;
use crate::process::Snapshot;

const PROC_PIDTASKINFO: libc::c_int = 4;
const PROC_PIDTBSDINFO: libc::c_int = 3;
const MAXCOMLEN: usize = 16;

/// `SZOMB` in `pbi_status`.
const SZOMB: u32 = 5;
/// `P_SYSTEM`: a kernel-owned process.
const P_SYSTEM: u32 = 0x0000_0400;

extern "C" {
    fn proc_listallpids(buffer: *mut libc::c_void, buffersize: libc::c_int) -> libc::c_int;
    fn proc_pidinfo(
        pid: libc::c_int,
        flavor: libc::c_int,
        arg: u64,
        buffer: *mut libc::c_void,
        buffersize: libc::c_int,
    ) -> libc::c_int;
    fn proc_pidpath(pid: libc::c_int, buffer: *mut libc::c_void, buffersize: u32) -> libc::c_int;
    fn mach_timebase_info(info: *mut MachTimebaseInfo) -> libc::c_int;
}

#[repr(C)]
#[derive(Default)]
struct MachTimebaseInfo {
    numer: u32,
    denom: u32,
}

/// Partial view of `struct proc_bsdinfo` (`sys/proc_info.h`).
#[repr(C)]
#[derive(Default)]
struct ProcBsdInfo {
    pbi_flags: u32,
    pbi_status: u32,
    pbi_xstatus: u32,
    pbi_pid: u32,
    pbi_ppid: u32,
    pbi_uid: u32,
    pbi_gid: u32,
    pbi_ruid: u32,
    pbi_rgid: u32,
    pbi_svuid: u32,
    pbi_svgid: u32,
    _reserved: u32,
    pbi_comm: [u8; MAXCOMLEN],
    pbi_name: [u8; MAXCOMLEN * 2],
    pbi_nfiles: u32,
    pbi_pgid: u32,
    pbi_pjobc: u32,
    e_tdev: u32,
    e_tpgid: u32,
    pbi_nice: i32,
    pbi_start_tvsec: u64,
    pbi_start_tvusec: u64,
}

/// Partial view of `struct proc_taskinfo`. Only the mach-tick CPU
/// counters are read.
#[repr(C)]
struct ProcTaskInfo {
    pti_virtual_size: u64,
    pti_resident_size: u64,
    pti_total_user: u64,
    pti_total_system: u64,
    pti_threads_user: u64,
    pti_threads_system: u64,
    pti_policy: i32,
    pti_faults: i32,
    pti_pageins: i32,
    pti_cow_faults: i32,
    pti_messages_sent: i32,
    pti_messages_received: i32,
    pti_syscalls_mach: i32,
    pti_syscalls_unix: i32,
    pti_csw: i32,
    pti_threadnum: i32,
    pti_numrunning: i32,
    pti_priority: i32,
}

impl Default for ProcTaskInfo {
    fn default() -> Self {
        // SAFETY: every field is a plain integer; the all-zero bit
        // pattern is a valid (if meaningless) value for each of them.
        unsafe { mem::zeroed() }
    }
}

fn timebase_ratio() -> f64 {
    static TIMEBASE: OnceLock<(u32, u32)> = OnceLock::new();
    let (numer, denom) = *TIMEBASE.get_or_init(|| {
        let mut info = MachTimebaseInfo::default();
        // SAFETY: `info` is a valid, appropriately sized out-pointer.
        let rc = unsafe { mach_timebase_info(&mut info) };
        if rc == 0 && info.denom != 0 {
            (info.numer, info.denom)
        } else {
            (1, 1)
        }
    });
    numer as f64 / denom as f64
}

fn bytes_to_string(raw: &[u8]) -> Option<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&raw[..end]).into_owned())
}

fn read_path(pid: i32) -> Option<String> {
    let mut buf = [0u8; libc::PATH_MAX as usize];
    // SAFETY: `buf` is sized to the buffer length passed.
    let len = unsafe {
        proc_pidpath(
            pid,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len() as u32,
        )
    };
    if len <= 0 {
        return None;
    }
    bytes_to_string(&buf[..len as usize])
}

fn to_snapshot(pid: i32, bsd: &ProcBsdInfo, task_ticks: Option<u64>, want_command: bool) -> Option<Snapshot> {
    if bsd.pbi_flags & P_SYSTEM != 0 {
        return None;
    }
    if bsd.pbi_status == SZOMB {
        return None;
    }
    if bsd.pbi_ppid == 0 {
        return None;
    }

    let cumulative_cpu_time_ms = task_ticks
        .map(|ticks| (ticks as f64 * timebase_ratio() / 1_000_000.0) as u64)
        .unwrap_or(0);

    let command = if want_command {
        read_path(pid).or_else(|| bytes_to_string(&bsd.pbi_comm))
    } else {
        None
    };

    Some(Snapshot {
        pid: Pid::from(pid as u32),
        ppid: Pid::from(bsd.pbi_ppid),
        cumulative_cpu_time_ms,
        command,
    })
}

fn read_bsd_info(pid: i32) -> Option<ProcBsdInfo> {
    let mut info = ProcBsdInfo::default();
    // SAFETY: `info` is sized exactly for `PROC_PIDTBSDINFO`.
    let rc = unsafe {
        proc_pidinfo(
            pid,
            PROC_PIDTBSDINFO,
            0,
            &mut info as *mut _ as *mut libc::c_void,
            mem::size_of::<ProcBsdInfo>() as libc::c_int,
        )
    };
    (rc > 0).then_some(info)
}

fn read_task_ticks(pid: i32) -> Option<u64> {
    let mut info = ProcTaskInfo::default();
    // SAFETY: `info` is sized exactly for `PROC_PIDTASKINFO`.
    let rc = unsafe {
        proc_pidinfo(
            pid,
            PROC_PIDTASKINFO,
            0,
            &mut info as *mut _ as *mut libc::c_void,
            mem::size_of::<ProcTaskInfo>() as libc::c_int,
        )
    };
    (rc > 0).then_some(info.pti_total_user + info.pti_total_system)
}

pub(crate) fn snapshot_one(pid: Pid, want_command: bool) -> Option<Snapshot> {
    let raw_pid = pid.get() as i32;
    let bsd = read_bsd_info(raw_pid)?;
    let ticks = read_task_ticks(raw_pid);
    to_snapshot(raw_pid, &bsd, ticks, want_command)
}

pub(crate) fn snapshot_all(want_command: bool) -> io::Result<Vec<Snapshot>> {
    // SAFETY: a null buffer asks for the number of PIDs only.
    let needed = unsafe { proc_listallpids(std::ptr::null_mut(), 0) };
    if needed <= 0 {
        return Err(io::Error::last_os_error());
    }

    // The process count can grow between the size probe and the real
    // call; pad generously.
    let capacity = needed as usize + needed as usize / 4 + 32;
    let mut pids = vec![0i32; capacity];
    // SAFETY: `pids` is sized by `capacity * size_of::<i32>()`.
    let count = unsafe {
        proc_listallpids(
            pids.as_mut_ptr() as *mut libc::c_void,
            (pids.len() * mem::size_of::<i32>()) as libc::c_int,
        )
    };
    if count <= 0 {
        return Err(io::Error::last_os_error());
    }
    pids.truncate(count as usize);

    let mut out = Vec::with_capacity(pids.len());
    for pid in pids {
        if pid <= 0 {
            continue;
        }
        if let Some(bsd) = read_bsd_info(pid) {
            let ticks = read_task_ticks(pid);
            if let Some(snapshot) = to_snapshot(pid, &bsd, ticks, want_command) {
                out.push(snapshot);
            }
        }
    }
    Ok(out)
}

/// No start-time-based PID-reuse guard is wired up on macOS; see
/// `spec.md` §9's Open Questions.
pub(crate) fn start_time(_pid: Pid) -> Option<u64> {
    None
}
