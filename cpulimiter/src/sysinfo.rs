//! Small whole-machine facts shared by the tracker and the controller.

/// Total number of logical CPUs, as reported by the OS.
///
/// Falls back to `1` if the platform cannot report a count at all (a
/// documented corner case of `std::thread::available_parallelism`).
#[must_use]
pub fn cpu_count() -> f64 {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1) as f64
}

/// The 1-minute system load average, or `None` if the platform cannot
/// report one right now.
#[must_use]
pub fn load_average_1m() -> Option<f64> {
    let mut loads = [0f64; 3];
    // SAFETY: `loads` has room for the (up to) 3 values `getloadavg`
    // writes; passing its length as the sample count is the documented
    // contract.
    let n = unsafe { libc::getloadavg(loads.as_mut_ptr(), loads.len() as libc::c_int) };
    if n <= 0 {
        None
    } else {
        Some(loads[0])
    }
}
