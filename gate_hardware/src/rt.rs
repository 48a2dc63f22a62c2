//! Real-time process setup: memory locking, SCHED_FIFO and CPU affinity.

use crate::error::{HwError, Result};
use nix::sched::{CpuSet, sched_setaffinity};
use nix::sys::mman::{MlockAllFlags, mlockall};
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    None,
    Current,
    All,
}

/// Lock process memory. `All` falls back to `Current` when the limit is too
/// small for future mappings.
pub fn lock_memory(mode: LockMode) -> Result<LockMode> {
    let current = || mlockall(MlockAllFlags::MCL_CURRENT);
    match mode {
        LockMode::None => Ok(LockMode::None),
        LockMode::Current => current()
            .map(|()| LockMode::Current)
            .map_err(|e| HwError::Rt(format!("mlockall(current): {e}; needs CAP_IPC_LOCK or 'ulimit -l'"))),
        LockMode::All => match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
            Ok(()) => Ok(LockMode::All),
            Err(e) => current()
                .map(|()| LockMode::Current)
                .map_err(|e2| HwError::Rt(format!("mlockall(current|future): {e}; fallback: {e2}"))),
        },
    }
}

/// Switch the calling process to SCHED_FIFO, clamping `prio` into the
/// system range (maximum when `None`). Returns the applied priority.
pub fn set_fifo_priority(prio: Option<i32>) -> Result<i32> {
    // SAFETY: plain syscalls without pointers except `param`, which lives on the stack.
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(libc::SCHED_FIFO),
            libc::sched_get_priority_max(libc::SCHED_FIFO),
        )
    };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    let applied = prio.unwrap_or(max).clamp(min, max);
    let param = libc::sched_param {
        sched_priority: applied,
    };
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(HwError::Rt(format!(
            "sched_setscheduler(SCHED_FIFO, {applied}): {}; needs CAP_SYS_NICE or root",
            std::io::Error::last_os_error()
        )));
    }
    Ok(applied)
}

/// Pin the process to one CPU.
pub fn pin_to_cpu(cpu: usize) -> Result<()> {
    let mut set = CpuSet::new();
    set.set(cpu)
        .map_err(|e| HwError::Rt(format!("cpu {cpu} out of range: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &set)
        .map_err(|e| HwError::Rt(format!("sched_setaffinity({cpu}): {e}")))
}
