//! Real-time process setup, applied at most once per process.

use crate::cli::RtLock;

#[derive(Debug, Clone, Copy)]
pub struct RtRequest {
    pub prio: Option<i32>,
    pub lock: RtLock,
    pub cpu: usize,
}

#[cfg(all(feature = "rt", target_os = "linux"))]
pub fn setup_rt_once(req: RtRequest) {
    use gate_hardware::rt::{LockMode, lock_memory, pin_to_cpu, set_fifo_priority};
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    RT_ONCE.get_or_init(|| {
        let mode = match req.lock {
            RtLock::None => LockMode::None,
            RtLock::Current => LockMode::Current,
            RtLock::All => LockMode::All,
        };
        match lock_memory(mode) {
            Ok(applied) if applied != mode => {
                tracing::warn!(wanted = ?mode, applied = ?applied, "memory lock downgraded");
            }
            Ok(applied) => tracing::info!(mode = ?applied, "memory lock applied"),
            Err(err) => tracing::warn!(error = %err, "memory lock failed"),
        }
        match set_fifo_priority(req.prio) {
            Ok(prio) => tracing::info!(prio, "SCHED_FIFO applied"),
            Err(err) => tracing::warn!(error = %err, "SCHED_FIFO not applied"),
        }
        match pin_to_cpu(req.cpu) {
            Ok(()) => tracing::info!(cpu = req.cpu, "affinity applied"),
            Err(err) => tracing::warn!(error = %err, "affinity not applied"),
        }
    });
}

#[cfg(not(all(feature = "rt", target_os = "linux")))]
pub fn setup_rt_once(req: RtRequest) {
    tracing::warn!(
        ?req,
        "real-time mode requested but this build has no `rt` support (Linux + --features rt); continuing"
    );
}
