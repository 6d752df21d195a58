use serde::Serialize;
use sysinfo::System;

/// Point-in-time host snapshot reported by the health endpoint, mostly
/// useful for judging how much load the worker itself can generate.
#[derive(Debug, Clone, Serialize)]
pub struct HardwareSnapshot {
    pub cpu_cores: usize,
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
}

pub fn snapshot() -> HardwareSnapshot {
    let mut sys = System::new_all();
    sys.refresh_all();

    HardwareSnapshot {
        cpu_cores: sys.cpus().len(),
        total_memory_bytes: sys.total_memory(),
        available_memory_bytes: sys.available_memory(),
    }
}
