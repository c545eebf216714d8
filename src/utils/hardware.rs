use sysinfo::System;

/// Snapshot of the machine the probe runs on, logged once at startup so
/// run reports can be read against the capacity that produced them.
#[derive(Debug)]
pub struct HardwareInfo {
    pub cpu_cores: u64,
    pub total_mem_mb: u64,
    pub free_mem_mb: u64,
}

pub fn get_hardware_info() -> HardwareInfo {
    let mut sys = System::new_all();
    sys.refresh_all();

    HardwareInfo {
        cpu_cores: sys.cpus().len() as u64,
        total_mem_mb: sys.total_memory() / (1024 * 1024),
        free_mem_mb: sys.available_memory() / (1024 * 1024),
    }
}
