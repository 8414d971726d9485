// src/sampler/probe.rs

//! Single-process resource reads via `sysinfo`.

use std::time::SystemTime;

use sysinfo::{Pid, ProcessStatus, System};

use crate::sampler::summary::MetricsSnapshot;

/// Result of one read attempt.
#[derive(Debug)]
pub enum ProbeRead {
    Sample(MetricsSnapshot),
    /// The read failed but the process may still be alive; skip this tick.
    Unavailable,
    /// The process no longer exists (or is a zombie awaiting reaping).
    Gone,
}

/// Reusable reader for one pid.
///
/// Keeps its own `System` so consecutive refreshes let `sysinfo` compute
/// CPU usage as a delta between reads.
pub struct ProcessProbe {
    system: System,
    pid: Pid,
}

impl ProcessProbe {
    pub fn new(pid: u32) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(pid),
        }
    }

    pub fn read(&mut self) -> ProbeRead {
        if !self.system.refresh_process(self.pid) {
            return ProbeRead::Gone;
        }

        let Some(process) = self.system.process(self.pid) else {
            return ProbeRead::Unavailable;
        };

        if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
            return ProbeRead::Gone;
        }

        let disk = process.disk_usage();
        ProbeRead::Sample(MetricsSnapshot {
            taken_at: SystemTime::now(),
            cpu_percent: process.cpu_usage(),
            memory_bytes: process.memory(),
            read_bytes: disk.total_read_bytes,
            written_bytes: disk.total_written_bytes,
            threads: process.tasks().map(|tasks| tasks.len()),
        })
    }
}
