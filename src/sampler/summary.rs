// src/sampler/summary.rs

use std::time::{Duration, SystemTime};

use serde::Serialize;

/// One point-in-time reading of a supervised process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub taken_at: SystemTime,
    /// CPU usage in percent of one core (can exceed 100 on multi-core).
    pub cpu_percent: f32,
    /// Resident set size in bytes.
    pub memory_bytes: u64,
    /// Cumulative bytes read since the process started.
    pub read_bytes: u64,
    /// Cumulative bytes written since the process started.
    pub written_bytes: u64,
    /// Thread count, when the platform reports it.
    pub threads: Option<usize>,
}

/// Min / max / mean of one metric across all snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Everything measured about a single attempt.
///
/// The sampler fills in the resource fields; the execution engine adds the
/// outcome fields (`wall_time`, `exit_code`, `success`, line counts).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// `false` when not a single reading could be taken (the process was gone
    /// before the first sample, or never launched). Resource fields are then
    /// zero.
    pub sampled: bool,
    pub sample_count: usize,
    pub cpu_percent: Aggregate,
    pub memory_bytes: Aggregate,
    pub threads: Option<Aggregate>,
    pub read_bytes: u64,
    pub written_bytes: u64,
    pub wall_time: Duration,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout_lines: u64,
    pub stderr_lines: u64,
}

impl MetricsSummary {
    /// Summary for an attempt that never produced a process.
    pub fn unsampled() -> Self {
        Self::default()
    }

    pub fn peak_memory_bytes(&self) -> u64 {
        self.memory_bytes.max as u64
    }
}

/// Running fold of snapshots into a [`MetricsSummary`].
#[derive(Debug, Default)]
pub(crate) struct MetricsAccumulator {
    count: usize,
    cpu: Running,
    memory: Running,
    threads: Running,
    thread_samples: usize,
    read_bytes: u64,
    written_bytes: u64,
}

#[derive(Debug, Default)]
struct Running {
    min: f64,
    max: f64,
    sum: f64,
}

impl Running {
    fn push(&mut self, value: f64, first: bool) {
        if first {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
    }

    fn finish(&self, count: usize) -> Aggregate {
        if count == 0 {
            return Aggregate::default();
        }
        Aggregate {
            min: self.min,
            max: self.max,
            avg: self.sum / count as f64,
        }
    }
}

impl MetricsAccumulator {
    pub(crate) fn push(&mut self, snapshot: &MetricsSnapshot) {
        let first = self.count == 0;
        self.cpu.push(f64::from(snapshot.cpu_percent), first);
        self.memory.push(snapshot.memory_bytes as f64, first);
        if let Some(threads) = snapshot.threads {
            self.threads.push(threads as f64, self.thread_samples == 0);
            self.thread_samples += 1;
        }
        // I/O counters are cumulative; the largest reading is the total.
        self.read_bytes = self.read_bytes.max(snapshot.read_bytes);
        self.written_bytes = self.written_bytes.max(snapshot.written_bytes);
        self.count += 1;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub(crate) fn finish(&self, wall_time: Duration) -> MetricsSummary {
        MetricsSummary {
            sampled: self.count > 0,
            sample_count: self.count,
            cpu_percent: self.cpu.finish(self.count),
            memory_bytes: self.memory.finish(self.count),
            threads: (self.thread_samples > 0).then(|| self.threads.finish(self.thread_samples)),
            read_bytes: self.read_bytes,
            written_bytes: self.written_bytes,
            wall_time,
            ..MetricsSummary::default()
        }
    }
}
