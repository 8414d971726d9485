// src/sampler/mod.rs

//! Concurrent resource sampling for a running process.
//!
//! [`start`] spawns a background Tokio task that reads the process with a
//! [`probe::ProcessProbe`] every `interval` and pushes
//! [`MetricsSnapshot`]s into a bounded channel. The owner of the returned
//! [`SamplerHandle`] drains that channel (see [`SamplerHandle::absorb`]) while
//! it waits on the process, then calls [`SamplerHandle::stop`] exactly once to
//! get the folded [`MetricsSummary`].
//!
//! - A read that fails transiently is skipped.
//! - When the process disappears the loop ends quietly and the summary is
//!   built from whatever was collected.
//! - The sampler never blocks on a full channel; it drops that snapshot.

pub mod probe;
pub mod summary;

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::sampler::probe::{ProbeRead, ProcessProbe};
use crate::sampler::summary::MetricsAccumulator;

pub use summary::{Aggregate, MetricsSnapshot, MetricsSummary};

/// Default sampling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of the snapshot channel between sampler and owner.
const SNAPSHOT_BUFFER: usize = 64;

/// Handle to a running sampler. Dropping it without `stop` cancels the
/// background task.
pub struct SamplerHandle {
    pid: u32,
    interval: Duration,
    started: Instant,
    rx: mpsc::Receiver<MetricsSnapshot>,
    cancel: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
    acc: MetricsAccumulator,
}

/// Start sampling `pid` every `interval` on a background task.
///
/// The first reading is taken immediately. Must be called from within a
/// Tokio runtime.
pub fn start(pid: u32, interval: Duration) -> SamplerHandle {
    let interval = if interval.is_zero() {
        DEFAULT_INTERVAL
    } else {
        interval
    };
    let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
    let (cancel_tx, cancel_rx) = oneshot::channel();

    let join = tokio::spawn(sample_loop(pid, interval, tx, cancel_rx));
    debug!(pid, ?interval, "resource sampler started");

    SamplerHandle {
        pid,
        interval,
        started: Instant::now(),
        rx,
        cancel: Some(cancel_tx),
        join: Some(join),
        acc: MetricsAccumulator::default(),
    }
}

impl SamplerHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the next snapshot and fold it in.
    ///
    /// Returns `false` once the sampler has finished and the channel is
    /// drained; callers should stop polling at that point.
    pub async fn absorb(&mut self) -> bool {
        match self.rx.recv().await {
            Some(snapshot) => {
                self.acc.push(&snapshot);
                true
            }
            None => false,
        }
    }

    /// Stop sampling and return the summary.
    ///
    /// Waits at most one sampling interval (plus a small margin) for the
    /// background task. If nothing was collected, a single best-effort read
    /// is attempted; if that fails too the summary has `sampled == false`.
    pub async fn stop(mut self) -> MetricsSummary {
        if let Some(cancel) = self.cancel.take() {
            // Already finished on its own if this fails.
            let _ = cancel.send(());
        }

        if let Some(join) = self.join.take() {
            let grace = self.interval + Duration::from_millis(50);
            match tokio::time::timeout(grace, join).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(pid = self.pid, error = %e, "sampler task panicked"),
                Err(_) => warn!(pid = self.pid, "sampler task did not stop in time"),
            }
        }

        self.rx.close();
        while let Ok(snapshot) = self.rx.try_recv() {
            self.acc.push(&snapshot);
        }

        if self.acc.is_empty() {
            debug!(pid = self.pid, "no samples collected; trying one immediate read");
            if let ProbeRead::Sample(snapshot) = ProcessProbe::new(self.pid).read() {
                self.acc.push(&snapshot);
            }
        }

        let summary = self.acc.finish(self.started.elapsed());
        debug!(
            pid = self.pid,
            samples = summary.sample_count,
            sampled = summary.sampled,
            "resource sampler stopped"
        );
        summary
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

async fn sample_loop(
    pid: u32,
    interval: Duration,
    tx: mpsc::Sender<MetricsSnapshot>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut probe = ProcessProbe::new(pid);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                trace!(pid, "sampler cancelled");
                break;
            }
            _ = ticker.tick() => {
                match probe.read() {
                    ProbeRead::Sample(snapshot) => {
                        if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(snapshot) {
                            break;
                        }
                    }
                    ProbeRead::Unavailable => {
                        trace!(pid, "transient read failure; skipping sample");
                    }
                    ProbeRead::Gone => {
                        debug!(pid, "process gone; sampler finishing");
                        break;
                    }
                }
            }
        }
    }
}
