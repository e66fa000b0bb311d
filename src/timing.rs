//! Per-lane and per-trial timing accumulators.
//!
//! Every trial resets all totals to zero; nothing is averaged here. The
//! driver discards warmup trials and reports the rest verbatim.

use hdrhistogram::Histogram;
use std::time::{Duration, Instant};

/// Running data-movement and execution totals for one device lane.
#[derive(Debug)]
pub struct LaneTimer {
    data: Duration,
    exec: Duration,
    chunks: u64,
    /// Per-chunk wall-clock latency, surfaced only in DEBUG logs.
    latency: Histogram<u64>,
}

impl LaneTimer {
    pub fn new() -> Self {
        Self {
            data: Duration::ZERO,
            exec: Duration::ZERO,
            chunks: 0,
            latency: Histogram::new_with_max(60_000_000_000, 3)
                .expect("histogram bounds are static"),
        }
    }

    pub fn reset(&mut self) {
        self.data = Duration::ZERO;
        self.exec = Duration::ZERO;
        self.chunks = 0;
        self.latency.reset();
    }

    pub fn add_data(&mut self, d: Duration) {
        self.data += d;
    }

    pub fn add_exec(&mut self, d: Duration) {
        self.exec += d;
    }

    pub fn record_chunk(&mut self, wall: Duration) {
        self.chunks += 1;
        let _ = self.latency.record(wall.as_nanos() as u64);
    }

    /// Time a data-movement phase (transfer, readback, release).
    pub fn time_data<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.data += start.elapsed();
        out
    }

    /// Time an execution phase (kernel launch and wait).
    pub fn time_exec<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.exec += start.elapsed();
        out
    }

    pub fn data_ms(&self) -> f64 {
        self.data.as_secs_f64() * 1e3
    }

    pub fn exec_ms(&self) -> f64 {
        self.exec.as_secs_f64() * 1e3
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn p95_chunk_us(&self) -> f64 {
        self.latency.value_at_quantile(0.95) as f64 / 1e3
    }
}

impl Default for LaneTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall clock wrapping one whole trial.
#[derive(Debug)]
pub struct TrialClock {
    start: Instant,
}

impl TrialClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1e3
    }
}
