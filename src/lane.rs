//! Per-device lane: compiled kernel, claim quantum, launch geometry, and
//! the lane-local result accumulator and timer. Two lanes exist per trial
//! and are never shared across threads.

use crate::backend::{Backend, KernelId};
use crate::timing::LaneTimer;
use crate::workload::PartialAcc;
use std::sync::Arc;

/// Elements the accelerator lane claims per chunk. Large and fixed, to
/// amortize its dispatch latency.
pub const ACCEL_QUANTUM: u64 = 1024 * 80;

/// Elements folded per invocation in accelerator reduction passes.
pub const ACCEL_REDUCE_WIDTH: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneKind {
    Cpu,
    Accelerator,
}

impl LaneKind {
    pub fn name(&self) -> &'static str {
        match self {
            LaneKind::Cpu => "cpu",
            LaneKind::Accelerator => "accel",
        }
    }
}

pub struct DeviceLane {
    pub kind: LaneKind,
    backend: Arc<dyn Backend>,
    kernel: KernelId,
    /// Elements claimed per chunk from the shared cursor.
    pub quantum: u64,
    /// Local width for elementwise launches.
    pub ew_local: u64,
    /// Local width for reduction passes.
    pub reduce_local: u64,
    /// Fan-in per invocation for reduction passes; `None` collapses the
    /// whole chunk in one pass (the CPU-lane path).
    pub reduce_width: Option<u32>,
    pub acc: PartialAcc,
    pub timer: LaneTimer,
}

impl DeviceLane {
    /// Build a lane with heterogeneity-aware defaults: the accelerator
    /// claims a fixed large quantum, the CPU lane claims work sized to its
    /// own parallelism (preferred width times compute units).
    pub fn new(kind: LaneKind, backend: Arc<dyn Backend>, kernel: KernelId) -> Self {
        let par = backend.parallelism();
        let (quantum, reduce_local, reduce_width) = match kind {
            LaneKind::Accelerator => (
                ACCEL_QUANTUM,
                par.preferred_local_width,
                Some(ACCEL_REDUCE_WIDTH),
            ),
            LaneKind::Cpu => (par.preferred_local_width * par.compute_units, 1, None),
        };
        Self {
            kind,
            backend,
            kernel,
            quantum,
            ew_local: par.preferred_local_width,
            reduce_local,
            reduce_width,
            acc: PartialAcc::default(),
            timer: LaneTimer::new(),
        }
    }

    pub fn with_quantum(mut self, quantum: u64) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn with_reduce_geometry(mut self, local: u64, width: Option<u32>) -> Self {
        self.reduce_local = local;
        self.reduce_width = width;
        self
    }

    /// Cheap handle clone, so callers can keep the backend while mutating
    /// the lane's timer and accumulator.
    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    pub fn kernel(&self) -> KernelId {
        self.kernel
    }

    /// Clear per-trial state; lanes are created once at setup and reused
    /// across trials.
    pub fn reset(&mut self) {
        self.acc = PartialAcc::default();
        self.timer.reset();
    }
}

impl std::fmt::Debug for DeviceLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLane")
            .field("kind", &self.kind)
            .field("backend", &self.backend.name())
            .field("quantum", &self.quantum)
            .finish()
    }
}
