//! Benchmark driver: setup, warmup, measured trials, verification, rows.

use crate::backend::{Backend, HostBackend};
use crate::config::{AcceleratorKind, BenchConfig, Policy};
use crate::error::Result;
use crate::lane::{DeviceLane, LaneKind};
use crate::partition;
use crate::report::TrialReport;
use crate::timing::TrialClock;
use crate::workload::{self, Workload};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use std::sync::Arc;

pub struct Bench {
    config: BenchConfig,
    workload: Box<dyn Workload>,
    lanes: [DeviceLane; 2],
}

impl Bench {
    /// Enumerate devices and compile the workload kernel for both lanes.
    /// Any failure here is fatal before a single trial runs.
    pub fn new(config: BenchConfig) -> Result<Self> {
        config.validate()?;

        let host: Arc<dyn Backend> = Arc::new(HostBackend::new(config.host_worker_threads())?);

        // The accelerator lane never runs a chunk under CpuOnly, so no
        // device is required for it.
        let accel: Arc<dyn Backend> = if config.policy == Policy::CpuOnly {
            Arc::new(HostBackend::new(1)?)
        } else {
            match config.accelerator {
                #[cfg(feature = "gpu")]
                AcceleratorKind::Wgpu => {
                    let backend = crate::backend::WgpuBackend::new()?;
                    tracing::info!(adapter = backend.adapter_name(), "accelerator lane ready");
                    Arc::new(backend)
                }
                #[cfg(not(feature = "gpu"))]
                AcceleratorKind::Wgpu => {
                    return Err(crate::error::Error::setup(
                        "built without the gpu feature; use --accel host",
                    ))
                }
                AcceleratorKind::Host => Arc::new(HostBackend::new(config.host_worker_threads())?),
            }
        };

        let workload = workload::build(config.workload, config.length);
        let cpu_kernel = host.compile(workload.kernel())?;
        let accel_kernel = accel.compile(workload.kernel())?;

        let lanes = [
            DeviceLane::new(LaneKind::Cpu, host, cpu_kernel),
            DeviceLane::new(LaneKind::Accelerator, accel, accel_kernel),
        ];
        tracing::info!(
            workload = workload.name(),
            policy = config.policy.token(),
            length = config.length,
            cpu_quantum = lanes[0].quantum,
            accel_quantum = lanes[1].quantum,
            "bench ready"
        );

        Ok(Self {
            config,
            workload,
            lanes,
        })
    }

    /// Run `warmup + trials` trials and return one row per measured trial,
    /// numbered from zero after the warmup discard.
    pub fn run(&mut self) -> Result<Vec<TrialReport>> {
        let mut rows = Vec::with_capacity(self.config.trials);

        for i in 0..self.config.warmup + self.config.trials {
            // Refill and serial reference stay outside the trial clock.
            let mut rng = Pcg64::seed_from_u64(self.config.seed.wrapping_add(i as u64));
            self.workload.prepare(&mut rng);
            for lane in &mut self.lanes {
                lane.reset();
            }

            let clock = TrialClock::start();
            partition::dispatch(
                self.config.policy,
                &mut self.lanes,
                self.workload.as_ref(),
                self.config.ratio,
            )?;

            let parts = [
                std::mem::take(&mut self.lanes[0].acc),
                std::mem::take(&mut self.lanes[1].acc),
            ];
            if !self.workload.verify(parts) {
                tracing::warn!(
                    trial = i,
                    workload = self.workload.name(),
                    "parallel result disagrees with serial reference"
                );
            }
            let total_ms = clock.elapsed_ms();

            for lane in &self.lanes {
                tracing::debug!(
                    lane = lane.kind.name(),
                    chunks = lane.timer.chunks(),
                    p95_chunk_us = lane.timer.p95_chunk_us(),
                    "trial lane stats"
                );
            }

            if i >= self.config.warmup {
                rows.push(TrialReport {
                    trial: i - self.config.warmup,
                    workload: self.workload.name(),
                    policy: self.config.policy.token(),
                    ratio: self.config.ratio,
                    length: self.config.length,
                    data_ms: self.lanes[0].timer.data_ms() + self.lanes[1].timer.data_ms(),
                    exec_ms: self.lanes[0].timer.exec_ms() + self.lanes[1].timer.exec_ms(),
                    total_ms,
                });
            }
        }

        Ok(rows)
    }
}

impl std::fmt::Debug for Bench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bench")
            .field("workload", &self.workload.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Convenience entry point: setup, run, return measured rows.
pub fn run(config: BenchConfig) -> Result<Vec<TrialReport>> {
    Bench::new(config)?.run()
}
