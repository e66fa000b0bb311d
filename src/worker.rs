//! Per-lane worker loop for the dynamic policy.

use crate::cursor::WorkCursor;
use crate::error::Result;
use crate::lane::DeviceLane;
use crate::workload::Workload;
use std::time::Instant;

/// Claim chunks sized to the lane's quantum until the cursor drains, then
/// return. Chunks are processed in claim order, so each lane sees strictly
/// increasing offsets; the two lanes interleave without any cross-lane
/// ordering. A backend failure propagates out and ends the trial.
pub fn drain(lane: &mut DeviceLane, cursor: &WorkCursor, workload: &dyn Workload) -> Result<()> {
    while let Some(chunk) = cursor.claim(lane.quantum) {
        let start = Instant::now();
        workload.process_chunk(lane, chunk)?;
        lane.timer.record_chunk(start.elapsed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AccessMode, Backend, BufferId, HostBackend, KernelId, KernelSource, LaunchArgs,
        Parallelism,
    };
    use crate::error::Result;
    use crate::lane::{DeviceLane, LaneKind};
    use crate::workload::{self, VEC_ADD_KERNEL};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Counts backend calls while delegating to a host backend.
    struct CountingBackend {
        inner: HostBackend,
        transfers: AtomicU64,
        launches: AtomicU64,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                inner: HostBackend::new(1).unwrap(),
                transfers: AtomicU64::new(0),
                launches: AtomicU64::new(0),
            }
        }
    }

    impl Backend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn compile(&self, source: &KernelSource) -> Result<KernelId> {
            self.inner.compile(source)
        }

        fn alloc(&self, size_bytes: usize, mode: AccessMode) -> Result<BufferId> {
            self.inner.alloc(size_bytes, mode)
        }

        fn release(&self, buffer: BufferId) {
            self.inner.release(buffer);
        }

        fn transfer_in(&self, dst: BufferId, src: &[u8]) -> Result<()> {
            self.transfers.fetch_add(1, Ordering::Relaxed);
            self.inner.transfer_in(dst, src)
        }

        fn transfer_out(&self, src: BufferId, dst: &mut [u8]) -> Result<()> {
            self.transfers.fetch_add(1, Ordering::Relaxed);
            self.inner.transfer_out(src, dst)
        }

        fn launch(
            &self,
            kernel: KernelId,
            global: u64,
            local: u64,
            args: &LaunchArgs,
        ) -> Result<()> {
            self.launches.fetch_add(1, Ordering::Relaxed);
            self.inner.launch(kernel, global, local, args)
        }

        fn parallelism(&self) -> Parallelism {
            self.inner.parallelism()
        }
    }

    #[test]
    fn drained_cursor_never_touches_the_backend() {
        let backend = Arc::new(CountingBackend::new());
        let kernel = backend.compile(&VEC_ADD_KERNEL).unwrap();
        let backend_dyn: Arc<dyn Backend> = backend.clone();
        let mut lane = DeviceLane::new(LaneKind::Cpu, backend_dyn, kernel);

        let mut workload = workload::build(crate::config::WorkloadKind::VectorAdd, 16);
        workload.prepare(&mut Pcg64::seed_from_u64(0));

        let cursor = WorkCursor::new(0);
        drain(&mut lane, &cursor, workload.as_ref()).unwrap();

        assert_eq!(backend.transfers.load(Ordering::Relaxed), 0);
        assert_eq!(backend.launches.load(Ordering::Relaxed), 0);
        assert_eq!(lane.timer.chunks(), 0);
    }

    #[test]
    fn lane_chunks_have_increasing_offsets() {
        let backend: Arc<dyn Backend> = Arc::new(HostBackend::with_parallelism(2, 8, 2).unwrap());
        let kernel = backend.compile(&VEC_ADD_KERNEL).unwrap();
        let mut lane = DeviceLane::new(LaneKind::Cpu, backend, kernel);

        let mut workload = workload::build(crate::config::WorkloadKind::VectorAdd, 100);
        workload.prepare(&mut Pcg64::seed_from_u64(0));

        let cursor = WorkCursor::new(100);
        drain(&mut lane, &cursor, workload.as_ref()).unwrap();

        // quantum 16 over 100 elements: 7 chunks, the last clipped to 4.
        assert_eq!(lane.timer.chunks(), 7);
        let offsets: Vec<u64> = lane.acc.segments.iter().map(|s| s.offset).collect();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }
}
