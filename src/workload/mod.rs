//! Benchmark workloads: what each claimed chunk actually computes.

pub mod reduce;
pub mod vector_add;

pub use reduce::{Reduce, REDUCE_SUM_KERNEL};
pub use vector_add::{VectorAdd, VEC_ADD_KERNEL};

use crate::backend::KernelSource;
use crate::config::WorkloadKind;
use crate::cursor::Chunk;
use crate::error::Result;
use crate::lane::DeviceLane;
use rand::Rng;
use rand_pcg::Pcg64;

/// One contiguous slice of elementwise output produced by a single chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub offset: u64,
    pub values: Vec<u32>,
}

/// Per-lane partial result. Written only by the owning lane's worker and
/// folded by the driver after both lanes have joined, so it needs no
/// synchronization.
#[derive(Debug, Default)]
pub struct PartialAcc {
    /// Reduction: running sum of chunk scalars.
    pub sum: u64,
    /// Elementwise: output slices, one per chunk.
    pub segments: Vec<Segment>,
}

pub trait Workload: Send + Sync {
    fn name(&self) -> &'static str;

    fn len(&self) -> u64;

    /// The device-neutral compute block, compiled once per lane at setup.
    fn kernel(&self) -> &'static KernelSource;

    /// Refill inputs and recompute the serial reference for one trial.
    fn prepare(&mut self, rng: &mut Pcg64);

    /// Execute one claimed chunk on `lane`: transfer in, launch (plus the
    /// recursive merge for reductions), read back into the lane
    /// accumulator, release buffers. A zero-length chunk returns without
    /// touching the backend.
    fn process_chunk(&self, lane: &mut DeviceLane, chunk: Chunk) -> Result<()>;

    /// Fold both lanes' partials and compare against the serial reference.
    fn verify(&self, parts: [PartialAcc; 2]) -> bool;
}

pub fn build(kind: WorkloadKind, len: u64) -> Box<dyn Workload> {
    match kind {
        WorkloadKind::VectorAdd => Box::new(VectorAdd::new(len)),
        WorkloadKind::Reduce => Box::new(Reduce::new(len)),
    }
}

/// Inputs are `0..256`, as the reference implementation fills them.
pub(crate) fn fill_random(rng: &mut Pcg64, out: &mut [u32]) {
    for v in out.iter_mut() {
        *v = rng.gen_range(0..256);
    }
}

pub(crate) fn round_up(n: u64, multiple: u64) -> u64 {
    n.div_ceil(multiple.max(1)) * multiple.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn fill_is_deterministic_per_seed() {
        let mut a = vec![0u32; 64];
        let mut b = vec![0u32; 64];
        fill_random(&mut Pcg64::seed_from_u64(7), &mut a);
        fill_random(&mut Pcg64::seed_from_u64(7), &mut b);
        assert_eq!(a, b);
        assert!(a.iter().all(|&v| v < 256));

        fill_random(&mut Pcg64::seed_from_u64(8), &mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn round_up_to_width() {
        assert_eq!(round_up(300, 256), 512);
        assert_eq!(round_up(300, 4), 300);
        assert_eq!(round_up(0, 256), 0);
        assert_eq!(round_up(1, 1), 1);
    }
}
