//! Tree reduction: sum all elements to a single scalar.

use super::{fill_random, PartialAcc, Workload};
use crate::backend::{AccessMode, BufferBinding, KernelSource};
use crate::cursor::Chunk;
use crate::error::Result;
use crate::lane::DeviceLane;
use crate::merge::{collapse, PingPong};
use rand_pcg::Pcg64;

const REDUCE_SUM_WGSL: &str = r#"
struct Params {
    len: u32,
    group_width: u32,
    base_group: u32,
    _pad: u32,
}

@group(0) @binding(0) var<storage, read> src: array<u32>;
@group(0) @binding(1) var<storage, read_write> dst: array<u32>;
@group(0) @binding(2) var<uniform> params: Params;

var<workgroup> scratch: array<u32, 256>;

@compute @workgroup_size(256)
fn main(
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
) {
    let group = params.base_group + wid.x;
    let base = group * 256u * params.group_width + lid.x * params.group_width;

    var sum = 0u;
    for (var k = 0u; k < params.group_width; k = k + 1u) {
        let i = base + k;
        if (i < params.len) {
            sum = sum + src[i];
        }
    }
    scratch[lid.x] = sum;
    workgroupBarrier();

    var stride = 128u;
    loop {
        if (stride == 0u) {
            break;
        }
        if (lid.x < stride) {
            scratch[lid.x] = scratch[lid.x] + scratch[lid.x + stride];
        }
        workgroupBarrier();
        stride = stride / 2u;
    }

    if (lid.x == 0u) {
        dst[group] = scratch[0u];
    }
}
"#;

pub static REDUCE_SUM_KERNEL: KernelSource = KernelSource {
    name: "reduce_sum",
    entry: "main",
    wgsl: REDUCE_SUM_WGSL,
    layout: &[
        BufferBinding { read_only: true },
        BufferBinding { read_only: false },
    ],
};

pub struct Reduce {
    len: u64,
    a: Vec<u32>,
    reference: u64,
}

impl Reduce {
    pub fn new(len: u64) -> Self {
        Self {
            len,
            a: vec![0; len as usize],
            reference: 0,
        }
    }
}

impl Workload for Reduce {
    fn name(&self) -> &'static str {
        "Reduce"
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn kernel(&self) -> &'static KernelSource {
        &REDUCE_SUM_KERNEL
    }

    fn prepare(&mut self, rng: &mut Pcg64) {
        fill_random(rng, &mut self.a);
        self.reference = self.a.iter().map(|&v| v as u64).sum();
    }

    fn process_chunk(&self, lane: &mut DeviceLane, chunk: Chunk) -> Result<()> {
        if chunk.len == 0 {
            return Ok(());
        }
        let lo = chunk.offset as usize;
        let hi = lo + chunk.len as usize;
        let bytes = chunk.len as usize * 4;
        let backend = lane.backend();
        let kernel = lane.kernel();
        let reduce_local = lane.reduce_local;

        // Both slots are chunk-sized; pass N never needs more than the
        // pass N-1 group count.
        let mut pair = lane.timer.time_data(|| -> Result<_> {
            let front = backend.alloc(bytes, AccessMode::ReadWrite)?;
            let back = backend.alloc(bytes, AccessMode::ReadWrite)?;
            backend.transfer_in(front, bytemuck::cast_slice(&self.a[lo..hi]))?;
            Ok(PingPong::new(front, back))
        })?;

        let group_width = lane
            .reduce_width
            .unwrap_or_else(|| chunk.len.min(u32::MAX as u64) as u32);
        collapse(
            backend.as_ref(),
            kernel,
            &mut pair,
            chunk.len,
            reduce_local,
            group_width,
            &mut lane.timer,
        )?;

        let chunk_sum = lane.timer.time_data(|| -> Result<u32> {
            let mut out = [0u32; 1];
            backend.transfer_out(pair.back(), bytemuck::cast_slice_mut(&mut out))?;
            pair.release(backend.as_ref());
            Ok(out[0])
        })?;

        lane.acc.sum += chunk_sum as u64;
        Ok(())
    }

    fn verify(&self, parts: [PartialAcc; 2]) -> bool {
        parts[0].sum + parts[1].sum == self.reference
    }
}

impl std::fmt::Debug for Reduce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reduce").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn serial_reference_tracks_inputs() {
        let mut w = Reduce::new(1000);
        w.prepare(&mut Pcg64::seed_from_u64(3));
        let expected: u64 = w.a.iter().map(|&v| v as u64).sum();
        assert_eq!(w.reference, expected);
    }

    #[test]
    fn verify_folds_both_lanes() {
        let mut w = Reduce::new(10);
        w.prepare(&mut Pcg64::seed_from_u64(3));
        let total = w.reference;
        let parts = [
            PartialAcc {
                sum: total - 5,
                segments: Vec::new(),
            },
            PartialAcc {
                sum: 5,
                segments: Vec::new(),
            },
        ];
        assert!(w.verify(parts));

        let bad = [
            PartialAcc {
                sum: total,
                segments: Vec::new(),
            },
            PartialAcc {
                sum: 1,
                segments: Vec::new(),
            },
        ];
        assert!(!w.verify(bad));
    }

    #[test]
    fn zero_length_workload_reduces_to_zero() {
        let mut w = Reduce::new(0);
        w.prepare(&mut Pcg64::seed_from_u64(3));
        assert_eq!(w.reference, 0);
        assert!(w.verify([PartialAcc::default(), PartialAcc::default()]));
    }
}
