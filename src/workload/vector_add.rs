//! Elementwise vector addition: `c[i] = a[i] + b[i]`.

use super::{fill_random, round_up, PartialAcc, Segment, Workload};
use crate::backend::{AccessMode, BufferBinding, KernelSource, LaunchArgs};
use crate::cursor::Chunk;
use crate::error::Result;
use crate::lane::DeviceLane;
use rand_pcg::Pcg64;

const VEC_ADD_WGSL: &str = r#"
struct Params {
    len: u32,
    group_width: u32,
    base_group: u32,
    _pad: u32,
}

@group(0) @binding(0) var<storage, read> a: array<u32>;
@group(0) @binding(1) var<storage, read> b: array<u32>;
@group(0) @binding(2) var<storage, read_write> c: array<u32>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
) {
    let idx = (params.base_group + wid.x) * 256u + lid.x;
    if (idx < params.len) {
        c[idx] = a[idx] + b[idx];
    }
}
"#;

pub static VEC_ADD_KERNEL: KernelSource = KernelSource {
    name: "vec_add",
    entry: "main",
    wgsl: VEC_ADD_WGSL,
    layout: &[
        BufferBinding { read_only: true },
        BufferBinding { read_only: true },
        BufferBinding { read_only: false },
    ],
};

pub struct VectorAdd {
    len: u64,
    a: Vec<u32>,
    b: Vec<u32>,
    reference: Vec<u32>,
}

impl VectorAdd {
    pub fn new(len: u64) -> Self {
        Self {
            len,
            a: vec![0; len as usize],
            b: vec![0; len as usize],
            reference: vec![0; len as usize],
        }
    }
}

impl Workload for VectorAdd {
    fn name(&self) -> &'static str {
        "VectorAdd"
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn kernel(&self) -> &'static KernelSource {
        &VEC_ADD_KERNEL
    }

    fn prepare(&mut self, rng: &mut Pcg64) {
        fill_random(rng, &mut self.a);
        fill_random(rng, &mut self.b);
        for (i, out) in self.reference.iter_mut().enumerate() {
            *out = self.a[i].wrapping_add(self.b[i]);
        }
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
        let ew_local = lane.ew_local;

        let (da, db, dc) = lane.timer.time_data(|| -> Result<_> {
            let da = backend.alloc(bytes, AccessMode::ReadOnly)?;
            let db = backend.alloc(bytes, AccessMode::ReadOnly)?;
            let dc = backend.alloc(bytes, AccessMode::WriteOnly)?;
            backend.transfer_in(da, bytemuck::cast_slice(&self.a[lo..hi]))?;
            backend.transfer_in(db, bytemuck::cast_slice(&self.b[lo..hi]))?;
            Ok((da, db, dc))
        })?;

        let buffers = [da, db, dc];
        let args = LaunchArgs {
            buffers: &buffers,
            len: chunk.len as u32,
            group_width: 1,
        };
        let global = round_up(chunk.len, ew_local);
        lane.timer
            .time_exec(|| backend.launch(kernel, global, ew_local, &args))?;

        let mut values = vec![0u32; chunk.len as usize];
        lane.timer.time_data(|| -> Result<()> {
            backend.transfer_out(dc, bytemuck::cast_slice_mut(&mut values))?;
            backend.release(da);
            backend.release(db);
            backend.release(dc);
            Ok(())
        })?;

        lane.acc.segments.push(Segment {
            offset: chunk.offset,
            values,
        });
        Ok(())
    }

    fn verify(&self, parts: [PartialAcc; 2]) -> bool {
        let mut out = vec![0u32; self.len as usize];
        let mut covered = vec![false; self.len as usize];
        for part in &parts {
            for segment in &part.segments {
                let lo = segment.offset as usize;
                for (i, &v) in segment.values.iter().enumerate() {
                    if lo + i >= out.len() || covered[lo + i] {
                        return false;
                    }
                    covered[lo + i] = true;
                    out[lo + i] = v;
                }
            }
        }
        covered.iter().all(|&c| c) && out == self.reference
    }
}

impl std::fmt::Debug for VectorAdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorAdd").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn prepared(len: u64) -> VectorAdd {
        let mut w = VectorAdd::new(len);
        w.prepare(&mut Pcg64::seed_from_u64(1));
        w
    }

    #[test]
    fn verify_accepts_exact_disjoint_cover() {
        let w = prepared(100);
        let parts = [
            PartialAcc {
                sum: 0,
                segments: vec![Segment {
                    offset: 0,
                    values: w.reference[..60].to_vec(),
                }],
            },
            PartialAcc {
                sum: 0,
                segments: vec![Segment {
                    offset: 60,
                    values: w.reference[60..].to_vec(),
                }],
            },
        ];
        assert!(w.verify(parts));
    }

    #[test]
    fn verify_rejects_gap_and_overlap() {
        let w = prepared(10);
        // Gap: element 9 never covered.
        let gap = [
            PartialAcc {
                sum: 0,
                segments: vec![Segment {
                    offset: 0,
                    values: w.reference[..9].to_vec(),
                }],
            },
            PartialAcc::default(),
        ];
        assert!(!w.verify(gap));

        // Overlap: element 0 covered twice.
        let overlap = [
            PartialAcc {
                sum: 0,
                segments: vec![Segment {
                    offset: 0,
                    values: w.reference.clone(),
                }],
            },
            PartialAcc {
                sum: 0,
                segments: vec![Segment {
                    offset: 0,
                    values: w.reference[..1].to_vec(),
                }],
            },
        ];
        assert!(!w.verify(overlap));
    }

    #[test]
    fn verify_rejects_wrong_values() {
        let w = prepared(10);
        let mut values = w.reference.clone();
        values[3] ^= 1;
        let parts = [
            PartialAcc {
                sum: 0,
                segments: vec![Segment { offset: 0, values }],
            },
            PartialAcc::default(),
        ];
        assert!(!w.verify(parts));
    }
}
