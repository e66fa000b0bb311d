//! Policy partitioner: decides how the element range reaches the lanes.
//!
//! Single-lane and static-split policies issue fixed dispatches directly,
//! each waiting synchronously (no overlap, so every phase's cost lands in
//! one timer). The dynamic policy spawns exactly two threads, one per
//! lane, that race to drain a shared cursor, and joins them before the
//! driver folds the partial results.

use crate::config::Policy;
use crate::cursor::{Chunk, WorkCursor};
use crate::error::Result;
use crate::lane::DeviceLane;
use crate::worker;
use crate::workload::{round_up, Workload};

/// CPU head / accelerator tail split for the static policy. The
/// accelerator's share is rounded up to its parallel width and clamped to
/// the total.
pub fn static_split(total: u64, ratio: f32, accel_width: u64) -> (Chunk, Chunk) {
    let accel = round_up((total as f64 * ratio as f64).ceil() as u64, accel_width).min(total);
    let cpu = total - accel;
    (
        Chunk {
            offset: 0,
            len: cpu,
        },
        Chunk {
            offset: cpu,
            len: accel,
        },
    )
}

/// Run one trial's dispatch phase. `lanes` is `[cpu, accelerator]`.
pub fn dispatch(
    policy: Policy,
    lanes: &mut [DeviceLane; 2],
    workload: &dyn Workload,
    ratio: f32,
) -> Result<()> {
    let total = workload.len();
    let [cpu_lane, accel_lane] = lanes;

    match policy {
        Policy::CpuOnly => workload.process_chunk(
            cpu_lane,
            Chunk {
                offset: 0,
                len: total,
            },
        ),
        Policy::AccelOnly => workload.process_chunk(
            accel_lane,
            Chunk {
                offset: 0,
                len: total,
            },
        ),
        Policy::StaticSplit => {
            let (cpu_chunk, accel_chunk) = static_split(total, ratio, accel_lane.ew_local);
            workload.process_chunk(accel_lane, accel_chunk)?;
            workload.process_chunk(cpu_lane, cpu_chunk)
        }
        Policy::Dynamic => {
            let cursor = WorkCursor::new(total);
            std::thread::scope(|scope| {
                let handles = [cpu_lane, accel_lane].map(|lane| {
                    let cursor = &cursor;
                    scope.spawn(move || worker::drain(lane, cursor, workload))
                });
                for handle in handles {
                    handle.join().expect("lane worker panicked")?;
                }
                Ok(())
            })
        }
    }
}
