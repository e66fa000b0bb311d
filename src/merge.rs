//! Recursive multi-pass reduction over a ping-pong buffer pair.

use crate::backend::{Backend, BufferId, KernelId, LaunchArgs};
use crate::error::Result;
use crate::timing::LaneTimer;

/// Two-slot buffer arena indexed by a front flag toggled each pass. Owned
/// by the chunk's executing worker for the chunk's entire lifetime.
#[derive(Debug)]
pub struct PingPong {
    slots: [BufferId; 2],
    front: usize,
}

impl PingPong {
    pub fn new(front: BufferId, back: BufferId) -> Self {
        Self {
            slots: [front, back],
            front: 0,
        }
    }

    pub fn front(&self) -> BufferId {
        self.slots[self.front]
    }

    pub fn back(&self) -> BufferId {
        self.slots[1 - self.front]
    }

    pub fn toggle(&mut self) {
        self.front = 1 - self.front;
    }

    pub fn release(self, backend: &dyn Backend) {
        backend.release(self.slots[0]);
        backend.release(self.slots[1]);
    }
}

/// Run reduction passes until one kernel launch collapses the range to a
/// single value, which ends up in `pair.back()`. Each pass reduces `len`
/// elements to `groups = ceil(len / (local * group_width))` partial sums;
/// when `groups > 1` the pair toggles and the merge recurses with
/// `len = groups`. Returns the number of passes run.
///
/// A zero-length merge is a no-op that touches no buffers. Termination
/// holds because `groups < len` strictly whenever `len > 1` and the
/// reduction factor exceeds one, so the depth is O(log len).
pub fn collapse(
    backend: &dyn Backend,
    kernel: KernelId,
    pair: &mut PingPong,
    len: u64,
    local: u64,
    group_width: u32,
    timer: &mut LaneTimer,
) -> Result<u32> {
    if len == 0 {
        return Ok(0);
    }
    let fanout = local * group_width as u64;
    debug_assert!(fanout > 1 || len == 1, "reduction factor must shrink the range");

    let groups = len.div_ceil(fanout);
    let global = groups * local;
    let buffers = [pair.front(), pair.back()];
    let args = LaunchArgs {
        buffers: &buffers,
        len: len as u32,
        group_width,
    };
    timer.time_exec(|| backend.launch(kernel, global, local, &args))?;

    if groups > 1 {
        pair.toggle();
        return Ok(1 + collapse(backend, kernel, pair, groups, local, group_width, timer)?);
    }
    Ok(1)
}
