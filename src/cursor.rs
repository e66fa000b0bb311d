//! Shared work cursor drained by the two device lanes.

use parking_lot::Mutex;

/// A claimed, disjoint sub-range of the total work. Owned by the claiming
/// lane until execution of the chunk completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug)]
struct CursorState {
    remaining: u64,
    next_offset: u64,
}

/// Monotonically-draining work range shared by exactly two worker loops.
///
/// `remaining` only decreases, `next_offset` only increases, and their sum
/// stays equal to the total for the lifetime of one trial. Both fields are
/// updated as a pair under one lock, held only across the claim arithmetic
/// and never across device I/O.
#[derive(Debug)]
pub struct WorkCursor {
    total: u64,
    state: Mutex<CursorState>,
}

impl WorkCursor {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            state: Mutex::new(CursorState {
                remaining: total,
                next_offset: 0,
            }),
        }
    }

    /// Claim up to `quantum` elements. The cursor clips the claim to the
    /// true remaining work; callers never over-claim across the boundary.
    /// Returns `None` once the range is drained (the caller's terminal
    /// state) and for a zero quantum.
    pub fn claim(&self, quantum: u64) -> Option<Chunk> {
        if quantum == 0 {
            return None;
        }
        let mut state = self.state.lock();
        if state.remaining == 0 {
            return None;
        }
        let len = quantum.min(state.remaining);
        let offset = state.next_offset;
        state.next_offset += len;
        state.remaining -= len;
        Some(Chunk { offset, len })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn remaining(&self) -> u64 {
        self.state.lock().remaining
    }
}
