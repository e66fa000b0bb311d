pub use crate::backend::{Backend, HostBackend};
pub use crate::config::{
    AcceleratorKind, BenchConfig, BenchConfigBuilder, Policy, WorkloadKind,
};
pub use crate::cursor::{Chunk, WorkCursor};
pub use crate::driver::Bench;
pub use crate::error::{Error, Result};
pub use crate::lane::{DeviceLane, LaneKind};
pub use crate::report::TrialReport;

#[cfg(feature = "gpu")]
pub use crate::backend::WgpuBackend;
