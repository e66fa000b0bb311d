//! Device backend contract consumed by the scheduling core.
//!
//! A backend is bound to one device at construction; the core holds one
//! backend per lane and never shares buffers or kernels across lanes.

pub mod host;

#[cfg(feature = "gpu")]
pub mod wgpu;

pub use host::HostBackend;

#[cfg(feature = "gpu")]
pub use self::wgpu::WgpuBackend;

use crate::error::Result;

/// Opaque handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) u64);

/// Opaque handle to a compiled kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// One storage-buffer slot in a kernel's bind layout, in binding order.
#[derive(Debug, Clone, Copy)]
pub struct BufferBinding {
    pub read_only: bool,
}

/// A device-neutral compute block. The wgpu backend compiles the WGSL
/// text; the host backend lowers the block to a native routine by `name`
/// and rejects names it does not know at compile time.
#[derive(Debug)]
pub struct KernelSource {
    pub name: &'static str,
    pub entry: &'static str,
    pub wgsl: &'static str,
    /// Storage buffers in binding order; a scalar-params uniform follows
    /// them at the next binding index.
    pub layout: &'static [BufferBinding],
}

/// Scalar arguments passed alongside the buffers of one launch.
#[derive(Debug, Clone, Copy)]
pub struct LaunchArgs<'a> {
    pub buffers: &'a [BufferId],
    /// Valid element count; invocations past it must not write.
    pub len: u32,
    /// Elements folded per invocation in reduction kernels; 1 elsewhere.
    pub group_width: u32,
}

/// Device parallelism as reported by the backend.
#[derive(Debug, Clone, Copy)]
pub struct Parallelism {
    pub preferred_local_width: u64,
    pub compute_units: u64,
}

/// Contract between the scheduling core and a compute device.
///
/// All operations block until device-side completion; the design waits
/// synchronously per phase rather than pipelining, so each phase's cost is
/// directly attributable to one timer.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Compile once per device at setup. A malformed source is a fatal
    /// setup error.
    fn compile(&self, source: &KernelSource) -> Result<KernelId>;

    fn alloc(&self, size_bytes: usize, mode: AccessMode) -> Result<BufferId>;

    fn release(&self, buffer: BufferId);

    fn transfer_in(&self, dst: BufferId, src: &[u8]) -> Result<()>;

    fn transfer_out(&self, src: BufferId, dst: &mut [u8]) -> Result<()>;

    /// Launch `global` invocations in groups of `local` (`global` must be
    /// a multiple of `local`) and wait for completion.
    fn launch(&self, kernel: KernelId, global: u64, local: u64, args: &LaunchArgs) -> Result<()>;

    fn parallelism(&self) -> Parallelism;
}
