//! Accelerator backend on wgpu.
//!
//! Every operation waits synchronously for device completion so phase
//! costs land in exactly one timer. Launches larger than the device's
//! per-dimension workgroup limit are sliced with a `base_group` uniform;
//! the scheduling core never sees the slicing.

use super::{
    AccessMode, Backend, BufferId, KernelId, KernelSource, LaunchArgs, Parallelism,
};
use crate::error::{Error, Result};
use futures::executor::block_on;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Workgroup width baked into this crate's WGSL kernels.
pub const ACCEL_LOCAL_WIDTH: u64 = 256;

/// Uniform parameter block matching the `Params` struct in the WGSL
/// kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct KernelParams {
    len: u32,
    group_width: u32,
    /// First workgroup index of this dispatch slice; non-zero only when a
    /// launch is split across several dispatches.
    base_group: u32,
    _pad: u32,
}

struct CompiledKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    kernels: Mutex<HashMap<u64, CompiledKernel>>,
    buffers: Mutex<HashMap<u64, wgpu::Buffer>>,
    next_id: AtomicU64,
    max_groups_per_dispatch: u32,
}

impl WgpuBackend {
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| Error::setup("no accelerator adapter found"))?;

        let adapter_name = adapter.get_info().name;

        let (device, queue) = block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("tandem-accel-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| Error::setup(format!("failed to request device: {}", e)))?;

        let max_groups_per_dispatch = device.limits().max_compute_workgroups_per_dimension;

        Ok(Self {
            device,
            queue,
            adapter_name,
            kernels: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_groups_per_dispatch,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn wait(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

impl Backend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn compile(&self, source: &KernelSource) -> Result<KernelId> {
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.name),
                source: wgpu::ShaderSource::Wgsl(source.wgsl.into()),
            });

        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = source
            .layout
            .iter()
            .enumerate()
            .map(|(i, binding)| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: binding.read_only,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        // Scalar params ride in a uniform at the binding after the buffers.
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: source.layout.len() as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(source.name),
                    entries: &entries,
                });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(source.name),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(source.name),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: source.entry,
            });

        let id = self.next_id();
        self.kernels.lock().insert(
            id,
            CompiledKernel {
                pipeline,
                bind_group_layout,
            },
        );
        Ok(KernelId(id))
    }

    fn alloc(&self, size_bytes: usize, _mode: AccessMode) -> Result<BufferId> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tandem-device-buffer"),
            size: size_bytes.next_multiple_of(4) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let id = self.next_id();
        self.buffers.lock().insert(id, buffer);
        Ok(BufferId(id))
    }

    fn release(&self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.lock().remove(&buffer.0) {
            buffer.destroy();
        }
    }

    fn transfer_in(&self, dst: BufferId, src: &[u8]) -> Result<()> {
        let buffers = self.buffers.lock();
        let buffer = buffers
            .get(&dst.0)
            .ok_or_else(|| Error::dispatch(format!("unknown buffer {:?}", dst)))?;
        if src.len() as u64 > buffer.size() {
            return Err(Error::dispatch("transfer_in larger than buffer"));
        }
        self.queue.write_buffer(buffer, 0, src);
        drop(buffers);
        self.queue.submit(None::<wgpu::CommandBuffer>);
        self.wait();
        Ok(())
    }

    fn transfer_out(&self, src: BufferId, dst: &mut [u8]) -> Result<()> {
        let buffers = self.buffers.lock();
        let buffer = buffers
            .get(&src.0)
            .ok_or_else(|| Error::dispatch(format!("unknown buffer {:?}", src)))?;
        if dst.len() as u64 > buffer.size() {
            return Err(Error::dispatch("transfer_out larger than buffer"));
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tandem-staging-buffer"),
            size: dst.len().next_multiple_of(4) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tandem-readback-encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, staging.size());
        drop(buffers);
        self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = crossbeam_channel::bounded(1);
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        self.wait();
        rx.recv()
            .map_err(|_| Error::dispatch("readback map dropped"))?
            .map_err(|e| Error::dispatch(format!("readback map failed: {:?}", e)))?;

        {
            let view = staging.slice(..).get_mapped_range();
            dst.copy_from_slice(&view[..dst.len()]);
        }
        staging.unmap();
        Ok(())
    }

    fn launch(&self, kernel: KernelId, global: u64, local: u64, args: &LaunchArgs) -> Result<()> {
        debug_assert!(local > 0 && global % local == 0);
        if global == 0 {
            return Ok(());
        }
        let groups_total = (global / local) as u32;

        let kernels = self.kernels.lock();
        let kernel = kernels
            .get(&kernel.0)
            .ok_or_else(|| Error::dispatch(format!("unknown kernel {:?}", kernel)))?;
        let buffers = self.buffers.lock();
        let mut storage = Vec::with_capacity(args.buffers.len());
        for id in args.buffers {
            storage.push(
                buffers
                    .get(&id.0)
                    .ok_or_else(|| Error::dispatch(format!("unknown buffer {:?}", id)))?,
            );
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tandem-launch-encoder"),
            });

        // One pass per slice; uniforms are per-slice buffers so a single
        // submit covers the whole launch.
        let mut uniforms = Vec::new();
        let mut base_group = 0u32;
        while base_group < groups_total {
            let slice_groups = (groups_total - base_group).min(self.max_groups_per_dispatch);
            let params = KernelParams {
                len: args.len,
                group_width: args.group_width,
                base_group,
                _pad: 0,
            };
            let uniform = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tandem-params"),
                size: std::mem::size_of::<KernelParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.queue.write_buffer(&uniform, 0, bytemuck::bytes_of(&params));
            uniforms.push((uniform, slice_groups));
            base_group += slice_groups;
        }

        for (uniform, slice_groups) in &uniforms {
            let mut entries: Vec<wgpu::BindGroupEntry> = storage
                .iter()
                .enumerate()
                .map(|(i, buffer)| wgpu::BindGroupEntry {
                    binding: i as u32,
                    resource: buffer.as_entire_binding(),
                })
                .collect();
            entries.push(wgpu::BindGroupEntry {
                binding: storage.len() as u32,
                resource: uniform.as_entire_binding(),
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tandem-launch-bind-group"),
                layout: &kernel.bind_group_layout,
                entries: &entries,
            });

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("tandem-compute-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(*slice_groups, 1, 1);
        }

        drop(buffers);
        drop(kernels);
        self.queue.submit(Some(encoder.finish()));
        self.wait();
        Ok(())
    }

    fn parallelism(&self) -> Parallelism {
        // wgpu exposes no compute-unit count; the accelerator lane sizes
        // its claims by the fixed quantum, not by width * units.
        Parallelism {
            preferred_local_width: ACCEL_LOCAL_WIDTH,
            compute_units: 1,
        }
    }
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter_name)
            .finish()
    }
}
