//! CPU-class executor backend.
//!
//! Kernels are lowered by name to native routines and run on a persistent
//! worker pool. Group results travel back over a channel so the launch
//! thread is the only writer of the output buffer.

use super::{
    AccessMode, Backend, BufferId, KernelId, KernelSource, LaunchArgs, Parallelism,
};
use crate::error::{Error, Result};
use crossbeam_channel as channel;
use crossbeam_deque::{Injector, Steal};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of parked worker threads fed through a global injector.
struct HostPool {
    injector: Arc<Injector<Job>>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<WorkerHandle>,
}

struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    unparker: thread::Thread,
}

impl HostPool {
    fn new(threads: usize) -> Result<Self> {
        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(threads);

        for id in 0..threads {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let thread = thread::Builder::new()
                .name(format!("tandem-host-{}", id))
                .spawn(move || run_worker(injector, shutdown))
                .map_err(|e| Error::setup(format!("spawn failed: {}", e)))?;
            let unparker = thread.thread().clone();
            workers.push(WorkerHandle {
                thread: Some(thread),
                unparker,
            });
        }

        Ok(Self {
            injector,
            shutdown,
            workers,
        })
    }

    fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
        for worker in &self.workers {
            worker.unparker.unpark();
        }
    }
}

impl Drop for HostPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in &self.workers {
            worker.unparker.unpark();
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

fn run_worker(injector: Arc<Injector<Job>>, shutdown: Arc<AtomicBool>) {
    let mut backoff = 0u32;
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        match find_job(&injector) {
            Some(job) => {
                backoff = 0;
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
                if result.is_err() {
                    tracing::error!("host kernel task panicked");
                }
            }
            None => backoff_wait(&mut backoff),
        }
    }
}

fn find_job(injector: &Injector<Job>) -> Option<Job> {
    loop {
        match injector.steal() {
            Steal::Success(job) => return Some(job),
            Steal::Empty => return None,
            Steal::Retry => continue,
        }
    }
}

// spin -> yield -> park, same shape as the pool this was lifted from
fn backoff_wait(count: &mut u32) {
    const MAX_SPINS: u32 = 10;
    const MAX_YIELDS: u32 = 20;

    *count += 1;
    if *count <= MAX_SPINS {
        let spins = (*count).min(6);
        for _ in 0..(1 << spins) {
            std::hint::spin_loop();
        }
    } else if *count <= MAX_YIELDS {
        thread::yield_now();
    } else {
        thread::park_timeout(Duration::from_micros(100));
    }
}

/// Native routines the host device knows how to lower.
#[derive(Debug, Clone, Copy)]
enum HostKernel {
    VecAdd,
    ReduceSum,
}

type HostBuffer = Arc<RwLock<Vec<u32>>>;

/// CPU-class backend. One instance per lane; tests may share one across
/// both lanes (buffer ids stay unique).
pub struct HostBackend {
    pool: HostPool,
    buffers: Mutex<HashMap<u64, HostBuffer>>,
    kernels: Mutex<HashMap<u64, HostKernel>>,
    next_id: AtomicU64,
    parallelism: Parallelism,
}

impl HostBackend {
    pub fn new(threads: usize) -> Result<Self> {
        Self::with_parallelism(threads, 256, threads as u64)
    }

    /// Override the reported parallelism; the pool size stays `threads`.
    /// Used by tests to pin lane quanta and launch geometry.
    pub fn with_parallelism(
        threads: usize,
        preferred_local_width: u64,
        compute_units: u64,
    ) -> Result<Self> {
        if threads == 0 {
            return Err(Error::setup("host backend needs at least one thread"));
        }
        Ok(Self {
            pool: HostPool::new(threads)?,
            buffers: Mutex::new(HashMap::new()),
            kernels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            parallelism: Parallelism {
                preferred_local_width,
                compute_units,
            },
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn buffer(&self, id: BufferId) -> Result<HostBuffer> {
        self.buffers
            .lock()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| Error::dispatch(format!("unknown buffer {:?}", id)))
    }

    fn run_vec_add(&self, args: &LaunchArgs) -> Result<()> {
        let [a, b, c] = args.buffers else {
            return Err(Error::dispatch("vec_add expects 3 buffers"));
        };
        let a = self.buffer(*a)?;
        let b = self.buffer(*b)?;
        let c = self.buffer(*c)?;
        let len = args.len as usize;

        let slabs = self.parallelism.compute_units.max(1) as usize;
        let slab_len = len.div_ceil(slabs);
        let (tx, rx) = channel::unbounded::<(usize, Vec<u32>)>();

        let mut expected = 0;
        for slab in 0..slabs {
            let lo = slab * slab_len;
            let hi = len.min(lo + slab_len);
            if lo >= hi {
                break;
            }
            expected += 1;
            let a = Arc::clone(&a);
            let b = Arc::clone(&b);
            let tx = tx.clone();
            self.pool.execute(move || {
                let a = a.read();
                let b = b.read();
                let out: Vec<u32> = a[lo..hi]
                    .iter()
                    .zip(&b[lo..hi])
                    .map(|(&x, &y)| x.wrapping_add(y))
                    .collect();
                let _ = tx.send((lo, out));
            });
        }
        drop(tx);

        let mut c = c.write();
        for _ in 0..expected {
            let (lo, out) = rx
                .recv()
                .map_err(|_| Error::dispatch("host vec_add task failed"))?;
            c[lo..lo + out.len()].copy_from_slice(&out);
        }
        Ok(())
    }

    fn run_reduce_sum(&self, global: u64, local: u64, args: &LaunchArgs) -> Result<()> {
        let [front, back] = args.buffers else {
            return Err(Error::dispatch("reduce_sum expects 2 buffers"));
        };
        let front = self.buffer(*front)?;
        let back = self.buffer(*back)?;
        let len = args.len as usize;
        let span = (local * args.group_width as u64) as usize;
        let groups = (global / local.max(1)) as usize;

        let (tx, rx) = channel::unbounded::<(usize, u32)>();
        for group in 0..groups {
            let lo = group * span;
            let hi = len.min(lo + span);
            let front = Arc::clone(&front);
            let tx = tx.clone();
            self.pool.execute(move || {
                let front = front.read();
                let sum = if lo < hi {
                    front[lo..hi].iter().fold(0u32, |acc, &v| acc.wrapping_add(v))
                } else {
                    0
                };
                let _ = tx.send((group, sum));
            });
        }
        drop(tx);

        let mut back = back.write();
        for _ in 0..groups {
            let (group, sum) = rx
                .recv()
                .map_err(|_| Error::dispatch("host reduce_sum task failed"))?;
            back[group] = sum;
        }
        Ok(())
    }
}

impl Backend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn compile(&self, source: &KernelSource) -> Result<KernelId> {
        let kernel = match source.name {
            "vec_add" => HostKernel::VecAdd,
            "reduce_sum" => HostKernel::ReduceSum,
            other => {
                return Err(Error::setup(format!(
                    "host backend cannot lower kernel '{}'",
                    other
                )))
            }
        };
        let id = self.next_id();
        self.kernels.lock().insert(id, kernel);
        Ok(KernelId(id))
    }

    fn alloc(&self, size_bytes: usize, _mode: AccessMode) -> Result<BufferId> {
        let words = size_bytes.div_ceil(4);
        let id = self.next_id();
        self.buffers
            .lock()
            .insert(id, Arc::new(RwLock::new(vec![0u32; words])));
        Ok(BufferId(id))
    }

    fn release(&self, buffer: BufferId) {
        self.buffers.lock().remove(&buffer.0);
    }

    fn transfer_in(&self, dst: BufferId, src: &[u8]) -> Result<()> {
        let buffer = self.buffer(dst)?;
        let mut words = buffer.write();
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words[..]);
        if src.len() > bytes.len() {
            return Err(Error::dispatch("transfer_in larger than buffer"));
        }
        bytes[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn transfer_out(&self, src: BufferId, dst: &mut [u8]) -> Result<()> {
        let buffer = self.buffer(src)?;
        let words = buffer.read();
        let bytes: &[u8] = bytemuck::cast_slice(&words[..]);
        if dst.len() > bytes.len() {
            return Err(Error::dispatch("transfer_out larger than buffer"));
        }
        dst.copy_from_slice(&bytes[..dst.len()]);
        Ok(())
    }

    fn launch(&self, kernel: KernelId, global: u64, local: u64, args: &LaunchArgs) -> Result<()> {
        debug_assert!(local > 0 && global % local == 0);
        let kernel = *self
            .kernels
            .lock()
            .get(&kernel.0)
            .ok_or_else(|| Error::dispatch(format!("unknown kernel {:?}", kernel)))?;
        match kernel {
            HostKernel::VecAdd => self.run_vec_add(args),
            HostKernel::ReduceSum => self.run_reduce_sum(global, local, args),
        }
    }

    fn parallelism(&self) -> Parallelism {
        self.parallelism
    }
}

impl std::fmt::Debug for HostBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBackend")
            .field("parallelism", &self.parallelism)
            .finish()
    }
}
