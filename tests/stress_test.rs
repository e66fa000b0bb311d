use rand::SeedableRng;
use rand_pcg::Pcg64;
use std::sync::Arc;
use tandem::backend::{Backend, HostBackend};
use tandem::config::{Policy, WorkloadKind};
use tandem::cursor::WorkCursor;
use tandem::lane::{DeviceLane, LaneKind};
use tandem::partition;
use tandem::workload;

#[test]
fn concurrent_claims_never_overlap_or_leak() {
    // Two threads hammering one cursor with unequal quanta; every element
    // must be claimed exactly once.
    for _ in 0..20 {
        let cursor = WorkCursor::new(100_000);
        let (a, b) = std::thread::scope(|scope| {
            let worker = |quantum: u64| {
                let cursor = &cursor;
                move || {
                    let mut chunks = Vec::new();
                    while let Some(chunk) = cursor.claim(quantum) {
                        chunks.push(chunk);
                    }
                    chunks
                }
            };
            let a = scope.spawn(worker(1313));
            let b = scope.spawn(worker(77));
            (a.join().unwrap(), b.join().unwrap())
        });

        let mut chunks: Vec<_> = a.into_iter().chain(b).collect();
        chunks.sort_by_key(|c| c.offset);
        let mut next = 0;
        for chunk in &chunks {
            assert_eq!(chunk.offset, next, "gap or overlap in claimed ranges");
            assert!(chunk.len > 0);
            next += chunk.len;
        }
        assert_eq!(next, 100_000);
        assert_eq!(cursor.remaining(), 0);
    }
}

#[test]
fn tiny_quanta_race_stays_correct() {
    // Deliberately absurd quanta maximize interleaving on the cursor.
    for trial in 0..10 {
        let mut workload = workload::build(WorkloadKind::Reduce, 10_000);
        workload.prepare(&mut Pcg64::seed_from_u64(trial));

        let cpu: Arc<dyn Backend> = Arc::new(HostBackend::new(2).unwrap());
        let accel: Arc<dyn Backend> = Arc::new(HostBackend::new(2).unwrap());
        let cpu_kernel = cpu.compile(workload.kernel()).unwrap();
        let accel_kernel = accel.compile(workload.kernel()).unwrap();
        let mut lanes = [
            DeviceLane::new(LaneKind::Cpu, cpu, cpu_kernel).with_quantum(7),
            DeviceLane::new(LaneKind::Accelerator, accel, accel_kernel)
                .with_quantum(13)
                .with_reduce_geometry(1, Some(2)),
        ];

        partition::dispatch(Policy::Dynamic, &mut lanes, workload.as_ref(), 0.0).unwrap();

        let parts = [
            std::mem::take(&mut lanes[0].acc),
            std::mem::take(&mut lanes[1].acc),
        ];
        assert!(workload.verify(parts), "trial {} summed wrong", trial);
    }
}

#[test]
fn repeated_trials_reuse_lanes_cleanly() {
    // Lanes are created once and reset per trial; state must not bleed
    // between trials.
    let mut workload = workload::build(WorkloadKind::VectorAdd, 5_000);
    let cpu: Arc<dyn Backend> = Arc::new(HostBackend::with_parallelism(2, 64, 4).unwrap());
    let accel: Arc<dyn Backend> = Arc::new(HostBackend::with_parallelism(2, 64, 1).unwrap());
    let cpu_kernel = cpu.compile(workload.kernel()).unwrap();
    let accel_kernel = accel.compile(workload.kernel()).unwrap();
    let mut lanes = [
        DeviceLane::new(LaneKind::Cpu, cpu, cpu_kernel),
        DeviceLane::new(LaneKind::Accelerator, accel, accel_kernel).with_quantum(1_000),
    ];

    for trial in 0..8 {
        workload.prepare(&mut Pcg64::seed_from_u64(trial));
        for lane in &mut lanes {
            lane.reset();
        }
        partition::dispatch(Policy::Dynamic, &mut lanes, workload.as_ref(), 0.0).unwrap();
        let parts = [
            std::mem::take(&mut lanes[0].acc),
            std::mem::take(&mut lanes[1].acc),
        ];
        assert!(workload.verify(parts), "trial {} diverged", trial);
    }
}
