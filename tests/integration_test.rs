use rand::SeedableRng;
use rand_pcg::Pcg64;
use std::sync::Arc;
use tandem::backend::{Backend, HostBackend};
use tandem::config::{AcceleratorKind, BenchConfig, Policy, WorkloadKind};
use tandem::lane::{DeviceLane, LaneKind};
use tandem::workload::{self, Workload};
use tandem::{driver, partition};

/// Two host-backed lanes: a CPU lane with `cpu_units * 256` quantum and an
/// accelerator-class lane whose backend reports `accel_width` as its
/// parallel width.
fn host_lanes(
    workload: &dyn Workload,
    cpu_units: u64,
    accel_width: u64,
) -> [DeviceLane; 2] {
    let cpu: Arc<dyn Backend> =
        Arc::new(HostBackend::with_parallelism(2, 256, cpu_units).unwrap());
    let accel: Arc<dyn Backend> =
        Arc::new(HostBackend::with_parallelism(2, accel_width, 1).unwrap());
    let cpu_kernel = cpu.compile(workload.kernel()).unwrap();
    let accel_kernel = accel.compile(workload.kernel()).unwrap();
    [
        DeviceLane::new(LaneKind::Cpu, cpu, cpu_kernel),
        DeviceLane::new(LaneKind::Accelerator, accel, accel_kernel),
    ]
}

fn run_policy(kind: WorkloadKind, policy: Policy, length: u64, ratio: f32) -> bool {
    let mut workload = workload::build(kind, length);
    workload.prepare(&mut Pcg64::seed_from_u64(42));
    let mut lanes = host_lanes(workload.as_ref(), 16, 4);
    partition::dispatch(policy, &mut lanes, workload.as_ref(), ratio).unwrap();
    let parts = [
        std::mem::take(&mut lanes[0].acc),
        std::mem::take(&mut lanes[1].acc),
    ];
    workload.verify(parts)
}

#[test]
fn vector_add_is_correct_under_every_policy() {
    for policy in [
        Policy::CpuOnly,
        Policy::AccelOnly,
        Policy::StaticSplit,
        Policy::Dynamic,
    ] {
        assert!(
            run_policy(WorkloadKind::VectorAdd, policy, 1000, 0.3),
            "policy {:?} produced a wrong elementwise result",
            policy
        );
    }
}

#[test]
fn reduce_is_correct_under_every_policy() {
    for policy in [
        Policy::CpuOnly,
        Policy::AccelOnly,
        Policy::StaticSplit,
        Policy::Dynamic,
    ] {
        assert!(
            run_policy(WorkloadKind::Reduce, policy, 1000, 0.3),
            "policy {:?} produced a wrong reduction",
            policy
        );
    }
}

#[test]
fn reduce_handles_edge_lengths() {
    for length in [1u64, 2, 100_003] {
        assert!(run_policy(WorkloadKind::Reduce, Policy::Dynamic, length, 0.5));
        assert!(run_policy(WorkloadKind::Reduce, Policy::CpuOnly, length, 0.5));
    }
}

#[test]
fn static_split_covers_every_index_exactly_once() {
    // Accel width 4, ratio 0.3 of 1000: the accelerator lane gets exactly
    // 300 elements, the CPU lane the remaining 700.
    let mut workload = workload::build(WorkloadKind::VectorAdd, 1000);
    workload.prepare(&mut Pcg64::seed_from_u64(7));
    let mut lanes = host_lanes(workload.as_ref(), 16, 4);
    partition::dispatch(Policy::StaticSplit, &mut lanes, workload.as_ref(), 0.3).unwrap();

    let cpu_elems: u64 = lanes[0].acc.segments.iter().map(|s| s.values.len() as u64).sum();
    let accel_elems: u64 = lanes[1].acc.segments.iter().map(|s| s.values.len() as u64).sum();
    assert_eq!(accel_elems, 300);
    assert_eq!(cpu_elems, 700);

    let parts = [
        std::mem::take(&mut lanes[0].acc),
        std::mem::take(&mut lanes[1].acc),
    ];
    assert!(workload.verify(parts));
}

#[test]
fn dynamic_race_drains_cursor_exactly() {
    // Quanta 81920 (accelerator) and 4096 (CPU lane: 256 * 16) over
    // 200000 elements: the union of claims is the whole range, regardless
    // of interleaving.
    let mut workload = workload::build(WorkloadKind::VectorAdd, 200_000);
    workload.prepare(&mut Pcg64::seed_from_u64(9));
    let mut lanes = host_lanes(workload.as_ref(), 16, 256);
    assert_eq!(lanes[0].quantum, 4096);
    assert_eq!(lanes[1].quantum, 81_920);

    partition::dispatch(Policy::Dynamic, &mut lanes, workload.as_ref(), 0.0).unwrap();

    let claimed: u64 = lanes
        .iter()
        .flat_map(|lane| lane.acc.segments.iter())
        .map(|s| s.values.len() as u64)
        .sum();
    assert_eq!(claimed, 200_000);
    assert!(lanes[0].timer.chunks() + lanes[1].timer.chunks() >= 3);

    let parts = [
        std::mem::take(&mut lanes[0].acc),
        std::mem::take(&mut lanes[1].acc),
    ];
    assert!(workload.verify(parts));
}

#[test]
fn driver_reports_one_row_per_measured_trial() {
    let config = BenchConfig::builder()
        .workload(WorkloadKind::Reduce)
        .policy(Policy::Dynamic)
        .length(50_000)
        .trials(3)
        .warmup(2)
        .accelerator(AcceleratorKind::Host)
        .host_threads(2)
        .build()
        .unwrap();

    let rows = driver::run(config).unwrap();
    assert_eq!(rows.len(), 3);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.trial, i);
        assert_eq!(row.workload, "Reduce");
        assert_eq!(row.policy, "cg-d");
        assert_eq!(row.length, 50_000);
        assert!(row.total_ms >= 0.0);
        assert!(row.data_ms >= 0.0);
        assert!(row.exec_ms >= 0.0);
    }
}

#[test]
fn driver_rejects_invalid_config_before_running() {
    let config = BenchConfig {
        length: 0,
        ..BenchConfig::default()
    };
    assert!(driver::Bench::new(config).is_err());
}
