use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tandem::{config, driver, report};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WorkloadArg {
    VectorAdd,
    Reduce,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Everything on the CPU lane.
    Cpu,
    /// Everything on the accelerator lane.
    Accel,
    /// Fixed-ratio split, one dispatch per lane.
    Static,
    /// Two worker loops racing to drain a shared cursor.
    Dynamic,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AccelArg {
    /// wgpu adapter (fatal if none is present).
    Wgpu,
    /// Second CPU executor standing in for the accelerator.
    Host,
}

#[derive(Debug, Parser)]
#[command(name = "tandem", about = "Cooperative two-lane CPU/accelerator benchmark")]
struct Cli {
    #[arg(value_enum)]
    workload: WorkloadArg,

    /// Total element count per trial.
    #[arg(long, default_value_t = 1 << 20)]
    length: u64,

    /// Measured trials (one report row each).
    #[arg(long, default_value_t = 10)]
    trials: usize,

    /// Leading trials discarded from the report.
    #[arg(long, default_value_t = 2)]
    warmup: usize,

    #[arg(long, value_enum, default_value = "dynamic")]
    policy: PolicyArg,

    /// Accelerator share of the range under --policy static.
    #[arg(long, default_value_t = 0.01)]
    ratio: f32,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long, value_enum, default_value = "wgpu")]
    accel: AccelArg,

    /// Host pool worker count (defaults to logical CPUs).
    #[arg(long)]
    threads: Option<usize>,

    /// Also write the report rows as JSON.
    #[arg(long)]
    json: Option<PathBuf>,
}

fn config_from(cli: &Cli) -> tandem::Result<config::BenchConfig> {
    let mut builder = config::BenchConfig::builder()
        .workload(match cli.workload {
            WorkloadArg::VectorAdd => config::WorkloadKind::VectorAdd,
            WorkloadArg::Reduce => config::WorkloadKind::Reduce,
        })
        .policy(match cli.policy {
            PolicyArg::Cpu => config::Policy::CpuOnly,
            PolicyArg::Accel => config::Policy::AccelOnly,
            PolicyArg::Static => config::Policy::StaticSplit,
            PolicyArg::Dynamic => config::Policy::Dynamic,
        })
        .length(cli.length)
        .trials(cli.trials)
        .warmup(cli.warmup)
        .ratio(cli.ratio)
        .seed(cli.seed)
        .accelerator(match cli.accel {
            AccelArg::Wgpu => config::AcceleratorKind::Wgpu,
            AccelArg::Host => config::AcceleratorKind::Host,
        });
    if let Some(threads) = cli.threads {
        builder = builder.host_threads(threads);
    }
    if let Some(path) = &cli.json {
        builder = builder.json_path(path.clone());
    }
    builder.build()
}

fn run(cli: Cli) -> tandem::Result<()> {
    let config = config_from(&cli)?;
    let json_path = config.json_path.clone();

    let rows = driver::run(config)?;
    for row in &rows {
        println!("{}", row);
    }
    if let Some(path) = json_path {
        report::write_json(&path, &rows)?;
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
