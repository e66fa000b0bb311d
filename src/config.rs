use crate::error::{Error, Result};

/// How the total element range is divided between the two device lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Everything on the CPU lane.
    CpuOnly,
    /// Everything on the accelerator lane.
    AccelOnly,
    /// Fixed ratio split, one dispatch per lane.
    StaticSplit,
    /// Two worker loops racing to drain a shared cursor.
    Dynamic,
}

impl Policy {
    /// Scheme token used in report rows.
    pub fn token(&self) -> &'static str {
        match self {
            Policy::CpuOnly => "c",
            Policy::AccelOnly => "g",
            Policy::StaticSplit => "cg-s",
            Policy::Dynamic => "cg-d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    VectorAdd,
    Reduce,
}

impl WorkloadKind {
    pub fn name(&self) -> &'static str {
        match self {
            WorkloadKind::VectorAdd => "VectorAdd",
            WorkloadKind::Reduce => "Reduce",
        }
    }
}

/// Which backend drives the accelerator lane. `Host` runs the lane on a
/// second CPU executor so the full policy matrix works without a GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceleratorKind {
    Wgpu,
    Host,
}

/// Reduction inputs are below 256, so sums up to this length stay exact in
/// the device's 32-bit arithmetic.
pub const MAX_REDUCE_LEN: u64 = 16_000_000;

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub workload: WorkloadKind,
    pub policy: Policy,
    /// Total element count per trial.
    pub length: u64,
    /// Measured trials, reported one row each.
    pub trials: usize,
    /// Leading trials discarded from the report.
    pub warmup: usize,
    /// Fraction of the range handed to the accelerator under StaticSplit.
    pub ratio: f32,
    pub seed: u64,
    pub accelerator: AcceleratorKind,
    /// Host pool worker count; defaults to the machine's logical CPUs.
    pub host_threads: Option<usize>,
    pub json_path: Option<std::path::PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            workload: WorkloadKind::VectorAdd,
            policy: Policy::CpuOnly,
            length: 1 << 20,
            trials: 10,
            warmup: 2,
            ratio: 0.01,
            seed: 0,
            accelerator: AcceleratorKind::Wgpu,
            host_threads: None,
            json_path: None,
        }
    }
}

impl BenchConfig {
    pub fn builder() -> BenchConfigBuilder {
        BenchConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            return Err(Error::config("length must be > 0"));
        }
        if self.trials == 0 {
            return Err(Error::config("trials must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.ratio) {
            return Err(Error::config("ratio must be in [0, 1]"));
        }
        if self.workload == WorkloadKind::Reduce && self.length > MAX_REDUCE_LEN {
            return Err(Error::config(format!(
                "reduce length capped at {} to keep 32-bit sums exact",
                MAX_REDUCE_LEN
            )));
        }
        if let Some(n) = self.host_threads {
            if n == 0 {
                return Err(Error::config("host_threads must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("host_threads too large (max 1024)"));
            }
        }
        Ok(())
    }

    pub fn host_worker_threads(&self) -> usize {
        self.host_threads.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Debug, Default)]
pub struct BenchConfigBuilder {
    config: BenchConfig,
}

impl BenchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BenchConfig::default(),
        }
    }

    pub fn workload(mut self, workload: WorkloadKind) -> Self {
        self.config.workload = workload;
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn length(mut self, length: u64) -> Self {
        self.config.length = length;
        self
    }

    pub fn trials(mut self, trials: usize) -> Self {
        self.config.trials = trials;
        self
    }

    pub fn warmup(mut self, warmup: usize) -> Self {
        self.config.warmup = warmup;
        self
    }

    pub fn ratio(mut self, ratio: f32) -> Self {
        self.config.ratio = ratio;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn accelerator(mut self, kind: AcceleratorKind) -> Self {
        self.config.accelerator = kind;
        self
    }

    pub fn host_threads(mut self, n: usize) -> Self {
        self.config.host_threads = Some(n);
        self
    }

    pub fn json_path<P: Into<std::path::PathBuf>>(mut self, path: P) -> Self {
        self.config.json_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<BenchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
