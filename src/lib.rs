//! TANDEM - cooperative two-lane benchmark for data-parallel workloads.
//!
//! Runs elementwise vector addition and tree reduction across a CPU-class
//! lane and an accelerator-class lane under four scheduling policies, and
//! reports data-movement and execution time per trial.
//!
//! # Quick Start
//!
//! ```no_run
//! use tandem::prelude::*;
//!
//! let config = BenchConfig::builder()
//!     .workload(WorkloadKind::Reduce)
//!     .policy(Policy::Dynamic)
//!     .length(200_000)
//!     .accelerator(AcceleratorKind::Host)
//!     .build()
//!     .unwrap();
//!
//! for row in tandem::driver::run(config).unwrap() {
//!     println!("{}", row);
//! }
//! ```
//!
//! # Design
//!
//! - **Shared work cursor**: one mutex-guarded `{remaining, next_offset}`
//!   pair, drained by exactly two worker loops under the dynamic policy.
//! - **Heterogeneity-aware quanta**: the accelerator claims a fixed large
//!   quantum to amortize dispatch latency; the CPU lane claims work sized
//!   to its own parallelism.
//! - **Recursive reduction merge**: ping-pong buffer passes until one
//!   launch collapses a chunk to a single value.
//! - **Synchronous phases**: every transfer and launch waits for device
//!   completion, so phase costs are directly attributable to one timer.

#![warn(missing_debug_implementations)]

pub mod backend;
pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod lane;
pub mod merge;
pub mod partition;
pub mod prelude;
pub mod report;
pub mod timing;
pub mod worker;
pub mod workload;

pub use config::{AcceleratorKind, BenchConfig, BenchConfigBuilder, Policy, WorkloadKind};
pub use cursor::{Chunk, WorkCursor};
pub use error::{Error, Result};
pub use report::TrialReport;
