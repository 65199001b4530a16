//! The remux job orchestration and process execution engine.
//!
//! Many logical jobs are multiplexed over a small number of worker slots,
//! each slot driving exactly one OS process. [`JobManager`] is the top-level
//! orchestrator: it validates submissions through the core command builder,
//! runs admission control (concurrency slots + the [`governor`] resource
//! budget), spawns processes through the [`process`] capability seam, tracks
//! lifecycle state, and guarantees cleanup on every terminal path.
//!
//! There is no global registry — construct as many independent
//! [`JobManager`] instances as you need, each with its own injected
//! dependencies.

pub mod config;
pub mod error;
pub mod executor;
pub mod governor;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod probe;
pub mod process;
pub mod record;
pub mod scratch;
pub mod tracker;

pub use config::EngineConfig;
pub use error::SubmitError;
pub use job::{Job, ResourceEstimate};
pub use manager::{EngineDeps, JobManager};
pub use record::{JobFailure, JobId, JobRecord};

pub use remux_core::command::{GlobalOptions, InputSpec, OutputSpec, StdioMode};
pub use remux_core::progress::Progress;
pub use remux_core::scheduling::JobStatus;
