//! Aggregate resource admission control.
//!
//! The governor tracks memory/CPU allocated to all running jobs against a
//! configured budget, independent of the raw concurrency-slot count: a job
//! with a free slot can still be deferred. Deferred jobs stay queued and are
//! re-evaluated by the manager whenever any running job completes.

use std::sync::Mutex;

use crate::job::ResourceEstimate;

/// Aggregate budget across all running jobs. CPU percent is per-core
/// (one core = 100).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceBudget {
    pub max_memory_bytes: u64,
    pub max_cpu_percent: f32,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            max_memory_bytes: 16 * 1024 * 1024 * 1024,
            max_cpu_percent: 1600.0,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The job fits within the remaining budget.
    Admit,
    /// The job would exceed the budget; keep it queued.
    Defer { reason: String },
}

impl Admission {
    pub fn is_admit(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

#[derive(Debug, Default)]
struct Allocated {
    memory_bytes: u64,
    cpu_percent: f32,
    jobs: usize,
}

/// Tracks aggregate allocation and answers admit/defer.
///
/// `reserve` and `release` are called from inside the manager's dispatch and
/// completion sequences, so the counters can never drift from the set of
/// running jobs.
#[derive(Debug)]
pub struct ResourceGovernor {
    budget: ResourceBudget,
    allocated: Mutex<Allocated>,
}

impl ResourceGovernor {
    pub fn new(budget: ResourceBudget) -> Self {
        Self {
            budget,
            allocated: Mutex::new(Allocated::default()),
        }
    }

    /// Would `estimate` fit within the remaining budget right now?
    pub fn check_available(&self, estimate: &ResourceEstimate) -> Admission {
        let allocated = self.lock();
        if allocated.memory_bytes + estimate.memory_bytes > self.budget.max_memory_bytes {
            return Admission::Defer {
                reason: format!(
                    "memory budget exhausted: {} + {} > {}",
                    allocated.memory_bytes, estimate.memory_bytes, self.budget.max_memory_bytes
                ),
            };
        }
        if allocated.cpu_percent + estimate.cpu_percent > self.budget.max_cpu_percent {
            return Admission::Defer {
                reason: format!(
                    "cpu budget exhausted: {} + {} > {}",
                    allocated.cpu_percent, estimate.cpu_percent, self.budget.max_cpu_percent
                ),
            };
        }
        Admission::Admit
    }

    /// Account for a dispatched job.
    pub fn reserve(&self, estimate: &ResourceEstimate) {
        let mut allocated = self.lock();
        allocated.memory_bytes += estimate.memory_bytes;
        allocated.cpu_percent += estimate.cpu_percent;
        allocated.jobs += 1;
    }

    /// Return a finished job's allocation to the pool.
    pub fn release(&self, estimate: &ResourceEstimate) {
        let mut allocated = self.lock();
        allocated.memory_bytes = allocated.memory_bytes.saturating_sub(estimate.memory_bytes);
        allocated.cpu_percent = (allocated.cpu_percent - estimate.cpu_percent).max(0.0);
        allocated.jobs = allocated.jobs.saturating_sub(1);
        // Reset float drift once nothing is running.
        if allocated.jobs == 0 {
            allocated.memory_bytes = 0;
            allocated.cpu_percent = 0.0;
        }
    }

    /// Currently allocated memory in bytes.
    pub fn allocated_memory_bytes(&self) -> u64 {
        self.lock().memory_bytes
    }

    /// Currently allocated CPU percent.
    pub fn allocated_cpu_percent(&self) -> f32 {
        self.lock().cpu_percent
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Allocated> {
        self.allocated.lock().expect("governor lock poisoned")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
