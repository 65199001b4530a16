//! Remux job event bus.
//!
//! Building blocks for observing the engine from the outside:
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`] — the canonical job lifecycle event.

pub mod bus;

pub use bus::{EventBus, JobEvent, JobEventKind};
