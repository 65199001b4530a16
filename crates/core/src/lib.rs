//! Pure, synchronous building blocks for the remux engine.
//!
//! This crate has zero internal dependencies and no async code so it can be
//! used by the engine, the worker binary, and any future CLI tooling alike.
//! Anything that touches the OS (spawning, signalling, filesystem scratch
//! space) lives in `remux-engine`.

pub mod command;
pub mod error;
pub mod preset;
pub mod probe;
pub mod progress;
pub mod scheduling;

pub use error::ValidationError;
