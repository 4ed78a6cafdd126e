//! Deterministic, pure logic shared by the orchestration loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures (timestamps are passed in) and return deterministic outputs
//! suitable for tests.

pub mod actions;
pub mod bugs;
pub mod lifecycle;
pub mod parser;
pub mod precedence;
pub mod registry;
pub mod roles;
pub mod sandbox;
pub mod snapshot;
pub mod stagnation;
pub mod types;
