//! Agent turns: the orchestrator's per-cycle decision and a specialist's
//! execution of its delegated task.

pub mod orchestrator;
pub mod specialist;
