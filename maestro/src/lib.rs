//! Autonomous multi-agent orchestration loop.
//!
//! An orchestrator agent emits one directive per cycle; the directive is
//! parsed into typed actions, applied to a persisted snapshot, and may
//! delegate a task to a role-scoped specialist whose own output is parsed and
//! applied the same way. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (parser, state machine, registry,
//!   stagnation guard, snapshot recovery). No I/O.
//! - **[`io`]**: Side effects (filesystem, processes, inference backend,
//!   operator console, prompts). Hidden behind traits where tests substitute
//!   scripted collaborators.
//!
//! Orchestration modules ([`cycle`], [`looping`], [`agents`], [`effects`])
//! combine the two through a [`session::Session`].

pub mod agents;
pub mod core;
pub mod cycle;
pub mod effects;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod session;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
