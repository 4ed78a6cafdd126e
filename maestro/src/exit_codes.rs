//! Stable exit codes for maestro CLI commands.

/// Command succeeded, or the operator exited the loop at a goal prompt.
pub const OK: i32 = 0;
/// Command failed (layout, config, snapshot, or an unrecoverable orchestrator record).
pub const INVALID: i32 = 1;
/// `maestro run` stopped at the cycle limit.
pub const CYCLE_LIMIT: i32 = 2;
