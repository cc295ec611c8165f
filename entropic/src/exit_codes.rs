//! Stable exit codes for `entropic` commands.

/// Command succeeded, or the run loop reached a done verdict.
pub const OK: i32 = 0;
/// Invalid workspace, state or configuration, or any other error.
pub const INVALID: i32 = 1;
/// `entropic run` stopped at `max_iters` without a done verdict.
pub const INCOMPLETE: i32 = 2;
/// `entropic check` found the command blocked by the safety policy.
pub const BLOCKED: i32 = 3;
