//! Stable exit codes for driver CLI commands.

/// Command succeeded and every processed item succeeded.
pub const OK: i32 = 0;
/// Invalid config, unreadable inputs, setup or merge failure, or other errors.
pub const INVALID: i32 = 1;
/// The batch completed but at least one item failed.
pub const ITEM_FAILURES: i32 = 2;
