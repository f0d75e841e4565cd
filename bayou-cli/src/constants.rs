//! Shared constants for the Bayou CLI.

/// Spinner tick interval in milliseconds.
pub const SPINNER_TICK_MS: u64 = 100;

/// Width of the method-body preview column.
pub const BODY_PREVIEW_WIDTH: usize = 60;
