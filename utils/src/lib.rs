//! Shared utilities for the fcs crates.
//!
//! - **`diff`**: line diff of a failed assertion's result against its expectation
//! - **`display`**: sanitizing engine-supplied text before it reaches a terminal

pub mod diff;
pub mod display;

pub use diff::{DiffStats, diff_stats, format_value_diff};
pub use display::sanitize_display_text;
