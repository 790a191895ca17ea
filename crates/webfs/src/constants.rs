//! WebFS configuration constants.
//!
//! Centralizes defaults for the service and its request pipeline.

/// Name of the background worker thread.
pub const DEFAULT_WORKER_NAME: &str = "WebFileService";

/// Attempts per directory fetch or file task before the last result is surfaced.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Capacity of the notification bus. Slow subscribers skip older messages.
pub const DEFAULT_FLOW_CAPACITY: usize = 256;

/// Name prefix that marks a file as hidden in listings.
pub const HIDDEN_FILE_PREFIX: char = '.';
