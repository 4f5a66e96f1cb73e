//! Engine configuration.
//!
//! Every field carries a serde default so partially written TOML files (or
//! files written by an older build) still load.

use serde::{Deserialize, Serialize};

/// Lines between progress hook invocations.
pub const DEFAULT_YIELD_EVERY_LINES: u64 = 1000;
/// Bytes handed to the splitter per read when parsing a whole file.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;
/// Interval between live polls of the watched log.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

// ─────────────────────────────────────────────────────────────────────────────
// Top level
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub live: LiveConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parser
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Progress hook cadence, in lines. Zero disables the hook.
    #[serde(default = "default_yield_every_lines")]
    pub yield_every_lines: u64,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Shift synthetic timestamps of untimestamped logs so the earliest
    /// event sits on the timeline origin.
    #[serde(default = "default_true")]
    pub normalize_timeline: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            yield_every_lines: DEFAULT_YIELD_EVERY_LINES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            normalize_timeline: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Live tailing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Log to tail. `None` means the platform's default `Editor.log`.
    #[serde(default)]
    pub log_path: Option<String>,

    /// Directory for checkpoint files. `None` means the user data dir.
    #[serde(default)]
    pub checkpoint_dir: Option<String>,

    #[serde(default = "default_true")]
    pub resume_from_checkpoint: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            log_path: None,
            checkpoint_dir: None,
            resume_from_checkpoint: true,
        }
    }
}

fn default_yield_every_lines() -> u64 {
    DEFAULT_YIELD_EVERY_LINES
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_true() -> bool {
    true
}
