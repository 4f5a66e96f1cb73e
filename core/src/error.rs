use std::path::PathBuf;

/// Errors surfaced by the engine.
///
/// Per-line problems (unrecognized lines, correlation misses, malformed
/// numbers) never become errors; they are logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("parse cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization failed: {0}")]
    Checkpoint(#[from] serde_json::Error),

    #[error("byte source error: {0}")]
    Source(String),

    #[error("configuration error: {0}")]
    Config(#[from] confy::ConfyError),

    #[error("no Unity Editor log found (looked for {})", .0.display())]
    NoLogPath(PathBuf),
}

pub type Result<T> = std::result::Result<T, EngineError>;
