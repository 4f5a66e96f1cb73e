//! Resumable parse checkpoints and where they are kept.

use std::fs;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::ParserState;
use crate::error::Result;

/// Everything needed to resume a parse: where to read from and the full
/// correlation state at that point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_processed_line: u64,
    /// Offset of the first byte not yet consumed as a complete line.
    pub byte_offset: u64,
    pub parser_state: ParserState,
}

impl Checkpoint {
    pub fn is_fresh(&self) -> bool {
        self.byte_offset == 0 && self.last_processed_line == 0
    }
}

/// Storage for checkpoints, keyed by log identity (usually its path).
pub trait CheckpointStore: Send {
    fn load(&self, key: &str) -> Option<Checkpoint>;
    fn save(&mut self, key: &str, checkpoint: &Checkpoint) -> Result<()>;
    fn clear(&mut self, key: &str) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps checkpoints as serialized JSON so a load always yields an
/// independent copy, the same as reading one back from disk.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: HashMap<String, String>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, key: &str) -> Option<Checkpoint> {
        let raw = self.entries.get(key)?;
        match serde_json::from_str(raw) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!(error = %e, key, "Discarding unreadable checkpoint");
                None
            }
        }
    }

    fn save(&mut self, key: &str, checkpoint: &Checkpoint) -> Result<()> {
        let raw = serde_json::to_string(checkpoint)?;
        self.entries.insert(key.to_string(), raw);
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON file store
// ─────────────────────────────────────────────────────────────────────────────

const CHECKPOINT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    /// Format version (increment when ParserState changes shape)
    version: u32,
    key: String,
    checkpoint: Checkpoint,
}

/// One pretty-printed JSON file per log inside a directory.
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    dir: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data dir>/editorlog/checkpoints`, if the platform has a data dir.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("editorlog").join("checkpoints"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for `key`. Keys are paths, so everything outside `[A-Za-z0-9._-]`
    /// is folded to `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') { c } else { '_' })
            .collect();
        if name.len() > 120 {
            name = name.split_off(name.len() - 120);
        }
        self.dir.join(format!("{name}.checkpoint.json"))
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self, key: &str) -> Option<Checkpoint> {
        let path = self.path_for(key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CheckpointFile>(&content) {
            Ok(file) if file.version == CHECKPOINT_VERSION && file.key == key => Some(file.checkpoint),
            Ok(file) => {
                tracing::info!(
                    version = file.version,
                    path = %path.display(),
                    "Checkpoint version or key mismatch, starting over"
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to parse checkpoint, starting over");
                None
            }
        }
    }

    fn save(&mut self, key: &str, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let file = CheckpointFile {
            version: CHECKPOINT_VERSION,
            key: key.to_string(),
            checkpoint: checkpoint.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(self.path_for(key), content)?;
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
