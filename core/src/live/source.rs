//! Byte sources a live session can tail.

use std::future::Future;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::context::default_editor_log_path;
use crate::error::{EngineError, Result};

/// Bytes read from `start_offset` up to the end of the file at read time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub bytes: Vec<u8>,
    pub start_offset: u64,
    pub end_offset: u64,
    pub file_size: u64,
    /// The source was truncated or replaced since the previous read.
    pub reset: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub size: u64,
    pub path: Option<PathBuf>,
}

/// A growing file, seen as byte ranges.
pub trait ByteSource: Send + 'static {
    /// Start watching `path`, or the platform default log when `None`.
    /// Returns the path actually watched.
    fn watch(&mut self, path: Option<PathBuf>) -> impl Future<Output = Result<PathBuf>> + Send;

    fn unwatch(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn read_range(&mut self, start: u64) -> impl Future<Output = Result<ByteRange>> + Send;

    fn info(&self) -> impl Future<Output = Result<SourceInfo>> + Send;
}

// ─────────────────────────────────────────────────────────────────────────────
// Local file
// ─────────────────────────────────────────────────────────────────────────────

/// Reads a file on the local disk with tokio.
#[derive(Debug, Default)]
pub struct LocalFileSource {
    path: Option<PathBuf>,
    last_position: u64,
    last_size: u64,
}

impl LocalFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_position(&self) -> u64 {
        self.last_position
    }

    fn watched(&self) -> Result<&PathBuf> {
        self.path
            .as_ref()
            .ok_or_else(|| EngineError::Source("no file is being watched".to_string()))
    }
}

impl ByteSource for LocalFileSource {
    async fn watch(&mut self, path: Option<PathBuf>) -> Result<PathBuf> {
        let path = match path.or_else(default_editor_log_path) {
            Some(p) => p,
            None => return Err(EngineError::NoLogPath(PathBuf::from("Editor.log"))),
        };
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(EngineError::NoLogPath(path));
        }
        tracing::info!(path = %path.display(), "Watching log file");
        self.path = Some(path.clone());
        self.last_position = 0;
        self.last_size = 0;
        Ok(path)
    }

    async fn unwatch(&mut self) -> Result<()> {
        if let Some(path) = self.path.take() {
            tracing::info!(path = %path.display(), "Stopped watching log file");
        }
        Ok(())
    }

    async fn read_range(&mut self, start: u64) -> Result<ByteRange> {
        let path = self.watched()?.clone();
        let mut file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();

        let reset = size < self.last_size || start > size;
        self.last_size = size;
        if reset {
            tracing::debug!(size, start, "File shrank since last read");
            self.last_position = 0;
            return Ok(ByteRange {
                bytes: Vec::new(),
                start_offset: start,
                end_offset: start,
                file_size: size,
                reset: true,
            });
        }

        file.seek(SeekFrom::Start(start)).await?;
        let mut bytes = Vec::with_capacity((size - start) as usize);
        (&mut file).take(size - start).read_to_end(&mut bytes).await?;
        let end_offset = start + bytes.len() as u64;
        self.last_position = end_offset;
        Ok(ByteRange {
            bytes,
            start_offset: start,
            end_offset,
            file_size: size,
            reset: false,
        })
    }

    async fn info(&self) -> Result<SourceInfo> {
        let path = self.watched()?;
        let size = tokio::fs::metadata(path).await?.len();
        Ok(SourceInfo {
            size,
            path: Some(path.clone()),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Writer side of a [`MemorySource`], kept by whoever produces the log.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceHandle(Arc<Mutex<Vec<u8>>>);

impl MemorySourceHandle {
    pub fn append(&self, bytes: &[u8]) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(bytes);
    }

    /// Replace the whole content, as when the editor restarts its log.
    pub fn replace(&self, bytes: &[u8]) {
        let mut data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        data.clear();
        data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A log held in memory. Shrinking it through the handle reads as a reset.
#[derive(Debug, Default)]
pub struct MemorySource {
    data: MemorySourceHandle,
    path: Option<PathBuf>,
    last_size: u64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(bytes: &[u8]) -> Self {
        let source = Self::new();
        source.data.append(bytes);
        source
    }

    pub fn handle(&self) -> MemorySourceHandle {
        self.data.clone()
    }
}

impl ByteSource for MemorySource {
    async fn watch(&mut self, path: Option<PathBuf>) -> Result<PathBuf> {
        let path = path.unwrap_or_else(|| PathBuf::from("memory://Editor.log"));
        self.path = Some(path.clone());
        self.last_size = 0;
        Ok(path)
    }

    async fn unwatch(&mut self) -> Result<()> {
        self.path = None;
        Ok(())
    }

    async fn read_range(&mut self, start: u64) -> Result<ByteRange> {
        let data = self.data.0.lock().unwrap_or_else(PoisonError::into_inner);
        let size = data.len() as u64;
        let reset = size < self.last_size || start > size;
        self.last_size = size;
        let bytes = if reset {
            Vec::new()
        } else {
            data[start as usize..].to_vec()
        };
        Ok(ByteRange {
            end_offset: start + bytes.len() as u64,
            bytes,
            start_offset: start,
            file_size: size,
            reset,
        })
    }

    async fn info(&self) -> Result<SourceInfo> {
        Ok(SourceInfo {
            size: self.data.len() as u64,
            path: self.path.clone(),
        })
    }
}
