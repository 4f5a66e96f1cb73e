//! Live tailing of one growing log.
//!
//! A [`LiveSession`] owns a parse session, a byte source and a checkpoint
//! store behind one async mutex. Each poll reads from the checkpoint offset,
//! feeds the new bytes through the chain and saves the checkpoint again. A
//! shrinking file restarts the parse from byte 0 with a fresh state.

mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use editorlog_types::{EngineConfig, ParserConfig};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::context::{CancelToken, ParsingSession, project_name_from_log_path};
use crate::error::Result;
use crate::events::MetadataPatch;
use crate::sink::EventSink;
use crate::state::CheckpointStore;

pub use source::{ByteRange, ByteSource, LocalFileSource, MemorySource, MemorySourceHandle, SourceInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Idle,
    Watching,
    Polling,
    /// The last poll found the file truncated and started over.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another poll was still running, or nothing is being watched.
    Skipped,
    Processed { lines: u64, reset: bool, end_offset: u64 },
}

struct LiveInner<S, K> {
    source: S,
    sink: K,
    store: Box<dyn CheckpointStore>,
    session: ParsingSession,
    parser: ParserConfig,
    resume_from_checkpoint: bool,
    key: Option<String>,
    status: LiveStatus,
    last_size: u64,
}

impl<S: ByteSource, K: EventSink + Send> LiveInner<S, K> {
    fn fresh_session(&self, cancel: &CancelToken) -> ParsingSession {
        ParsingSession::with_config(&self.parser).with_cancel_token(cancel.clone())
    }

    async fn attach(&mut self, path: Option<PathBuf>, cancel: &CancelToken) -> Result<PathBuf> {
        let path = self.source.watch(path).await?;
        let key = path.display().to_string();
        if let Some(project_name) = project_name_from_log_path(&path) {
            // Header lines naming the project override this later.
            self.sink.update_metadata(MetadataPatch {
                project_name: Some(project_name),
                ..Default::default()
            });
        }

        let checkpoint = if self.resume_from_checkpoint {
            self.store.load(&key)
        } else {
            None
        };
        self.session = match checkpoint {
            Some(cp) => {
                tracing::info!(
                    line = cp.last_processed_line,
                    offset = cp.byte_offset,
                    "Resuming from checkpoint"
                );
                self.last_size = cp.byte_offset;
                ParsingSession::from_checkpoint(cp, &self.parser).with_cancel_token(cancel.clone())
            }
            None => {
                self.last_size = 0;
                self.fresh_session(cancel)
            }
        };
        self.key = Some(key);
        self.status = LiveStatus::Watching;
        Ok(path)
    }

    async fn poll(&mut self, cancel: &CancelToken) -> Result<PollOutcome> {
        let Some(key) = self.key.clone() else {
            return Ok(PollOutcome::Skipped);
        };
        self.status = LiveStatus::Polling;

        let mut range = self.source.read_range(self.session.resume_offset()).await?;
        let reset = range.reset || range.file_size < self.last_size;
        if reset {
            tracing::info!(
                size = range.file_size,
                previous = self.last_size,
                "Log was truncated or replaced, reparsing from the start"
            );
            self.session = self.fresh_session(cancel);
            self.store.clear(&key)?;
            range = self.source.read_range(0).await?;
        }
        self.last_size = range.file_size;

        let lines = self
            .session
            .feed(&range.bytes, range.start_offset, &mut self.sink)?;
        let checkpoint = self.session.checkpoint();
        self.store.save(&key, &checkpoint)?;
        if lines > 0 {
            tracing::debug!(lines, offset = checkpoint.byte_offset, "Processed new log lines");
        }

        self.status = if reset { LiveStatus::Reset } else { LiveStatus::Watching };
        Ok(PollOutcome::Processed {
            lines,
            reset,
            end_offset: checkpoint.byte_offset,
        })
    }
}

/// Clears the in-flight flag however the poll ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn poll_shared<S: ByteSource, K: EventSink + Send>(
    inner: &Mutex<LiveInner<S, K>>,
    processing: &AtomicBool,
    cancel: &CancelToken,
) -> Result<PollOutcome> {
    if processing.swap(true, Ordering::SeqCst) {
        return Ok(PollOutcome::Skipped);
    }
    let _guard = ProcessingGuard(processing);
    inner.lock().await.poll(cancel).await
}

pub struct LiveSession<S: ByteSource, K: EventSink + Send + 'static> {
    inner: Arc<Mutex<LiveInner<S, K>>>,
    processing: Arc<AtomicBool>,
    cancel: CancelToken,
    poll_interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl<S: ByteSource, K: EventSink + Send + 'static> LiveSession<S, K> {
    pub fn new(source: S, sink: K, store: impl CheckpointStore + 'static, config: &EngineConfig) -> Self {
        let cancel = CancelToken::new();
        let inner = LiveInner {
            source,
            sink,
            store: Box::new(store),
            session: ParsingSession::with_config(&config.parser).with_cancel_token(cancel.clone()),
            parser: config.parser.clone(),
            resume_from_checkpoint: config.live.resume_from_checkpoint,
            key: None,
            status: LiveStatus::Idle,
            last_size: 0,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            processing: Arc::new(AtomicBool::new(false)),
            cancel,
            poll_interval: Duration::from_millis(config.live.poll_interval_ms.max(1)),
            task: None,
        }
    }

    /// Watch `path` (or the default editor log), restore its checkpoint and
    /// start polling on the configured interval.
    pub async fn start(&mut self, path: Option<PathBuf>) -> Result<PathBuf> {
        if self.task.is_some() {
            self.stop().await?;
        }
        self.cancel.reset();
        let path = self.inner.lock().await.attach(path, &self.cancel).await?;

        let inner = Arc::clone(&self.inner);
        let processing = Arc::clone(&self.processing);
        let cancel = self.cancel.clone();
        let period = self.poll_interval;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = poll_shared(&inner, &processing, &cancel).await {
                    tracing::warn!(error = %e, "Live poll failed");
                }
                tokio::task::yield_now().await;
            }
        }));
        Ok(path)
    }

    /// Run one poll now, outside the timer.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        poll_shared(&self.inner, &self.processing, &self.cancel).await
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.cancel.cancel();
        let mut inner = self.inner.lock().await;
        inner.source.unwatch().await?;
        inner.key = None;
        inner.status = LiveStatus::Idle;
        Ok(())
    }

    pub async fn status(&self) -> LiveStatus {
        self.inner.lock().await.status
    }

    pub fn is_polling(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Borrow the sink, e.g. to read what has been written so far.
    pub async fn with_sink<R>(&self, f: impl FnOnce(&mut K) -> R) -> R {
        f(&mut self.inner.lock().await.sink)
    }
}

impl<S: ByteSource, K: EventSink + Send + 'static> Drop for LiveSession<S, K> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
