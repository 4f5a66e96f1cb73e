use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDateTime;
use editorlog_types::ParserConfig;
use serde::Serialize;

use super::app_config::project_name_from_log_path;
use crate::error::{EngineError, Result};
use crate::events::MetadataPatch;
use crate::handlers::{Emitted, HandlerChain, LogLine, ParseContext};
use crate::normalizer::TimelineNormalizer;
use crate::sink::EventSink;
use crate::splitter::StreamSplitter;
use crate::state::{Checkpoint, ParserState};
use crate::timestamp::split_timestamp;

/// Shared flag that stops a running parse between two lines.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub lines_processed: u64,
    /// Offset just past the last processed line.
    pub byte_offset: u64,
}

type ProgressHook = Box<dyn FnMut(Progress) + Send>;

/// Totals reported once a parse has been finished.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseSummary {
    pub lines_processed: u64,
    pub events_emitted: u64,
    pub end_offset: u64,
    pub timestamps_enabled: bool,
    pub timeline_shift_ms: Option<i64>,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
}

/// Per-line half of a session, kept apart from the splitter so both can be
/// borrowed at once while a chunk is scanned.
struct LineProcessor {
    state: ParserState,
    chain: HandlerChain,
    cancel: CancelToken,
    progress: Option<ProgressHook>,
    yield_every_lines: u64,
    events_emitted: u64,
}

impl LineProcessor {
    fn process_line<K: EventSink + ?Sized>(&mut self, raw: &str, offset: u64, sink: &mut K) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.state.lines_processed += 1;
        let (timestamp, text) = split_timestamp(raw);
        let line = LogLine {
            text,
            timestamp,
            line_number: self.state.lines_processed,
            byte_offset: offset,
        };

        let mut out = Emitted::default();
        let mut ctx = ParseContext::new(&mut self.state, &mut out);
        if self.chain.dispatch(&line, &mut ctx).is_none() {
            tracing::trace!(line = line.line_number, "Unclaimed line");
        }
        self.events_emitted += out.drain_into(sink) as u64;

        if self.yield_every_lines > 0
            && line.line_number % self.yield_every_lines == 0
            && let Some(hook) = self.progress.as_mut()
        {
            hook(Progress {
                lines_processed: line.line_number,
                byte_offset: offset + raw.len() as u64,
            });
        }
        Ok(())
    }

    fn finish<K: EventSink + ?Sized>(&mut self, sink: &mut K) {
        let mut out = Emitted::default();
        let mut ctx = ParseContext::new(&mut self.state, &mut out);
        self.chain.finish(&mut ctx);
        self.events_emitted += out.drain_into(sink) as u64;
    }
}

/// One parse of one log, fed chunk by chunk.
///
/// Events reach the sink as soon as the line that completes them is
/// processed. The session can be checkpointed between any two `feed` calls
/// and rebuilt later with [`ParsingSession::from_checkpoint`].
pub struct ParsingSession {
    splitter: StreamSplitter,
    processor: LineProcessor,
    normalize_timeline: bool,
}

impl Default for ParsingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ParsingSession {
    pub fn new() -> Self {
        Self::with_config(&ParserConfig::default())
    }

    pub fn with_config(config: &ParserConfig) -> Self {
        Self {
            splitter: StreamSplitter::new(),
            processor: LineProcessor {
                state: ParserState::new(),
                chain: HandlerChain::standard(),
                cancel: CancelToken::new(),
                progress: None,
                yield_every_lines: config.yield_every_lines,
                events_emitted: 0,
            },
            normalize_timeline: config.normalize_timeline,
        }
    }

    /// Resume where a checkpoint left off. The next chunk should start at
    /// or before `checkpoint.byte_offset`.
    pub fn from_checkpoint(checkpoint: Checkpoint, config: &ParserConfig) -> Self {
        let mut session = Self::with_config(config);
        session.splitter = StreamSplitter::starting_at(checkpoint.byte_offset);
        session.processor.state = checkpoint.parser_state;
        session.processor.state.lines_processed = checkpoint.last_processed_line;
        session
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.processor.cancel = token;
        self
    }

    pub fn set_progress_hook(&mut self, hook: impl FnMut(Progress) + Send + 'static) {
        self.processor.progress = Some(Box::new(hook));
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.processor.cancel.clone()
    }

    pub fn state(&self) -> &ParserState {
        &self.processor.state
    }

    pub fn lines_processed(&self) -> u64 {
        self.processor.state.lines_processed
    }

    pub fn events_emitted(&self) -> u64 {
        self.processor.events_emitted
    }

    /// Offset the next read should start from.
    pub fn resume_offset(&self) -> u64 {
        self.splitter.resume_offset()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            last_processed_line: self.processor.state.lines_processed,
            byte_offset: self.splitter.resume_offset(),
            parser_state: self.processor.state.clone(),
        }
    }

    /// Feed one chunk starting at absolute offset `start_offset`.
    /// Returns the number of lines processed from it.
    pub fn feed<K: EventSink + ?Sized>(&mut self, chunk: &[u8], start_offset: u64, sink: &mut K) -> Result<u64> {
        let before = self.processor.state.lines_processed;
        let processor = &mut self.processor;
        self.splitter
            .process_chunk(chunk, start_offset, |text, offset| processor.process_line(text, offset, sink))?;
        Ok(self.processor.state.lines_processed - before)
    }

    /// End of input: flush the last line, close open blocks, normalize a
    /// synthetic timeline and report the log bounds.
    pub fn finish<K: EventSink + ?Sized>(&mut self, sink: &mut K) -> Result<ParseSummary> {
        let processor = &mut self.processor;
        self.splitter
            .flush(|text, offset| processor.process_line(text, offset, sink))?;
        self.processor.finish(sink);
        self.processor.state.warn_unmatched();

        let shift = if self.normalize_timeline {
            TimelineNormalizer::normalize(&mut self.processor.state, sink)
        } else {
            None
        };

        let state = &self.processor.state;
        sink.update_metadata(MetadataPatch {
            start_timestamp: state.first_timestamp,
            end_timestamp: state.last_timestamp,
            total_lines: Some(state.lines_processed),
            ..Default::default()
        });

        let summary = ParseSummary {
            lines_processed: state.lines_processed,
            events_emitted: self.processor.events_emitted,
            end_offset: self.splitter.resume_offset(),
            timestamps_enabled: state.is_timestamped(),
            timeline_shift_ms: shift.map(|s| s.num_milliseconds()),
            first_timestamp: state.first_timestamp,
            last_timestamp: state.last_timestamp,
        };
        tracing::info!(
            lines = summary.lines_processed,
            events = summary.events_emitted,
            timestamped = summary.timestamps_enabled,
            "Parse finished"
        );
        Ok(summary)
    }
}

/// Parse a whole in-memory log.
pub fn parse_bytes<K: EventSink + ?Sized>(bytes: &[u8], sink: &mut K, config: &ParserConfig) -> Result<ParseSummary> {
    let mut session = ParsingSession::with_config(config);
    let chunk_size = config.chunk_size.max(1);
    let mut offset = 0u64;
    for chunk in bytes.chunks(chunk_size) {
        session.feed(chunk, offset, sink)?;
        offset += chunk.len() as u64;
    }
    session.finish(sink)
}

/// Parse a whole log file, reading it in `chunk_size` pieces.
pub fn parse_file<K: EventSink + ?Sized>(path: &Path, sink: &mut K, config: &ParserConfig) -> Result<ParseSummary> {
    let mut file = File::open(path)?;
    if let Some(project_name) = project_name_from_log_path(path) {
        sink.update_metadata(MetadataPatch {
            project_name: Some(project_name),
            ..Default::default()
        });
    }
    let mut session = ParsingSession::with_config(config);
    let mut buf = vec![0u8; config.chunk_size.max(1)];
    let mut offset = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        session.feed(&buf[..n], offset, sink)?;
        offset += n as u64;
    }
    tracing::debug!(path = %path.display(), bytes = offset, "Read log file");
    session.finish(sink)
}
