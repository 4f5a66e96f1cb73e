//! Correlation state for one log.
//!
//! `ParserState` is pure storage plus a few clock helpers. The handlers own
//! the rules for when entries are opened and closed; this type only keeps the
//! bookkeeping consistent (bounds widen monotonically, matched entries are
//! removed as they are taken).

pub mod buffers;
pub mod checkpoint;
pub mod ipc;

use chrono::{NaiveDateTime, TimeDelta};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::timestamp::{add_delta, sub_delta, synthetic_epoch};

pub use buffers::{
    AcceleratorBuffer, AcceleratorSection, CompiledAssembly, DomainReloadBuffer, MetadataBuffer,
    PipelineRefreshBuffer, ReloadStep, ScriptCompilationBuffer, SpriteAtlasBuffer,
};
pub use checkpoint::{Checkpoint, CheckpointStore, JsonCheckpointStore, MemoryCheckpointStore};
pub use ipc::ParseWorkerOutput;

/// Largest gap between a completion's implied end and its real timestamp
/// that still counts as a match.
pub const MATCH_TOLERANCE: TimeDelta = TimeDelta::seconds(5);

/// A multi-line import whose completion line has not arrived yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingImport {
    pub asset_path: String,
    pub guid: String,
    pub line_number: u64,
    pub byte_offset: u64,
    pub importer_type: Option<String>,
    pub start_timestamp: NaiveDateTime,
    pub is_animation: bool,
}

/// A run of imports on one worker thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Barrier {
    pub start_timestamp: NaiveDateTime,
    pub import_count: u32,
    pub start_line_number: u64,
    pub start_byte_offset: u64,
    pub last_activity: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserState {
    pub logical_clock: NaiveDateTime,
    pub thread_clocks: HashMap<u32, NaiveDateTime>,

    // --- Pending correlations ---
    pub pending_imports: HashMap<String, PendingImport>,
    pub worker_imports: HashMap<u32, PendingImport>,
    pub worker_barriers: HashMap<u32, Barrier>,
    pub pending_worker_barriers: HashMap<u32, Barrier>,
    /// GUID of the most recent main-thread import start, for importer lines.
    pub last_started_guid: Option<String>,

    // --- Open blocks ---
    pub metadata: Option<MetadataBuffer>,
    pub pipeline_refresh: Option<PipelineRefreshBuffer>,
    pub domain_reload: Option<DomainReloadBuffer>,
    pub accelerator: Option<AcceleratorBuffer>,
    pub sprite_atlas: Option<SpriteAtlasBuffer>,
    pub script_compilation: Option<ScriptCompilationBuffer>,
    pub refresh_started_at: Option<NaiveDateTime>,

    // --- Bounds ---
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
    pub timestamps_enabled: Option<bool>,
    pub lines_processed: u64,
}

impl Default for ParserState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserState {
    pub fn new() -> Self {
        Self {
            logical_clock: synthetic_epoch(),
            thread_clocks: HashMap::new(),
            pending_imports: HashMap::new(),
            worker_imports: HashMap::new(),
            worker_barriers: HashMap::new(),
            pending_worker_barriers: HashMap::new(),
            last_started_guid: None,
            metadata: Some(MetadataBuffer::default()),
            pipeline_refresh: None,
            domain_reload: None,
            accelerator: None,
            sprite_atlas: None,
            script_compilation: None,
            refresh_started_at: None,
            first_timestamp: None,
            last_timestamp: None,
            timestamps_enabled: None,
            lines_processed: 0,
        }
    }

    /// Whether this log prints real timestamps. Undecided counts as no.
    pub fn is_timestamped(&self) -> bool {
        self.timestamps_enabled == Some(true)
    }

    // --- Clock ---

    /// Current time: the line's own timestamp if it has one, else the clock.
    pub fn now(&self, line_ts: Option<NaiveDateTime>) -> NaiveDateTime {
        line_ts.unwrap_or(self.logical_clock)
    }

    pub fn widen(&mut self, ts: NaiveDateTime) {
        self.first_timestamp = Some(self.first_timestamp.map_or(ts, |f| f.min(ts)));
        self.last_timestamp = Some(self.last_timestamp.map_or(ts, |l| l.max(ts)));
    }

    /// Move the logical clock forward to `ts`. Never moves it backward.
    pub fn advance_to(&mut self, ts: NaiveDateTime) {
        if ts > self.logical_clock {
            self.logical_clock = ts;
        }
        self.widen(ts);
    }

    /// Span of an operation whose duration is printed when it finishes.
    ///
    /// Timestamped logs end it at the current time. Otherwise it starts at
    /// the logical clock and the clock moves to its end.
    pub fn forward_span(
        &mut self,
        line_ts: Option<NaiveDateTime>,
        duration: TimeDelta,
    ) -> (NaiveDateTime, NaiveDateTime) {
        if self.is_timestamped() {
            let end = self.now(line_ts);
            (sub_delta(end, duration), end)
        } else {
            let start = self.logical_clock;
            let end = add_delta(start, duration);
            self.advance_to(end);
            (start, end)
        }
    }

    /// Span of a summary printed after the fact: it ends now, the clock stays.
    pub fn backward_span(
        &self,
        line_ts: Option<NaiveDateTime>,
        duration: TimeDelta,
    ) -> (NaiveDateTime, NaiveDateTime) {
        let end = self.now(line_ts);
        (sub_delta(end, duration), end)
    }

    pub fn thread_clock(&self, thread: u32) -> NaiveDateTime {
        self.thread_clocks
            .get(&thread)
            .copied()
            .unwrap_or(self.logical_clock)
    }

    /// Bring a worker's cursor up to the main-thread clock.
    pub fn sync_thread_clock(&mut self, thread: u32) -> NaiveDateTime {
        let synced = self.thread_clock(thread).max(self.logical_clock);
        self.thread_clocks.insert(thread, synced);
        synced
    }

    pub fn set_thread_clock(&mut self, thread: u32, ts: NaiveDateTime) {
        let current = self.thread_clock(thread);
        self.thread_clocks.insert(thread, current.max(ts));
    }

    /// Move the bounds by `delta`, used by timeline normalization.
    pub fn shift_bounds(&mut self, delta: TimeDelta) {
        self.first_timestamp = self.first_timestamp.map(|t| add_delta(t, delta));
        self.last_timestamp = self.last_timestamp.map(|t| add_delta(t, delta));
        self.logical_clock = add_delta(self.logical_clock, delta);
    }

    // --- Import matching ---

    /// Remove and return the pending import a completion line belongs to.
    ///
    /// With one candidate it is taken directly. With several, a completion
    /// that carries a real timestamp picks the candidate whose implied end
    /// (`start + duration`) is closest, provided it is within
    /// [`MATCH_TOLERANCE`]. Otherwise the most recently started one wins.
    pub fn take_matching_import(
        &mut self,
        now: Option<NaiveDateTime>,
        duration: TimeDelta,
    ) -> Option<PendingImport> {
        let key = match self.pending_imports.len() {
            0 => return None,
            1 => self.pending_imports.keys().next().cloned()?,
            _ => self
                .closest_by_end(now, duration)
                .or_else(|| self.most_recent_pending())?,
        };
        if self.last_started_guid.as_deref() == Some(key.as_str()) {
            self.last_started_guid = None;
        }
        self.pending_imports.remove(&key)
    }

    fn closest_by_end(&self, now: Option<NaiveDateTime>, duration: TimeDelta) -> Option<String> {
        let now = now?;
        self.pending_imports
            .iter()
            .map(|(guid, p)| (guid, (now - add_delta(p.start_timestamp, duration)).abs()))
            .filter(|(_, gap)| *gap <= MATCH_TOLERANCE)
            .min_by_key(|(_, gap)| *gap)
            .map(|(guid, _)| guid.clone())
    }

    fn most_recent_pending(&self) -> Option<String> {
        self.pending_imports
            .iter()
            .max_by_key(|(_, p)| p.line_number)
            .map(|(guid, _)| guid.clone())
    }

    // --- Diagnostics ---

    /// Log correlations still open at end of input. Anything reported here
    /// is a start line whose end never appeared in the log.
    pub fn warn_unmatched(&self) {
        for pending in self.pending_imports.values() {
            tracing::warn!(
                guid = %pending.guid,
                path = %pending.asset_path,
                line = pending.line_number,
                "Import never completed"
            );
        }
        for (thread, pending) in &self.worker_imports {
            tracing::warn!(
                thread,
                path = %pending.asset_path,
                line = pending.line_number,
                "Worker import never completed"
            );
        }
        for (thread, barrier) in self.worker_barriers.iter().chain(&self.pending_worker_barriers) {
            tracing::warn!(
                thread,
                line = barrier.start_line_number,
                imports = barrier.import_count,
                "Worker barrier never joined"
            );
        }
    }

    pub fn has_unmatched(&self) -> bool {
        !self.pending_imports.is_empty()
            || !self.worker_imports.is_empty()
            || !self.worker_barriers.is_empty()
            || !self.pending_worker_barriers.is_empty()
    }
}
