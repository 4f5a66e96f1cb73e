//! The handler chain.
//!
//! Each line is offered to the handlers in a fixed priority order; the first
//! one that claims it stops the walk. Handlers are stateless: everything they
//! remember between lines lives in [`ParserState`], which keeps a session
//! serializable at any line boundary.

mod accelerator;
mod asset_import;
mod barrier;
mod clock;
mod compilation;
mod domain_reload;
mod metadata;
mod operation;
pub(crate) mod patterns;
mod pipeline;
mod sprite_atlas;
mod telemetry;
mod worker;

use chrono::NaiveDateTime;

use crate::events::{LogEvent, MetadataPatch, WorkerBarrier};
use crate::sink::EventSink;
use crate::state::{Barrier, ParserState};

pub use accelerator::{AcceleratorContentCheck, AcceleratorHandler};
pub use asset_import::AssetImportHandler;
pub use barrier::BarrierJoinHandler;
pub use clock::ClockObserver;
pub use compilation::ScriptCompilationHandler;
pub use domain_reload::DomainReloadHandler;
pub use metadata::MetadataHandler;
pub use operation::OperationHandler;
pub use pipeline::PipelineRefreshHandler;
pub use sprite_atlas::SpriteAtlasHandler;
pub use telemetry::TelemetryHandler;
pub use worker::WorkerThreadHandler;

/// One line as the handlers see it: the timestamp prefix is already split off.
#[derive(Debug, Clone, Copy)]
pub struct LogLine<'a> {
    pub text: &'a str,
    pub timestamp: Option<NaiveDateTime>,
    pub line_number: u64,
    pub byte_offset: u64,
}

/// Output produced while handling one line, drained to the sink right after.
#[derive(Debug, Default)]
pub struct Emitted {
    pub events: Vec<LogEvent>,
    pub metadata: Option<MetadataPatch>,
}

impl Emitted {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.metadata.is_none()
    }

    /// Hand everything to the sink. Returns the number of events written.
    pub fn drain_into<K: EventSink + ?Sized>(&mut self, sink: &mut K) -> usize {
        let count = self.events.len();
        for event in self.events.drain(..) {
            sink.record(event);
        }
        if let Some(patch) = self.metadata.take() {
            sink.update_metadata(patch);
        }
        count
    }
}

/// Mutable view handed to a handler: the state plus the output buffer.
pub struct ParseContext<'a> {
    pub state: &'a mut ParserState,
    out: &'a mut Emitted,
}

impl<'a> ParseContext<'a> {
    pub fn new(state: &'a mut ParserState, out: &'a mut Emitted) -> Self {
        Self { state, out }
    }

    pub fn emit(&mut self, mut event: LogEvent) {
        if event.clamp_span() {
            tracing::debug!(
                kind = event.kind_name(),
                line = event.line_number(),
                "Negative duration clamped to zero"
            );
        }
        self.state.widen(event.start_timestamp());
        self.state.widen(event.end_timestamp());
        self.out.events.push(event);
    }

    pub fn patch_metadata(&mut self, patch: MetadataPatch) {
        match &mut self.out.metadata {
            Some(existing) => existing.merge(patch),
            None => self.out.metadata = Some(patch),
        }
    }

    /// Advance the clock to a real timestamp and join any barriers that were
    /// waiting for one.
    pub fn observe_timestamp(&mut self, ts: Option<NaiveDateTime>) {
        let Some(ts) = ts else {
            return;
        };
        self.state.advance_to(ts);
        if !self.state.pending_worker_barriers.is_empty() {
            let deferred: Vec<_> = self.state.pending_worker_barriers.drain().collect();
            self.emit_barriers(deferred, ts);
        }
    }

    /// Join every open worker barrier.
    ///
    /// A real timestamp closes them at that instant. A timestamped log
    /// without one here defers the join to the next observed timestamp. An
    /// untimestamped log joins at the furthest thread clock, and the main
    /// clock catches up to it.
    pub fn join_barriers(&mut self, line_ts: Option<NaiveDateTime>) {
        if self.state.worker_barriers.is_empty() {
            return;
        }
        let open: Vec<_> = self.state.worker_barriers.drain().collect();
        if let Some(ts) = line_ts {
            self.emit_barriers(open, ts);
        } else if self.state.is_timestamped() {
            for (thread, barrier) in open {
                // Still waiting on a timestamp; it cannot end later than its
                // own last activity.
                if let Some(earlier) = self.state.pending_worker_barriers.insert(thread, barrier) {
                    let end = earlier.last_activity;
                    self.emit_barriers(vec![(thread, earlier)], end);
                }
            }
        } else {
            let end = open
                .iter()
                .map(|(thread, b)| self.state.thread_clock(*thread).max(b.last_activity))
                .max()
                .unwrap_or(self.state.logical_clock);
            self.state.advance_to(end);
            self.emit_barriers(open, end);
        }
    }

    /// Join barriers still open at end of input at their last activity.
    pub fn close_remaining_barriers(&mut self) {
        let open: Vec<_> = self
            .state
            .worker_barriers
            .drain()
            .chain(self.state.pending_worker_barriers.drain())
            .collect();
        for (thread, barrier) in open {
            let end = barrier.last_activity;
            self.emit_barriers(vec![(thread, barrier)], end);
        }
    }

    fn emit_barriers(&mut self, mut barriers: Vec<(u32, Barrier)>, end: NaiveDateTime) {
        barriers.sort_by_key(|(thread, _)| *thread);
        for (thread_id, barrier) in barriers {
            self.emit(LogEvent::WorkerBarrier(WorkerBarrier {
                thread_id,
                line_number: barrier.start_line_number,
                byte_offset: barrier.start_byte_offset,
                import_count: barrier.import_count,
                start_timestamp: barrier.start_timestamp,
                end_timestamp: end.max(barrier.start_timestamp),
            }));
        }
    }
}

/// One event family's recognizer.
pub trait LineHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap gate checked before `handle`.
    fn applies(&self, _state: &ParserState) -> bool {
        true
    }

    /// Process the line. Returning true claims it and ends the walk.
    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool;

    /// Close whatever this handler still has open at end of input.
    fn finish(&self, _ctx: &mut ParseContext<'_>) {}
}

pub struct HandlerChain {
    handlers: Vec<Box<dyn LineHandler>>,
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl HandlerChain {
    /// The fixed priority order used for Unity Editor logs.
    pub fn standard() -> Self {
        Self {
            handlers: vec![
                Box::new(MetadataHandler),
                Box::new(WorkerThreadHandler),
                Box::new(BarrierJoinHandler),
                Box::new(ClockObserver),
                Box::new(AcceleratorContentCheck),
                Box::new(TelemetryHandler),
                Box::new(PipelineRefreshHandler),
                Box::new(DomainReloadHandler),
                Box::new(AcceleratorHandler),
                Box::new(SpriteAtlasHandler),
                Box::new(AssetImportHandler),
                Box::new(ScriptCompilationHandler),
                Box::new(OperationHandler),
            ],
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Walk the chain. Returns the name of the handler that claimed the line.
    pub fn dispatch(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> Option<&'static str> {
        for handler in &self.handlers {
            if handler.applies(ctx.state) && handler.handle(line, ctx) {
                return Some(handler.name());
            }
        }
        None
    }

    pub fn finish(&self, ctx: &mut ParseContext<'_>) {
        for handler in &self.handlers {
            handler.finish(ctx);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Runs text through a fresh chain and collects events without a sink.
    pub struct Harness {
        pub chain: HandlerChain,
        pub state: ParserState,
        pub events: Vec<LogEvent>,
        pub metadata: MetadataPatch,
        pub claims: Vec<Option<&'static str>>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                chain: HandlerChain::standard(),
                state: ParserState::new(),
                events: Vec::new(),
                metadata: MetadataPatch::default(),
                claims: Vec::new(),
            }
        }

        pub fn feed(&mut self, text: &str) -> &mut Self {
            let mut offset = 0u64;
            for raw in text.lines() {
                self.state.lines_processed += 1;
                let (timestamp, body) = crate::timestamp::split_timestamp(raw);
                let line = LogLine {
                    text: body,
                    timestamp,
                    line_number: self.state.lines_processed,
                    byte_offset: offset,
                };
                let mut out = Emitted::default();
                let mut ctx = ParseContext::new(&mut self.state, &mut out);
                let claim = self.chain.dispatch(&line, &mut ctx);
                self.claims.push(claim);
                self.events.append(&mut out.events);
                if let Some(patch) = out.metadata {
                    self.metadata.merge(patch);
                }
                offset += raw.len() as u64 + 1;
            }
            self
        }

        pub fn finish(&mut self) -> &mut Self {
            let mut out = Emitted::default();
            let mut ctx = ParseContext::new(&mut self.state, &mut out);
            self.chain.finish(&mut ctx);
            self.events.append(&mut out.events);
            if let Some(patch) = out.metadata {
                self.metadata.merge(patch);
            }
            self
        }

        pub fn of_kind(&self, kind: &str) -> Vec<&LogEvent> {
            self.events.iter().filter(|e| e.kind_name() == kind).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;

    #[test]
    fn test_chain_order() {
        let chain = HandlerChain::standard();
        assert_eq!(
            chain.names(),
            vec![
                "metadata",
                "worker_thread",
                "barrier_join",
                "clock_observer",
                "accelerator_content_check",
                "telemetry",
                "pipeline_refresh",
                "domain_reload",
                "accelerator",
                "sprite_atlas",
                "asset_import",
                "script_compilation",
                "operation",
            ]
        );
    }

    #[test]
    fn test_unclaimed_line_emits_nothing() {
        let mut h = Harness::new();
        h.feed("Initialize engine version: 2022.3.10f1\nSomething unrelated happened");
        assert_eq!(h.claims.last().copied().flatten(), None);
        assert!(h.of_kind("asset_import").is_empty());
    }

    #[test]
    fn test_deferred_barrier_joins_at_next_timestamp() {
        let mut h = Harness::new();
        h.feed(concat!(
            "2024-01-01T10:00:00Z|0x1|Initialize engine version: 2022.3.10f1\n",
            "2024-01-01T10:00:01Z|0x2|[Worker1] Start importing Assets/a.png using Guid(aa)\n",
            "2024-01-01T10:00:02Z|0x2|[Worker1] -> (artifact id: 'ff') in 1.0 seconds\n",
            "main thread line without a timestamp\n",
            "2024-01-01T10:00:09Z|0x1|Later main thread line\n",
        ));
        let barriers = h.of_kind("worker_barrier");
        assert_eq!(barriers.len(), 1);
        let LogEvent::WorkerBarrier(b) = barriers[0] else { unreachable!() };
        assert_eq!(b.import_count, 1);
        assert_eq!(b.end_timestamp.format("%H:%M:%S").to_string(), "10:00:09");
        assert!(h.state.pending_worker_barriers.is_empty());
    }
}
