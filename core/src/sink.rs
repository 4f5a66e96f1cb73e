//! Where events go.
//!
//! The engine calls one method per finished event, immediately. Batching and
//! transactions are the sink's business.

use std::io::Write;

use chrono::TimeDelta;
use serde::Serialize;

use crate::events::{
    AcceleratorBlock, AssetImport, LogEvent, MetadataPatch, PipelineRefresh, ProcessEvent,
    SpriteAtlasImport, WorkerBarrier,
};
use crate::timestamp::add_delta;

pub trait EventSink {
    fn add_asset_import(&mut self, import: AssetImport);
    fn add_pipeline_refresh(&mut self, refresh: PipelineRefresh);
    fn add_process(&mut self, process: ProcessEvent);
    fn add_worker_barrier(&mut self, barrier: WorkerBarrier);
    fn add_accelerator_block(&mut self, block: AcceleratorBlock);

    /// Sinks without an atlas table get the atlas as an ordinary import in
    /// the "Sprite Atlas" category.
    fn add_sprite_atlas_import(&mut self, atlas: SpriteAtlasImport) {
        self.add_asset_import(atlas.to_asset_import());
    }

    fn update_metadata(&mut self, patch: MetadataPatch);

    /// Move every timestamp already written by `shift`.
    fn shift_timestamps(&mut self, shift: TimeDelta);

    /// Route one event to its family method.
    fn record(&mut self, event: LogEvent) {
        match event {
            LogEvent::AssetImport(e) => self.add_asset_import(e),
            LogEvent::PipelineRefresh(e) => self.add_pipeline_refresh(e),
            LogEvent::Process(e) => self.add_process(e),
            LogEvent::WorkerBarrier(e) => self.add_worker_barrier(e),
            LogEvent::AcceleratorBlock(e) => self.add_accelerator_block(e),
            LogEvent::SpriteAtlasImport(e) => self.add_sprite_atlas_import(e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps every event in arrival order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub events: Vec<LogEvent>,
    pub metadata: MetadataPatch,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn asset_imports(&self) -> impl Iterator<Item = &AssetImport> {
        self.events.iter().filter_map(|e| match e {
            LogEvent::AssetImport(i) => Some(i),
            _ => None,
        })
    }

    pub fn processes(&self) -> impl Iterator<Item = &ProcessEvent> {
        self.events.iter().filter_map(|e| match e {
            LogEvent::Process(p) => Some(p),
            _ => None,
        })
    }

    pub fn worker_barriers(&self) -> impl Iterator<Item = &WorkerBarrier> {
        self.events.iter().filter_map(|e| match e {
            LogEvent::WorkerBarrier(b) => Some(b),
            _ => None,
        })
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind_name() == kind).count()
    }
}

impl EventSink for MemorySink {
    fn add_asset_import(&mut self, import: AssetImport) {
        self.events.push(LogEvent::AssetImport(import));
    }

    fn add_pipeline_refresh(&mut self, refresh: PipelineRefresh) {
        self.events.push(LogEvent::PipelineRefresh(refresh));
    }

    fn add_process(&mut self, process: ProcessEvent) {
        self.events.push(LogEvent::Process(process));
    }

    fn add_worker_barrier(&mut self, barrier: WorkerBarrier) {
        self.events.push(LogEvent::WorkerBarrier(barrier));
    }

    fn add_accelerator_block(&mut self, block: AcceleratorBlock) {
        self.events.push(LogEvent::AcceleratorBlock(block));
    }

    fn add_sprite_atlas_import(&mut self, atlas: SpriteAtlasImport) {
        self.events.push(LogEvent::SpriteAtlasImport(atlas));
    }

    fn update_metadata(&mut self, patch: MetadataPatch) {
        self.metadata.merge(patch);
    }

    fn shift_timestamps(&mut self, shift: TimeDelta) {
        for event in &mut self.events {
            event.shift(shift);
        }
        if let Some(start) = self.metadata.start_timestamp.as_mut() {
            *start = add_delta(*start, shift);
        }
        if let Some(end) = self.metadata.end_timestamp.as_mut() {
            *end = add_delta(*end, shift);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON lines
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlRecord<'a> {
    Metadata(&'a MetadataPatch),
    TimelineShift { shift_ms: i64 },
}

/// Writes one JSON object per line. Already written lines cannot be
/// rewritten, so a timeline shift is written as its own record for the
/// reader to apply.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
    failed: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            failed: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Records that could not be written. Only the first failure is logged.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_record<T: Serialize>(&mut self, record: &T) {
        let result = serde_json::to_writer(&mut self.writer, record)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush());
        match result {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.failed += 1;
                if self.failed == 1 {
                    tracing::warn!(error = %e, "Failed to write event record");
                }
            }
        }
    }

    fn write_event(&mut self, event: LogEvent) {
        self.write_record(&event);
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn add_asset_import(&mut self, import: AssetImport) {
        self.write_event(LogEvent::AssetImport(import));
    }

    fn add_pipeline_refresh(&mut self, refresh: PipelineRefresh) {
        self.write_event(LogEvent::PipelineRefresh(refresh));
    }

    fn add_process(&mut self, process: ProcessEvent) {
        self.write_event(LogEvent::Process(process));
    }

    fn add_worker_barrier(&mut self, barrier: WorkerBarrier) {
        self.write_event(LogEvent::WorkerBarrier(barrier));
    }

    fn add_accelerator_block(&mut self, block: AcceleratorBlock) {
        self.write_event(LogEvent::AcceleratorBlock(block));
    }

    fn add_sprite_atlas_import(&mut self, atlas: SpriteAtlasImport) {
        self.write_event(LogEvent::SpriteAtlasImport(atlas));
    }

    fn update_metadata(&mut self, patch: MetadataPatch) {
        self.write_record(&ControlRecord::Metadata(&patch));
    }

    fn shift_timestamps(&mut self, shift: TimeDelta) {
        self.write_record(&ControlRecord::TimelineShift {
            shift_ms: shift.num_milliseconds(),
        });
    }
}
