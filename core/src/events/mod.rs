//! Structured events produced by the handler chain.

pub mod asset;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::timestamp::add_delta;

pub use asset::AssetCategory;

// ─────────────────────────────────────────────────────────────────────────────
// Event families
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetImport {
    pub line_number: u64,
    pub byte_offset: u64,
    pub asset_path: String,
    pub asset_name: String,
    /// Lowercase extension, or `no-extension`.
    pub asset_type: String,
    pub category: AssetCategory,
    pub guid: String,
    pub artifact_id: Option<String>,
    pub importer_type: Option<String>,
    pub duration_ms: f64,
    /// Worker thread that performed the import, `None` on the main thread.
    pub thread_id: Option<u32>,
    pub start_timestamp: NaiveDateTime,
    pub end_timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRefresh {
    pub line_number: u64,
    pub byte_offset: u64,
    pub refresh_id: String,
    pub total_ms: f64,
    pub initiated_by: String,
    pub imports_total: Option<u64>,
    pub imports_actual: Option<u64>,
    pub asset_db_process_ms: Option<f64>,
    pub asset_db_callback_ms: Option<f64>,
    pub domain_reloads: Option<u64>,
    pub domain_reload_ms: Option<f64>,
    pub compile_ms: Option<f64>,
    pub scripting_other_ms: Option<f64>,
    pub start_timestamp: NaiveDateTime,
    pub end_timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Initialization,
    ScriptCompilation,
    Operation,
    PipelineRefresh,
    DomainReload,
    Telemetry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub kind: ProcessKind,
    pub name: String,
    pub line_number: u64,
    pub byte_offset: u64,
    pub duration_ms: f64,
    pub memory_mb: Option<u64>,
    pub detail: Option<String>,
    pub start_timestamp: NaiveDateTime,
    pub end_timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerBarrier {
    pub thread_id: u32,
    pub line_number: u64,
    pub byte_offset: u64,
    pub import_count: u32,
    pub start_timestamp: NaiveDateTime,
    pub end_timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorBlock {
    pub line_number: u64,
    pub byte_offset: u64,
    pub requested_assets: Vec<String>,
    pub downloaded_assets: Vec<String>,
    pub uploaded_assets: Vec<String>,
    pub duration_ms: Option<f64>,
    pub start_timestamp: NaiveDateTime,
    pub end_timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasOperation {
    pub name: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteAtlasImport {
    pub line_number: u64,
    pub byte_offset: u64,
    pub atlas_name: String,
    /// Synthesized as `SpriteAtlas/<name>`.
    pub asset_path: String,
    pub category: AssetCategory,
    pub artifact_id: Option<String>,
    pub operations: Vec<AtlasOperation>,
    pub duration_ms: f64,
    pub start_timestamp: NaiveDateTime,
    pub end_timestamp: NaiveDateTime,
}

impl SpriteAtlasImport {
    /// View this atlas as an ordinary asset import, for sinks that only keep
    /// one import table.
    pub fn to_asset_import(&self) -> AssetImport {
        AssetImport {
            line_number: self.line_number,
            byte_offset: self.byte_offset,
            asset_path: self.asset_path.clone(),
            asset_name: self.atlas_name.clone(),
            asset_type: "spriteatlas".to_string(),
            category: AssetCategory::SpriteAtlas,
            guid: String::new(),
            artifact_id: self.artifact_id.clone(),
            importer_type: Some("SpriteAtlasImporter".to_string()),
            duration_ms: self.duration_ms,
            thread_id: None,
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tagged union
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    AssetImport(AssetImport),
    PipelineRefresh(PipelineRefresh),
    Process(ProcessEvent),
    WorkerBarrier(WorkerBarrier),
    AcceleratorBlock(AcceleratorBlock),
    SpriteAtlasImport(SpriteAtlasImport),
}

impl LogEvent {
    pub fn line_number(&self) -> u64 {
        match self {
            Self::AssetImport(e) => e.line_number,
            Self::PipelineRefresh(e) => e.line_number,
            Self::Process(e) => e.line_number,
            Self::WorkerBarrier(e) => e.line_number,
            Self::AcceleratorBlock(e) => e.line_number,
            Self::SpriteAtlasImport(e) => e.line_number,
        }
    }

    pub fn start_timestamp(&self) -> NaiveDateTime {
        match self {
            Self::AssetImport(e) => e.start_timestamp,
            Self::PipelineRefresh(e) => e.start_timestamp,
            Self::Process(e) => e.start_timestamp,
            Self::WorkerBarrier(e) => e.start_timestamp,
            Self::AcceleratorBlock(e) => e.start_timestamp,
            Self::SpriteAtlasImport(e) => e.start_timestamp,
        }
    }

    pub fn end_timestamp(&self) -> NaiveDateTime {
        match self {
            Self::AssetImport(e) => e.end_timestamp,
            Self::PipelineRefresh(e) => e.end_timestamp,
            Self::Process(e) => e.end_timestamp,
            Self::WorkerBarrier(e) => e.end_timestamp,
            Self::AcceleratorBlock(e) => e.end_timestamp,
            Self::SpriteAtlasImport(e) => e.end_timestamp,
        }
    }

    fn span_mut(&mut self) -> (&mut NaiveDateTime, &mut NaiveDateTime) {
        match self {
            Self::AssetImport(e) => (&mut e.start_timestamp, &mut e.end_timestamp),
            Self::PipelineRefresh(e) => (&mut e.start_timestamp, &mut e.end_timestamp),
            Self::Process(e) => (&mut e.start_timestamp, &mut e.end_timestamp),
            Self::WorkerBarrier(e) => (&mut e.start_timestamp, &mut e.end_timestamp),
            Self::AcceleratorBlock(e) => (&mut e.start_timestamp, &mut e.end_timestamp),
            Self::SpriteAtlasImport(e) => (&mut e.start_timestamp, &mut e.end_timestamp),
        }
    }

    /// Move both ends of the span by `delta`.
    pub fn shift(&mut self, delta: TimeDelta) {
        let (start, end) = self.span_mut();
        *start = add_delta(*start, delta);
        *end = add_delta(*end, delta);
    }

    /// Pull `end` up to `start` if the span is inverted. Returns true if it was.
    pub fn clamp_span(&mut self) -> bool {
        let (start, end) = self.span_mut();
        if *end < *start {
            *end = *start;
            true
        } else {
            false
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::AssetImport(_) => "asset_import",
            Self::PipelineRefresh(_) => "pipeline_refresh",
            Self::Process(_) => "process",
            Self::WorkerBarrier(_) => "worker_barrier",
            Self::AcceleratorBlock(_) => "accelerator_block",
            Self::SpriteAtlasImport(_) => "sprite_atlas_import",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Log-level metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Partial update of the log's header information. Merging only ever fills
/// in or overwrites fields that the patch actually carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub unity_version: Option<String>,
    pub platform: Option<String>,
    pub architecture: Option<String>,
    pub project_name: Option<String>,
    pub start_timestamp: Option<NaiveDateTime>,
    pub end_timestamp: Option<NaiveDateTime>,
    pub total_lines: Option<u64>,
}

impl MetadataPatch {
    pub fn merge(&mut self, other: MetadataPatch) {
        if other.unity_version.is_some() {
            self.unity_version = other.unity_version;
        }
        if other.platform.is_some() {
            self.platform = other.platform;
        }
        if other.architecture.is_some() {
            self.architecture = other.architecture;
        }
        if other.project_name.is_some() {
            self.project_name = other.project_name;
        }
        if other.start_timestamp.is_some() {
            self.start_timestamp = other.start_timestamp;
        }
        if other.end_timestamp.is_some() {
            self.end_timestamp = other.end_timestamp;
        }
        if other.total_lines.is_some() {
            self.total_lines = other.total_lines;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::synthetic_epoch;

    fn barrier() -> LogEvent {
        LogEvent::WorkerBarrier(WorkerBarrier {
            thread_id: 2,
            line_number: 7,
            byte_offset: 120,
            import_count: 3,
            start_timestamp: synthetic_epoch(),
            end_timestamp: synthetic_epoch() + TimeDelta::seconds(4),
        })
    }

    #[test]
    fn test_shift_moves_both_ends() {
        let mut event = barrier();
        event.shift(TimeDelta::seconds(-10));
        assert_eq!(event.start_timestamp(), synthetic_epoch() - TimeDelta::seconds(10));
        assert_eq!(event.end_timestamp(), synthetic_epoch() - TimeDelta::seconds(6));
    }

    #[test]
    fn test_clamp_span() {
        let mut event = barrier();
        assert!(!event.clamp_span());
        event.shift(TimeDelta::zero());
        if let LogEvent::WorkerBarrier(b) = &mut event {
            b.end_timestamp = b.start_timestamp - TimeDelta::seconds(1);
        }
        assert!(event.clamp_span());
        assert_eq!(event.start_timestamp(), event.end_timestamp());
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_value(barrier()).unwrap();
        assert_eq!(json["type"], "worker_barrier");
        assert_eq!(json["thread_id"], 2);
        let back: LogEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, barrier());
    }

    #[test]
    fn test_metadata_merge_keeps_existing_fields() {
        let mut meta = MetadataPatch {
            unity_version: Some("2022.3.10f1".to_string()),
            ..Default::default()
        };
        meta.merge(MetadataPatch {
            total_lines: Some(42),
            ..Default::default()
        });
        assert_eq!(meta.unity_version.as_deref(), Some("2022.3.10f1"));
        assert_eq!(meta.total_lines, Some(42));
        assert!(!meta.is_empty());
        assert!(MetadataPatch::default().is_empty());
    }
}
