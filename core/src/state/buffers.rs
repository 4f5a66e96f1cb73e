//! Accumulators for multi-line blocks that are still open.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::events::AtlasOperation;

/// Header fields collected while the log is still in its preamble.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataBuffer {
    pub unity_version: Option<String>,
    pub platform: Option<String>,
    pub architecture: Option<String>,
    pub project_name: Option<String>,
    /// The previous line was a bare `-projectpath` flag.
    pub expect_project_path: bool,
    pub started_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRefreshBuffer {
    pub line_number: u64,
    pub byte_offset: u64,
    pub refresh_id: String,
    pub total_secs: f64,
    pub initiated_by: String,
    /// Observed refresh start marker, if any.
    pub start_timestamp: Option<NaiveDateTime>,
    pub end_timestamp: NaiveDateTime,
    pub summary_lines: u32,
    pub imports_total: Option<u64>,
    pub imports_actual: Option<u64>,
    pub asset_db_process_ms: Option<f64>,
    pub asset_db_callback_ms: Option<f64>,
    pub domain_reloads: Option<u64>,
    pub domain_reload_ms: Option<f64>,
    pub compile_ms: Option<f64>,
    pub scripting_other_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadStep {
    pub name: String,
    pub duration_ms: f64,
    /// Indentation depth, 1 for top-level steps.
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainReloadBuffer {
    pub line_number: u64,
    pub byte_offset: u64,
    pub total_ms: Option<f64>,
    pub end_timestamp: NaiveDateTime,
    pub steps: Vec<ReloadStep>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceleratorSection {
    #[default]
    Requested,
    Downloaded,
    Uploaded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceleratorBuffer {
    pub line_number: u64,
    pub byte_offset: u64,
    pub start_timestamp: NaiveDateTime,
    pub last_timestamp: NaiveDateTime,
    pub section: AcceleratorSection,
    pub requested: Vec<String>,
    pub downloaded: Vec<String>,
    pub uploaded: Vec<String>,
    pub duration_ms: Option<f64>,
}

impl AcceleratorBuffer {
    pub fn push(&mut self, path: String) {
        match self.section {
            AcceleratorSection::Requested => self.requested.push(path),
            AcceleratorSection::Downloaded => self.downloaded.push(path),
            AcceleratorSection::Uploaded => self.uploaded.push(path),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteAtlasBuffer {
    pub line_number: u64,
    pub byte_offset: u64,
    pub atlas_name: String,
    pub start_timestamp: NaiveDateTime,
    pub operations: Vec<AtlasOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledAssembly {
    pub path: String,
    pub defines: Option<u32>,
    pub references: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptCompilationBuffer {
    pub line_number: u64,
    pub byte_offset: u64,
    pub start_timestamp: NaiveDateTime,
    pub reason: Option<String>,
    pub assemblies: Vec<CompiledAssembly>,
}
