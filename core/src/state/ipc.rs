//! Output handed from the parse worker to its caller over stdout.

use serde::{Deserialize, Serialize};

use crate::context::ParseSummary;
use crate::events::{AssetCategory, LogEvent, MetadataPatch};
use crate::sink::MemorySink;

/// How many of the slowest imports are reported.
pub const SLOWEST_IMPORTS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub asset_imports: usize,
    pub pipeline_refreshes: usize,
    pub processes: usize,
    pub worker_barriers: usize,
    pub accelerator_blocks: usize,
    pub sprite_atlas_imports: usize,
}

impl EventCounts {
    pub fn total(&self) -> usize {
        self.asset_imports
            + self.pipeline_refreshes
            + self.processes
            + self.worker_barriers
            + self.accelerator_blocks
            + self.sprite_atlas_imports
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerImportInfo {
    pub asset_path: String,
    pub category: AssetCategory,
    pub duration_ms: f64,
    pub line_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseWorkerOutput {
    /// Offset the caller should resume tailing from.
    pub end_pos: u64,
    pub line_count: u64,
    pub event_count: usize,
    pub counts: EventCounts,
    pub metadata: MetadataPatch,
    pub timestamps_enabled: bool,
    pub timeline_shift_ms: Option<i64>,
    pub slowest_imports: Vec<WorkerImportInfo>,
    pub elapsed_ms: u128,
}

impl ParseWorkerOutput {
    pub fn from_sink(sink: &MemorySink, summary: &ParseSummary, elapsed_ms: u128) -> Self {
        let mut counts = EventCounts::default();
        let mut imports = Vec::new();
        for event in &sink.events {
            match event {
                LogEvent::AssetImport(i) => {
                    counts.asset_imports += 1;
                    imports.push(WorkerImportInfo {
                        asset_path: i.asset_path.clone(),
                        category: i.category,
                        duration_ms: i.duration_ms,
                        line_number: i.line_number,
                    });
                }
                LogEvent::PipelineRefresh(_) => counts.pipeline_refreshes += 1,
                LogEvent::Process(_) => counts.processes += 1,
                LogEvent::WorkerBarrier(_) => counts.worker_barriers += 1,
                LogEvent::AcceleratorBlock(_) => counts.accelerator_blocks += 1,
                LogEvent::SpriteAtlasImport(_) => counts.sprite_atlas_imports += 1,
            }
        }
        imports.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        imports.truncate(SLOWEST_IMPORTS);

        Self {
            end_pos: summary.end_offset,
            line_count: summary.lines_processed,
            event_count: counts.total(),
            counts,
            metadata: sink.metadata.clone(),
            timestamps_enabled: summary.timestamps_enabled,
            timeline_shift_ms: summary.timeline_shift_ms,
            slowest_imports: imports,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::parse_bytes;
    use editorlog_types::ParserConfig;

    #[test]
    fn test_output_counts_and_ranks_imports() {
        let log = "\
Initialize engine version: 2022.3.10f1
Start importing Assets/a.png using Guid(01) (TextureImporter) -> (artifact id: 'a1') in 0.5 seconds
Start importing Assets/b.prefab using Guid(02) (PrefabImporter) -> (artifact id: 'a2') in 2.0 seconds
Start importing Assets/c.mat using Guid(03) (NativeFormatImporter) -> (artifact id: 'a3') in 1.0 seconds
";
        let mut sink = MemorySink::new();
        let summary = parse_bytes(log.as_bytes(), &mut sink, &ParserConfig::default()).unwrap();
        let output = ParseWorkerOutput::from_sink(&sink, &summary, 42);

        assert_eq!(output.counts.asset_imports, 3);
        assert_eq!(output.event_count, sink.len());
        assert_eq!(output.end_pos, log.len() as u64);
        assert_eq!(output.elapsed_ms, 42);
        let order: Vec<_> = output.slowest_imports.iter().map(|i| i.asset_path.as_str()).collect();
        assert_eq!(order, vec!["Assets/b.prefab", "Assets/c.mat", "Assets/a.png"]);

        let json = serde_json::to_string(&output).unwrap();
        let back: ParseWorkerOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.counts, output.counts);
    }
}
