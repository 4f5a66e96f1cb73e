use regex::Captures;

use super::patterns::{ARTIFACT_COMPLETION, IMPORT_COMPLETE, IMPORT_START, IMPORTER_LINE};
use super::{LineHandler, LogLine, ParseContext};
use crate::events::{AssetImport, LogEvent, asset};
use crate::state::PendingImport;
use crate::timestamp::{add_delta, delta_from_secs, parse_seconds};
use chrono::NaiveDateTime;

/// Main-thread imports: single-line, or a start line later resolved by a
/// completion line.
pub struct AssetImportHandler;

impl LineHandler for AssetImportHandler {
    fn name(&self) -> &'static str {
        "asset_import"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        let text = line.text;

        if let Some(caps) = IMPORT_COMPLETE.captures(text) {
            let Some(secs) = parse_seconds(&caps["secs"]) else {
                tracing::debug!(line = line.line_number, "Malformed import duration");
                return true;
            };
            let pending = pending_from_start(&caps, line, ctx.state.now(line.timestamp));
            let (start, end) = ctx.state.forward_span(line.timestamp, delta_from_secs(secs));
            let artifact = caps.name("artifact").map(|m| m.as_str().to_string());
            emit_import(ctx, pending, artifact, secs * 1000.0, None, start, end);
            return true;
        }

        if let Some(caps) = IMPORT_START.captures(text) {
            let pending = pending_from_start(&caps, line, ctx.state.now(line.timestamp));
            let guid = pending.guid.clone();
            if let Some(previous) = ctx.state.pending_imports.insert(guid.clone(), pending) {
                tracing::debug!(guid = %guid, line = previous.line_number, "Import restarted before completing");
            }
            ctx.state.last_started_guid = Some(guid);
            return true;
        }

        if let Some(caps) = IMPORTER_LINE.captures(text) {
            let Some(guid) = ctx.state.last_started_guid.clone() else {
                return false;
            };
            let Some(pending) = ctx.state.pending_imports.get_mut(&guid) else {
                return false;
            };
            if pending.importer_type.is_none() {
                pending.importer_type = asset::normalize_importer(&caps["importer"]);
                pending.is_animation |=
                    asset::is_animation(&pending.asset_path, pending.importer_type.as_deref());
            }
            return true;
        }

        if let Some(caps) = ARTIFACT_COMPLETION.captures(text) {
            let Some(secs) = parse_seconds(&caps["secs"]) else {
                tracing::debug!(line = line.line_number, "Malformed import duration");
                return true;
            };
            let duration = delta_from_secs(secs);
            let Some(pending) = ctx.state.take_matching_import(line.timestamp, duration) else {
                tracing::debug!(line = line.line_number, "Completion without a pending import");
                return true;
            };
            let start = pending.start_timestamp;
            let end = if ctx.state.is_timestamped() {
                ctx.state.now(line.timestamp)
            } else {
                let end = add_delta(start, duration);
                ctx.state.advance_to(end);
                end
            };
            let artifact = Some(caps["artifact"].to_string());
            emit_import(ctx, pending, artifact, secs * 1000.0, None, start, end);
            return true;
        }

        false
    }
}

/// Build a pending import from a start (or complete) line's captures.
pub(super) fn pending_from_start(caps: &Captures<'_>, line: &LogLine<'_>, start: NaiveDateTime) -> PendingImport {
    let asset_path = caps["path"].trim().to_string();
    let importer_type = caps
        .name("importer")
        .and_then(|m| asset::normalize_importer(m.as_str()));
    let is_animation = asset::is_animation(&asset_path, importer_type.as_deref());
    PendingImport {
        guid: caps["guid"].to_string(),
        line_number: line.line_number,
        byte_offset: line.byte_offset,
        importer_type,
        start_timestamp: start,
        is_animation,
        asset_path,
    }
}

/// Turn a resolved import into an event. Folder and package pseudo-entries
/// are dropped here.
pub(super) fn emit_import(
    ctx: &mut ParseContext<'_>,
    pending: PendingImport,
    artifact_id: Option<String>,
    duration_ms: f64,
    thread_id: Option<u32>,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> bool {
    if asset::is_skipped_entry(&pending.asset_path, pending.importer_type.as_deref()) {
        tracing::trace!(path = %pending.asset_path, "Skipping folder entry");
        return false;
    }
    let importer = asset::resolve_importer(&pending.asset_path, pending.importer_type.as_deref());
    let category = asset::classify(&pending.asset_path, Some(&importer), pending.is_animation);
    ctx.emit(LogEvent::AssetImport(AssetImport {
        line_number: pending.line_number,
        byte_offset: pending.byte_offset,
        asset_name: asset::asset_name(&pending.asset_path).to_string(),
        asset_type: asset::asset_type(&pending.asset_path),
        category,
        guid: pending.guid,
        artifact_id,
        importer_type: Some(importer),
        duration_ms,
        thread_id,
        start_timestamp: start,
        end_timestamp: end,
        asset_path: pending.asset_path,
    }));
    true
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use crate::events::{AssetCategory, LogEvent};
    use crate::timestamp::synthetic_epoch;
    use chrono::TimeDelta;

    fn imports(h: &Harness) -> Vec<crate::events::AssetImport> {
        h.events
            .iter()
            .filter_map(|e| match e {
                LogEvent::AssetImport(i) => Some(i.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_three_line_import() {
        let mut h = Harness::new();
        h.feed(
            "Start importing Assets/A.png using Guid(abc123)\n(TextureImporter)\n-> (artifact id: 'def456') in 0.500 seconds\n",
        );
        let found = imports(&h);
        assert_eq!(found.len(), 1);
        let import = &found[0];
        assert_eq!(import.asset_path, "Assets/A.png");
        assert_eq!(import.importer_type.as_deref(), Some("TextureImporter"));
        assert_eq!(import.artifact_id.as_deref(), Some("def456"));
        assert_eq!(import.duration_ms, 500.0);
        assert_eq!(import.category, AssetCategory::Textures);
        assert_eq!(import.line_number, 1);
        assert_eq!(import.end_timestamp - import.start_timestamp, TimeDelta::milliseconds(500));
        assert!(h.state.pending_imports.is_empty());
    }

    #[test]
    fn test_single_line_import_advances_clock() {
        let mut h = Harness::new();
        h.feed(concat!(
            "Start importing Assets/Models/Ship.fbx using Guid(a1) (FBXImporter) -> (artifact id: 'b2') in 2.0 seconds\n",
            "Start importing Assets/Audio/hit.wav using Guid(a2) Importer(-1,00000000000000000000000000000000) -> (artifact id: 'b3') in 1.5 seconds\n",
        ));
        let found = imports(&h);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].start_timestamp, synthetic_epoch());
        assert_eq!(found[1].start_timestamp, found[0].end_timestamp);
        assert_eq!(found[1].importer_type.as_deref(), Some("AudioImporter"));
        assert_eq!(found[1].category, AssetCategory::Audio);
        assert_eq!(h.state.logical_clock, synthetic_epoch() + TimeDelta::milliseconds(3500));
    }

    #[test]
    fn test_lifo_resolution_without_timestamps() {
        let mut h = Harness::new();
        h.feed(concat!(
            "Start importing Assets/first.mat using Guid(01)\n",
            "Start importing Assets/second.mat using Guid(02)\n",
            "-> (artifact id: 'aa') in 1.0 seconds\n",
            "-> (artifact id: 'bb') in 1.0 seconds\n",
        ));
        let found = imports(&h);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].asset_path, "Assets/second.mat");
        assert_eq!(found[1].asset_path, "Assets/first.mat");
    }

    #[test]
    fn test_timestamp_match_picks_closest() {
        let mut h = Harness::new();
        h.feed(concat!(
            "2024-01-01T10:00:00Z|0x1|Start importing Assets/slow.png using Guid(01)\n",
            "2024-01-01T10:00:30Z|0x1|Start importing Assets/fast.png using Guid(02)\n",
            "2024-01-01T10:00:20Z|0x1|-> (artifact id: 'aa') in 20.0 seconds\n",
        ));
        let found = imports(&h);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].asset_path, "Assets/slow.png");
        assert!(h.state.pending_imports.contains_key("02"));
    }

    #[test]
    fn test_orphan_completion_is_discarded() {
        let mut h = Harness::new();
        h.feed("Initialize engine version: 6000.0\n-> (artifact id: 'aa') in 1.0 seconds\n");
        assert!(imports(&h).is_empty());
    }

    #[test]
    fn test_folder_entries_are_skipped() {
        let mut h = Harness::new();
        h.feed(concat!(
            "Start importing Assets/Art using Guid(01) (DefaultImporter) -> (artifact id: 'aa') in 0.01 seconds\n",
            "Start importing Packages/com.unity.ugui using Guid(02) -> (artifact id: 'bb') in 0.01 seconds\n",
        ));
        assert!(imports(&h).is_empty());
    }

    #[test]
    fn test_animation_clip_category() {
        let mut h = Harness::new();
        h.feed("Start importing Assets/Run.anim using Guid(0c) -> (artifact id: 'dd') in 0.1 seconds\n");
        let found = imports(&h);
        assert_eq!(found[0].category, AssetCategory::Animation);
        assert_eq!(found[0].importer_type.as_deref(), Some("NativeFormatImporter"));
    }
}
