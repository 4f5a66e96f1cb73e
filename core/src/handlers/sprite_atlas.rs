use std::sync::LazyLock;

use regex::Regex;

use super::patterns::{ARTIFACT_COMPLETION, OPERATION};
use super::{LineHandler, LogLine, ParseContext};
use crate::events::{AssetCategory, AtlasOperation, LogEvent, SpriteAtlasImport};
use crate::state::SpriteAtlasBuffer;
use crate::timestamp::{add_delta, delta_from_secs, parse_seconds, span_ms};

static ATLAS_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^(?:start(?:ing)?\s+)?(?:re)?pack(?:ing)?\s+sprite\s*atlas(?:es)?\b[:\s]*['"]?(?P<name>[^'"]*?)['"]?\s*$"#)
        .expect("sprite atlas start pattern")
});

const DEFAULT_ATLAS_NAME: &str = "SpriteAtlas";

/// Progress lines inside an open pack that carry nothing to record.
const ATLAS_CONTENT: &[&str] = &["Processing sprite", "Processing Atlas", "Sprite Atlas"];

/// Sprite atlas packing: start line, operation lines, artifact completion.
pub struct SpriteAtlasHandler;

impl LineHandler for SpriteAtlasHandler {
    fn name(&self) -> &'static str {
        "sprite_atlas"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        let text = line.text.trim();

        if let Some(caps) = ATLAS_START.captures(text) {
            if ctx.state.sprite_atlas.is_some() {
                tracing::debug!(line = line.line_number, "Atlas pack restarted before completing");
                finalize(ctx, None, None, line.timestamp);
            }
            let name = caps.name("name").map(|m| m.as_str().trim()).unwrap_or_default();
            ctx.state.sprite_atlas = Some(SpriteAtlasBuffer {
                line_number: line.line_number,
                byte_offset: line.byte_offset,
                atlas_name: if name.is_empty() { DEFAULT_ATLAS_NAME.to_string() } else { name.to_string() },
                start_timestamp: ctx.state.now(line.timestamp),
                operations: Vec::new(),
            });
            return true;
        }

        if ctx.state.sprite_atlas.is_none() {
            return false;
        }

        if let Some(caps) = OPERATION.captures(text) {
            let Some(secs) = parse_seconds(&caps["secs"]) else {
                return true;
            };
            ctx.state.forward_span(line.timestamp, delta_from_secs(secs));
            if let Some(buffer) = ctx.state.sprite_atlas.as_mut() {
                buffer.operations.push(AtlasOperation {
                    name: caps["name"].to_string(),
                    duration_ms: secs * 1000.0,
                });
            }
            return true;
        }

        if ATLAS_CONTENT.iter().any(|p| text.starts_with(p)) {
            return true;
        }

        if let Some(caps) = ARTIFACT_COMPLETION.captures(text) {
            let secs = parse_seconds(&caps["secs"]);
            finalize(ctx, Some(caps["artifact"].to_string()), secs, line.timestamp);
            return true;
        }

        false
    }

    fn finish(&self, ctx: &mut ParseContext<'_>) {
        if let Some(buffer) = &ctx.state.sprite_atlas {
            tracing::warn!(atlas = %buffer.atlas_name, line = buffer.line_number, "Atlas pack never completed");
        }
        finalize(ctx, None, None, None);
    }
}

fn finalize(
    ctx: &mut ParseContext<'_>,
    artifact_id: Option<String>,
    secs: Option<f64>,
    line_ts: Option<chrono::NaiveDateTime>,
) {
    let Some(buffer) = ctx.state.sprite_atlas.take() else {
        return;
    };
    let start = buffer.start_timestamp;
    let end = if ctx.state.is_timestamped() {
        ctx.state.now(line_ts).max(start)
    } else {
        let end = secs
            .map(|s| add_delta(start, delta_from_secs(s)))
            .unwrap_or(start)
            .max(ctx.state.logical_clock);
        ctx.state.advance_to(end);
        end
    };
    let duration_ms = secs.map_or_else(|| span_ms(start, end), |s| s * 1000.0);

    ctx.emit(LogEvent::SpriteAtlasImport(SpriteAtlasImport {
        line_number: buffer.line_number,
        byte_offset: buffer.byte_offset,
        asset_path: format!("SpriteAtlas/{}", buffer.atlas_name),
        atlas_name: buffer.atlas_name,
        category: AssetCategory::SpriteAtlas,
        artifact_id,
        operations: buffer.operations,
        duration_ms,
        start_timestamp: start,
        end_timestamp: end,
    }));
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use crate::events::{AssetCategory, LogEvent};
    use crate::timestamp::synthetic_epoch;
    use chrono::TimeDelta;

    #[test]
    fn test_atlas_block() {
        let mut h = Harness::new();
        h.feed(concat!(
            "Initialize engine version: 1\n",
            "Repacking sprite atlas 'UI_Main'\n",
            "Processing sprite: Assets/UI/button.png\n",
            "Sprite Atlas Operation : \" ## Generate Atlas Textures ## \" took 0.250 sec (current mem: 1805 MB)\n",
            "-> (artifact id: 'abcd') in 0.750 seconds\n",
        ));
        let atlases = h.of_kind("sprite_atlas_import");
        assert_eq!(atlases.len(), 1);
        let LogEvent::SpriteAtlasImport(a) = atlases[0] else { unreachable!() };
        assert_eq!(a.atlas_name, "UI_Main");
        assert_eq!(a.asset_path, "SpriteAtlas/UI_Main");
        assert_eq!(a.category, AssetCategory::SpriteAtlas);
        assert_eq!(a.artifact_id.as_deref(), Some("abcd"));
        assert_eq!(a.operations.len(), 1);
        assert_eq!(a.duration_ms, 750.0);
        assert_eq!(a.start_timestamp, synthetic_epoch());
        assert_eq!(a.end_timestamp, synthetic_epoch() + TimeDelta::milliseconds(750));
        // The completion belonged to the atlas, not to an import.
        assert!(h.of_kind("asset_import").is_empty());
        assert!(h.of_kind("process").iter().all(|p| matches!(p, LogEvent::Process(p) if p.name == "Initialization")));
    }

    #[test]
    fn test_unnamed_atlas() {
        let mut h = Harness::new();
        h.feed("Initialize engine version: 1\nPacking sprite atlases\n").finish();
        let atlases = h.of_kind("sprite_atlas_import");
        let LogEvent::SpriteAtlasImport(a) = atlases[0] else { unreachable!() };
        assert_eq!(a.atlas_name, "SpriteAtlas");
        assert_eq!(a.artifact_id, None);
    }

    #[test]
    fn test_open_atlas_lets_compile_lines_through() {
        let mut h = Harness::new();
        h.feed(concat!(
            "Initialize engine version: 1\n",
            "Repacking sprite atlas 'UI_Main'\n",
            "Processing Atlas : UI_Main\n",
            "Processing assembly Library/ScriptAssemblies/Game.dll, with 10 defines and 4 references\n",
        ));
        assert!(h.state.sprite_atlas.is_some());
        let block = h.state.script_compilation.as_ref().unwrap();
        assert_eq!(block.assemblies.len(), 1);
        assert_eq!(block.assemblies[0].path, "Library/ScriptAssemblies/Game.dll");
        assert_eq!(h.claims[2], Some("sprite_atlas"));
        assert_eq!(h.claims[3], Some("script_compilation"));
    }
}
