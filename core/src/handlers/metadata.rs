use std::sync::LazyLock;

use regex::Regex;

use super::patterns::WORKER_PREFIX;
use super::telemetry::UTP_MARKER;
use super::{LineHandler, LogLine, ParseContext};
use crate::events::{LogEvent, MetadataPatch, ProcessEvent, ProcessKind, asset};
use crate::state::ParserState;
use crate::timestamp::span_ms;

/// Header lines inspected before metadata mode gives up on its own.
pub const METADATA_MAX_HEADER_LINES: u64 = 100;

/// Lines that mean the editor has moved past its preamble.
const END_MARKERS: &[&str] = &[
    "Initialize engine version",
    "[Package Manager]",
    "Start importing",
    "Asset Pipeline Refresh",
    "Initial Refresh Start",
    "Requested script compilation",
    "Querying for cacheable assets",
    "Domain Reload Profiling",
];

static UNITY_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Unity Editor version:\s+(\S+)").expect("version pattern"));
static ARCHITECTURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Architecture:\s+(\S+)").expect("architecture pattern"));
static PROJECT_PATH_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)-projectpath\s+(\S+)").expect("projectpath pattern"));
static PROJECT_PATH_CHANGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Successfully changed project path to:\s+(\S+)").expect("project path pattern")
});

/// Collects header fields until the log proper begins, then emits the
/// `Initialization` process and the metadata patch.
pub struct MetadataHandler;

impl LineHandler for MetadataHandler {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn applies(&self, state: &ParserState) -> bool {
        state.metadata.is_some()
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        if ctx.state.timestamps_enabled.is_none() {
            let enabled = line.timestamp.is_some();
            tracing::debug!(timestamps = enabled, "Timestamp mode decided from first line");
            ctx.state.timestamps_enabled = Some(enabled);
        }
        ctx.observe_timestamp(line.timestamp);
        let now = ctx.state.now(line.timestamp);
        if line.text.contains(UTP_MARKER) {
            return false;
        }

        let ends_preamble = line.line_number > METADATA_MAX_HEADER_LINES
            || WORKER_PREFIX.is_match(line.text)
            || END_MARKERS.iter().any(|m| line.text.contains(m));
        if ends_preamble {
            finalize(line, ctx);
            return false;
        }

        let Some(buffer) = ctx.state.metadata.as_mut() else {
            return false;
        };
        buffer.started_at.get_or_insert(now);

        let text = line.text.trim();
        if buffer.expect_project_path {
            buffer.expect_project_path = false;
            if !text.is_empty() && !text.starts_with('-') {
                buffer.project_name = Some(project_name(text));
                return true;
            }
        }

        if let Some(caps) = UNITY_VERSION.captures(text) {
            buffer.unity_version = Some(caps[1].to_string());
        } else if let Some(platform) = platform_of(text) {
            buffer.platform = Some(platform.to_string());
        } else if let Some(caps) = ARCHITECTURE.captures(text) {
            buffer.architecture = Some(caps[1].to_string());
        } else if let Some(caps) = PROJECT_PATH_CHANGED.captures(text) {
            buffer.project_name = Some(project_name(&caps[1]));
        } else if let Some(caps) = PROJECT_PATH_ARG.captures(text) {
            buffer.project_name = Some(project_name(&caps[1]));
        } else if text.eq_ignore_ascii_case("-projectpath") {
            buffer.expect_project_path = true;
        }
        true
    }

    fn finish(&self, ctx: &mut ParseContext<'_>) {
        if ctx.state.metadata.is_some() {
            let now = ctx.state.logical_clock;
            emit_initialization(ctx, 1, 0, now);
        }
    }
}

fn platform_of(text: &str) -> Option<&'static str> {
    if text.contains("macOS version:") {
        Some("macOS")
    } else if text.contains("Windows version:") {
        Some("Windows")
    } else if text.contains("Linux version:") {
        Some("Linux")
    } else {
        None
    }
}

fn project_name(path: &str) -> String {
    asset::asset_name(path.trim_matches(['"', '\''])).to_string()
}

fn finalize(line: &LogLine<'_>, ctx: &mut ParseContext<'_>) {
    let now = ctx.state.now(line.timestamp);
    emit_initialization(ctx, line.line_number, line.byte_offset, now);
}

fn emit_initialization(ctx: &mut ParseContext<'_>, line_number: u64, byte_offset: u64, end: chrono::NaiveDateTime) {
    let Some(buffer) = ctx.state.metadata.take() else {
        return;
    };
    let start = buffer.started_at.unwrap_or(end);
    tracing::debug!(
        unity_version = buffer.unity_version.as_deref().unwrap_or("unknown"),
        project = buffer.project_name.as_deref().unwrap_or("unknown"),
        "Header parsed"
    );
    ctx.emit(LogEvent::Process(ProcessEvent {
        kind: ProcessKind::Initialization,
        name: "Initialization".to_string(),
        line_number,
        byte_offset,
        duration_ms: span_ms(start, end),
        memory_mb: None,
        detail: buffer.unity_version.clone(),
        start_timestamp: start,
        end_timestamp: end,
    }));
    ctx.patch_metadata(MetadataPatch {
        unity_version: buffer.unity_version,
        platform: buffer.platform,
        architecture: buffer.architecture,
        project_name: buffer.project_name,
        ..Default::default()
    });
}
