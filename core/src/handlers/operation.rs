use std::sync::LazyLock;

use regex::Regex;

use super::patterns::OPERATION;
use super::{LineHandler, LogLine, ParseContext};
use crate::events::{LogEvent, ProcessEvent, ProcessKind};
use crate::timestamp::{delta_from_ms, parse_millis, parse_seconds};

static TUNDRA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*\*\s+Tundra\s+(?P<status>[^(]+?)\s*\((?P<secs>[\d.]+)\s+seconds?\),\s+(?P<updated>\d+)\s+items?\s+updated,\s+(?P<evaluated>\d+)\s+evaluated")
        .expect("tundra pattern")
});
static TOOK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z][\w .\-/\[\]]*?)\s+took\s+(?P<num>\d+(?:\.\d+)?)\s*(?P<unit>ms|s|sec|secs|seconds)\b")
        .expect("took pattern")
});

/// Timed editor operations that are not part of a larger block.
pub struct OperationHandler;

impl LineHandler for OperationHandler {
    fn name(&self) -> &'static str {
        "operation"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        let text = line.text.trim();

        let (name, detail, duration_ms, memory_mb) = if let Some(caps) = OPERATION.captures(text) {
            let Some(secs) = parse_seconds(&caps["secs"]) else {
                tracing::debug!(line = line.line_number, "Malformed operation duration");
                return true;
            };
            (
                caps["name"].to_string(),
                Some(caps["kind"].trim().to_string()),
                secs * 1000.0,
                caps.name("mem").and_then(|m| m.as_str().parse().ok()),
            )
        } else if let Some(caps) = TUNDRA.captures(text) {
            let Some(secs) = parse_seconds(&caps["secs"]) else {
                tracing::debug!(line = line.line_number, "Malformed operation duration");
                return true;
            };
            (
                format!("Tundra {}", caps["status"].trim()),
                Some(format!("{} updated, {} evaluated", &caps["updated"], &caps["evaluated"])),
                secs * 1000.0,
                None,
            )
        } else if let Some(caps) = TOOK.captures(text) {
            let ms = if &caps["unit"] == "ms" {
                parse_millis(&caps["num"])
            } else {
                parse_seconds(&caps["num"]).map(|s| s * 1000.0)
            };
            let Some(ms) = ms else {
                tracing::debug!(line = line.line_number, "Malformed operation duration");
                return true;
            };
            (caps["name"].trim().to_string(), None, ms, None)
        } else {
            return false;
        };

        let (start, end) = ctx.state.forward_span(line.timestamp, delta_from_ms(duration_ms));
        ctx.emit(LogEvent::Process(ProcessEvent {
            kind: ProcessKind::Operation,
            name,
            line_number: line.line_number,
            byte_offset: line.byte_offset,
            duration_ms,
            memory_mb,
            detail,
            start_timestamp: start,
            end_timestamp: end,
        }));
        true
    }
}
