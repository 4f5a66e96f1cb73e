use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{LineHandler, LogLine, ParseContext};
use crate::events::{LogEvent, ProcessEvent, ProcessKind};
use crate::timestamp::{MAX_DURATION_SECS, delta_from_ms};

/// Marker Unity puts in front of a structured telemetry payload.
pub const UTP_MARKER: &str = "##utp:";

static UTP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"##utp:(?P<json>\{.+\})").expect("telemetry pattern"));

/// `##utp:{…}` telemetry messages. Each one becomes a `Telemetry` process
/// named after its `type`; a `duration` field (ms) is reported backward from
/// the line.
pub struct TelemetryHandler;

impl LineHandler for TelemetryHandler {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        if !line.text.contains(UTP_MARKER) {
            return false;
        }
        let Some(caps) = UTP.captures(line.text) else {
            tracing::debug!(line = line.line_number, "Telemetry marker without a payload");
            return true;
        };
        let json = &caps["json"];
        let payload: Value = match serde_json::from_str(json) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(line = line.line_number, error = %e, "Malformed telemetry payload");
                return true;
            }
        };

        let kind = payload.get("type").and_then(Value::as_str).unwrap_or("Unknown");
        let name = match payload.get("name").and_then(Value::as_str) {
            Some(name) => format!("{kind}: {name}"),
            None => kind.to_string(),
        };
        let duration_ms = payload
            .get("duration")
            .and_then(Value::as_f64)
            .filter(|ms| ms.is_finite() && (0.0..=MAX_DURATION_SECS * 1_000.0).contains(ms))
            .unwrap_or(0.0);

        let (start, end) = ctx.state.backward_span(line.timestamp, delta_from_ms(duration_ms));
        ctx.emit(LogEvent::Process(ProcessEvent {
            kind: ProcessKind::Telemetry,
            name,
            line_number: line.line_number,
            byte_offset: line.byte_offset,
            duration_ms,
            memory_mb: None,
            detail: Some(json.to_string()),
            start_timestamp: start,
            end_timestamp: end,
        }));
        true
    }
}
