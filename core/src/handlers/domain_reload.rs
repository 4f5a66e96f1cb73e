use std::sync::LazyLock;

use regex::Regex;

use super::{LineHandler, LogLine, ParseContext};
use crate::events::{LogEvent, ProcessEvent, ProcessKind};
use crate::state::{DomainReloadBuffer, ReloadStep};
use crate::timestamp::{delta_from_ms, parse_millis, sub_delta};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Domain Reload Profiling:\s*(?:(?P<ms>\d+(?:\.\d+)?)\s*ms)?").expect("domain reload pattern")
});
static STEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<indent>\t+)(?P<name>.+?) \((?P<ms>\d+(?:\.\d+)?)ms\)\s*$").expect("reload step pattern"));

/// `Domain Reload Profiling:` followed by its indented step tree.
pub struct DomainReloadHandler;

impl LineHandler for DomainReloadHandler {
    fn name(&self) -> &'static str {
        "domain_reload"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        if let Some(caps) = HEADER.captures(line.text.trim_start()) {
            finalize(ctx);
            ctx.state.domain_reload = Some(DomainReloadBuffer {
                line_number: line.line_number,
                byte_offset: line.byte_offset,
                total_ms: caps.name("ms").and_then(|m| parse_millis(m.as_str())),
                end_timestamp: ctx.state.now(line.timestamp),
                steps: Vec::new(),
            });
            return true;
        }

        let Some(buffer) = ctx.state.domain_reload.as_mut() else {
            return false;
        };
        if let Some(caps) = STEP.captures(line.text) {
            let Some(duration_ms) = parse_millis(&caps["ms"]) else {
                return true;
            };
            buffer.steps.push(ReloadStep {
                name: caps["name"].trim().to_string(),
                duration_ms,
                depth: caps["indent"].len() as u32,
            });
            return true;
        }
        finalize(ctx);
        false
    }

    fn finish(&self, ctx: &mut ParseContext<'_>) {
        finalize(ctx);
    }
}

fn finalize(ctx: &mut ParseContext<'_>) {
    let Some(buffer) = ctx.state.domain_reload.take() else {
        return;
    };
    let top_level: Vec<&ReloadStep> = buffer.steps.iter().filter(|s| s.depth == 1).collect();
    let total_ms = buffer
        .total_ms
        .unwrap_or_else(|| top_level.iter().map(|s| s.duration_ms).sum());
    let detail = (!top_level.is_empty()).then(|| {
        top_level
            .iter()
            .map(|s| format!("{} {}ms", s.name, s.duration_ms))
            .collect::<Vec<_>>()
            .join(", ")
    });
    let end = buffer.end_timestamp;
    ctx.emit(LogEvent::Process(ProcessEvent {
        kind: ProcessKind::DomainReload,
        name: "Domain Reload".to_string(),
        line_number: buffer.line_number,
        byte_offset: buffer.byte_offset,
        duration_ms: total_ms,
        memory_mb: None,
        detail,
        start_timestamp: sub_delta(end, delta_from_ms(total_ms)),
        end_timestamp: end,
    }));
}
