use std::sync::LazyLock;

use regex::Regex;

use super::{LineHandler, LogLine, ParseContext};
use crate::events::{LogEvent, PipelineRefresh, ProcessEvent, ProcessKind};
use crate::state::PipelineRefreshBuffer;
use crate::timestamp::{delta_from_secs, parse_seconds, sub_delta};

/// Summary lines read after the refresh header before the block is closed.
pub const REFRESH_SUMMARY_MAX_LINES: u32 = 10;

static REFRESH_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Initial Refresh Start|Refresh Start\b").expect("refresh start pattern"));
static REFRESH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Asset Pipeline Refresh \(id=(?P<id>[0-9A-Za-z]+)\): Total: (?P<total>\S+) seconds - Initiated by (?P<by>.+?)\s*$")
        .expect("refresh pattern")
});
static IMPORTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Imports: total=(\d+).*?actual=(\d+)").expect("imports pattern"));
static DB_PROCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Asset DB Process Time: managed=(\d+)\s*ms.*?native=(\d+)\s*ms").expect("db process pattern")
});
static DB_CALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Asset DB Callback time: managed=(\d+)\s*ms.*?native=(\d+)\s*ms").expect("db callback pattern")
});
static SCRIPTING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Scripting: domain reloads=(\d+).*?domain reload time=(\d+)\s*ms.*?compile time=(\d+)\s*ms.*?other=(\d+)\s*ms",
    )
    .expect("scripting pattern")
});

const SUMMARY_KEYS: &[&str] = &["Summary:", "Imports:", "Asset DB", "Scripting:", "Project Asset Count:", "Asset File Changes:"];

fn is_summary_line(text: &str) -> bool {
    text.starts_with('\t')
        || text.starts_with(' ')
        || SUMMARY_KEYS.iter().any(|k| text.starts_with(k))
}

fn sum_pair(caps: &regex::Captures<'_>) -> Option<f64> {
    let a: f64 = caps.get(1)?.as_str().parse().ok()?;
    let b: f64 = caps.get(2)?.as_str().parse().ok()?;
    Some(a + b)
}

/// `Asset Pipeline Refresh` summaries and the refresh start marker.
pub struct PipelineRefreshHandler;

impl LineHandler for PipelineRefreshHandler {
    fn name(&self) -> &'static str {
        "pipeline_refresh"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        if let Some(caps) = REFRESH.captures(line.text) {
            finalize(ctx);
            let Some(total_secs) = parse_seconds(&caps["total"]) else {
                tracing::debug!(line = line.line_number, total = &caps["total"], "Malformed refresh total");
                return false;
            };
            let start_timestamp = if ctx.state.is_timestamped() {
                ctx.state.refresh_started_at.take()
            } else {
                None
            };
            ctx.state.pipeline_refresh = Some(PipelineRefreshBuffer {
                line_number: line.line_number,
                byte_offset: line.byte_offset,
                refresh_id: caps["id"].to_string(),
                total_secs,
                initiated_by: caps["by"].to_string(),
                start_timestamp,
                end_timestamp: ctx.state.now(line.timestamp),
                summary_lines: 0,
                imports_total: None,
                imports_actual: None,
                asset_db_process_ms: None,
                asset_db_callback_ms: None,
                domain_reloads: None,
                domain_reload_ms: None,
                compile_ms: None,
                scripting_other_ms: None,
            });
            return true;
        }

        if ctx.state.pipeline_refresh.is_none() {
            if REFRESH_START.is_match(line.text) {
                if let Some(ts) = line.timestamp
                    && ctx.state.is_timestamped()
                {
                    ctx.state.refresh_started_at = Some(ts);
                }
                return true;
            }
            return false;
        }

        let text = line.text;
        if text.trim().is_empty() {
            finalize(ctx);
            return true;
        }
        let at_limit = ctx
            .state
            .pipeline_refresh
            .as_ref()
            .is_some_and(|b| b.summary_lines >= REFRESH_SUMMARY_MAX_LINES);
        if at_limit || !is_summary_line(text) {
            finalize(ctx);
            return false;
        }

        let Some(buffer) = ctx.state.pipeline_refresh.as_mut() else {
            return false;
        };
        buffer.summary_lines += 1;
        let trimmed = text.trim();
        if let Some(caps) = IMPORTS.captures(trimmed) {
            buffer.imports_total = caps[1].parse().ok();
            buffer.imports_actual = caps[2].parse().ok();
        } else if let Some(caps) = DB_PROCESS.captures(trimmed) {
            buffer.asset_db_process_ms = sum_pair(&caps);
        } else if let Some(caps) = DB_CALLBACK.captures(trimmed) {
            buffer.asset_db_callback_ms = sum_pair(&caps);
        } else if let Some(caps) = SCRIPTING.captures(trimmed) {
            buffer.domain_reloads = caps[1].parse().ok();
            buffer.domain_reload_ms = caps[2].parse().ok();
            buffer.compile_ms = caps[3].parse().ok();
            buffer.scripting_other_ms = caps[4].parse().ok();
        }
        true
    }

    fn finish(&self, ctx: &mut ParseContext<'_>) {
        finalize(ctx);
    }
}

fn finalize(ctx: &mut ParseContext<'_>) {
    let Some(buffer) = ctx.state.pipeline_refresh.take() else {
        return;
    };
    let total_ms = buffer.total_secs * 1000.0;
    let end = buffer.end_timestamp;
    let start = buffer
        .start_timestamp
        .filter(|s| *s <= end)
        .unwrap_or_else(|| sub_delta(end, delta_from_secs(buffer.total_secs)));

    ctx.emit(LogEvent::Process(ProcessEvent {
        kind: ProcessKind::PipelineRefresh,
        name: "Asset Pipeline Refresh".to_string(),
        line_number: buffer.line_number,
        byte_offset: buffer.byte_offset,
        duration_ms: total_ms,
        memory_mb: None,
        detail: Some(buffer.initiated_by.clone()),
        start_timestamp: start,
        end_timestamp: end,
    }));
    ctx.emit(LogEvent::PipelineRefresh(PipelineRefresh {
        line_number: buffer.line_number,
        byte_offset: buffer.byte_offset,
        refresh_id: buffer.refresh_id,
        total_ms,
        initiated_by: buffer.initiated_by,
        imports_total: buffer.imports_total,
        imports_actual: buffer.imports_actual,
        asset_db_process_ms: buffer.asset_db_process_ms,
        asset_db_callback_ms: buffer.asset_db_callback_ms,
        domain_reloads: buffer.domain_reloads,
        domain_reload_ms: buffer.domain_reload_ms,
        compile_ms: buffer.compile_ms,
        scripting_other_ms: buffer.scripting_other_ms,
        start_timestamp: start,
        end_timestamp: end,
    }));
}
