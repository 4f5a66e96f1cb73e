use std::sync::LazyLock;

use regex::Regex;

use super::{LineHandler, LogLine, ParseContext};
use crate::events::{AcceleratorBlock, LogEvent};
use crate::state::{AcceleratorBuffer, AcceleratorSection, ParserState};
use crate::timestamp::span_ms;

static QUERY_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Querying for cacheable assets(?:.*?(?:in|took)\s+(?P<num>[\d.]+)\s*(?P<unit>ms|s|sec|seconds)\b)?")
        .expect("accelerator start pattern")
});

fn is_block_content(text: &str) -> bool {
    if text.starts_with('\t') || text.starts_with("  ") {
        return true;
    }
    let lower = text.to_ascii_lowercase();
    lower.contains("downloaded") || lower.contains("uploaded")
}

fn looks_like_asset(text: &str) -> bool {
    text.starts_with("Assets/") || text.starts_with("Packages/")
}

/// Runs ahead of the family handlers so that any foreign line closes an open
/// cache-server block before something else claims it.
pub struct AcceleratorContentCheck;

impl LineHandler for AcceleratorContentCheck {
    fn name(&self) -> &'static str {
        "accelerator_content_check"
    }

    fn applies(&self, state: &ParserState) -> bool {
        state.accelerator.is_some()
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        if !is_block_content(line.text) {
            finalize(ctx);
        }
        false
    }
}

/// Cache-server (Unity Accelerator) query blocks.
pub struct AcceleratorHandler;

impl LineHandler for AcceleratorHandler {
    fn name(&self) -> &'static str {
        "accelerator"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        let now = ctx.state.now(line.timestamp);

        if let Some(caps) = QUERY_START.captures(line.text.trim_start()) {
            if ctx.state.accelerator.is_some() {
                finalize(ctx);
            }
            let duration_ms = caps.name("num").and_then(|n| n.as_str().parse::<f64>().ok()).map(|n| {
                match caps.name("unit").map(|u| u.as_str()) {
                    Some("ms") => n,
                    _ => n * 1000.0,
                }
            });
            ctx.state.accelerator = Some(AcceleratorBuffer {
                line_number: line.line_number,
                byte_offset: line.byte_offset,
                start_timestamp: now,
                last_timestamp: now,
                section: AcceleratorSection::Requested,
                requested: Vec::new(),
                downloaded: Vec::new(),
                uploaded: Vec::new(),
                duration_ms,
            });
            return true;
        }

        let Some(buffer) = ctx.state.accelerator.as_mut() else {
            return false;
        };
        buffer.last_timestamp = buffer.last_timestamp.max(now);

        if line.text.starts_with('\t') || line.text.starts_with("  ") {
            let entry = line.text.trim();
            let path = entry.split(": ").next().unwrap_or(entry).trim();
            if !path.is_empty() {
                buffer.push(path.to_string());
            }
            return true;
        }

        let lower = line.text.to_ascii_lowercase();
        if lower.contains("downloaded") {
            buffer.section = AcceleratorSection::Downloaded;
        } else if lower.contains("uploaded") {
            buffer.section = AcceleratorSection::Uploaded;
        }
        if let Some((_, tail)) = line.text.rsplit_once(": ") {
            let tail = tail.trim();
            if looks_like_asset(tail) {
                buffer.push(tail.to_string());
            }
        }
        true
    }

    fn finish(&self, ctx: &mut ParseContext<'_>) {
        finalize(ctx);
    }
}

fn finalize(ctx: &mut ParseContext<'_>) {
    let Some(buffer) = ctx.state.accelerator.take() else {
        return;
    };
    let duration_ms = buffer.duration_ms.or_else(|| {
        ctx.state
            .is_timestamped()
            .then(|| span_ms(buffer.start_timestamp, buffer.last_timestamp))
    });
    tracing::debug!(
        requested = buffer.requested.len(),
        downloaded = buffer.downloaded.len(),
        uploaded = buffer.uploaded.len(),
        "Accelerator block closed"
    );
    ctx.emit(LogEvent::AcceleratorBlock(AcceleratorBlock {
        line_number: buffer.line_number,
        byte_offset: buffer.byte_offset,
        requested_assets: buffer.requested,
        downloaded_assets: buffer.downloaded,
        uploaded_assets: buffer.uploaded,
        duration_ms,
        start_timestamp: buffer.start_timestamp,
        end_timestamp: buffer.last_timestamp,
    }));
}
