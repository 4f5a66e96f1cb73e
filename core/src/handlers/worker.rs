use chrono::{NaiveDateTime, TimeDelta};

use super::asset_import::{emit_import, pending_from_start};
use super::patterns::{ARTIFACT_COMPLETION, IMPORT_COMPLETE, IMPORT_START, IMPORTER_LINE, split_worker};
use super::{LineHandler, LogLine, ParseContext};
use crate::events::asset;
use crate::state::Barrier;
use crate::timestamp::{add_delta, delta_from_secs, parse_seconds, sub_delta};

/// Idle time after which a worker's next line starts a new barrier.
pub const BARRIER_IDLE_GAP: TimeDelta = TimeDelta::seconds(5);

/// Lines printed by asset import worker threads (`[WorkerN] ...`).
pub struct WorkerThreadHandler;

impl LineHandler for WorkerThreadHandler {
    fn name(&self) -> &'static str {
        "worker_thread"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        let Some((thread, body)) = split_worker(line.text) else {
            return false;
        };
        ctx.observe_timestamp(line.timestamp);
        open_or_rotate_barrier(thread, line, ctx);

        let body = body.trim();
        let timestamped = ctx.state.is_timestamped();
        let now = ctx.state.now(line.timestamp);

        if let Some(caps) = IMPORT_COMPLETE.captures(body) {
            let Some(secs) = parse_seconds(&caps["secs"]) else {
                tracing::debug!(thread, line = line.line_number, "Malformed worker import duration");
                return true;
            };
            let duration = delta_from_secs(secs);
            let (start, end) = if timestamped {
                (sub_delta(now, duration), now)
            } else {
                let start = ctx.state.thread_clock(thread);
                (start, add_delta(start, duration))
            };
            let pending = pending_from_start(&caps, line, start);
            let artifact = caps.name("artifact").map(|m| m.as_str().to_string());
            let emitted = emit_import(ctx, pending, artifact, secs * 1000.0, Some(thread), start, end);
            record_activity(ctx, thread, end, emitted);
        } else if let Some(caps) = IMPORT_START.captures(body) {
            let start = if timestamped { now } else { ctx.state.thread_clock(thread) };
            let pending = pending_from_start(&caps, line, start);
            if let Some(previous) = ctx.state.worker_imports.insert(thread, pending) {
                tracing::debug!(
                    thread,
                    path = %previous.asset_path,
                    "Worker started a new import before finishing the last"
                );
            }
        } else if let Some(caps) = IMPORTER_LINE.captures(body) {
            if let Some(pending) = ctx.state.worker_imports.get_mut(&thread)
                && pending.importer_type.is_none()
            {
                pending.importer_type = asset::normalize_importer(&caps["importer"]);
                pending.is_animation |=
                    asset::is_animation(&pending.asset_path, pending.importer_type.as_deref());
            }
        } else if let Some(caps) = ARTIFACT_COMPLETION.captures(body) {
            let Some(secs) = parse_seconds(&caps["secs"]) else {
                tracing::debug!(thread, line = line.line_number, "Malformed worker import duration");
                return true;
            };
            let duration = delta_from_secs(secs);
            let pending = ctx
                .state
                .worker_imports
                .remove(&thread)
                .or_else(|| ctx.state.take_matching_import(line.timestamp, duration));
            let Some(pending) = pending else {
                tracing::debug!(thread, line = line.line_number, "Worker completion without a pending import");
                return true;
            };
            let start = pending.start_timestamp;
            let end = if timestamped { now.max(start) } else { add_delta(start, duration) };
            let artifact = Some(caps["artifact"].to_string());
            let emitted = emit_import(ctx, pending, artifact, secs * 1000.0, Some(thread), start, end);
            record_activity(ctx, thread, end, emitted);
        } else if timestamped {
            record_activity(ctx, thread, now, false);
        }
        true
    }
}

fn open_or_rotate_barrier(thread: u32, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) {
    if let Some(barrier) = ctx.state.worker_barriers.get(&thread) {
        let idle = line
            .timestamp
            .is_some_and(|ts| ts - barrier.last_activity > BARRIER_IDLE_GAP);
        if !idle {
            return;
        }
        tracing::debug!(thread, line = line.line_number, "Worker idle, starting a new barrier");
        if let Some(stale) = ctx.state.worker_barriers.remove(&thread) {
            let end = stale.last_activity;
            ctx.emit_barriers(vec![(thread, stale)], end);
        }
    }

    let start: NaiveDateTime = if ctx.state.is_timestamped() {
        ctx.state.now(line.timestamp)
    } else {
        ctx.state.sync_thread_clock(thread)
    };
    ctx.state.worker_barriers.insert(
        thread,
        Barrier {
            start_timestamp: start,
            import_count: 0,
            start_line_number: line.line_number,
            start_byte_offset: line.byte_offset,
            last_activity: start,
        },
    );
}

fn record_activity(ctx: &mut ParseContext<'_>, thread: u32, at: NaiveDateTime, imported: bool) {
    if !ctx.state.is_timestamped() {
        ctx.state.set_thread_clock(thread, at);
    }
    if let Some(barrier) = ctx.state.worker_barriers.get_mut(&thread) {
        barrier.last_activity = barrier.last_activity.max(at);
        if imported {
            barrier.import_count += 1;
        }
    }
}
