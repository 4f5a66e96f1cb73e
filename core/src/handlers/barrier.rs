use super::{LineHandler, LogLine, ParseContext};
use crate::state::ParserState;

/// Main-thread chatter that can interleave with worker output without
/// meaning the workers are done.
const NOISE_PREFIXES: &[&str] = &["TcpMessagingSession", "[Licensing::", "Unloading ", "System memory in use"];
const NOISE_FRAGMENTS: &[&str] = &["UnloadTime:"];

pub fn is_barrier_noise(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty()
        || NOISE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || NOISE_FRAGMENTS.iter().any(|f| trimmed.contains(f))
}

/// Joins open worker barriers when the main thread resumes.
pub struct BarrierJoinHandler;

impl LineHandler for BarrierJoinHandler {
    fn name(&self) -> &'static str {
        "barrier_join"
    }

    fn applies(&self, state: &ParserState) -> bool {
        !state.worker_barriers.is_empty()
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        if is_barrier_noise(line.text) {
            return true;
        }
        ctx.join_barriers(line.timestamp);
        false
    }

    fn finish(&self, ctx: &mut ParseContext<'_>) {
        ctx.close_remaining_barriers();
    }
}
