use super::{LineHandler, LogLine, ParseContext};

/// Moves the logical clock to each real timestamp. Never claims a line.
pub struct ClockObserver;

impl LineHandler for ClockObserver {
    fn name(&self) -> &'static str {
        "clock_observer"
    }

    fn handle(&self, line: &LogLine<'_>, ctx: &mut ParseContext<'_>) -> bool {
        ctx.observe_timestamp(line.timestamp);
        false
    }
}
