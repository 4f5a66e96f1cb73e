//! Post-pass alignment of synthetic timelines.
//!
//! An untimestamped log is replayed on a clock that starts at the synthetic
//! epoch, but backward-reported summaries can land before it. Once the whole
//! file is parsed, everything is shifted so the earliest event sits exactly on
//! the epoch. Relative timing is untouched.

use chrono::TimeDelta;

use crate::events::LogEvent;
use crate::sink::EventSink;
use crate::state::ParserState;
use crate::timestamp::synthetic_epoch;

pub struct TimelineNormalizer;

impl TimelineNormalizer {
    /// Shift needed for this state, if any. Real-timestamped logs never move.
    pub fn compute_shift(state: &ParserState) -> Option<TimeDelta> {
        if state.timestamps_enabled != Some(false) {
            return None;
        }
        let earliest = state.first_timestamp?;
        let shift = synthetic_epoch() - earliest;
        (shift != TimeDelta::zero()).then_some(shift)
    }

    /// Apply the shift through the sink and to the state's bounds.
    pub fn normalize<K: EventSink + ?Sized>(state: &mut ParserState, sink: &mut K) -> Option<TimeDelta> {
        let shift = Self::compute_shift(state)?;
        tracing::debug!(shift_ms = shift.num_milliseconds(), "Normalizing synthetic timeline");
        sink.shift_timestamps(shift);
        state.shift_bounds(shift);
        Some(shift)
    }

    /// Same shift applied to an in-memory event list.
    pub fn apply(events: &mut [LogEvent], shift: TimeDelta) {
        for event in events {
            event.shift(shift);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn test_no_shift_for_timestamped_logs() {
        let mut state = ParserState::new();
        state.timestamps_enabled = Some(true);
        state.widen(synthetic_epoch() - TimeDelta::seconds(5));
        assert_eq!(TimelineNormalizer::compute_shift(&state), None);
    }

    #[test]
    fn test_shift_moves_earliest_to_epoch() {
        let mut state = ParserState::new();
        state.timestamps_enabled = Some(false);
        state.widen(synthetic_epoch() - TimeDelta::seconds(12));
        state.widen(synthetic_epoch() + TimeDelta::seconds(3));

        let mut sink = MemorySink::new();
        let shift = TimelineNormalizer::normalize(&mut state, &mut sink).unwrap();
        assert_eq!(shift, TimeDelta::seconds(12));
        assert_eq!(state.first_timestamp, Some(synthetic_epoch()));
        assert_eq!(state.last_timestamp, Some(synthetic_epoch() + TimeDelta::seconds(15)));
    }

    #[test]
    fn test_already_aligned_is_untouched() {
        let mut state = ParserState::new();
        state.timestamps_enabled = Some(false);
        state.widen(synthetic_epoch());
        assert_eq!(TimelineNormalizer::compute_shift(&state), None);
    }
}
