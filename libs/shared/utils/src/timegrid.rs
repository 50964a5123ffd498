use std::sync::OnceLock;

use regex::Regex;

/// Smallest slot granularity the grid supports.
pub const MIN_STEP_MINUTES: i32 = 5;

/// Parse "HH:MM" into minutes since midnight. Lenient by contract: a
/// component that fails to parse contributes 0, so callers that need strict
/// input must gate with [`is_hhmm`] first.
pub fn to_minutes(time: &str) -> i32 {
    let mut parts = time.splitn(2, ':');
    let hours = parts
        .next()
        .and_then(|p| p.trim().parse::<i32>().ok())
        .unwrap_or(0);
    let minutes = parts
        .next()
        .and_then(|p| p.trim().parse::<i32>().ok())
        .unwrap_or(0);
    hours * 60 + minutes
}

/// Render minutes since midnight back to "HH:MM".
pub fn from_minutes(total: i32) -> String {
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Half-open interval overlap on (start, duration) pairs, in minutes.
/// Touching boundaries do not overlap: [540,570) vs [570,600) is false.
pub fn overlap(start_a: i32, duration_a: i32, start_b: i32, duration_b: i32) -> bool {
    let end_a = start_a + duration_a;
    let end_b = start_b + duration_b;
    start_a < end_b && start_b < end_a
}

/// True iff `time` falls in [from, to), both bounds in minutes.
pub fn between(time: &str, from: i32, to: i32) -> bool {
    let t = to_minutes(time);
    t >= from && t < to
}

/// Strict 24-hour "HH:MM" check for request boundaries. The pattern is
/// compiled once; this sits on every booking request.
pub fn is_hhmm(time: &str) -> bool {
    static TIME_REGEX: OnceLock<Regex> = OnceLock::new();
    let time_regex =
        TIME_REGEX.get_or_init(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap());
    time_regex.is_match(time)
}

/// Finite, ordered sequence of slot start times for one window.
///
/// Yields "HH:MM" strings beginning at `from`, stepping by the window's
/// granularity, stopping strictly before `to`. Hour boundaries roll over
/// naturally because all arithmetic is on minutes. Clone the iterator to
/// restart the sequence.
#[derive(Debug, Clone)]
pub struct SlotTimes {
    current: i32,
    end: i32,
    step: i32,
}

pub fn slot_times(from: &str, to: &str, step_minutes: i32) -> SlotTimes {
    SlotTimes {
        current: to_minutes(from),
        end: to_minutes(to),
        step: step_minutes.max(MIN_STEP_MINUTES),
    }
}

impl Iterator for SlotTimes {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.current >= self.end {
            return None;
        }

        let slot = from_minutes(self.current);
        self.current += self.step;
        Some(slot)
    }
}
