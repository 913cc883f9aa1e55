//! Execution-window classification for scheduled transfers.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Where an event's scheduled time falls relative to the trailing
/// execution window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// Inside the window: execute now.
    Due,
    /// Not yet reached: leave for a later tick.
    Future,
    /// Window already elapsed: never re-attempted.
    Missed,
}

impl Schedule {
    /// Classify against the half-open trailing window
    /// `now - window < scheduled <= now`.
    pub fn classify(scheduled: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> Self {
        if scheduled > now {
            Schedule::Future
        } else if scheduled > now - window {
            Schedule::Due
        } else {
            Schedule::Missed
        }
    }

    pub fn is_due(scheduled: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
        Self::classify(scheduled, now, window) == Schedule::Due
    }

    pub fn as_str(&self) -> &str {
        match self {
            Schedule::Due => "due",
            Schedule::Future => "future",
            Schedule::Missed => "missed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> Duration {
        Duration::minutes(5)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn exactly_now_is_due() {
        assert_eq!(Schedule::classify(now(), now(), window()), Schedule::Due);
    }

    #[test]
    fn just_inside_window_is_due() {
        let scheduled = now() - Duration::minutes(4) - Duration::seconds(59);
        assert_eq!(Schedule::classify(scheduled, now(), window()), Schedule::Due);
    }

    #[test]
    fn just_past_window_is_missed() {
        let scheduled = now() - Duration::minutes(5) - Duration::seconds(1);
        assert_eq!(Schedule::classify(scheduled, now(), window()), Schedule::Missed);
    }

    #[test]
    fn window_boundary_is_exclusive() {
        // scheduled == now - window sits on the open end of the interval
        let scheduled = now() - window();
        assert_eq!(Schedule::classify(scheduled, now(), window()), Schedule::Missed);
    }

    #[test]
    fn one_second_ahead_is_future() {
        let scheduled = now() + Duration::seconds(1);
        assert_eq!(Schedule::classify(scheduled, now(), window()), Schedule::Future);
    }
}
