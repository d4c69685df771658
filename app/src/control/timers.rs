use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::adapter::backend::{ScheduledTimer, TimerId};

/// Last timer list fetched from the backend. Scheduling and firing happen there.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimerBoard {
    pub timers: Vec<ScheduledTimer>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl TimerBoard {
    pub fn replace(&mut self, timers: Vec<ScheduledTimer>, at: DateTime<Utc>) -> bool {
        let changed = self.timers != timers;
        self.timers = timers;
        self.refreshed_at = Some(at);
        changed
    }

    /// Maps an id taken from a URL back to the id as the backend sent it.
    pub fn resolve_id(&self, raw: &str) -> TimerId {
        self.timers
            .iter()
            .map(|t| &t.id)
            .find(|id| id.to_string() == raw)
            .cloned()
            .unwrap_or_else(|| TimerId::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(id: TimerId) -> ScheduledTimer {
        ScheduledTimer {
            id,
            time: "2026-10-20T07:30:00+03:00".to_owned(),
            display_angle: 50.0,
        }
    }

    #[test]
    fn numeric_looking_text_ids_stay_text() {
        let mut board = TimerBoard::default();
        board.replace(vec![timer(TimerId::Text("42".to_owned()))], Utc::now());

        assert_eq!(board.resolve_id("42"), TimerId::Text("42".to_owned()));
    }

    #[test]
    fn unknown_ids_are_parsed() {
        let board = TimerBoard::default();

        assert_eq!(board.resolve_id("42"), TimerId::Number(42));
        assert_eq!(board.resolve_id("abc"), TimerId::Text("abc".to_owned()));
    }

    #[test]
    fn replace_reports_changes() {
        let mut board = TimerBoard::default();

        assert!(board.replace(vec![timer(TimerId::Number(1))], Utc::now()));
        assert!(!board.replace(vec![timer(TimerId::Number(1))], Utc::now()));
        assert!(board.replace(vec![], Utc::now()));
        assert!(board.refreshed_at.is_some());
    }
}
