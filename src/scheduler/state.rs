use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// All mutable scheduling state, owned by the [`Scheduler`] and never
/// reachable outside it except through snapshot queries.
///
/// [`Scheduler`]: super::Scheduler
#[derive(Debug)]
pub struct SchedulerState {
    /// Slot keys awaiting classification. BTreeSet iteration order is
    /// lexicographic, which for slot keys equals chronological order.
    pub(super) pending: BTreeSet<String>,
    /// Slot keys whose notifications were withheld while the user was away.
    /// Separate from `pending`: it throttles the notification channel only.
    pub(super) digest: Vec<String>,
    /// Last slot key surfaced as stale, to avoid repeat alerts for the same
    /// interval while it remains the oldest pending item.
    pub(super) last_stale_key: Option<String>,
    pub(super) window_focused: bool,
    pub(super) last_activity: Option<Instant>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            pending: BTreeSet::new(),
            digest: Vec::new(),
            last_stale_key: None,
            window_focused: true,
            last_activity: None,
        }
    }
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted snapshot of the pending queue.
    pub fn pending_sorted(&self) -> Vec<String> {
        self.pending.iter().cloned().collect()
    }

    /// Away means the window is unfocused, or the user has been idle for
    /// longer than one slot length.
    pub(super) fn is_away(&self, slot_minutes: u32) -> bool {
        if !self.window_focused {
            return true;
        }
        let idle_limit = Duration::from_secs(u64::from(slot_minutes) * 60);
        self.last_activity
            .map(|t| t.elapsed() > idle_limit)
            .unwrap_or(false)
    }

    pub(super) fn take_digest(&mut self) -> Vec<String> {
        std::mem::take(&mut self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_snapshot_is_chronologically_sorted() {
        let mut state = SchedulerState::new();
        state.pending.insert("2025-11-03T10:30".into());
        state.pending.insert("2025-11-03T08:15".into());
        state.pending.insert("2025-11-02T15:45".into());
        assert_eq!(
            state.pending_sorted(),
            vec!["2025-11-02T15:45", "2025-11-03T08:15", "2025-11-03T10:30"]
        );
    }

    #[test]
    fn unfocused_window_counts_as_away() {
        let mut state = SchedulerState::new();
        assert!(!state.is_away(15));
        state.window_focused = false;
        assert!(state.is_away(15));
    }

    #[test]
    fn recent_activity_is_not_idle() {
        let mut state = SchedulerState::new();
        state.last_activity = Some(Instant::now());
        assert!(!state.is_away(15));
    }

    #[test]
    fn take_digest_drains_accumulated_keys() {
        let mut state = SchedulerState::new();
        state.digest.push("2025-11-03T08:15".into());
        assert_eq!(state.take_digest(), vec!["2025-11-03T08:15"]);
        assert!(state.digest.is_empty());
    }
}
