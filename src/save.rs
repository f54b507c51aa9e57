//! Debounced persistence scheduling.
//!
//! Each store instance owns its own scheduler, so parallel stores (tests
//! included) never share timer state. The scheduler only tracks deadlines
//! and dirty keys; the store performs the actual gateway writes when it
//! pumps [`SaveScheduler::take_due`].

use std::time::{Duration, Instant};

/// Quiet period before coalesced mutations are written out.
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
    Conversations,
    Settings,
}

/// Set of storage keys that need writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveTargets {
    pub conversations: bool,
    pub settings: bool,
}

impl SaveTargets {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.conversations && !self.settings
    }

    fn mark(&mut self, target: SaveTarget) {
        match target {
            SaveTarget::Conversations => self.conversations = true,
            SaveTarget::Settings => self.settings = true,
        }
    }
}

#[derive(Debug)]
pub struct SaveScheduler {
    delay: Duration,
    deadline: Option<Instant>,
    dirty: SaveTargets,
}

impl SaveScheduler {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            dirty: SaveTargets::default(),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Marks `target` dirty and restarts the quiet-period deadline, so a
    /// burst of rapid mutations produces exactly one write.
    pub fn schedule(&mut self, target: SaveTarget, now: Instant) {
        self.dirty.mark(target);
        self.deadline = Some(now + self.delay);
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns the dirty set once the quiet period has elapsed, clearing the
    /// pending state. Returns an empty set while the deadline is in the
    /// future or nothing is scheduled.
    pub fn take_due(&mut self, now: Instant) -> SaveTargets {
        match self.deadline {
            Some(deadline) if now >= deadline => self.take_all(),
            _ => SaveTargets::default(),
        }
    }

    /// Drains the dirty set regardless of the deadline. Used by the manual
    /// save path, which bypasses the debounce and must leave no stale timer
    /// behind it.
    pub fn take_all(&mut self) -> SaveTargets {
        self.deadline = None;
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_of_schedules_coalesces_into_one_due_set() {
        let start = Instant::now();
        let mut scheduler = SaveScheduler::new(Duration::from_millis(500));

        for offset in 0..20 {
            scheduler.schedule(
                SaveTarget::Conversations,
                start + Duration::from_millis(offset),
            );
        }

        // Quiet period restarts from the last mutation.
        assert!(scheduler
            .take_due(start + Duration::from_millis(400))
            .is_empty());

        let due = scheduler.take_due(start + Duration::from_millis(519));
        assert!(due.conversations);
        assert!(!due.settings);
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn take_due_before_deadline_keeps_pending_state() {
        let start = Instant::now();
        let mut scheduler = SaveScheduler::new(Duration::from_millis(500));
        scheduler.schedule(SaveTarget::Settings, start);

        assert!(scheduler.take_due(start + Duration::from_millis(100)).is_empty());
        assert!(scheduler.is_pending());
    }

    #[test]
    fn take_all_bypasses_the_deadline_and_clears_it() {
        let start = Instant::now();
        let mut scheduler = SaveScheduler::new(Duration::from_millis(500));
        scheduler.schedule(SaveTarget::Conversations, start);
        scheduler.schedule(SaveTarget::Settings, start);

        let drained = scheduler.take_all();
        assert!(drained.conversations && drained.settings);
        assert!(!scheduler.is_pending());
        assert!(scheduler.take_due(start + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn distinct_targets_accumulate_into_the_same_due_set() {
        let start = Instant::now();
        let mut scheduler = SaveScheduler::new(Duration::from_millis(500));
        scheduler.schedule(SaveTarget::Conversations, start);
        scheduler.schedule(SaveTarget::Settings, start + Duration::from_millis(1));

        let due = scheduler.take_due(start + Duration::from_secs(1));
        assert!(due.conversations && due.settings);
    }
}
