//! Reconciliation queue.
//!
//! Mutation records are drained from the observer in batches; the follow-up
//! work they call for is reduced to at most one pending job of each kind, so
//! a burst of mutations costs one rescan and one refresh.

use core::time::Duration;
use dom::{MutationObserver, MutationRecord};
use std::time::Instant;

/// Deferred work the mutation loop can schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Job {
    /// Walk the document for new shadow roots.
    ShadowRescan,
    /// Regenerate the main sheet and overlays.
    VisualRefresh,
}

/// A drained batch of records.
#[derive(Debug, Default)]
pub struct Batch {
    pub records: Vec<MutationRecord>,
    /// Records were lost; callers should treat the whole document as changed.
    pub overflowed: bool,
}

#[derive(Debug)]
pub struct Reconciler {
    observer: Option<MutationObserver>,
    rescan_delay: Duration,
    refresh_delay: Duration,
    rescan_due: Option<Instant>,
    refresh_due: Option<Instant>,
    /// Schedule requests absorbed by an already pending job.
    coalesced: u64,
}

impl Reconciler {
    #[inline]
    #[must_use]
    pub const fn new(rescan_delay: Duration, refresh_delay: Duration) -> Self {
        Self {
            observer: None,
            rescan_delay,
            refresh_delay,
            rescan_due: None,
            refresh_due: None,
            coalesced: 0,
        }
    }

    /// Start observing; both jobs are scheduled once so the first pass runs
    /// even on a static page.
    pub fn start(&mut self, observer: MutationObserver, now: Instant) {
        self.observer = Some(observer);
        self.schedule(Job::ShadowRescan, now);
        self.schedule(Job::VisualRefresh, now);
    }

    /// Disconnect and drop any pending work.
    pub fn stop(&mut self) {
        self.observer = None;
        self.rescan_due = None;
        self.refresh_due = None;
    }

    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.observer.is_some()
    }

    /// Schedule `job` unless one is already pending.
    ///
    /// # Returns
    ///
    /// `false` when the request was coalesced into a pending job.
    pub fn schedule(&mut self, job: Job, now: Instant) -> bool {
        let (slot, delay) = match job {
            Job::ShadowRescan => (&mut self.rescan_due, self.rescan_delay),
            Job::VisualRefresh => (&mut self.refresh_due, self.refresh_delay),
        };
        if slot.is_some() {
            self.coalesced = self.coalesced.saturating_add(1);
            return false;
        }
        *slot = Some(now + delay);
        true
    }

    /// Take every record the observer has buffered.
    pub fn drain(&mut self) -> Batch {
        self.observer.as_mut().map_or_else(Batch::default, |observer| {
            let records = observer.take_records();
            Batch {
                records,
                overflowed: observer.take_overflow(),
            }
        })
    }

    /// Remove and return the jobs due at `now`, rescan first.
    pub fn take_due(&mut self, now: Instant) -> Vec<Job> {
        let mut due = Vec::new();
        if self.rescan_due.is_some_and(|deadline| deadline <= now) {
            self.rescan_due = None;
            due.push(Job::ShadowRescan);
        }
        if self.refresh_due.is_some_and(|deadline| deadline <= now) {
            self.refresh_due = None;
            due.push(Job::VisualRefresh);
        }
        due
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.rescan_due, self.refresh_due) {
            (Some(first), Some(second)) => Some(first.min(second)),
            (first, second) => first.or(second),
        }
    }

    #[inline]
    #[must_use]
    pub const fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::{Document, MutationFilter};

    #[test]
    fn bursts_coalesce_into_one_job_per_kind() {
        let document = Document::new("example.com");
        let mut reconciler = Reconciler::new(Duration::from_millis(100), Duration::from_millis(80));
        let start = Instant::now();
        reconciler.start(document.observe(MutationFilter::default()), start);
        for _ in 0..5 {
            assert!(!reconciler.schedule(Job::VisualRefresh, start));
            assert!(!reconciler.schedule(Job::ShadowRescan, start));
        }
        assert_eq!(reconciler.coalesced(), 10);
        assert_eq!(reconciler.next_deadline(), Some(start + Duration::from_millis(80)));

        assert!(reconciler.take_due(start).is_empty());
        assert_eq!(
            reconciler.take_due(start + Duration::from_millis(80)),
            vec![Job::VisualRefresh]
        );
        assert_eq!(
            reconciler.take_due(start + Duration::from_millis(100)),
            vec![Job::ShadowRescan]
        );
        assert_eq!(reconciler.next_deadline(), None);
        assert!(reconciler.schedule(Job::VisualRefresh, start));
    }

    #[test]
    fn stopping_drops_pending_work() {
        let document = Document::new("example.com");
        let mut reconciler = Reconciler::new(Duration::from_millis(100), Duration::from_millis(80));
        reconciler.start(document.observe(MutationFilter::default()), Instant::now());
        reconciler.stop();
        assert!(!reconciler.is_active());
        assert_eq!(reconciler.next_deadline(), None);
        assert!(reconciler.drain().records.is_empty());
    }
}
