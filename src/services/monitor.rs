//! Feedback statistics aggregation
//!
//! Tracks trigger counts per sensor channel for external clients
//! (dashboards, mobile apps). Entries are created lazily and live until
//! explicitly reset. Multiple producers may record concurrently; the
//! per-key upsert happens under one short lock.

use crate::domain::types::FeedbackStatistics;
use crate::infra::events::EventHub;
use chrono::Utc;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

pub struct FeedbackMonitor {
    statistics: Mutex<FxHashMap<u16, FeedbackStatistics>>,
    changed: EventHub<FeedbackStatistics>,
}

impl Default for FeedbackMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackMonitor {
    pub fn new() -> Self {
        Self { statistics: Mutex::new(FxHashMap::default()), changed: EventHub::new() }
    }

    /// Record one feedback trigger for a channel.
    ///
    /// An unseen channel creates a record with count 1. A seen channel
    /// increments the count and refreshes the trigger time. Entity
    /// labels are sticky: only non-empty values overwrite, omitting
    /// them never erases prior labels.
    pub fn record_feedback(
        &self,
        channel: u16,
        entity_name: Option<&str>,
        entity_type: Option<&str>,
    ) {
        let snapshot = {
            let mut statistics = self.statistics.lock();
            let entry = statistics.entry(channel).or_insert_with(|| FeedbackStatistics {
                channel,
                total_count: 0,
                last_trigger: Utc::now(),
                entity_name: None,
                entity_type: None,
            });

            entry.total_count += 1;
            entry.last_trigger = Utc::now();
            if let Some(name) = entity_name {
                if !name.is_empty() {
                    entry.entity_name = Some(name.to_string());
                }
            }
            if let Some(kind) = entity_type {
                if !kind.is_empty() {
                    entry.entity_type = Some(kind.to_string());
                }
            }
            entry.clone()
        };

        debug!(
            channel = channel,
            count = snapshot.total_count,
            entity = snapshot.entity_name.as_deref().unwrap_or("unknown"),
            "feedback_recorded"
        );

        self.changed.publish(&snapshot);
    }

    /// Snapshot of all tracked channels, sorted by channel ascending.
    pub fn all_statistics(&self) -> Vec<FeedbackStatistics> {
        let mut all: Vec<FeedbackStatistics> = self.statistics.lock().values().cloned().collect();
        all.sort_by_key(|s| s.channel);
        all
    }

    /// Statistics for one channel, if it has ever triggered.
    pub fn statistics(&self, channel: u16) -> Option<FeedbackStatistics> {
        self.statistics.lock().get(&channel).cloned()
    }

    /// Remove one channel's entry. Returns false if it did not exist.
    pub fn reset(&self, channel: u16) -> bool {
        let removed = self.statistics.lock().remove(&channel).is_some();
        if removed {
            debug!(channel = channel, "feedback_statistics_reset");
        }
        removed
    }

    /// Clear all statistics.
    pub fn reset_all(&self) {
        self.statistics.lock().clear();
        debug!("feedback_statistics_reset_all");
    }

    /// Change notifications, fired after each recorded feedback.
    pub fn changed(&self) -> &EventHub<FeedbackStatistics> {
        &self.changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_count_accumulates_per_channel() {
        let monitor = FeedbackMonitor::new();
        for _ in 0..5 {
            monitor.record_feedback(3, None, None);
        }
        monitor.record_feedback(7, None, None);

        let stats = monitor.statistics(3).unwrap();
        assert_eq!(stats.total_count, 5);
        assert_eq!(monitor.statistics(7).unwrap().total_count, 1);
    }

    #[test]
    fn test_last_trigger_tracks_most_recent_event() {
        let monitor = FeedbackMonitor::new();
        monitor.record_feedback(1, None, None);
        let first = monitor.statistics(1).unwrap().last_trigger;

        monitor.record_feedback(1, None, None);
        let second = monitor.statistics(1).unwrap().last_trigger;

        assert!(second >= first);
    }

    #[test]
    fn test_entity_labels_are_sticky() {
        let monitor = FeedbackMonitor::new();
        monitor.record_feedback(5, Some("Shuttle"), Some("journey"));
        monitor.record_feedback(5, None, None);
        monitor.record_feedback(5, Some(""), Some(""));

        let stats = monitor.statistics(5).unwrap();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.entity_name.as_deref(), Some("Shuttle"));
        assert_eq!(stats.entity_type.as_deref(), Some("journey"));
    }

    #[test]
    fn test_labels_update_with_new_non_empty_values() {
        let monitor = FeedbackMonitor::new();
        monitor.record_feedback(5, Some("Shuttle"), Some("journey"));
        monitor.record_feedback(5, Some("Express"), None);

        let stats = monitor.statistics(5).unwrap();
        assert_eq!(stats.entity_name.as_deref(), Some("Express"));
        assert_eq!(stats.entity_type.as_deref(), Some("journey"));
    }

    #[test]
    fn test_snapshot_sorted_by_channel() {
        let monitor = FeedbackMonitor::new();
        for channel in [9, 2, 14, 5] {
            monitor.record_feedback(channel, None, None);
        }

        let channels: Vec<u16> = monitor.all_statistics().iter().map(|s| s.channel).collect();
        assert_eq!(channels, vec![2, 5, 9, 14]);
    }

    #[test]
    fn test_reset_single_and_all() {
        let monitor = FeedbackMonitor::new();
        monitor.record_feedback(1, None, None);
        monitor.record_feedback(2, None, None);

        assert!(monitor.reset(1));
        assert!(!monitor.reset(1));
        assert!(monitor.statistics(1).is_none());
        assert_eq!(monitor.all_statistics().len(), 1);

        monitor.reset_all();
        assert!(monitor.all_statistics().is_empty());
    }

    #[test]
    fn test_change_notification_carries_updated_snapshot() {
        let monitor = FeedbackMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        monitor.changed().subscribe(move |stats: &FeedbackStatistics| {
            sink.lock().push((stats.channel, stats.total_count));
        });

        monitor.record_feedback(4, None, None);
        monitor.record_feedback(4, None, None);

        assert_eq!(*seen.lock(), vec![(4, 1), (4, 2)]);
    }

    #[test]
    fn test_concurrent_recording_keeps_counts_exact() {
        let monitor = Arc::new(FeedbackMonitor::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let monitor = monitor.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..250 {
                    monitor.record_feedback(11, None, None);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(monitor.statistics(11).unwrap().total_count, 2000);
    }
}
