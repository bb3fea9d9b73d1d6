//! Rolling history of recent samples for live display
//!
//! The scheduler owns the only [`HistoryBuffer`] and is the only writer.
//! Consumers get a [`HistoryReader`] and read immutable snapshots:
//! - every push rebuilds the snapshot and swaps it in under a short write lock
//! - readers clone the current `Arc` and never see a half-applied push

use crate::models::Sample;
use chrono::NaiveDateTime;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Default number of samples kept for graphing
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

type Snapshot = Arc<[Sample]>;

/// Bounded FIFO of the most recent samples
pub struct HistoryBuffer {
    /// Writer-side working copy
    buffer: VecDeque<Sample>,
    /// Maximum number of samples retained (at least 1)
    capacity: usize,
    /// Published immutable view shared with readers
    published: Arc<RwLock<Snapshot>>,
}

impl HistoryBuffer {
    /// Create an empty buffer; a zero capacity is raised to 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            published: Arc::new(RwLock::new(Arc::from(Vec::<Sample>::new()))),
        }
    }

    /// Append a sample, evicting the oldest entries beyond capacity
    pub fn push(&mut self, sample: Sample) {
        self.buffer.push_back(sample);
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
        }

        let snapshot: Snapshot = self.buffer.iter().cloned().collect();
        let mut published = self
            .published
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *published = snapshot;
    }

    /// Ordered copy of the retained samples, oldest first
    pub fn snapshot(&self) -> Arc<[Sample]> {
        self.reader().snapshot()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read-only handle for consumers on other tasks or threads
    pub fn reader(&self) -> HistoryReader {
        HistoryReader {
            published: Arc::clone(&self.published),
            capacity: self.capacity,
        }
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            entries: self.buffer.len(),
            capacity: self.capacity,
            oldest_timestamp: self.buffer.front().map(|s| s.timestamp),
            newest_timestamp: self.buffer.back().map(|s| s.timestamp),
        }
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Cloneable read-only view of a [`HistoryBuffer`]
#[derive(Clone)]
pub struct HistoryReader {
    published: Arc<RwLock<Snapshot>>,
    capacity: usize,
}

impl HistoryReader {
    /// Latest published snapshot, oldest first
    pub fn snapshot(&self) -> Arc<[Sample]> {
        let published = self
            .published
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&published)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Extract one numeric series from the current snapshot
    pub fn series<F>(&self, field: F) -> Vec<f64>
    where
        F: Fn(&Sample) -> Option<f64>,
    {
        self.snapshot().iter().filter_map(field).collect()
    }
}

/// History buffer statistics
#[derive(Debug, Clone)]
pub struct HistoryStats {
    pub entries: usize,
    pub capacity: usize,
    pub oldest_timestamp: Option<NaiveDateTime>,
    pub newest_timestamp: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn sample(cpu: f64) -> Sample {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Sample::new(ts, cpu, cpu)
    }

    #[test]
    fn test_push_keeps_most_recent_in_order() {
        let mut history = HistoryBuffer::new(5);

        for i in 1..=3 {
            history.push(sample(i as f64));
            assert!(history.len() <= 5);
        }
        let cpu: Vec<f64> = history.snapshot().iter().map(|s| s.cpu_percent).collect();
        assert_eq!(cpu, vec![1.0, 2.0, 3.0]);

        for i in 4..=12 {
            history.push(sample(i as f64));
            assert!(history.len() <= 5);
        }
        let cpu: Vec<f64> = history.snapshot().iter().map(|s| s.cpu_percent).collect();
        assert_eq!(cpu, vec![8.0, 9.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_default_capacity_scenario() {
        let mut history = HistoryBuffer::default();
        for i in 1..=75 {
            history.push(sample(i as f64));
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 50);
        assert_eq!(snapshot.first().unwrap().cpu_percent, 26.0);
        assert_eq!(snapshot.last().unwrap().cpu_percent, 75.0);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut history = HistoryBuffer::new(0);
        history.push(sample(1.0));
        history.push(sample(2.0));

        assert_eq!(history.capacity(), 1);
        assert_eq!(history.snapshot()[0].cpu_percent, 2.0);
    }

    #[test]
    fn test_reader_sees_pushes() {
        let mut history = HistoryBuffer::new(3);
        let reader = history.reader();
        assert!(reader.is_empty());

        history.push(sample(10.0));
        history.push(sample(20.0));

        assert_eq!(reader.len(), 2);
        assert_eq!(reader.capacity(), 3);
        assert_eq!(reader.series(|s| Some(s.cpu_percent)), vec![10.0, 20.0]);
        assert!(reader.series(|s| s.gpu_percent).is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_from_later_pushes() {
        let mut history = HistoryBuffer::new(3);
        history.push(sample(1.0));
        let before = history.snapshot();

        history.push(sample(2.0));
        assert_eq!(before.len(), 1);
        assert_eq!(history.snapshot().len(), 2);
    }

    #[test]
    fn test_stats() {
        let mut history = HistoryBuffer::new(4);
        assert!(history.stats().oldest_timestamp.is_none());

        history.push(sample(1.0));
        let stats = history.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.capacity, 4);
        assert!(stats.newest_timestamp.is_some());
    }

    #[test]
    fn test_concurrent_snapshots_never_torn() {
        const CAPACITY: usize = 50;
        let mut history = HistoryBuffer::new(CAPACITY);
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reader = history.reader();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        let snapshot = reader.snapshot();
                        assert!(snapshot.len() <= CAPACITY);
                        for pair in snapshot.windows(2) {
                            assert_eq!(pair[1].cpu_percent, pair[0].cpu_percent + 1.0);
                        }
                        for s in snapshot.iter() {
                            assert_eq!(s.cpu_percent, s.cpu_memory_percent);
                        }
                    }
                })
            })
            .collect();

        for i in 0..5_000 {
            history.push(sample(i as f64));
        }
        done.store(true, Ordering::Release);

        for handle in readers {
            handle.join().unwrap();
        }
        assert_eq!(history.len(), CAPACITY);
    }
}
