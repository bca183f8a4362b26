use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::ProfileRecord;

/// Thread-safe ring buffer of sealed profile records.
/// The middleware pushes, the dashboard API reads.
pub struct ProfileHistory {
    capacity: usize,
    records: Mutex<VecDeque<Arc<ProfileRecord>>>,
}

impl ProfileHistory {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a sealed record, evicting the oldest when full.
    pub fn push(&self, record: ProfileRecord) -> Arc<ProfileRecord> {
        let record = Arc::new(record);
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        record
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Arc<ProfileRecord>> {
        self.records.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Every stored record, oldest first.
    pub fn all(&self) -> Vec<Arc<ProfileRecord>> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<ProfileRecord>> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Outcome, ProfileHandle};

    fn sealed(path: &str) -> ProfileRecord {
        let handle = ProfileHandle::new("GET", path, None);
        handle.activate();
        handle.seal(Some(200), Outcome::Completed).unwrap()
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let history = ProfileHistory::new(3);
        for i in 0..5 {
            history.push(sealed(&format!("/r/{i}")));
        }

        assert_eq!(history.len(), 3);
        let paths: Vec<_> = history.all().iter().map(|r| r.path.clone()).collect();
        assert_eq!(paths, ["/r/2", "/r/3", "/r/4"]);
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let history = ProfileHistory::new(10);
        for i in 0..4 {
            history.push(sealed(&format!("/r/{i}")));
        }

        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].path, "/r/3");
        assert_eq!(recent[1].path, "/r/2");
    }

    #[test]
    fn lookup_by_id_and_clear() {
        let history = ProfileHistory::new(2);
        let stored = history.push(sealed("/a"));
        assert_eq!(history.get(stored.id).unwrap().path, "/a");
        assert!(history.get(Uuid::new_v4()).is_none());

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let history = ProfileHistory::new(0);
        history.push(sealed("/a"));
        history.push(sealed("/b"));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.all()[0].path, "/b");
    }

    #[test]
    fn concurrent_pushes_never_exceed_capacity() {
        let history = Arc::new(ProfileHistory::new(16));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let history = history.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        history.push(sealed(&format!("/t{t}/{i}")));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(history.len(), 16);
    }
}
