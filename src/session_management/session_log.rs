//! Fixed-capacity ring buffer holding the most recent scan events.
//!
//! Slots are allocated once at construction. Appending to a full log overwrites the oldest
//! slot and advances the head; the relative order of the surviving entries never changes.

use super::session::ScanEvent;

pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug)]
pub struct SessionLog {
    slots: Vec<Option<ScanEvent>>,
    /// Position of the oldest entry.
    head: usize,
    len: usize,
}

impl SessionLog {
    /// Creates an empty log; a zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot_of(&self, position: usize) -> usize {
        (self.head + position) % self.slots.len()
    }

    /// Appends an event and hands back the stored copy along with any evicted entry.
    pub fn insert(&mut self, event: ScanEvent) -> (&ScanEvent, Option<ScanEvent>) {
        let slot = if self.len < self.capacity() {
            let slot = self.slot_of(self.len);
            self.len += 1;
            slot
        } else {
            let slot = self.head;
            self.head = (self.head + 1) % self.slots.len();
            slot
        };
        let evicted = self.slots[slot].take();
        let stored = self.slots[slot].insert(event);
        (stored, evicted)
    }

    /// Entry at `position`, where 0 is the oldest.
    pub fn get(&self, position: usize) -> Option<&ScanEvent> {
        if position >= self.len {
            return None;
        }
        self.slots[self.slot_of(position)].as_ref()
    }

    pub fn latest(&self) -> Option<&ScanEvent> {
        self.len.checked_sub(1).and_then(|last| self.get(last))
    }

    pub fn latest_mut(&mut self) -> Option<&mut ScanEvent> {
        let last = self.len.checked_sub(1)?;
        let slot = self.slot_of(last);
        self.slots[slot].as_mut()
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ScanEvent> + '_ {
        (0..self.len).filter_map(move |position| self.get(position))
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_management::session::{CodeEntry, EventKind};
    use chrono::Utc;
    use uuid::Uuid;

    fn event(label: &str) -> ScanEvent {
        ScanEvent::new(
            Uuid::nil(),
            EventKind::Scanner,
            vec![CodeEntry::scanned(label, None)],
            None,
            Utc::now(),
            None,
            None,
        )
    }

    fn labels(log: &SessionLog) -> Vec<String> {
        log.iter().map(|e| e.content()[0].content.clone()).collect()
    }

    #[test]
    fn never_exceeds_capacity_and_evicts_oldest_first() {
        let mut log = SessionLog::default();
        for i in 0..25 {
            let (_, evicted) = log.insert(event(&i.to_string()));
            assert!(log.len() <= DEFAULT_CAPACITY);
            if i >= DEFAULT_CAPACITY {
                let evicted = evicted.expect("full log evicts");
                assert_eq!(evicted.content()[0].content, (i - DEFAULT_CAPACITY).to_string());
            } else {
                assert!(evicted.is_none());
            }
        }
        let expected: Vec<String> = (15..25).map(|i| i.to_string()).collect();
        assert_eq!(labels(&log), expected);
        assert_eq!(log.latest().unwrap().content()[0].content, "24");
    }

    #[test]
    fn latest_mut_targets_newest_after_wraparound() {
        let mut log = SessionLog::new(3);
        for label in ["a", "b", "c", "d"] {
            log.insert(event(label));
        }
        log.latest_mut().unwrap().push_entry(CodeEntry::manual("x"));
        assert_eq!(labels(&log), vec!["b", "c", "d"]);
        assert_eq!(log.get(2).unwrap().content().len(), 2);
        assert_eq!(log.get(0).unwrap().content().len(), 1);
        assert!(log.get(3).is_none());
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let mut log = SessionLog::new(0);
        assert_eq!(log.capacity(), 1);
        assert!(log.latest().is_none());
        assert!(log.latest_mut().is_none());
        assert!(log.is_empty());
        log.insert(event("a"));
        let (stored, evicted) = log.insert(event("b"));
        assert_eq!(stored.content()[0].content, "b");
        assert_eq!(evicted.unwrap().content()[0].content, "a");
        assert_eq!(labels(&log), vec!["b"]);
    }
}
