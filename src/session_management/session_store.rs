use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use super::session::{CodeEntry, EventKind, ScanEvent};
use super::session_log::SessionLog;
use crate::image_correlation::types::CorrelationKey;
use crate::network::types::DecodedScan;

/// Bounded scan history plus the operator's current regime.
///
/// # Fields Overview
///
/// - `log`: the last N events, oldest first
/// - `regime`: expected item count applied to events created from now on
/// - `total_captures`: number of appended scans that carried an image trigger
#[derive(Debug)]
pub struct SessionStore {
    log: SessionLog,
    regime: Option<u32>,
    total_captures: u64,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: SessionLog::new(capacity),
            regime: None,
            total_captures: 0,
        }
    }

    fn append(&mut self, event: ScanEvent) -> &ScanEvent {
        let (stored, evicted) = self.log.insert(event);
        if let Some(evicted) = evicted {
            debug!("evicted scan event {} from session log", evicted.id());
        }
        stored
    }

    /// Records a decoded scan, freezing the current regime into it.
    pub fn append_event(
        &mut self,
        connection_id: Uuid,
        scan: DecodedScan,
        received_at: DateTime<Utc>,
    ) -> &ScanEvent {
        let image_key = scan.image.as_ref().map(CorrelationKey::from_trigger);
        if image_key.is_some() {
            self.total_captures += 1;
        }
        let event = ScanEvent::new(
            connection_id,
            EventKind::Scanner,
            scan.codes,
            None,
            received_at,
            self.regime,
            image_key,
        );
        self.append(event)
    }

    /// Records a connection lifecycle notice. Operator commands are never logged.
    pub fn record_lifecycle(&mut self, connection_id: Uuid, note: impl Into<String>) -> &ScanEvent {
        let event = ScanEvent::new(
            connection_id,
            EventKind::Lifecycle,
            Vec::new(),
            Some(note.into()),
            Utc::now(),
            self.regime,
            None,
        );
        self.append(event)
    }

    /// Changes the regime for events created after this call.
    pub fn set_regime(&mut self, regime: Option<u32>) {
        info!("regime set to {:?}", regime);
        self.regime = regime;
    }

    pub fn regime(&self) -> Option<u32> {
        self.regime
    }

    /// Appends an operator-typed code to the latest event.
    ///
    /// Returns `false` without touching the log when it is empty or `text` is blank.
    pub fn add_manual_entry(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        match self.log.latest_mut() {
            Some(event) => {
                event.push_entry(CodeEntry::manual(text));
                debug!("manual entry appended to event {}", event.id());
                true
            }
            None => false,
        }
    }

    /// Stamps the latest event as sent and returns it.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> Option<&ScanEvent> {
        let event = self.log.latest_mut()?;
        event.mark_sent(at);
        Some(event)
    }

    pub fn latest(&self) -> Option<&ScanEvent> {
        self.log.latest()
    }

    /// Events oldest to newest.
    pub fn events(&self) -> impl Iterator<Item = &ScanEvent> + '_ {
        self.log.iter()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn total_captures(&self) -> u64 {
        self.total_captures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::ImageTrigger;
    use crate::session_management::session::{classify, Completeness};

    fn scan(codes: &[&str], image: Option<(&str, u64)>) -> DecodedScan {
        DecodedScan {
            codes: codes.iter().map(|c| CodeEntry::scanned(*c, None)).collect(),
            image: image.map(|(name, index)| ImageTrigger {
                name: name.to_string(),
                index,
            }),
        }
    }

    #[test]
    fn regime_snapshot_is_taken_at_creation() {
        let mut store = SessionStore::new(10);
        let conn = Uuid::new_v4();
        let regimes = [None, Some(3), Some(3), Some(7), None, Some(1)];
        let mut expected = Vec::new();
        for (i, regime) in regimes.iter().enumerate() {
            store.set_regime(*regime);
            store.append_event(conn, scan(&["a"], None), Utc::now());
            expected.push(*regime);
            // a later change never rewrites what is already logged
            store.set_regime(Some(100 + i as u32));
        }
        let stored: Vec<Option<u32>> = store.events().map(|e| e.regime()).collect();
        assert_eq!(stored, expected);
    }

    #[test]
    fn log_stays_bounded_through_mixed_appends() {
        let mut store = SessionStore::new(10);
        let conn = Uuid::new_v4();
        for i in 0..30 {
            if i % 4 == 0 {
                store.record_lifecycle(conn, format!("note {}", i));
            } else {
                store.append_event(conn, scan(&[&i.to_string()], None), Utc::now());
            }
            assert!(store.len() <= 10);
        }
        let newest = store.latest().unwrap();
        assert_eq!(newest.content()[0].content, "29");
    }

    #[test]
    fn total_captures_counts_image_triggers_only() {
        let mut store = SessionStore::new(10);
        let conn = Uuid::new_v4();
        store.append_event(conn, scan(&["a"], Some(("cam", 1))), Utc::now());
        store.append_event(conn, scan(&["b"], None), Utc::now());
        store.record_lifecycle(conn, "Connection connected");
        store.append_event(conn, scan(&[], Some(("cam", 2))), Utc::now());
        assert_eq!(store.total_captures(), 2);
        assert_eq!(store.latest().unwrap().image_key().unwrap().as_str(), "cam-2");
    }

    #[test]
    fn manual_entry_is_noop_on_empty_log() {
        let mut store = SessionStore::new(10);
        assert!(!store.add_manual_entry("X"));
        assert!(store.is_empty());
    }

    #[test]
    fn manual_entry_appends_to_latest_only() {
        let mut store = SessionStore::new(10);
        let conn = Uuid::new_v4();
        store.set_regime(Some(3));
        store.append_event(conn, scan(&["a", "b"], None), Utc::now());
        store.append_event(conn, scan(&["c", "d"], None), Utc::now());

        assert!(store.add_manual_entry("X"));

        let events: Vec<&ScanEvent> = store.events().collect();
        assert_eq!(events[0].content().len(), 2);
        let latest: Vec<(&str, bool)> = events[1]
            .content()
            .iter()
            .map(|c| (c.content.as_str(), c.added_manually))
            .collect();
        assert_eq!(latest, vec![("c", false), ("d", false), ("X", true)]);
        assert!(events[1].content()[2].corners.is_none());
        assert_eq!(classify(events[1]), Completeness::Complete);
    }

    #[test]
    fn blank_manual_entry_is_rejected() {
        let mut store = SessionStore::new(10);
        store.append_event(Uuid::new_v4(), scan(&["a"], None), Utc::now());
        assert!(!store.add_manual_entry("   "));
        assert_eq!(store.latest().unwrap().content().len(), 1);
    }

    #[test]
    fn mark_sent_stamps_latest() {
        let mut store = SessionStore::new(10);
        assert!(store.mark_sent(Utc::now()).is_none());
        store.append_event(Uuid::new_v4(), scan(&["a"], None), Utc::now());
        let at = Utc::now();
        assert_eq!(store.mark_sent(at).unwrap().sent_at(), Some(at));
    }
}
