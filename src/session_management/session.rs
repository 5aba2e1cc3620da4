use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::image_correlation::types::CorrelationKey;

/// A 2-D corner of a barcode polygon, in overlay coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub x: f64,
    pub y: f64,
}

/// One scanned (or operator-typed) barcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEntry {
    pub content: String,
    pub corners: Option<Vec<Corner>>,
    #[serde(default)]
    pub added_manually: bool,
}

impl CodeEntry {
    pub fn scanned(content: impl Into<String>, corners: Option<Vec<Corner>>) -> Self {
        Self {
            content: content.into(),
            corners,
            added_manually: false,
        }
    }

    pub fn manual(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            corners: None,
            added_manually: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Scanner,
    OperatorNote,
    Lifecycle,
}

/// An entry of the session log.
///
/// The regime snapshot is taken at construction and has no setter; later regime changes only
/// affect events created afterwards. Content only grows through manual appends on the latest
/// event.
#[derive(Debug, Clone, Serialize)]
pub struct ScanEvent {
    id: Uuid,
    connection_id: Uuid,
    kind: EventKind,
    content: Vec<CodeEntry>,
    note: Option<String>,
    received_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    regime: Option<u32>,
    image_key: Option<CorrelationKey>,
}

impl ScanEvent {
    pub(crate) fn new(
        connection_id: Uuid,
        kind: EventKind,
        content: Vec<CodeEntry>,
        note: Option<String>,
        received_at: DateTime<Utc>,
        regime: Option<u32>,
        image_key: Option<CorrelationKey>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id,
            kind,
            content,
            note,
            received_at,
            sent_at: None,
            regime,
            image_key,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn content(&self) -> &[CodeEntry] {
        &self.content
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    /// Regime in effect when this event was created.
    pub fn regime(&self) -> Option<u32> {
        self.regime
    }

    pub fn image_key(&self) -> Option<&CorrelationKey> {
        self.image_key.as_ref()
    }

    /// Number of entries typed in by the operator.
    pub fn added_count(&self) -> usize {
        self.content.iter().filter(|c| c.added_manually).count()
    }

    pub(crate) fn push_entry(&mut self, entry: CodeEntry) {
        self.content.push(entry);
    }

    pub(crate) fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.sent_at = Some(at);
    }
}

/// Completeness of an event's content against its frozen regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "count", rename_all = "snake_case")]
pub enum Completeness {
    Missing(usize),
    Complete,
    Over(usize),
    Undefined,
}

/// Classifies an event. Always recomputed, never stored.
pub fn classify(event: &ScanEvent) -> Completeness {
    let Some(regime) = event.regime else {
        return Completeness::Undefined;
    };
    let expected = regime as usize;
    let actual = event.content.len();
    if actual < expected {
        Completeness::Missing(expected - actual)
    } else if actual > expected {
        Completeness::Over(actual - expected)
    } else {
        Completeness::Complete
    }
}

/// Whether the operator should be offered to type in missing codes for this event.
pub fn manual_entry_offered(event: &ScanEvent) -> bool {
    match event.regime {
        None => true,
        Some(regime) => event.content.len() < regime as usize,
    }
}

/// Parses operator input into a regime; anything that is not a non-negative integer is unset.
pub fn parse_regime(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with(entries: usize, regime: Option<u32>) -> ScanEvent {
        let content = (0..entries)
            .map(|i| CodeEntry::scanned(format!("code-{}", i), None))
            .collect();
        ScanEvent::new(
            Uuid::new_v4(),
            EventKind::Scanner,
            content,
            None,
            Utc::now(),
            regime,
            None,
        )
    }

    #[test]
    fn classify_against_regime_five() {
        assert_eq!(classify(&event_with(3, Some(5))), Completeness::Missing(2));
        assert_eq!(classify(&event_with(5, Some(5))), Completeness::Complete);
        assert_eq!(classify(&event_with(7, Some(5))), Completeness::Over(2));
        assert_eq!(classify(&event_with(3, None)), Completeness::Undefined);
    }

    #[test]
    fn classify_tracks_manual_appends() {
        let mut event = event_with(4, Some(5));
        assert_eq!(classify(&event), Completeness::Missing(1));
        event.push_entry(CodeEntry::manual("typed"));
        assert_eq!(classify(&event), Completeness::Complete);
        assert_eq!(event.added_count(), 1);
    }

    #[test]
    fn manual_entry_offered_below_regime_or_when_undefined() {
        assert!(manual_entry_offered(&event_with(2, Some(3))));
        assert!(!manual_entry_offered(&event_with(3, Some(3))));
        assert!(!manual_entry_offered(&event_with(4, Some(3))));
        assert!(manual_entry_offered(&event_with(9, None)));
    }

    #[test]
    fn parse_regime_rejects_non_numbers() {
        assert_eq!(parse_regime("5"), Some(5));
        assert_eq!(parse_regime(" 12 "), Some(12));
        assert_eq!(parse_regime("NaN"), None);
        assert_eq!(parse_regime("-1"), None);
        assert_eq!(parse_regime(""), None);
    }

    #[test]
    fn completeness_serializes_with_count() {
        let json = serde_json::to_value(Completeness::Missing(2)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "missing", "count": 2}));
        let json = serde_json::to_value(Completeness::Complete).unwrap();
        assert_eq!(json, serde_json::json!({"status": "complete"}));
    }
}
