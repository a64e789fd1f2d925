//! Filters deciding which events are tracked at all.

use crate::event::EventRecord;

/// Predicate over incoming event records.
pub trait EventFilter: Send + Sync {
    /// Returns true if the record should be tracked
    fn accepts(&self, event: &EventRecord) -> bool;
}

/// Accepts events whose type is in an allow-list (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypeFilter {
    allowed_types: Vec<String>,
}

impl EventTypeFilter {
    pub fn new<I, S>(allowed_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_types: allowed_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Allowed event types
    pub fn allowed_types(&self) -> &[String] {
        &self.allowed_types
    }
}

impl EventFilter for EventTypeFilter {
    fn accepts(&self, event: &EventRecord) -> bool {
        self.allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&event.event_type))
    }
}
