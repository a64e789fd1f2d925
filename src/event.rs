//! Event records as reported by the upstream source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason code that wraps several unrelated failures.
pub const FAILED_SYNC_REASON: &str = "FailedSync";

/// Message markers that split [`FAILED_SYNC_REASON`] into finer reasons.
const FAILED_SYNC_MARKERS: [&str; 2] = ["ErrImagePull", "ImagePullBackOff"];

/// Object the event is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectReference {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Sub-object path, e.g. `spec.containers{app}`.
    pub field_path: String,
}

/// Component that reported the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSource {
    pub host: String,
    pub component: String,
}

/// Last known representation of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Name of the event object itself.
    pub name: String,
    /// Namespace of the event object itself.
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub involved_object: ObjectReference,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// Event category (`Normal`, `Warning`, ...).
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub source: EventSource,
    /// Number of occurrences reported upstream.
    #[serde(default = "default_count")]
    pub count: u32,
    pub last_timestamp: DateTime<Utc>,
    /// Opaque upstream version, used to drop re-deliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

fn default_count() -> u32 {
    1
}

impl EventRecord {
    /// Create a record with the given identity and timestamp.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, last_timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            involved_object: ObjectReference::default(),
            reason: String::new(),
            message: String::new(),
            event_type: String::new(),
            source: EventSource::default(),
            count: 1,
            last_timestamp,
            resource_version: None,
        }
    }

    /// Set the involved object
    pub fn with_involved_object(
        mut self,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.involved_object.kind = kind.into();
        self.involved_object.namespace = namespace.into();
        self.involved_object.name = name.into();
        self
    }

    /// Set reason and message
    pub fn with_reason(mut self, reason: impl Into<String>, message: impl Into<String>) -> Self {
        self.reason = reason.into();
        self.message = message.into();
        self
    }

    /// Set the event type
    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Set the reporting source
    pub fn with_source(mut self, host: impl Into<String>, component: impl Into<String>) -> Self {
        self.source.host = host.into();
        self.source.component = component.into();
        self
    }

    /// Set the occurrence count
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the upstream version
    pub fn with_resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }

    /// Source rendered as `host/component`.
    pub fn source_label(&self) -> String {
        format!("{}/{}", self.source.host, self.source.component)
    }

    /// Split the catch-all `FailedSync` reason by what the message says failed.
    ///
    /// Returns true if the reason was rewritten.
    pub fn normalize_reason(&mut self) -> bool {
        if self.reason != FAILED_SYNC_REASON {
            return false;
        }
        match FAILED_SYNC_MARKERS.iter().find(|m| self.message.contains(*m)) {
            Some(marker) => {
                self.reason = format!("{}_{}", FAILED_SYNC_REASON, marker);
                true
            }
            None => false,
        }
    }
}
