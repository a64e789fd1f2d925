//! Stable keys for event records.
//!
//! A key is `namespace/name`, or just `name` for cluster-scoped events.

use crate::error::KeyError;
use crate::event::EventRecord;

/// Build the key of an object from its namespace and name.
pub fn object_key(namespace: &str, name: &str) -> Result<String, KeyError> {
    if name.is_empty() {
        return Err(KeyError::MissingName {
            namespace: namespace.to_string(),
        });
    }
    if namespace.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{}/{}", namespace, name))
    }
}

/// Key of an event record.
pub fn event_key(event: &EventRecord) -> Result<String, KeyError> {
    object_key(&event.namespace, &event.name)
}

/// Split a key back into `(namespace, name)`.
pub fn split_key(key: &str) -> Result<(&str, &str), KeyError> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) if !name.is_empty() => Ok(("", name)),
        (Some(namespace), Some(name), None) if !name.is_empty() => Ok((namespace, name)),
        _ => Err(KeyError::Malformed(key.to_string())),
    }
}
