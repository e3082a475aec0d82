//! Publish dedupe gate.
//!
//! A label becomes a payload only when that payload differs from both the
//! source's last published payload and the last payload published by any
//! source. State is updated when a payload is admitted, before delivery, so a
//! failed write is not retried for the same label.

use crate::types::{payload_for, GlobalPublishState, Publication, TrackedSource};
use chrono::Utc;
use tracing::debug;

/// Outcome of checking a label against the dedupe state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupResult {
    /// Payload is new for this source and globally
    Publish(String),
    /// Payload equals this source's last published payload
    SameAsSource,
    /// Payload equals the last payload published by any source
    SameAsGlobal,
}

/// Check a label against the source and global dedupe state
pub fn check(source: &TrackedSource, global: &GlobalPublishState, label: &str) -> DedupResult {
    let payload = payload_for(label);
    if source.last_published_payload.as_deref() == Some(payload.as_str()) {
        DedupResult::SameAsSource
    } else if global.last_published_payload.as_deref() == Some(payload.as_str()) {
        DedupResult::SameAsGlobal
    } else {
        DedupResult::Publish(payload)
    }
}

pub fn should_publish(source: &TrackedSource, global: &GlobalPublishState, label: &str) -> bool {
    matches!(check(source, global, label), DedupResult::Publish(_))
}

/// Admit a label if it passes the gate, recording it as published
pub fn admit(
    source: &mut TrackedSource,
    global: &mut GlobalPublishState,
    label: &str,
) -> Option<Publication> {
    match check(source, global, label) {
        DedupResult::Publish(payload) => {
            source.last_label = Some(label.to_string());
            source.last_published_payload = Some(payload.clone());
            source.last_published_at = Some(Utc::now());
            source.publish_count += 1;
            global.last_published_payload = Some(payload.clone());

            Some(Publication {
                source: source.id.clone(),
                label: label.to_string(),
                payload,
            })
        }
        result => {
            debug!("Suppressed '{}' from {} ({:?})", label, source.id, result);
            None
        }
    }
}
