//! Source tracking across polling cycles.
//!
//! Keeps one [`TrackedSource`] per live source id and diffs each poller
//! snapshot against it, reporting which sources appeared, changed or went away.

use crate::types::{GlobalPublishState, SourceId, SourceSample, TrackedSource};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Lifecycle change of one source during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// First report, or first report after being disconnected
    Discovered(SourceId),
    /// Raw observation differs from the previous cycle
    Changed(SourceId),
    /// No longer reported
    Removed(SourceId),
}

/// What happens to a source missing from a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// Forget the source and its dedupe state (windows)
    Drop,
    /// Keep the source and its dedupe state, mark it disconnected (devices)
    Retain,
}

/// All per-source and global pipeline state, owned by the router
#[derive(Debug, Default)]
pub struct PipelineState {
    pub sources: HashMap<SourceId, TrackedSource>,
    pub global: GlobalPublishState,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SourceId) -> Option<&TrackedSource> {
        self.sources.get(id)
    }

    /// Number of sources currently reporting
    pub fn connected_count(&self) -> usize {
        self.sources.values().filter(|s| s.connected).count()
    }

    /// Diff a snapshot against the tracked sources.
    ///
    /// Events for reported sources come in snapshot order, followed by
    /// removals sorted by id. A repeated id within one snapshot is ignored
    /// after its first occurrence.
    pub fn reconcile(
        &mut self,
        snapshot: Vec<SourceSample>,
        policy: RemovalPolicy,
    ) -> Vec<SourceEvent> {
        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for sample in snapshot {
            if !seen.insert(sample.id.clone()) {
                trace!("Duplicate {} in snapshot, ignoring", sample.id);
                continue;
            }

            match self.sources.get_mut(&sample.id) {
                None => {
                    debug!("Discovered {}", sample.id);
                    events.push(SourceEvent::Discovered(sample.id.clone()));
                    self.sources
                        .insert(sample.id.clone(), TrackedSource::new(sample));
                }
                Some(source) if !source.connected => {
                    debug!("Reconnected {}", sample.id);
                    source.connected = true;
                    source.kind = sample.kind;
                    source.raw = sample.raw;
                    events.push(SourceEvent::Discovered(sample.id));
                }
                Some(source) if source.raw != sample.raw || source.kind != sample.kind => {
                    trace!("Changed {}: {:?} -> {:?}", sample.id, source.raw, sample.raw);
                    source.kind = sample.kind;
                    source.raw = sample.raw;
                    events.push(SourceEvent::Changed(sample.id));
                }
                Some(_) => {}
            }
        }

        let mut missing: Vec<SourceId> = self
            .sources
            .iter()
            .filter(|(id, source)| source.connected && !seen.contains(*id))
            .map(|(id, _)| id.clone())
            .collect();
        missing.sort();

        for id in missing {
            match policy {
                RemovalPolicy::Drop => {
                    self.sources.remove(&id);
                }
                RemovalPolicy::Retain => self.mark_disconnected(&id),
            }
            debug!("Removed {}", id);
            events.push(SourceEvent::Removed(id));
        }

        events
    }

    /// Mark a retained source unreachable. Returns false if it was not tracked
    /// or already disconnected.
    pub fn mark_lost(&mut self, id: &SourceId) -> bool {
        match self.sources.get(id) {
            Some(source) if source.connected => {
                self.mark_disconnected(id);
                true
            }
            _ => false,
        }
    }

    // Keeps label and payload; the recorded mode does not survive a reconnect.
    fn mark_disconnected(&mut self, id: &SourceId) {
        if let Some(source) = self.sources.get_mut(id) {
            source.connected = false;
            source.mode = None;
            source.endpoint_mode = None;
        }
    }
}
