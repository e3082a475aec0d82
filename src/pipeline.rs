//! One polling cycle, from snapshot to admitted publications.
//!
//! The pipeline owns all tracking and dedupe state. It does no I/O: callers
//! hand it a snapshot or device poll and deliver the returned publications.

use crate::dedup;
use crate::device::DevicePoll;
use crate::resolver::{LabelResolver, ModeHooks};
use crate::tracker::{PipelineState, RemovalPolicy, SourceEvent};
use crate::types::{
    Publication, RawObservation, SourceId, SourceKind, SourceSample, TrackedSource,
};
use tracing::{debug, info, trace};

#[derive(Debug)]
pub struct Pipeline {
    state: PipelineState,
    resolver: LabelResolver,
    hooks: ModeHooks,
}

impl Pipeline {
    pub fn new(resolver: LabelResolver) -> Self {
        Self::with_hooks(resolver, ModeHooks::default())
    }

    pub fn with_hooks(resolver: LabelResolver, hooks: ModeHooks) -> Self {
        Self {
            state: PipelineState::new(),
            resolver,
            hooks,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn source(&self, id: &SourceId) -> Option<&TrackedSource> {
        self.state.get(id)
    }

    /// Process a window snapshot. Windows missing from it are forgotten.
    pub fn window_cycle(&mut self, samples: Vec<SourceSample>) -> Vec<Publication> {
        let events = self.state.reconcile(samples, RemovalPolicy::Drop);
        self.process_events(&events)
    }

    /// Process one device poll. Devices that stop answering are retained.
    pub fn device_cycle(&mut self, poll: DevicePoll) -> Vec<Publication> {
        match poll {
            DevicePoll::Observed {
                host,
                implied_mode,
                state,
            } => {
                let id = SourceId::Device(host);
                let sample = SourceSample {
                    id: id.clone(),
                    kind: SourceKind::Device,
                    raw: RawObservation::Device(state),
                };
                let events = self.state.reconcile(vec![sample], RemovalPolicy::Retain);
                if let Some(source) = self.state.sources.get_mut(&id) {
                    source.endpoint_mode = implied_mode;
                }
                self.process_events(&events)
            }
            DevicePoll::Lost(host) => {
                self.state.mark_lost(&SourceId::Device(host));
                Vec::new()
            }
            DevicePoll::Offline => {
                trace!("No device reachable");
                self.state.reconcile(Vec::new(), RemovalPolicy::Retain);
                Vec::new()
            }
        }
    }

    fn process_events(&mut self, events: &[SourceEvent]) -> Vec<Publication> {
        events
            .iter()
            .filter_map(|event| match event {
                SourceEvent::Discovered(id) | SourceEvent::Changed(id) => self.process(id),
                SourceEvent::Removed(_) => None,
            })
            .collect()
    }

    /// Resolve one source and pass its label through the dedupe gate
    fn process(&mut self, id: &SourceId) -> Option<Publication> {
        let resolution = self.resolver.resolve(self.state.sources.get(id)?);
        let source = self.state.sources.get_mut(id)?;

        if source.kind == SourceKind::Device {
            if resolution.mode_changed {
                if let (Some(mode), RawObservation::Device(device_state)) =
                    (&resolution.mode, &source.raw)
                {
                    info!("{} entered {} mode", source.id, mode);
                    self.hooks.run(mode, device_state);
                }
            }
            source.mode = resolution.mode;
        }

        let Some(label) = resolution.label else {
            debug!("No label for {}", source.id);
            return None;
        };

        let publication = dedup::admit(source, &mut self.state.global, &label)?;
        info!(
            "Publishing '{}' from {} (#{} for this source)",
            publication.label, publication.source, source.publish_count
        );
        Some(publication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultCards;
    use crate::game_db::GameDb;
    use crate::types::{DeviceMode, DeviceState, EmulatorKind};
    use serde_json::json;

    fn pipeline() -> Pipeline {
        let db = GameDb::from_reader("title,serial\nExample Game,SCUS-12345\n".as_bytes()).unwrap();
        Pipeline::new(LabelResolver::new(db, DefaultCards::default()))
    }

    fn mame(handle: u64, title: &str) -> SourceSample {
        SourceSample {
            id: SourceId::Window(handle),
            kind: SourceKind::Window(EmulatorKind::Mame),
            raw: RawObservation::Title(title.to_string()),
        }
    }

    fn observed(host: &str, implied_mode: Option<DeviceMode>, document: serde_json::Value) -> DevicePoll {
        DevicePoll::Observed {
            host: host.to_string(),
            implied_mode,
            state: DeviceState::from_value(&document),
        }
    }

    #[test]
    fn test_window_title_change_publishes() {
        let mut pipeline = pipeline();
        let published = pipeline.window_cycle(vec![mame(1, "MAME: [outrun]")]);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].payload, "CMDCOR§PARAM§outrun");

        assert!(pipeline.window_cycle(vec![mame(1, "MAME: [outrun]")]).is_empty());

        let published = pipeline.window_cycle(vec![mame(1, "MAME: [___empty]")]);
        assert_eq!(published[0].label, "MAME-MENU");
    }

    #[test]
    fn test_unresolvable_title_changes_nothing() {
        let mut pipeline = pipeline();
        assert!(pipeline.window_cycle(vec![mame(1, "MAME")]).is_empty());
        let source = pipeline.source(&SourceId::Window(1)).unwrap();
        assert_eq!(source.last_label, None);
        assert_eq!(pipeline.state().global.last_published_payload, None);
    }

    #[test]
    fn test_device_mode_hook_runs_on_transition_only() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let hooks = ModeHooks::default().with_ps2(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let mut pipeline = Pipeline::with_hooks(LabelResolver::default(), hooks);

        let published = pipeline.device_cycle(observed(
            "10.0.0.5",
            None,
            json!({"currentMode": "PS2", "game_id": "MemoryCard1"}),
        ));
        assert_eq!(published[0].label, "PS2");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Same mode, new id: no second hook run
        pipeline.device_cycle(observed(
            "10.0.0.5",
            None,
            json!({"currentMode": "PS2", "game_id": "SLUS-1"}),
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let id = SourceId::Device("10.0.0.5".to_string());
        assert_eq!(pipeline.source(&id).unwrap().mode, Some(DeviceMode::Ps2));
    }

    #[test]
    fn test_lost_device_keeps_label_and_clears_mode() {
        let mut pipeline = pipeline();
        let id = SourceId::Device("10.0.0.5".to_string());
        let document = json!({"currentMode": "PS2", "game_id": "MemoryCard1"});

        assert_eq!(
            pipeline
                .device_cycle(observed("10.0.0.5", None, document.clone()))
                .len(),
            1
        );
        assert!(pipeline
            .device_cycle(DevicePoll::Lost("10.0.0.5".to_string()))
            .is_empty());

        let source = pipeline.source(&id).unwrap();
        assert!(!source.connected);
        assert_eq!(source.mode, None);
        assert_eq!(source.last_label.as_deref(), Some("PS2"));

        // Reconnecting with the same document resolves again but publishes nothing new
        assert!(pipeline
            .device_cycle(observed("10.0.0.5", None, document))
            .is_empty());
        let source = pipeline.source(&id).unwrap();
        assert!(source.connected);
        assert_eq!(source.mode, Some(DeviceMode::Ps2));
    }

    #[test]
    fn test_gc_endpoint_implies_mode() {
        let cards = DefaultCards {
            gc: "MemoryCard2019".to_string(),
            ..DefaultCards::default()
        };
        let mut pipeline = Pipeline::new(LabelResolver::new(GameDb::default(), cards));

        let published = pipeline.device_cycle(observed(
            "10.0.0.6",
            Some(DeviceMode::Gc),
            json!({"gameID": "memorycard2019"}),
        ));
        assert_eq!(published[0].label, "GC");
    }
}
