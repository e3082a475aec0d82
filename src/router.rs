//! Main routing loop body.
//!
//! The router owns one input (the emulator windows on this machine or a
//! memory card device), the pipeline state and the publisher. Each `tick`
//! polls the input once, runs the pipeline and delivers what it admits.

use crate::config::WindowsConfig;
use crate::device::{DeviceWatcher, StateProbe};
use crate::pipeline::Pipeline;
use crate::publisher::Publisher;
use crate::types::{Publication, SourceId};
use chrono::{DateTime, Utc};
use crate::window_tracker::{emulator_samples, WindowSource};
use std::time::{Duration, Instant};
use tracing::{error, trace, warn};

/// Where the router gets its observations from
pub enum RouterInput {
    Windows {
        desktop: Box<dyn WindowSource>,
        config: WindowsConfig,
    },
    Device(DeviceWatcher<Box<dyn StateProbe>>),
}

impl RouterInput {
    pub fn name(&self) -> &'static str {
        match self {
            RouterInput::Windows { .. } => "windows",
            RouterInput::Device(_) => "device",
        }
    }
}

/// Marquee router
pub struct MarqueeRouter {
    input: RouterInput,
    pipeline: Pipeline,
    publisher: Box<dyn Publisher>,
    /// Poll interval for this input
    interval: Duration,
    published: u64,
    failed: u64,
    last_label: Option<String>,
    last_tick: Instant,
}

impl MarqueeRouter {
    pub fn new(
        input: RouterInput,
        pipeline: Pipeline,
        publisher: Box<dyn Publisher>,
        interval: Duration,
    ) -> Self {
        Self {
            input,
            pipeline,
            publisher,
            interval,
            published: 0,
            failed: 0,
            last_label: None,
            last_tick: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run one cycle. Returns the publications that were delivered.
    pub async fn tick(&mut self) -> Vec<Publication> {
        let now = Instant::now();
        trace!("Router tick, elapsed: {:?}", now.duration_since(self.last_tick));
        self.last_tick = now;

        let admitted = match &mut self.input {
            RouterInput::Windows { desktop, config } => match desktop.snapshot() {
                Ok(windows) => {
                    let samples = emulator_samples(windows, &**desktop, config);
                    self.pipeline.window_cycle(samples)
                }
                Err(e) => {
                    warn!("Skipping cycle: {}", e);
                    return Vec::new();
                }
            },
            RouterInput::Device(watcher) => {
                let poll = watcher.poll().await;
                self.pipeline.device_cycle(poll)
            }
        };

        let mut delivered = Vec::with_capacity(admitted.len());
        for publication in admitted {
            match self.publisher.publish(&publication.payload).await {
                Ok(()) => {
                    self.published += 1;
                    self.last_label = Some(publication.label.clone());
                    delivered.push(publication);
                }
                Err(e) => {
                    // Dedupe state already records the payload; the next change retries
                    self.failed += 1;
                    error!(
                        "Failed to publish '{}' to {}: {}",
                        publication.label,
                        self.publisher.describe(),
                        e
                    );
                }
            }
        }
        delivered
    }

    /// Get router status
    pub fn status(&self) -> RouterStatus {
        let state = self.pipeline.state();
        let mut sources: Vec<SourceStatus> = state
            .sources
            .values()
            .map(|source| SourceStatus {
                id: source.id.clone(),
                connected: source.connected,
                last_label: source.last_label.clone(),
                publish_count: source.publish_count,
                last_published_at: source.last_published_at,
            })
            .collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));

        RouterStatus {
            input: self.input.name(),
            destination: self.publisher.describe(),
            tracked_sources: state.sources.len(),
            connected_sources: state.connected_count(),
            published: self.published,
            failed: self.failed,
            last_label: self.last_label.clone(),
            sources,
        }
    }
}

/// Router status information
#[derive(Debug, Clone)]
pub struct RouterStatus {
    pub input: &'static str,
    pub destination: String,
    pub tracked_sources: usize,
    pub connected_sources: usize,
    pub published: u64,
    pub failed: u64,
    pub last_label: Option<String>,
    /// Per-source publish history, ordered by source id
    pub sources: Vec<SourceStatus>,
}

#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub id: SourceId,
    pub connected: bool,
    pub last_label: Option<String>,
    pub publish_count: u32,
    pub last_published_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultCards;
    use crate::device::tests::FakeProbe;
    use crate::device::Endpoint;
    use crate::game_db::GameDb;
    use crate::publisher::PublishError;
    use crate::resolver::LabelResolver;
    use crate::types::EnumerationError;
    use crate::window_tracker::tests::FakeDesktop;
    use crate::window_tracker::WindowSample;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Records payloads; fails while `fail` is set
    #[derive(Default)]
    struct RecordingPublisher {
        payloads: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, payload: &str) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Connection("unreachable".to_string()));
            }
            self.payloads.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    fn desktop(frames: Vec<Result<Vec<WindowSample>, EnumerationError>>) -> FakeDesktop {
        let mut desktop = FakeDesktop::default();
        desktop.processes.insert(7, "mame.exe".to_string());
        desktop.frames = frames.into();
        desktop
    }

    fn mame_window(title: &str) -> WindowSample {
        WindowSample {
            handle: 0x10,
            pid: 7,
            title: title.to_string(),
        }
    }

    fn windows_router(desktop: FakeDesktop, publisher: RecordingPublisher) -> MarqueeRouter {
        MarqueeRouter::new(
            RouterInput::Windows {
                desktop: Box::new(desktop),
                config: WindowsConfig::default(),
            },
            Pipeline::new(LabelResolver::default()),
            Box::new(publisher),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_windows_tick_publishes_once() {
        let payloads = Arc::new(Mutex::new(Vec::new()));
        let publisher = RecordingPublisher {
            payloads: payloads.clone(),
            fail: false,
        };
        let mut router = windows_router(
            desktop(vec![
                Ok(vec![mame_window("MAME: [outrun]")]),
                Ok(vec![mame_window("MAME: [outrun]")]),
            ]),
            publisher,
        );

        assert_eq!(router.tick().await.len(), 1);
        assert!(router.tick().await.is_empty());
        assert_eq!(*payloads.lock().unwrap(), vec!["CMDCOR§PARAM§outrun"]);

        let status = router.status();
        assert_eq!(status.input, "windows");
        assert_eq!(status.published, 1);
        assert_eq!(status.last_label.as_deref(), Some("outrun"));
    }

    #[tokio::test]
    async fn test_status_reports_per_source_history() {
        let mut router = windows_router(
            desktop(vec![
                Ok(vec![mame_window("MAME: [outrun]")]),
                Ok(vec![mame_window("MAME: [outrun]")]),
                Ok(vec![mame_window("MAME: [sf2]")]),
            ]),
            RecordingPublisher::default(),
        );

        let before = Utc::now();
        router.tick().await;
        let first = router.status().sources[0].clone();
        assert_eq!(first.id, SourceId::Window(0x10));
        assert_eq!(first.publish_count, 1);
        assert_eq!(first.last_label.as_deref(), Some("outrun"));
        let published_at = first.last_published_at.unwrap();
        assert!(published_at >= before);

        // Duplicate: history is untouched
        router.tick().await;
        let second = router.status().sources[0].clone();
        assert_eq!(second.publish_count, 1);
        assert_eq!(second.last_published_at, Some(published_at));

        router.tick().await;
        let third = router.status().sources[0].clone();
        assert!(third.connected);
        assert_eq!(third.publish_count, 2);
        assert_eq!(third.last_label.as_deref(), Some("sf2"));
        assert!(third.last_published_at.unwrap() >= published_at);
    }

    #[tokio::test]
    async fn test_enumeration_failure_keeps_tracked_windows() {
        let mut router = windows_router(
            desktop(vec![
                Ok(vec![mame_window("MAME: [outrun]")]),
                Err(EnumerationError::Platform("access denied".to_string())),
                Ok(vec![mame_window("MAME: [outrun]")]),
            ]),
            RecordingPublisher::default(),
        );

        assert_eq!(router.tick().await.len(), 1);
        assert!(router.tick().await.is_empty());
        assert_eq!(router.status().tracked_sources, 1);
        assert!(router.tick().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_retried() {
        let mut router = windows_router(
            desktop(vec![
                Ok(vec![mame_window("MAME: [outrun]")]),
                Ok(vec![mame_window("MAME: [outrun]")]),
            ]),
            RecordingPublisher {
                fail: true,
                ..RecordingPublisher::default()
            },
        );

        assert!(router.tick().await.is_empty());
        assert!(router.tick().await.is_empty());
        let status = router.status();
        assert_eq!(status.failed, 1);
        assert_eq!(status.published, 0);
    }

    #[tokio::test]
    async fn test_device_tick() {
        let probe = FakeProbe::default();
        probe.respond(
            "10.0.0.5",
            json!({"currentMode": "PS1", "game_id": "scus-12345"}),
        );
        let watcher = DeviceWatcher::new(
            Box::new(probe) as Box<dyn StateProbe>,
            vec![Endpoint {
                host: "10.0.0.5".to_string(),
                implied_mode: None,
            }],
        );
        let db = GameDb::from_reader("title,serial\nExample Game,SCUS-12345\n".as_bytes()).unwrap();
        let mut router = MarqueeRouter::new(
            RouterInput::Device(watcher),
            Pipeline::new(LabelResolver::new(db, DefaultCards::default())),
            Box::new(RecordingPublisher::default()),
            Duration::from_secs(5),
        );

        let delivered = router.tick().await;
        assert_eq!(delivered[0].label, "Example Game");

        // Script exhausted: the device is lost but stays tracked
        assert!(router.tick().await.is_empty());
        let status = router.status();
        assert_eq!(status.input, "device");
        assert_eq!(status.tracked_sources, 1);
        assert_eq!(status.connected_sources, 0);
    }
}
