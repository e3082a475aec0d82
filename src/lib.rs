//! Marquee Router - emulator game to marquee display bridge
//!
//! This crate watches what game is running and republishes a short label to
//! the channel file read by a tty2rpi marquee display. Two inputs are
//! supported:
//!
//! - **Windows**: titles of emulator windows on this machine (MAME, Flycast,
//!   DuckStation, TeknoParrot, PCSX2, Dolphin)
//! - **Device**: the state document of a MemCard Pro memory card on the network
//!
//! # Architecture
//!
//! Each cycle a snapshot flows through the source tracker, the label resolver
//! and the dedupe gate; only labels whose payload differs from both the
//! source's last payload and the last payload overall reach the publisher.

pub mod config;
pub mod dedup;
pub mod device;
pub mod game_db;
pub mod pipeline;
pub mod publisher;
pub mod resolver;
pub mod router;
pub mod tracker;
pub mod types;
pub mod window_tracker;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use device::{DevicePoll, DeviceWatcher, HttpProbe, StateProbe};
pub use game_db::{GameDb, GameRecord};
pub use pipeline::Pipeline;
pub use publisher::{build_publisher, LocalFilePublisher, PublishError, Publisher};
pub use resolver::{LabelResolver, ModeHooks};
pub use router::{MarqueeRouter, RouterInput, RouterStatus, SourceStatus};
pub use tracker::{PipelineState, RemovalPolicy, SourceEvent};
pub use types::{
    payload_for, DeviceMode, DeviceState, EmulatorKind, Publication, SourceId, TrackedSource,
    PAYLOAD_PREFIX,
};
pub use window_tracker::{DesktopWindows, WindowSource};
