//! Label resolution.
//!
//! Turns a source's raw observation into the canonical label shown on the
//! marquee. Window titles go through the per-kind rule table in [`window`];
//! device state documents go through the mode and game table rules in
//! [`device`]. Resolution never fails: "no label" is a normal outcome.

pub mod device;
pub mod window;

pub use device::{resolve_state, DeviceContext, DeviceResolution, ModeHandler, ModeHooks};
pub use window::{resolve_title, rule_for, Extraction, WindowRule, WINDOW_RULES};

use crate::config::DefaultCards;
use crate::game_db::GameDb;
use crate::types::{DeviceMode, RawObservation, SourceKind, TrackedSource};
use tracing::trace;

/// Result of resolving one tracked source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub label: Option<String>,
    /// Effective device mode for this cycle (device sources only)
    pub mode: Option<DeviceMode>,
    pub mode_changed: bool,
}

/// Resolver holding the lookup data the device rules need
#[derive(Debug, Clone, Default)]
pub struct LabelResolver {
    game_db: GameDb,
    default_cards: DefaultCards,
}

impl LabelResolver {
    pub fn new(game_db: GameDb, default_cards: DefaultCards) -> Self {
        Self {
            game_db,
            default_cards,
        }
    }

    /// Resolve a source's current raw observation
    pub fn resolve(&self, source: &TrackedSource) -> Resolution {
        match (&source.kind, &source.raw) {
            (SourceKind::Window(kind), RawObservation::Title(title)) => Resolution {
                label: resolve_title(*kind, title),
                ..Resolution::default()
            },
            (SourceKind::Device, RawObservation::Device(state)) => {
                let ctx = DeviceContext {
                    recorded_mode: source.mode.as_ref(),
                    endpoint_mode: source.endpoint_mode.as_ref(),
                    default_cards: &self.default_cards,
                    game_db: &self.game_db,
                };
                let resolved = resolve_state(state, &ctx);
                Resolution {
                    label: resolved.label,
                    mode: resolved.mode,
                    mode_changed: resolved.mode_changed,
                }
            }
            (kind, _) => {
                trace!("No rules for {:?} observation on {}", kind, source.id);
                Resolution::default()
            }
        }
    }
}
