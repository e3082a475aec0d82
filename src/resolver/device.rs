//! Memory card device state rules.

use crate::config::DefaultCards;
use crate::game_db::{normalize_id, GameDb};
use crate::types::{DeviceMode, DeviceState, EMU_MENU_LABEL};
use tracing::{debug, warn};

/// Context the device rules need beyond the state document itself
#[derive(Debug, Clone, Copy)]
pub struct DeviceContext<'a> {
    /// Mode recorded for this source on an earlier cycle
    pub recorded_mode: Option<&'a DeviceMode>,
    /// Mode implied by the endpoint that answered
    pub endpoint_mode: Option<&'a DeviceMode>,
    pub default_cards: &'a DefaultCards,
    pub game_db: &'a GameDb,
}

/// Outcome of resolving one device state document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResolution {
    pub mode: Option<DeviceMode>,
    /// The mode differs from the recorded one and its hook should run
    pub mode_changed: bool,
    pub label: Option<String>,
    /// Serial of the matched game, informational only
    pub serial: Option<String>,
}

/// Resolve a device state document to a label
pub fn resolve_state(state: &DeviceState, ctx: &DeviceContext<'_>) -> DeviceResolution {
    let mode = state
        .reported_mode()
        .or_else(|| ctx.endpoint_mode.cloned())
        .or_else(|| ctx.recorded_mode.cloned());
    let mode_changed = mode.is_some() && mode.as_ref() != ctx.recorded_mode;

    let game_id = state.reported_id();
    let normalized = normalize_id(game_id);

    let mut resolution = DeviceResolution {
        mode,
        mode_changed,
        label: None,
        serial: None,
    };

    let token = ctx.default_cards.token_for(resolution.mode.as_ref());
    if token.is_some_and(|token| token == normalized) {
        let label = resolution
            .mode
            .as_ref()
            .map_or(EMU_MENU_LABEL, DeviceMode::name);
        resolution.label = Some(label.to_string());
        return resolution;
    }

    match ctx.game_db.lookup(game_id) {
        Some(game) => {
            resolution.label = Some(game.title.clone());
            resolution.serial = Some(game.serial.clone()).filter(|s| !s.is_empty());
        }
        None => debug!("Game id '{}' not in game table, skipping", game_id),
    }

    resolution
}

/// Side effect run when a device enters a mode
pub type ModeHandler = Box<dyn Fn(&DeviceMode, &DeviceState) + Send + Sync>;

/// One handler per device mode plus one for modes without rules
pub struct ModeHooks {
    ps1: ModeHandler,
    ps2: ModeHandler,
    gc: ModeHandler,
    unrecognized: ModeHandler,
}

impl ModeHooks {
    pub fn run(&self, mode: &DeviceMode, state: &DeviceState) {
        let handler = match mode {
            DeviceMode::Ps1 => &self.ps1,
            DeviceMode::Ps2 => &self.ps2,
            DeviceMode::Gc => &self.gc,
            DeviceMode::Unrecognized(_) => &self.unrecognized,
        };
        handler(mode, state);
    }

    pub fn with_ps1(mut self, handler: ModeHandler) -> Self {
        self.ps1 = handler;
        self
    }

    pub fn with_ps2(mut self, handler: ModeHandler) -> Self {
        self.ps2 = handler;
        self
    }

    pub fn with_gc(mut self, handler: ModeHandler) -> Self {
        self.gc = handler;
        self
    }

    pub fn with_unrecognized(mut self, handler: ModeHandler) -> Self {
        self.unrecognized = handler;
        self
    }
}

impl Default for ModeHooks {
    fn default() -> Self {
        Self {
            ps1: Box::new(log_mode),
            ps2: Box::new(log_mode),
            gc: Box::new(log_mode),
            unrecognized: Box::new(|mode, _| warn!("Unrecognized device mode: {}", mode)),
        }
    }
}

impl std::fmt::Debug for ModeHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeHooks").finish_non_exhaustive()
    }
}

fn log_mode(mode: &DeviceMode, state: &DeviceState) {
    debug!(
        "{} mode logic (ch={:?}, size={:?}, rssi={:?})",
        mode, state.current_channel, state.current_size, state.rssi
    );
}
