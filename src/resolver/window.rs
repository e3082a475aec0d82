//! Window title rules.
//!
//! Each emulator kind has one rule record: the substrings that mark transient
//! dialogs, the prefix of the emulator's own idle title, the sentinel label
//! for that idle state and how a game name is pulled out of the title.

use crate::types::EmulatorKind;
use tracing::debug;

/// How the label is pulled out of a window title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Text between the first `[` and the following `]`.
    /// `empty_token` is what the emulator shows there with nothing loaded.
    Bracketed { empty_token: &'static str },
    /// Titles starting with the menu prefix carry the game after `marker`;
    /// other titles are used verbatim.
    Delimiter { marker: &'static str },
    /// The trimmed title is the label
    Verbatim,
}

/// Title handling for one emulator kind
#[derive(Debug)]
pub struct WindowRule {
    pub kind: EmulatorKind,
    /// Lowercase prefix of the emulator's own (idle) window title
    pub menu_prefix: Option<&'static str>,
    pub menu_sentinel: &'static str,
    pub extraction: Extraction,
    /// Lowercase substrings of dialogs that must not change the marquee
    pub noise: &'static [&'static str],
}

static MAME: WindowRule = WindowRule {
    kind: EmulatorKind::Mame,
    menu_prefix: None,
    menu_sentinel: "MAME-MENU",
    extraction: Extraction::Bracketed {
        empty_token: "___empty",
    },
    noise: &[],
};

static FLYCAST: WindowRule = WindowRule {
    kind: EmulatorKind::Flycast,
    menu_prefix: Some("flycast"),
    menu_sentinel: "DCEMU-MENU",
    extraction: Extraction::Delimiter { marker: "- " },
    noise: &[],
};

static DUCKSTATION: WindowRule = WindowRule {
    kind: EmulatorKind::DuckStation,
    menu_prefix: Some("duckstation"),
    menu_sentinel: "PS1EMU-MENU",
    extraction: Extraction::Verbatim,
    noise: &[
        "duckstation-qt-x64-releaseltcg",
        "select disc image",
        "automatic updater",
        "about duckstation",
        "about qt",
        "padtest",
        "memory scanner",
        "download covers",
        "memory card editor",
        "iso browser",
        "select search directory",
        "duckstation settings",
        "error",
        "select save state file",
        "duckstation controller presets",
        "select background image",
    ],
};

static TEKNOPARROT: WindowRule = WindowRule {
    kind: EmulatorKind::TeknoParrot,
    menu_prefix: Some("teknoparrot"),
    menu_sentinel: "TPEMU-MENU",
    extraction: Extraction::Verbatim,
    noise: &[],
};

static PCSX2: WindowRule = WindowRule {
    kind: EmulatorKind::Pcsx2,
    menu_prefix: Some("pcsx2"),
    menu_sentinel: "PS2EMU-MENU",
    extraction: Extraction::Verbatim,
    noise: &[
        "pcsx2-qt",
        "ps2 bios (usa)",
        "select iso image",
        "open iso",
        "about pcsx2",
        "about qt",
        "automatic updater",
        "select location to save block dump",
        "show advanced settings",
        "select search directory",
        "select save state file",
    ],
};

static DOLPHIN: WindowRule = WindowRule {
    kind: EmulatorKind::Dolphin,
    menu_prefix: Some("dolphin"),
    menu_sentinel: "DOLPHIN-MENU",
    extraction: Extraction::Verbatim,
    noise: &["dolphin-emu", "confirm", "open file"],
};

/// All window rules, one per emulator kind
pub static WINDOW_RULES: [&WindowRule; 6] =
    [&MAME, &FLYCAST, &DUCKSTATION, &TEKNOPARROT, &PCSX2, &DOLPHIN];

/// Rule record for an emulator kind
pub fn rule_for(kind: EmulatorKind) -> &'static WindowRule {
    match kind {
        EmulatorKind::Mame => &MAME,
        EmulatorKind::Flycast => &FLYCAST,
        EmulatorKind::DuckStation => &DUCKSTATION,
        EmulatorKind::TeknoParrot => &TEKNOPARROT,
        EmulatorKind::Pcsx2 => &PCSX2,
        EmulatorKind::Dolphin => &DOLPHIN,
    }
}

/// Resolve a window title to a label using the kind's rule
pub fn resolve_title(kind: EmulatorKind, title: &str) -> Option<String> {
    resolve_with_rule(rule_for(kind), title)
}

/// Resolve a window title against an explicit rule record
pub fn resolve_with_rule(rule: &WindowRule, title: &str) -> Option<String> {
    let lowered = title.trim().to_lowercase();

    if let Some(noise) = rule.noise.iter().find(|noise| lowered.contains(**noise)) {
        debug!(
            "Skipping transient {} window '{}' (matched '{}')",
            rule.kind.as_str(),
            title,
            noise
        );
        return None;
    }

    let is_menu = rule
        .menu_prefix
        .is_some_and(|prefix| lowered.starts_with(prefix));

    let label = match (rule.extraction, is_menu) {
        (Extraction::Delimiter { marker }, true) => match title.find(marker) {
            Some(idx) => title[idx + marker.len()..].trim().to_string(),
            None => rule.menu_sentinel.to_string(),
        },
        (_, true) => rule.menu_sentinel.to_string(),
        (Extraction::Bracketed { empty_token }, false) => {
            let inner = bracketed(title)?;
            if inner == empty_token {
                rule.menu_sentinel.to_string()
            } else {
                inner.to_string()
            }
        }
        (Extraction::Delimiter { .. } | Extraction::Verbatim, false) => title.trim().to_string(),
    };

    if label.is_empty() {
        debug!("Parsed empty label from '{}' ({})", title, rule.kind.as_str());
        return None;
    }
    Some(label)
}

/// Text strictly between the first `[` and the `]` after it
fn bracketed(title: &str) -> Option<&str> {
    let start = title.find('[')? + 1;
    let len = title[start..].find(']')?;
    Some(&title[start..start + len])
}
