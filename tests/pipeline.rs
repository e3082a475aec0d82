//! End-to-end pipeline scenarios: snapshots in, publications out, delivered
//! to a real channel file.

use marquee_router::config::DefaultCards;
use marquee_router::types::{RawObservation, SourceKind, SourceSample};
use marquee_router::{
    DeviceMode, DevicePoll, DeviceState, EmulatorKind, GameDb, LabelResolver,
    LocalFilePublisher, Pipeline, Publisher, SourceId,
};
use serde_json::{json, Value};

const GAME_TABLE: &str = "title,serial,alt\nExample Game,SCUS-12345,scus_123.45\n";

fn pipeline() -> Pipeline {
    let db = GameDb::from_reader(GAME_TABLE.as_bytes()).unwrap();
    Pipeline::new(LabelResolver::new(db, DefaultCards::default()))
}

fn window(handle: u64, kind: EmulatorKind, title: &str) -> SourceSample {
    SourceSample {
        id: SourceId::Window(handle),
        kind: SourceKind::Window(kind),
        raw: RawObservation::Title(title.to_string()),
    }
}

fn device(document: Value) -> DevicePoll {
    DevicePoll::Observed {
        host: "192.168.1.60".to_string(),
        implied_mode: None,
        state: DeviceState::from_value(&document),
    }
}

fn labels(publications: &[marquee_router::Publication]) -> Vec<&str> {
    publications.iter().map(|p| p.label.as_str()).collect()
}

#[test]
fn test_mame_game_published_once() {
    let mut pipeline = pipeline();
    let mut published = Vec::new();
    for _ in 0..5 {
        published.extend(pipeline.window_cycle(vec![window(
            1,
            EmulatorKind::Mame,
            "MAME: [outrun]",
        )]));
    }
    assert_eq!(labels(&published), vec!["outrun"]);
    assert_eq!(published[0].payload, "CMDCOR§PARAM§outrun");
}

#[test]
fn test_mame_empty_slot_is_menu() {
    let mut pipeline = pipeline();
    let published = pipeline.window_cycle(vec![window(1, EmulatorKind::Mame, "MAME: [___empty]")]);
    assert_eq!(labels(&published), vec!["MAME-MENU"]);
}

#[test]
fn test_every_emulator_menu_title() {
    let cases = [
        (EmulatorKind::Flycast, "Flycast", "DCEMU-MENU"),
        (EmulatorKind::DuckStation, "DuckStation", "PS1EMU-MENU"),
        (EmulatorKind::TeknoParrot, "TeknoParrot", "TPEMU-MENU"),
        (EmulatorKind::Pcsx2, "PCSX2 2.0", "PS2EMU-MENU"),
        (EmulatorKind::Dolphin, "Dolphin", "DOLPHIN-MENU"),
    ];
    for (handle, (kind, title, sentinel)) in cases.into_iter().enumerate() {
        let mut pipeline = pipeline();
        let published = pipeline.window_cycle(vec![window(handle as u64, kind, title)]);
        assert_eq!(labels(&published), vec![sentinel], "{:?}", kind);
    }
}

#[test]
fn test_transient_dialog_does_not_replace_game() {
    let mut pipeline = pipeline();
    pipeline.window_cycle(vec![window(1, EmulatorKind::Pcsx2, "Gran Turismo 4")]);
    let published = pipeline.window_cycle(vec![
        window(1, EmulatorKind::Pcsx2, "Gran Turismo 4"),
        window(2, EmulatorKind::Pcsx2, "Select ISO Image"),
    ]);
    assert!(published.is_empty());
}

#[test]
fn test_closed_window_keeps_global_dedupe() {
    let mut pipeline = pipeline();
    pipeline.window_cycle(vec![window(1, EmulatorKind::Mame, "MAME: [outrun]")]);

    // Window closes: its own state goes, the global payload stays
    assert!(pipeline.window_cycle(Vec::new()).is_empty());
    assert!(pipeline.source(&SourceId::Window(1)).is_none());

    // A new window showing the same game is not republished
    let published = pipeline.window_cycle(vec![window(2, EmulatorKind::Mame, "MAME: [outrun]")]);
    assert!(published.is_empty());
    assert_eq!(
        pipeline.state().global.last_published_payload.as_deref(),
        Some("CMDCOR§PARAM§outrun")
    );

    // But a different game from it is
    let published = pipeline.window_cycle(vec![window(2, EmulatorKind::Mame, "MAME: [sf2]")]);
    assert_eq!(labels(&published), vec!["sf2"]);
}

#[test]
fn test_ps2_default_card_is_console_menu() {
    let mut pipeline = pipeline();
    let published = pipeline.device_cycle(device(json!({
        "currentMode": "PS2",
        "game_id": "MemoryCard1",
        "currentChannel": 1,
        "currentSize": 8,
        "rssi": -51
    })));
    assert_eq!(labels(&published), vec!["PS2"]);
}

#[test]
fn test_device_game_published_once() {
    let mut pipeline = pipeline();
    let document = json!({"currentMode": "PS1", "game_id": "SCUS-12345"});
    let mut published = Vec::new();
    for _ in 0..3 {
        published.extend(pipeline.device_cycle(device(document.clone())));
    }
    assert_eq!(labels(&published), vec!["Example Game"]);
}

#[test]
fn test_game_id_fields_are_interchangeable() {
    for document in [
        json!({"currentMode": "PS1", "game_id": "scus-12345 "}),
        json!({"currentMode": "PS1", "gameID": " SCUS-12345"}),
        json!({"currentMode": "PS1", "game_id": "", "gameID": "SCUS_123.45"}),
    ] {
        let mut pipeline = pipeline();
        let published = pipeline.device_cycle(device(document.clone()));
        assert_eq!(labels(&published), vec!["Example Game"], "{}", document);
    }
}

#[test]
fn test_unknown_id_never_publishes() {
    let mut pipeline = pipeline();
    let published = pipeline.device_cycle(device(json!({
        "currentMode": "PS2",
        "game_id": "SLES-99999"
    })));
    assert!(published.is_empty());

    let source = pipeline
        .source(&SourceId::Device("192.168.1.60".to_string()))
        .unwrap();
    assert_eq!(source.last_label, None);
    assert_eq!(source.mode, Some(DeviceMode::Ps2));
    assert_eq!(pipeline.state().global.last_published_payload, None);
}

#[test]
fn test_mode_is_sticky_between_reports() {
    let mut pipeline = pipeline();
    pipeline.device_cycle(device(json!({"currentMode": "PS2", "game_id": "SCUS-12345"})));

    // No mode in this report: the recorded PS2 mode applies to the default card
    let published = pipeline.device_cycle(device(json!({"game_id": "MemoryCard1"})));
    assert_eq!(labels(&published), vec!["PS2"]);
}

#[tokio::test]
async fn test_publications_reach_channel_file() {
    let dir = tempfile::tempdir().unwrap();
    let channel = dir.path().join("tty2rpi.socket");
    let publisher = LocalFilePublisher::new(&channel);
    let mut pipeline = pipeline();

    for title in ["MAME: [outrun]", "MAME: [outrun]", "MAME: [___empty]"] {
        for publication in pipeline.window_cycle(vec![window(1, EmulatorKind::Mame, title)]) {
            publisher.publish(&publication.payload).await.unwrap();
        }
    }

    assert_eq!(
        std::fs::read_to_string(&channel).unwrap(),
        "CMDCOR§PARAM§MAME-MENU"
    );
}
