use std::fs;

use combo_picker::persist::{clear_session, load_session, save_session};
use combo_picker::state::SessionPhase;
use combo_picker::{RawMatch, SessionState};

fn sample_session() -> SessionState {
    let mut session = SessionState::new();
    session.start(
        vec![RawMatch {
            match_id: Some("m1".to_string()),
            participant_name: Some("Arsenal".to_string()),
            opponent_name: Some("Everton".to_string()),
            odds_decimal: Some(1.45),
            opponent_odds_decimal: Some(6.5),
            is_favorite: true,
            is_live: false,
        }],
        Some(1),
        None,
    );
    session.restore_keys(["m1:Arsenal".to_string(), "m1:Everton".to_string()]);
    session
}

#[test]
fn saved_session_loads_back_identically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("session.json");
    let session = sample_session();

    save_session(&path, &session).expect("save should succeed");
    assert!(!path.with_extension("json.tmp").exists());

    let loaded = load_session(&path)
        .expect("session should load")
        .expect("session was saved");
    assert_eq!(loaded, session);
    assert_eq!(loaded.phase, SessionPhase::Active);
    assert!(loaded.used_keys.contains("m1:Everton"));
}

#[test]
fn missing_or_foreign_version_files_load_as_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    assert!(load_session(&path).unwrap().is_none());

    save_session(&path, &sample_session()).unwrap();
    let raw = fs::read_to_string(&path).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    value["version"] = serde_json::json!(99);
    fs::write(&path, value.to_string()).unwrap();
    assert!(load_session(&path).unwrap().is_none());
}

#[test]
fn corrupt_store_is_an_error_and_left_in_place() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    fs::write(&path, "not json").unwrap();

    let err = load_session(&path).unwrap_err();
    assert!(format!("{err:#}").contains("parse session"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
}

#[test]
fn clear_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    save_session(&path, &sample_session()).unwrap();
    clear_session(&path).unwrap();
    assert!(!path.exists());
    clear_session(&path).unwrap();
}
