use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::SessionState;

const STORE_DIR: &str = "combo_picker";
const STORE_FILE: &str = "session.json";
const STORE_VERSION: u32 = 1;
/// Overrides the store location.
pub const STORE_PATH_ENV: &str = "PICKER_STORE_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    saved_at: DateTime<Utc>,
    session: SessionState,
}

/// Loads a saved session.
///
/// A missing file or a file from another store version is `Ok(None)`. A file
/// that exists but cannot be read or parsed is an error, so a corrupt store
/// is never silently replaced.
pub fn load_session(path: &Path) -> Result<Option<SessionState>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("read session {}", path.display()));
        }
    };
    let file: SessionFile = serde_json::from_str(&raw)
        .with_context(|| format!("parse session {}", path.display()))?;
    if file.version != STORE_VERSION {
        warn!(
            found = file.version,
            expected = STORE_VERSION,
            "ignoring session saved by another store version"
        );
        return Ok(None);
    }
    Ok(Some(file.session))
}

pub fn save_session(path: &Path, session: &SessionState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create session store dir")?;
    }
    let file = SessionFile {
        version: STORE_VERSION,
        saved_at: Utc::now(),
        session: session.clone(),
    };
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(&file).context("serialize session")?;
    fs::write(&tmp, json).context("write session")?;
    fs::rename(&tmp, path).context("swap session")?;
    Ok(())
}

pub fn clear_session(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).context("remove session"),
    }
}

/// Where the session lives: `PICKER_STORE_PATH` when set, otherwise
/// `combo_picker/session.json` under the user's cache directory.
pub fn default_store_path() -> Option<PathBuf> {
    store_path_from(|key| std::env::var(key).ok())
}

fn store_path_from(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
    if let Some(explicit) = var(STORE_PATH_ENV) {
        return Some(explicit);
    }
    let cache_dir = var("XDG_CACHE_HOME").or_else(|| var("HOME").map(|home| home.join(".cache")))?;
    Some(cache_dir.join(STORE_DIR).join(STORE_FILE))
}
