//! Tracker Persistence
//!
//! The tracker is the bot's only memory between invocations: trading status,
//! the side of the last exited position and the stop-loss orders believed live.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::position::PositionSide;

#[derive(Error, Debug, Clone)]
pub enum TrackerError {
    #[error("Failed to serialize tracker: {0}")]
    SerializationError(String),

    #[error("Failed to write tracker file: {0}")]
    WriteError(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

/// Trading status persisted between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    #[default]
    OkToTrade,
    StopLossTriggered,
    CloseAllTriggered,
    ErrorReadingTracker,
}

impl TrackerStatus {
    pub fn can_trade(&self) -> bool {
        matches!(self, TrackerStatus::OkToTrade)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerStatus::OkToTrade => "ok_to_trade",
            TrackerStatus::StopLossTriggered => "stop_loss_triggered",
            TrackerStatus::CloseAllTriggered => "close_all_triggered",
            TrackerStatus::ErrorReadingTracker => "error_reading_tracker",
        }
    }
}

/// Persisted strategy state, one file per symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrackerState {
    pub status: TrackerStatus,
    /// Side of the most recent position that exited
    #[serde(default)]
    pub last_side: Option<PositionSide>,
    #[serde(default)]
    pub stop_loss_ids: Vec<String>,
    /// Diagnostic only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_price: Option<f64>,
}

impl TrackerState {
    fn unreadable() -> Self {
        Self {
            status: TrackerStatus::ErrorReadingTracker,
            ..Self::default()
        }
    }

    /// Add a stop-loss id, keeping placement order and ignoring duplicates
    pub fn track_stop_loss(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.stop_loss_ids.contains(&id) {
            self.stop_loss_ids.push(id);
        }
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.stop_loss_ids.iter().any(|tracked| tracked == id)
    }

    /// Stop trading after an exit on `side` until the resume gate reopens
    pub fn pause(&mut self, status: TrackerStatus, side: PositionSide) {
        self.status = status;
        self.last_side = Some(side);
        self.stop_loss_ids.clear();
    }

    /// Reopen trading, keeping the side that caused the pause
    pub fn resume(&mut self) {
        self.status = TrackerStatus::OkToTrade;
        self.stop_loss_ids.clear();
    }
}

/// Tracker file name for a symbol, e.g. `BTC/USDT:USDT` -> `tracker_BTC-USDT-USDT.json`
pub fn tracker_file_name(symbol: &str) -> String {
    format!("tracker_{}.json", symbol.replace(['/', ':'], "-"))
}

/// File-backed tracker store with atomic replace on save
#[derive(Debug, Clone)]
pub struct TrackerStore {
    path: PathBuf,
}

impl TrackerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `symbol` inside `dir`
    pub fn for_symbol(dir: impl AsRef<Path>, symbol: &str) -> Self {
        Self::new(dir.as_ref().join(tracker_file_name(symbol)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the tracker, creating a default file on first run.
    ///
    /// A corrupt or unreadable file does not fail here: the returned state carries
    /// `ErrorReadingTracker` so the caller can stop with a clear diagnosis.
    pub fn load(&self) -> Result<TrackerState, TrackerError> {
        if !self.path.exists() {
            tracing::info!("Tracker file not found, creating: {}", self.path.display());
            let state = TrackerState::default();
            self.save(&state)?;
            return Ok(state);
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("Failed to read tracker file {}: {}", self.path.display(), e);
                return Ok(TrackerState::unreadable());
            }
        };

        match serde_json::from_str::<TrackerState>(&content) {
            Ok(state) => {
                tracing::debug!(
                    "Tracker loaded: status={}, last_side={:?}, stop_loss_ids={:?}",
                    state.status.as_str(),
                    state.last_side,
                    state.stop_loss_ids
                );
                Ok(state)
            }
            Err(e) => {
                tracing::error!("Tracker file {} is corrupted: {}", self.path.display(), e);
                Ok(TrackerState::unreadable())
            }
        }
    }

    /// Replace the tracker file atomically: write a sibling temp file, sync, rename.
    pub fn save(&self, state: &TrackerState) -> Result<(), TrackerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| TrackerError::DirectoryError(e.to_string()))?;
            }
        }

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| TrackerError::SerializationError(e.to_string()))?;

        let tmp_path = self.tmp_path();
        let mut file = fs::File::create(&tmp_path)
            .map_err(|e| TrackerError::WriteError(e.to_string()))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| TrackerError::WriteError(e.to_string()))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            TrackerError::WriteError(e.to_string())
        })?;

        tracing::debug!(
            "Tracker saved: status={}, stop_loss_ids={}",
            state.status.as_str(),
            state.stop_loss_ids.len()
        );
        Ok(())
    }

    /// Operator reset back to the first-run state
    pub fn reset(&self) -> Result<TrackerState, TrackerError> {
        let state = TrackerState::default();
        self.save(&state)?;
        tracing::info!("Tracker reset: {}", self.path.display());
        Ok(state)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> TrackerStore {
        TrackerStore::for_symbol(dir.path(), "BTC/USDT:USDT")
    }

    #[test]
    fn test_tracker_file_name() {
        assert_eq!(tracker_file_name("BTC/USDT:USDT"), "tracker_BTC-USDT-USDT.json");
    }

    #[test]
    fn test_load_creates_default() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let state = store.load().unwrap();
        assert_eq!(state, TrackerState::default());
        assert!(store.path().exists());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["status"], "ok_to_trade");
        assert!(raw["last_side"].is_null());
        assert_eq!(raw["stop_loss_ids"], serde_json::json!([]));
        assert!(raw.get("stop_loss_price").is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let state = TrackerState {
            status: TrackerStatus::StopLossTriggered,
            last_side: Some(PositionSide::Short),
            stop_loss_ids: vec!["sl-1".to_string(), "sl-2".to_string()],
            stop_loss_price: Some(123.5),
        };
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_load_corrupted_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{ not json").unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.status, TrackerStatus::ErrorReadingTracker);
        // the corrupted file is left for the operator to inspect
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[test]
    fn test_load_unknown_status_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"status": "paused", "last_side": null, "stop_loss_ids": []}"#)
            .unwrap();

        assert_eq!(store.load().unwrap().status, TrackerStatus::ErrorReadingTracker);
    }

    #[test]
    fn test_load_accepts_missing_optional_fields() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"status": "close_all_triggered", "last_side": "long"}"#).unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.status, TrackerStatus::CloseAllTriggered);
        assert_eq!(state.last_side, Some(PositionSide::Long));
        assert!(state.stop_loss_ids.is_empty());
    }

    #[test]
    fn test_save_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let store = TrackerStore::for_symbol(dir.path().join("state/nested"), "ETH/USDT:USDT");
        store.save(&TrackerState::default()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_reset() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "garbage").unwrap();

        let state = store.reset().unwrap();
        assert_eq!(state, TrackerState::default());
        assert_eq!(store.load().unwrap(), TrackerState::default());
    }

    #[test]
    fn test_track_stop_loss_dedupes() {
        let mut state = TrackerState::default();
        state.track_stop_loss("a");
        state.track_stop_loss("b");
        state.track_stop_loss("a");
        assert_eq!(state.stop_loss_ids, vec!["a", "b"]);
        assert!(state.is_tracked("b"));
    }

    #[test]
    fn test_pause_and_resume() {
        let mut state = TrackerState::default();
        state.track_stop_loss("a");

        state.pause(TrackerStatus::CloseAllTriggered, PositionSide::Long);
        assert_eq!(state.status, TrackerStatus::CloseAllTriggered);
        assert_eq!(state.last_side, Some(PositionSide::Long));
        assert!(state.stop_loss_ids.is_empty());
        assert!(!state.status.can_trade());

        state.resume();
        assert!(state.status.can_trade());
        assert_eq!(state.last_side, Some(PositionSide::Long));
    }
}
