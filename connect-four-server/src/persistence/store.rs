//! Finished-game storage.
//!
//! Best-effort: the registry logs failures and carries on.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, warn};

use crate::game::leaderboard::GameRecord;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File I/O failed.
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistence collaborator for finished games.
pub trait GameStore: Send + Sync {
    /// Persist one finished game.
    fn record_finished_game(&self, record: &GameRecord) -> Result<(), StoreError>;

    /// All stored games in recorded order.
    fn load_history(&self) -> Result<Vec<GameRecord>, StoreError>;
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlGameStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlGameStore {
    /// Open (or create) the store file for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "opened game store");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GameStore for JsonlGameStore {
    fn record_finished_game(&self, record: &GameRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().map_err(|_| StoreError::Poisoned)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<GameRecord>, StoreError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<GameRecord>(&line) {
                Ok(record) => records.push(record),
                // A torn final write should not hide the rest of the history
                Err(e) => warn!(line = index + 1, error = %e, "skipping unreadable game record"),
            }
        }

        Ok(records)
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryGameStore {
    records: Mutex<Vec<GameRecord>>,
}

impl MemoryGameStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored games.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// True if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GameStore for MemoryGameStore {
    fn record_finished_game(&self, record: &GameRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .push(record.clone());
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<GameRecord>, StoreError> {
        Ok(self.records.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }
}
