use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entries bundled with the application, used to seed the volatile store.
const INITIAL_MESSAGES: &str = include_str!("../data/guestbook/messages.json");

/// A single guestbook entry as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    pub id: u64,
    pub message: String,
    pub username: String,
    pub created_at: String,
}

pub type Messages = Vec<Message>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message file not found")]
    NotFound,
    #[error("malformed message file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("message file i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Where the store lives, decided once at process start.
pub struct StoreConfig {
    pub path: PathBuf,
    pub seed: Option<&'static str>,
}

impl StoreConfig {
    /// Production writes to a volatile temp file, re-seeded from the bundled
    /// entries on every start (the deployment filesystem is read-only).
    /// Anything else uses the repo data file, which survives restarts.
    pub fn for_mode(production: bool) -> StoreConfig {
        if production {
            StoreConfig {
                path: env::temp_dir().join("messages.json"),
                seed: Some(INITIAL_MESSAGES),
            }
        } else {
            StoreConfig {
                path: PathBuf::from("data/guestbook/messages.json"),
                seed: None,
            }
        }
    }

    /// Reads the IS_PROD toggle ("true" means production).
    pub fn from_env() -> StoreConfig {
        let production = env::var("IS_PROD").map(|v| v == "true").unwrap_or(false);
        StoreConfig::for_mode(production)
    }
}

/// Owns read and append access to the JSON-encoded entry file. There is no
/// in-memory copy; every operation goes back to disk.
pub struct MessageStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MessageStore {
    pub fn open(config: StoreConfig) -> MessageStore {
        if let Some(seed) = config.seed {
            if let Err(e) = fs::write(&config.path, seed) {
                error!("could not seed {}: {}", config.path.display(), e);
            }
        }
        MessageStore {
            path: config.path,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns every stored entry, sorted by id.
    pub fn get_all(&self, order: SortOrder) -> Result<Messages, StoreError> {
        let mut messages = self.load()?;
        match order {
            SortOrder::Asc => messages.sort_by(|a, b| a.id.cmp(&b.id)),
            SortOrder::Desc => messages.sort_by(|a, b| b.id.cmp(&a.id)),
        }
        Ok(messages)
    }

    /// Appends an entry and rewrites the whole file. The lock serializes
    /// concurrent in-process writers; other processes are not excluded.
    pub fn add(&self, message: &str, username: &str) -> Result<Message, StoreError> {
        let _guard = self.write_lock.lock().unwrap();

        let mut messages = self.load()?;
        let next_id = messages.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let entry = Message {
            id: next_id,
            message: message.to_string(),
            username: username.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        messages.push(entry.clone());

        let data = serde_json::to_string(&messages)?;
        fs::write(&self.path, data)?;
        Ok(entry)
    }

    fn load(&self) -> Result<Messages, StoreError> {
        let data = fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound
            } else {
                StoreError::Io(e)
            }
        })?;
        Ok(serde_json::from_str(&data)?)
    }
}
