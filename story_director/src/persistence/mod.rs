//! Persistence - the append-only session log and the memory snapshot.
//!
//! Two sinks with different guarantees. The session log is a human-readable
//! record that only ever grows; the snapshot is a single JSON object
//! rewritten after every turn and replaced atomically, so an external
//! reader (the AI co-narrator included) never observes a torn write.
//! Both are best-effort relative to the in-memory state: a failed write is
//! reported, never rolled back.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use story_graph::{PlayerState, SceneId};

use crate::history::TurnRecord;

/// Unique identifier tying a session's log and snapshot together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a nil/empty session ID (useful for defaults).
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to create session log `{path}`: {source}")]
    LogCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to append to session log `{path}`: {source}")]
    LogAppend {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write snapshot `{path}`: {source}")]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read snapshot `{path}`: {source}")]
    SnapshotRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    SnapshotEncode(#[from] serde_json::Error),
}

/// Append-only human-readable session log.
///
/// One file per session, named by creation time; records are flushed and
/// synced per append and never rewritten.
#[derive(Debug)]
pub struct NarrativeLogger {
    path: PathBuf,
}

impl NarrativeLogger {
    /// Create the session file under `log_dir` (created as needed) and
    /// write a header naming the session.
    pub fn create(log_dir: impl AsRef<Path>, session: SessionId) -> Result<Self, PersistenceError> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir).map_err(|source| PersistenceError::LogCreate {
            path: log_dir.to_path_buf(),
            source,
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = log_dir.join(format!("session_{stamp}.log"));
        let logger = Self { path };
        logger.write_line(&format!("=== session {session} ==="), true)?;
        Ok(logger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one turn record: the player's action and the narrative shown.
    pub fn append_turn(&self, action: &str, narrative: &str) -> Result<(), PersistenceError> {
        let narrative = narrative.trim().replace('\n', " ");
        self.write_line(&format!("Player: {action} -> System: {narrative}"), false)
    }

    /// Append a session marker (start, reset).
    pub fn append_note(&self, note: &str) -> Result<(), PersistenceError> {
        self.write_line(&format!("--- {note} ---"), false)
    }

    fn write_line(&self, line: &str, create: bool) -> Result<(), PersistenceError> {
        let map_err = |source| {
            if create {
                PersistenceError::LogCreate {
                    path: self.path.clone(),
                    source,
                }
            } else {
                PersistenceError::LogAppend {
                    path: self.path.clone(),
                    source,
                }
            }
        };

        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(map_err)?;
        file.write_all(format!("[{stamp}] {line}\n").as_bytes())
            .map_err(map_err)?;
        file.sync_all().map_err(map_err)
    }
}

/// What the player can see from where they stand - the snapshot's
/// compressed scene context for the co-narrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surroundings {
    pub narrative: String,
    pub options: Vec<String>,
}

/// The machine-readable state summary rewritten after every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub session: SessionId,
    pub saved_at: DateTime<Utc>,
    pub player_state: PlayerState,
    pub current_location: SceneId,
    pub mode: String,
    pub surroundings: Surroundings,
    pub recent_history: Vec<TurnRecord>,
}

/// Rewrites the snapshot file atomically each turn.
#[derive(Debug)]
pub struct MemoryManager {
    path: PathBuf,
}

impl MemoryManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and replace the snapshot. The content lands in a sibling
    /// temp file first and is renamed over the target, so a concurrent
    /// reader sees either the old snapshot or the new one, never a mix.
    pub fn write(&self, snapshot: &MemorySnapshot) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_string_pretty(snapshot)?;

        let io_err = |source| PersistenceError::SnapshotWrite {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, encoded).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }

    /// Read the current snapshot back, for session resumption or external
    /// consumers.
    pub fn read(&self) -> Result<MemorySnapshot, PersistenceError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| PersistenceError::SnapshotRead {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// A session's two persistence sinks plus its identity.
#[derive(Debug)]
pub struct SessionPersistence {
    session: SessionId,
    logger: NarrativeLogger,
    memory: MemoryManager,
}

impl SessionPersistence {
    /// Open both sinks at the locations named by the engine config.
    pub fn from_config(config: &crate::config::DirectorConfig) -> Result<Self, PersistenceError> {
        Self::open(&config.log_dir, config.snapshot_path.clone())
    }

    /// Open both sinks for a fresh session.
    pub fn open(
        log_dir: impl AsRef<Path>,
        snapshot_path: impl Into<PathBuf>,
    ) -> Result<Self, PersistenceError> {
        let session = SessionId::new();
        let logger = NarrativeLogger::create(log_dir, session)?;
        Ok(Self {
            session,
            logger,
            memory: MemoryManager::new(snapshot_path),
        })
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn log_path(&self) -> &Path {
        self.logger.path()
    }

    pub fn snapshot_path(&self) -> &Path {
        self.memory.path()
    }

    pub fn log_turn(&self, action: &str, narrative: &str) -> Result<(), PersistenceError> {
        self.logger.append_turn(action, narrative)
    }

    pub fn log_note(&self, note: &str) -> Result<(), PersistenceError> {
        self.logger.append_note(note)
    }

    pub fn write_snapshot(&self, snapshot: &MemorySnapshot) -> Result<(), PersistenceError> {
        self.memory.write(snapshot)
    }

    pub fn read_snapshot(&self) -> Result<MemorySnapshot, PersistenceError> {
        self.memory.read()
    }
}
