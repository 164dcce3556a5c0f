use crate::pipeline::PipelineState;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("stored session state is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Summary row for listing stored sessions.
#[derive(Debug)]
pub struct SessionSummary {
    pub id: String,
    pub stage: String,
    pub updated_at: String,
}

/// SQLite-backed store for pipeline sessions.
///
/// The driving front-end owns exactly one `PipelineState` per session
/// and checks it in here between interactions; nothing in the core
/// pipeline touches this store.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) a session store at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                stage TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at)",
            [],
        )?;

        info!("Session database initialized");
        Ok(Self { conn })
    }

    /// Derive a session id from a caller-provided seed.
    pub fn generate_session_id(seed: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Id for a brand-new session: the participant names plus the wall
    /// clock, so two dinners with the same friends stay distinct.
    pub fn fresh_session_id(names: &[&str]) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self::generate_session_id(&format!("{nanos}|{}", names.join(",")))
    }

    /// Insert or update a session's serialized state.
    pub fn save(&self, id: &str, state: &PipelineState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        self.conn.execute(
            "INSERT INTO sessions (id, stage, state)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                stage = excluded.stage,
                state = excluded.state,
                updated_at = CURRENT_TIMESTAMP",
            params![id, state.stage().as_str(), json],
        )?;
        info!(session = %id, stage = %state.stage().as_str(), "Session stored");
        Ok(())
    }

    /// Restore a session's state by id.
    pub fn load(&self, id: &str) -> Result<Option<PipelineState>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// All stored sessions, most recently touched first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, stage, updated_at FROM sessions ORDER BY updated_at DESC, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionSummary {
                id: row.get(0)?,
                stage: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_generation_is_deterministic() {
        let id1 = SessionStore::generate_session_id("dinner-2026-02-14");
        let id2 = SessionStore::generate_session_id("dinner-2026-02-14");
        let id3 = SessionStore::generate_session_id("lunch-2026-02-15");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn save_and_load_round_trips_state() {
        let store = SessionStore::new(":memory:").unwrap();
        let mut state = PipelineState::new();
        state.add_participant("Alice").unwrap();
        state.add_participant("Bob").unwrap();

        store.save("abc", &state).unwrap();
        let restored = store.load("abc").unwrap().unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn save_overwrites_in_place() {
        let store = SessionStore::new(":memory:").unwrap();
        let mut state = PipelineState::new();
        state.add_participant("Alice").unwrap();
        store.save("abc", &state).unwrap();

        state.add_participant("Bob").unwrap();
        store.save("abc", &state).unwrap();

        let restored = store.load("abc").unwrap().unwrap();
        assert_eq!(restored, state);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn load_of_unknown_session_is_none() {
        let store = SessionStore::new(":memory:").unwrap();
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn list_reports_stage() {
        let store = SessionStore::new(":memory:").unwrap();
        let state = PipelineState::new();
        store.save("abc", &state).unwrap();

        let sessions = store.list().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "abc");
        assert_eq!(sessions[0].stage, "collecting-participants");
    }
}
