//! Append-only conversation log.
//!
//! Every recorded turn is written once, keyed by session id and sequence
//! number. The SQLite adapter runs its statements on the blocking pool.

use crate::session::types::Turn;
use async_trait::async_trait;
use concierge_core::{AppConfig, AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Persistence seam for recorded turns.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Append one turn of `session_id`.
    async fn append(&self, session_id: &str, turn: &Turn) -> AppResult<()>;
}

/// Log that drops every turn.
#[derive(Debug, Default, Clone)]
pub struct NoopConversationLog;

#[async_trait]
impl ConversationLog for NoopConversationLog {
    fn name(&self) -> &str {
        "noop"
    }

    async fn append(&self, _session_id: &str, _turn: &Turn) -> AppResult<()> {
        Ok(())
    }
}

/// SQLite-backed conversation log.
#[derive(Clone)]
pub struct SqliteConversationLog {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteConversationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConversationLog")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteConversationLog {
    /// Open (or create) the log database at `path`.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create log directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Storage(format!("Failed to open conversation log: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                query TEXT NOT NULL,
                answer TEXT NOT NULL,
                categories TEXT NOT NULL,
                confidence REAL NOT NULL,
                consultant_needed INTEGER NOT NULL,
                degraded INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (session_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_turns_timestamp ON turns(timestamp);
            "#,
        )
        .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Opened conversation log at {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Turns stored for `session_id`, in sequence order.
    pub async fn turns(&self, session_id: &str) -> AppResult<Vec<Turn>> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_string();

        tokio::task::spawn_blocking(move || -> AppResult<Vec<Turn>> {
            let conn = conn
                .lock()
                .map_err(|_| AppError::Storage("Conversation log lock poisoned".to_string()))?;
            let mut stmt = conn
                .prepare("SELECT payload FROM turns WHERE session_id = ?1 ORDER BY seq")
                .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

            let payloads = stmt
                .query_map(params![session_id], |row| row.get::<_, String>(0))
                .map_err(|e| AppError::Storage(format!("Failed to query turns: {}", e)))?;

            let mut turns = Vec::new();
            for payload in payloads {
                let payload =
                    payload.map_err(|e| AppError::Storage(format!("Failed to read turn: {}", e)))?;
                turns.push(serde_json::from_str(&payload)?);
            }
            Ok(turns)
        })
        .await
        .map_err(|e| AppError::Storage(format!("Conversation log task failed: {}", e)))?
    }
}

#[async_trait]
impl ConversationLog for SqliteConversationLog {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, session_id: &str, turn: &Turn) -> AppResult<()> {
        let payload = serde_json::to_string(turn)?;
        let categories = serde_json::to_string(&turn.classification.categories)?;
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_string();
        let seq = turn.seq as i64;
        let timestamp = turn.timestamp.to_rfc3339();
        let query = turn.query.clone();
        let answer = turn.response.answer.clone();
        let confidence = turn.classification.confidence as f64;
        let consultant_needed = turn.response.consultant_needed;
        let degraded = turn.response.degraded;

        tokio::task::spawn_blocking(move || -> AppResult<()> {
            let conn = conn
                .lock()
                .map_err(|_| AppError::Storage("Conversation log lock poisoned".to_string()))?;
            conn.execute(
                "INSERT INTO turns (session_id, seq, timestamp, query, answer, categories,
                                    confidence, consultant_needed, degraded, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    session_id,
                    seq,
                    timestamp,
                    query,
                    answer,
                    categories,
                    confidence,
                    consultant_needed,
                    degraded,
                    payload,
                ],
            )
            .map_err(|e| AppError::Storage(format!("Failed to insert turn: {}", e)))?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Storage(format!("Conversation log task failed: {}", e)))?
    }
}

/// Create the conversation log named in the configuration.
pub fn create_conversation_log(config: &AppConfig) -> AppResult<Arc<dyn ConversationLog>> {
    let settings = &config.conversation_log;
    if !settings.enabled {
        tracing::debug!("Conversation log disabled");
        return Ok(Arc::new(NoopConversationLog));
    }

    let path = config.resolve_path(&settings.path);
    Ok(Arc::new(SqliteConversationLog::open(&path)?))
}
