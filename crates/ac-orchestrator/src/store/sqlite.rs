//! SQLite-backed store

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use ac_core::error::StoreError;
use ac_core::traits::Store;
use ac_core::types::{
    EndpointBinding, EndpointKind, Message, NewMessage, Session, SessionId, SessionStatus,
};

/// Tables are created idempotently on every open
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    task TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'Created',
    workspace TEXT NOT NULL DEFAULT '',
    branch TEXT,
    auto_approve INTEGER NOT NULL DEFAULT 0,
    skip_completion INTEGER NOT NULL DEFAULT 0,
    artifact TEXT,
    backend TEXT NOT NULL DEFAULT 'copilot',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    endpoint TEXT NOT NULL,
    sender TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    kind TEXT NOT NULL DEFAULT 'Message',
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session
    ON messages(session_id, id);

CREATE TABLE IF NOT EXISTS endpoint_bindings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    endpoint TEXT NOT NULL,
    system_instruction TEXT,
    last_status_at INTEGER,
    added_at INTEGER NOT NULL,
    UNIQUE(session_id, endpoint)
);
";

const SESSION_COLUMNS: &str = "id, task, status, workspace, branch, auto_approve, \
     skip_completion, artifact, backend, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, session_id, endpoint, sender, content, kind, timestamp";

const BINDING_COLUMNS: &str = "session_id, endpoint, system_instruction, last_status_at, added_at";

/// Store over a single SQLite connection.
///
/// Calls run on the blocking pool. The connection is shared behind a mutex,
/// so writes are applied in the order they are submitted.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and its schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path).map_err(db)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .map_err(db)?;
        tracing::debug!("Opened database {}", path.display());
        Self::with_schema(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_schema(Connection::open_in_memory().map_err(db)?)
    }

    fn with_schema(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db)?;
        conn.execute_batch(SCHEMA).map_err(db)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Database("connection lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn db(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Read a text column through `FromStr`
fn parsed<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn millis(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: SessionId::new(row.get::<_, String>(0)?),
        task: row.get(1)?,
        status: parsed(row, 2)?,
        workspace: row.get(3)?,
        branch: row.get(4)?,
        auto_approve: row.get(5)?,
        skip_completion: row.get(6)?,
        artifact: row.get(7)?,
        backend: parsed(row, 8)?,
        created_at: millis(row, 9)?,
        updated_at: millis(row, 10)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get::<_, i64>(0)? as u64,
        session_id: SessionId::new(row.get::<_, String>(1)?),
        endpoint: parsed(row, 2)?,
        sender: row.get(3)?,
        content: row.get(4)?,
        kind: parsed(row, 5)?,
        timestamp: millis(row, 6)?,
    })
}

fn binding_from_row(row: &Row<'_>) -> rusqlite::Result<EndpointBinding> {
    Ok(EndpointBinding {
        session_id: SessionId::new(row.get::<_, String>(0)?),
        endpoint: parsed(row, 1)?,
        system_instruction: row.get(2)?,
        last_status_at: row.get::<_, Option<i64>>(3)?.map(|at| at as u64),
        added_at: millis(row, 4)?,
    })
}

/// Decode failures mean the row is unreadable, not that the database is
fn decode(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::FromSqlConversionFailure(..) => StoreError::Corrupt(e.to_string()),
        other => db(other),
    }
}

fn session_exists(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    conn.query_row("SELECT 1 FROM sessions WHERE id = ?1", [id], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(db)
}

/// Run an UPDATE on one session row, failing if the row does not exist
fn update_session(
    conn: &Connection,
    id: SessionId,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<(), StoreError> {
    let changed = conn.execute(sql, params).map_err(db)?;
    if changed == 0 {
        return Err(StoreError::SessionNotFound(id));
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let session = session.clone();
        self.call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO sessions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    SESSION_COLUMNS
                ),
                params![
                    session.id.as_str(),
                    session.task,
                    session.status.as_str(),
                    session.workspace,
                    session.branch,
                    session.auto_approve,
                    session.skip_completion,
                    session.artifact,
                    session.backend.as_str(),
                    session.created_at as i64,
                    session.updated_at as i64,
                ],
            )
            .map_err(db)?;
            Ok(())
        })
        .await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let id = id.clone();
        self.call(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
                [id.as_str()],
                session_from_row,
            )
            .optional()
            .map_err(decode)
        })
        .await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM sessions ORDER BY created_at DESC, rowid DESC",
                    SESSION_COLUMNS
                ))
                .map_err(db)?;
            let rows = stmt.query_map([], session_from_row).map_err(db)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(decode)
        })
        .await
    }

    async fn update_session_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        at: u64,
    ) -> Result<(), StoreError> {
        let id = id.clone();
        self.call(move |conn| {
            let key = id.0.clone();
            update_session(
                conn,
                id,
                "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), at as i64, key],
            )
        })
        .await
    }

    async fn update_session_artifact(
        &self,
        id: &SessionId,
        artifact: &str,
        at: u64,
    ) -> Result<(), StoreError> {
        let id = id.clone();
        let artifact = artifact.to_string();
        self.call(move |conn| {
            let key = id.0.clone();
            update_session(
                conn,
                id,
                "UPDATE sessions SET artifact = ?1, updated_at = ?2 WHERE id = ?3",
                params![artifact, at as i64, key],
            )
        })
        .await
    }

    async fn touch_session(&self, id: &SessionId, at: u64) -> Result<(), StoreError> {
        let id = id.clone();
        self.call(move |conn| {
            let key = id.0.clone();
            update_session(
                conn,
                id,
                "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                params![at as i64, key],
            )
        })
        .await
    }

    async fn insert_message(&self, message: NewMessage, at: u64) -> Result<Message, StoreError> {
        self.call(move |conn| {
            if !session_exists(conn, message.session_id.as_str())? {
                return Err(StoreError::SessionNotFound(message.session_id));
            }
            conn.execute(
                "INSERT INTO messages (session_id, endpoint, sender, content, kind, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.session_id.as_str(),
                    message.endpoint.as_str(),
                    message.sender,
                    message.content,
                    message.kind.as_str(),
                    at as i64,
                ],
            )
            .map_err(db)?;

            Ok(Message {
                id: conn.last_insert_rowid() as u64,
                session_id: message.session_id,
                endpoint: message.endpoint,
                sender: message.sender,
                content: message.content,
                kind: message.kind,
                timestamp: at,
            })
        })
        .await
    }

    async fn list_messages(
        &self,
        id: &SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let id = id.clone();
        // A negative LIMIT means no limit
        let limit = limit.map_or(-1, |limit| limit as i64);
        self.call(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {cols} FROM (SELECT {cols} FROM messages WHERE session_id = ?1 \
                     ORDER BY id DESC LIMIT ?2) ORDER BY id ASC",
                    cols = MESSAGE_COLUMNS
                ))
                .map_err(db)?;
            let rows = stmt
                .query_map(params![id.as_str(), limit], message_from_row)
                .map_err(db)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(decode)
        })
        .await
    }

    async fn messages_since(&self, id: &SessionId, since: u64) -> Result<Vec<Message>, StoreError> {
        let id = id.clone();
        self.call(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM messages WHERE session_id = ?1 AND timestamp > ?2 \
                     ORDER BY id ASC",
                    MESSAGE_COLUMNS
                ))
                .map_err(db)?;
            let rows = stmt
                .query_map(params![id.as_str(), since as i64], message_from_row)
                .map_err(db)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(decode)
        })
        .await
    }

    async fn insert_binding(&self, binding: &EndpointBinding) -> Result<(), StoreError> {
        let binding = binding.clone();
        self.call(move |conn| {
            if !session_exists(conn, binding.session_id.as_str())? {
                return Err(StoreError::SessionNotFound(binding.session_id));
            }
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO endpoint_bindings ({}) VALUES (?1, ?2, ?3, ?4, ?5)",
                    BINDING_COLUMNS
                ),
                params![
                    binding.session_id.as_str(),
                    binding.endpoint.as_str(),
                    binding.system_instruction,
                    binding.last_status_at.map(|at| at as i64),
                    binding.added_at as i64,
                ],
            )
            .map_err(db)?;
            Ok(())
        })
        .await
    }

    async fn list_bindings(&self, id: &SessionId) -> Result<Vec<EndpointBinding>, StoreError> {
        let id = id.clone();
        self.call(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM endpoint_bindings WHERE session_id = ?1 ORDER BY id ASC",
                    BINDING_COLUMNS
                ))
                .map_err(db)?;
            let rows = stmt
                .query_map([id.as_str()], binding_from_row)
                .map_err(db)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(decode)
        })
        .await
    }

    async fn get_binding(
        &self,
        id: &SessionId,
        endpoint: EndpointKind,
    ) -> Result<Option<EndpointBinding>, StoreError> {
        let id = id.clone();
        self.call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM endpoint_bindings WHERE session_id = ?1 AND endpoint = ?2",
                    BINDING_COLUMNS
                ),
                params![id.as_str(), endpoint.as_str()],
                binding_from_row,
            )
            .optional()
            .map_err(decode)
        })
        .await
    }

    async fn mark_status_requested(
        &self,
        id: &SessionId,
        endpoint: EndpointKind,
        at: u64,
    ) -> Result<(), StoreError> {
        let id = id.clone();
        self.call(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE endpoint_bindings SET last_status_at = ?1 \
                     WHERE session_id = ?2 AND endpoint = ?3",
                    params![at as i64, id.as_str(), endpoint.as_str()],
                )
                .map_err(db)?;
            if changed == 0 {
                return Err(StoreError::BindingNotFound {
                    session_id: id,
                    endpoint,
                });
            }
            Ok(())
        })
        .await
    }
}
