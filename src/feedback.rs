//! Almacén de feedback en SQLite: una única tabla con id autoincremental.

use anyhow::Context;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::info;

use crate::models::{utc_timestamp, FeedbackRecord};

/// Máximo de filas devueltas por `GET /feedback`.
pub const FEEDBACK_LIST_LIMIT: usize = 100;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

#[derive(Debug, Error)]
pub enum FeedbackError {
    /// El mensaje está vacío o sólo contiene espacios.
    #[error("Empty message")]
    EmptyMessage,

    #[error("error de almacenamiento: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("lock de la base de datos envenenado")]
    LockPoisoned,
}

#[derive(Clone)]
pub struct FeedbackStore {
    conn: Arc<Mutex<Connection>>,
}

impl FeedbackStore {
    /// Abre (o crea) la base de datos en `path` y asegura el esquema.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("No se pudo crear el directorio {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("No se pudo abrir la base de datos {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self::from_connection(conn).context("Error asegurando el esquema de feedback")?;
        info!("Base de datos de feedback lista en {}", path.display());
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn)?)
    }

    /// Elimina la tabla para que cualquier operación posterior falle.
    #[cfg(test)]
    pub fn break_schema(&self) {
        self.lock().unwrap().execute_batch("DROP TABLE feedback").unwrap();
    }

    fn from_connection(conn: Connection) -> Result<Self, FeedbackError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, FeedbackError> {
        self.conn.lock().map_err(|_| FeedbackError::LockPoisoned)
    }

    /// Valida e inserta un feedback. El mensaje se guarda recortado; un nombre
    /// vacío se guarda como `NULL`.
    pub fn submit(&self, name: Option<&str>, message: &str) -> Result<FeedbackRecord, FeedbackError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(FeedbackError::EmptyMessage);
        }
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let created_at = utc_timestamp();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO feedback (name, message, created_at) VALUES (?1, ?2, ?3)",
            params![name, message, created_at],
        )?;

        Ok(FeedbackRecord {
            id: conn.last_insert_rowid(),
            name: name.map(str::to_string),
            message: message.to_string(),
            created_at,
        })
    }

    /// Los `limit` registros más recientes (como mucho [`FEEDBACK_LIST_LIMIT`]), del más nuevo al más antiguo.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, FeedbackError> {
        let limit = limit.min(FEEDBACK_LIST_LIMIT) as i64;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, message, created_at FROM feedback ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], |row| {
                Ok(FeedbackRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    message: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitted_record_is_listed_with_a_fresh_id() {
        let store = FeedbackStore::open_in_memory().unwrap();
        let first = store.submit(Some("Ana"), "Great bot").unwrap();
        let second = store.submit(None, "  Needs dark mode  ").unwrap();
        assert!(second.id > first.id);
        assert_eq!(second.message, "Needs dark mode");

        let listed = store.list_recent(FEEDBACK_LIST_LIMIT).unwrap();
        assert_eq!(listed, vec![second, first]);
    }

    #[test]
    fn blank_messages_are_rejected_without_insert() {
        let store = FeedbackStore::open_in_memory().unwrap();
        for blank in ["", "   ", "\n\t "] {
            assert!(matches!(
                store.submit(Some("Ana"), blank),
                Err(FeedbackError::EmptyMessage)
            ));
        }
        assert!(store.list_recent(FEEDBACK_LIST_LIMIT).unwrap().is_empty());
    }

    #[test]
    fn blank_name_is_stored_as_null() {
        let store = FeedbackStore::open_in_memory().unwrap();
        store.submit(Some("   "), "hola").unwrap();
        let listed = store.list_recent(1).unwrap();
        assert_eq!(listed[0].name, None);
        assert!(chrono::DateTime::parse_from_rfc3339(&listed[0].created_at).is_ok());
    }

    #[test]
    fn list_is_newest_first_and_capped() {
        let store = FeedbackStore::open_in_memory().unwrap();
        for i in 0..(FEEDBACK_LIST_LIMIT + 5) {
            store.submit(None, &format!("mensaje {i}")).unwrap();
        }

        let listed = store.list_recent(500).unwrap();
        assert_eq!(listed.len(), FEEDBACK_LIST_LIMIT);
        assert_eq!(listed[0].message, format!("mensaje {}", FEEDBACK_LIST_LIMIT + 4));
        assert!(listed.windows(2).all(|w| w[0].id > w[1].id));

        assert_eq!(store.list_recent(3).unwrap().len(), 3);
    }

    #[test]
    fn missing_table_surfaces_storage_errors() {
        let store = FeedbackStore::open_in_memory().unwrap();
        store.break_schema();
        assert!(matches!(store.submit(None, "hola"), Err(FeedbackError::Storage(_))));
        assert!(matches!(store.list_recent(10), Err(FeedbackError::Storage(_))));
    }

    #[test]
    fn reopening_the_file_keeps_rows_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("feedback.db");

        let record = {
            let store = FeedbackStore::open(&path).unwrap();
            store.submit(Some("Ana"), "persistente").unwrap()
        };

        let store = FeedbackStore::open(&path).unwrap();
        let next = store.submit(None, "otro").unwrap();
        assert!(next.id > record.id);
        assert_eq!(store.list_recent(FEEDBACK_LIST_LIMIT).unwrap().len(), 2);
    }
}
