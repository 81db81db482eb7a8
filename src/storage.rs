use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

/// Key under which the sample history map is persisted
pub const SAMPLES_KEY: &str = "handwriting_samples";
/// Key under which the progress map is persisted
pub const PROGRESS_KEY: &str = "letter_progress";

/// Byte-oriented persistence backend.
///
/// Each store owns one key and writes its whole map under it; the backend
/// never interprets the bytes.
pub trait KeyValueStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn save(&self, key: &str, value: &[u8]) -> Result<()>;
}

impl std::fmt::Debug for dyn KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyValueStore")
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).load(key)
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).save(key, value)
    }
}

/// In-memory backend, used by tests and by embedders that persist elsewhere
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value, bypassing any store logic
    pub fn insert(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.entries.borrow_mut().insert(key.to_string(), value.into());
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        self.insert(key, value);
        Ok(())
    }
}

/// SQLite-backed key-value table
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        Ok(SqliteStore { conn })
    }
}

impl KeyValueStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, chrono::Local::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Memory backend whose saves can be made to fail per key
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingStore {
    inner: MemoryStore,
    failing: RefCell<std::collections::HashSet<String>>,
}

#[cfg(test)]
impl FailingStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_saves_for(&self, key: &str) {
        self.failing.borrow_mut().insert(key.to_string());
    }

    pub(crate) fn allow_all_saves(&self) {
        self.failing.borrow_mut().clear();
    }
}

#[cfg(test)]
impl KeyValueStore for FailingStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.load(key)
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        if self.failing.borrow().contains(key) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
        }
        self.inner.save(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();

        assert_eq!(store.load("missing").unwrap(), None);
        store.save("k", b"value").unwrap();
        assert_eq!(store.load("k").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn test_sqlite_store_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.save(PROGRESS_KEY, b"first").unwrap();
        store.save(PROGRESS_KEY, b"second").unwrap();

        assert_eq!(store.load(PROGRESS_KEY).unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.load(SAMPLES_KEY).unwrap(), None);
    }

    #[test]
    fn test_sqlite_store_persists_across_connections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("letterdrill.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.save(SAMPLES_KEY, b"{}").unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load(SAMPLES_KEY).unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_rc_store_shares_backend() {
        let shared = Rc::new(MemoryStore::new());
        let handle: Rc<dyn KeyValueStore> = shared.clone();

        handle.save("k", b"v").unwrap();
        assert_eq!(shared.load("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_failing_store_only_fails_marked_keys() {
        let store = FailingStore::new();
        store.fail_saves_for(PROGRESS_KEY);

        assert!(store.save(PROGRESS_KEY, b"x").is_err());
        assert_eq!(store.load(PROGRESS_KEY).unwrap(), None);
        store.save(SAMPLES_KEY, b"y").unwrap();
        assert_eq!(store.load(SAMPLES_KEY).unwrap(), Some(b"y".to_vec()));
    }
}
