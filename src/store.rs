use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, Row, Rows};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StoreError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL,
    exported INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);";

const SELECT_ALL: &str =
    "SELECT id, first_name, last_name, email, exported, created_at FROM submissions ORDER BY id";

const SELECT_BY_EXPORTED: &str = "SELECT id, first_name, last_name, email, exported, created_at \
     FROM submissions WHERE exported = ?1 ORDER BY id";

/// One persisted form submission
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub exported: bool,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Submission {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            email: row.get(3)?,
            exported: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

/// Handle to the submissions database.
///
/// Every operation opens its own connection, so the handle can be cloned
/// into request handlers and blocking tasks freely. SQLite serialises
/// conflicting writers itself (WAL journal plus a busy timeout).
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Store { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let open_err = |source| StoreError::Open {
            path: self.path.display().to_string(),
            source,
        };
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(open_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(open_err)?;
        Ok(conn)
    }

    /// Opens (or creates) the database file and ensures the table exists.
    /// Safe to call on every start.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;

        // Ping: reading the schema fails fast on a file that is not a database.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|source| StoreError::Open {
                path: self.path.display().to_string(),
                source,
            })?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(StoreError::Schema)?;

        conn.execute_batch(CREATE_TABLE).map_err(StoreError::Schema)?;

        tracing::debug!(path = %self.path.display(), "Submissions table ready");
        Ok(())
    }

    /// Appends a new submission with `exported = 0` and returns its id
    pub fn insert(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO submissions (first_name, last_name, email, exported) \
             VALUES (?1, ?2, ?3, 0)",
            params![first_name, last_name, email],
        )
        .map_err(StoreError::Insert)?;
        Ok(conn.last_insert_rowid())
    }

    /// Runs the export query and hands the live row cursor to `f`.
    ///
    /// Errors returned before `f` is called mean nothing was read; errors
    /// yielded by the cursor happen part-way through the result set.
    pub fn read<T, E, F>(&self, filter: Option<bool>, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(SubmissionRows<'_>) -> Result<T, E>,
    {
        let conn = self.connect()?;
        let (sql, exported) = match filter {
            Some(exported) => (SELECT_BY_EXPORTED, Some(exported)),
            None => (SELECT_ALL, None),
        };
        let mut stmt = conn.prepare(sql).map_err(StoreError::Query)?;
        let rows = match exported {
            Some(exported) => stmt.query(params![exported]),
            None => stmt.query([]),
        }
        .map_err(StoreError::Query)?;

        f(SubmissionRows { rows })
    }

    /// All submissions, or only those whose `exported` flag equals `filter`
    pub fn query(&self, filter: Option<bool>) -> Result<Vec<Submission>, StoreError> {
        self.read(filter, |rows| rows.collect())
    }
}

/// Cursor over a running submissions query
pub struct SubmissionRows<'stmt> {
    rows: Rows<'stmt>,
}

impl Iterator for SubmissionRows<'_> {
    type Item = Result<Submission, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rows.next() {
            Ok(Some(row)) => Some(Submission::from_row(row).map_err(StoreError::Scan)),
            Ok(None) => None,
            Err(e) => Some(Err(StoreError::Scan(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("submissions.db"));
        store.initialize().unwrap();
        (dir, store)
    }

    fn mark_exported(store: &Store, id: i64) {
        let conn = store.connect().unwrap();
        conn.execute("UPDATE submissions SET exported = 1 WHERE id = ?1", params![id])
            .unwrap();
    }

    #[test]
    fn initialize_is_idempotent() {
        let (_dir, store) = temp_store();
        store.insert("Ada", "Lovelace", "ada@example.com").unwrap();
        store.initialize().unwrap();
        assert_eq!(store.query(None).unwrap().len(), 1);
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let (_dir, store) = temp_store();
        let first = store.insert("Ada", "Lovelace", "ada@example.com").unwrap();
        let second = store.insert("Grace", "Hopper", "grace@example.com").unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn new_rows_are_not_exported() {
        let (_dir, store) = temp_store();
        store.insert("Ada", "Lovelace", "ada@example.com").unwrap();

        let rows = store.query(None).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.first_name, "Ada");
        assert_eq!(row.last_name, "Lovelace");
        assert_eq!(row.email, "ada@example.com");
        assert!(!row.exported);
        assert!((Utc::now() - row.created_at).num_minutes().abs() < 5);
    }

    #[test]
    fn query_filters_on_exported_flag() {
        let (_dir, store) = temp_store();
        store.insert("Ada", "Lovelace", "ada@example.com").unwrap();
        let grace = store.insert("Grace", "Hopper", "grace@example.com").unwrap();
        store.insert("Alan", "Turing", "alan@example.com").unwrap();
        mark_exported(&store, grace);

        let pending: Vec<i64> = store.query(Some(false)).unwrap().iter().map(|s| s.id).collect();
        let done: Vec<i64> = store.query(Some(true)).unwrap().iter().map(|s| s.id).collect();
        let all: Vec<i64> = store.query(None).unwrap().iter().map(|s| s.id).collect();

        assert_eq!(pending, vec![1, 3]);
        assert_eq!(done, vec![2]);
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[test]
    fn initialize_fails_on_non_database_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-a-db");
        std::fs::write(&path, "not an sqlite database\n".repeat(512)).unwrap();

        let store = Store::new(&path);
        assert!(store.initialize().is_err());
    }

    #[test]
    fn initialize_fails_when_directory_missing() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("missing").join("data.db"));
        assert!(matches!(store.initialize(), Err(StoreError::Open { .. })));
    }
}
