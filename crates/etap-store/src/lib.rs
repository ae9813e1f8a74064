// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transactional, path-keyed, ordered key-value store.
//!
//! Nodes are addressed by [`DbPath`]s and are either *maps* (namespaces that
//! contain other nodes) or *values* (opaque bytes). Keys are compared bytewise,
//! so the children of a map come back in lexicographic order from
//! [`ReadTx::iter`].
//!
//! All access goes through closure-scoped transactions:
//!
//! ```no_run
//! # use etap_store::{DbPath, Store, StoreError};
//! # fn demo() -> Result<(), StoreError> {
//! let store = Store::open_in_memory()?;
//! let root = DbPath::root("taps");
//! store.write(|tx| {
//!     tx.create_map(&root)?;
//!     tx.create_map(&root.append("t1"))?;
//!     tx.put(&root.append("t1").append("options"), b"{}")
//! })?;
//! let names = store.read(|tx| tx.iter(&root)?.collect::<Result<Vec<_>, _>>())?;
//! assert_eq!(names, vec!["t1".to_string()]);
//! # Ok(())
//! # }
//! ```
//!
//! A write transaction commits only when its closure returns `Ok`; any error
//! rolls the whole transaction back. The underlying SQLite connection is
//! guarded by a mutex held for exactly one transaction at a time.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod path;
mod tx;

pub use path::DbPath;
pub use tx::{KeyIter, ReadTx, WriteTx};

use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// How long a transaction waits for a competing SQLite lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The SQLite layer failed.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Nothing is stored at the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// A node already exists at the path.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A value operation was attempted on a map.
    #[error("{0} is a map")]
    IsAMap(String),

    /// A map operation was attempted on a value.
    #[error("{0} is not a map")]
    NotAMap(String),

    /// The map that should contain the path does not exist.
    #[error("parent map {0} does not exist")]
    ParentMissing(String),

    /// The path cannot be stored.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A previous holder of the connection panicked mid-transaction.
    #[error("store lock poisoned")]
    LockPoisoned,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to an open store. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) a store backed by the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        debug!(target: "etap.store", path = %path.display(), "opened store");
        Self::init(conn)
    }

    /// Open a private, non-persistent store. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key    TEXT PRIMARY KEY NOT NULL,
                is_map INTEGER NOT NULL,
                value  BLOB
            ) WITHOUT ROWID;",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` inside a read transaction.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error, or a [`StoreError`] converted into
    /// `E` if the transaction cannot be opened.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(StoreError::from)?;
        let out = f(&ReadTx::new(&tx))?;
        tx.finish().map_err(StoreError::from)?;
        Ok(out)
    }

    /// Run `f` inside a write transaction, committing iff it returns `Ok`.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error (after rolling back), or a
    /// [`StoreError`] converted into `E` if the transaction cannot be opened
    /// or committed.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&WriteTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        // Dropping an uncommitted transaction rolls it back.
        let out = f(&WriteTx::new(&tx))?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
