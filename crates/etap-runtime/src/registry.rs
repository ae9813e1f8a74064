// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistent layout of taps inside the store.
//!
//! ```text
//! taps/                 map, ordered by id
//!   <id>/               map, one per tap
//!     options           JSON-encoded TapOptions
//!     last_id           checkpoint, raw UTF-8 (absent until first advance)
//!     status            advisory status, raw UTF-8
//! ```

use etap_core::{TapDetails, TapListEntry, TapListPage, TapOptions};
use etap_store::{DbPath, ReadTx, Store, StoreError};
use tracing::debug;

const ROOT: &str = "taps";
const OPTIONS: &str = "options";
const LAST_ID: &str = "last_id";
const STATUS: &str = "status";

/// Errors raised by [`TapRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No tap with this id is registered.
    #[error("tap {0} not found")]
    NotFound(String),

    /// A persisted value could not be decoded.
    #[error("tap {id}: corrupt {field}: {reason}")]
    Corrupt {
        /// Tap id.
        id: String,
        /// Sub-key that failed to decode.
        field: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// A definition could not be encoded.
    #[error("encode tap definition: {0}")]
    Encode(#[from] serde_json::Error),

    /// The blocking task running a store call panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),
}

/// Run a registry call on tokio's blocking pool.
///
/// Store transactions take a mutex and fsync on commit; they never run on
/// an async worker thread.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, RegistryError>
where
    F: FnOnce() -> Result<T, RegistryError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RegistryError::Task(e.to_string()))?
}

/// Per-tap state the runner reads and writes while looping.
///
/// [`TapRegistry`] is the production implementation; tests substitute
/// wrappers that inject failures.
pub trait TapStore: Send + Sync {
    /// Load the immutable definition of `id`.
    fn definition(&self, id: &str) -> Result<TapOptions, RegistryError>;

    /// Current checkpoint of `id`; empty when it has never advanced.
    fn checkpoint(&self, id: &str) -> Result<String, RegistryError>;

    /// Persist a new checkpoint for `id`.
    fn set_checkpoint(&self, id: &str, cursor: &str) -> Result<(), RegistryError>;

    /// Overwrite the advisory status of `id`.
    fn set_status(&self, id: &str, status: &str) -> Result<(), RegistryError>;
}

/// Tap registry rooted at `taps` in a [`Store`].
#[derive(Debug, Clone)]
pub struct TapRegistry {
    store: Store,
    root: DbPath,
}

impl TapRegistry {
    /// Wrap `store`. Call [`init`](Self::init) before use.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            root: DbPath::root(ROOT),
        }
    }

    /// Create the root map if it does not exist yet. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn init(&self) -> Result<(), RegistryError> {
        self.store.write(|tx| {
            if !tx.exists(&self.root)? {
                tx.create_map(&self.root)?;
                debug!(target: "etap.registry", "created root map");
            }
            Ok(())
        })
    }

    fn tap(&self, id: &str) -> DbPath {
        self.root.append(id)
    }

    /// Persist a new tap: its sub-map and definition, in one transaction.
    ///
    /// # Errors
    ///
    /// Fails if the id is already taken or the store cannot be written.
    pub fn create(&self, id: &str, options: &TapOptions) -> Result<(), RegistryError> {
        let encoded = serde_json::to_vec(options)?;
        let tap = self.tap(id);
        self.store.write(|tx| {
            tx.create_map(&tap)?;
            tx.put(&tap.append(OPTIONS), &encoded)?;
            Ok(())
        })
    }

    /// Remove a tap and everything below it. Returns `false` if it did not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn delete(&self, id: &str) -> Result<bool, RegistryError> {
        let tap = self.tap(id);
        self.store.write(|tx| {
            if !tx.exists(&tap)? {
                return Ok(false);
            }
            tx.delete(&tap)?;
            Ok(true)
        })
    }

    /// `true` if a tap with this id is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn contains(&self, id: &str) -> Result<bool, RegistryError> {
        let tap = self.tap(id);
        self.store.read(|tx| Ok(tx.exists(&tap)?))
    }

    /// Advisory status of `id`, if one was recorded.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] for an unknown id.
    pub fn status(&self, id: &str) -> Result<Option<String>, RegistryError> {
        self.store.read(|tx| {
            self.require(tx, id)?;
            self.text(tx, id, STATUS)
        })
    }

    /// All tap ids in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn tap_ids(&self) -> Result<Vec<String>, RegistryError> {
        self.store.read(|tx| {
            tx.iter(&self.root)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(RegistryError::from)
        })
    }

    /// Number of registered taps.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn len(&self) -> Result<usize, RegistryError> {
        self.store.read(|tx| Ok(tx.size(&self.root)?))
    }

    /// One page of the listing, starting strictly after `cursor`.
    ///
    /// The returned cursor is the last id on the page when more ids follow,
    /// and absent once the listing is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a definition is
    /// corrupt.
    pub fn list_page(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<TapListPage, RegistryError> {
        self.store.read(|tx| {
            let mut ids = tx.iter(&self.root)?;
            let cursor = cursor.filter(|c| !c.is_empty());
            if let Some(cursor) = cursor {
                ids.seek(cursor);
            }
            let mut ids = ids.peekable();
            let at_cursor =
                matches!((cursor, ids.peek()), (Some(c), Some(Ok(first))) if first == c);
            if at_cursor {
                ids.next();
            }

            let mut entries = Vec::with_capacity(limit.min(128));
            while entries.len() < limit {
                let Some(id) = ids.next() else { break };
                let id = id?;
                let options = self.decode_options(tx, &id)?;
                entries.push(TapListEntry::from((id.as_str(), &options)));
            }

            let more = match ids.next() {
                Some(next) => {
                    next?;
                    true
                }
                None => false,
            };
            let cursor = if more {
                entries.last().map(|e| e.id.clone())
            } else {
                None
            };
            Ok(TapListPage { entries, cursor })
        })
    }

    /// Persisted view of a tap, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a value is corrupt.
    pub fn details(&self, id: &str) -> Result<Option<TapDetails>, RegistryError> {
        self.store.read(|tx| {
            if !tx.exists(&self.tap(id))? {
                return Ok(None);
            }
            let options = self.decode_options(tx, id)?;
            let mut details = TapDetails::from_options(id, &options);
            details.checkpoint = self.text(tx, id, LAST_ID)?;
            details.status = self.text(tx, id, STATUS)?;
            Ok(Some(details))
        })
    }

    fn require(&self, tx: &ReadTx<'_>, id: &str) -> Result<(), RegistryError> {
        if tx.exists(&self.tap(id))? {
            Ok(())
        } else {
            Err(RegistryError::NotFound(id.to_string()))
        }
    }

    fn decode_options(&self, tx: &ReadTx<'_>, id: &str) -> Result<TapOptions, RegistryError> {
        let raw = tx
            .get(&self.tap(id).append(OPTIONS))?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| RegistryError::Corrupt {
            id: id.to_string(),
            field: OPTIONS,
            reason: e.to_string(),
        })
    }

    fn text(
        &self,
        tx: &ReadTx<'_>,
        id: &str,
        field: &'static str,
    ) -> Result<Option<String>, RegistryError> {
        match tx.get(&self.tap(id).append(field))? {
            None => Ok(None),
            Some(raw) => String::from_utf8(raw)
                .map(Some)
                .map_err(|e| RegistryError::Corrupt {
                    id: id.to_string(),
                    field,
                    reason: e.to_string(),
                }),
        }
    }

    fn put_text(&self, id: &str, field: &'static str, value: &str) -> Result<(), RegistryError> {
        let tap = self.tap(id);
        self.store.write(|tx| {
            // A runner outliving a delete must not resurrect the subtree.
            if !tx.exists(&tap)? {
                return Err(RegistryError::NotFound(id.to_string()));
            }
            tx.put(&tap.append(field), value.as_bytes())?;
            Ok(())
        })
    }
}

impl TapStore for TapRegistry {
    fn definition(&self, id: &str) -> Result<TapOptions, RegistryError> {
        self.store.read(|tx| {
            self.require(tx, id)?;
            self.decode_options(tx, id)
        })
    }

    fn checkpoint(&self, id: &str) -> Result<String, RegistryError> {
        self.store.read(|tx| {
            self.require(tx, id)?;
            Ok(self.text(tx, id, LAST_ID)?.unwrap_or_default())
        })
    }

    fn set_checkpoint(&self, id: &str, cursor: &str) -> Result<(), RegistryError> {
        self.put_text(id, LAST_ID, cursor)
    }

    fn set_status(&self, id: &str, status: &str) -> Result<(), RegistryError> {
        self.put_text(id, STATUS, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TapRegistry {
        let reg = TapRegistry::new(Store::open_in_memory().unwrap());
        reg.init().unwrap();
        reg
    }

    fn options(name: &str) -> TapOptions {
        TapOptions {
            name: name.into(),
            code: "function mapEvents(b) { return b; }".into(),
            webhook_url: "http://localhost:1/hook".into(),
            batch_limit: 10,
        }
    }

    #[test]
    fn init_is_idempotent() {
        let reg = registry();
        reg.init().unwrap();
        assert_eq!(reg.len().unwrap(), 0);
    }

    #[test]
    fn create_then_read_back() {
        let reg = registry();
        reg.create("a", &options("one")).unwrap();
        assert_eq!(reg.definition("a").unwrap(), options("one"));
        assert_eq!(reg.checkpoint("a").unwrap(), "");
        assert!(reg.status("a").unwrap().is_none());
    }

    #[test]
    fn duplicate_create_fails() {
        let reg = registry();
        reg.create("a", &options("one")).unwrap();
        let err = reg.create("a", &options("two")).unwrap_err();
        assert!(matches!(err, RegistryError::Store(StoreError::AlreadyExists(_))));
        assert_eq!(reg.definition("a").unwrap().name, "one");
    }

    #[test]
    fn checkpoint_and_status_round_trip() {
        let reg = registry();
        reg.create("a", &options("one")).unwrap();
        reg.set_checkpoint("a", "42").unwrap();
        reg.set_status("a", "ok").unwrap();
        assert_eq!(reg.checkpoint("a").unwrap(), "42");
        let d = reg.details("a").unwrap().unwrap();
        assert_eq!(d.checkpoint.as_deref(), Some("42"));
        assert_eq!(d.status.as_deref(), Some("ok"));
    }

    #[test]
    fn delete_reports_presence() {
        let reg = registry();
        reg.create("a", &options("one")).unwrap();
        assert!(reg.delete("a").unwrap());
        assert!(!reg.delete("a").unwrap());
        assert!(reg.details("a").unwrap().is_none());
    }

    #[test]
    fn writes_after_delete_do_not_resurrect() {
        let reg = registry();
        reg.create("a", &options("one")).unwrap();
        reg.delete("a").unwrap();
        assert!(matches!(
            reg.set_checkpoint("a", "1"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(reg.set_status("a", "x"), Err(RegistryError::NotFound(_))));
        assert!(!reg.contains("a").unwrap());
    }

    #[test]
    fn unknown_definition_is_not_found() {
        let reg = registry();
        assert!(matches!(reg.definition("nope"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn corrupt_options_are_reported() {
        let store = Store::open_in_memory().unwrap();
        let reg = TapRegistry::new(store.clone());
        reg.init().unwrap();
        let tap = DbPath::root(ROOT).append("bad");
        store
            .write(|tx| {
                tx.create_map(&tap)?;
                tx.put(&tap.append(OPTIONS), b"not json")
            })
            .unwrap();
        let err = reg.definition("bad").unwrap_err();
        assert!(matches!(err, RegistryError::Corrupt { field: OPTIONS, .. }), "{err}");
    }

    #[test]
    fn list_page_skips_the_cursor() {
        let reg = registry();
        for id in ["a", "b", "c", "d"] {
            reg.create(id, &options(id)).unwrap();
        }
        let first = reg.list_page(None, 2).unwrap();
        let ids: Vec<_> = first.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(first.cursor.as_deref(), Some("b"));

        let second = reg.list_page(first.cursor.as_deref(), 2).unwrap();
        let ids: Vec<_> = second.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["c", "d"]);
        assert!(second.is_last());
    }

    #[test]
    fn list_resumes_after_deleted_cursor() {
        let reg = registry();
        for id in ["a", "b", "c"] {
            reg.create(id, &options(id)).unwrap();
        }
        reg.delete("b").unwrap();
        let page = reg.list_page(Some("b"), 10).unwrap();
        let ids: Vec<_> = page.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["c"]);
    }

    #[test]
    fn empty_cursor_starts_from_the_beginning() {
        let reg = registry();
        reg.create("a", &options("a")).unwrap();
        let page = reg.list_page(Some(""), 10).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert!(page.is_last());
    }

    #[test]
    fn list_entries_carry_name_and_url() {
        let reg = registry();
        reg.create("a", &options("first")).unwrap();
        let page = reg.list_page(None, 10).unwrap();
        assert_eq!(page.entries[0].name, "first");
        assert_eq!(page.entries[0].webhook_url, "http://localhost:1/hook");
    }
}
