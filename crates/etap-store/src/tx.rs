// SPDX-License-Identifier: MIT OR Apache-2.0
//! Read and write transactions.

use crate::{DbPath, StoreError};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::VecDeque;
use std::ops::Deref;

/// Number of child keys fetched per round trip by [`KeyIter`].
const ITER_CHUNK: usize = 64;

/// A read transaction. Obtained from [`Store::read`](crate::Store::read).
pub struct ReadTx<'t> {
    conn: &'t Connection,
}

impl<'t> ReadTx<'t> {
    pub(crate) fn new(conn: &'t Connection) -> Self {
        Self { conn }
    }

    /// `true` if a node (map or value) exists at `path`.
    pub fn exists(&self, path: &DbPath) -> Result<bool, StoreError> {
        Ok(self.node(path)?.is_some())
    }

    /// `true` if `path` exists and is a map.
    pub fn is_map(&self, path: &DbPath) -> Result<bool, StoreError> {
        Ok(matches!(self.node(path)?, Some(Node::Map)))
    }

    /// The value stored at `path`, or `None` if nothing is stored there.
    ///
    /// # Errors
    ///
    /// [`StoreError::IsAMap`] if `path` is a map.
    pub fn get(&self, path: &DbPath) -> Result<Option<Vec<u8>>, StoreError> {
        match self.node(path)? {
            None => Ok(None),
            Some(Node::Map) => Err(StoreError::IsAMap(path.to_string())),
            Some(Node::Value(v)) => Ok(Some(v)),
        }
    }

    /// Number of direct children of the map at `path`.
    pub fn size(&self, path: &DbPath) -> Result<usize, StoreError> {
        self.require_map(path)?;
        let (lo, hi) = path.child_range()?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM kv
             WHERE key >= ?1 AND key < ?2 AND instr(substr(key, ?3), '/') = 0",
            params![lo, hi, lo.len() as i64 + 1],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Ordered iterator over the names of the direct children of the map at
    /// `path`.
    pub fn iter(&self, path: &DbPath) -> Result<KeyIter<'t>, StoreError> {
        self.require_map(path)?;
        let (prefix, upper) = path.child_range()?;
        Ok(KeyIter {
            conn: self.conn,
            prefix,
            upper,
            lower: Bound::From(String::new()),
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    fn require_map(&self, path: &DbPath) -> Result<(), StoreError> {
        match self.node(path)? {
            Some(Node::Map) => Ok(()),
            Some(Node::Value(_)) => Err(StoreError::NotAMap(path.to_string())),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }

    fn node(&self, path: &DbPath) -> Result<Option<Node>, StoreError> {
        let key = path.key()?;
        let row = self
            .conn
            .query_row(
                "SELECT is_map, value FROM kv WHERE key = ?1",
                params![key],
                |row| {
                    let is_map: bool = row.get(0)?;
                    let value: Option<Vec<u8>> = row.get(1)?;
                    Ok((is_map, value))
                },
            )
            .optional()?;
        Ok(row.map(|(is_map, value)| {
            if is_map {
                Node::Map
            } else {
                Node::Value(value.unwrap_or_default())
            }
        }))
    }
}

enum Node {
    Map,
    Value(Vec<u8>),
}

/// A write transaction. Obtained from [`Store::write`](crate::Store::write).
///
/// Dereferences to [`ReadTx`] so reads observe the transaction's own writes.
pub struct WriteTx<'t> {
    read: ReadTx<'t>,
}

impl<'t> WriteTx<'t> {
    pub(crate) fn new(conn: &'t Connection) -> Self {
        Self {
            read: ReadTx::new(conn),
        }
    }

    /// Create an empty map at `path`.
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyExists`] if something is already stored at
    /// `path`; [`StoreError::ParentMissing`] if the enclosing map is absent.
    pub fn create_map(&self, path: &DbPath) -> Result<(), StoreError> {
        let key = path.key()?;
        self.require_parent(path)?;
        if self.exists(path)? {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        self.read.conn.execute(
            "INSERT INTO kv (key, is_map, value) VALUES (?1, 1, NULL)",
            params![key],
        )?;
        Ok(())
    }

    /// Store `value` at `path`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`StoreError::IsAMap`] if `path` is a map; [`StoreError::ParentMissing`]
    /// if the enclosing map is absent.
    pub fn put(&self, path: &DbPath, value: &[u8]) -> Result<(), StoreError> {
        let key = path.key()?;
        self.require_parent(path)?;
        if self.is_map(path)? {
            return Err(StoreError::IsAMap(path.to_string()));
        }
        self.read.conn.execute(
            "INSERT INTO kv (key, is_map, value) VALUES (?1, 0, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove the node at `path` together with everything below it.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if nothing is stored at `path`.
    pub fn delete(&self, path: &DbPath) -> Result<(), StoreError> {
        let key = path.key()?;
        if !self.exists(path)? {
            return Err(StoreError::NotFound(path.to_string()));
        }
        let (lo, hi) = path.child_range()?;
        let removed = self.read.conn.execute(
            "DELETE FROM kv WHERE key = ?1 OR (key >= ?2 AND key < ?3)",
            params![key, lo, hi],
        )?;
        tracing::trace!(target: "etap.store", path = %path, removed, "deleted subtree");
        Ok(())
    }

    fn require_parent(&self, path: &DbPath) -> Result<(), StoreError> {
        match path.parent() {
            None => Ok(()),
            Some(parent) => {
                if self.is_map(&parent)? {
                    Ok(())
                } else {
                    Err(StoreError::ParentMissing(parent.to_string()))
                }
            }
        }
    }
}

impl<'t> Deref for WriteTx<'t> {
    type Target = ReadTx<'t>;

    fn deref(&self) -> &Self::Target {
        &self.read
    }
}

enum Bound {
    /// Next chunk starts at this child name (inclusive).
    From(String),
    /// Next chunk starts strictly after this full key.
    After(String),
}

/// Lazily-fetching ordered iterator over the child names of a map.
///
/// Child names are yielded in bytewise order. [`seek`](Self::seek)
/// repositions the iterator at the first child whose name is `>=` the given
/// key.
pub struct KeyIter<'t> {
    conn: &'t Connection,
    prefix: String,
    upper: String,
    lower: Bound,
    buffer: VecDeque<String>,
    exhausted: bool,
}

impl KeyIter<'_> {
    /// Position the iterator at the first child `>= name`.
    pub fn seek(&mut self, name: &str) {
        self.lower = Bound::From(name.to_string());
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fetch(&mut self) -> Result<(), StoreError> {
        let (sql, lower) = match &self.lower {
            Bound::From(name) => (
                "SELECT key FROM kv
                 WHERE key >= ?1 AND key < ?2 AND instr(substr(key, ?3), '/') = 0
                 ORDER BY key LIMIT ?4",
                format!("{}{name}", self.prefix),
            ),
            Bound::After(key) => (
                "SELECT key FROM kv
                 WHERE key > ?1 AND key < ?2 AND instr(substr(key, ?3), '/') = 0
                 ORDER BY key LIMIT ?4",
                key.clone(),
            ),
        };
        let conn = self.conn;
        let mut stmt = conn.prepare_cached(sql)?;
        let keys = stmt
            .query_map(
                params![lower, self.upper, self.prefix.len() as i64 + 1, ITER_CHUNK as i64],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        if keys.len() < ITER_CHUNK {
            self.exhausted = true;
        }
        if let Some(last) = keys.last() {
            self.lower = Bound::After(last.clone());
        }
        let prefix_len = self.prefix.len();
        self.buffer
            .extend(keys.into_iter().map(|k| k[prefix_len..].to_string()));
        Ok(())
    }
}

impl Iterator for KeyIter<'_> {
    type Item = Result<String, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
