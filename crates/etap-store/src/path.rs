// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchical keys.

use crate::StoreError;
use std::fmt;

/// Separator between path segments in the stored key.
pub(crate) const SEPARATOR: char = '/';

/// Byte immediately after [`SEPARATOR`]; `prefix + "0"` is the exclusive upper
/// bound of every key below `prefix + "/"`.
const SEPARATOR_SUCCESSOR: char = '0';

/// A path into the store, e.g. `taps/<id>/options`.
///
/// Paths are cheap to build; segment validity is checked when the path is
/// used inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DbPath {
    segments: Vec<String>,
}

impl DbPath {
    /// A single-segment path at the top of the store.
    pub fn root(segment: impl Into<String>) -> Self {
        Self {
            segments: vec![segment.into()],
        }
    }

    /// Build a path from individual segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// A new path with `segment` appended.
    #[must_use]
    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The enclosing path, or `None` for a top-level path.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Last segment of the path.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// `true` for the empty path, which never addresses a node.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The stored key for this path, after validating every segment.
    pub(crate) fn key(&self) -> Result<String, StoreError> {
        if self.segments.is_empty() {
            return Err(StoreError::InvalidPath("empty path".into()));
        }
        for seg in &self.segments {
            if seg.is_empty() {
                return Err(StoreError::InvalidPath(format!("empty segment in {self}")));
            }
            if seg.contains(SEPARATOR) {
                return Err(StoreError::InvalidPath(format!(
                    "segment '{seg}' contains '{SEPARATOR}'"
                )));
            }
        }
        Ok(self.segments.join("/"))
    }

    /// `(inclusive lower, exclusive upper)` key bounds of everything below
    /// this path.
    pub(crate) fn child_range(&self) -> Result<(String, String), StoreError> {
        let key = self.key()?;
        Ok((
            format!("{key}{SEPARATOR}"),
            format!("{key}{SEPARATOR_SUCCESSOR}"),
        ))
    }
}

impl fmt::Display for DbPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}
