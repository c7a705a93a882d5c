//! Session Registry
//!
//! Per-root symbol cache and jump history. Nothing here is persisted; the
//! registry lives as long as whoever constructed it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::{GtagsError, Result};
use crate::paths;

/// A cursor position, encoded as `path:line:column` (both 1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub path: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(path: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}

impl FromStr for Location {
    type Err = GtagsError;

    /// Splits from the right so `C:/x.c:3:1` keeps its drive letter.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.rsplitn(3, ':');
        let column = parts.next();
        let line = parts.next();
        let path = parts.next();

        match (path, line, column) {
            (Some(path), Some(line), Some(column)) if !path.is_empty() => {
                let line = line
                    .parse::<u32>()
                    .map_err(|_| GtagsError::Parse(format!("Bad line in location: {}", s)))?;
                let column = column
                    .parse::<u32>()
                    .map_err(|_| GtagsError::Parse(format!("Bad column in location: {}", s)))?;
                Ok(Location::new(path, line, column))
            }
            _ => Err(GtagsError::Parse(format!("Malformed location: {}", s))),
        }
    }
}

/// Navigation stack for one root.
#[derive(Debug, Clone, Default)]
pub struct JumpHistory {
    storage: Vec<String>,
}

impl JumpHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an encoded location unless it repeats the top of the stack.
    pub fn push(&mut self, encoded: impl Into<String>) {
        let encoded = encoded.into();
        if self.storage.last() == Some(&encoded) {
            return;
        }
        self.storage.push(encoded);
    }

    pub fn pop(&mut self) -> Result<String> {
        self.storage.pop().ok_or(GtagsError::EmptyHistory)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[derive(Debug, Default)]
struct Inner {
    symbols: HashMap<String, Vec<String>>,
    jumps: HashMap<String, JumpHistory>,
}

/// Registry of per-root session state.
///
/// Construct one per application and share it; cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State stays consistent even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cache key for a root.
    pub fn key(root: &str) -> String {
        paths::normalize(root).unwrap_or_else(|_| root.to_string())
    }

    pub fn store_symbols(&self, root: &str, symbols: Vec<String>) {
        self.lock().symbols.insert(Self::key(root), symbols);
    }

    pub fn load_symbols(&self, root: &str) -> Option<Vec<String>> {
        self.lock().symbols.get(&Self::key(root)).cloned()
    }

    /// Drop the cached listing. Call after any rebuild or update of `root`.
    pub fn clear_symbols(&self, root: &str) {
        self.lock().symbols.remove(&Self::key(root));
    }

    pub fn push_jump(&self, root: &str, location: impl Into<String>) {
        self.lock()
            .jumps
            .entry(Self::key(root))
            .or_default()
            .push(location);
    }

    pub fn pop_jump(&self, root: &str) -> Result<String> {
        match self.lock().jumps.get_mut(&Self::key(root)) {
            Some(history) => history.pop(),
            None => Err(GtagsError::EmptyHistory),
        }
    }

    pub fn jump_depth(&self, root: &str) -> usize {
        self.lock()
            .jumps
            .get(&Self::key(root))
            .map(JumpHistory::len)
            .unwrap_or(0)
    }
}
