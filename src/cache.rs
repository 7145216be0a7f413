//! Memoization keyed by input content.
//!
//! A [`CacheKey`] is a SHA-256 over everything a computation reads: file
//! names, file bytes and the serialized parameters. Identical uploads hit the
//! cache; any changed byte or parameter produces a new key and recomputes.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::DashError;
use crate::workbook::UploadedFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Key over a labelled computation, its input files and its parameters.
    ///
    /// File order does not matter; each file is hashed by name and content.
    pub fn new<P: Serialize>(
        label: &str,
        files: &[UploadedFile],
        params: &P,
    ) -> Result<Self, DashError> {
        let mut file_digests: Vec<[u8; 32]> = files
            .iter()
            .map(|f| {
                let mut hasher = Sha256::new();
                hasher.update((f.name.len() as u64).to_le_bytes());
                hasher.update(f.name.as_bytes());
                hasher.update(&f.bytes);
                hasher.finalize().into()
            })
            .collect();
        file_digests.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        hasher.update([0u8]);
        for digest in &file_digests {
            hasher.update(digest);
        }
        hasher.update(serde_json::to_vec(params)?);
        Ok(Self(hasher.finalize().into()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Bounded result cache; the oldest entry is evicted first.
#[derive(Debug)]
pub struct ResultCache<V> {
    capacity: usize,
    entries: HashMap<CacheKey, V>,
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, value: V) {
        if self.entries.insert(key, value).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.entries.remove(&old);
            }
        }
    }

    /// Return the cached value for `key`, or run `compute` and remember its
    /// result. Errors are returned as-is and never cached.
    pub fn get_or_try_compute<E>(
        &mut self,
        key: CacheKey,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(v) = self.entries.get(&key) {
            self.hits += 1;
            debug!("cache hit {key}");
            return Ok(v.clone());
        }
        self.misses += 1;
        debug!("cache miss {key}");
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> Option<V> {
        self.order.retain(|k| k != key);
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
