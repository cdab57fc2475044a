// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Persistence seam.
//!
//! The engine persists full collections (replace-whole-collection
//! semantics) through the [`BlobStore`] trait: a key-scoped blob store
//! with `get`/`set` of opaque bytes. Two implementations are provided:
//!
//! - [`MemoryStore`]: in-process map with write-failure injection, used
//!   as a test double and for ephemeral runs.
//! - [`JsonFileStore`]: one file per key under a root directory, written
//!   atomically (temp file + rename).
//!
//! Collections are wrapped in a versioned envelope on disk:
//!
//! ```json
//! {"version": 1, "items": [...]}
//! ```
//!
//! A bare JSON array (the pre-versioning shape) is still accepted on
//! read and upgraded to the envelope on the next write.

use crate::EngineError;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Current version of the persisted collection envelope.
pub const SCHEMA_VERSION: u32 = 1;

/// Key-scoped blob store for full-collection reads and writes.
///
/// Implementations must be safe to share across threads; the engine
/// serializes writes per collection but reads may happen concurrently.
pub trait BlobStore: Send + Sync {
    /// Reads the blob stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError>;

    /// Replaces the blob stored under `key`.
    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: u32,
    items: Vec<T>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    items: &'a [T],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredShape<T> {
    Versioned(Envelope<T>),
    Legacy(Vec<T>),
}

/// Serializes a collection into the versioned envelope.
pub(crate) fn encode_collection<T: Serialize>(items: &[T]) -> Result<Vec<u8>, EngineError> {
    let envelope = EnvelopeRef {
        version: SCHEMA_VERSION,
        items,
    };
    serde_json::to_vec(&envelope).map_err(|e| EngineError::Storage(e.to_string()))
}

/// Deserializes a collection, accepting both the envelope and the
/// legacy bare-array shape.
///
/// # Errors
///
/// - [`EngineError::UnsupportedSchema`] - envelope version is newer
///   than [`SCHEMA_VERSION`].
/// - [`EngineError::Storage`] - the bytes do not parse as either shape.
pub(crate) fn decode_collection<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, EngineError> {
    let shape: StoredShape<T> =
        serde_json::from_slice(bytes).map_err(|e| EngineError::Storage(e.to_string()))?;
    match shape {
        StoredShape::Versioned(envelope) => {
            if envelope.version > SCHEMA_VERSION {
                return Err(EngineError::UnsupportedSchema(envelope.version));
            }
            Ok(envelope.items)
        }
        StoredShape::Legacy(items) => Ok(items),
    }
}

/// Runs a storage operation, retrying exactly once on [`EngineError::Storage`].
///
/// Only transient storage failures are retried; every other error
/// (including [`EngineError::UnsupportedSchema`]) passes through.
pub(crate) fn with_retry<T>(
    backoff: Duration,
    mut op: impl FnMut() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    match op() {
        Err(EngineError::Storage(first)) => {
            tracing::warn!(error = %first, "storage operation failed, retrying once");
            if !backoff.is_zero() {
                std::thread::sleep(backoff);
            }
            op()
        }
        other => other,
    }
}

/// In-memory blob store.
///
/// Doubles as the test back end: [`MemoryStore::fail_next_writes`] arms
/// a counter that makes the next N `set` calls fail, for exercising
/// write-then-commit ordering and the single-retry policy.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<String, Vec<u8>>,
    failing_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes fail with a storage error.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.blobs.get(key).map(|blob| blob.value().clone()))
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
        if self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EngineError::Storage("injected write failure".into()));
        }
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// File-backed blob store: one JSON file per key under a root directory.
///
/// Writes go to a temp file first and are renamed into place, so a
/// crash mid-write never leaves a torn blob behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Opens (and creates if needed) the store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_key(key)))
    }
}

impl BlobStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let path = self.path_for(key);
        write_atomic(&path, bytes).map_err(|e| EngineError::Storage(e.to_string()))
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_blobs() {
        let store = MemoryStore::new();
        assert_eq!(store.get("absent").unwrap(), None);
        store.set("key", b"payload").unwrap();
        assert_eq!(store.get("key").unwrap().as_deref(), Some(&b"payload"[..]));
    }

    #[test]
    fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);
        assert!(store.set("key", b"first").is_err());
        assert!(store.set("key", b"second").is_ok());
    }

    #[test]
    fn retry_recovers_from_single_transient_failure() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);
        let result = with_retry(Duration::ZERO, || store.set("key", b"payload"));
        assert!(result.is_ok());
        assert!(store.get("key").unwrap().is_some());
    }

    #[test]
    fn retry_gives_up_after_second_failure() {
        let store = MemoryStore::new();
        store.fail_next_writes(2);
        let result = with_retry(Duration::ZERO, || store.set("key", b"payload"));
        assert!(matches!(result, Err(EngineError::Storage(_))));
        assert_eq!(store.get("key").unwrap(), None);
    }

    #[test]
    fn envelope_round_trips() {
        let items = vec!["a".to_string(), "b".to_string()];
        let bytes = encode_collection(&items).unwrap();
        let decoded: Vec<String> = decode_collection(&bytes).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn legacy_bare_array_is_accepted() {
        let decoded: Vec<String> = decode_collection(br#"["a","b"]"#).unwrap();
        assert_eq!(decoded, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let bytes = br#"{"version": 2, "items": []}"#;
        let result: Result<Vec<String>, _> = decode_collection(bytes);
        assert_eq!(result, Err(EngineError::UnsupportedSchema(2)));
    }

    #[test]
    fn garbage_bytes_are_a_storage_error() {
        let result: Result<Vec<String>, _> = decode_collection(b"not json");
        assert!(matches!(result, Err(EngineError::Storage(_))));
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        assert_eq!(store.get("rider-1-methods").unwrap(), None);
        store.set("rider-1-methods", b"[]").unwrap();
        assert_eq!(
            store.get("rider-1-methods").unwrap().as_deref(),
            Some(&b"[]"[..])
        );
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        store.set("rider/1/methods", b"[]").unwrap();
        assert!(dir.path().join("rider_1_methods.json").exists());
    }
}
