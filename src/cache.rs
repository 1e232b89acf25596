//! Content-addressed replay cache for validated generation results.
//!
//! Every request is fingerprinted from the fields that determine its result;
//! the validated payload is stored under that fingerprint so a re-run can
//! replay it instead of calling the model again.
//!
//! Layout: `{root}/{fingerprint[0..2]}/{fingerprint}.json`

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::store::write_atomic;
use crate::structured::StructuredOutput;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt cache entry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 64 lowercase hex characters of a BLAKE3 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct KeyFields<'a> {
    namespace: &'a str,
    model: &'a str,
    seed: u64,
    system_instruction: &'a str,
    prompt: &'a str,
    schema_name: &'a str,
}

#[derive(Debug, Clone)]
pub struct ReplayCache {
    root: PathBuf,
}

impl ReplayCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fingerprint one generation request. Pure: equal inputs give equal keys.
    pub fn key(
        namespace: &str,
        model: &str,
        seed: u64,
        system_instruction: &str,
        prompt: &str,
        schema_name: &str,
    ) -> Result<Fingerprint, CacheError> {
        let canonical = serde_json_canonicalizer::to_vec(&KeyFields {
            namespace,
            model,
            seed,
            system_instruction,
            prompt,
            schema_name,
        })?;
        Ok(Fingerprint(blake3::hash(&canonical).to_hex().to_string()))
    }

    /// Load a stored value. Absent entries are `None`; unreadable ones are errors.
    pub fn load<T: StructuredOutput>(&self, key: &Fingerprint) -> Result<Option<T>, CacheError> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let corrupt = |reason: String| CacheError::Corrupt {
            path: path.clone(),
            reason,
        };
        let value: Value = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        let compiled = T::schema().compile().map_err(|e| corrupt(e.to_string()))?;
        if let Some(violation) = compiled.root.validate(&value).into_iter().next() {
            return Err(corrupt(format!("does not match `{}`: {violation}", T::SCHEMA_NAME)));
        }
        let payload = serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;

        debug!(key = %key, schema = T::SCHEMA_NAME, "replay cache hit");
        Ok(Some(payload))
    }

    /// Persist `value` under `key`, replacing any previous entry.
    pub fn store<T: Serialize>(&self, key: &Fingerprint, value: &T) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        let body = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &body).map_err(|source| CacheError::Io { path, source })
    }

    /// Remove an entry. Returns whether one existed.
    pub fn invalidate(&self, key: &Fingerprint) -> Result<bool, CacheError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    fn entry_path(&self, key: &Fingerprint) -> PathBuf {
        self.root.join(key.shard()).join(format!("{key}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::SchemaDescriptor;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Score {
        value: u8,
    }

    impl StructuredOutput for Score {
        const SCHEMA_NAME: &'static str = "Score";

        fn schema() -> SchemaDescriptor {
            SchemaDescriptor::new(
                Self::SCHEMA_NAME,
                json!({
                    "type": "object",
                    "properties": {"value": {"type": "integer", "minimum": 1, "maximum": 5}},
                    "required": ["value"]
                }),
            )
        }
    }

    fn key(seed: u64) -> Fingerprint {
        ReplayCache::key("ns", "model", seed, "system", "prompt", "Score").unwrap()
    }

    #[test]
    fn key_is_stable_hex() {
        let first = key(1);
        assert_eq!(first, key(1));
        assert_eq!(first.as_str().len(), 64);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn every_field_changes_the_key() {
        let base = ReplayCache::key("ns", "model", 1, "system", "prompt", "Score").unwrap();
        let variants = [
            ReplayCache::key("other", "model", 1, "system", "prompt", "Score"),
            ReplayCache::key("ns", "other", 1, "system", "prompt", "Score"),
            ReplayCache::key("ns", "model", 2, "system", "prompt", "Score"),
            ReplayCache::key("ns", "model", 1, "other", "prompt", "Score"),
            ReplayCache::key("ns", "model", 1, "system", "other", "Score"),
            ReplayCache::key("ns", "model", 1, "system", "prompt", "Other"),
        ];
        for variant in variants {
            assert_ne!(variant.unwrap(), base);
        }
    }

    #[test]
    fn stored_value_survives_a_fresh_instance() {
        let dir = TempDir::new().unwrap();
        let key = key(7);
        ReplayCache::new(dir.path()).store(&key, &Score { value: 4 }).unwrap();

        let reopened = ReplayCache::new(dir.path());
        assert_eq!(reopened.load::<Score>(&key).unwrap(), Some(Score { value: 4 }));

        let shard = dir.path().join(&key.as_str()[..2]);
        assert!(shard.join(format!("{key}.json")).exists());
    }

    #[test]
    fn absent_entry_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(ReplayCache::new(dir.path()).load::<Score>(&key(1)).unwrap(), None);
    }

    #[test]
    fn unparsable_entry_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let cache = ReplayCache::new(dir.path());
        let key = key(3);
        cache.store(&key, &Score { value: 2 }).unwrap();
        fs::write(cache.entry_path(&key), "{ truncated").unwrap();

        assert!(matches!(cache.load::<Score>(&key), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn entry_violating_schema_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let cache = ReplayCache::new(dir.path());
        let key = key(4);
        cache.store(&key, &json!({"value": 9})).unwrap();

        assert!(matches!(cache.load::<Score>(&key), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn store_overwrites_and_invalidate_removes() {
        let dir = TempDir::new().unwrap();
        let cache = ReplayCache::new(dir.path());
        let key = key(5);
        cache.store(&key, &Score { value: 1 }).unwrap();
        cache.store(&key, &Score { value: 3 }).unwrap();
        assert_eq!(cache.load::<Score>(&key).unwrap(), Some(Score { value: 3 }));

        assert!(cache.invalidate(&key).unwrap());
        assert!(!cache.invalidate(&key).unwrap());
        assert_eq!(cache.load::<Score>(&key).unwrap(), None);
    }
}
