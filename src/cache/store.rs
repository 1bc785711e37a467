use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::file::{CacheFile, CacheRecord, InteractionType, LocatorHint};
use crate::errors::{PinpointError, PinpointResult};

pub const CACHE_FILE_EXT: &str = ".cache.yaml";

/// Filenames longer than this get a truncated-prefix + hash-suffix id.
const MAX_CACHE_ID_BYTES: usize = 200;

/// Read/write policy for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl Default for CacheStrategy {
    fn default() -> Self {
        CacheStrategy::ReadWrite
    }
}

impl std::fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            CacheStrategy::ReadWrite => "read-write",
            CacheStrategy::ReadOnly => "read-only",
            CacheStrategy::WriteOnly => "write-only",
        };
        f.write_str(tag)
    }
}

/// Lookup key within one cache id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub interaction: InteractionType,
    pub prompt: String,
}

impl CacheKey {
    pub fn new(interaction: InteractionType, prompt: impl Into<String>) -> Self {
        Self {
            interaction,
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_records: usize,
    pub matched_records: usize,
    pub strategy: CacheStrategy,
}

/// Persistent store of successful resolutions for one cache id.
///
/// Whole-file load at open, whole-file rewrite on flush. Not designed
/// for concurrent mutation: callers serialize access within a session,
/// and concurrent writers to one cache id are out of scope.
pub struct CacheStore {
    cache_id: String,
    strategy: CacheStrategy,
    file_path: PathBuf,
    records: Vec<CacheRecord>,
    validated_hits: HashSet<CacheKey>,
}

impl CacheStore {
    pub fn open(
        cache_id: &str,
        strategy: CacheStrategy,
        cache_dir: &Path,
    ) -> PinpointResult<Self> {
        if cache_id.is_empty() {
            return Err(PinpointError::Cache("cache id must not be empty".into()));
        }
        let safe_id = sanitize_cache_id(cache_id);
        std::fs::create_dir_all(cache_dir)?;
        let file_path = cache_dir.join(format!("{safe_id}{CACHE_FILE_EXT}"));

        // Under write-only everything misses anyway, so skip the load.
        let records = if strategy == CacheStrategy::WriteOnly {
            Vec::new()
        } else {
            CacheFile::load(&file_path)?
                .map(|f| f.records)
                .unwrap_or_default()
        };

        tracing::debug!(
            cache_id = %safe_id,
            strategy = %strategy,
            records = records.len(),
            path = %file_path.display(),
            "cache store opened"
        );

        Ok(Self {
            cache_id: safe_id,
            strategy,
            file_path,
            records,
            validated_hits: HashSet::new(),
        })
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheRecord> {
        if self.strategy == CacheStrategy::WriteOnly {
            return None;
        }
        self.records
            .iter()
            .find(|r| r.interaction == key.interaction && r.prompt == key.prompt)
    }

    /// Stores or overwrites the entry for `key` and checkpoints the
    /// file. One current entry per key: an existing record is replaced
    /// in place, preserving record order.
    pub fn put(&mut self, key: &CacheKey, hint: LocatorHint) -> PinpointResult<()> {
        if self.strategy == CacheStrategy::ReadOnly {
            tracing::debug!(prompt = %key.prompt, "read-only cache, put ignored");
            return Ok(());
        }
        let record = CacheRecord {
            interaction: key.interaction,
            prompt: key.prompt.clone(),
            hint,
        };
        match self
            .records
            .iter()
            .position(|r| r.interaction == key.interaction && r.prompt == key.prompt)
        {
            Some(i) => self.records[i] = record,
            None => self.records.push(record),
        }
        self.flush()
    }

    /// Marks a cached entry as validated against the live page this
    /// session. Feeds `stats()` only.
    pub fn mark_validated(&mut self, key: &CacheKey) {
        self.validated_hits.insert(key.clone());
    }

    /// Rewrites the whole file. A no-op under read-only: that strategy
    /// never touches disk.
    pub fn flush(&self) -> PinpointResult<()> {
        if self.strategy == CacheStrategy::ReadOnly {
            return Ok(());
        }
        let mut file = CacheFile::new(self.cache_id.clone());
        file.records = self.records.clone();
        file.save(&self.file_path)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_records: self.records.len(),
            matched_records: self.validated_hits.len(),
            strategy: self.strategy,
        }
    }

    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Replaces characters that are illegal in filenames and dashes spaces;
/// over-long ids keep a 32-char prefix plus a hash suffix so distinct
/// ids never collide on truncation.
fn sanitize_cache_id(raw: &str) -> String {
    let safe: String = raw
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' | '/' | '\n' | '\r' | '\t' => '_',
            ' ' => '-',
            other => other,
        })
        .collect();
    if safe.len() <= MAX_CACHE_ID_BYTES {
        return safe;
    }
    let prefix: String = safe.chars().take(32).collect();
    format!("{prefix}-{:08x}", short_hash(&safe) as u32)
}

fn short_hash(text: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_hint(path: &str) -> LocatorHint {
        LocatorHint::Paths(vec![path.to_string()])
    }

    #[test]
    fn read_write_put_then_get_returns_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            CacheStore::open("suite", CacheStrategy::ReadWrite, dir.path()).unwrap();
        let key = CacheKey::new(InteractionType::Locate, "search box");
        store.put(&key, paths_hint("//input[1]")).unwrap();
        let record = store.get(&key).unwrap();
        assert_eq!(record.hint, paths_hint("//input[1]"));
    }

    #[test]
    fn put_on_an_existing_key_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            CacheStore::open("suite", CacheStrategy::ReadWrite, dir.path()).unwrap();
        let key = CacheKey::new(InteractionType::Locate, "search box");
        store.put(&key, paths_hint("//input[1]")).unwrap();
        store.put(&key, paths_hint("//input[2]")).unwrap();
        assert_eq!(store.stats().total_records, 1);
        assert_eq!(store.get(&key).unwrap().hint, paths_hint("//input[2]"));
    }

    #[test]
    fn read_only_put_never_changes_later_get() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new(InteractionType::Locate, "search box");
        {
            let mut seed =
                CacheStore::open("suite", CacheStrategy::ReadWrite, dir.path()).unwrap();
            seed.put(&key, paths_hint("//input[1]")).unwrap();
        }
        let mut store =
            CacheStore::open("suite", CacheStrategy::ReadOnly, dir.path()).unwrap();
        store.put(&key, paths_hint("//changed")).unwrap();
        assert_eq!(store.get(&key).unwrap().hint, paths_hint("//input[1]"));

        // And the file is untouched: a fresh read-write store sees the original.
        let fresh = CacheStore::open("suite", CacheStrategy::ReadWrite, dir.path()).unwrap();
        assert_eq!(fresh.get(&key).unwrap().hint, paths_hint("//input[1]"));
    }

    #[test]
    fn write_only_get_misses_even_right_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            CacheStore::open("suite", CacheStrategy::WriteOnly, dir.path()).unwrap();
        let key = CacheKey::new(InteractionType::Locate, "search box");
        store.put(&key, paths_hint("//input[1]")).unwrap();
        assert!(store.get(&key).is_none());

        // The write still landed on disk.
        let fresh = CacheStore::open("suite", CacheStrategy::ReadWrite, dir.path()).unwrap();
        assert_eq!(fresh.get(&key).unwrap().hint, paths_hint("//input[1]"));
    }

    #[test]
    fn distinct_interaction_types_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            CacheStore::open("suite", CacheStrategy::ReadWrite, dir.path()).unwrap();
        store
            .put(
                &CacheKey::new(InteractionType::Click, "the button"),
                paths_hint("//button"),
            )
            .unwrap();
        assert!(store
            .get(&CacheKey::new(InteractionType::Input, "the button"))
            .is_none());
    }

    #[test]
    fn stats_track_validated_hits_and_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            CacheStore::open("suite", CacheStrategy::ReadWrite, dir.path()).unwrap();
        let key = CacheKey::new(InteractionType::Locate, "search box");
        store.put(&key, paths_hint("//input[1]")).unwrap();
        store.mark_validated(&key);
        store.mark_validated(&key);
        let stats = store.stats();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.matched_records, 1);
        assert_eq!(stats.strategy, CacheStrategy::ReadWrite);
    }

    #[test]
    fn cache_ids_are_sanitized_for_the_filesystem() {
        assert_eq!(sanitize_cache_id("login flow: step/1"), "login-flow_-step_1");
        let long = "x".repeat(300);
        let short = sanitize_cache_id(&long);
        assert!(short.len() <= MAX_CACHE_ID_BYTES);
        assert!(short.starts_with("xxxx"));
    }

    #[test]
    fn empty_cache_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CacheStore::open("", CacheStrategy::ReadWrite, dir.path()).is_err());
    }
}
