use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{PinpointError, PinpointResult};

/// Bump when the on-disk record shape changes. A file with any other
/// version is rejected, never silently upgraded.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// What kind of interaction a cached resolution was made for. Part of
/// the cache key, so "the login button" cached for a click never
/// answers a query lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Locate,
    Click,
    Input,
    Query,
    Assert,
}

impl std::fmt::Display for InteractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            InteractionType::Locate => "locate",
            InteractionType::Click => "click",
            InteractionType::Input => "input",
            InteractionType::Query => "query",
            InteractionType::Assert => "assert",
        };
        f.write_str(tag)
    }
}

/// The remembered locator for one prompt: an ordered resolver-path list
/// (most-recently-successful first) or a raw pixel box when no path
/// could be derived. The enum makes "both at once" unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocatorHint {
    #[serde(rename = "paths")]
    Paths(Vec<String>),
    #[serde(rename = "bbox")]
    Bbox([f64; 4]),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(rename = "type")]
    pub interaction: InteractionType,
    pub prompt: String,
    #[serde(flatten)]
    pub hint: LocatorHint,
}

/// On-disk cache document: version tag, cache id, ordered records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheFile {
    pub version: u32,
    #[serde(rename = "cacheId")]
    pub cache_id: String,
    #[serde(default)]
    pub records: Vec<CacheRecord>,
}

impl CacheFile {
    pub fn new(cache_id: impl Into<String>) -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            cache_id: cache_id.into(),
            records: Vec::new(),
        }
    }

    /// Loads a cache file. A missing file is `Ok(None)` (fresh store);
    /// an unreadable document or unknown format version is an error.
    pub fn load(path: &Path) -> PinpointResult<Option<CacheFile>> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no cache file, starting empty");
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let file: CacheFile = serde_yaml::from_str(&content)?;
        if file.version != CACHE_FORMAT_VERSION {
            return Err(PinpointError::Cache(format!(
                "unsupported cache format version {} in {} (expected {})",
                file.version,
                path.display(),
                CACHE_FORMAT_VERSION
            )));
        }
        tracing::info!(
            path = %path.display(),
            records = file.records.len(),
            "cache file loaded"
        );
        Ok(Some(file))
    }

    pub fn save(&self, path: &Path) -> PinpointResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(
            path = %path.display(),
            records = self.records.len(),
            "cache file written"
        );
        Ok(())
    }
}
