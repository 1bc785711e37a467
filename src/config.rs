use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::CacheStrategy;
use crate::errors::PinpointResult;
use crate::model::family::ModelFamily;

/// Engine configuration, loaded once and threaded into the resolver at
/// construction. Decode/repair logic never reads configuration (or any
/// process-global state) itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    /// Selects the decode/repair conventions for the configured model.
    #[serde(default)]
    pub family: ModelFamily,
    /// Display name used in logs and usage records.
    #[serde(default = "default_model_name")]
    pub name: String,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            family: ModelFamily::default(),
            name: default_model_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: CacheStrategy,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Stable id shared across runs (usually the script or test name).
    /// A per-session id is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CacheStrategy::default(),
            dir: default_cache_dir(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_true")]
    pub enable_scroll_retry: bool,
    #[serde(default = "default_max_scroll_attempts")]
    pub max_scroll_attempts: u32,
    /// Pixels scrolled down between attempts.
    #[serde(default = "default_scroll_distance")]
    pub scroll_distance: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enable_scroll_retry: true,
            max_scroll_attempts: default_max_scroll_attempts(),
            scroll_distance: default_scroll_distance(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model_name() -> String {
    "qwen2.5-vl".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./pinpoint_run/cache")
}

fn default_max_scroll_attempts() -> u32 {
    3
}

fn default_scroll_distance() -> f64 {
    500.0
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("pinpoint.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let cwd = std::env::current_dir().ok()?;
    let candidate = cwd.join("pinpoint.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

/// Loads `pinpoint.toml` from next to the executable, then the working
/// directory. No file means defaults.
pub fn load_config() -> PinpointResult<EngineConfig> {
    match resolve_config_path() {
        Some(path) => load_config_from(&path),
        None => {
            tracing::debug!("no pinpoint.toml found, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

pub fn load_config_from(path: &Path) -> PinpointResult<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: EngineConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        model = %config.model.name,
        family = %config.model.family,
        "config loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible_without_a_file() {
        let config = EngineConfig::default();
        assert_eq!(config.model.family, ModelFamily::Qwen25Vl);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.strategy, CacheStrategy::ReadWrite);
        assert_eq!(config.retry.max_scroll_attempts, 3);
        assert_eq!(config.retry.scroll_distance, 500.0);
    }

    #[test]
    fn config_file_overrides_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pinpoint.toml");
        std::fs::write(
            &path,
            r#"
[model]
family = "doubao-vision"
name = "doubao-seed-1.6"

[cache]
strategy = "read-only"
id = "login-flow"

[retry]
enable_scroll_retry = false
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.model.family, ModelFamily::DoubaoVision);
        assert_eq!(config.cache.strategy, CacheStrategy::ReadOnly);
        assert_eq!(config.cache.id.as_deref(), Some("login-flow"));
        assert!(!config.retry.enable_scroll_retry);
        // Unspecified knobs keep their defaults.
        assert_eq!(config.retry.max_scroll_attempts, 3);
    }
}
