use std::sync::Arc;

use serde_json::Value;

use crate::cache::{CacheKey, CacheStats, CacheStore, LocatorHint};
use crate::config::{EngineConfig, RetryConfig};
use crate::decode::{decode_bbox, NormalizedBox};
use crate::errors::{PinpointError, PinpointResult};
use crate::model::channel::ModelChannel;
use crate::model::family::ModelFamily;
use crate::repair::repair_response;
use crate::resolver::page::PageDriver;
use crate::resolver::types::{
    LocateOptions, LocateOutcome, LocateRequest, LocateResult, UsageRecord,
};

/// How many resolver paths one cache entry keeps, most recent first.
const MAX_CACHED_PATHS: usize = 5;

/// Orchestrates one locate at a time:
/// CacheLookup → {CacheValidate | ModelInvoke} → Decode → Validate → (Retry | Done).
///
/// Calls are sequential per session (`&mut self`); the shared pieces of
/// state are the cache store and the usage log, both touched only
/// between await points of a single call.
pub struct LocateResolver {
    page: Arc<dyn PageDriver>,
    model: Arc<dyn ModelChannel>,
    cache: Option<CacheStore>,
    family: ModelFamily,
    retry: RetryConfig,
    session_id: String,
    usage_log: Vec<UsageRecord>,
}

impl LocateResolver {
    pub fn new(
        page: Arc<dyn PageDriver>,
        model: Arc<dyn ModelChannel>,
        cache: Option<CacheStore>,
        family: ModelFamily,
        retry: RetryConfig,
    ) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            session = %session_id,
            family = %family,
            caching = cache.is_some(),
            "locate resolver ready"
        );
        Self {
            page,
            model,
            cache,
            family,
            retry,
            session_id,
            usage_log: Vec::new(),
        }
    }

    /// Builds a resolver from configuration: opens the cache store
    /// (generated session id when none is configured) and threads the
    /// model family and retry knobs in explicitly.
    pub fn from_config(
        page: Arc<dyn PageDriver>,
        model: Arc<dyn ModelChannel>,
        config: &EngineConfig,
    ) -> PinpointResult<Self> {
        let cache = if config.cache.enabled {
            let id = config
                .cache
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            Some(CacheStore::open(&id, config.cache.strategy, &config.cache.dir)?)
        } else {
            None
        };
        tracing::info!(
            model = %config.model.name,
            family = %config.model.family,
            caching = cache.is_some(),
            "locate resolver configured"
        );
        Ok(Self::new(
            page,
            model,
            cache,
            config.model.family,
            config.retry.clone(),
        ))
    }

    pub async fn locate(&mut self, prompt: &str) -> PinpointResult<LocateOutcome> {
        self.locate_with(prompt, LocateOptions::default()).await
    }

    pub async fn locate_with(
        &mut self,
        prompt: &str,
        opts: LocateOptions,
    ) -> PinpointResult<LocateOutcome> {
        tracing::info!(
            session = %self.session_id,
            prompt = %prompt,
            interaction = %opts.interaction,
            "locate requested"
        );

        let max_attempts = if self.retry.enable_scroll_retry {
            self.retry.max_scroll_attempts.max(1)
        } else {
            1
        };
        let key = CacheKey::new(opts.interaction, prompt);
        let mut last_failure: Option<String> = None;

        for attempt in 0..max_attempts {
            // Cache lookup only on the first attempt: after a scroll the
            // remembered geometry no longer matches the viewport.
            if opts.use_cache && attempt == 0 {
                if let Some(result) = self.try_cached(&key, prompt).await? {
                    tracing::info!(prompt = %prompt, center = ?result.center, "cache hit validated on page");
                    return Ok(LocateOutcome::Found(result));
                }
            }

            match self.resolve_via_model(&key, prompt).await {
                Ok(result) => {
                    self.update_cache(&key, &result, opts.use_cache)?;
                    tracing::info!(
                        prompt = %prompt,
                        attempt = attempt + 1,
                        center = ?result.center,
                        "element located"
                    );
                    return Ok(LocateOutcome::Found(result));
                }
                // Environment problem: scrolling further will not fix it.
                Err(e @ PinpointError::Transport(_)) => {
                    tracing::error!(prompt = %prompt, error = %e, "transport failure, aborting locate");
                    return Err(e);
                }
                Err(e @ (PinpointError::Parse(_) | PinpointError::Decode(_))) => {
                    tracing::warn!(
                        prompt = %prompt,
                        attempt = attempt + 1,
                        error = %e,
                        "attempt produced no usable box"
                    );
                    last_failure = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }

            if attempt + 1 < max_attempts {
                tracing::info!(
                    prompt = %prompt,
                    distance = self.retry.scroll_distance,
                    "scrolling before retry"
                );
                once_retried(|| self.page.scroll_by(0.0, self.retry.scroll_distance)).await?;
            }
        }

        tracing::warn!(prompt = %prompt, attempts = max_attempts, "element not found after retries");
        Ok(LocateOutcome::NotFound {
            attempts: max_attempts,
            last_failure,
        })
    }

    /// CacheValidate: candidates most-recent-first against the live
    /// page; the first in-viewport, non-empty resolution wins with no
    /// model call. A raw-box fallback has no locator to re-evaluate, so
    /// it is bounds-checked and trusted.
    async fn try_cached(
        &mut self,
        key: &CacheKey,
        prompt: &str,
    ) -> PinpointResult<Option<LocateResult>> {
        let Some(store) = self.cache.as_ref() else {
            return Ok(None);
        };
        let Some(record) = store.get(key) else {
            return Ok(None);
        };
        let hint = record.hint.clone();

        let viewport = once_retried(|| self.page.viewport_size()).await?;
        match hint {
            LocatorHint::Paths(paths) => {
                for path in &paths {
                    match self.page.resolve_path(path).await {
                        Ok(Some(rect)) if !rect.is_empty() && in_viewport(&rect, viewport) => {
                            if let Some(store) = self.cache.as_mut() {
                                store.mark_validated(key);
                            }
                            return Ok(Some(LocateResult {
                                description: prompt.to_string(),
                                center: rect.center(),
                                rect,
                                path: Some(path.clone()),
                            }));
                        }
                        Ok(_) => {
                            tracing::debug!(path = %path, "cached path no longer resolves");
                        }
                        // A failing candidate falls through to the model.
                        Err(e) => {
                            tracing::warn!(path = %path, error = %e, "cached path lookup failed");
                        }
                    }
                }
                tracing::info!(
                    prompt = %prompt,
                    candidates = paths.len(),
                    "all cached paths stale, re-resolving"
                );
                Ok(None)
            }
            LocatorHint::Bbox(b) => {
                let rect = NormalizedBox {
                    left: b[0],
                    top: b[1],
                    right: b[2],
                    bottom: b[3],
                };
                if !rect.is_empty() && in_viewport(&rect, viewport) {
                    if let Some(store) = self.cache.as_mut() {
                        store.mark_validated(key);
                    }
                    return Ok(Some(LocateResult {
                        description: prompt.to_string(),
                        center: rect.center(),
                        rect,
                        path: None,
                    }));
                }
                tracing::debug!(prompt = %prompt, "cached box fallback out of viewport");
                Ok(None)
            }
        }
    }

    /// ModelInvoke → Decode → Validate for one attempt.
    async fn resolve_via_model(
        &mut self,
        key: &CacheKey,
        prompt: &str,
    ) -> PinpointResult<LocateResult> {
        let screenshot = once_retried(|| self.page.screenshot()).await?;
        let viewport = once_retried(|| self.page.viewport_size()).await?;

        let request = LocateRequest {
            prompt: prompt.to_string(),
            interaction: key.interaction,
            screenshot,
            viewport,
            family: self.family,
        };

        let started = std::time::Instant::now();
        let invoked = once_retried(|| self.model.invoke(&request)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // Usage is recorded for every invocation, successful or not.
        self.usage_log.push(UsageRecord {
            ts: chrono::Utc::now().timestamp_millis(),
            interaction: key.interaction,
            prompt: prompt.to_string(),
            time_cost_ms: elapsed_ms,
            usage: invoked.as_ref().ok().and_then(|r| r.usage.clone()),
        });

        let response = invoked?;
        tracing::debug!(
            prompt = %prompt,
            cost_ms = elapsed_ms,
            tokens = response
                .usage
                .as_ref()
                .and_then(|u| u.total_tokens)
                .unwrap_or(0),
            "model response received"
        );

        let value = repair_response(&response.content, self.family)?;
        let payload = bbox_payload(&value)?;
        let rect = decode_bbox(payload, self.family, viewport.0, viewport.1)?;
        let center = rect.center();

        // A derivable path makes the next hit cheap; failing to derive
        // one is not a locate failure.
        let path = match self.page.derive_path(center.0, center.1).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "could not derive a resolver path");
                None
            }
        };

        Ok(LocateResult {
            description: prompt.to_string(),
            rect,
            center,
            path,
        })
    }

    /// Done: persist the winning locator, strategy permitting. The new
    /// path goes to the front of the entry's list; older survivors stay
    /// as fallback candidates.
    fn update_cache(
        &mut self,
        key: &CacheKey,
        result: &LocateResult,
        use_cache: bool,
    ) -> PinpointResult<()> {
        if !use_cache {
            return Ok(());
        }
        let Some(store) = self.cache.as_mut() else {
            return Ok(());
        };

        let hint = match &result.path {
            Some(path) => {
                let mut paths = vec![path.clone()];
                if let Some(record) = store.get(key) {
                    if let LocatorHint::Paths(old) = &record.hint {
                        paths.extend(old.iter().filter(|p| *p != path).cloned());
                    }
                }
                paths.truncate(MAX_CACHED_PATHS);
                LocatorHint::Paths(paths)
            }
            None => LocatorHint::Bbox([
                result.rect.left,
                result.rect.top,
                result.rect.right,
                result.rect.bottom,
            ]),
        };
        store.put(key, hint)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn usage_log(&self) -> &[UsageRecord] {
        &self.usage_log
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Session checkpoint: rewrite the cache file now.
    pub fn flush_cache(&self) -> PinpointResult<()> {
        match &self.cache {
            Some(store) => store.flush(),
            None => Ok(()),
        }
    }
}

/// The repaired value is either an object carrying `bbox` or the bare
/// payload itself (point shorthand).
fn bbox_payload(value: &Value) -> PinpointResult<&Value> {
    match value {
        Value::Object(map) => map.get("bbox").ok_or_else(|| {
            PinpointError::Parse(format!("model response has no bbox field: {value}"))
        }),
        _ => Ok(value),
    }
}

fn in_viewport(rect: &NormalizedBox, (width, height): (u32, u32)) -> bool {
    rect.left >= 0.0
        && rect.top >= 0.0
        && rect.right <= f64::from(width)
        && rect.bottom <= f64::from(height)
}

/// Transport failures get exactly one immediate retry per attempt
/// boundary; a second failure surfaces.
async fn once_retried<T, F, Fut>(op: F) -> PinpointResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = PinpointResult<T>>,
{
    match op().await {
        Err(PinpointError::Transport(msg)) => {
            tracing::warn!(error = %msg, "transport failure, retrying once");
            op().await
        }
        other => other,
    }
}
