use base64::Engine as _;
use serde::Serialize;

use crate::cache::InteractionType;
use crate::decode::NormalizedBox;
use crate::model::channel::UsageInfo;
use crate::model::family::ModelFamily;

/// Raw screenshot handed from the page driver to the model channel.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub bytes: Vec<u8>,
    pub base64: String,
}

impl Screenshot {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let base64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Self { bytes, base64 }
    }
}

/// Input to one model invocation. Immutable once issued.
#[derive(Debug, Clone)]
pub struct LocateRequest {
    pub prompt: String,
    pub interaction: InteractionType,
    pub screenshot: Screenshot,
    pub viewport: (u32, u32),
    pub family: ModelFamily,
}

/// What a successful locate hands back to callers. The center always
/// lies within `rect`, and `rect` is always inside the viewport the
/// resolution ran against.
#[derive(Debug, Clone, Serialize)]
pub struct LocateResult {
    pub description: String,
    pub rect: NormalizedBox,
    pub center: (f64, f64),
    /// Re-evaluable locator for the element, when one could be found
    /// or derived.
    pub path: Option<String>,
}

/// Terminal outcome of a locate call. `NotFound` is a normal result,
/// not a fault.
#[derive(Debug, Clone, Serialize)]
pub enum LocateOutcome {
    Found(LocateResult),
    NotFound {
        attempts: u32,
        /// Diagnostic from the last failed attempt, distinguishing
        /// "never located" (`None`) from "could not decode" (`Some`).
        last_failure: Option<String>,
    },
}

impl LocateOutcome {
    pub fn found(&self) -> Option<&LocateResult> {
        match self {
            LocateOutcome::Found(result) => Some(result),
            LocateOutcome::NotFound { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocateOptions {
    pub interaction: InteractionType,
    pub use_cache: bool,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            interaction: InteractionType::Locate,
            use_cache: true,
        }
    }
}

/// Appended for every model invocation, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub ts: i64,
    pub interaction: InteractionType,
    pub prompt: String,
    pub time_cost_ms: u64,
    pub usage: Option<UsageInfo>,
}
