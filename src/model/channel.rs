use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PinpointResult;
use crate::resolver::types::LocateRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Unparsed model output plus usage metadata. Owned transiently for
/// one resolution.
#[derive(Debug, Clone)]
pub struct RawModelResponse {
    pub content: String,
    pub usage: Option<UsageInfo>,
}

/// Vision model transport. Implementations live with the embedding
/// application; network and timeout problems surface as
/// `PinpointError::Transport`.
#[async_trait]
pub trait ModelChannel: Send + Sync {
    async fn invoke(&self, request: &LocateRequest) -> PinpointResult<RawModelResponse>;
}
