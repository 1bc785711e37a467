use async_trait::async_trait;

use crate::decode::NormalizedBox;
use crate::errors::PinpointResult;
use crate::resolver::types::Screenshot;

/// Live page collaborator. How a scroll or screenshot is physically
/// performed is the embedding application's concern; failures on
/// network or timeout surface as `PinpointError::Transport`.
///
/// A resolver path is a lookup key re-evaluated fresh on every call,
/// never a held reference to a live element.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn screenshot(&self) -> PinpointResult<Screenshot>;

    async fn viewport_size(&self) -> PinpointResult<(u32, u32)>;

    /// Re-resolves a stored locator path; `None` when nothing matches
    /// the current page.
    async fn resolve_path(&self, path: &str) -> PinpointResult<Option<NormalizedBox>>;

    /// Derives a re-evaluable path for the element at a point, if the
    /// page can address it.
    async fn derive_path(&self, x: f64, y: f64) -> PinpointResult<Option<String>>;

    async fn scroll_by(&self, dx: f64, dy: f64) -> PinpointResult<()>;
}
