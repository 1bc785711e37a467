pub mod cache;
pub mod config;
pub mod decode;
pub mod errors;
pub mod model;
pub mod repair;
pub mod resolver;

pub use cache::{CacheKey, CacheStats, CacheStore, CacheStrategy, InteractionType, LocatorHint};
pub use config::{load_config, EngineConfig};
pub use decode::{decode_bbox, NormalizedBox, DEFAULT_BOX_SIZE};
pub use errors::{PinpointError, PinpointResult};
pub use model::{ModelChannel, ModelFamily, RawModelResponse, UsageInfo};
pub use repair::repair_response;
pub use resolver::{
    LocateOptions, LocateOutcome, LocateRequest, LocateResolver, LocateResult, PageDriver,
    Screenshot, UsageRecord,
};

/// Initializes tracing (env-filter, default `info`) and loads a `.env`
/// file if present. Call once from the embedding application.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenvy::dotenv();
}
