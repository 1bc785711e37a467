pub mod engine;
pub mod page;
pub mod types;

pub use engine::LocateResolver;
pub use page::PageDriver;
pub use types::{LocateOptions, LocateOutcome, LocateRequest, LocateResult, Screenshot, UsageRecord};
