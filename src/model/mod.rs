pub mod channel;
pub mod family;

pub use channel::{ModelChannel, RawModelResponse, UsageInfo};
pub use family::{adapter_for, FamilyAdapter, ModelFamily};
