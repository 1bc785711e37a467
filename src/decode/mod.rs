pub mod bbox;

pub use bbox::{decode_bbox, NormalizedBox, DEFAULT_BOX_SIZE};
