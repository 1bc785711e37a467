use serde::{Deserialize, Serialize};

use crate::decode::bbox::{decode_axis_swapped, decode_normalized_0_1000, decode_pixel, NormalizedBox};
use crate::errors::PinpointResult;
use crate::repair::{preprocess_none, preprocess_space_separated_bbox};

/// Identifies which decode/repair conventions a vision model's output follows.
///
/// Coordinate frames:
/// - `doubao-vision`, `vlm-ui-tars`, `qwen3-vl`, `glm-v`: normalized 0–1000, `[x1,y1,x2,y2]`
/// - `qwen2.5-vl`: absolute pixel coordinates
/// - `gemini`: normalized 0–1000 with axis-swapped `[y1,x1,y2,x2]` order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "doubao-vision")]
    DoubaoVision,
    #[serde(rename = "vlm-ui-tars", alias = "vlm-ui-tars-doubao", alias = "vlm-ui-tars-doubao-1.5")]
    VlmUiTars,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "qwen2.5-vl")]
    Qwen25Vl,
    #[serde(rename = "qwen3-vl")]
    Qwen3Vl,
    #[serde(rename = "glm-v")]
    GlmV,
}

impl Default for ModelFamily {
    fn default() -> Self {
        ModelFamily::Qwen25Vl
    }
}

impl ModelFamily {
    pub fn as_tag(&self) -> &'static str {
        match self {
            ModelFamily::DoubaoVision => "doubao-vision",
            ModelFamily::VlmUiTars => "vlm-ui-tars",
            ModelFamily::Gemini => "gemini",
            ModelFamily::Qwen25Vl => "qwen2.5-vl",
            ModelFamily::Qwen3Vl => "qwen3-vl",
            ModelFamily::GlmV => "glm-v",
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Per-family handler pair. Both members are pure functions: the family
/// tag is the only thing that selects behavior, never ambient state.
pub struct FamilyAdapter {
    /// Reduces a flattened numeric payload to a pixel-space box.
    pub decode: fn(&[f64], u32, u32) -> PinpointResult<NormalizedBox>,
    /// Family-specific raw-text fixup applied before the tolerant parse
    /// stage. Returns `None` when the text is already fine.
    pub preprocess: fn(&str) -> Option<String>,
}

static NORMALIZED_0_1000: FamilyAdapter = FamilyAdapter {
    decode: decode_normalized_0_1000,
    preprocess: preprocess_none,
};

static SPACE_SEPARATED_0_1000: FamilyAdapter = FamilyAdapter {
    decode: decode_normalized_0_1000,
    preprocess: preprocess_space_separated_bbox,
};

static PIXEL: FamilyAdapter = FamilyAdapter {
    decode: decode_pixel,
    preprocess: preprocess_none,
};

static AXIS_SWAPPED: FamilyAdapter = FamilyAdapter {
    decode: decode_axis_swapped,
    preprocess: preprocess_none,
};

/// Adapter lookup. A closed set keyed by family tag — adding a model
/// family means adding a variant and a row here.
pub fn adapter_for(family: ModelFamily) -> &'static FamilyAdapter {
    match family {
        ModelFamily::DoubaoVision | ModelFamily::VlmUiTars => &SPACE_SEPARATED_0_1000,
        ModelFamily::Gemini => &AXIS_SWAPPED,
        ModelFamily::Qwen25Vl => &PIXEL,
        ModelFamily::Qwen3Vl | ModelFamily::GlmV => &NORMALIZED_0_1000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_tag_round_trips_through_serde() {
        let family: ModelFamily = serde_json::from_str("\"doubao-vision\"").unwrap();
        assert_eq!(family, ModelFamily::DoubaoVision);
        assert_eq!(serde_json::to_string(&family).unwrap(), "\"doubao-vision\"");
    }

    #[test]
    fn ui_tars_aliases_parse() {
        let family: ModelFamily = serde_json::from_str("\"vlm-ui-tars-doubao-1.5\"").unwrap();
        assert_eq!(family, ModelFamily::VlmUiTars);
    }
}
