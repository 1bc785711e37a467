use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PinpointError, PinpointResult};
use crate::model::family::{adapter_for, ModelFamily};

/// Side of the square produced when a model answers with a bare point.
pub const DEFAULT_BOX_SIZE: f64 = 20.0;

/// Axis-aligned rectangle in the current viewport's pixel space,
/// clamped to `[0,width]×[0,height]` on construction. Derived per
/// resolution, never persisted directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl NormalizedBox {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// Turns a raw bbox payload into a pixel-space box for the given model
/// family and viewport. Pure: family conventions come from the adapter
/// table, never from ambient state.
pub fn decode_bbox(
    payload: &Value,
    family: ModelFamily,
    width: u32,
    height: u32,
) -> PinpointResult<NormalizedBox> {
    if width == 0 || height == 0 {
        return Err(PinpointError::Decode(format!(
            "viewport must be non-zero, got {width}x{height}"
        )));
    }

    let values = numbers_from_payload(payload)?;
    if values.is_empty() {
        return Err(PinpointError::Decode(format!(
            "no numeric values in bbox payload: {payload}"
        )));
    }

    let decoded = (adapter_for(family).decode)(&values, width, height)?;
    tracing::debug!(family = %family, ?values, rect = ?decoded, "bbox decoded");
    Ok(decoded)
}

/// Flattens a bbox payload into a numeric sequence.
///
/// Accepts a number array, a string ("x1 y1 x2 y2" or comma-separated),
/// an array of strings, or a nested array (first row taken). A token
/// that does not parse as a number is dropped with a warning — it fails
/// only that field, not the whole response.
pub fn numbers_from_payload(payload: &Value) -> PinpointResult<Vec<f64>> {
    match payload {
        Value::String(s) => Ok(tokenize_numbers(s)),
        Value::Array(items) => {
            if let Some(Value::Array(_)) = items.first() {
                return numbers_from_payload(&items[0]);
            }
            let mut numbers = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Number(n) => {
                        if let Some(v) = n.as_f64() {
                            numbers.push(v);
                        }
                    }
                    Value::String(s) => numbers.extend(tokenize_numbers(s)),
                    other => {
                        tracing::warn!(token = %other, "non-numeric bbox element dropped");
                    }
                }
            }
            Ok(numbers)
        }
        other => Err(PinpointError::Decode(format!(
            "unsupported bbox payload: {other}"
        ))),
    }
}

fn tokenize_numbers(text: &str) -> Vec<f64> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .filter_map(|t| match t.parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(token = t, "non-numeric bbox token dropped");
                None
            }
        })
        .collect()
}

/// Default coordinate frame: every value normalized to 0–1000, scaled
/// by `dimension/1000`.
///
/// - 4/5 values: `[x1,y1,x2,y2]` (a trailing confidence value is ignored)
/// - 2/3/6/7 values: center point, expanded to a `DEFAULT_BOX_SIZE`
///   square (legacy rule: 6/7-value payloads use the first pair)
/// - 8 values: four-corner polygon reduced by the legacy fixed
///   corner-index selection (indices 0,1,4,5)
pub fn decode_normalized_0_1000(
    values: &[f64],
    width: u32,
    height: u32,
) -> PinpointResult<NormalizedBox> {
    let (w, h) = (f64::from(width), f64::from(height));
    match values.len() {
        4 | 5 => clamp_box(
            (values[0] * w / 1000.0).round(),
            (values[1] * h / 1000.0).round(),
            (values[2] * w / 1000.0).round(),
            (values[3] * h / 1000.0).round(),
            width,
            height,
        ),
        2 | 3 | 6 | 7 => point_to_box(
            (values[0] * w / 1000.0).round(),
            (values[1] * h / 1000.0).round(),
            width,
            height,
        ),
        8 => clamp_box(
            (values[0] * w / 1000.0).round(),
            (values[1] * h / 1000.0).round(),
            (values[4] * w / 1000.0).round(),
            (values[5] * h / 1000.0).round(),
            width,
            height,
        ),
        n => Err(PinpointError::Decode(format!(
            "unsupported bbox length {n}: {values:?}"
        ))),
    }
}

/// Absolute pixel coordinates, used as-is (still clamped). A 2-value
/// payload anchors a `DEFAULT_BOX_SIZE` square at the point.
pub fn decode_pixel(values: &[f64], width: u32, height: u32) -> PinpointResult<NormalizedBox> {
    if values.len() < 2 {
        return Err(PinpointError::Decode(format!(
            "pixel bbox needs at least 2 values: {values:?}"
        )));
    }
    let left = values[0].round();
    let top = values[1].round();
    let right = values
        .get(2)
        .copied()
        .map(f64::round)
        .unwrap_or(left + DEFAULT_BOX_SIZE);
    let bottom = values
        .get(3)
        .copied()
        .map(f64::round)
        .unwrap_or(top + DEFAULT_BOX_SIZE);
    clamp_box(left, top, right, bottom, width, height)
}

/// Normalized 0–1000 with (row, column) ordering: `[y1,x1,y2,x2]`.
/// Pairs are transposed to (x, y) before scaling.
pub fn decode_axis_swapped(
    values: &[f64],
    width: u32,
    height: u32,
) -> PinpointResult<NormalizedBox> {
    let (w, h) = (f64::from(width), f64::from(height));
    match values.len() {
        4 => clamp_box(
            (values[1] * w / 1000.0).round(),
            (values[0] * h / 1000.0).round(),
            (values[3] * w / 1000.0).round(),
            (values[2] * h / 1000.0).round(),
            width,
            height,
        ),
        2 | 3 => point_to_box(
            (values[1] * w / 1000.0).round(),
            (values[0] * h / 1000.0).round(),
            width,
            height,
        ),
        n => Err(PinpointError::Decode(format!(
            "unsupported axis-swapped bbox length {n}: {values:?}"
        ))),
    }
}

fn point_to_box(cx: f64, cy: f64, width: u32, height: u32) -> PinpointResult<NormalizedBox> {
    let half = DEFAULT_BOX_SIZE / 2.0;
    clamp_box(cx - half, cy - half, cx + half, cy + half, width, height)
}

fn clamp_box(
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
    width: u32,
    height: u32,
) -> PinpointResult<NormalizedBox> {
    let clamped = NormalizedBox {
        left: left.max(0.0),
        top: top.max(0.0),
        right: right.min(f64::from(width)),
        bottom: bottom.min(f64::from(height)),
    };
    if clamped.is_empty() {
        return Err(PinpointError::Decode(format!(
            "degenerate box after clamping: ({left}, {top}, {right}, {bottom}) in {width}x{height}"
        )));
    }
    Ok(clamped)
}
