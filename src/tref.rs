//! The text region exchange format shared by every stage of the pipeline.
//!
//! Coordinates travel as base64 of little-endian `f32` pairs, each axis divided
//! by `dimension - 1` of the source image. The image size itself is never part
//! of an entry; callers pass it alongside.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use geo::Coord;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::instrument;

use crate::{
    error::{MergeError, Result},
    merge::MergeParams,
    quad::{Direction, Quadrilateral, Rgb},
    result::TextRegion,
    SkippedLine,
};

pub const QUAD_FORMAT: &str = "quad";
pub const TEXTBOX_FORMAT: &str = "textbox";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegionExchange {
    #[serde(rename = "fmt")]
    pub format: String,
    #[serde(rename = "coords")]
    pub coordinates: String,
    #[serde(rename = "fg", default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<[u8; 3]>,
    #[serde(rename = "bg", default, skip_serializing_if = "Option::is_none")]
    pub background: Option<[u8; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "prob", default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(
        default,
        deserialize_with = "lenient_direction",
        skip_serializing_if = "Option::is_none"
    )]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub lines: Vec<TextRegionExchange>,
}

// Unknown direction hints are dropped, not fatal: the geometry still decides.
fn lenient_direction<'de, D>(deserializer: D) -> std::result::Result<Option<Direction>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value.as_str() {
        "h" | "horizontal" => Some(Direction::Horizontal),
        "v" | "vertical" => Some(Direction::Vertical),
        _ => {
            log::debug!("Ignoring unknown direction `{value}`");
            None
        }
    }))
}

/// Per-request threshold overrides, applied on top of the merger's own params.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_limit: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_tol: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_tol2: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_ratio_tol: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_tol: Option<f32>,
}

impl ParamOverrides {
    pub fn apply(&self, base: MergeParams) -> MergeParams {
        MergeParams {
            ratio: self.ratio.unwrap_or(base.ratio),
            gap_limit: self.gap_limit.unwrap_or(base.gap_limit),
            gap_tol: self.gap_tol.unwrap_or(base.gap_tol),
            gap_tol2: self.gap_tol2.unwrap_or(base.gap_tol2),
            font_ratio_tol: self.font_ratio_tol.unwrap_or(base.font_ratio_tol),
            aspect_tol: self.aspect_tol.unwrap_or(base.aspect_tol),
        }
    }

    /// Keeps every threshold set here and takes the rest from `fallback`.
    pub fn or(self, fallback: ParamOverrides) -> ParamOverrides {
        ParamOverrides {
            ratio: self.ratio.or(fallback.ratio),
            gap_limit: self.gap_limit.or(fallback.gap_limit),
            gap_tol: self.gap_tol.or(fallback.gap_tol),
            gap_tol2: self.gap_tol2.or(fallback.gap_tol2),
            font_ratio_tol: self.font_ratio_tol.or(fallback.font_ratio_tol),
            aspect_tol: self.aspect_tol.or(fallback.aspect_tol),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub width: u32,
    pub height: u32,
    pub textlines: Vec<TextRegionExchange>,
    #[serde(flatten)]
    pub overrides: ParamOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResponse {
    pub regions: Vec<TextRegionExchange>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedLine>,
}

pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width < 2 || height < 2 {
        return Err(MergeError::InvalidDimensions { width, height });
    }
    Ok(())
}

pub fn encode_coordinates(points: &[Coord<f32>; 4], width: u32, height: u32) -> Result<String> {
    check_dimensions(width, height)?;
    let (scale_x, scale_y) = ((width - 1) as f32, (height - 1) as f32);
    let bytes = points
        .iter()
        .flat_map(|it| [it.x / scale_x, it.y / scale_y])
        .flat_map(f32::to_le_bytes)
        .collect::<Vec<u8>>();
    Ok(BASE64.encode(bytes))
}

pub fn decode_coordinates(encoded: &str, width: u32, height: u32) -> Result<[Coord<f32>; 4]> {
    check_dimensions(width, height)?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|err| MergeError::Decode(err.to_string()))?;
    if bytes.len() % 4 != 0 {
        return Err(MergeError::Decode(format!(
            "{} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    let values = bytes
        .chunks_exact(4)
        .map(|it| f32::from_le_bytes([it[0], it[1], it[2], it[3]]))
        .collect::<Vec<_>>();
    if values.len() != 8 {
        return Err(MergeError::Decode(format!(
            "expected 4 points, got {} values",
            values.len()
        )));
    }
    if values.iter().any(|it| !it.is_finite()) {
        return Err(MergeError::Decode("non-finite coordinate".to_string()));
    }

    let (scale_x, scale_y) = ((width - 1) as f32, (height - 1) as f32);
    let mut points = [Coord::zero(); 4];
    for (point, pair) in points.iter_mut().zip(values.chunks_exact(2)) {
        *point = Coord {
            x: pair[0] * scale_x,
            y: pair[1] * scale_y,
        };
    }
    Ok(points)
}

impl Quadrilateral {
    pub fn from_exchange(entry: &TextRegionExchange, width: u32, height: u32) -> Result<Self> {
        if entry.format != QUAD_FORMAT {
            return Err(MergeError::UnsupportedFormat(entry.format.clone()));
        }
        let points = decode_coordinates(&entry.coordinates, width, height)?;
        Ok(Quadrilateral::new(points)
            .with_text(entry.text.clone().unwrap_or_default())
            .with_confidence(entry.confidence.unwrap_or(0.0))
            .with_colors(Rgb::from_wire(entry.foreground), Rgb::from_wire(entry.background))
            .with_direction(entry.direction))
    }

    pub fn to_exchange(&self, width: u32, height: u32) -> Result<TextRegionExchange> {
        Ok(TextRegionExchange {
            format: QUAD_FORMAT.to_string(),
            coordinates: encode_coordinates(self.points(), width, height)?,
            foreground: self.foreground.to_wire(),
            background: self.background.to_wire(),
            text: (!self.text.is_empty()).then(|| self.text.clone()),
            confidence: (self.confidence > 0.0).then_some(self.confidence),
            direction: self.assigned_direction,
            lines: Vec::new(),
        })
    }
}

impl TextRegion {
    /// Region entry: bounding shape, aggregate direction and colors, and one
    /// nested entry per member line. Text and confidence are left for OCR.
    #[instrument(level = "trace", skip(self))]
    pub fn to_exchange(&self, width: u32, height: u32) -> Result<TextRegionExchange> {
        Ok(TextRegionExchange {
            format: QUAD_FORMAT.to_string(),
            coordinates: encode_coordinates(self.bounds(), width, height)?,
            foreground: self.foreground().to_wire(),
            background: self.background().to_wire(),
            text: None,
            confidence: None,
            direction: Some(self.direction()),
            lines: self
                .lines()
                .iter()
                .map(|it| it.to_exchange(width, height))
                .collect::<Result<_>>()?,
        })
    }
}
