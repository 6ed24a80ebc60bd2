use geo::Rect;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{error::Result, quad::Quadrilateral, util::rect_distance};

const MAX_ANGLE_DEVIATION: f32 = 15.0 * std::f32::consts::PI / 180.0;
const MAX_FONT_SIZE_DEVIATION: f32 = 0.25;

/// Thresholds of the pairwise merge test. Gaps and alignment tolerances are
/// expressed in character-size units unless noted otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeParams {
    /// Elongation above which a box counts as clearly wide or clearly tall.
    pub ratio: f32,
    /// Gap beyond which two lines are never merged.
    pub gap_limit: f32,
    pub gap_tol: f32,
    /// Edge alignment tolerance; also the center alignment tolerance in pixels.
    pub gap_tol2: f32,
    pub font_ratio_tol: f32,
    pub aspect_tol: f32,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            ratio: 1.9,
            gap_limit: 5.0,
            gap_tol: 0.6,
            gap_tol2: 1.5,
            font_ratio_tol: 1.5,
            aspect_tol: 2.0,
        }
    }
}

/// Decides whether two text lines may belong to the same region.
///
/// The test is symmetric: `can_merge(a, b, p) == can_merge(b, a, p)`.
#[instrument(level = "trace", skip(a, b))]
pub fn can_merge(a: &Quadrilateral, b: &Quadrilateral, params: &MergeParams) -> Result<bool> {
    let MergeParams {
        ratio,
        gap_limit,
        gap_tol,
        gap_tol2,
        font_ratio_tol,
        aspect_tol,
    } = *params;

    let (box_a, box_b) = (a.aabb(), b.aabb());
    let (font_a, font_b) = (a.font_size()?, b.font_size()?);
    let char_size = font_a.min(font_b);

    let gap = rect_distance(&box_a, &box_b);
    if gap > gap_limit * char_size {
        return Ok(false);
    }
    if font_a.max(font_b) / char_size > font_ratio_tol {
        return Ok(false);
    }

    let (aspect_a, aspect_b) = (a.aspect_ratio()?, b.aspect_ratio()?);
    if (aspect_a > aspect_tol && aspect_b < 1.0 / aspect_tol)
        || (aspect_b > aspect_tol && aspect_a < 1.0 / aspect_tol)
    {
        return Ok(false);
    }

    if a.is_approximately_axis_aligned()? && b.is_approximately_axis_aligned()? {
        if gap >= char_size * gap_tol {
            return Ok(false);
        }
        return Ok(aligned_boxes_merge(
            &box_a,
            &box_b,
            char_size,
            ratio,
            gap_tol2,
        ));
    }

    let deviation = (a.angle()? - b.angle()?).abs();
    let deviation = deviation.min(std::f32::consts::PI - deviation);
    if deviation >= MAX_ANGLE_DEVIATION {
        return Ok(false);
    }
    if a.poly_distance(b) > char_size * gap_tol2 {
        return Ok(false);
    }
    Ok((font_a - font_b).abs() / char_size <= MAX_FONT_SIZE_DEVIATION)
}

fn aligned_boxes_merge(
    box_a: &Rect<f32>,
    box_b: &Rect<f32>,
    char_size: f32,
    ratio: f32,
    gap_tol2: f32,
) -> bool {
    let (center_a, center_b) = (box_a.center(), box_b.center());
    if (center_a.x - center_b.x).abs() < gap_tol2 || (center_a.y - center_b.y).abs() < gap_tol2 {
        return true;
    }

    let wide = |it: &Rect<f32>| it.width() > it.height() * ratio;
    let tall = |it: &Rect<f32>| it.height() > it.width() * ratio;
    if (wide(box_a) && tall(box_b)) || (wide(box_b) && tall(box_a)) {
        return false;
    }

    let tolerance = char_size * gap_tol2;
    let (min_a, max_a) = (box_a.min(), box_a.max());
    let (min_b, max_b) = (box_b.min(), box_b.max());
    if wide(box_a) || wide(box_b) {
        (min_a.x - min_b.x).abs() < tolerance || (max_a.x - max_b.x).abs() < tolerance
    } else if tall(box_a) || tall(box_b) {
        (min_a.y - min_b.y).abs() < tolerance || (max_a.y - max_b.y).abs() < tolerance
    } else {
        false
    }
}
