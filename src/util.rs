use std::f32::consts::PI;

use float_ord::FloatOrd;
use geo::{BoundingRect, Coord, MinimumRotatedRect, MultiPoint, Rect};
use tracing::instrument;

/// Distance between two axis-aligned rectangles, 0 when they touch or overlap.
///
/// Diagonally separated boxes measure corner to corner, boxes separated along
/// a single axis measure edge to edge.
pub fn rect_distance(a: &Rect<f32>, b: &Rect<f32>) -> f32 {
    let (a_min, a_max) = (a.min(), a.max());
    let (b_min, b_max) = (b.min(), b.max());

    let left = b_max.x < a_min.x;
    let right = a_max.x < b_min.x;
    let bottom = b_max.y < a_min.y;
    let top = a_max.y < b_min.y;

    let dist = |p: (f32, f32), q: (f32, f32)| (p.0 - q.0).hypot(p.1 - q.1);
    match (left, right, bottom, top) {
        (true, _, _, true) => dist((a_min.x, a_max.y), (b_max.x, b_min.y)),
        (true, _, true, _) => dist((a_min.x, a_min.y), (b_max.x, b_max.y)),
        (_, true, true, _) => dist((a_max.x, a_min.y), (b_min.x, b_max.y)),
        (_, true, _, true) => dist((a_max.x, a_max.y), (b_min.x, b_min.y)),
        (true, _, _, _) => a_min.x - b_max.x,
        (_, true, _, _) => b_min.x - a_max.x,
        (_, _, true, _) => a_min.y - b_max.y,
        (_, _, _, true) => b_min.y - a_max.y,
        _ => 0.0,
    }
}

pub(crate) fn to_multi_point(points: &[Coord<f32>]) -> MultiPoint<f32> {
    MultiPoint::from(points.iter().map(|it| (it.x, it.y)).collect::<Vec<_>>())
}

pub(crate) fn rect_corners(rect: &Rect<f32>) -> [Coord<f32>; 4] {
    let (min, max) = (rect.min(), rect.max());
    [
        min,
        Coord { x: max.x, y: min.y },
        max,
        Coord { x: min.x, y: max.y },
    ]
}

pub(crate) fn axis_aligned_bounds(points: &[Coord<f32>]) -> Option<[Coord<f32>; 4]> {
    to_multi_point(points)
        .bounding_rect()
        .map(|rect| rect_corners(&rect))
}

#[instrument(level = "trace", skip(points))]
pub(crate) fn minimum_area_bounds(points: &[Coord<f32>]) -> Option<[Coord<f32>; 4]> {
    let rect = to_multi_point(points).minimum_rotated_rect()?;
    let corners: Vec<Coord<f32>> = rect.exterior().coords().take(4).copied().collect();
    let corners: [Coord<f32>; 4] = corners.try_into().ok()?;
    log::trace!("Minimum rotated rect corners: {corners:?}");
    Some(order_corners(corners))
}

/// Reorders four corners clockwise in image space (y pointing down), starting
/// from the corner closest to the top-left.
pub(crate) fn order_corners(corners: [Coord<f32>; 4]) -> [Coord<f32>; 4] {
    let center = corners.iter().fold(Coord::zero(), |acc, it| acc + *it) / 4.0;

    let mut sorted = corners;
    sorted.sort_by_key(|it| {
        let angle = (it.y - center.y).atan2(it.x - center.x);
        FloatOrd(if angle < -PI / 2.0 {
            angle + 2.0 * PI
        } else {
            angle
        })
    });

    let start = sorted
        .iter()
        .enumerate()
        .min_by_key(|(_, it)| (FloatOrd(it.x + it.y), FloatOrd(it.x)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    sorted.rotate_left(start);
    sorted
}
