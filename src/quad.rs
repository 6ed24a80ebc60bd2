use std::{cell::OnceCell, f32::consts::PI};

use geo::{Area, ConvexHull, Coord, EuclideanDistance, Line, Polygon, Rect};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MergeError, Result},
    util::to_multi_point,
};

const STRICT_AXIS_TOLERANCE: f32 = 1e-2;
const LOOSE_AXIS_TOLERANCE: f32 = 0.05;
const VALID_ANGLE_TOLERANCE_DEG: f32 = 10.0;
const MIN_EXTENT: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "h", alias = "horizontal")]
    Horizontal,
    #[serde(rename = "v", alias = "vertical")]
    Vertical,
}

/// RGB triple where `(0, 0, 0)` doubles as "unset".
///
/// Real black text is indistinguishable from a missing color; the sentinel is
/// kept because every stage of the pipeline agrees on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const UNSET: Rgb = Rgb([0, 0, 0]);

    pub fn is_set(&self) -> bool {
        *self != Self::UNSET
    }

    pub fn from_wire(value: Option<[u8; 3]>) -> Self {
        value.map(Rgb).unwrap_or(Self::UNSET)
    }

    pub fn to_wire(self) -> Option<[u8; 3]> {
        self.is_set().then_some(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Features {
    valid: bool,
    aspect_ratio: f32,
    font_size: f32,
    axis_aligned: bool,
    approximately_axis_aligned: bool,
    direction: Direction,
    angle: f32,
}

/// One detected text line: four corner points in pixel space plus whatever
/// the upstream detector and OCR stages attached to it.
///
/// Points are conventionally ordered top-left, top-right, bottom-right,
/// bottom-left. Every geometric feature is derived from the points on first
/// access and cached; [`Quadrilateral::clip`] is the only way to move the
/// points and it drops the cache.
#[derive(Debug, Clone)]
pub struct Quadrilateral {
    points: [Coord<f32>; 4],
    pub text: String,
    pub confidence: f32,
    pub foreground: Rgb,
    pub background: Rgb,
    pub assigned_direction: Option<Direction>,
    features: OnceCell<Result<Features>>,
    hull: OnceCell<Polygon<f32>>,
}

impl Quadrilateral {
    pub fn new(points: [Coord<f32>; 4]) -> Self {
        Self {
            points,
            text: String::new(),
            confidence: 0.0,
            foreground: Rgb::UNSET,
            background: Rgb::UNSET,
            assigned_direction: None,
            features: OnceCell::new(),
            hull: OnceCell::new(),
        }
    }

    pub fn from_points(points: &[(f32, f32)]) -> Result<Self> {
        let points: [(f32, f32); 4] = points
            .try_into()
            .map_err(|_| MergeError::Shape(points.len()))?;
        Ok(Self::new(points.map(|(x, y)| Coord { x, y })))
    }

    /// Axis-aligned box with its top-left corner at `(x, y)`.
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new([
            Coord { x, y },
            Coord { x: x + width, y },
            Coord {
                x: x + width,
                y: y + height,
            },
            Coord { x, y: y + height },
        ])
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_colors(mut self, foreground: Rgb, background: Rgb) -> Self {
        self.foreground = foreground;
        self.background = background;
        self
    }

    pub fn with_direction(mut self, direction: Option<Direction>) -> Self {
        self.assigned_direction = direction;
        self
    }

    pub fn points(&self) -> &[Coord<f32>; 4] {
        &self.points
    }

    /// Rounds every coordinate and clamps it into `[0, width] x [0, height]`.
    pub fn clip(&mut self, width: u32, height: u32) {
        for point in self.points.iter_mut() {
            point.x = point.x.round().clamp(0.0, width as f32);
            point.y = point.y.round().clamp(0.0, height as f32);
        }
        self.features = OnceCell::new();
        self.hull = OnceCell::new();
    }

    /// The two segments joining midpoints of opposite edges: `[vertical, horizontal]`.
    ///
    /// The vertical one runs from the middle of the top edge to the middle of the
    /// bottom edge, the horizontal one from the middle of the right edge to the
    /// middle of the left edge.
    pub fn structure(&self) -> [Line<f32>; 2] {
        let [p0, p1, p2, p3] = self.points;
        let mid = |a: Coord<f32>, b: Coord<f32>| (a + b) / 2.0;
        [
            Line::new(mid(p0, p1), mid(p2, p3)),
            Line::new(mid(p1, p2), mid(p3, p0)),
        ]
    }

    fn features(&self) -> Result<&Features> {
        self.features
            .get_or_init(|| compute_features(self))
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn valid(&self) -> Result<bool> {
        Ok(self.features()?.valid)
    }

    /// Horizontal structure length over vertical structure length.
    pub fn aspect_ratio(&self) -> Result<f32> {
        Ok(self.features()?.aspect_ratio)
    }

    pub fn font_size(&self) -> Result<f32> {
        Ok(self.features()?.font_size)
    }

    pub fn is_axis_aligned(&self) -> Result<bool> {
        Ok(self.features()?.axis_aligned)
    }

    pub fn is_approximately_axis_aligned(&self) -> Result<bool> {
        Ok(self.features()?.approximately_axis_aligned)
    }

    /// Direction derived from geometry alone.
    pub fn direction(&self) -> Result<Direction> {
        Ok(self.features()?.direction)
    }

    /// The assigned direction when there is one, otherwise the derived one.
    pub fn effective_direction(&self) -> Result<Direction> {
        match self.assigned_direction {
            Some(direction) => Ok(direction),
            None => self.direction(),
        }
    }

    /// Orientation of the vertical structure segment, in `[0, PI)`.
    pub fn angle(&self) -> Result<f32> {
        Ok(self.features()?.angle)
    }

    pub fn centroid(&self) -> Coord<f32> {
        self.points.iter().fold(Coord::zero(), |acc, it| acc + *it) / 4.0
    }

    pub fn polygon(&self) -> &Polygon<f32> {
        self.hull.get_or_init(|| convex_hull(&self.points))
    }

    pub fn area(&self) -> f32 {
        self.polygon().unsigned_area()
    }

    pub fn poly_distance(&self, other: &Quadrilateral) -> f32 {
        self.polygon().euclidean_distance(other.polygon())
    }

    pub fn aabb(&self) -> Rect<f32> {
        let (min, max) = self.points.iter().skip(1).fold(
            (self.points[0], self.points[0]),
            |(min, max), it| {
                (
                    Coord {
                        x: min.x.min(it.x),
                        y: min.y.min(it.y),
                    },
                    Coord {
                        x: max.x.max(it.x),
                        y: max.y.max(it.y),
                    },
                )
            },
        );
        Rect::new(min, max)
    }
}

fn convex_hull(points: &[Coord<f32>]) -> Polygon<f32> {
    to_multi_point(points).convex_hull()
}

fn to_vector(line: &Line<f32>) -> Vector2<f32> {
    let delta = line.delta();
    Vector2::new(delta.x, delta.y)
}

fn compute_features(quad: &Quadrilateral) -> Result<Features> {
    let points = &quad.points;
    if points.iter().any(|it| !it.x.is_finite() || !it.y.is_finite()) {
        return Err(MergeError::DegenerateGeometry(
            "non-finite coordinate".to_string(),
        ));
    }
    for i in 0..4 {
        let edge = Line::new(points[i], points[(i + 1) % 4]);
        if to_vector(&edge).norm() < MIN_EXTENT {
            return Err(MergeError::DegenerateGeometry(format!(
                "edge {i} has zero length"
            )));
        }
    }
    if convex_hull(points).unsigned_area() < MIN_EXTENT {
        return Err(MergeError::DegenerateGeometry("zero area".to_string()));
    }

    let [vertical, horizontal] = quad.structure();
    let v1 = to_vector(&vertical);
    let v2 = to_vector(&horizontal);
    let (len1, len2) = (v1.norm(), v2.norm());
    if len1 < MIN_EXTENT || len2 < MIN_EXTENT {
        return Err(MergeError::DegenerateGeometry(
            "zero-length structure segment".to_string(),
        ));
    }
    let u1 = v1 / len1;
    let u2 = v2 / len2;

    let crossing = u1.dot(&u2).clamp(-1.0, 1.0).acos().to_degrees();
    let near_axis = |u: &Vector2<f32>, tol: f32| u.x.abs() < tol || u.y.abs() < tol;
    let angle = (u1.x.clamp(-1.0, 1.0).acos() + PI) % PI;

    Ok(Features {
        valid: (crossing - 90.0).abs() < VALID_ANGLE_TOLERANCE_DEG,
        aspect_ratio: len2 / len1,
        font_size: len1.min(len2),
        axis_aligned: near_axis(&u1, STRICT_AXIS_TOLERANCE),
        approximately_axis_aligned: near_axis(&u1, LOOSE_AXIS_TOLERANCE)
            || near_axis(&u2, LOOSE_AXIS_TOLERANCE),
        direction: if len1 > len2 {
            Direction::Vertical
        } else {
            Direction::Horizontal
        },
        angle,
    })
}
