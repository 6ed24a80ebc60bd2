use std::cmp::Reverse;

use float_ord::FloatOrd;
use geo::Coord;

use crate::{
    error::{MergeError, Result},
    quad::{Direction, Quadrilateral, Rgb},
    util::{axis_aligned_bounds, minimum_area_bounds},
};

/// A group of text lines that read as one block, stored in reading order.
#[derive(Debug, Clone)]
pub struct TextRegion {
    lines: Vec<Quadrilateral>,
    direction: Direction,
    bounds: [Coord<f32>; 4],
}

impl TextRegion {
    /// Builds a region from its member lines, which must all have valid geometry.
    ///
    /// Members are put in reading order: horizontal regions read rows top to
    /// bottom and each row left to right, vertical regions read columns left to
    /// right and each column top to bottom. Centroids within half the smallest
    /// member font size of each other share a row or column.
    pub fn new(lines: Vec<Quadrilateral>) -> Result<Self> {
        let bounds = bounding_shape(&lines)?;
        let direction = majority_direction(&lines, &bounds)?;
        let lines = reading_order(lines, direction)?;

        Ok(Self {
            lines,
            direction,
            bounds,
        })
    }

    pub fn lines(&self) -> &[Quadrilateral] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<Quadrilateral> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Representative shape, ordered clockwise from the top-left corner.
    ///
    /// Axis-aligned bounding box when every member is axis aligned, minimum-area
    /// rotated rectangle otherwise.
    pub fn bounds(&self) -> &[Coord<f32>; 4] {
        &self.bounds
    }

    pub fn foreground(&self) -> Rgb {
        self.pick_color(|it| it.foreground)
    }

    pub fn background(&self) -> Rgb {
        self.pick_color(|it| it.background)
    }

    // Colors are never blended: the most confident member with a color wins.
    fn pick_color(&self, color: impl Fn(&Quadrilateral) -> Rgb) -> Rgb {
        self.lines
            .iter()
            .filter(|it| color(*it).is_set())
            .min_by_key(|it| Reverse(FloatOrd(it.confidence)))
            .map(|it| color(it))
            .unwrap_or(Rgb::UNSET)
    }
}

/// Fraction of the smallest member font size within which centroids share a
/// row (horizontal) or a column (vertical).
const BAND_TOLERANCE: f32 = 0.5;

/// Sorts members into bands across the reading direction, then along it.
///
/// A band is anchored at its first member; later members join while their
/// centroid stays within the tolerance of that anchor. Exact ties keep the
/// incoming order.
fn reading_order(lines: Vec<Quadrilateral>, direction: Direction) -> Result<Vec<Quadrilateral>> {
    let mut tolerance = f32::INFINITY;
    for line in &lines {
        tolerance = tolerance.min(line.font_size()?);
    }
    let tolerance = tolerance * BAND_TOLERANCE;

    // (across, along): across picks the band, along orders within it
    let mut keyed = lines
        .into_iter()
        .map(|it| {
            let c = it.centroid();
            let key = match direction {
                Direction::Horizontal => (c.y, c.x),
                Direction::Vertical => (c.x, c.y),
            };
            (key, it)
        })
        .collect::<Vec<_>>();
    keyed.sort_by_key(|((across, along), _)| (FloatOrd(*across), FloatOrd(*along)));

    let mut bands: Vec<Vec<((f32, f32), Quadrilateral)>> = Vec::new();
    for item in keyed {
        let across = item.0 .0;
        match bands.last_mut() {
            Some(band) if across - band[0].0 .0 < tolerance => band.push(item),
            _ => bands.push(vec![item]),
        }
    }
    log::trace!("Reading order uses {} bands", bands.len());

    Ok(bands
        .into_iter()
        .flat_map(|mut band| {
            band.sort_by_key(|((_, along), _)| FloatOrd(*along));
            band.into_iter().map(|(_, it)| it)
        })
        .collect())
}

fn bounding_shape(lines: &[Quadrilateral]) -> Result<[Coord<f32>; 4]> {
    let points = lines
        .iter()
        .flat_map(|it| it.points().iter().copied())
        .collect::<Vec<_>>();

    let mut axis_aligned = true;
    for line in lines {
        axis_aligned &= line.is_axis_aligned()?;
    }

    let bounds = if axis_aligned {
        axis_aligned_bounds(&points)
    } else {
        minimum_area_bounds(&points)
    };
    bounds.ok_or_else(|| MergeError::DegenerateGeometry("region has no bounding shape".to_string()))
}

fn majority_direction(lines: &[Quadrilateral], bounds: &[Coord<f32>; 4]) -> Result<Direction> {
    let mut vertical = 0usize;
    for line in lines {
        if line.effective_direction()? == Direction::Vertical {
            vertical += 1;
        }
    }
    let horizontal = lines.len() - vertical;

    Ok(match vertical.cmp(&horizontal) {
        std::cmp::Ordering::Greater => Direction::Vertical,
        std::cmp::Ordering::Less => Direction::Horizontal,
        std::cmp::Ordering::Equal => Quadrilateral::new(*bounds).direction()?,
    })
}
