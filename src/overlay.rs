use geo::Coord;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_polygon_mut, point::Point};
use tracing::instrument;

use crate::TextRegion;

const LINE_COLOR: Rgb<u8> = Rgb([0, 160, 255]);
const REGION_COLOR: Rgb<u8> = Rgb([255, 48, 48]);

/// Draws member lines and region outlines on top of a copy of `image`.
#[instrument(skip(image, regions), level = "debug")]
pub fn draw_regions(image: &DynamicImage, regions: &[TextRegion]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for region in regions {
        for line in region.lines() {
            draw_outline(&mut canvas, line.points(), LINE_COLOR);
        }
        draw_outline(&mut canvas, region.bounds(), REGION_COLOR);
    }
    canvas
}

fn draw_outline(canvas: &mut RgbImage, corners: &[Coord<f32>; 4], color: Rgb<u8>) {
    let poly = corners
        .iter()
        .map(|it| Point::new(it.x, it.y))
        .collect::<Vec<_>>();
    // imageproc refuses polygons whose first and last points coincide
    if poly[0] == poly[3] {
        log::trace!("Not drawing collapsed outline {corners:?}");
        return;
    }
    draw_hollow_polygon_mut(canvas, &poly, color);
}
