//! Bounding-box extraction and YOLO-style normalization
//!
//! Every converter in this crate funnels its shapes through [`normalize`]: a shape is
//! either a decoded occupancy mask or a list of pixel-space boundary points, and the
//! result is the enclosing axis-aligned box in normalized center/size form.

use thiserror::Error;

use crate::mask::OccupancyMask;

/// Precondition failures reported by the shape and frame constructors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid frame size {width}x{height}: both sides must be positive")]
    InvalidFrame { width: u32, height: u32 },
    #[error("malformed shape: {0}")]
    MalformedShape(String),
}

/// Pixel dimensions of the image a shape is defined on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    width: u32,
    height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 {
            return Err(GeometryError::InvalidFrame { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Axis-aligned box in pixel space, extents inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl PixelBox {
    /// Express the box relative to the frame as (center, size).
    ///
    /// No clamping is applied, so boxes reaching outside the frame produce values
    /// outside `[0, 1]`.
    pub fn normalize(&self, frame: FrameSize) -> NormalizedBox {
        let width = frame.width as f64;
        let height = frame.height as f64;
        NormalizedBox {
            x_center: (self.x_min + self.x_max) / 2.0 / width,
            y_center: (self.y_min + self.y_max) / 2.0 / height,
            width: (self.x_max - self.x_min) / width,
            height: (self.y_max - self.y_min) / height,
        }
    }
}

/// Bounding box in normalized YOLO form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    /// Undo [`PixelBox::normalize`] for the given frame
    pub fn to_pixel_box(&self, frame: FrameSize) -> PixelBox {
        let frame_width = frame.width as f64;
        let frame_height = frame.height as f64;
        let half_width = self.width * frame_width / 2.0;
        let half_height = self.height * frame_height / 2.0;
        let cx = self.x_center * frame_width;
        let cy = self.y_center * frame_height;
        PixelBox {
            x_min: cx - half_width,
            y_min: cy - half_height,
            x_max: cx + half_width,
            y_max: cy + half_height,
        }
    }
}

/// A shape in one of the two representations the converters produce
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    Mask(&'a OccupancyMask),
    Polygon(&'a [(f64, f64)]),
}

impl<'a> Shape<'a> {
    pub fn mask(mask: &'a OccupancyMask) -> Self {
        Shape::Mask(mask)
    }

    /// Wrap a boundary polygon, rejecting anything with fewer than three vertices
    pub fn polygon(points: &'a [(f64, f64)]) -> Result<Self, GeometryError> {
        if points.len() < 3 {
            return Err(GeometryError::MalformedShape(format!(
                "polygon needs at least 3 points, got {}",
                points.len()
            )));
        }
        Ok(Shape::Polygon(points))
    }

    /// Minimal pixel-space box around the shape, `None` for an empty mask
    pub fn pixel_bounds(&self) -> Option<PixelBox> {
        match self {
            Shape::Mask(mask) => mask_bounds(mask),
            Shape::Polygon(points) => Some(polygon_bounds(points)),
        }
    }
}

/// Bounding box of `shape` normalized to `frame`.
///
/// Returns `None` when the shape covers nothing (an all-false mask); callers emit no
/// annotation in that case.
pub fn normalize(shape: &Shape, frame: FrameSize) -> Option<NormalizedBox> {
    shape.pixel_bounds().map(|bounds| bounds.normalize(frame))
}

fn mask_bounds(mask: &OccupancyMask) -> Option<PixelBox> {
    let columns = mask.column_projection();
    let rows = mask.row_projection();

    let (x_min, x_max) = first_and_last(&columns)?;
    let (y_min, y_max) = first_and_last(&rows)?;

    Some(PixelBox {
        x_min: x_min as f64,
        y_min: y_min as f64,
        x_max: x_max as f64,
        y_max: y_max as f64,
    })
}

fn first_and_last(projection: &[bool]) -> Option<(usize, usize)> {
    let first = projection.iter().position(|&occupied| occupied)?;
    let last = projection.iter().rposition(|&occupied| occupied)?;
    Some((first, last))
}

fn polygon_bounds(points: &[(f64, f64)]) -> PixelBox {
    let (x_min, y_min, x_max, y_max) = points.iter().fold(
        (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
        |(x_min, y_min, x_max, y_max), &(x, y)| {
            (x_min.min(x), y_min.min(y), x_max.max(x), y_max.max(y))
        },
    );
    PixelBox {
        x_min,
        y_min,
        x_max,
        y_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_box_eq(actual: NormalizedBox, expected: (f64, f64, f64, f64)) {
        assert!((actual.x_center - expected.0).abs() < EPS, "{:?}", actual);
        assert!((actual.y_center - expected.1).abs() < EPS, "{:?}", actual);
        assert!((actual.width - expected.2).abs() < EPS, "{:?}", actual);
        assert!((actual.height - expected.3).abs() < EPS, "{:?}", actual);
    }

    fn frame(width: u32, height: u32) -> FrameSize {
        FrameSize::new(width, height).unwrap()
    }

    #[test]
    fn test_rectangle_polygon() {
        let points = [(10.0, 10.0), (50.0, 10.0), (50.0, 40.0), (10.0, 40.0)];
        let shape = Shape::polygon(&points).unwrap();
        let bbox = normalize(&shape, frame(100, 100)).unwrap();
        assert_box_eq(bbox, (0.30, 0.25, 0.40, 0.30));
    }

    #[test]
    fn test_triangle_covering_frame() {
        let points = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0)];
        let shape = Shape::polygon(&points).unwrap();
        let bbox = normalize(&shape, frame(100, 100)).unwrap();
        assert_box_eq(bbox, (0.5, 0.5, 1.0, 1.0));
    }

    #[test]
    fn test_polygon_point_order_is_irrelevant() {
        let points = [(12.5, 3.0), (80.0, 44.0), (40.0, 90.0), (5.0, 60.0)];
        let reversed: Vec<_> = points.iter().rev().copied().collect();
        let rotated = [points[2], points[3], points[0], points[1]];

        let expected = normalize(&Shape::polygon(&points).unwrap(), frame(120, 100));
        assert_eq!(normalize(&Shape::polygon(&reversed).unwrap(), frame(120, 100)), expected);
        assert_eq!(normalize(&Shape::polygon(&rotated).unwrap(), frame(120, 100)), expected);
    }

    #[test]
    fn test_polygon_relations_hold() {
        let points = [(3.0, 7.0), (91.5, 20.25), (47.0, 63.0), (11.0, 50.0)];
        let size = frame(128, 72);
        let bbox = normalize(&Shape::polygon(&points).unwrap(), size).unwrap();

        assert!((bbox.x_center * 2.0 * 128.0 - (3.0 + 91.5)).abs() < EPS);
        assert!((bbox.y_center * 2.0 * 72.0 - (7.0 + 63.0)).abs() < EPS);
        assert!((bbox.width * 128.0 - (91.5 - 3.0)).abs() < EPS);
        assert!((bbox.height * 72.0 - (63.0 - 7.0)).abs() < EPS);
    }

    #[test]
    fn test_polygon_outside_frame_is_not_clamped() {
        let points = [(-20.0, 10.0), (150.0, 10.0), (150.0, 30.0)];
        let bbox = normalize(&Shape::polygon(&points).unwrap(), frame(100, 100)).unwrap();
        assert!(bbox.width > 1.0);
        assert!((bbox.x_center - 0.65).abs() < EPS);
    }

    #[test]
    fn test_short_polygon_is_rejected() {
        let points = [(0.0, 0.0), (1.0, 1.0)];
        assert!(matches!(
            Shape::polygon(&points),
            Err(GeometryError::MalformedShape(_))
        ));
    }

    #[test]
    fn test_zero_sized_frame_is_rejected() {
        assert_eq!(
            FrameSize::new(0, 10),
            Err(GeometryError::InvalidFrame {
                width: 0,
                height: 10
            })
        );
        assert!(FrameSize::new(10, 0).is_err());
        assert!(FrameSize::new(1, 1).is_ok());
    }

    #[test]
    fn test_empty_mask_has_no_box() {
        let mask = OccupancyMask::new(10, 10);
        assert_eq!(normalize(&Shape::mask(&mask), frame(10, 10)), None);
    }

    #[test]
    fn test_single_pixel_mask() {
        let mut mask = OccupancyMask::new(10, 8);
        mask.set(3, 5, true);
        let bbox = normalize(&Shape::mask(&mask), frame(10, 8)).unwrap();
        assert_box_eq(bbox, (0.3, 5.0 / 8.0, 0.0, 0.0));
    }

    #[test]
    fn test_mask_extents_round_trip() {
        let mut mask = OccupancyMask::new(20, 15);
        for (x, y) in [(4, 2), (17, 9), (9, 13), (5, 5)] {
            mask.set(x, y, true);
        }
        let size = frame(20, 15);
        let bbox = normalize(&Shape::mask(&mask), size).unwrap();
        let pixels = bbox.to_pixel_box(size);

        assert!((pixels.x_min - 4.0).abs() < EPS);
        assert!((pixels.x_max - 17.0).abs() < EPS);
        assert!((pixels.y_min - 2.0).abs() < EPS);
        assert!((pixels.y_max - 13.0).abs() < EPS);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut mask = OccupancyMask::new(6, 6);
        mask.set(1, 1, true);
        mask.set(4, 2, true);
        let shape = Shape::mask(&mask);
        assert_eq!(normalize(&shape, frame(6, 6)), normalize(&shape, frame(6, 6)));
    }
}
