//! Occupancy masks and the run-length codecs that produce them
//!
//! COCO stores masks as runs in column-major (Fortran) order, either as a plain list
//! of counts or as the compact string form written by the COCO mask API. CVAT stores
//! runs in row-major order over the mask's own bounding region. Polygons can also be
//! rasterized into a mask when the box should reflect covered pixels rather than
//! vertex extents.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaskError {
    #[error("run lengths cover {actual} pixels but the mask only has {expected}")]
    RunsOverflow { expected: usize, actual: usize },
    #[error("invalid compressed RLE counts: {0}")]
    InvalidCompressedCounts(String),
    #[error("mask is {mask_width}x{mask_height} but the frame is {frame_width}x{frame_height}")]
    SizeMismatch {
        mask_width: usize,
        mask_height: usize,
        frame_width: usize,
        frame_height: usize,
    },
}

/// Traversal order of run-length counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOrder {
    /// Column by column, top to bottom (COCO)
    ColumnMajor,
    /// Row by row, left to right (CVAT)
    RowMajor,
}

/// Two-dimensional boolean grid, `true` where the shape covers a pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyMask {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl OccupancyMask {
    /// All-false mask of the given size
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    /// Build a mask from explicit rows; every row must have the same length
    pub fn from_rows(rows: &[Vec<bool>]) -> Result<Self, MaskError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(MaskError::SizeMismatch {
                mask_width: row.len(),
                mask_height: height,
                frame_width: width,
                frame_height: height,
            });
        }
        Ok(Self {
            width,
            height,
            cells: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Occupancy at (x, y); out-of-range positions are unoccupied
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.cells[y * self.width + x]
    }

    /// Set occupancy at (x, y); out-of-range positions are ignored
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = value;
        }
    }

    /// Number of occupied pixels
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&cell| cell)
    }

    /// Logical OR down each column, one entry per x
    pub fn column_projection(&self) -> Vec<bool> {
        let mut projection = vec![false; self.width];
        for row in self.cells.chunks(self.width.max(1)) {
            for (occupied, &cell) in projection.iter_mut().zip(row) {
                *occupied |= cell;
            }
        }
        projection
    }

    /// Logical OR along each row, one entry per y
    pub fn row_projection(&self) -> Vec<bool> {
        if self.width == 0 {
            return vec![false; self.height];
        }
        self.cells
            .chunks(self.width)
            .map(|row| row.iter().any(|&cell| cell))
            .collect()
    }

    /// OR `other` into this mask with its top-left corner at (left, top).
    /// Pixels falling outside this mask are dropped.
    pub fn paint(&mut self, other: &OccupancyMask, left: usize, top: usize) {
        for y in 0..other.height {
            for x in 0..other.width {
                if other.cells[y * other.width + x] {
                    self.set(left + x, top + y, true);
                }
            }
        }
    }
}

/// Expand alternating background/foreground run lengths into a mask.
///
/// The first count is background and may be zero. Counts that stop short of the
/// full grid leave the remaining pixels as background.
pub fn decode_runs(
    counts: &[u32],
    width: usize,
    height: usize,
    order: RunOrder,
) -> Result<OccupancyMask, MaskError> {
    let total = width * height;
    let covered: usize = counts.iter().map(|&count| count as usize).sum();
    if covered > total {
        return Err(MaskError::RunsOverflow {
            expected: total,
            actual: covered,
        });
    }

    let mut mask = OccupancyMask::new(width, height);
    let mut position = 0usize;
    for (index, &count) in counts.iter().enumerate() {
        let count = count as usize;
        if index % 2 == 1 {
            for linear in position..position + count {
                let (x, y) = match order {
                    RunOrder::ColumnMajor => (linear / height, linear % height),
                    RunOrder::RowMajor => (linear % width, linear / width),
                };
                mask.cells[y * width + x] = true;
            }
        }
        position += count;
    }
    Ok(mask)
}

/// Decode the compact string form of COCO run-length counts.
///
/// Each count is a little-endian sequence of 5-bit groups stored as `char - 48`,
/// with bit 5 as the continuation flag and bit 4 of the final group as the sign.
/// From the fourth count on, values are stored as the difference to the count two
/// positions earlier.
pub fn decode_compressed_counts(encoded: &str) -> Result<Vec<u32>, MaskError> {
    let bytes = encoded.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut position = 0;

    while position < bytes.len() {
        let mut value: i64 = 0;
        let mut shift = 0;
        loop {
            let byte = *bytes.get(position).ok_or_else(|| {
                MaskError::InvalidCompressedCounts("truncated count".to_string())
            })?;
            if !(48..48 + 64).contains(&byte) {
                return Err(MaskError::InvalidCompressedCounts(format!(
                    "unexpected character {:?} at offset {}",
                    byte as char, position
                )));
            }
            let group = (byte - 48) as i64;
            value |= (group & 0x1f) << shift;
            position += 1;
            shift += 5;
            if group & 0x20 == 0 {
                if group & 0x10 != 0 {
                    value |= -1i64 << shift;
                }
                break;
            }
            if shift > 55 {
                return Err(MaskError::InvalidCompressedCounts(
                    "count does not fit in 64 bits".to_string(),
                ));
            }
        }

        if counts.len() > 2 {
            value += counts[counts.len() - 2] as i64;
        }
        let count = u32::try_from(value).map_err(|_| {
            MaskError::InvalidCompressedCounts(format!(
                "count {} at index {} is out of range",
                value,
                counts.len()
            ))
        })?;
        counts.push(count);
    }

    Ok(counts)
}

/// Fill a polygon into a `width x height` mask.
///
/// A pixel is covered when its center lies inside the polygon under the even-odd
/// rule. Vertices may lie outside the frame; the fill is clipped.
pub fn rasterize_polygon(points: &[(f64, f64)], width: usize, height: usize) -> OccupancyMask {
    let mut mask = OccupancyMask::new(width, height);
    if points.len() < 3 {
        return mask;
    }

    let mut crossings: Vec<f64> = Vec::with_capacity(points.len());
    for y in 0..height {
        let scan_y = y as f64 + 0.5;
        crossings.clear();

        for (i, &(x0, y0)) in points.iter().enumerate() {
            let (x1, y1) = points[(i + 1) % points.len()];
            if (y0 > scan_y) != (y1 > scan_y) {
                crossings.push(x0 + (scan_y - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for span in crossings.chunks_exact(2) {
            let start = (span[0] - 0.5).ceil().max(0.0) as usize;
            let end = ((span[1] - 0.5).ceil().max(0.0) as usize).min(width);
            for x in start..end {
                mask.cells[y * width + x] = true;
            }
        }
    }

    mask
}
