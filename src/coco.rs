//! COCO format data structures
//!
//! Only the parts of the schema needed to compute boxes are modelled; unknown fields
//! (info, licenses, area, ...) are ignored during deserialization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::geometry::GeometryError;
use crate::mask::{decode_compressed_counts, decode_runs, MaskError, OccupancyMask, RunOrder};

/// COCO category information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: String,
}

/// COCO image information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Run-length counts, either as a list or in COCO's compressed string form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    Uncompressed(Vec<u32>),
    Compressed(String),
}

/// Run-length encoded segmentation; `size` is `[height, width]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RleSegmentation {
    pub size: [u32; 2],
    pub counts: RleCounts,
}

impl RleSegmentation {
    pub fn height(&self) -> u32 {
        self.size[0]
    }

    pub fn width(&self) -> u32 {
        self.size[1]
    }

    /// Decode into an occupancy mask of `width x height`
    pub fn decode(&self) -> Result<OccupancyMask, MaskError> {
        let width = self.width() as usize;
        let height = self.height() as usize;
        match &self.counts {
            RleCounts::Uncompressed(counts) => {
                decode_runs(counts, width, height, RunOrder::ColumnMajor)
            }
            RleCounts::Compressed(encoded) => {
                let counts = decode_compressed_counts(encoded)?;
                decode_runs(&counts, width, height, RunOrder::ColumnMajor)
            }
        }
    }
}

/// Object outline: a list of flat `[x1, y1, x2, y2, ...]` rings, or a mask
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    Polygons(Vec<Vec<f64>>),
    Rle(RleSegmentation),
}

/// COCO annotation information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>, // [x, y, width, height]
    #[serde(default)]
    pub iscrowd: u8,
}

impl Annotation {
    /// Polygon rings as point lists. Empty when the segmentation is missing or is a mask.
    pub fn polygon_rings(&self) -> Result<Vec<Vec<(f64, f64)>>, GeometryError> {
        match &self.segmentation {
            Some(Segmentation::Polygons(rings)) => rings
                .iter()
                .filter(|ring| !ring.is_empty())
                .map(|ring| flat_to_points(ring))
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    /// Corners of the `bbox` rectangle, if the annotation carries a well-formed one
    pub fn bbox_corners(&self) -> Option<[(f64, f64); 4]> {
        match self.bbox.as_deref() {
            Some(&[x, y, w, h]) => Some([(x, y), (x + w, y), (x + w, y + h), (x, y + h)]),
            _ => None,
        }
    }
}

/// Turn `[x1, y1, x2, y2, ...]` into `[(x1, y1), (x2, y2), ...]`
pub fn flat_to_points(flat: &[f64]) -> Result<Vec<(f64, f64)>, GeometryError> {
    if flat.len() % 2 != 0 {
        return Err(GeometryError::MalformedShape(format!(
            "polygon has an odd number of coordinates ({})",
            flat.len()
        )));
    }
    Ok(flat.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect())
}

/// Complete COCO dataset structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoFile {
    #[serde(default)]
    pub categories: Vec<Category>,
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl CocoFile {
    /// Annotations grouped by their image id, in file order
    pub fn annotations_by_image(&self) -> HashMap<u64, Vec<&Annotation>> {
        let mut grouped: HashMap<u64, Vec<&Annotation>> = HashMap::new();
        for annotation in &self.annotations {
            grouped.entry(annotation.image_id).or_default().push(annotation);
        }
        grouped
    }

    /// Map category ids to contiguous 0-based class ids in ascending id order
    pub fn contiguous_category_ids(&self) -> HashMap<u64, u64> {
        let mut ids: Vec<u64> = self.categories.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .enumerate()
            .map(|(index, id)| (id, index as u64))
            .collect()
    }
}
