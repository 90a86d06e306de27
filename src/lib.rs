//! COCO / CVAT to YOLO label converter
//!
//! This library turns instance annotations (COCO polygons and RLE masks, CVAT polygons,
//! boxes and masks) into YOLO bounding-box label files, and packages YOLO class folders
//! into an archive CVAT can re-import.

pub mod coco;
pub mod coco_dataset;
pub mod config;
pub mod conversion;
pub mod cvat;
pub mod cvat_dataset;
pub mod geometry;
pub mod io;
pub mod mask;
pub mod reimport;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use config::{BoxSource, CocoArgs, CvatArgs, FrameNaming, ReimportArgs};
pub use geometry::{normalize, FrameSize, GeometryError, NormalizedBox, PixelBox, Shape};
pub use mask::{decode_compressed_counts, decode_runs, MaskError, OccupancyMask, RunOrder};
pub use types::{ProcessingStats, YoloLabel};

// Pipelines
pub use coco_dataset::process_coco_dataset;
pub use cvat_dataset::process_cvat_dataset;
pub use reimport::{organize_for_cvat, ReimportSummary};
