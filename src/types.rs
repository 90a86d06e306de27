use std::collections::HashSet;
use std::fmt::Write;
use std::sync::OnceLock;

use crate::geometry::NormalizedBox;

// Image formats packaged for CVAT re-import
pub const IMG_FORMATS: &[&str] = &["jpg", "jpeg", "png"];

// Precomputed HashSet of image extensions for fast lookup
pub static IMAGE_EXTENSIONS_SET: OnceLock<HashSet<String>> = OnceLock::new();

/// Get the image extensions set
pub fn get_image_extensions_set() -> &'static HashSet<String> {
    IMAGE_EXTENSIONS_SET.get_or_init(|| IMG_FORMATS.iter().map(|ext| ext.to_lowercase()).collect())
}

/// One line of a YOLO label file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloLabel {
    pub class_id: u64,
    pub bbox: NormalizedBox,
}

impl YoloLabel {
    pub fn new(class_id: u64, bbox: NormalizedBox) -> Self {
        Self { class_id, bbox }
    }

    /// Append `<class> <xc> <yc> <w> <h>\n` with `precision` decimals
    pub fn write_line(&self, out: &mut String, precision: usize) {
        // Writing into a String cannot fail
        let _ = writeln!(
            out,
            "{} {:.*} {:.*} {:.*} {:.*}",
            self.class_id,
            precision,
            self.bbox.x_center,
            precision,
            self.bbox.y_center,
            precision,
            self.bbox.width,
            precision,
            self.bbox.height
        );
    }
}

/// Render labels as the contents of one YOLO label file
pub fn format_labels(labels: &[YoloLabel], precision: usize) -> String {
    let mut yolo_data = String::with_capacity(labels.len() * 48);
    for label in labels {
        label.write_line(&mut yolo_data, precision);
    }
    yolo_data
}

// Struct to hold processing statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub images_processed: usize,
    pub label_files_written: usize,
    pub boxes_written: usize,
    pub skipped_empty_mask: usize,
    pub skipped_malformed: usize,
    pub skipped_unknown_reference: usize,
    pub multi_ring_annotations: usize,
    pub crowd_annotations: usize,
    pub renamed_label_files: usize,
    pub failed_images: usize,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine the counters of two partial runs
    pub fn merge(mut self, other: ProcessingStats) -> Self {
        self.images_processed += other.images_processed;
        self.label_files_written += other.label_files_written;
        self.boxes_written += other.boxes_written;
        self.skipped_empty_mask += other.skipped_empty_mask;
        self.skipped_malformed += other.skipped_malformed;
        self.skipped_unknown_reference += other.skipped_unknown_reference;
        self.multi_ring_annotations += other.multi_ring_annotations;
        self.crowd_annotations += other.crowd_annotations;
        self.renamed_label_files += other.renamed_label_files;
        self.failed_images += other.failed_images;
        self
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped_empty_mask + self.skipped_malformed + self.skipped_unknown_reference
    }

    pub fn print_summary(&self) {
        log::info!("=== Processing Summary ===");
        log::info!("Images processed: {}", self.images_processed);
        log::info!("Label files written: {}", self.label_files_written);
        log::info!("Boxes written: {}", self.boxes_written);
        if self.crowd_annotations > 0 {
            log::info!("Crowd annotations: {}", self.crowd_annotations);
        }
        if self.multi_ring_annotations > 0 {
            log::warn!(
                "Annotations with more than one polygon ring: {}",
                self.multi_ring_annotations
            );
        }
        if self.renamed_label_files > 0 {
            log::warn!(
                "Label files renamed to avoid name collisions: {}",
                self.renamed_label_files
            );
        }

        let total_skipped = self.total_skipped();
        if total_skipped > 0 {
            log::warn!(
                "Total skipped shapes: {} (empty mask: {}, malformed: {}, unknown image/label: {})",
                total_skipped,
                self.skipped_empty_mask,
                self.skipped_malformed,
                self.skipped_unknown_reference
            );
        }
        if self.failed_images > 0 {
            log::error!("Failed images: {}", self.failed_images);
        }
    }
}
