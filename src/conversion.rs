use dashmap::DashMap;
use log::{debug, warn};

use crate::geometry::{normalize, FrameSize, Shape};
use crate::mask::{MaskError, OccupancyMask};
use crate::types::{ProcessingStats, YoloLabel};

/// Result of turning one annotated shape into a YOLO label
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeOutcome {
    Label(YoloLabel),
    /// Mask without a single occupied pixel; nothing is emitted
    EmptyMask,
    Malformed(String),
    /// Shape refers to an image, category or label that does not exist
    UnknownReference(String),
}

/// Box a boundary polygon given in pixel coordinates
pub fn convert_points(class_id: u64, points: &[(f64, f64)], frame: FrameSize) -> ShapeOutcome {
    match Shape::polygon(points) {
        Ok(shape) => label_from_shape(class_id, &shape, frame),
        Err(e) => ShapeOutcome::Malformed(e.to_string()),
    }
}

/// Box a decoded mask; the mask must cover exactly the frame
pub fn convert_mask(class_id: u64, mask: &OccupancyMask, frame: FrameSize) -> ShapeOutcome {
    let frame_width = frame.width() as usize;
    let frame_height = frame.height() as usize;
    if mask.width() != frame_width || mask.height() != frame_height {
        let error = MaskError::SizeMismatch {
            mask_width: mask.width(),
            mask_height: mask.height(),
            frame_width,
            frame_height,
        };
        return ShapeOutcome::Malformed(error.to_string());
    }
    label_from_shape(class_id, &Shape::mask(mask), frame)
}

fn label_from_shape(class_id: u64, shape: &Shape, frame: FrameSize) -> ShapeOutcome {
    match normalize(shape, frame) {
        Some(bbox) => ShapeOutcome::Label(YoloLabel::new(class_id, bbox)),
        None => ShapeOutcome::EmptyMask,
    }
}

/// Gathers the labels of one image and keeps its statistics
pub struct LabelCollector<'a> {
    image_name: &'a str,
    class_histogram: &'a DashMap<u64, usize>,
    labels: Vec<YoloLabel>,
    stats: ProcessingStats,
}

impl<'a> LabelCollector<'a> {
    pub fn new(image_name: &'a str, class_histogram: &'a DashMap<u64, usize>) -> Self {
        Self {
            image_name,
            class_histogram,
            labels: Vec::new(),
            stats: ProcessingStats::new(),
        }
    }

    pub fn stats_mut(&mut self) -> &mut ProcessingStats {
        &mut self.stats
    }

    pub fn push(&mut self, shape_desc: &str, outcome: ShapeOutcome) {
        match outcome {
            ShapeOutcome::Label(label) => {
                *self.class_histogram.entry(label.class_id).or_insert(0) += 1;
                self.stats.boxes_written += 1;
                self.labels.push(label);
            }
            ShapeOutcome::EmptyMask => {
                debug!("{} in {}: empty mask, skipped", shape_desc, self.image_name);
                self.stats.skipped_empty_mask += 1;
            }
            ShapeOutcome::Malformed(reason) => {
                warn!("{} in {}: {}", shape_desc, self.image_name, reason);
                self.stats.skipped_malformed += 1;
            }
            ShapeOutcome::UnknownReference(reason) => {
                warn!("{} in {}: {}", shape_desc, self.image_name, reason);
                self.stats.skipped_unknown_reference += 1;
            }
        }
    }

    pub fn finish(self) -> (Vec<YoloLabel>, ProcessingStats) {
        (self.labels, self.stats)
    }
}

/// Log how many boxes each class received
pub fn log_class_histogram(class_histogram: &DashMap<u64, usize>) {
    let mut counts: Vec<(u64, usize)> = class_histogram
        .iter()
        .map(|entry| (*entry.key(), *entry.value()))
        .collect();
    counts.sort_by_key(|&(class_id, _)| class_id);
    for (class_id, count) in counts {
        log::info!("    class {}: {} boxes", class_id, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> FrameSize {
        FrameSize::new(width, height).unwrap()
    }

    #[test]
    fn test_convert_points() {
        let points = [(10.0, 10.0), (50.0, 10.0), (50.0, 40.0), (10.0, 40.0)];
        match convert_points(4, &points, frame(100, 100)) {
            ShapeOutcome::Label(label) => {
                assert_eq!(label.class_id, 4);
                assert!((label.bbox.x_center - 0.3).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(
            convert_points(0, &points[..2], frame(100, 100)),
            ShapeOutcome::Malformed(_)
        ));
    }

    #[test]
    fn test_convert_mask() {
        let empty = OccupancyMask::new(4, 4);
        assert_eq!(convert_mask(1, &empty, frame(4, 4)), ShapeOutcome::EmptyMask);
        assert!(matches!(
            convert_mask(1, &empty, frame(5, 4)),
            ShapeOutcome::Malformed(_)
        ));
    }

    #[test]
    fn test_collector_counts() {
        let histogram = DashMap::new();
        let mut collector = LabelCollector::new("a.jpg", &histogram);
        let points = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)];
        collector.push("polygon", convert_points(2, &points, frame(2, 2)));
        collector.push("mask", ShapeOutcome::EmptyMask);
        collector.push("polygon", ShapeOutcome::Malformed("bad".to_string()));
        let (labels, stats) = collector.finish();

        assert_eq!(labels.len(), 1);
        assert_eq!(stats.boxes_written, 1);
        assert_eq!(stats.skipped_empty_mask, 1);
        assert_eq!(stats.skipped_malformed, 1);
        assert_eq!(*histogram.get(&2).unwrap(), 1);
    }
}
