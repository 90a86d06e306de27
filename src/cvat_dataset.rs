//! CVAT XML to YOLO conversion
//!
//! Frames are converted independently: polygons and boxes go through the polygon path
//! of the normalizer, masks through the mask path. Every frame of the task gets a
//! label file, empty when nothing was annotated on it.

use dashmap::DashMap;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{CvatArgs, FrameNaming};
use crate::conversion::{
    convert_mask, convert_points, log_class_histogram, LabelCollector, ShapeOutcome,
};
use crate::cvat::{CvatAnnotations, CvatImage};
use crate::io::{read_cvat_file, write_label_file};
use crate::types::{format_labels, ProcessingStats};
use crate::utils::{create_progress_bar, ensure_output_directory, unique_label_file_names};

/// Labels of one converted frame
struct ConvertedFrame<'a> {
    image: &'a CvatImage,
    yolo_data: String,
    stats: ProcessingStats,
}

/// Main CVAT to YOLO pipeline
pub fn process_cvat_dataset(args: &CvatArgs) -> Result<ProcessingStats, Box<dyn std::error::Error>> {
    let xml_path = args.input_dir.join(&args.xml_file);
    info!("Reading CVAT annotations from {}", xml_path.display());
    let cvat = read_cvat_file(&xml_path)?;

    let label_names = if args.label_list.is_empty() {
        cvat.label_names()
    } else {
        args.label_list.clone()
    };
    if label_names.is_empty() {
        warn!("No labels declared in the XML and no --label_list given; every shape will be skipped");
    }
    let label_map = build_label_map(&label_names);
    info!(
        "Loaded {} images, {} frames, {} labels.",
        cvat.images.len(),
        cvat.frame_count(),
        label_map.len()
    );

    let labels_dir = ensure_output_directory(&args.output_dir)?;
    let class_histogram = DashMap::new();
    let stats = convert_cvat(&cvat, args, &label_map, &labels_dir, &class_histogram)?;

    stats.print_summary();
    info!("Boxes per class:");
    log_class_histogram(&class_histogram);
    info!(
        "Conversion complete. YOLO format annotations saved in {}",
        labels_dir.display()
    );
    Ok(stats)
}

/// Class ids are positions in the ordered label list
pub fn build_label_map(label_names: &[String]) -> HashMap<String, u64> {
    let mut label_map = HashMap::with_capacity(label_names.len());
    for (id, label) in label_names.iter().enumerate() {
        if label_map.insert(label.clone(), id as u64).is_some() {
            warn!("Label {:?} is listed more than once; using its last position", label);
        }
    }
    label_map
}

/// Convert an already parsed CVAT export into label files under `labels_dir`
pub fn convert_cvat(
    cvat: &CvatAnnotations,
    args: &CvatArgs,
    label_map: &HashMap<String, u64>,
    labels_dir: &Path,
    class_histogram: &DashMap<u64, usize>,
) -> std::io::Result<ProcessingStats> {
    let pb = create_progress_bar(cvat.images.len() as u64, "CVAT");
    let frames: Vec<ConvertedFrame> = cvat
        .images
        .par_iter()
        .map(|image| {
            let frame = convert_frame(image, label_map, class_histogram, args.precision);
            pb.inc(1);
            frame
        })
        .collect();
    pb.finish_with_message("CVAT processing complete");

    let mut stats = frames
        .iter()
        .fold(ProcessingStats::new(), |acc, frame| acc.merge(frame.stats.clone()));

    match args.naming {
        FrameNaming::Image => {
            let (written, renamed) = write_by_image_name(&frames, labels_dir)?;
            stats.label_files_written = written;
            stats.renamed_label_files = renamed;
        }
        FrameNaming::Frame => {
            stats.label_files_written = write_by_frame_index(cvat, &frames, labels_dir)?;
        }
    }
    Ok(stats)
}

fn convert_frame<'a>(
    image: &'a CvatImage,
    label_map: &HashMap<String, u64>,
    class_histogram: &DashMap<u64, usize>,
    precision: usize,
) -> ConvertedFrame<'a> {
    let frame = match image.frame_size() {
        Ok(frame) => frame,
        Err(e) => {
            error!("Skipping image {}: {}", image.name, e);
            return ConvertedFrame {
                image,
                yolo_data: String::new(),
                stats: ProcessingStats {
                    failed_images: 1,
                    ..Default::default()
                },
            };
        }
    };

    debug!("Frame {} ({}): {} shapes", image.id, image.name, image.shape_count());
    let mut collector = LabelCollector::new(&image.name, class_histogram);
    for polygon in &image.polygons {
        let outcome = match resolve_label(label_map, &polygon.label) {
            Ok(class_id) => match polygon.points() {
                Ok(points) => convert_points(class_id, &points, frame),
                Err(e) => ShapeOutcome::Malformed(e.to_string()),
            },
            Err(outcome) => outcome,
        };
        collector.push("polygon", outcome);
    }
    for cvat_box in &image.boxes {
        let outcome = match resolve_label(label_map, &cvat_box.label) {
            Ok(class_id) => convert_points(class_id, &cvat_box.corners(), frame),
            Err(outcome) => outcome,
        };
        collector.push("box", outcome);
    }
    for mask in &image.masks {
        let outcome = match resolve_label(label_map, &mask.label) {
            Ok(class_id) => match mask.decode(frame) {
                Ok(decoded) => convert_mask(class_id, &decoded, frame),
                Err(e) => ShapeOutcome::Malformed(e.to_string()),
            },
            Err(outcome) => outcome,
        };
        collector.push("mask", outcome);
    }

    let (labels, mut stats) = collector.finish();
    stats.images_processed += 1;
    ConvertedFrame {
        image,
        yolo_data: format_labels(&labels, precision),
        stats,
    }
}

fn resolve_label(label_map: &HashMap<String, u64>, label: &str) -> Result<u64, ShapeOutcome> {
    label_map.get(label).copied().ok_or_else(|| {
        ShapeOutcome::UnknownReference(format!("label {:?} is not in the label list", label))
    })
}

/// Returns the number of files written and how many were renamed to stay unique
fn write_by_image_name(
    frames: &[ConvertedFrame],
    labels_dir: &Path,
) -> std::io::Result<(usize, usize)> {
    let image_names: Vec<(u64, &str)> = frames
        .iter()
        .map(|frame| (frame.image.id as u64, frame.image.name.as_str()))
        .collect();
    let (label_names, renamed) = unique_label_file_names(&image_names);

    frames
        .par_iter()
        .zip(label_names.par_iter())
        .try_for_each(|(frame, label_name)| {
            write_label_file(labels_dir, label_name, &frame.yolo_data).map(|_| ())
        })?;
    Ok((frames.len(), renamed))
}

fn write_by_frame_index(
    cvat: &CvatAnnotations,
    frames: &[ConvertedFrame],
    labels_dir: &Path,
) -> std::io::Result<usize> {
    let by_index: HashMap<usize, &str> = frames
        .iter()
        .map(|frame| (frame.image.id as usize, frame.yolo_data.as_str()))
        .collect();

    let declared = cvat.frame_count();
    let frame_count = by_index
        .keys()
        .map(|&index| index + 1)
        .max()
        .unwrap_or(0)
        .max(declared);
    if frame_count > declared {
        warn!(
            "Images reference frame ids up to {} but the task declares {} frames",
            frame_count - 1,
            declared
        );
    }

    (0..frame_count).into_par_iter().try_for_each(|index| {
        let yolo_data = by_index.get(&index).copied().unwrap_or("");
        write_label_file(labels_dir, &frame_file_name(index), yolo_data).map(|_| ())
    })?;
    Ok(frame_count)
}

/// `frame_0007.txt` style name for a frame index
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:04}.txt", index)
}
