//! COCO to YOLO conversion
//!
//! Each COCO image becomes one label file. Annotations are boxed through the geometry
//! normalizer: RLE masks through the mask path, polygons either through their vertex
//! extent or through their rasterized pixels, and bbox-only annotations through the
//! corners of their rectangle.

use dashmap::DashMap;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::coco::{Annotation, CocoFile, Image, Segmentation};
use crate::config::{BoxSource, CocoArgs};
use crate::conversion::{
    convert_mask, convert_points, log_class_histogram, LabelCollector, ShapeOutcome,
};
use crate::geometry::FrameSize;
use crate::io::{read_coco_file, write_label_file};
use crate::mask::{rasterize_polygon, OccupancyMask};
use crate::types::{format_labels, ProcessingStats};
use crate::utils::{create_progress_bar, ensure_output_directory, unique_label_file_names};

type ImageResult = Result<ProcessingStats, Box<dyn std::error::Error + Send + Sync>>;

/// Main COCO to YOLO pipeline: read the annotation file, write one label file per image
pub fn process_coco_dataset(args: &CocoArgs) -> Result<ProcessingStats, Box<dyn std::error::Error>> {
    let coco_path = args.input_dir.join(&args.annotation_file);
    info!("Reading COCO annotations from {}", coco_path.display());
    let coco = read_coco_file(&coco_path)?;
    info!(
        "Loaded {} images, {} annotations and {} categories.",
        coco.images.len(),
        coco.annotations.len(),
        coco.categories.len()
    );

    let labels_dir = ensure_output_directory(&args.output_dir)?;
    let class_histogram = DashMap::new();
    let stats = convert_coco(&coco, args, &labels_dir, &class_histogram);

    stats.print_summary();
    info!("Boxes per class:");
    log_class_histogram(&class_histogram);
    info!(
        "Conversion complete. YOLO format annotations saved in {}",
        labels_dir.display()
    );
    Ok(stats)
}

/// Convert an already loaded COCO file into label files under `labels_dir`
pub fn convert_coco(
    coco: &CocoFile,
    args: &CocoArgs,
    labels_dir: &Path,
    class_histogram: &DashMap<u64, usize>,
) -> ProcessingStats {
    let annotations_by_image = coco.annotations_by_image();
    let category_map = args
        .remap_categories
        .then(|| coco.contiguous_category_ids());

    let mut run_stats = ProcessingStats::new();
    let known_images: HashSet<u64> = coco.images.iter().map(|image| image.id).collect();
    for annotation in coco
        .annotations
        .iter()
        .filter(|annotation| !known_images.contains(&annotation.image_id))
    {
        warn!(
            "Annotation {} references unknown image id {}, skipped",
            annotation.id, annotation.image_id
        );
        run_stats.skipped_unknown_reference += 1;
    }

    let image_names: Vec<(u64, &str)> = coco
        .images
        .iter()
        .map(|image| (image.id, image.file_name.as_str()))
        .collect();
    let (label_names, renamed_label_files) = unique_label_file_names(&image_names);
    run_stats.renamed_label_files = renamed_label_files;

    let pb = create_progress_bar(coco.images.len() as u64, "COCO");
    let stats = coco
        .images
        .par_iter()
        .zip(label_names.par_iter())
        .map(|(image, label_name)| {
            let annotations = annotations_by_image
                .get(&image.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let result = process_image(
                image,
                label_name,
                annotations,
                args,
                category_map.as_ref(),
                labels_dir,
                class_histogram,
            );
            pb.inc(1);
            result.unwrap_or_else(|e| {
                error!("Failed to process image {}: {}", image.file_name, e);
                ProcessingStats {
                    failed_images: 1,
                    ..Default::default()
                }
            })
        })
        .reduce(ProcessingStats::new, ProcessingStats::merge);
    pb.finish_with_message("COCO processing complete");

    stats.merge(run_stats)
}

fn process_image(
    image: &Image,
    label_name: &str,
    annotations: &[&Annotation],
    args: &CocoArgs,
    category_map: Option<&HashMap<u64, u64>>,
    labels_dir: &Path,
    class_histogram: &DashMap<u64, usize>,
) -> ImageResult {
    let frame = FrameSize::new(image.width, image.height)?;
    let mut collector = LabelCollector::new(&image.file_name, class_histogram);

    for annotation in annotations {
        let shape_desc = format!("annotation {}", annotation.id);
        if annotation.iscrowd != 0 {
            debug!("{} in {} is a crowd region", shape_desc, image.file_name);
            collector.stats_mut().crowd_annotations += 1;
        }
        let class_id = match category_map {
            Some(map) => match map.get(&annotation.category_id) {
                Some(&class_id) => class_id,
                None => {
                    collector.push(
                        &shape_desc,
                        ShapeOutcome::UnknownReference(format!(
                            "unknown category id {}",
                            annotation.category_id
                        )),
                    );
                    continue;
                }
            },
            None => annotation.category_id,
        };

        let outcome = annotation_outcome(annotation, class_id, frame, args, collector.stats_mut());
        collector.push(&shape_desc, outcome);
    }

    let (labels, mut stats) = collector.finish();
    if !labels.is_empty() || args.include_empty {
        write_label_file(
            labels_dir,
            label_name,
            &format_labels(&labels, args.precision),
        )?;
        stats.label_files_written += 1;
    }
    stats.images_processed += 1;
    Ok(stats)
}

fn annotation_outcome(
    annotation: &Annotation,
    class_id: u64,
    frame: FrameSize,
    args: &CocoArgs,
    stats: &mut ProcessingStats,
) -> ShapeOutcome {
    if let Some(Segmentation::Rle(rle)) = &annotation.segmentation {
        return match rle.decode() {
            Ok(mask) => convert_mask(class_id, &mask, frame),
            Err(e) => ShapeOutcome::Malformed(e.to_string()),
        };
    }

    let rings = match annotation.polygon_rings() {
        Ok(rings) => rings,
        Err(e) => return ShapeOutcome::Malformed(e.to_string()),
    };
    if rings.is_empty() {
        return match annotation.bbox_corners() {
            Some(corners) => convert_points(class_id, &corners, frame),
            None => ShapeOutcome::Malformed("no segmentation and no bbox".to_string()),
        };
    }

    if rings.len() > 1 {
        stats.multi_ring_annotations += 1;
        if !args.merge_rings {
            warn!(
                "Annotation {} has {} polygon rings; only the first is used (see --merge_rings)",
                annotation.id,
                rings.len()
            );
        }
    }
    let rings = if args.merge_rings { &rings[..] } else { &rings[..1] };
    if let Some(ring) = rings.iter().find(|ring| ring.len() < 3) {
        return ShapeOutcome::Malformed(format!(
            "polygon ring has {} points, at least 3 are needed",
            ring.len()
        ));
    }

    match args.box_source {
        BoxSource::Vertices => convert_points(class_id, &rings.concat(), frame),
        BoxSource::Mask => {
            let width = frame.width() as usize;
            let height = frame.height() as usize;
            let mut mask = OccupancyMask::new(width, height);
            for ring in rings {
                mask.paint(&rasterize_polygon(ring, width, height), 0, 0);
            }
            convert_mask(class_id, &mask, frame)
        }
    }
}
