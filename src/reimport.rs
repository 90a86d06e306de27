//! Packaging of YOLO class folders for CVAT re-import
//!
//! The input directory holds `obj.data`, `obj.names` and one folder per class id with
//! images and their label files. The archive mirrors CVAT's YOLO 1.1 layout: the two
//! config files at the root, every image and label under one subset folder, and a
//! `train.txt` listing the images.

use glob::{glob_with, MatchOptions, Pattern};
use log::{info, warn};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ReimportArgs;
use crate::types::get_image_extensions_set;
use crate::utils::create_progress_bar;

const CONFIG_FILES: &[&str] = &["obj.data", "obj.names"];

/// What ended up in the archive
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReimportSummary {
    pub images_packaged: usize,
    pub empty_labels_created: usize,
    pub duplicates_skipped: usize,
    /// Images whose `<stem>.txt` entry was already written for an earlier image
    pub shared_labels_skipped: usize,
}

/// Build the re-import archive described by `args`
pub fn organize_for_cvat(args: &ReimportArgs) -> Result<ReimportSummary, Box<dyn std::error::Error>> {
    for name in CONFIG_FILES {
        let path = args.input_dir.join(name);
        if !path.is_file() {
            return Err(format!("Required file not found: {}", path.display()).into());
        }
    }

    let class_dirs = find_class_dirs(&args.input_dir, args.min_class_id)?;
    info!(
        "Found {} class folders with id >= {}",
        class_dirs.len(),
        args.min_class_id
    );

    let mut images = Vec::new();
    for (class_id, dir) in &class_dirs {
        let found = find_images(dir)?;
        info!("Class {}: {} images", class_id, found.len());
        images.extend(found);
    }

    let summary = write_archive(args, &images)?;

    info!("Zip file created successfully: {}", args.output_zip.display());
    info!("Created {} image entries in train.txt", summary.images_packaged);
    if summary.duplicates_skipped > 0 {
        warn!("Skipped {} duplicate image names", summary.duplicates_skipped);
    }
    if summary.shared_labels_skipped > 0 {
        warn!(
            "{} images share a label file name with an earlier image; the first label was kept",
            summary.shared_labels_skipped
        );
    }
    Ok(summary)
}

/// Write the archive to `args.output_zip`; an archive left incomplete by an error is removed
fn write_archive(
    args: &ReimportArgs,
    images: &[PathBuf],
) -> Result<ReimportSummary, Box<dyn std::error::Error>> {
    let file = File::create(&args.output_zip)?;
    fill_archive(args, images, file).map_err(|e| {
        if let Err(remove_error) = fs::remove_file(&args.output_zip) {
            warn!(
                "Failed to remove incomplete archive {}: {}",
                args.output_zip.display(),
                remove_error
            );
        }
        e
    })
}

fn fill_archive(
    args: &ReimportArgs,
    images: &[PathBuf],
    file: File,
) -> Result<ReimportSummary, Box<dyn std::error::Error>> {
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for name in CONFIG_FILES {
        add_file(&mut zip, name, &args.input_dir.join(name), options)?;
    }

    let mut summary = ReimportSummary::default();
    let mut packaged_images: HashSet<String> = HashSet::new();
    let mut packaged_labels: HashSet<String> = HashSet::new();
    let mut train_entries: Vec<String> = Vec::with_capacity(images.len());
    let pb = create_progress_bar(images.len() as u64, "Package");

    for image_path in images {
        pb.inc(1);
        let Some(image_name) = image_path.file_name().and_then(|name| name.to_str()) else {
            warn!("Skipping image with a non UTF-8 name: {:?}", image_path);
            continue;
        };
        if !packaged_images.insert(image_name.to_string()) {
            warn!(
                "{} was already packaged from another class folder, skipping {}",
                image_name,
                image_path.display()
            );
            summary.duplicates_skipped += 1;
            continue;
        }

        let entry = format!("{}/{}", args.subset_dir, image_name);
        add_file(&mut zip, &entry, image_path, options)?;
        train_entries.push(entry);
        summary.images_packaged += 1;

        let label_entry = format!("{}/{}", args.subset_dir, label_name(image_name));
        if !packaged_labels.insert(label_entry.clone()) {
            warn!(
                "{} is already in the archive, keeping it for {} as well",
                label_entry,
                image_path.display()
            );
            summary.shared_labels_skipped += 1;
            continue;
        }
        let label_path = image_path.with_extension("txt");
        if label_path.is_file() {
            add_file(&mut zip, &label_entry, &label_path, options)?;
        } else {
            info!("Creating empty annotation file for {}", image_name);
            zip.start_file(label_entry, options)?;
            summary.empty_labels_created += 1;
        }
    }
    pb.finish_with_message("Packaging complete");

    zip.start_file("train.txt", options)?;
    zip.write_all(train_entries.join("\n").as_bytes())?;
    zip.finish()?.flush()?;
    Ok(summary)
}

/// Numbered class folders with an id of at least `min_class_id`, in id order
pub fn find_class_dirs(input_dir: &Path, min_class_id: u32) -> std::io::Result<Vec<(u32, PathBuf)>> {
    let mut class_dirs = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        match name.parse::<u32>() {
            Ok(class_id) if class_id >= min_class_id => class_dirs.push((class_id, entry.path())),
            Ok(_) => {}
            Err(e) => warn!("Ignoring class folder {}: {}", name, e),
        }
    }
    class_dirs.sort();
    Ok(class_dirs)
}

/// Images directly inside `dir`, sorted by file name
pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let pattern = format!("{}/*", Pattern::escape(&dir.to_string_lossy()));
    let options = MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let extensions = get_image_extensions_set();
    let mut images: Vec<PathBuf> = glob_with(&pattern, options)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext.to_lowercase()))
        })
        .collect();
    images.sort();
    Ok(images)
}

fn label_name(image_name: &str) -> String {
    let stem = Path::new(image_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(image_name);
    format!("{}.txt", stem)
}

fn add_file<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    entry_name: &str,
    source: &Path,
    options: SimpleFileOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    zip.start_file(entry_name, options)?;
    let mut file = File::open(source)?;
    std::io::copy(&mut file, zip)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_class_dirs_filters_and_sorts() {
        let temp_dir = tempfile::tempdir().unwrap();
        for name in ["10", "2", "1", "0", "cats", "3a"] {
            fs::create_dir(temp_dir.path().join(name)).unwrap();
        }
        fs::write(temp_dir.path().join("5"), "not a dir").unwrap();

        let dirs = find_class_dirs(temp_dir.path(), 2).unwrap();
        let ids: Vec<u32> = dirs.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 10]);
    }

    #[test]
    fn test_find_images_matches_extensions_case_insensitively() {
        let temp_dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.png", "c.jpeg", "a.txt", "d.bmp"] {
            fs::write(temp_dir.path().join(name), "x").unwrap();
        }
        let names: Vec<String> = find_images(temp_dir.path())
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.JPG", "c.jpeg"]);
    }

    #[test]
    fn test_images_sharing_a_stem_share_one_label() {
        let input_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        fs::write(input_dir.path().join("obj.data"), "classes = 3\n").unwrap();
        fs::write(input_dir.path().join("obj.names"), "a\nb\nc\n").unwrap();
        let class_dir = input_dir.path().join("2");
        fs::create_dir(&class_dir).unwrap();
        fs::write(class_dir.join("a.jpg"), "jpg").unwrap();
        fs::write(class_dir.join("a.png"), "png").unwrap();
        fs::write(class_dir.join("a.txt"), "2 0.5 0.5 0.2 0.2\n").unwrap();

        let args = ReimportArgs {
            input_dir: input_dir.path().to_path_buf(),
            output_zip: output_dir.path().join("out.zip"),
            min_class_id: 2,
            subset_dir: "obj_subset_data".to_string(),
        };
        let summary = organize_for_cvat(&args).unwrap();
        assert_eq!(summary.images_packaged, 2);
        assert_eq!(summary.shared_labels_skipped, 1);
        assert_eq!(summary.empty_labels_created, 0);

        let mut archive = zip::ZipArchive::new(File::open(&args.output_zip).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "obj.data",
                "obj.names",
                "obj_subset_data/a.jpg",
                "obj_subset_data/a.png",
                "obj_subset_data/a.txt",
                "train.txt",
            ]
        );
        let mut label = String::new();
        std::io::Read::read_to_string(
            &mut archive.by_name("obj_subset_data/a.txt").unwrap(),
            &mut label,
        )
        .unwrap();
        assert_eq!(label, "2 0.5 0.5 0.2 0.2\n");
    }

    #[test]
    fn test_failed_packaging_removes_archive() {
        let input_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        fs::write(input_dir.path().join("obj.data"), "classes = 1\n").unwrap();
        fs::write(input_dir.path().join("obj.names"), "a\n").unwrap();
        let args = ReimportArgs {
            input_dir: input_dir.path().to_path_buf(),
            output_zip: output_dir.path().join("out.zip"),
            min_class_id: 2,
            subset_dir: "obj_subset_data".to_string(),
        };
        let missing = vec![input_dir.path().join("2/missing.jpg")];

        assert!(write_archive(&args, &missing).is_err());
        assert!(!args.output_zip.exists());
    }

    #[test]
    fn test_label_name() {
        assert_eq!(label_name("fish.v1.jpg"), "fish.v1.txt");
    }
}
