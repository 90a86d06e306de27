use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::coco::CocoFile;
use crate::cvat::CvatAnnotations;
use crate::utils::read_and_parse_json;

/// Load a COCO annotation file
pub fn read_coco_file(path: &Path) -> Result<CocoFile, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("COCO annotation file not found: {}", path.display()).into());
    }
    read_and_parse_json(path)
        .ok_or_else(|| format!("Failed to load COCO annotations from {}", path.display()).into())
}

/// Load a CVAT XML export
pub fn read_cvat_file(path: &Path) -> Result<CvatAnnotations, Box<dyn std::error::Error>> {
    let xml = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read CVAT XML ({}): {}", path.display(), e))?;
    CvatAnnotations::from_xml(&xml)
        .map_err(|e| format!("Failed to parse CVAT XML ({}): {}", path.display(), e).into())
}

/// Write one label file, replacing any previous contents
pub fn write_label_file(
    labels_dir: &Path,
    file_name: &str,
    yolo_data: &str,
) -> std::io::Result<PathBuf> {
    let label_output_path = labels_dir.join(file_name);
    let mut writer = BufWriter::new(File::create(&label_output_path)?);
    writer.write_all(yolo_data.as_bytes())?;
    writer.flush()?;
    Ok(label_output_path)
}
