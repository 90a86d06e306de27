use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

/// Convert a COCO annotation file into one YOLO label file per image.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct CocoArgs {
    /// Directory containing the COCO JSON file
    pub input_dir: PathBuf,

    /// Directory to write the YOLO label files to
    pub output_dir: PathBuf,

    /// Name of the COCO JSON file inside input_dir
    #[arg(long = "annotation_file", default_value = "instances_default.json")]
    pub annotation_file: String,

    /// How polygon segmentations are turned into boxes: 'vertices' or 'mask'
    #[arg(long = "box_source", value_enum, default_value = "vertices")]
    pub box_source: BoxSource,

    /// Use every polygon ring of an annotation instead of only the first
    #[arg(long = "merge_rings")]
    pub merge_rings: bool,

    /// Replace COCO category ids with 0-based ids in ascending category-id order
    #[arg(long = "remap_categories")]
    pub remap_categories: bool,

    /// Write empty label files for images without any box
    #[arg(long = "include_empty")]
    pub include_empty: bool,

    /// Decimal places of the normalized coordinates
    #[arg(long = "precision", default_value_t = 6, value_parser = validate_precision)]
    pub precision: usize,
}

/// Convert a CVAT for images XML export into YOLO label files.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct CvatArgs {
    /// Directory containing the CVAT XML file
    pub input_dir: PathBuf,

    /// Directory to write the YOLO label files to
    pub output_dir: PathBuf,

    /// Name of the CVAT XML file inside input_dir
    #[arg(long = "xml_file", default_value = "annotations.xml")]
    pub xml_file: String,

    /// How label files are named: 'frame' (frame_0000.txt) or 'image' (image stem)
    #[arg(long = "naming", value_enum, default_value = "frame")]
    pub naming: FrameNaming,

    /// Decimal places of the normalized coordinates
    #[arg(long = "precision", default_value_t = 6, value_parser = validate_precision)]
    pub precision: usize,

    /// Ordered label list overriding the labels declared in the XML meta section
    #[arg(long = "label_list", use_value_delimiter = true)]
    pub label_list: Vec<String>,
}

/// Package numbered class folders of images and YOLO labels for CVAT re-import.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct ReimportArgs {
    /// Directory containing obj.data, obj.names and the class folders
    pub input_dir: PathBuf,

    /// Path of the zip archive to create
    pub output_zip: PathBuf,

    /// Smallest class folder id to include
    #[arg(long = "min_class_id", default_value_t = 2)]
    pub min_class_id: u32,

    /// Folder name images and labels are stored under inside the archive
    #[arg(long = "subset_dir", default_value = "obj_subset_data")]
    pub subset_dir: String,
}

// Source geometry for polygon segmentations
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum BoxSource {
    /// Extent of the polygon vertices
    Vertices,
    /// Extent of the pixels the polygon covers
    Mask,
}

// Label file naming for CVAT frames
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum FrameNaming {
    Frame,
    Image,
}

// Validate that the precision is between 1 and 12 decimal places
fn validate_precision(s: &str) -> Result<usize, String> {
    match usize::from_str(s) {
        Ok(val) if (1..=12).contains(&val) => Ok(val),
        _ => Err("PRECISION must be between 1 and 12".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_precision() {
        assert_eq!(validate_precision("6"), Ok(6));
        assert!(validate_precision("1").is_ok());
        assert!(validate_precision("12").is_ok());
        assert!(validate_precision("0").is_err());
        assert!(validate_precision("13").is_err());
        assert!(validate_precision("six").is_err());
    }

    #[test]
    fn test_coco_args_defaults() {
        let args = CocoArgs::parse_from(["coco2yolo", "in", "out"]);
        assert_eq!(args.annotation_file, "instances_default.json");
        assert_eq!(args.box_source, BoxSource::Vertices);
        assert_eq!(args.precision, 6);
        assert!(!args.merge_rings);
    }

    #[test]
    fn test_cvat_args_label_list() {
        let args = CvatArgs::parse_from([
            "cvat2yolo",
            "in",
            "out",
            "--naming",
            "image",
            "--label_list",
            "fish,rock",
        ]);
        assert_eq!(args.naming, FrameNaming::Image);
        assert_eq!(args.label_list, vec!["fish", "rock"]);
        assert_eq!(args.xml_file, "annotations.xml");
    }

    #[test]
    fn test_reimport_args_defaults() {
        let args = ReimportArgs::parse_from(["cvat-reimport", "in", "out.zip"]);
        assert_eq!(args.min_class_id, 2);
        assert_eq!(args.subset_dir, "obj_subset_data");
    }
}
