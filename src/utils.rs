use indicatif::{ProgressBar, ProgressStyle};
use log::{error, warn};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Read and parse a JSON file straight from a buffered file stream
pub fn read_and_parse_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open JSON file ({}): {:?}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_reader(BufReader::new(file)) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            error!("Failed to parse JSON ({}): {:?}", path.display(), e);
            None
        }
    }
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .progress_chars("#>-"),
    );
    pb
}

/// Make sure the output directory exists; files already in it are left alone
pub fn ensure_output_directory(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        log::info!(
            "Directory {:?} already exists. Label files in it will be overwritten.",
            path
        );
    } else {
        fs::create_dir_all(path)?;
    }
    Ok(path.to_path_buf())
}

/// Label file name for an image: the sanitized file stem with a `.txt` extension
pub fn label_file_name(image_name: &str) -> String {
    let stem = Path::new(image_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(image_name);
    format!("{}.txt", sanitize_filename::sanitize(stem))
}

/// Label file names for `(image id, image name)` pairs, in input order.
///
/// The first image reducing to a given name keeps it; later ones get their image id
/// appended (`a.txt`, `a_7.txt`). Returns the names and how many had to be renamed.
pub fn unique_label_file_names(images: &[(u64, &str)]) -> (Vec<String>, usize) {
    let natural: Vec<String> = images
        .iter()
        .map(|&(_, image_name)| label_file_name(image_name))
        .collect();

    // Natural names stay reserved for their first owner
    let mut taken: HashSet<String> = natural.iter().cloned().collect();
    let mut first_seen: HashSet<&str> = HashSet::with_capacity(natural.len());
    let mut renamed = 0;
    let mut names = Vec::with_capacity(natural.len());

    for (&(id, image_name), name) in images.iter().zip(&natural) {
        if first_seen.insert(name.as_str()) {
            names.push(name.clone());
            continue;
        }
        let mut stem = name.strip_suffix(".txt").unwrap_or(name).to_string();
        let mut candidate = format!("{}_{}.txt", stem, id);
        while taken.contains(&candidate) {
            stem = format!("{}_{}", stem, id);
            candidate = format!("{}_{}.txt", stem, id);
        }
        warn!(
            "Image {} (id {}) would overwrite {}; writing its labels to {}",
            image_name, id, name, candidate
        );
        taken.insert(candidate.clone());
        names.push(candidate);
        renamed += 1;
    }
    (names, renamed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_file_name() {
        assert_eq!(label_file_name("frame_0001.jpg"), "frame_0001.txt");
        assert_eq!(label_file_name("images/train/img.v2.png"), "img.v2.txt");
        assert_eq!(label_file_name("no_extension"), "no_extension.txt");
    }

    #[test]
    fn test_unique_label_file_names() {
        let (names, renamed) =
            unique_label_file_names(&[(1, "a.jpg"), (2, "a.png"), (3, "b.jpg"), (4, "x/a.jpeg")]);
        assert_eq!(names, vec!["a.txt", "a_2.txt", "b.txt", "a_4.txt"]);
        assert_eq!(renamed, 2);
    }

    #[test]
    fn test_unique_label_file_names_skips_taken_names() {
        let (names, renamed) = unique_label_file_names(&[(1, "a.jpg"), (2, "a.png"), (9, "a_2.jpg")]);
        assert_eq!(names, vec!["a.txt", "a_2_2.txt", "a_2.txt"]);
        assert_eq!(renamed, 1);
    }

    #[test]
    fn test_ensure_output_directory_keeps_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let out = temp_dir.path().join("labels");
        ensure_output_directory(&out).unwrap();
        fs::write(out.join("keep.txt"), "x").unwrap();
        ensure_output_directory(&out).unwrap();
        assert!(out.join("keep.txt").exists());
    }
}
