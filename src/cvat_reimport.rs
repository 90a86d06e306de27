use clap::Parser;

use log::{error, info};

use annot2yolo::{organize_for_cvat, ReimportArgs};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = ReimportArgs::parse();

    if !args.input_dir.is_dir() {
        error!(
            "The specified input_dir does not exist: {}",
            args.input_dir.display()
        );
        std::process::exit(1);
    }

    info!("Packaging {} for CVAT re-import...", args.input_dir.display());

    match organize_for_cvat(&args) {
        Ok(summary) => info!(
            "Packaged {} images ({} empty label files created)",
            summary.images_packaged, summary.empty_labels_created
        ),
        Err(e) => {
            error!("Failed to package dataset: {}", e);
            std::process::exit(1);
        }
    }
}
