use clap::Parser;

use log::{error, info};

use annot2yolo::{process_cvat_dataset, CvatArgs};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CvatArgs::parse();

    if !args.input_dir.is_dir() {
        error!(
            "The specified input_dir does not exist: {}",
            args.input_dir.display()
        );
        std::process::exit(1);
    }

    info!("Starting the CVAT conversion...");

    if let Err(e) = process_cvat_dataset(&args) {
        error!("Failed to convert CVAT annotations: {}", e);
        std::process::exit(1);
    }
}
