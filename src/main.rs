use anyhow::{Context, Result};
use log::{error, info};

use photostrip::api::build_rocket;
use photostrip::background::coordinator::UploadCoordinator;
use photostrip::background::processors::setup::{initialize_folder, initialize_logger};
use photostrip::common::{BATCH_RUNTIME, ROCKET_RUNTIME};
use photostrip::config::init_config;

fn main() -> Result<()> {
    initialize_logger();
    let config = match init_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration:\n{:?}", e);
            std::process::exit(1);
        }
    };
    let paths = initialize_folder(config).context("failed to prepare folders")?;
    info!("Photostrip will be written to {:?}", paths.output_file);

    let coordinator =
        UploadCoordinator::new(config.clone(), paths, BATCH_RUNTIME.handle().clone());

    let result = ROCKET_RUNTIME.block_on(async {
        let rocket_instance = build_rocket(coordinator).ignite().await?;
        rocket_instance.launch().await
    });
    if let Err(e) = result {
        error!("Rocket server failed: {}", e);
        return Err(anyhow::Error::from(e));
    }

    Ok(())
}
