mod config;
mod data;
mod errors;
mod etl;
mod net;
mod projection;

use std::fs::{create_dir_all, File};
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::config::{load_user_config, UserConfig, DEFAULT_CONFIG_PATH};
use crate::data::transit::MapLayers;
use crate::errors::Result;
use crate::etl::draw_map::DrawMapEtl;
use crate::etl::{fetch_layers, Etl};
use crate::net::overpass::OverpassClient;

const LAYERS_FILE_NAME: &str = "layers.json";

fn create_output_dir(config: &UserConfig) -> Result<PathBuf> {
    let output_dir = Path::new(&config.dest_path).join(config.network.to_lowercase());
    create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn write_layers(dir: &Path, layers: &MapLayers) -> Result<()> {
    let file = File::create(dir.join(LAYERS_FILE_NAME))?;
    serde_json::to_writer_pretty(file, layers)?;
    Ok(())
}

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let user_config = load_user_config(Path::new(&config_path))?;
    let output_dir = create_output_dir(&user_config)?;

    let overpass = OverpassClient::new(
        &user_config.overpass_url,
        &user_config.user_agent,
        user_config.http_timeout(),
    )?;
    let layers = fetch_layers(&overpass, &user_config.network, &user_config.route_colors).await?;
    write_layers(&output_dir, &layers)?;

    let mut draw_map = DrawMapEtl::new(&user_config, &layers)?;
    let map = draw_map.process().await?;
    DrawMapEtl::save(&map, &output_dir)?;

    let output_path = DrawMapEtl::output_path(&output_dir);
    info!(output = &*output_path.to_string_lossy(); "Map written");
    Ok(())
}
