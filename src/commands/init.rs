//! Init command implementation

use crate::config::{Config, SiteConfig};
use crate::error::{Error, Result};
use crate::store::IndexStore;
use std::path::PathBuf;
use tracing::info;

/// Write a default configuration and create the index database
///
/// Refuses to overwrite an existing config unless `force` is set.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    config
        .sites
        .push(SiteConfig::new("https://example.com", "Example"));

    info!("Initializing sitesearch in {:?}", config.paths.base_dir);
    std::fs::create_dir_all(&config.paths.base_dir)?;
    config.save()?;

    IndexStore::connect(&config).await?;
    Ok(config)
}
