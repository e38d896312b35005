use super::utils::{config_service, load_config};
use anyhow::Result;
use std::path::Path;

pub async fn init(path: Option<&Path>) -> Result<()> {
    let service = config_service(path)?;
    if service.init().await? {
        println!("✅ Wrote default config: {}", service.path().display());
    } else {
        println!("Config already exists: {}", service.path().display());
    }
    Ok(())
}

/// Prints the config after environment overrides.
pub async fn show(path: Option<&Path>) -> Result<()> {
    let config = load_config(path).await?;
    let data_dir = chorus_infrastructure::ChorusPaths::data_dir(&config)?;
    println!("# data dir: {}", data_dir.display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
