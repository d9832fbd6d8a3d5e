//! `mendstream config`: Configuration management commands.

use mendstream_config::ResilienceConfig;
use std::path::Path;

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = ResilienceConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    println!("# store file: {}", config.store.resolved_path().display());
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", ResilienceConfig::config_path().display());
    Ok(())
}

pub fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = ResilienceConfig::config_path();
    if write_default(&path, force)? {
        println!("Wrote default config to {}", path.display());
    } else {
        println!("Config already exists at {} (use --force to overwrite)", path.display());
    }
    Ok(())
}

/// Write the default config to `path`. Returns `false` when a file exists
/// and `force` is not set.
pub fn write_default(path: &Path, force: bool) -> Result<bool, Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, ResilienceConfig::default_toml())?;
    Ok(true)
}
