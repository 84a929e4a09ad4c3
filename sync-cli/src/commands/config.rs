//! Validate and print engine configuration.

use anyhow::{Context, Result};
use sitesync_client::EngineConfig;
use std::path::Path;

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "sitesync.toml";

/// Load `path`, falling back to defaults when it does not exist.
pub fn load(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(EngineConfig::default());
    }
    Ok(EngineConfig::from_file(path)?)
}

/// Run the config command.
pub fn run(path: &Path) -> Result<()> {
    let config = load(path)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;

    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# defaults ({} not found)", path.display());
    }
    print!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.fetch_interval_secs, 60);
        assert!(run(&dir.path().join(CONFIG_FILE)).is_ok());
    }

    #[test]
    fn invalid_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "device_name = \"\"").unwrap();

        assert!(run(&path).is_err());
    }

    #[test]
    fn defaults_render_as_toml() {
        let rendered = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        let parsed: EngineConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }
}
