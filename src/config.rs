use anyhow::{anyhow, bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration, read from a YAML file next to the working data.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Config {
    /// Directory holding the per-day station export files
    pub data_dir: PathBuf,
    /// Filename prefix of a station export, completed by `YYYY-MM-DD.csv`
    pub station_file_prefix: String,
    /// CSV roster mapping card ids to scale ids
    pub roster_path: PathBuf,
    /// Binary cache of the built roster translator
    pub roster_cache_path: PathBuf,
    /// Base URL of the weighing-scale service
    pub scale_service_url: String,
    /// Where the merged database snapshot lives
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            station_file_prefix: "pos-visits-".to_string(),
            roster_path: PathBuf::from("roster.csv"),
            roster_cache_path: PathBuf::from("roster.cache"),
            scale_service_url: "http://10.10.0.44/beijingdev/dev".to_string(),
            database_path: PathBuf::from("merged_data.json"),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config file {}, run `fwat init` to create one",
                path.display()
            )
        })?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scale_service_url.starts_with("http://")
            && !self.scale_service_url.starts_with("https://")
        {
            bail!(
                "scale_service_url must be an http(s) URL, got {:?}",
                self.scale_service_url
            );
        }
        if self.station_file_prefix.contains('/') {
            bail!("station_file_prefix must be a filename prefix, not a path");
        }
        Ok(())
    }
}

/// Opens the default configuration in an editor and writes the edited version
/// to `path` once it validates.
pub fn prompt_create_config(path: &Path) -> Result<Config> {
    let serialized = serde_yaml::to_string(&Config::default())?;
    let Some(edited) = dialoguer::Editor::new().edit(&serialized)? else {
        return Err(anyhow!("You did not save the edits, please try again"));
    };
    let config: Config = serde_yaml::from_str(&edited)?;
    config.validate()?;
    std::fs::write(path, &edited)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_and_roundtrips() {
        let config = Config::default();
        config.validate().unwrap();

        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("fwat.yaml");
        std::fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();
        assert_eq!(config, Config::load(&path).unwrap());
    }

    #[test]
    fn rejects_non_http_service_url() {
        let config = Config {
            scale_service_url: "ftp://somewhere".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_path_like_prefix() {
        let config = Config {
            station_file_prefix: "data/pos-".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_reports_init_hint() {
        let tempdir = tempfile::tempdir().unwrap();
        let err = Config::load(&tempdir.path().join("fwat.yaml")).unwrap_err();
        assert!(err.to_string().contains("fwat init"));
    }
}
