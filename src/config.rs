use crate::assertions::RuleFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Defaults read from `kverify.toml`. Command-line flags take precedence.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct KverifyConfig {
    /// Fact store to read instead of a stream
    pub store: Option<String>,
    /// Drop duplicate facts while loading
    pub ignore_dups: Option<bool>,
    /// How rule files are read
    pub rule_format: Option<RuleFormat>,
}

impl KverifyConfig {
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store.as_ref().map(PathBuf::from)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("kverify.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<KverifyConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: KverifyConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &KverifyConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
