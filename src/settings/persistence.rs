use super::SpectrogramSettings;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn config_dir() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("openspectra")
}

/// JSON file holding one [`SpectrogramSettings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/openspectra/settings.json`.
    pub fn user_default() -> Self {
        Self::new(config_dir().join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SpectrogramSettings> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let settings: SpectrogramSettings = serde_json::from_str(&json)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        settings
            .validate()
            .with_context(|| format!("invalid settings in {}", self.path.display()))?;
        Ok(settings)
    }

    /// Missing files give the defaults silently; broken ones are logged.
    pub fn load_or_default(&self) -> SpectrogramSettings {
        if !self.path.exists() {
            return SpectrogramSettings::default();
        }
        self.load()
            .map_err(|err| warn!("[settings] {err:#}"))
            .unwrap_or_default()
    }

    /// Writes atomically: a sibling temp file is renamed over the target.
    pub fn save(&self, settings: &SpectrogramSettings) -> Result<()> {
        let json = serde_json::to_string_pretty(settings).context("failed to encode settings")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &json)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        debug!("[settings] saved {}", self.path.display());
        Ok(())
    }
}
