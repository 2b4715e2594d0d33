//! Persistent application configuration.
//!
//! Stored as JSON in a platform-appropriate config directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// On-disk configuration for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Photographs of the grimoire.
    pub input_dir: PathBuf,

    /// Where token crops (and the optional overlay) are written.
    pub output_dir: PathBuf,

    /// Reference icons, one per role, named after the role.
    pub reference_dir: PathBuf,

    /// OCR language code; selects `{lang}_recognition.mnn` and `{lang}_charset.txt`.
    pub ocr_lang: String,

    pub ie: ie::IeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("tokens"),
            reference_dir: PathBuf::from("references"),
            ocr_lang: "en".to_string(),
            ie: ie::IeConfig::default(),
        }
    }
}

impl Config {
    /// Default path to the config file.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("config_dir() unavailable")?;
        Ok(base.join("grimoire.json"))
    }

    /// Load configuration from disk, falling back to defaults on a missing or broken file.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to load config; using defaults");
                Self::default()
            }
        }
    }

    /// Try to load configuration from disk.
    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        let cfg = serde_json::from_str(&json).with_context(|| format!("parse {:?}", path))?;
        Ok(cfg)
    }

    /// Save configuration to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, json).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }
}
