// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{CompressionLevel, PaperSize, RgbColor, WatermarkPosition};

const CONFIG_FILE: &str = "config.json";

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Paper size for documents composed from images.
    pub paper_size: PaperSize,
    /// Outer margin of the image grid, in millimetres.
    pub grid_margin_mm: f32,
    /// Maximum number of full repair runs against one input, clamped to 1..=3.
    pub max_repair_runs: u32,
    /// Compression applied when no level is given explicitly.
    pub compression_level: CompressionLevel,
    /// Defaults for new watermarks.
    pub watermark: WatermarkDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paper_size: PaperSize::A4,
            grid_margin_mm: 10.0,
            max_repair_runs: 3,
            compression_level: CompressionLevel::Medium,
            watermark: WatermarkDefaults::default(),
        }
    }
}

/// Watermark settings pre-filled for a new watermark.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkDefaults {
    pub text: String,
    pub color: RgbColor,
    pub opacity: f32,
    /// Degrees, counter-clockwise.
    pub rotation: f32,
    /// Percentage of the page's shorter side.
    pub size_percent: f32,
    pub position: WatermarkPosition,
}

impl Default for WatermarkDefaults {
    fn default() -> Self {
        Self {
            text: "CONFIDENTIAL".into(),
            color: RgbColor::RED,
            opacity: 0.3,
            rotation: 45.0,
            size_percent: 50.0,
            position: WatermarkPosition::Center,
        }
    }
}

impl AppConfig {
    /// Load the config from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Persist the config as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Conventional config location: `$XDG_CONFIG_HOME/pagewerk/config.json`,
    /// then `~/.config/pagewerk/config.json`.
    pub fn default_path() -> PathBuf {
        config_base().join("pagewerk").join(CONFIG_FILE)
    }
}

fn config_base() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config");
    }
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config.max_repair_runs, 3);
        assert_eq!(config.paper_size, PaperSize::A4);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = AppConfig {
            max_repair_runs: 5,
            paper_size: PaperSize::Letter,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.max_repair_runs, 5);
        assert_eq!(loaded.paper_size, PaperSize::Letter);
        assert_eq!(loaded.watermark.text, "CONFIDENTIAL");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "grid_margin_mm": 5.0 }"#).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.grid_margin_mm, 5.0);
        assert_eq!(loaded.max_repair_runs, 3);
    }
}
