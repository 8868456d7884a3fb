//! Loading and saving `~/.voltile/config.ini`.

use super::settings::RenderConfig;
use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl RenderConfig {
    /// Load from the default path. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::DirectoryError)?;
        }
        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigError::WriteError(e.to_string()))
    }
}

/// `~/.voltile`
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".voltile")
}

/// `~/.voltile/config.ini`
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::time::Duration;

    fn write(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.ini");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = RenderConfig::load_from(&temp_dir.path().join("missing.ini")).unwrap();
        assert_eq!(config, RenderConfig::default());
    }

    #[test]
    fn test_load_overlays_values() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &temp_dir,
            "[tiling]\ntile_size = 128\n\n[cache]\nsize = 40\n\n[prefetch]\nslices = 2\n\n\
             [workers]\nthreads = 3\n\n[display]\nshow_tile_progress = no\n\
             show_tile_outlines = yes\nprogress_debounce_ms = 50\ntile_background = #000000\n",
        );
        let config = RenderConfig::load_from(&path).unwrap();

        assert_eq!(config.tile_size, 128);
        assert_eq!(config.cache_size, 40);
        assert_eq!(config.preemptive_fetch_number, 2);
        assert_eq!(config.worker_threads, 3);
        assert!(!config.show_tile_progress);
        assert!(config.show_tile_outlines);
        assert_eq!(config.progress_debounce, Duration::from_millis(50));
        assert_eq!(config.tile_background, Rgba([0, 0, 0, 255]));
        assert_eq!(config.scene_background, RenderConfig::default().scene_background);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = write(&temp_dir, "[cache]\nsize = lots\n");
        let err = RenderConfig::load_from(&path).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: cache.size = 'lots' - must be a positive integer"
        );
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = write(&temp_dir, "[cache]\nsize = 0\n[workers]\nthreads = 0\n");
        let config = RenderConfig::load_from(&path).unwrap();
        assert_eq!(config.cache_size, 1);
        assert_eq!(config.worker_threads, 1);
    }

    #[test]
    fn test_save_then_load_preserves_settings() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.ini");
        let config = RenderConfig::default()
            .with_tile_size(64)
            .with_cache_size(12)
            .with_preemptive_fetch_number(0)
            .with_worker_threads(2)
            .with_show_tile_progress(false)
            .with_show_tile_outlines(true)
            .with_scene_background(Rgba([1, 2, 3, 4]));

        config.save_to(&path).unwrap();
        assert_eq!(RenderConfig::load_from(&path).unwrap(), config);
    }
}
