//! Configuration management CLI commands.
//!
//! `config path`, `config show` and `config init` view and create
//! `~/.voltile/config.ini`.

use clap::Subcommand;
use std::path::{Path, PathBuf};
use voltile::config::{config_file_path, RenderConfig};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective settings (file values over defaults)
    Show {
        /// Read this file instead of the default location
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Write a configuration file holding the default settings
    Init {
        /// Write here instead of the default location
        #[arg(long)]
        file: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
        ConfigCommands::Show { file } => {
            let path = file.unwrap_or_else(config_file_path);
            print!("{}", show(&path)?);
            Ok(())
        }
        ConfigCommands::Init { file, force } => {
            let path = file.unwrap_or_else(config_file_path);
            init(&path, force)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

fn show(path: &Path) -> Result<String, CliError> {
    let config = RenderConfig::load_from(path)?;
    let origin = if path.exists() {
        format!("; loaded from {}\n", path.display())
    } else {
        format!("; {} not found, showing defaults\n", path.display())
    };
    Ok(origin + &config.to_ini_string())
}

fn init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }
    RenderConfig::default().save_to(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        init(&path, false).unwrap();

        assert_eq!(RenderConfig::load_from(&path).unwrap(), RenderConfig::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[cache]\nsize = 7\n").unwrap();

        assert!(matches!(init(&path, false), Err(CliError::InvalidArgument(_))));
        assert_eq!(RenderConfig::load_from(&path).unwrap().cache_size, 7);

        init(&path, true).unwrap();
        assert_eq!(RenderConfig::load_from(&path).unwrap().cache_size, 100);
    }

    #[test]
    fn test_show_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let text = show(&dir.path().join("absent.ini")).unwrap();
        assert!(text.contains("not found"));
        assert!(text.contains("[cache]"));
    }
}
