//! CLI error handling with user-friendly messages.
//!
//! Every command returns [`CliError`]; `main` prints it and picks the exit
//! code in one place.

use std::fmt;
use std::path::PathBuf;
use std::process;
use voltile::config::ConfigError;
use voltile::logging::LoggingError;
use voltile::scene::SceneError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(LoggingError),
    /// Configuration file could not be read or written
    Config(ConfigError),
    /// Bad command-line value
    InvalidArgument(String),
    /// Slice scene could not be built
    Scene(SceneError),
    /// Failed to write the rendered image
    ImageWrite {
        path: PathBuf,
        error: image::ImageError,
    },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Fix the value in the file, or regenerate it with:");
                eprintln!("  voltile config init --force");
            }
            CliError::InvalidArgument(_) => {
                eprintln!();
                eprintln!("Run 'voltile --help' for usage.");
            }
            _ => {}
        }

        process::exit(match self {
            CliError::InvalidArgument(_) => 2,
            _ => 1,
        })
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "{}", msg),
            CliError::Scene(e) => write!(f, "Failed to build slice view: {}", e),
            CliError::ImageWrite { path, error } => {
                write!(f, "Failed to write image '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Scene(e) => Some(e),
            CliError::ImageWrite { error, .. } => Some(error),
            CliError::InvalidArgument(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<SceneError> for CliError {
    fn from(e: SceneError) -> Self {
        CliError::Scene(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::LoggingInit(e)
    }
}
