//! Render settings and their INI file representation.
//!
//! [`RenderConfig`] holds every tunable of a slice view. It can be built in
//! code with the `with_*` setters or loaded from `~/.voltile/config.ini`:
//!
//! ```ini
//! [tiling]
//! tile_size = 256
//!
//! [cache]
//! size = 100
//!
//! [prefetch]
//! slices = 5
//!
//! [workers]
//! threads = 8
//!
//! [display]
//! show_tile_progress = true
//! show_tile_outlines = false
//! progress_debounce_ms = 300
//! tile_background = #ffffffff
//! scene_background = #dcdcdcff
//! ```
//!
//! Missing files and keys fall back to defaults; unknown keys are ignored.

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigError};
pub use parser::parse_color;
pub use settings::RenderConfig;
pub use writer::format_color;
