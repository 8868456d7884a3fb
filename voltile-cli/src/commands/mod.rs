//! CLI command implementations.
//!
//! - [`common`] - Argument types shared by commands
//! - [`config`] - Configuration management (path, show, init)
//! - [`render`] - Render and scroll a synthetic volume

pub mod common;
pub mod config;
pub mod render;
