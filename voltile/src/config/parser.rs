//! INI → [`RenderConfig`].

use super::defaults::{clamp_cache_size, clamp_tile_size, clamp_worker_threads};
use super::file::ConfigError;
use super::settings::RenderConfig;
use image::Rgba;
use ini::Ini;
use std::str::FromStr;
use std::time::Duration;

/// Start from defaults and overlay every recognised key of `ini`.
pub(super) fn parse_ini(ini: &Ini) -> Result<RenderConfig, ConfigError> {
    let mut config = RenderConfig::default();

    if let Some(section) = ini.section(Some("tiling")) {
        if let Some(v) = section.get("tile_size") {
            config.tile_size = clamp_tile_size(parse_number("tiling", "tile_size", v)?);
        }
    }

    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("size") {
            config.cache_size = clamp_cache_size(parse_number("cache", "size", v)?);
        }
    }

    if let Some(section) = ini.section(Some("prefetch")) {
        if let Some(v) = section.get("slices") {
            config.preemptive_fetch_number = parse_number("prefetch", "slices", v)?;
        }
    }

    if let Some(section) = ini.section(Some("workers")) {
        if let Some(v) = section.get("threads") {
            let v = v.trim();
            // "auto" keeps the per-core default.
            if !v.eq_ignore_ascii_case("auto") {
                config.worker_threads = clamp_worker_threads(parse_number("workers", "threads", v)?);
            }
        }
    }

    if let Some(section) = ini.section(Some("display")) {
        if let Some(v) = section.get("show_tile_progress") {
            config.show_tile_progress = parse_bool(v);
        }
        if let Some(v) = section.get("show_tile_outlines") {
            config.show_tile_outlines = parse_bool(v);
        }
        if let Some(v) = section.get("progress_debounce_ms") {
            config.progress_debounce =
                Duration::from_millis(parse_number("display", "progress_debounce_ms", v)?);
        }
        if let Some(v) = section.get("tile_background") {
            config.tile_background = parse_color(v).ok_or_else(|| invalid_color("tile_background", v))?;
        }
        if let Some(v) = section.get("scene_background") {
            config.scene_background =
                parse_color(v).ok_or_else(|| invalid_color("scene_background", v))?;
        }
    }

    Ok(config)
}

fn parse_number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: "must be a positive integer".to_string(),
    })
}

fn invalid_color(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: "display".to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: "expected '#rrggbb' or '#rrggbbaa'".to_string(),
    }
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Parse `#rrggbb` (opaque) or `#rrggbbaa`; the `#` is optional.
pub fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim();
    let hex = value.strip_prefix('#').unwrap_or(value);
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}
