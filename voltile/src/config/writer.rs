//! [`RenderConfig`] → commented INI text.

use super::settings::RenderConfig;
use image::Rgba;

pub(super) fn to_config_string(config: &RenderConfig) -> String {
    format!(
        r#"[tiling]
; Tile edge length in display pixels ({min}-{max})
tile_size = {tile_size}

[cache]
; Maximum number of cached tiles. Tiles on screen are never evicted, so the
; cache may briefly grow past this while the view covers more tiles.
size = {cache_size}

[prefetch]
; Slices computed ahead along the direction you are scrolling (0 disables)
slices = {slices}

[workers]
; Worker threads computing tiles
threads = {threads}

[display]
show_tile_progress = {show_progress}
; Draw a dashed border around every tile
show_tile_outlines = {show_outlines}
; Incomplete tiles show a progress pie only after this delay
progress_debounce_ms = {debounce}
tile_background = {tile_background}
scene_background = {scene_background}
"#,
        min = super::defaults::MIN_TILE_SIZE,
        max = super::defaults::MAX_TILE_SIZE,
        tile_size = config.tile_size,
        cache_size = config.cache_size,
        slices = config.preemptive_fetch_number,
        threads = config.worker_threads,
        show_progress = config.show_tile_progress,
        show_outlines = config.show_tile_outlines,
        debounce = config.progress_debounce.as_millis(),
        tile_background = format_color(config.tile_background),
        scene_background = format_color(config.scene_background),
    )
}

impl RenderConfig {
    /// The settings as commented INI text, in the layout `save_to` writes.
    pub fn to_ini_string(&self) -> String {
        to_config_string(self)
    }
}

/// `#rrggbbaa`
pub fn format_color(color: Rgba<u8>) -> String {
    format!(
        "#{:02x}{:02x}{:02x}{:02x}",
        color[0], color[1], color[2], color[3]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_color() {
        assert_eq!(format_color(Rgba([220, 220, 220, 255])), "#dcdcdcff");
    }

    #[test]
    fn test_output_has_every_section() {
        let text = to_config_string(&RenderConfig::default());
        for section in ["[tiling]", "[cache]", "[prefetch]", "[workers]", "[display]"] {
            assert!(text.contains(section), "missing {}", section);
        }
        assert!(text.contains("size = 100"));
    }
}
