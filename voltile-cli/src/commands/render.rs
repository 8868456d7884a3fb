//! Render command - paint a slice view of a synthetic volume.
//!
//! Builds a gradient volume (plus an optional translucent overlay), renders
//! the full view once the cache has filled, then steps through `--scroll`
//! slices the way a user dragging a slider would and reports how many tiles
//! were already warm when each slice arrived.

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use voltile::config::{parse_color, RenderConfig};
use voltile::layer::{ConstantSource, GradientSource, LayerStack};
use voltile::logging::{default_log_dir, default_log_file, init_logging};
use voltile::position::PositionModel;
use voltile::scene::SliceScene;

use super::common::{format_size, parse_shape, SliceAxis};
use crate::error::CliError;

/// Arguments for the render command.
#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Volume shape as t,x,y,z,c
    #[arg(long, default_value = "1,512,512,64,1", value_parser = parse_shape)]
    pub shape: [usize; 5],

    /// Spatial axis the view slices through
    #[arg(long, value_enum, default_value = "z")]
    pub axis: SliceAxis,

    /// Slices to step through after the first render
    #[arg(long, default_value = "8")]
    pub scroll: usize,

    /// Simulated per-fetch latency of the volume source, in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,

    /// Paint a translucent overlay of this colour (#rrggbb or #rrggbbaa)
    #[arg(long)]
    pub overlay: Option<String>,

    /// Overlay opacity (0.0-1.0)
    #[arg(long, default_value = "0.5")]
    pub overlay_opacity: f32,

    /// Quarter turns clockwise (negative turns counter-clockwise)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub rotate: i32,

    /// Cache size override
    #[arg(long)]
    pub cache_size: Option<usize>,

    /// Tile size override
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Prefetch depth override
    #[arg(long)]
    pub prefetch: Option<usize>,

    /// Draw a dashed border around every tile
    #[arg(long)]
    pub outlines: bool,

    /// Read settings from this file instead of ~/.voltile/config.ini
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Save the final frame as PNG
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Only log to file
    #[arg(long)]
    pub quiet: bool,
}

/// Run the render command.
pub fn run(args: RenderArgs) -> Result<(), CliError> {
    let log_dir = default_log_dir();
    let _guard = init_logging(&log_dir, default_log_file(), args.quiet)?;

    let config = load_config(&args)?;
    let overlay = args
        .overlay
        .as_deref()
        .map(|text| {
            parse_color(text).ok_or_else(|| {
                CliError::InvalidArgument(format!("'{}' is not a colour like #ff0000", text))
            })
        })
        .transpose()?;

    let position = Arc::new(PositionModel::new(args.shape));
    let layers = Arc::new(LayerStack::new());
    layers.add(Arc::new(
        GradientSource::new().with_latency(Duration::from_millis(args.latency_ms)),
    ));
    if let Some(color) = overlay {
        layers.add_with(Arc::new(ConstantSource::new(color)), true, args.overlay_opacity);
    }

    let mut scene = SliceScene::new(Arc::clone(&position), layers, args.axis.index(), config)?;
    for _ in 0..args.rotate.unsigned_abs() % 4 {
        if args.rotate > 0 {
            scene.rotate_right()?;
        } else {
            scene.rotate_left()?;
        }
    }

    let view = scene.scene_rect();
    let (width, height) = scene.data_shape();
    println!("Volume {:?}, slicing {:?}", args.shape, args.axis);
    println!(
        "  Slice: {}x{} data pixels, {} tiles of {}px",
        width,
        height,
        scene.tiling().len(),
        scene.config().tile_size
    );
    println!(
        "  Cache: {} tiles, prefetching {} slices",
        scene.cache_size(),
        scene.preemptive_fetch_number()
    );
    println!();

    let start = Instant::now();
    scene.render(&view);
    scene.join_rendering();
    let mut frame = scene.render(&view);
    println!(
        "First frame at {} in {:.2}s",
        scene.through(),
        start.elapsed().as_secs_f64()
    );

    let axis = args.axis.index();
    for _ in 0..args.scroll {
        let before = scene.through();
        position.change_slice_relative(axis, 1);
        scene.process_events()?;
        if scene.through() == before {
            println!("Reached the last slice");
            break;
        }

        let tiles = scene.tiles(&view);
        let warm = tiles.iter().filter(|t| t.is_complete()).count();
        println!("  {}: {}/{} tiles warm on arrival", scene.through(), warm, tiles.len());
        info!(through = %scene.through(), warm, total = tiles.len(), "slice reached");

        scene.render(&view);
        scene.join_rendering();
        frame = scene.render(&view);
    }

    println!();
    println!("Cache holds {} tiles", scene.provider().len());
    println!("{}", scene.provider().stats());

    if let Some(path) = &args.output {
        frame.save(path).map_err(|error| CliError::ImageWrite {
            path: path.clone(),
            error,
        })?;
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        println!("✓ Saved {} ({})", path.display(), format_size(size));
    }

    scene.shutdown();
    Ok(())
}

fn load_config(args: &RenderArgs) -> Result<RenderConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => RenderConfig::load_from(path)?,
        None => RenderConfig::load()?,
    };
    if let Some(size) = args.cache_size {
        config = config.with_cache_size(size);
    }
    if let Some(size) = args.tile_size {
        config = config.with_tile_size(size);
    }
    if let Some(slices) = args.prefetch {
        config = config.with_preemptive_fetch_number(slices);
    }
    if args.outlines {
        config = config.with_show_tile_outlines(true);
    }
    if !(0.0..=1.0).contains(&args.overlay_opacity) {
        return Err(CliError::InvalidArgument(format!(
            "overlay opacity must be between 0.0 and 1.0, got {}",
            args.overlay_opacity
        )));
    }
    Ok(config)
}
