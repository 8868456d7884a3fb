//! Common types and utilities shared across CLI commands.

use clap::ValueEnum;

/// Spatial axis a view slices through.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum SliceAxis {
    /// Show the y/z plane
    X,
    /// Show the x/z plane
    Y,
    /// Show the x/y plane
    Z,
}

impl SliceAxis {
    /// Index among the spatial axes (0 = x, 1 = y, 2 = z).
    pub fn index(self) -> usize {
        match self {
            SliceAxis::X => 0,
            SliceAxis::Y => 1,
            SliceAxis::Z => 2,
        }
    }
}

/// Parse a volume shape written as `t,x,y,z,c`.
///
/// Used as a clap value parser.
pub fn parse_shape(s: &str) -> Result<[usize; 5], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 5 {
        return Err(format!(
            "expected 5 comma-separated extents (t,x,y,z,c), got {}",
            parts.len()
        ));
    }

    let mut shape = [0usize; 5];
    for (extent, part) in shape.iter_mut().zip(&parts) {
        *extent = part
            .parse()
            .map_err(|_| format!("'{}' is not a whole number", part))?;
        if *extent == 0 {
            return Err("every extent must be at least 1".to_string());
        }
    }
    Ok(shape)
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
