use crate::config::ChartConfig;
use anyhow::{anyhow, bail, Context, Result};
use image::{ImageBuffer, ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

// Plot area insets in pixels
const MARGIN_LEFT: u32 = 40;
const MARGIN_RIGHT: u32 = 10;
const MARGIN_TOP: u32 = 10;
const MARGIN_BOTTOM: u32 = 20;

// Fractions of one bucket slot
const BAR_WIDTH: f64 = 0.4;
const SLOT_PAD: f64 = 0.1;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const AXIS: Rgba<u8> = Rgba([60, 60, 60, 255]);
const GRID: Rgba<u8> = Rgba([225, 225, 225, 255]);

/// Grouped bar chart of two proportion vectors over the same age buckets.
///
/// The query series is drawn on the left of each slot, the match on the right.
pub fn render_comparison(config: &ChartConfig, query: &[f64], matched: &[f64]) -> Result<RgbaImage> {
    if query.len() != matched.len() {
        bail!("Series length mismatch: {} vs {} buckets", query.len(), matched.len());
    }
    if query.is_empty() {
        bail!("Nothing to plot");
    }
    if config.width <= MARGIN_LEFT + MARGIN_RIGHT || config.height <= MARGIN_TOP + MARGIN_BOTTOM {
        bail!("Chart size {}x{} is too small", config.width, config.height);
    }

    let query_color = hex_to_rgba(&config.query_color)?;
    let match_color = hex_to_rgba(&config.match_color)?;

    let mut img: RgbaImage = ImageBuffer::from_pixel(config.width, config.height, BACKGROUND);

    let plot_w = (config.width - MARGIN_LEFT - MARGIN_RIGHT) as f64;
    let plot_h = (config.height - MARGIN_TOP - MARGIN_BOTTOM) as f64;
    let baseline = (config.height - MARGIN_BOTTOM) as f64;

    let peak = query
        .iter()
        .chain(matched)
        .cloned()
        .fold(0.0_f64, f64::max);
    let scale = if peak > 0.0 { plot_h / (peak * 1.05) } else { 0.0 };

    for step in 1..=4 {
        let y = baseline - plot_h * step as f64 / 4.0;
        fill_rect(&mut img, MARGIN_LEFT as f64, y, MARGIN_LEFT as f64 + plot_w, y + 1.0, GRID);
    }

    let slot = plot_w / query.len() as f64;
    for (i, (&q, &m)) in query.iter().zip(matched).enumerate() {
        let x0 = MARGIN_LEFT as f64 + i as f64 * slot + SLOT_PAD * slot;
        let bar = BAR_WIDTH * slot;
        fill_rect(&mut img, x0, baseline - q * scale, x0 + bar, baseline, query_color);
        fill_rect(&mut img, x0 + bar, baseline - m * scale, x0 + 2.0 * bar, baseline, match_color);
    }

    fill_rect(&mut img, MARGIN_LEFT as f64, baseline, MARGIN_LEFT as f64 + plot_w, baseline + 1.0, AXIS);
    fill_rect(&mut img, MARGIN_LEFT as f64 - 1.0, MARGIN_TOP as f64, MARGIN_LEFT as f64, baseline + 1.0, AXIS);

    debug!(buckets = query.len(), peak, "Rendered comparison chart");
    Ok(img)
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .context("Failed to encode chart as PNG")?;
    Ok(bytes)
}

pub fn save_chart(img: &RgbaImage, path: &Path) -> Result<()> {
    img.save(path)
        .with_context(|| format!("Failed to save chart {:?}", path))
}

/// Fills the pixel rows/columns covered by `[x0, x1) x [y0, y1)`, clipped to the image.
fn fill_rect(img: &mut RgbaImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let clamp_x = |v: f64| v.round().clamp(0.0, w as f64) as u32;
    let clamp_y = |v: f64| v.round().clamp(0.0, h as f64) as u32;
    let (x0, x1) = (clamp_x(x0), clamp_x(x1));
    let (y0, y1) = (clamp_y(y0), clamp_y(y1));

    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, color);
        }
    }
}

pub fn hex_to_rgba(hex: &str) -> Result<Rgba<u8>> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(anyhow!("Invalid colour '{}', expected #rrggbb", hex));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|_| anyhow!("Invalid colour '{}'", hex))
    };
    Ok(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255]))
}
