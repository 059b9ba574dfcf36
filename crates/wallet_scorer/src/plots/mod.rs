//! PNG charts drawn directly onto RGB buffers.

pub mod font;
pub mod histogram;
pub mod shap_summary;

use std::path::Path;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};

use self::font::draw_text_centered;

pub mod colors {
    use image::Rgb;

    pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    pub const GRAY: Rgb<u8> = Rgb([128, 128, 128]);
    pub const LIGHT_GRAY: Rgb<u8> = Rgb([220, 220, 220]);
    pub const SKY_BLUE: Rgb<u8> = Rgb([135, 206, 235]);
    /// Low end of the feature-value color scale.
    pub const LOW_BLUE: Rgb<u8> = Rgb([0, 138, 230]);
    /// High end of the feature-value color scale.
    pub const HIGH_RED: Rgb<u8> = Rgb([255, 0, 82]);
}

/// Fill a rectangle; pixels outside the image are skipped.
pub fn draw_filled_rect(
    img: &mut RgbImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    color: Rgb<u8>,
) {
    let x_end = x.saturating_add(width).min(img.width());
    let y_end = y.saturating_add(height).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, color);
        }
    }
}

pub fn draw_rect_outline(
    img: &mut RgbImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    color: Rgb<u8>,
) {
    if width == 0 || height == 0 {
        return;
    }
    let (x2, y2) = (x + width - 1, y + height - 1);
    draw_horizontal_line(img, y, x, x2, color);
    draw_horizontal_line(img, y2, x, x2, color);
    draw_vertical_line(img, x, y, y2, color);
    draw_vertical_line(img, x2, y, y2, color);
}

pub fn draw_vertical_line(img: &mut RgbImage, x: u32, y1: u32, y2: u32, color: Rgb<u8>) {
    let (start, end) = if y1 < y2 { (y1, y2) } else { (y2, y1) };
    if x >= img.width() || img.height() == 0 {
        return;
    }
    for y in start..=end.min(img.height() - 1) {
        img.put_pixel(x, y, color);
    }
}

pub fn draw_horizontal_line(img: &mut RgbImage, y: u32, x1: u32, x2: u32, color: Rgb<u8>) {
    let (start, end) = if x1 < x2 { (x1, x2) } else { (x2, x1) };
    if y >= img.height() || img.width() == 0 {
        return;
    }
    for x in start..=end.min(img.width() - 1) {
        img.put_pixel(x, y, color);
    }
}

/// Filled disc; accepts centers partly off-canvas.
pub fn draw_dot(img: &mut RgbImage, cx: i64, cy: i64, radius: i64, color: Rgb<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_checked(img, cx + dx, cy + dy, color);
            }
        }
    }
}

pub(crate) fn put_pixel_checked(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(img.width()) && y < i64::from(img.height()) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

pub fn interpolate_color(c1: Rgb<u8>, c2: Rgb<u8>, t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| ((1.0 - t) * f64::from(a) + t * f64::from(b)).round() as u8;
    Rgb([
        mix(c1.0[0], c2.0[0]),
        mix(c1.0[1], c2.0[1]),
        mix(c1.0[2], c2.0[2]),
    ])
}

/// Horizontal axis from `x0` to `x1` at `y`, with a 5px mark and a label
/// under each tick. `to_px` maps a data value to its pixel column.
pub fn draw_x_axis(
    img: &mut RgbImage,
    y: u32,
    (x0, x1): (u32, u32),
    ticks: &[f64],
    to_px: impl Fn(f64) -> f64,
) {
    draw_horizontal_line(img, y, x0, x1, colors::BLACK);
    for &v in ticks {
        let px = to_px(v).round() as u32;
        draw_vertical_line(img, px, y, y + 5, colors::BLACK);
        draw_text_centered(
            img,
            i64::from(px),
            i64::from(y) + 10,
            &format_tick(v, ticks),
            2,
            colors::BLACK,
        );
    }
}

/// Round tick positions covering `[lo, hi]`, roughly `target` of them.
pub fn nice_ticks(lo: f64, hi: f64, target: usize) -> Vec<f64> {
    let span = hi - lo;
    if !span.is_finite() || span <= 0.0 || target == 0 {
        return vec![lo];
    }
    let step = nice_step(span / target as f64);
    let first = (lo / step).ceil();
    let last = (hi / step).floor();
    let mut ticks = Vec::new();
    let mut k = first;
    while k <= last {
        let v = k * step;
        ticks.push(if v.abs() < step * 1e-9 { 0.0 } else { v });
        k += 1.0;
    }
    ticks
}

fn nice_step(raw: f64) -> f64 {
    let mag = 10f64.powf(raw.log10().floor());
    let norm = raw / mag;
    let nice = if norm <= 1.0 {
        1.0
    } else if norm <= 2.0 {
        2.0
    } else if norm <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * mag
}

/// Tick label with just enough decimals for the tick spacing.
pub fn format_tick(v: f64, ticks: &[f64]) -> String {
    let step = match ticks {
        [a, b, ..] => (b - a).abs(),
        _ => 1.0,
    };
    if step >= 1.0 {
        format!("{v:.0}")
    } else {
        let decimals = (-step.log10()).ceil().max(0.0) as usize;
        format!("{v:.decimals$}")
    }
}

/// Write `img` as PNG, overwriting `path`.
pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "plot written"
    );
    Ok(())
}
