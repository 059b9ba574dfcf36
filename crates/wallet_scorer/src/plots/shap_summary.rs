//! Beeswarm summary of per-wallet SHAP values.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use image::RgbImage;

use super::font::{
    draw_text_centered, draw_text_right, draw_text_vertical, text_height, text_width,
};
use super::{
    colors, draw_dot, draw_filled_rect, draw_horizontal_line, draw_vertical_line, draw_x_axis,
    interpolate_color, nice_ticks, save_png,
};
use crate::model::tree_shap::ShapExplanation;

pub const WIDTH: u32 = 1000;
pub const HEIGHT: u32 = 700;

const MARGIN_LEFT: u32 = 210;
const MARGIN_RIGHT: u32 = 110;
const MARGIN_TOP: u32 = 30;
const MARGIN_BOTTOM: u32 = 70;
const DOT_RADIUS: i64 = 2;
/// Horizontal pixel bucket used to stack overlapping dots.
const SWARM_BUCKET: i64 = 4;

const X_LABEL: &str = "SHAP value (impact on model output)";

/// Interpolated percentile (`q` in [0, 1]) of unsorted values.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// `rows[i]` holds the feature values of the wallet explained by
/// `explanation.values[i]`.
pub fn render_shap_summary(explanation: &ShapExplanation, rows: &[Vec<f64>]) -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, colors::WHITE);
    let n_features = explanation.feature_names.len();

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let x0 = MARGIN_LEFT;
    let y_axis = MARGIN_TOP + plot_h;

    let (lo, hi) = shap_range(explanation);
    let to_px_x = |v: f64| f64::from(x0) + (v - lo) / (hi - lo) * f64::from(plot_w);

    let zero_x = to_px_x(0.0).round() as u32;
    draw_vertical_line(&mut img, zero_x, MARGIN_TOP, y_axis, colors::GRAY);

    let row_h = if n_features == 0 {
        plot_h
    } else {
        plot_h / n_features as u32
    };
    let max_offset = (i64::from(row_h) / 2 - DOT_RADIUS - 1).max(0);

    for (slot, &feature) in explanation.ranking().iter().enumerate() {
        let center_y = i64::from(MARGIN_TOP + row_h * slot as u32 + row_h / 2);
        draw_horizontal_line(
            &mut img,
            center_y as u32,
            x0,
            x0 + plot_w,
            colors::LIGHT_GRAY,
        );
        draw_text_right(
            &mut img,
            i64::from(x0) - 10,
            center_y - i64::from(text_height(2)) / 2,
            &explanation.feature_names[feature],
            2,
            colors::BLACK,
        );

        let feature_values: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.get(feature).copied())
            .collect();
        let vmin = percentile(&feature_values, 0.05).unwrap_or(0.0);
        let vmax = percentile(&feature_values, 0.95).unwrap_or(0.0);

        let mut dots: Vec<(f64, f64)> = explanation
            .values
            .iter()
            .zip(rows)
            .filter_map(|(phi, row)| Some((*phi.get(feature)?, *row.get(feature)?)))
            .collect();
        dots.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut stacks: HashMap<i64, i64> = HashMap::new();
        for (phi, value) in dots {
            let px = to_px_x(phi).round() as i64;
            let depth = stacks.entry(px / SWARM_BUCKET).or_insert(0);
            let offset = swarm_offset(*depth, max_offset);
            *depth += 1;

            let t = if vmax > vmin {
                (value - vmin) / (vmax - vmin)
            } else {
                0.5
            };
            let color = interpolate_color(colors::LOW_BLUE, colors::HIGH_RED, t);
            draw_dot(&mut img, px, center_y + offset, DOT_RADIUS, color);
        }
    }

    let ticks = nice_ticks(lo, hi, 8);
    draw_x_axis(&mut img, y_axis, (x0, x0 + plot_w), &ticks, to_px_x);
    draw_text_centered(
        &mut img,
        i64::from(x0 + plot_w / 2),
        i64::from(HEIGHT) - 28,
        X_LABEL,
        2,
        colors::BLACK,
    );

    draw_color_bar(&mut img, MARGIN_TOP, plot_h);
    img
}

/// Symmetric-ish x range that always contains zero.
fn shap_range(explanation: &ShapExplanation) -> (f64, f64) {
    let all = explanation.values.iter().flatten().copied().filter(|v| v.is_finite());
    let (mut lo, mut hi) = all.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if hi - lo <= f64::EPSILON {
        lo -= 1.0;
        hi += 1.0;
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

/// Alternating offsets 0, -s, +s, -2s, ... clamped to the row.
fn swarm_offset(depth: i64, max_offset: i64) -> i64 {
    if max_offset == 0 {
        return 0;
    }
    let step = DOT_RADIUS;
    let k = (depth + 1) / 2;
    let raw = if depth % 2 == 1 { -k * step } else { k * step };
    // Wrap back into the row once the stack outgrows it.
    if raw.abs() > max_offset {
        let span = 2 * max_offset + 1;
        (raw + max_offset).rem_euclid(span) - max_offset
    } else {
        raw
    }
}

fn draw_color_bar(img: &mut RgbImage, top: u32, plot_h: u32) {
    let bar_x = WIDTH - MARGIN_RIGHT + 40;
    let bar_w = 12;
    let bar_h = plot_h * 6 / 10;
    let bar_top = top + (plot_h - bar_h) / 2;

    for dy in 0..bar_h {
        let t = 1.0 - f64::from(dy) / f64::from(bar_h.max(2) - 1);
        let color = interpolate_color(colors::LOW_BLUE, colors::HIGH_RED, t);
        draw_filled_rect(img, bar_x, bar_top + dy, bar_w, 1, color);
    }

    draw_text_centered(
        img,
        i64::from(bar_x + bar_w / 2),
        i64::from(bar_top) - 14,
        "High",
        2,
        colors::BLACK,
    );
    draw_text_centered(
        img,
        i64::from(bar_x + bar_w / 2),
        i64::from(bar_top + bar_h) + 6,
        "Low",
        2,
        colors::BLACK,
    );
    let label = "Feature value";
    let label_len = i64::from(text_width(label, 2));
    draw_text_vertical(
        img,
        i64::from(bar_x + bar_w + 10),
        i64::from(bar_top + bar_h / 2) + label_len / 2,
        label,
        2,
        colors::BLACK,
    );
}

pub fn save_shap_summary(
    path: &Path,
    explanation: &ShapExplanation,
    rows: &[Vec<f64>],
) -> Result<()> {
    if explanation.values.is_empty() {
        tracing::warn!("no SHAP values to plot");
    }
    let img = render_shap_summary(explanation, rows);
    save_png(&img, path)?;

    let importance = explanation.mean_abs();
    for &f in explanation.ranking().iter().take(5) {
        tracing::info!(
            feature = %explanation.feature_names[f],
            mean_abs_shap = importance[f],
            "top feature"
        );
    }
    Ok(())
}
