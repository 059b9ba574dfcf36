use std::path::Path;

use anyhow::Result;
use image::RgbImage;

use super::font::{draw_text, draw_text_centered, draw_text_right, draw_text_vertical, text_height};
use super::{
    colors, draw_filled_rect, draw_horizontal_line, draw_rect_outline, draw_vertical_line,
    draw_x_axis, format_tick, nice_ticks, save_png,
};

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 500;

const MARGIN_LEFT: u32 = 90;
const MARGIN_RIGHT: u32 = 30;
const MARGIN_TOP: u32 = 50;
const MARGIN_BOTTOM: u32 = 70;

const TITLE: &str = "Distribution of Wallet Scores";
const X_LABEL: &str = "Score";
const Y_LABEL: &str = "Number of Wallets";

/// Equal-width bins over `[min, max]` of the scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Bins {
    pub lo: f64,
    pub hi: f64,
    pub counts: Vec<usize>,
}

impl Bins {
    /// A degenerate range is widened by 0.5 on each side; the last bin is
    /// closed on the right.
    pub fn from_scores(scores: &[u32], bins: usize) -> Self {
        let bins = bins.max(1);
        let (mut lo, mut hi) = match (scores.iter().min(), scores.iter().max()) {
            (Some(&lo), Some(&hi)) => (f64::from(lo), f64::from(hi)),
            _ => (0.0, 1.0),
        };
        if hi <= lo {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;
        let mut counts = vec![0; bins];
        for &s in scores {
            let idx = ((f64::from(s) - lo) / width).floor() as usize;
            counts[idx.min(bins - 1)] += 1;
        }
        Self { lo, hi, counts }
    }

    pub fn width(&self) -> f64 {
        (self.hi - self.lo) / self.counts.len() as f64
    }
}

pub fn render_score_histogram(scores: &[u32], bins: usize) -> RgbImage {
    let hist = Bins::from_scores(scores, bins);
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, colors::WHITE);

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let x0 = MARGIN_LEFT;
    let y_base = MARGIN_TOP + plot_h;

    let max_count = hist.counts.iter().copied().max().unwrap_or(0).max(1);
    let y_ticks = nice_ticks(0.0, max_count as f64 * 1.05, 6);
    let y_top = y_ticks
        .last()
        .copied()
        .unwrap_or(1.0)
        .max(max_count as f64 * 1.05);

    let to_px_x = |v: f64| x0 as f64 + (v - hist.lo) / (hist.hi - hist.lo) * plot_w as f64;
    let to_px_h = |c: f64| (c / y_top * plot_h as f64).round() as u32;

    for y in &y_ticks {
        let py = y_base - to_px_h(*y);
        if *y > 0.0 {
            draw_horizontal_line(&mut img, py, x0 + 1, x0 + plot_w, colors::LIGHT_GRAY);
        }
        draw_horizontal_line(&mut img, py, x0 - 5, x0, colors::BLACK);
        draw_text_right(
            &mut img,
            i64::from(x0) - 9,
            i64::from(py) - i64::from(text_height(2)) / 2,
            &format_tick(*y, &y_ticks),
            2,
            colors::BLACK,
        );
    }

    let bin_w = hist.width();
    for (i, &count) in hist.counts.iter().enumerate() {
        let left = to_px_x(hist.lo + i as f64 * bin_w).round() as u32;
        let right = to_px_x(hist.lo + (i + 1) as f64 * bin_w).round() as u32;
        let h = to_px_h(count as f64);
        if h == 0 || right <= left {
            continue;
        }
        let top = y_base - h;
        draw_filled_rect(&mut img, left, top, right - left, h, colors::SKY_BLUE);
        draw_rect_outline(&mut img, left, top, right - left + 1, h + 1, colors::BLACK);
    }

    draw_vertical_line(&mut img, x0, MARGIN_TOP, y_base, colors::BLACK);
    let x_ticks = nice_ticks(hist.lo, hist.hi, 8);
    draw_x_axis(&mut img, y_base, (x0, x0 + plot_w), &x_ticks, to_px_x);

    draw_text_centered(
        &mut img,
        i64::from(WIDTH / 2),
        18,
        TITLE,
        3,
        colors::BLACK,
    );
    draw_text_centered(
        &mut img,
        i64::from(x0 + plot_w / 2),
        i64::from(HEIGHT) - 28,
        X_LABEL,
        2,
        colors::BLACK,
    );
    let label_len = i64::from(super::font::text_width(Y_LABEL, 2));
    draw_text_vertical(
        &mut img,
        18,
        i64::from(MARGIN_TOP + plot_h / 2) + label_len / 2,
        Y_LABEL,
        2,
        colors::BLACK,
    );
    if scores.is_empty() {
        draw_text(
            &mut img,
            i64::from(x0) + 20,
            i64::from(MARGIN_TOP) + 20,
            "no wallets",
            2,
            colors::GRAY,
        );
    }

    img
}

pub fn save_score_histogram(path: &Path, scores: &[u32], bins: usize) -> Result<()> {
    let img = render_score_histogram(scores, bins);
    save_png(&img, path)
}
