//! 3x5 bitmap font for chart labels. Letters are case-insensitive; characters
//! without a glyph render as blanks.

use image::{Rgb, RgbImage};

use super::put_pixel_checked;

pub const GLYPH_WIDTH: u32 = 3;
pub const GLYPH_HEIGHT: u32 = 5;
/// Horizontal distance between glyph origins, in font pixels.
const ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Each row is 3 bits, most significant bit leftmost.
fn glyph(c: char) -> Option<[u8; 5]> {
    let rows = match c.to_ascii_uppercase() {
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b110, 0b001, 0b010, 0b100, 0b111],
        '3' => [0b110, 0b001, 0b010, 0b001, 0b110],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b110, 0b001, 0b110],
        '6' => [0b011, 0b100, 0b110, 0b101, 0b010],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b010, 0b101, 0b010, 0b101, 0b010],
        '9' => [0b010, 0b101, 0b011, 0b001, 0b110],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '(' => [0b001, 0b010, 0b010, 0b010, 0b001],
        ')' => [0b100, 0b010, 0b010, 0b010, 0b100],
        '|' => [0b010, 0b010, 0b010, 0b010, 0b010],
        _ => return None,
    };
    Some(rows)
}

/// Rendered width in image pixels.
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        0
    } else {
        (n * ADVANCE - 1) * scale
    }
}

pub fn text_height(scale: u32) -> u32 {
    GLYPH_HEIGHT * scale
}

/// Draw `text` with its top-left corner at `(x, y)`.
pub fn draw_text(img: &mut RgbImage, x: i64, y: i64, text: &str, scale: u32, color: Rgb<u8>) {
    let s = i64::from(scale);
    for (k, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else {
            continue;
        };
        let origin = x + k as i64 * i64::from(ADVANCE) * s;
        for_each_lit(rows, |gx, gy| {
            fill_block(img, origin + gx * s, y + gy * s, s, color);
        });
    }
}

/// Draw `text` rotated a quarter turn counter-clockwise, reading bottom to
/// top, with the baseline's bottom-left corner at `(x, y)`.
pub fn draw_text_vertical(
    img: &mut RgbImage,
    x: i64,
    y: i64,
    text: &str,
    scale: u32,
    color: Rgb<u8>,
) {
    let s = i64::from(scale);
    for (k, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else {
            continue;
        };
        let along = k as i64 * i64::from(ADVANCE);
        for_each_lit(rows, |gx, gy| {
            fill_block(img, x + gy * s, y - (along + gx + 1) * s, s, color);
        });
    }
}

pub fn draw_text_centered(
    img: &mut RgbImage,
    center_x: i64,
    y: i64,
    text: &str,
    scale: u32,
    color: Rgb<u8>,
) {
    let x = center_x - i64::from(text_width(text, scale)) / 2;
    draw_text(img, x, y, text, scale, color);
}

/// Right edge of the text lands at `right_x`.
pub fn draw_text_right(
    img: &mut RgbImage,
    right_x: i64,
    y: i64,
    text: &str,
    scale: u32,
    color: Rgb<u8>,
) {
    let x = right_x - i64::from(text_width(text, scale));
    draw_text(img, x, y, text, scale, color);
}

fn for_each_lit(rows: [u8; 5], mut f: impl FnMut(i64, i64)) {
    for (gy, bits) in rows.iter().enumerate() {
        for gx in 0..GLYPH_WIDTH {
            if bits & (0b100 >> gx) != 0 {
                f(i64::from(gx), gy as i64);
            }
        }
    }
}

fn fill_block(img: &mut RgbImage, x: i64, y: i64, size: i64, color: Rgb<u8>) {
    for dy in 0..size {
        for dx in 0..size {
            put_pixel_checked(img, x + dx, y + dy, color);
        }
    }
}
