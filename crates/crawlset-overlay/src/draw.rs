//! Raster drawing of boxes and labels.

use std::collections::HashMap;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};

use crate::dataset::{AnnotationEntry, DatasetIndex};

/// Default color cycle, assigned over category ids in ascending order.
pub const PALETTE: [[u8; 3]; 10] = [
    [0x1f, 0x77, 0xb4],
    [0xff, 0x7f, 0x0e],
    [0x2c, 0xa0, 0x2c],
    [0xd6, 0x27, 0x28],
    [0x94, 0x67, 0xbd],
    [0x8c, 0x56, 0x4b],
    [0xe3, 0x77, 0xc2],
    [0x7f, 0x7f, 0x7f],
    [0xbc, 0xbd, 0x22],
    [0x17, 0xbe, 0xcf],
];

const FALLBACK_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LABEL_TEXT_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const LABEL_HEIGHT: i32 = 18;
const LABEL_MIN_WIDTH: i32 = 40;
const LABEL_CHAR_WIDTH: i32 = 7;
/// 0.8 opacity.
const LABEL_ALPHA: u8 = 204;

/// Stable color per category id.
pub fn category_colors(index: &DatasetIndex) -> HashMap<u32, Rgba<u8>> {
    index
        .categories
        .keys()
        .zip(PALETTE.iter().cycle())
        .map(|(id, [r, g, b])| (*id, Rgba([*r, *g, *b, 255])))
        .collect()
}

/// Outline thickness for an image of the given size.
pub fn line_width(width: u32, height: u32) -> u32 {
    let scaled = f64::from(width.min(height)) * 0.002;
    scaled.max(1.5).ceil() as u32
}

/// Box and label style.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayStyle {
    /// Fixed outline thickness; derived from the image size when unset.
    pub line_width: Option<u32>,
}

/// Draw every annotation of one image: an outline per box and a
/// `<category>#<annotation id>` label above it.
pub fn draw_overlay(
    img: &mut RgbaImage,
    annotations: &[AnnotationEntry],
    index: &DatasetIndex,
    colors: &HashMap<u32, Rgba<u8>>,
    style: OverlayStyle,
) {
    let thickness = style
        .line_width
        .unwrap_or_else(|| line_width(img.width(), img.height()));

    for ann in annotations {
        let color = colors.get(&ann.category_id).copied().unwrap_or(FALLBACK_COLOR);
        let [x, y, w, h] = ann.bbox;
        draw_rect_outline(
            img,
            x.round().max(0.0) as u32,
            y.round().max(0.0) as u32,
            w.round().max(0.0) as u32,
            h.round().max(0.0) as u32,
            color,
            thickness,
        );

        let label = format!("{}#{}", index.category_name(ann.category_id), ann.id);
        draw_label(img, x.round() as i32, y.round() as i32, &label, color);
    }
}

/// Filled label background above `(x, y)`, clamped to the image, with the
/// text on top.
fn draw_label(img: &mut RgbaImage, x: i32, y: i32, label: &str, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let width = LABEL_MIN_WIDTH.max(label.chars().count() as i32 * LABEL_CHAR_WIDTH);
    let max_x = (img.width() as i32 - width).max(0);
    let max_y = (img.height() as i32 - LABEL_HEIGHT).max(0);
    let bg_x = x.clamp(0, max_x);
    let bg_y = y.saturating_sub(LABEL_HEIGHT).clamp(0, max_y);

    let Rgba([r, g, b, _]) = color;
    fill_rect_alpha(
        img,
        bg_x,
        bg_y,
        bg_x + width - 1,
        bg_y + LABEL_HEIGHT - 1,
        Rgba([r, g, b, LABEL_ALPHA]),
    );
    draw_bitmap_text(img, bg_x + 4, bg_y + (LABEL_HEIGHT - 8) / 2, label, LABEL_TEXT_COLOR);
}

pub fn draw_rect_outline(
    img: &mut RgbaImage,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    color: Rgba<u8>,
    thickness: u32,
) {
    if w == 0 || h == 0 || img.width() == 0 || img.height() == 0 {
        return;
    }
    let img_w = img.width();
    let img_h = img.height();

    let x0 = x.min(img_w - 1);
    let y0 = y.min(img_h - 1);
    let x1 = x.saturating_add(w).saturating_sub(1).min(img_w - 1);
    let y1 = y.saturating_add(h).saturating_sub(1).min(img_h - 1);

    // Grow inward so the stroke stays on the box.
    for t in 0..thickness.max(1) {
        let tx0 = (x0 + t).min(x1);
        let ty0 = (y0 + t).min(y1);
        let tx1 = x1.saturating_sub(t).max(tx0);
        let ty1 = y1.saturating_sub(t).max(ty0);

        for xx in tx0..=tx1 {
            img.put_pixel(xx, ty0, color);
            img.put_pixel(xx, ty1, color);
        }
        for yy in ty0..=ty1 {
            img.put_pixel(tx0, yy, color);
            img.put_pixel(tx1, yy, color);
        }
    }
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| (f64::from(d) * inv + f64::from(s) * a).round().clamp(0.0, 255.0) as u8;
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

fn fill_rect_alpha(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    let max_x = img.width() as i32 - 1;
    let max_y = img.height() as i32 - 1;
    for y in y0.max(0)..=y1.min(max_y) {
        for x in x0.max(0)..=x1.min(max_x) {
            let dst = *img.get_pixel(x as u32, y as u32);
            img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
        }
    }
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>) {
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += 8;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col in 0..8 {
                if (*row >> col) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col;
                let py = y + row_idx as i32;
                if px >= 0 && py >= 0 && px < img.width() as i32 && py < img.height() as i32 {
                    img.put_pixel(px as u32, py as u32, color);
                }
            }
        }
        cursor_x += 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CategoryEntry, Dataset, ImageEntry};

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn index() -> DatasetIndex {
        DatasetIndex::new(Dataset {
            images: vec![ImageEntry {
                id: 1,
                file_name: "a.png".to_string(),
                width: 200,
                height: 100,
            }],
            annotations: Vec::new(),
            categories: vec![
                CategoryEntry {
                    id: 3,
                    name: "image".to_string(),
                },
                CategoryEntry {
                    id: 1,
                    name: "title".to_string(),
                },
            ],
        })
    }

    #[test]
    fn test_line_width() {
        assert_eq!(line_width(100, 100), 2);
        assert_eq!(line_width(1920, 1080), 3);
        assert_eq!(line_width(4000, 3000), 6);
    }

    #[test]
    fn test_colors_follow_sorted_ids() {
        let colors = category_colors(&index());
        assert_eq!(colors[&1], Rgba([0x1f, 0x77, 0xb4, 255]));
        assert_eq!(colors[&3], Rgba([0xff, 0x7f, 0x0e, 255]));
    }

    #[test]
    fn test_outline_stays_inside_box() {
        let mut img = RgbaImage::from_pixel(50, 50, WHITE);
        let red = Rgba([255, 0, 0, 255]);
        draw_rect_outline(&mut img, 10, 10, 20, 20, red, 2);

        assert_eq!(*img.get_pixel(10, 10), red);
        assert_eq!(*img.get_pixel(11, 15), red);
        assert_eq!(*img.get_pixel(29, 29), red);
        assert_eq!(*img.get_pixel(12, 15), WHITE);
        assert_eq!(*img.get_pixel(9, 10), WHITE);
        assert_eq!(*img.get_pixel(30, 30), WHITE);
    }

    #[test]
    fn test_outline_clipped_to_image() {
        let mut img = RgbaImage::from_pixel(20, 20, WHITE);
        draw_rect_outline(&mut img, 15, 15, 30, 30, Rgba([0, 0, 255, 255]), 1);
        assert_eq!(*img.get_pixel(19, 19), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_outline_with_far_edge_past_u32_max() {
        let mut img = RgbaImage::from_pixel(20, 20, WHITE);
        let green = Rgba([0, 255, 0, 255]);
        draw_rect_outline(&mut img, 5, 5, u32::MAX, u32::MAX - 2, green, 1);
        assert_eq!(*img.get_pixel(5, 5), green);
        assert_eq!(*img.get_pixel(19, 19), green);
        assert_eq!(*img.get_pixel(10, 10), WHITE);

        let mut img = RgbaImage::from_pixel(20, 20, WHITE);
        draw_rect_outline(&mut img, u32::MAX - 5, u32::MAX - 5, 100, 100, green, 1);
        assert_eq!(*img.get_pixel(19, 19), green);
        assert_eq!(*img.get_pixel(18, 18), WHITE);
    }

    #[test]
    fn test_draw_overlay_with_out_of_range_bbox() {
        let index = index();
        let colors = category_colors(&index);
        let mut img = RgbaImage::from_pixel(200, 100, WHITE);
        let anns = [
            AnnotationEntry {
                id: 1,
                image_id: 1,
                category_id: 1,
                bbox: [10.0, 10.0, 1e12, 1e12],
            },
            AnnotationEntry {
                id: 2,
                image_id: 1,
                category_id: 3,
                bbox: [-1e12, -1e12, 50.0, 50.0],
            },
        ];

        draw_overlay(&mut img, &anns, &index, &colors, OverlayStyle { line_width: Some(1) });

        assert_eq!(*img.get_pixel(199, 99), colors[&1]);
    }

    #[test]
    fn test_draw_overlay_labels_box() {
        let index = index();
        let colors = category_colors(&index);
        let mut img = RgbaImage::from_pixel(200, 100, WHITE);
        let ann = AnnotationEntry {
            id: 7,
            image_id: 1,
            category_id: 1,
            bbox: [20.0, 40.0, 100.0, 30.0],
        };

        draw_overlay(&mut img, &[ann], &index, &colors, OverlayStyle::default());

        assert_eq!(*img.get_pixel(20, 50), colors[&1]);
        // Label background sits in the 18px band above the box.
        let bg = *img.get_pixel(21, 23);
        assert_ne!(bg, WHITE);
        assert_eq!(*img.get_pixel(60, 55), WHITE);
    }

    #[test]
    fn test_label_clamped_at_top_edge() {
        let index = index();
        let colors = category_colors(&index);
        let mut img = RgbaImage::from_pixel(200, 100, WHITE);
        let ann = AnnotationEntry {
            id: 1,
            image_id: 1,
            category_id: 3,
            bbox: [0.0, 0.0, 50.0, 50.0],
        };

        draw_overlay(&mut img, &[ann], &index, &colors, OverlayStyle { line_width: Some(1) });

        assert_ne!(*img.get_pixel(30, 2), WHITE);
    }
}
