//! Drawing detections onto images for visual inspection.

use image::{Rgb, RgbImage};

use crate::detection::Detection;

/// Detections scoring below this are not drawn.
pub const DISPLAY_THRESH: f32 = 0.3;

const BOX_COLOR: Rgb<u8> = Rgb([204, 0, 0]);
const BORDER_PX: i64 = 2;

/// Draws every detection of one class scoring at least [`DISPLAY_THRESH`] onto `image`.
///
/// Box coordinates are expected in original image pixels.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for det in detections {
        if det.score() >= DISPLAY_THRESH {
            draw_box(image, det);
        }
    }
}

fn draw_box(image: &mut RgbImage, det: &Detection) {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let b = det.bbox();

    let x1 = (b.x1.floor() as i64).clamp(0, w - 1);
    let y1 = (b.y1.floor() as i64).clamp(0, h - 1);
    let x2 = (b.x2.ceil() as i64).clamp(0, w - 1);
    let y2 = (b.y2.ceil() as i64).clamp(0, h - 1);
    if x1 >= x2 || y1 >= y2 {
        return;
    }

    for inset in 0..BORDER_PX {
        let (left, top) = ((x1 + inset).min(w - 1), (y1 + inset).min(h - 1));
        let (right, bottom) = ((x2 - inset).max(0), (y2 - inset).max(0));

        for x in left..=right {
            image.put_pixel(x as u32, top as u32, BOX_COLOR);
            image.put_pixel(x as u32, bottom as u32, BOX_COLOR);
        }
        for y in top..=bottom {
            image.put_pixel(left as u32, y as u32, BOX_COLOR);
            image.put_pixel(right as u32, y as u32, BOX_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::detection::BoundingBox;

    use super::*;

    #[test]
    fn low_scores_are_not_drawn() {
        let mut image = RgbImage::new(16, 16);
        let faint = Detection::new(0.1, BoundingBox::new(2.0, 2.0, 10.0, 10.0));
        draw_detections(&mut image, &[faint]);
        assert_eq!(*image.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_are_drawn_within_bounds() {
        let mut image = RgbImage::new(16, 16);
        let det = Detection::new(0.9, BoundingBox::new(2.0, 2.0, 30.0, 30.0));
        draw_detections(&mut image, &[det]);
        // Top-left corner of the border.
        assert_eq!(*image.get_pixel(2, 2), BOX_COLOR);
        // Clamped right edge.
        assert_eq!(*image.get_pixel(15, 8), BOX_COLOR);
    }
}
