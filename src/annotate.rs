//! Detection overlays and diagnostic text, drawn straight into the RGB buffer.
//!
//! Text uses a built-in 5x7 bitmap font (upper case, digits and a little
//! punctuation); anything outside it renders as a blank cell.

use crate::detect::{Detection, Label};
use crate::frame::Frame;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;

const FIRE_COLOR: [u8; 3] = [255, 40, 0];
const SMOKE_COLOR: [u8; 3] = [190, 190, 190];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const PANEL_COLOR: [u8; 3] = [0, 0, 0];

pub const PLACEHOLDER_TEXT: &str = "No Video Feed Available";

/// Values printed in the top-left panel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OverlayMetrics {
    pub fps: f64,
    pub vision_confidence: f64,
    /// `None` until the status path has produced a sensor reading.
    pub sensor_confidence: Option<f64>,
}

/// Draw boxes, labels and the metrics panel onto `frame`.
pub fn annotate(mut frame: Frame, detections: &[Detection], metrics: &OverlayMetrics) -> Frame {
    let mut canvas = Canvas::new(&mut frame);
    for det in detections {
        let color = match det.label {
            Label::Fire => FIRE_COLOR,
            Label::Smoke => SMOKE_COLOR,
        };
        let (x1, y1) = (canvas.clamp_x(det.bbox.x1), canvas.clamp_y(det.bbox.y1));
        let (x2, y2) = (canvas.clamp_x(det.bbox.x2), canvas.clamp_y(det.bbox.y2));
        canvas.rect(x1, y1, x2, y2, color, 2);

        let text = format!("{} {:.2}", det.label.as_str(), det.confidence);
        let label_y = (y1 - GLYPH_HEIGHT - 4).max(0);
        let label_right = x1 + text_width(&text, 1) + 2;
        canvas.fill(x1, label_y, label_right, label_y + GLYPH_HEIGHT + 1, PANEL_COLOR);
        canvas.text(x1 + 1, label_y + 1, &text, color, 1);
    }

    let sensor = match metrics.sensor_confidence {
        Some(value) => format!("SENSOR {:.1}%", value),
        None => "SENSOR N/A".to_string(),
    };
    let lines = [
        format!("FPS {:.1}", metrics.fps),
        format!("VISION {:.1}%", metrics.vision_confidence),
        sensor,
    ];
    let panel_width = lines.iter().map(|l| text_width(l, 1)).max().unwrap_or(0) + 6;
    let panel_height = lines.len() as i32 * (GLYPH_HEIGHT + 3) + 3;
    canvas.fill(0, 0, panel_width, panel_height, PANEL_COLOR);
    for (i, line) in lines.iter().enumerate() {
        canvas.text(3, 3 + i as i32 * (GLYPH_HEIGHT + 3), line, TEXT_COLOR, 1);
    }
    frame
}

/// Black frame with `text` centred, used when no video is available.
pub fn placeholder(width: u32, height: u32, text: &str) -> Frame {
    let mut frame = Frame::solid(width, height, PANEL_COLOR);
    let mut canvas = Canvas::new(&mut frame);
    let scale = if text_width(text, 2) + 8 <= width as i32 { 2 } else { 1 };
    let x = (width as i32 - text_width(text, scale)) / 2;
    let y = (height as i32 - GLYPH_HEIGHT * scale) / 2;
    canvas.text(x.max(0), y.max(0), text, TEXT_COLOR, scale);
    frame
}

fn text_width(text: &str, scale: i32) -> i32 {
    let chars = text.chars().count() as i32;
    if chars == 0 {
        0
    } else {
        (chars * GLYPH_ADVANCE - 1) * scale
    }
}

struct Canvas<'a> {
    pixels: &'a mut [u8],
    width: i32,
    height: i32,
}

impl<'a> Canvas<'a> {
    fn new(frame: &'a mut Frame) -> Self {
        let (width, height) = (frame.width as i32, frame.height as i32);
        Self {
            pixels: frame.pixels_mut(),
            width,
            height,
        }
    }

    /// Frame-space coordinate to pixel column, pinned one pixel outside the
    /// frame so off-screen edges stay off-screen. NaN maps to 0.
    fn clamp_x(&self, x: f32) -> i32 {
        x.round().clamp(-1.0, self.width as f32) as i32
    }

    fn clamp_y(&self, y: f32) -> i32 {
        y.round().clamp(-1.0, self.height as f32) as i32
    }

    fn put(&mut self, x: i32, y: i32, color: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let offset = ((y * self.width + x) * 3) as usize;
        self.pixels[offset..offset + 3].copy_from_slice(&color);
    }

    /// Filled rectangle, inclusive corners, clipped to the frame.
    fn fill(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, color: [u8; 3]) {
        let (left, right) = (x1.min(x2).max(0), x1.max(x2).min(self.width - 1));
        let (top, bottom) = (y1.min(y2).max(0), y1.max(y2).min(self.height - 1));
        for y in top..=bottom {
            for x in left..=right {
                self.put(x, y, color);
            }
        }
    }

    fn rect(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, color: [u8; 3], thickness: i32) {
        for inset in 0..thickness {
            let (left, top) = (x1 + inset, y1 + inset);
            let (right, bottom) = (x2 - inset, y2 - inset);
            if left > right || top > bottom {
                break;
            }
            self.fill(left, top, right, top, color);
            self.fill(left, bottom, right, bottom, color);
            self.fill(left, top, left, bottom, color);
            self.fill(right, top, right, bottom, color);
        }
    }

    fn text(&mut self, mut x: i32, y: i32, text: &str, color: [u8; 3], scale: i32) {
        for ch in text.chars().flat_map(|c| c.to_uppercase()) {
            if let Some(rows) = glyph_bits(ch) {
                for (row, pattern) in rows.iter().enumerate() {
                    for col in 0..GLYPH_WIDTH {
                        if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                            let px = x + col * scale;
                            let py = y + row as i32 * scale;
                            self.fill(px, py, px + scale - 1, py + scale - 1, color);
                        }
                    }
                }
            }
            x += GLYPH_ADVANCE * scale;
        }
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn fire_at(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            label: Label::Fire,
            confidence: 0.9,
        }
    }

    #[test]
    fn draws_box_outline_in_label_color() {
        let frame = Frame::solid(640, 360, [0, 0, 255]);
        let out = annotate(frame, &[fire_at(100.0, 100.0, 200.0, 200.0)], &OverlayMetrics::default());
        assert_eq!(out.pixel(150, 100), Some(FIRE_COLOR));
        assert_eq!(out.pixel(200, 150), Some(FIRE_COLOR));
        // Interior untouched.
        assert_eq!(out.pixel(150, 150), Some([0, 0, 255]));
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped() {
        let frame = Frame::solid(64, 36, [0, 0, 0]);
        let out = annotate(frame, &[fire_at(-50.0, -50.0, 500.0, 500.0)], &OverlayMetrics::default());
        assert_eq!((out.width, out.height), (64, 36));
    }

    #[test]
    fn extreme_and_infinite_boxes_do_not_overflow() {
        let detections = [
            fire_at(f32::MAX, f32::MAX, f32::MAX, f32::MAX),
            fire_at(f32::MIN, f32::MIN, f32::MAX, f32::MAX),
            fire_at(f32::NEG_INFINITY, 10.0, f32::INFINITY, 20.0),
            fire_at(f32::NAN, f32::NAN, 30.0, 30.0),
        ];
        let out = annotate(Frame::solid(640, 360, [0, 0, 255]), &detections, &OverlayMetrics::default());
        assert_eq!((out.width, out.height), (640, 360));
        // The box spanning the whole frame draws its edges on the border rows.
        assert_eq!(out.pixel(320, 359), Some(FIRE_COLOR));
    }

    #[test]
    fn metrics_panel_is_drawn() {
        let frame = Frame::solid(640, 360, [0, 0, 255]);
        let metrics = OverlayMetrics {
            fps: 12.5,
            vision_confidence: 75.0,
            sensor_confidence: Some(40.0),
        };
        let out = annotate(frame, &[], &metrics);
        assert_eq!(out.pixel(1, 1), Some(PANEL_COLOR));
        assert_eq!(out.pixel(600, 300), Some([0, 0, 255]));
    }

    #[test]
    fn placeholder_has_centered_text() {
        let frame = placeholder(640, 360, PLACEHOLDER_TEXT);
        assert_eq!(frame.pixel(0, 0), Some(PANEL_COLOR));
        let lit = frame.pixels().chunks(3).filter(|px| *px == TEXT_COLOR).count();
        assert!(lit > 100);
    }
}
