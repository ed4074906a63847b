use crate::timeline::SpeedMode;
use crate::video::types::Frame;

/// Annotation color for frames taken at the fast cadence
pub const FAST_COLOR: [u8; 3] = [255, 0, 0];

/// Annotation color for frames taken inside active intervals
pub const SLOW_COLOR: [u8; 3] = [0, 255, 0];

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// 5x7 bitmaps, one byte per row, most significant of the low 5 bits on the left
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '>' => [0b10000, 0b01000, 0b00100, 0b00010, 0b00100, 0b01000, 0b10000],
        'x' => [0b00000, 0b00000, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        _ => return None,
    };
    Some(rows)
}

/// Text drawn on every rendered frame, e.g. `>>x140`
pub fn speed_label(factor: f64) -> String {
    format!(">>x{}", factor)
}

/// Draws the speed multiplier in the top-right corner of a frame
#[derive(Debug, Clone)]
pub struct SpeedOverlay {
    /// Pixel size of one glyph dot
    pub scale: u32,
    /// Distance from the top and right edges
    pub margin: u32,
}

impl Default for SpeedOverlay {
    fn default() -> Self {
        Self { scale: 3, margin: 10 }
    }
}

impl SpeedOverlay {
    /// Rendered size of `text` in pixels
    pub fn text_size(&self, text: &str) -> (u32, u32) {
        let chars = text.chars().count() as u32;
        if chars == 0 {
            return (0, 0);
        }
        let advance = (GLYPH_WIDTH + 1) * self.scale;
        (chars * advance - self.scale, GLYPH_HEIGHT * self.scale)
    }

    /// Top-left corner of `text` when right-aligned in a frame of `width`
    pub fn origin(&self, text: &str, width: u32) -> (u32, u32) {
        let (text_width, _) = self.text_size(text);
        (width.saturating_sub(text_width + self.margin), self.margin)
    }

    pub fn draw(&self, frame: &mut Frame, mode: SpeedMode, factor: f64) {
        let color = match mode {
            SpeedMode::Fast => FAST_COLOR,
            SpeedMode::Slow => SLOW_COLOR,
        };
        self.draw_text(frame, &speed_label(factor), color);
    }

    pub fn draw_text(&self, frame: &mut Frame, text: &str, color: [u8; 3]) {
        let (mut x, y) = self.origin(text, frame.width());
        let advance = (GLYPH_WIDTH + 1) * self.scale;

        for c in text.chars() {
            if let Some(rows) = glyph(c) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..GLYPH_WIDTH {
                        if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                            frame.fill_rect(
                                x + col * self.scale,
                                y + row as u32 * self.scale,
                                self.scale,
                                self.scale,
                                color,
                            );
                        }
                    }
                }
            }
            x += advance;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_format() {
        assert_eq!(speed_label(140.0), ">>x140");
        assert_eq!(speed_label(4000.0), ">>x4000");
        assert_eq!(speed_label(2.5), ">>x2.5");
    }

    #[test]
    fn test_every_label_character_has_a_glyph() {
        for c in speed_label(1234567890.5).chars() {
            assert!(glyph(c).is_some(), "missing glyph for {:?}", c);
        }
    }

    #[test]
    fn test_text_is_right_aligned_with_margin() {
        let overlay = SpeedOverlay::default();
        let text = speed_label(140.0);
        let (text_width, text_height) = overlay.text_size(&text);
        assert_eq!(text_height, 21);

        let (x, y) = overlay.origin(&text, 640);
        assert_eq!(x + text_width + 10, 640);
        assert_eq!(y, 10);
    }

    #[test]
    fn test_draw_uses_mode_color_in_top_right() {
        let overlay = SpeedOverlay::default();
        let mut fast = Frame::new_black(200, 60);
        overlay.draw(&mut fast, SpeedMode::Fast, 4000.0);

        let mut slow = Frame::new_black(200, 60);
        overlay.draw(&mut slow, SpeedMode::Slow, 4000.0);

        let lit = |frame: &Frame, color: [u8; 3]| {
            (0..frame.height())
                .flat_map(|y| (0..frame.width()).map(move |x| (x, y)))
                .filter(|&(x, y)| frame.get_pixel(x, y) == color)
                .collect::<Vec<_>>()
        };

        let red = lit(&fast, FAST_COLOR);
        let green = lit(&slow, SLOW_COLOR);
        assert!(!red.is_empty());
        assert_eq!(red, green);

        // ">>x4000" is 123 px wide, so it starts at x = 200 - 123 - 10
        assert!(red.iter().all(|&(x, y)| (67..190).contains(&x) && (10..31).contains(&y)));
    }
}
