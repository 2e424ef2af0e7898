//! Live RGB pixel buffer written by the application.
//!
//! Nothing here reaches the panel directly: [`crate::Display::show`] takes a
//! snapshot of the buffer and encodes it into the back frame.

use core::convert::Infallible;

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::Pixel;

use crate::Color;

/// Grid of `ROWS` × `COLS` colours, stored row-major.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PixelBuffer<const ROWS: usize, const COLS: usize> {
    rows: [[Color; COLS]; ROWS],
}

impl<const ROWS: usize, const COLS: usize> PixelBuffer<ROWS, COLS> {
    /// Create a buffer with every pixel black.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rows: [[Color::BLACK; COLS]; ROWS],
        }
    }

    /// Set one pixel from its channel intensities.
    ///
    /// # Panics
    ///
    /// Panics if `column` or `row` is outside the panel.
    pub fn set_pixel_color(&mut self, column: usize, row: usize, r: u8, g: u8, b: u8) {
        self.rows[row][column] = Color::new(r, g, b);
    }

    /// Set one pixel.
    ///
    /// # Panics
    ///
    /// Panics if `column` or `row` is outside the panel.
    pub fn set_pixel(&mut self, column: usize, row: usize, color: Color) {
        self.rows[row][column] = color;
    }

    /// Colour of one pixel.
    ///
    /// # Panics
    ///
    /// Panics if `column` or `row` is outside the panel.
    #[must_use]
    pub fn pixel(&self, column: usize, row: usize) -> Color {
        self.rows[row][column]
    }

    /// One row of pixels.
    #[must_use]
    pub fn row(&self, row: usize) -> &[Color; COLS] {
        &self.rows[row]
    }

    /// Iterate over the rows from top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[Color; COLS]> {
        self.rows.iter()
    }

    /// All pixels, row-major, `ROWS * COLS` long.
    #[must_use]
    pub fn as_slice(&self) -> &[Color] {
        self.rows.as_flattened()
    }

    /// All pixels, row-major, for bulk updates.
    pub fn as_mut_slice(&mut self) -> &mut [Color] {
        self.rows.as_flattened_mut()
    }

    /// Fill every pixel with one colour.
    pub fn fill(&mut self, color: Color) {
        self.as_mut_slice().fill(color);
    }
}

impl<const ROWS: usize, const COLS: usize> Default for PixelBuffer<ROWS, COLS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const ROWS: usize, const COLS: usize> core::fmt::Debug for PixelBuffer<ROWS, COLS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let lit = self.as_slice().iter().filter(|c| **c != Color::BLACK).count();
        f.debug_struct("PixelBuffer")
            .field("rows", &ROWS)
            .field("cols", &COLS)
            .field("lit", &lit)
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const ROWS: usize, const COLS: usize> defmt::Format for PixelBuffer<ROWS, COLS> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "PixelBuffer<{}, {}>", ROWS, COLS);
    }
}

impl<const ROWS: usize, const COLS: usize> OriginDimensions for PixelBuffer<ROWS, COLS> {
    fn size(&self) -> Size {
        Size::new(COLS as u32, ROWS as u32)
    }
}

impl<const ROWS: usize, const COLS: usize> DrawTarget for PixelBuffer<ROWS, COLS> {
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if let Ok((x, y)) = <(u32, u32)>::try_from(coord) {
                let (x, y) = (x as usize, y as usize);
                if x < COLS && y < ROWS {
                    self.rows[y][x] = color;
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;
    use std::vec;

    use super::*;
    use embedded_graphics::prelude::*;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

    type TestBuffer = PixelBuffer<8, 16>;

    #[test]
    fn test_new_is_black() {
        let buf = TestBuffer::new();
        assert_eq!(buf.as_slice().len(), 8 * 16);
        assert!(buf.as_slice().iter().all(|c| *c == Color::BLACK));
        assert_eq!(buf, TestBuffer::default());
    }

    #[test]
    fn test_set_pixel_color() {
        let mut buf = TestBuffer::new();
        buf.set_pixel_color(3, 5, 10, 20, 30);
        assert_eq!(buf.pixel(3, 5), Color::new(10, 20, 30));
        assert_eq!(buf.row(5)[3], Color::new(10, 20, 30));
        // row-major flat view
        assert_eq!(buf.as_slice()[5 * 16 + 3], Color::new(10, 20, 30));
    }

    #[test]
    #[should_panic]
    fn test_set_pixel_color_out_of_range_panics() {
        let mut buf = TestBuffer::new();
        buf.set_pixel_color(16, 0, 1, 1, 1);
    }

    #[test]
    fn test_bulk_mutation() {
        let mut buf = TestBuffer::new();
        for (i, px) in buf.as_mut_slice().iter_mut().enumerate() {
            *px = Color::new(i as u8, 0, 0);
        }
        assert_eq!(buf.pixel(0, 1), Color::new(16, 0, 0));
        assert_eq!(buf.pixel(15, 7), Color::new(127, 0, 0));
    }

    #[test]
    fn test_draw_target_clips() {
        let mut buf = TestBuffer::new();
        let pixels = vec![
            Pixel(Point::new(-1, 0), Color::RED),
            Pixel(Point::new(0, -1), Color::RED),
            Pixel(Point::new(16, 0), Color::RED),
            Pixel(Point::new(0, 8), Color::RED),
            Pixel(Point::new(2, 2), Color::GREEN),
        ];
        buf.draw_iter(pixels).unwrap();
        let lit = buf.as_slice().iter().filter(|c| **c != Color::BLACK).count();
        assert_eq!(lit, 1);
        assert_eq!(buf.pixel(2, 2), Color::GREEN);
    }

    #[test]
    fn test_draw_rectangle() {
        let mut buf = TestBuffer::new();
        Rectangle::new(Point::new(1, 1), Size::new(3, 2))
            .into_styled(PrimitiveStyle::with_fill(Color::BLUE))
            .draw(&mut buf)
            .unwrap();
        let lit = buf.as_slice().iter().filter(|c| **c == Color::BLUE).count();
        assert_eq!(lit, 6);
        assert_eq!(buf.size(), Size::new(16, 8));
    }

    #[test]
    fn test_clear() {
        let mut buf = TestBuffer::new();
        buf.clear(Color::WHITE).unwrap();
        assert!(buf.as_slice().iter().all(|c| *c == Color::WHITE));
    }

    #[test]
    fn test_debug_formatting() {
        let mut buf = TestBuffer::new();
        buf.set_pixel(0, 0, Color::RED);
        let s = format!("{:?}", buf);
        assert!(s.contains("PixelBuffer"));
        assert!(s.contains("lit: 1"));
    }
}
