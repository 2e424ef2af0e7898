//! Pixel buffer to shift-register bitstream conversion.
//!
//! Every 8-bit channel value is widened into a `BIT_DEPTH`-bit drive code.
//! The low `PAGED_BITS` of that code are realised by temporal dithering: the
//! whole panel is scanned `PAGES` times, and on each page the remaining
//! `PWM_BITS`-wide level is bumped by one on a subset of pages proportional to
//! the low bits. Over a full page cycle the eye integrates the full code.
//!
//! # Memory Layout
//! A [`Frame`] holds `PAGES` pages of `ROWS * PWM_BITS` bit-plane groups. A
//! group is the set of bus writes that shifts one bit-plane of one row into
//! the driver chain:
//!
//! ```text
//! frame[((page * ROWS + row) * PWM_BITS + plane) * WRITES + write]
//! ```
//!
//! Chain position `k = column * 3 + channel` (red, green, blue) lands in write
//! `k / 12`, data bit `11 - k % 12`; data is shifted out most significant bit
//! first. Unused positions at the end of the chain stay zero.

use bitfield::bitfield;
use embedded_dma::ReadBuffer;
use embedded_graphics::pixelcolor::RgbColor;

use crate::pixels::PixelBuffer;
use crate::{
    compute_bit_depth, compute_frame_len, compute_pages, compute_writes_per_plane, BITS_PER_WRITE,
};

bitfield! {
    /// 16-bit word pushed to the shift-register bus.
    ///
    /// The bit layout is as follows:
    /// - Bit 15: Hold (latch stays closed after this write)
    /// - Bits 11-0: Shift data, most significant bit first
    ///
    /// Each write clocks its twelve data bits out on its own; only the final
    /// write of a bit-plane clears `hold`, which strobes the latch.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct BusWord(u16);
    impl Debug;
    pub hold, set_hold: 15;
    pub data, set_data: 11, 0;
}

impl BusWord {
    /// Wrap a raw bus word.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bits as pushed to the bus.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }
}

/// Widen an 8-bit intensity into a `bit_depth`-bit drive code.
///
/// The value is bit-replicated, so 0 maps to 0 and 255 maps to all ones and
/// the mapping stays linear in between.
#[must_use]
pub const fn drive_code(value: u8, bit_depth: u8) -> u16 {
    let mut code: u32 = 0;
    let mut filled: u8 = 0;
    while filled < bit_depth {
        code = (code << 8) | value as u32;
        filled += 8;
    }
    (code >> (filled - bit_depth)) as u16
}

/// Position of `page` in the dithering order: its bit-reversed index.
///
/// Spreads the pages that carry the extra level evenly through the cycle.
#[must_use]
pub const fn dither_rank(page: usize, paged_bits: u8) -> usize {
    if paged_bits == 0 {
        return 0;
    }
    page.reverse_bits() >> (usize::BITS - paged_bits as u32)
}

/// The `pwm_bits`-wide level shown for `code` on `page`.
#[must_use]
pub const fn page_level(code: u16, page: usize, pwm_bits: u8, paged_bits: u8) -> u16 {
    let base = code >> paged_bits;
    let remainder = (code & ((1 << paged_bits) - 1)) as usize;
    let max = ((1u32 << pwm_bits) - 1) as u16;
    if remainder > dither_rank(page, paged_bits) && base < max {
        base + 1
    } else {
        base
    }
}

/// Read back the bit for `column` / `channel` from one bit-plane group.
#[must_use]
pub fn chain_bit(group: &[u16], column: usize, channel: usize) -> bool {
    let k = column * 3 + channel;
    let word = BusWord(group[k / BITS_PER_WRITE]);
    word.data() >> (BITS_PER_WRITE - 1 - k % BITS_PER_WRITE) & 1 == 1
}

/// Encode every page of `pixels` into `frame`.
///
/// # Panics
///
/// Panics if `frame` is not exactly `compute_frame_len(ROWS, COLS, pwm_bits,
/// paged_bits)` words long.
pub fn encode<const ROWS: usize, const COLS: usize>(
    pixels: &PixelBuffer<ROWS, COLS>,
    pwm_bits: u8,
    paged_bits: u8,
    frame: &mut [u16],
) {
    assert_eq!(
        frame.len(),
        compute_frame_len(ROWS, COLS, pwm_bits, paged_bits)
    );
    let bit_depth = compute_bit_depth(pwm_bits, paged_bits);
    let writes = compute_writes_per_plane(COLS);
    let planes = usize::from(pwm_bits);
    let row_len = planes * writes;

    let mut groups = frame.chunks_exact_mut(row_len);
    for page in 0..compute_pages(paged_bits) {
        for (row, words) in pixels.rows().zip(groups.by_ref()) {
            let mut levels = [[0u16; 3]; COLS];
            for (level, color) in levels.iter_mut().zip(row) {
                *level = [color.r(), color.g(), color.b()]
                    .map(|v| page_level(drive_code(v, bit_depth), page, pwm_bits, paged_bits));
            }
            for (plane, group) in words.chunks_exact_mut(writes).enumerate() {
                pack_plane(&levels, plane, group);
            }
        }
    }
}

fn pack_plane<const COLS: usize>(levels: &[[u16; 3]; COLS], plane: usize, group: &mut [u16]) {
    group.fill(0);
    for (column, level) in levels.iter().enumerate() {
        for (channel, value) in level.iter().enumerate() {
            if value >> plane & 1 == 1 {
                let k = column * 3 + channel;
                group[k / BITS_PER_WRITE] |= 1 << (BITS_PER_WRITE - 1 - k % BITS_PER_WRITE);
            }
        }
    }
    let last = group.len() - 1;
    for (i, bits) in group.iter_mut().enumerate() {
        let mut word = BusWord(*bits);
        word.set_hold(i != last);
        *bits = word.0;
    }
}

/// Output bitstream for one full page cycle, `LEN` bus words.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
#[repr(align(4))]
pub struct Frame<const LEN: usize> {
    words: [u16; LEN],
}

impl<const LEN: usize> Frame<LEN> {
    /// An all-zero frame.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self { words: [0; LEN] }
    }

    /// Encode `pixels` into a new frame.
    #[must_use]
    pub fn encoded<const ROWS: usize, const COLS: usize>(
        pixels: &PixelBuffer<ROWS, COLS>,
        pwm_bits: u8,
        paged_bits: u8,
    ) -> Self {
        let mut frame = Self::zeroed();
        frame.encode(pixels, pwm_bits, paged_bits);
        frame
    }

    /// Re-encode this frame in place.
    pub fn encode<const ROWS: usize, const COLS: usize>(
        &mut self,
        pixels: &PixelBuffer<ROWS, COLS>,
        pwm_bits: u8,
        paged_bits: u8,
    ) {
        encode(pixels, pwm_bits, paged_bits, &mut self.words);
    }

    /// All words.
    #[must_use]
    pub fn words(&self) -> &[u16; LEN] {
        &self.words
    }

    /// The words of one page, `panel_depth` long.
    #[must_use]
    pub fn page(&self, page: usize, panel_depth: usize) -> &[u16] {
        &self.words[page * panel_depth..(page + 1) * panel_depth]
    }
}

impl<const LEN: usize> Default for Frame<LEN> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const LEN: usize> core::fmt::Debug for Frame<LEN> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let lit = self
            .words
            .iter()
            .filter(|w| BusWord(**w).data() != 0)
            .count();
        f.debug_struct("Frame")
            .field("size", &core::mem::size_of_val(&self.words))
            .field("lit_words", &lit)
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const LEN: usize> defmt::Format for Frame<LEN> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Frame<{}>", LEN);
    }
}

unsafe impl<const LEN: usize> ReadBuffer for Frame<LEN> {
    type Word = u16;

    unsafe fn read_buffer(&self) -> (*const u16, usize) {
        (self.words.as_ptr(), LEN)
    }
}
