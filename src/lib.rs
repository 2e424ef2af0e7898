//! DMA-driven scan engine for multiplexed RGB LED matrices.
//!
//! ## How the panel is driven
//!
//! The panel is a row-address multiplexer plus a chain of current-controlled
//! shift-register drivers. Only one row is lit at a time; the controller has
//! to keep cycling through all of them fast enough that the eye sees a steady
//! image.
//!
//! ### Signals
//! - **Address port** – five row-select bits plus an idle bit that blanks the
//!   multiplexer
//! - **Shift-register bus** – twelve data bits per write, shifted out most
//!   significant bit first; a hold bit keeps the latch closed until the last
//!   write of a bit-plane
//! - **PWM timer** – its period paces every transfer, its compare output gates
//!   how long the latched row stays lit
//!
//! ### Binary Code Modulation
//! Each row is shown `PWM_BITS` times per scan, once per bit-plane. Bit-plane
//! `i` stays lit for `2^i` time units, so `PWM_BITS` pulses give
//! `2^PWM_BITS` linear intensity levels. See [Batsocks – LED dimming using
//! Binary Code Modulation](https://www.batsocks.co.uk/readme/art_bcm_1.htm)
//! for a deeper explanation.
//!
//! Another `PAGED_BITS` of depth come from temporal dithering: the whole
//! panel is scanned `2^PAGED_BITS` times ("pages") and the low bits of every
//! drive code decide on how many of those pages its level is bumped by one.
//!
//! ### Four channels, one waveform
//! A scan is a single DMA transaction over four channels that step together
//! on every timer period:
//!
//! ```text
//!  slot s:   Address ──► mux port         address[s]
//!            PixelEven ─► shift register  even words of group s
//!            PixelOdd ──► shift register  odd words of group s
//!            Timer ─────► period / duty   timers[s]
//! ```
//!
//! After `ROWS * PWM_BITS` slots the major loop completes, the interrupt
//! parks the bus on the idle sentinel, swaps in any newly shown frame or
//! brightness, advances the page and re-arms all four channels.
//!
//! ## Usage
//!
//! 1. Pick the geometry and derive the table sizes with
//!    [`compute_table_len`] and [`compute_frame_len`].
//! 2. Create a [`Matrix`] and call [`Matrix::begin`] with your
//!    [`ScanEngine`] implementation.
//! 3. Draw through the returned [`Display`] (it is also an
//!    `embedded-graphics` target via [`Display::pixels_mut`]) and call
//!    [`Display::show`].
//! 4. Call [`Scanner::refresh`] from the major-loop-complete interrupt.
//!
//! ## Available Feature Flags
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the public types and routes the crate's
//! log events to `defmt`.
//!
//! ### `log` Feature
//! Routes the crate's log events (scan start, table rebuilds, swaps) to the
//! `log` facade.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

mod fmt;

pub mod address;
pub mod dma;
pub mod encoder;
mod error;
pub mod matrix;
pub mod pixels;
pub mod preview;
mod swap;
pub mod timer;

use embedded_graphics::pixelcolor::Rgb888;

pub use address::{AddressTable, RowAddress};
pub use dma::{Channel, ScanEngine, ScanTransfer, TransferDescriptor};
pub use encoder::{BusWord, Frame};
pub use error::{Error, Result};
pub use matrix::{Display, Matrix, Scanner};
pub use pixels::PixelBuffer;
pub use preview::Preview;
pub use timer::{TimerConfig, TimerSlot, TimerTable};

/// Color type used in the pixel buffer
pub type Color = Rgb888;

/// Data bits carried by one shift-register bus write.
pub const BITS_PER_WRITE: usize = 12;

/// Computes the width of a drive code
///
/// # Arguments
///
/// * `pwm_bits` - Hardware bit-planes per row
/// * `paged_bits` - Bits realised by temporal dithering
#[must_use]
pub const fn compute_bit_depth(pwm_bits: u8, paged_bits: u8) -> u8 {
    pwm_bits + paged_bits
}

/// Computes how many pages one dithering cycle takes
#[must_use]
pub const fn compute_pages(paged_bits: u8) -> usize {
    1 << paged_bits
}

/// Computes the bus writes needed to shift one bit-plane of one row
///
/// Three chain bits per column, twelve per write, rounded up to an even
/// count so the two pixel channels move the same number of words.
#[must_use]
pub const fn compute_writes_per_plane(cols: usize) -> usize {
    let writes = (cols * 3).div_ceil(BITS_PER_WRITE);
    (writes + 1) & !1
}

/// Computes the number of timer slots in one major loop
#[must_use]
pub const fn compute_scan_slots(rows: usize, pwm_bits: u8) -> usize {
    rows * pwm_bits as usize
}

/// Computes the length of the address and timer tables
///
/// One slot per bit-plane of every row plus the trailing idle sentinel.
#[must_use]
pub const fn compute_table_len(rows: usize, pwm_bits: u8) -> usize {
    compute_scan_slots(rows, pwm_bits) + 1
}

/// Computes the bus words of one page
#[must_use]
pub const fn compute_panel_depth(rows: usize, cols: usize, pwm_bits: u8) -> usize {
    compute_scan_slots(rows, pwm_bits) * compute_writes_per_plane(cols)
}

/// Computes the bus words of a whole [`Frame`]
///
/// # Arguments
///
/// * `rows` - Multiplexed rows
/// * `cols` - Columns per row
/// * `pwm_bits` - Hardware bit-planes per row
/// * `paged_bits` - Bits realised by temporal dithering
#[must_use]
pub const fn compute_frame_len(rows: usize, cols: usize, pwm_bits: u8, paged_bits: u8) -> usize {
    compute_pages(paged_bits) * compute_panel_depth(rows, cols, pwm_bits)
}

#[cfg(test)]
mod tests {
    extern crate std;

    // host implementation backing `portable-atomic`
    use critical_section as _;

    use super::*;
    use embedded_graphics::pixelcolor::RgbColor;

    #[test]
    fn test_compute_bit_depth() {
        assert_eq!(compute_bit_depth(12, 2), 14);
        assert_eq!(compute_bit_depth(8, 0), 8);
        assert_eq!(compute_bit_depth(12, 4), 16);
    }

    #[test]
    fn test_compute_pages() {
        assert_eq!(compute_pages(0), 1);
        assert_eq!(compute_pages(1), 2);
        assert_eq!(compute_pages(2), 4);
        assert_eq!(compute_pages(4), 16);
    }

    #[test]
    fn test_compute_writes_per_plane() {
        // 8 columns = 24 chain bits = exactly two writes
        assert_eq!(compute_writes_per_plane(8), 2);
        // a single write is padded to two for the pixel channel pair
        assert_eq!(compute_writes_per_plane(1), 2);
        assert_eq!(compute_writes_per_plane(4), 2);
        // 9 columns = 27 bits = three writes, padded to four
        assert_eq!(compute_writes_per_plane(9), 4);
        assert_eq!(compute_writes_per_plane(16), 4);
        assert_eq!(compute_writes_per_plane(32), 8);

        for cols in 1..=64 {
            let writes = compute_writes_per_plane(cols);
            assert_eq!(writes % 2, 0);
            assert!(writes * BITS_PER_WRITE >= cols * 3);
            assert!((writes - 2) * BITS_PER_WRITE < cols * 3);
        }
    }

    #[test]
    fn test_compute_table_len() {
        assert_eq!(compute_scan_slots(8, 12), 96);
        assert_eq!(compute_table_len(8, 12), 97);
        assert_eq!(compute_table_len(32, 16), 513);
        assert_eq!(compute_table_len(1, 1), 2);
    }

    #[test]
    fn test_compute_frame_len() {
        assert_eq!(compute_panel_depth(8, 8, 12), 8 * 2 * 12);
        assert_eq!(compute_frame_len(8, 8, 12, 2), 4 * 192);
        assert_eq!(compute_frame_len(8, 8, 12, 0), 192);
    }

    #[test]
    fn test_helper_functions_const() {
        const ROWS: usize = 16;
        const COLS: usize = 32;
        const TABLE_LEN: usize = compute_table_len(ROWS, 10);
        const FRAME_LEN: usize = compute_frame_len(ROWS, COLS, 10, 3);

        assert_eq!(TABLE_LEN, 161);
        assert_eq!(FRAME_LEN, 8 * 16 * 8 * 10);
    }

    #[test]
    fn test_realistic_panel_configurations() {
        struct PanelConfig {
            rows: usize,
            cols: usize,
            pwm_bits: u8,
            paged_bits: u8,
        }

        let configs = [
            PanelConfig {
                rows: 8,
                cols: 8,
                pwm_bits: 12,
                paged_bits: 2,
            },
            PanelConfig {
                rows: 16,
                cols: 32,
                pwm_bits: 8,
                paged_bits: 0,
            },
            PanelConfig {
                rows: 32,
                cols: 64,
                pwm_bits: 11,
                paged_bits: 4,
            },
        ];

        for config in configs {
            let depth = compute_panel_depth(config.rows, config.cols, config.pwm_bits);
            let frame = compute_frame_len(config.rows, config.cols, config.pwm_bits, config.paged_bits);
            assert_eq!(frame, depth * compute_pages(config.paged_bits));
            assert_eq!(
                depth,
                (compute_table_len(config.rows, config.pwm_bits) - 1)
                    * compute_writes_per_plane(config.cols)
            );
            assert!(compute_bit_depth(config.pwm_bits, config.paged_bits) <= 16);
        }
    }

    #[test]
    fn test_color_type_alias() {
        let red: Color = Color::RED;
        assert_eq!(red, Rgb888::RED);
        assert_eq!(red.r(), 255);
        assert_eq!(red.g(), 0);
        assert_eq!(red.b(), 0);
    }
}
