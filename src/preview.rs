//! Software replay of the scan, for host-side checks and simulators.
//!
//! A [`Preview`] walks the three tables exactly as the channels would for one
//! page: slot `s` selects `address[s]`, latches bit-plane group `s` of the
//! page, and keeps it lit for `timers[s].duty` ticks. The result is the
//! on-time every pixel channel accumulated.

use crate::address::RowAddress;
use crate::encoder::chain_bit;
use crate::timer::TimerSlot;

/// Accumulated on-ticks per pixel and channel over one or more pages.
#[derive(Clone, PartialEq, Eq)]
pub struct Preview<const ROWS: usize, const COLS: usize> {
    ticks: [[[u32; 3]; COLS]; ROWS],
    passes: usize,
}

impl<const ROWS: usize, const COLS: usize> Preview<ROWS, COLS> {
    /// A preview with nothing lit yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ticks: [[[0; 3]; COLS]; ROWS],
            passes: 0,
        }
    }

    /// Replay one page.
    ///
    /// `address` and `timers` are the scanned slots (no sentinel) and `page`
    /// the bus words of the page, one group of `page.len() / address.len()`
    /// words per slot. Idle slots light nothing.
    ///
    /// # Panics
    ///
    /// Panics if the slices disagree on the slot count.
    pub fn accumulate(&mut self, address: &[RowAddress], timers: &[TimerSlot], page: &[u16]) {
        assert_eq!(address.len(), timers.len());
        assert!(!address.is_empty() && page.len() % address.len() == 0);
        let writes = page.len() / address.len();

        for ((code, slot), group) in address
            .iter()
            .zip(timers)
            .zip(page.chunks_exact(writes))
        {
            if code.idle() || slot.duty == 0 {
                continue;
            }
            let Some(row) = self.ticks.get_mut(usize::from(code.row())) else {
                continue;
            };
            for (column, channels) in row.iter_mut().enumerate() {
                for (channel, ticks) in channels.iter_mut().enumerate() {
                    if chain_bit(group, column, channel) {
                        *ticks += u32::from(slot.duty);
                    }
                }
            }
        }
        self.passes += 1;
    }

    /// Red, green and blue on-ticks of one pixel.
    #[must_use]
    pub fn on_ticks(&self, column: usize, row: usize) -> [u32; 3] {
        self.ticks[row][column]
    }

    /// Pages replayed so far.
    #[must_use]
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Whether any channel of any pixel was lit.
    #[must_use]
    pub fn is_dark(&self) -> bool {
        self.ticks.as_flattened().iter().all(|c| *c == [0; 3])
    }

    /// Forget everything accumulated.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl<const ROWS: usize, const COLS: usize> Default for Preview<ROWS, COLS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const ROWS: usize, const COLS: usize> core::fmt::Debug for Preview<ROWS, COLS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let lit = self
            .ticks
            .as_flattened()
            .iter()
            .filter(|c| **c != [0; 3])
            .count();
        f.debug_struct("Preview")
            .field("passes", &self.passes)
            .field("lit_pixels", &lit)
            .finish()
    }
}
