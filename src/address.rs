//! Row-select table streamed to the address multiplexer.
//!
//! Each row stays selected for the whole burst of its `PWM_BITS` bit-plane
//! slots, so the table is `ROWS` runs of identical codes. Changing rows in the
//! middle of a burst would ghost the previous row's data onto the next one.
//! A single idle code closes the table; it is what the bus shows while the
//! channels are re-armed.

use bitfield::bitfield;
use embedded_dma::ReadBuffer;

use crate::compute_table_len;

bitfield! {
    /// 8-bit word written to the address port.
    ///
    /// The bit layout is as follows:
    /// - Bit 7: Idle (mux disabled, no row lit)
    /// - Bits 4-0: Row address
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct RowAddress(u8);
    impl Debug;
    pub idle, set_idle: 7;
    pub row, set_row: 4, 0;
}

impl RowAddress {
    const ROW_MASK: u8 = 0b1_1111;

    /// The idle code: mux disabled, wraps to row 0 on the next major loop.
    pub const IDLE: Self = Self(1 << 7);

    /// Code selecting `row`.
    #[must_use]
    pub const fn select(row: u8) -> Self {
        Self(row & Self::ROW_MASK)
    }

    /// Raw byte as driven onto the port.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RowAddress {
    fn format(&self, f: defmt::Formatter) {
        if self.idle() {
            defmt::write!(f, "RowAddress(idle)");
        } else {
            defmt::write!(f, "RowAddress({})", self.row());
        }
    }
}

/// Address table of `LEN = ROWS * PWM_BITS + 1` entries.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct AddressTable<const LEN: usize> {
    entries: [RowAddress; LEN],
}

impl<const LEN: usize> AddressTable<LEN> {
    /// An all-idle table, used before `begin()` builds the real one.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            entries: [RowAddress::IDLE; LEN],
        }
    }

    /// Build the row-select sequence for the given geometry.
    ///
    /// # Panics
    ///
    /// Panics (at compile time when used in a const context) if `LEN` does not
    /// equal `rows * pwm_bits + 1`.
    #[must_use]
    pub const fn new(rows: usize, pwm_bits: u8) -> Self {
        assert!(LEN == compute_table_len(rows, pwm_bits));
        let run = pwm_bits as usize;
        let mut entries = [RowAddress::IDLE; LEN];
        let mut i = 0;
        while i < LEN - 1 {
            entries[i] = RowAddress::select((i / run) as u8);
            i += 1;
        }
        Self { entries }
    }

    /// All entries including the trailing sentinel.
    #[must_use]
    pub fn entries(&self) -> &[RowAddress; LEN] {
        &self.entries
    }

    /// The trailing idle code.
    #[must_use]
    pub fn sentinel(&self) -> RowAddress {
        self.entries[LEN - 1]
    }

    /// The scanned part of the table, without the sentinel.
    #[must_use]
    pub fn scan(&self) -> &[RowAddress] {
        &self.entries[..LEN - 1]
    }

    /// The run of entries emitted while `row` is selected.
    #[must_use]
    pub fn run(&self, row: usize, pwm_bits: u8) -> &[RowAddress] {
        let run = usize::from(pwm_bits);
        &self.entries[row * run..(row + 1) * run]
    }
}

impl<const LEN: usize> Default for AddressTable<LEN> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<const LEN: usize> core::fmt::Debug for AddressTable<LEN> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressTable")
            .field("len", &LEN)
            .field("sentinel", &self.sentinel())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const LEN: usize> defmt::Format for AddressTable<LEN> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "AddressTable<{}>", LEN);
    }
}

unsafe impl<const LEN: usize> ReadBuffer for AddressTable<LEN> {
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        let ptr = self.entries.as_ptr().cast::<u8>();
        (ptr, LEN)
    }
}
