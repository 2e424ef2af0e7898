//! Period / duty table streamed into the PWM timer.
//!
//! One [`TimerSlot`] per bit-plane slot. The timer counts up to `period` and
//! keeps the row's output enabled until it reaches `duty`, so the light
//! emitted in slot `i` of a row is `duty[i]` ticks long. Duties double with
//! every bit-plane (binary code modulation): `PWM_BITS` pulses give
//! `2^PWM_BITS` levels instead of needing `2^PWM_BITS` equal pulses.
//!
//! Brightness is folded into the duties when the table is built, so the scan
//! itself never multiplies. The table is rebuilt wholesale whenever the
//! brightness changes.

use embedded_dma::ReadBuffer;

use crate::{compute_table_len, Error, Result};

/// Timer parameters shared by every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerConfig {
    /// Ticks lit for the least significant bit-plane at full brightness.
    pub lsb_ticks: u16,
    /// Shortest slot period, long enough to shift one bit-plane into the
    /// drivers before the next latch.
    pub min_slot_ticks: u16,
}

impl TimerConfig {
    /// Defaults sized for a 12-bit scan on a 16-bit timer.
    pub const DEFAULT: Self = Self {
        lsb_ticks: 16,
        min_slot_ticks: 480,
    };

    /// Check that every bit-plane slot fits the 16-bit timer registers.
    ///
    /// # Errors
    ///
    /// [`Error::ZeroTimeUnit`] if `lsb_ticks` is zero, and
    /// [`Error::SlotOverflow`] if the most significant slot is too long.
    pub fn validate(&self, pwm_bits: u8) -> Result<()> {
        if self.lsb_ticks == 0 {
            return Err(Error::ZeroTimeUnit);
        }
        let top = pwm_bits.saturating_sub(1);
        if u32::from(self.lsb_ticks) << top > u32::from(u16::MAX) {
            return Err(Error::SlotOverflow(top));
        }
        Ok(())
    }

    /// Full-brightness width of bit-plane `plane`.
    #[must_use]
    pub const fn plane_ticks(&self, plane: u8) -> u32 {
        (self.lsb_ticks as u32) << plane
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Clamp a requested brightness into `[0, 1]`; NaN reads as off.
#[must_use]
pub fn clamp_brightness(brightness: f32) -> f32 {
    if brightness.is_nan() {
        0.0
    } else {
        brightness.clamp(0.0, 1.0)
    }
}

/// One timer period and its output-enable threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct TimerSlot {
    /// Counter reload value.
    pub period: u16,
    /// Compare value; the row is lit while the counter is below it.
    pub duty: u16,
}

/// Timer table of `LEN = ROWS * PWM_BITS + 1` slots.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TimerTable<const LEN: usize> {
    slots: [TimerSlot; LEN],
}

impl<const LEN: usize> TimerTable<LEN> {
    /// A table with every slot zero.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            slots: [TimerSlot { period: 0, duty: 0 }; LEN],
        }
    }

    /// Build the table for the given geometry and brightness.
    ///
    /// The config must already have passed [`TimerConfig::validate`];
    /// otherwise oversized slots saturate at `u16::MAX`.
    ///
    /// # Panics
    ///
    /// Panics if `LEN` does not equal `rows * pwm_bits + 1`.
    #[must_use]
    pub fn build(rows: usize, pwm_bits: u8, brightness: f32, config: &TimerConfig) -> Self {
        assert_eq!(LEN, compute_table_len(rows, pwm_bits));
        let brightness = clamp_brightness(brightness);
        let run = usize::from(pwm_bits);

        let mut slots = [TimerSlot::default(); LEN];
        let (scan, sentinel) = slots.split_at_mut(LEN - 1);
        for (i, slot) in scan.iter_mut().enumerate() {
            let ticks = config.plane_ticks((i % run) as u8);
            slot.period = saturate(ticks.max(u32::from(config.min_slot_ticks)));
            slot.duty = saturate(scale(ticks, brightness));
        }
        sentinel[0] = TimerSlot {
            period: config.min_slot_ticks.max(config.lsb_ticks),
            duty: 0,
        };
        Self { slots }
    }

    /// All slots including the trailing sentinel.
    #[must_use]
    pub fn slots(&self) -> &[TimerSlot; LEN] {
        &self.slots
    }

    /// The scanned slots, without the sentinel.
    #[must_use]
    pub fn scan(&self) -> &[TimerSlot] {
        &self.slots[..LEN - 1]
    }

    /// The trailing slot driven while the channels are re-armed.
    #[must_use]
    pub fn sentinel(&self) -> TimerSlot {
        self.slots[LEN - 1]
    }

    /// Period values, in slot order.
    pub fn periods(&self) -> impl Iterator<Item = u16> + '_ {
        self.slots.iter().map(|s| s.period)
    }

    /// Duty values, in slot order.
    pub fn duties(&self) -> impl Iterator<Item = u16> + '_ {
        self.slots.iter().map(|s| s.duty)
    }
}

// Round to nearest without `f32::round`, which needs std.
fn scale(ticks: u32, brightness: f32) -> u32 {
    (ticks as f32 * brightness + 0.5) as u32
}

fn saturate(ticks: u32) -> u16 {
    u16::try_from(ticks).unwrap_or(u16::MAX)
}

impl<const LEN: usize> Default for TimerTable<LEN> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const LEN: usize> core::fmt::Debug for TimerTable<LEN> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimerTable")
            .field("len", &LEN)
            .field("first", &self.slots[0])
            .field("sentinel", &self.sentinel())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const LEN: usize> defmt::Format for TimerTable<LEN> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "TimerTable<{}> sentinel: {}", LEN, self.sentinel());
    }
}

unsafe impl<const LEN: usize> ReadBuffer for TimerTable<LEN> {
    type Word = u16;

    unsafe fn read_buffer(&self) -> (*const u16, usize) {
        let ptr = self.slots.as_ptr().cast::<u16>();
        (ptr, LEN * 2)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;
    use std::vec::Vec;

    use super::*;

    const ROWS: usize = 8;
    const PWM_BITS: u8 = 12;
    const LEN: usize = compute_table_len(ROWS, PWM_BITS);

    fn config() -> TimerConfig {
        TimerConfig {
            lsb_ticks: 10,
            min_slot_ticks: 300,
        }
    }

    #[test]
    fn test_validate() {
        assert_eq!(config().validate(PWM_BITS), Ok(()));
        assert_eq!(TimerConfig::DEFAULT.validate(PWM_BITS), Ok(()));
        assert_eq!(
            TimerConfig {
                lsb_ticks: 0,
                min_slot_ticks: 1
            }
            .validate(PWM_BITS),
            Err(Error::ZeroTimeUnit)
        );
        // 32 << 11 = 65536 does not fit
        assert_eq!(
            TimerConfig {
                lsb_ticks: 32,
                min_slot_ticks: 1
            }
            .validate(PWM_BITS),
            Err(Error::SlotOverflow(11))
        );
        assert_eq!(
            TimerConfig {
                lsb_ticks: 31,
                min_slot_ticks: 1
            }
            .validate(PWM_BITS),
            Ok(())
        );
    }

    #[test]
    fn test_clamp_brightness() {
        assert_eq!(clamp_brightness(-1.0), 0.0);
        assert_eq!(clamp_brightness(2.5), 1.0);
        assert_eq!(clamp_brightness(0.25), 0.25);
        assert_eq!(clamp_brightness(f32::NAN), 0.0);
    }

    #[test]
    fn test_full_brightness_doubles() {
        let table = TimerTable::<LEN>::build(ROWS, PWM_BITS, 1.0, &config());
        for row in table.scan().chunks_exact(PWM_BITS as usize) {
            for (i, pair) in row.windows(2).enumerate() {
                assert_eq!(pair[1].duty, pair[0].duty * 2, "plane {}", i + 1);
            }
            assert_eq!(row[0].duty, 10);
            assert_eq!(row[11].duty, 10 << 11);
        }
    }

    #[test]
    fn test_partial_brightness_is_binary_weighted() {
        let table = TimerTable::<LEN>::build(ROWS, PWM_BITS, 0.3, &config());
        let row = &table.scan()[..PWM_BITS as usize];
        for pair in row.windows(2) {
            let doubled = i32::from(pair[0].duty) * 2;
            assert!((i32::from(pair[1].duty) - doubled).abs() <= 1);
            assert!(pair[1].duty >= pair[0].duty);
        }
        assert_eq!(row[11].duty, 6144); // 20480 * 0.3
    }

    #[test]
    fn test_periods() {
        let table = TimerTable::<LEN>::build(ROWS, PWM_BITS, 1.0, &config());
        let periods: Vec<u16> = table.periods().take(PWM_BITS as usize).collect();
        // 10 << i is below the 300 tick floor until plane 5
        assert_eq!(&periods[..5], &[300, 300, 300, 300, 300]);
        assert_eq!(periods[5], 320);
        assert_eq!(periods[11], 20480);
        for slot in table.slots() {
            assert!(slot.duty <= slot.period);
        }
    }

    #[test]
    fn test_rows_share_one_pattern() {
        let table = TimerTable::<LEN>::build(ROWS, PWM_BITS, 0.7, &config());
        let first = &table.scan()[..PWM_BITS as usize];
        for row in table.scan().chunks_exact(PWM_BITS as usize) {
            assert_eq!(row, first);
        }
    }

    #[test]
    fn test_zero_brightness() {
        let table = TimerTable::<LEN>::build(ROWS, PWM_BITS, 0.0, &config());
        assert!(table.duties().all(|d| d == 0));
        let full = TimerTable::<LEN>::build(ROWS, PWM_BITS, 1.0, &config());
        assert!(table.periods().eq(full.periods()));
    }

    #[test]
    fn test_out_of_range_brightness_is_clamped() {
        let over = TimerTable::<LEN>::build(ROWS, PWM_BITS, 7.0, &config());
        let full = TimerTable::<LEN>::build(ROWS, PWM_BITS, 1.0, &config());
        assert_eq!(over, full);
        let under = TimerTable::<LEN>::build(ROWS, PWM_BITS, -3.0, &config());
        assert!(under.duties().all(|d| d == 0));
    }

    #[test]
    fn test_sentinel() {
        let table = TimerTable::<LEN>::build(ROWS, PWM_BITS, 1.0, &config());
        assert_eq!(
            table.sentinel(),
            TimerSlot {
                period: 300,
                duty: 0
            }
        );
        assert_eq!(table.slots().len(), 97);
    }

    #[test]
    fn test_read_buffer_interleaves_pairs() {
        let table = TimerTable::<LEN>::build(ROWS, PWM_BITS, 1.0, &config());
        unsafe {
            let (ptr, len) = table.read_buffer();
            assert_eq!(len, LEN * 2);
            assert_eq!(*ptr, 300);
            assert_eq!(*ptr.add(1), 10);
            assert_eq!(*ptr.add(2), 300);
            assert_eq!(*ptr.add(3), 20);
        }
    }

    #[test]
    fn test_debug_formatting() {
        let table = TimerTable::<LEN>::build(ROWS, PWM_BITS, 1.0, &config());
        let s = format!("{:?}", table);
        assert!(s.contains("TimerTable"));
        assert!(s.contains("sentinel"));
    }
}
