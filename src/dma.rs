//! The four-channel scan transaction.
//!
//! One major loop of the scan is `ROWS * PWM_BITS` slots. On every timer
//! period each channel performs one minor loop:
//!
//! | channel | source | per slot |
//! |---|---|---|
//! | [`Channel::Address`] | address table | one byte to the mux port |
//! | [`Channel::PixelEven`] | frame page | even bus words of the group |
//! | [`Channel::PixelOdd`] | frame page, one word in | odd bus words of the group |
//! | [`Channel::Timer`] | timer table | `(period, duty)` pair |
//!
//! The channels are independent engines that together draw one waveform, so
//! they are only ever armed together from one [`ScanTransfer`] with a single
//! major loop count. Hardware support lives behind [`ScanEngine`].

use embedded_dma::ReadBuffer;

use crate::address::{AddressTable, RowAddress};
use crate::encoder::Frame;
use crate::timer::{TimerSlot, TimerTable};
use crate::Result;

/// Number of lock-stepped transfer channels.
pub const CHANNEL_COUNT: usize = 4;

/// The transfer channels of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Row select codes to the address multiplexer.
    Address = 0,
    /// Even-indexed shift-register words.
    PixelEven = 1,
    /// Odd-indexed shift-register words.
    PixelOdd = 2,
    /// Period and compare values to the PWM timer.
    Timer = 3,
}

impl Channel {
    /// All channels, in descriptor order.
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Address,
        Channel::PixelEven,
        Channel::PixelOdd,
        Channel::Timer,
    ];
}

/// Peripheral register a channel writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Destination {
    /// GPIO port driving the address multiplexer.
    AddressPort,
    /// Transmit register of the shift-register bus.
    ShiftRegister,
    /// Timer reload and compare registers, in that order.
    TimerRegisters,
}

/// Width of a single element moved by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ElementSize {
    /// 8 bits.
    Byte,
    /// 16 bits.
    HalfWord,
}

impl ElementSize {
    /// Element width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            ElementSize::Byte => 1,
            ElementSize::HalfWord => 2,
        }
    }
}

/// Memory-to-peripheral transfer for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferDescriptor {
    /// Address of the first element.
    pub source: *const u8,
    /// Register written on every element.
    pub destination: Destination,
    /// Element width.
    pub element: ElementSize,
    /// Bytes the source advances after each element.
    pub source_stride: usize,
    /// Elements moved per timer slot.
    pub minor_elements: usize,
    /// Timer slots before the channel completes.
    pub major_loops: usize,
}

impl TransferDescriptor {
    /// Total bytes read from the source over one major loop, counting the
    /// gaps skipped by the stride.
    #[must_use]
    pub const fn span(&self) -> usize {
        self.source_stride * self.minor_elements * self.major_loops
    }
}

/// The four descriptors of one page scan, sharing one major loop count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTransfer {
    descriptors: [TransferDescriptor; CHANNEL_COUNT],
}

impl ScanTransfer {
    /// Describe one page: `page` selects the frame words `[page * depth,
    /// (page + 1) * depth)` with `depth = major_loops * writes`.
    ///
    /// # Panics
    ///
    /// Panics if `writes` is odd or the page lies outside the frame.
    #[must_use]
    pub fn new<const TABLE_LEN: usize, const FRAME_LEN: usize>(
        address: &AddressTable<TABLE_LEN>,
        timers: &TimerTable<TABLE_LEN>,
        frame: &Frame<FRAME_LEN>,
        page: usize,
        writes: usize,
    ) -> Self {
        assert!(writes % 2 == 0, "pixel words are split across two channels");
        let major_loops = TABLE_LEN - 1;
        let depth = major_loops * writes;
        assert!((page + 1) * depth <= FRAME_LEN, "page outside frame");

        // Safety: the tables and frame outlive the returned descriptors only
        // as raw pointers; the caller keeps them alive while armed.
        let (address_ptr, _) = unsafe { address.read_buffer() };
        let (timer_ptr, _) = unsafe { timers.read_buffer() };
        let (frame_ptr, _) = unsafe { frame.read_buffer() };
        let page_ptr = frame_ptr.wrapping_add(page * depth).cast::<u8>();
        let half = ElementSize::HalfWord.bytes();

        let pixel = |offset: usize| TransferDescriptor {
            source: page_ptr.wrapping_add(offset * half),
            destination: Destination::ShiftRegister,
            element: ElementSize::HalfWord,
            source_stride: 2 * half,
            minor_elements: writes / 2,
            major_loops,
        };

        Self {
            descriptors: [
                TransferDescriptor {
                    source: address_ptr,
                    destination: Destination::AddressPort,
                    element: ElementSize::Byte,
                    source_stride: 1,
                    minor_elements: 1,
                    major_loops,
                },
                pixel(0),
                pixel(1),
                TransferDescriptor {
                    source: timer_ptr.cast::<u8>(),
                    destination: Destination::TimerRegisters,
                    element: ElementSize::HalfWord,
                    source_stride: half,
                    minor_elements: 2,
                    major_loops,
                },
            ],
        }
    }

    /// Descriptor for one channel.
    #[must_use]
    pub fn descriptor(&self, channel: Channel) -> &TransferDescriptor {
        &self.descriptors[channel as usize]
    }

    /// All four descriptors, indexed by [`Channel`].
    #[must_use]
    pub fn descriptors(&self) -> &[TransferDescriptor; CHANNEL_COUNT] {
        &self.descriptors
    }

    /// The major loop count shared by every channel.
    #[must_use]
    pub fn major_loops(&self) -> usize {
        self.descriptors[0].major_loops
    }
}

/// Hardware that runs a scan: four DMA channels plus the PWM timer pacing
/// them.
///
/// Implementations must program all four descriptors of a [`ScanTransfer`]
/// before any of them can be triggered again.
pub trait ScanEngine {
    /// Reserve the channels and the timer.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ChannelUnavailable`] or
    /// [`crate::Error::TimerUnavailable`] when a resource is taken.
    fn claim(&mut self) -> Result<()>;

    /// Drive the bus to the idle state between major loops.
    fn park(&mut self, address: RowAddress, slot: TimerSlot);

    /// Program and enable all four channels.
    fn arm(&mut self, transfer: &ScanTransfer);

    /// Start the timer that paces the channels.
    fn start(&mut self);
}

#[cfg(test)]
pub(crate) mod testing {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::Error;

    /// Engine that records everything it is asked to do. On every `arm` it
    /// copies the page the pixel channels would stream, i.e. what the panel
    /// would show for that major loop.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingEngine {
        pub(crate) refuse: Option<Error>,
        pub(crate) claimed: bool,
        pub(crate) started: bool,
        pub(crate) parked: Vec<(RowAddress, TimerSlot)>,
        pub(crate) armed: Vec<ScanTransfer>,
        pub(crate) pages: Vec<Vec<u16>>,
        pub(crate) duties: Vec<Vec<u16>>,
    }

    // Safety: the recorded descriptors are only compared, never dereferenced
    // after `arm` returns.
    unsafe impl Send for RecordingEngine {}

    impl ScanEngine for RecordingEngine {
        fn claim(&mut self) -> Result<()> {
            if let Some(err) = self.refuse {
                return Err(err);
            }
            self.claimed = true;
            Ok(())
        }

        fn park(&mut self, address: RowAddress, slot: TimerSlot) {
            self.parked.push((address, slot));
        }

        fn arm(&mut self, transfer: &ScanTransfer) {
            let even = transfer.descriptor(Channel::PixelEven);
            let words = even.minor_elements * 2 * even.major_loops;
            let page = unsafe {
                core::slice::from_raw_parts(even.source.cast::<u16>(), words).to_vec()
            };
            let timer = transfer.descriptor(Channel::Timer);
            let slots = unsafe {
                core::slice::from_raw_parts(timer.source.cast::<TimerSlot>(), timer.major_loops)
            };
            self.pages.push(page);
            self.duties.push(slots.iter().map(|s| s.duty).collect());
            self.armed.push(*transfer);
        }

        fn start(&mut self) {
            self.started = true;
        }
    }
}
