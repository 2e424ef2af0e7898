use derive_more::derive::{Display, Error};

use crate::dma::Channel;

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported while configuring or starting the scan.
///
/// Geometry mistakes never show up here: they are rejected at compile time.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The least significant timer slot is zero ticks long.
    #[display("timer LSB slot must be at least one tick")]
    ZeroTimeUnit,

    /// The slot for the given bit-plane does not fit the 16-bit timer.
    #[display("timer slot for bit-plane {_0} overflows 16 bits")]
    SlotOverflow(#[error(not(source))] u8),

    /// A transfer channel could not be reserved.
    #[display("DMA channel {_0:?} is unavailable")]
    ChannelUnavailable(#[error(not(source))] Channel),

    /// The PWM timer could not be reserved.
    #[display("PWM timer is unavailable")]
    TimerUnavailable,
}
