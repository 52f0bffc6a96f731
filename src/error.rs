use core::fmt::Debug;

use embedded_hal::can::ErrorKind;

use crate::regs::OpMode;

pub type Result<T, SPIE, CSE> = core::result::Result<T, Error<SPIE, CSE>>;

#[derive(Debug)]
pub enum Error<SPIE, CSE> {
    /// SPI transfer failed.
    Spi(SPIE),
    /// Driving the chip-select pin failed.
    Hal(CSE),
    /// The controller did not report the requested mode within the configured
    /// number of polls.
    NewModeTimeout(OpMode),
    /// `CANSTAT` reported a reserved operating mode bit pattern.
    InvalidOpMode(u8),
    /// The selected transmit buffer still has a pending transmission, or no
    /// transmit buffer is free.
    TxBusy,
    /// No receive buffer holds a message.
    NoMessage,
    /// More than 8 payload bytes were supplied.
    InvalidDataLength(usize),
}

/// Every variant is a driver or transport failure, reported as
/// [`ErrorKind::Other`]. Bus-level faults are read from the chip with
/// `error_flags` and `tx_error` instead. `TxBusy` and `NoMessage` only reach
/// callers of the inherent methods; the `nb` paths turn them into
/// `WouldBlock`.
impl<SPIE: Debug, CSE: Debug> embedded_hal::can::Error for Error<SPIE, CSE> {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// A raw buffer, filter or mask index outside of the hardware range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct InvalidIndex(pub u8);
