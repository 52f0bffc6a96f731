use core::convert::TryFrom;

use embedded_hal::can::{Frame, Id};

use crate::buffer::{Dlc, IdentRegs};

/// CAN frame.
///
/// Frames are plain values: every receive call decodes into a fresh
/// `CanFrame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// ID of CAN frame. Also selects standard or extended encoding.
    pub(crate) id: Id,
    /// Remote transmission request.
    pub(crate) rtr: bool,
    /// Data length code, at most 8.
    pub(crate) dlc: u8,
    /// Data, maximum 8 bytes. Only the first `dlc` bytes are meaningful.
    pub(crate) data: [u8; 8],
}

/// Size of the `SIDH`..`D7` register block of a buffer.
pub const BLOCK_LEN: usize = 13;

impl CanFrame {
    /// Encodes the frame into the `SIDH`..`D7` block of a transmit buffer.
    ///
    /// Returns the block and the number of leading bytes that must be written:
    /// the identifier, the `DLC` byte and, for data frames, exactly `dlc`
    /// payload bytes.
    pub(crate) fn to_tx_block(&self) -> ([u8; BLOCK_LEN], usize) {
        let mut block = [0u8; BLOCK_LEN];
        block[..4].copy_from_slice(&IdentRegs::from_id(self.id).into_bytes());
        block[4] = Dlc::new().with_dlc(self.dlc).with_rtr(self.rtr).into_bytes()[0];
        if self.rtr {
            return (block, 5);
        }
        let len = usize::from(self.dlc);
        block[5..5 + len].copy_from_slice(&self.data[..len]);
        (block, 5 + len)
    }

    /// Builds a frame from the registers of a receive buffer.
    ///
    /// `rtr` comes from `RXBnCTRL.RXRTR`. Remote frames carry no payload and
    /// report a length of 0. The declared length is clamped to the 8 byte
    /// hardware buffer.
    pub(crate) fn from_rx_regs(rtr: bool, ident: IdentRegs, dlc: Dlc, data: [u8; 8]) -> Self {
        if rtr {
            return CanFrame {
                id: ident.id(),
                rtr,
                dlc: 0,
                data: [0; 8],
            };
        }
        CanFrame {
            id: ident.id(),
            rtr,
            dlc: dlc.dlc().min(8),
            data,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CanFrame {
    fn format(&self, fmt: defmt::Formatter) {
        let (kind, raw) = match self.id {
            Id::Standard(id) => ("std", u32::from(id.as_raw())),
            Id::Extended(id) => ("ext", id.as_raw()),
        };
        if self.rtr {
            defmt::write!(fmt, "{}:{:#X} rtr dlc={}", kind, raw, self.dlc);
        } else {
            defmt::write!(
                fmt,
                "{}:{:#X} {=[u8]:#X}",
                kind,
                raw,
                &self.data[..usize::from(self.dlc)]
            );
        }
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let dlc = u8::try_from(data.len()).ok().filter(|&n| n <= 8)?;
        let mut payload = [0u8; 8];
        payload[..data.len()].copy_from_slice(data);
        Some(CanFrame {
            id: id.into(),
            rtr: false,
            dlc,
            data: payload,
        })
    }

    /// Remote frame requesting `dlc` bytes. The requested length goes into the
    /// `DLC` register next to the remote bit; no payload is written.
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        let dlc = u8::try_from(dlc).ok().filter(|&n| n <= 8)?;
        Some(CanFrame {
            id: id.into(),
            rtr: true,
            dlc,
            data: [0; 8],
        })
    }

    #[inline]
    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    #[inline]
    fn is_remote_frame(&self) -> bool {
        self.rtr
    }

    #[inline]
    fn id(&self) -> Id {
        self.id
    }

    #[inline]
    fn dlc(&self) -> usize {
        usize::from(self.dlc)
    }

    fn data(&self) -> &[u8] {
        if self.rtr {
            &[]
        } else {
            &self.data[..self.dlc()]
        }
    }
}
