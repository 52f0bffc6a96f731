//! Transmit/receive buffers and the identifier register layout they share
//! with the acceptance filters and masks.

use bitflags::bitflags;
use embedded_hal::can::{ExtendedId, Id, StandardId};
use modular_bitfield::prelude::*;

use crate::regs::{CanIntf, Register, TxbCtrl};

/// `SIDL` register of a buffer, filter or mask.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sidl {
    /// Extended identifier bits 17:16.
    pub eid: B2,
    #[skip]
    __: B1,
    /// Extended identifier enable (`EXIDE`/`IDE`). Unimplemented on masks.
    pub exide: bool,
    #[skip]
    __: B1,
    /// Standard identifier bits 2:0.
    pub sid: B3,
}

/// `DLC` register of a buffer.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dlc {
    /// Data length code. The controller never moves more than 8 bytes.
    pub dlc: B4,
    #[skip]
    __: B2,
    /// Remote transmission request.
    pub rtr: bool,
    #[skip]
    __: B1,
}

/// The four identifier registers (`SIDH`, `SIDL`, `EID8`, `EID0`), laid out
/// identically for transmit buffers, receive buffers, filters and masks.
///
/// In standard mode the 11-bit identifier is split 8/3 over `SIDH` and the top
/// of `SIDL`, `EXIDE` is clear and `EID8`/`EID0` are zero. In extended mode the
/// upper 11 bits of the 29-bit identifier are laid out as a standard identifier
/// and the lower 18 bits go into `SIDL[1:0]`, `EID8` and `EID0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IdentRegs {
    pub sidh: u8,
    pub sidl: Sidl,
    pub eid8: u8,
    pub eid0: u8,
}

impl IdentRegs {
    /// Encodes a CAN identifier. Range is guaranteed by the `Id` type.
    pub fn from_id(id: Id) -> Self {
        match id {
            Id::Standard(id) => {
                let raw = id.as_raw();
                Self {
                    sidh: (raw >> 3) as u8,
                    sidl: Sidl::new().with_sid((raw & 0x7) as u8),
                    eid8: 0,
                    eid0: 0,
                }
            }
            Id::Extended(id) => {
                let raw = id.as_raw();
                Self {
                    sidh: (raw >> 21) as u8,
                    sidl: Sidl::new()
                        .with_sid(((raw >> 18) & 0x7) as u8)
                        .with_exide(true)
                        .with_eid(((raw >> 16) & 0x3) as u8),
                    eid8: (raw >> 8) as u8,
                    eid0: raw as u8,
                }
            }
        }
    }

    /// Encodes an acceptance mask. Masks have no `EXIDE` bit; a standard
    /// mask only covers the 11 standard identifier bits.
    pub fn mask_from_id(id: Id) -> Self {
        let mut regs = Self::from_id(id);
        regs.sidl.set_exide(false);
        regs
    }

    /// Decodes the identifier, using `EXIDE` to pick the frame type.
    pub fn id(&self) -> Id {
        let sid = (u16::from(self.sidh) << 3) | u16::from(self.sidl.sid());
        if self.sidl.exide() {
            Id::Extended(ExtendedId::new(self.raw()).unwrap_or(ExtendedId::MAX))
        } else {
            Id::Standard(StandardId::new(sid).unwrap_or(StandardId::MAX))
        }
    }

    /// The 29-bit value held by the registers, ignoring `EXIDE`. Standard
    /// identifier bits occupy bits 28:18.
    pub fn raw(&self) -> u32 {
        let sid = (u32::from(self.sidh) << 3) | u32::from(self.sidl.sid());
        (sid << 18)
            | (u32::from(self.sidl.eid()) << 16)
            | (u32::from(self.eid8) << 8)
            | u32::from(self.eid0)
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            sidh: bytes[0],
            sidl: Sidl::from_bytes([bytes[1]]),
            eid8: bytes[2],
            eid0: bytes[3],
        }
    }

    pub fn into_bytes(self) -> [u8; 4] {
        [self.sidh, self.sidl.into_bytes()[0], self.eid8, self.eid0]
    }
}

crate::index_def! {
    /// Transmit buffer.
    TxBuf => {
        /// Tx buffer 0.
        B0 = 0,
        /// Tx buffer 1.
        B1 = 1,
        /// Tx buffer 2.
        B2 = 2
    }
}

impl TxBuf {
    const CTRL: [Register; 3] = [Register::TXB0CTRL, Register::TXB1CTRL, Register::TXB2CTRL];
    const SIDH: [Register; 3] = [Register::TXB0SIDH, Register::TXB1SIDH, Register::TXB2SIDH];
    const DLC: [Register; 3] = [Register::TXB0DLC, Register::TXB1DLC, Register::TXB2DLC];

    /// Returns the `CTRL` register for the selected Tx buffer.
    pub const fn ctrl(self) -> Register {
        Self::CTRL[self as usize]
    }

    /// Returns the `SIDH` register, start of the identifier block.
    pub const fn sidh(self) -> Register {
        Self::SIDH[self as usize]
    }

    /// Returns the `DLC` register for the selected Tx buffer.
    pub const fn dlc(self) -> Register {
        Self::DLC[self as usize]
    }
}

bitflags! {
    /// Set of transmit buffers triggered by one `RTS` instruction.
    pub struct TxBufSet: u8 {
        const B0 = 0b001;
        const B1 = 0b010;
        const B2 = 0b100;
    }
}

impl TxBufSet {
    /// The `RTS` instruction addressing exactly this set (`0x81`-`0x87`).
    pub const fn rts_instruction(self) -> u8 {
        0x80 | self.bits()
    }
}

impl From<TxBuf> for TxBufSet {
    fn from(buf: TxBuf) -> Self {
        Self::from_bits_truncate(1 << buf.index())
    }
}

/// Transmission result latched in `TXBnCTRL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum TxError {
    NoError,
    /// Message lost arbitration while being sent.
    LostArbitration,
    /// A bus error occurred while the message was being sent.
    OtherError,
}

impl From<TxbCtrl> for TxError {
    fn from(ctrl: TxbCtrl) -> Self {
        if ctrl.mloa() {
            TxError::LostArbitration
        } else if ctrl.txerr() {
            TxError::OtherError
        } else {
            TxError::NoError
        }
    }
}

crate::index_def! {
    /// Receive buffer.
    RxBuf => {
        /// Rx buffer 0.
        B0 = 0,
        /// Rx buffer 1.
        B1 = 1
    }
}

/// Where a `READ RX BUFFER` instruction starts streaming from.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxReadStart {
    /// Start at `RXBnSIDH`.
    Ident = 0,
    /// Start at `RXBnD0`.
    Data = 1,
}

impl RxBuf {
    const CTRL: [Register; 2] = [Register::RXB0CTRL, Register::RXB1CTRL];
    const SIDH: [Register; 2] = [Register::RXB0SIDH, Register::RXB1SIDH];
    const DATA: [Register; 2] = [Register::RXB0DATA, Register::RXB1DATA];

    /// Returns the `CTRL` register for the selected Rx buffer.
    pub const fn ctrl(self) -> Register {
        Self::CTRL[self as usize]
    }

    /// Returns the `SIDH` register, start of the identifier block.
    pub const fn sidh(self) -> Register {
        Self::SIDH[self as usize]
    }

    /// Returns the `DATA` register for the selected Rx buffer.
    pub const fn data(self) -> Register {
        Self::DATA[self as usize]
    }

    /// `READ RX BUFFER` instruction (`0x90`, `0x92`, `0x94`, `0x96`).
    pub const fn read_instruction(self, start: RxReadStart) -> u8 {
        0x90 | ((self as u8) << 2) | ((start as u8) << 1)
    }

    /// `CANINTF` bit flagging a message in this buffer.
    pub const fn intf_mask(self) -> CanIntf {
        match self {
            RxBuf::B0 => CanIntf::MASK_RX0IF,
            RxBuf::B1 => CanIntf::MASK_RX1IF,
        }
    }
}
