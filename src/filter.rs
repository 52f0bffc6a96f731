//! Acceptance filters and masks.
//!
//! Both share the identifier register layout of [`IdentRegs`]; filters carry
//! an `EXIDE` bit selecting which frame type they apply to, masks do not.

use embedded_hal::can::Id;

use crate::{buffer::IdentRegs, regs::Register};

crate::index_def! {
    /// Receive filters.
    RxFilter => {
        /// RXF0
        F0 = 0,
        /// RXF1
        F1 = 1,
        /// RXF2
        F2 = 2,
        /// RXF3
        F3 = 3,
        /// RXF4
        F4 = 4,
        /// RXF5
        F5 = 5
    }
}

impl RxFilter {
    const SIDH: [Register; 6] = [
        Register::RXF0SIDH,
        Register::RXF1SIDH,
        Register::RXF2SIDH,
        Register::RXF3SIDH,
        Register::RXF4SIDH,
        Register::RXF5SIDH,
    ];

    /// Returns the `SIDH` register, start of the four filter registers.
    pub const fn sidh(self) -> Register {
        Self::SIDH[self as usize]
    }

    /// Register content for a filter matching `id`.
    pub fn regs(id: Id) -> IdentRegs {
        IdentRegs::from_id(id)
    }
}

crate::index_def! {
    /// Receive masks. Mask 0 applies to RXB0, mask 1 to RXB1.
    RxMask => {
        /// RXM0
        Mask0 = 0,
        /// RXM1
        Mask1 = 1
    }
}

impl RxMask {
    const SIDH: [Register; 2] = [Register::RXM0SIDH, Register::RXM1SIDH];

    /// Returns the `SIDH` register, start of the four mask registers.
    pub const fn sidh(self) -> Register {
        Self::SIDH[self as usize]
    }

    /// Register content for a mask over the bits set in `id`.
    pub fn regs(id: Id) -> IdentRegs {
        IdentRegs::mask_from_id(id)
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use embedded_hal::can::{ExtendedId, StandardId};

    use super::*;

    #[test]
    fn filter_registers_are_four_apart_around_the_control_gap() {
        assert_eq!(RxFilter::F2.sidh() as u8, 0x08);
        assert_eq!(RxFilter::F3.sidh() as u8, 0x10);
        assert_eq!(RxMask::Mask1.sidh() as u8, 0x24);
        assert!(RxFilter::try_from(6).is_err());
    }

    #[test]
    fn standard_filter_clears_exide() {
        let regs = RxFilter::regs(Id::Standard(StandardId::new(0x555).unwrap()));
        assert_eq!(regs.into_bytes(), [0xAA, 0xA0, 0, 0]);
    }

    #[test]
    fn extended_filter_sets_exide() {
        let regs = RxFilter::regs(Id::Extended(ExtendedId::new(0x3_FFFF).unwrap()));
        assert_eq!(regs.into_bytes(), [0x00, 0x0B, 0xFF, 0xFF]);
    }
}
