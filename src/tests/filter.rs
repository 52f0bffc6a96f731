use embedded_hal::can::{ExtendedId, Id, StandardId};

use crate::error::Error;
use crate::filter::{RxFilter, RxMask};
use crate::mocks::SimChip;
use crate::regs::{OpMode, Register};

#[test]
fn test_extended_mask_read_back() {
    let chip = SimChip::new();
    let mut mcp = chip.driver();

    mcp.set_mask(RxMask::Mask0, Id::Extended(ExtendedId::MAX)).unwrap();
    assert_eq!(vec![0xFF, 0xE3, 0xFF, 0xFF], chip.regs(Register::RXM0SIDH, 4));
    assert_eq!(0x1FFF_FFFF, mcp.read_mask(RxMask::Mask0).unwrap());

    let id = ExtendedId::new(0x1234_5678).unwrap();
    mcp.set_mask(RxMask::Mask1, Id::Extended(id)).unwrap();
    assert_eq!(vec![0x91, 0xA0, 0x56, 0x78], chip.regs(Register::RXM1SIDH, 4));
    assert_eq!(0x1234_5678, mcp.read_mask(RxMask::Mask1).unwrap());
}

#[test]
fn test_standard_mask_read_back() {
    let chip = SimChip::new();
    let mut mcp = chip.driver();

    mcp.set_mask(RxMask::Mask1, Id::Standard(StandardId::MAX)).unwrap();
    assert_eq!(vec![0xFF, 0xE0, 0x00, 0x00], chip.regs(Register::RXM1SIDH, 4));
    // Standard bits sit at 28:18
    assert_eq!(0x7FF << 18, mcp.read_mask(RxMask::Mask1).unwrap());
}

#[test]
fn test_filter_read_back() {
    let chip = SimChip::new();
    let mut mcp = chip.driver();

    let standard = Id::Standard(StandardId::new(0x555).unwrap());
    mcp.set_filter(RxFilter::F3, standard).unwrap();
    assert_eq!(vec![0xAA, 0xA0, 0x00, 0x00], chip.regs(Register::RXF3SIDH, 4));
    assert_eq!(standard, mcp.read_filter(RxFilter::F3).unwrap());

    let extended = Id::Extended(ExtendedId::new(0x1234_5678).unwrap());
    mcp.set_filter(RxFilter::F1, extended).unwrap();
    assert_eq!(vec![0x91, 0xA8, 0x56, 0x78], chip.regs(Register::RXF1SIDH, 4));
    assert_eq!(extended, mcp.read_filter(RxFilter::F1).unwrap());
}

#[test]
fn test_filter_write_is_bracketed_by_mode_changes() {
    let chip = SimChip::new();
    chip.force_mode(2);
    let mut mcp = chip.driver();

    mcp.set_filter(RxFilter::F0, Id::Standard(StandardId::new(0x8).unwrap()))
        .unwrap();

    let trace = chip.trace();
    let to_config = trace
        .iter()
        .position(|s| *s == vec![0x05, 0x0F, 0xE0, 0x80])
        .unwrap();
    let write = trace.iter().position(|s| s.starts_with(&[0x02, 0x00])).unwrap();
    let to_normal = trace
        .iter()
        .position(|s| *s == vec![0x05, 0x0F, 0xE0, 0x00])
        .unwrap();
    assert!(to_config < write && write < to_normal);

    // Always back to normal, even from loopback
    assert_eq!(OpMode::Normal, mcp.get_mode().unwrap());
}

#[test]
fn test_filter_not_written_outside_configuration() {
    let chip = SimChip::new();
    chip.force_mode(0);
    chip.set_stuck(true);
    let mut mcp = chip.driver();
    mcp.set_mode_poll_limit(3);

    let result = mcp.set_mask(RxMask::Mask0, Id::Extended(ExtendedId::MAX));
    assert!(matches!(
        result,
        Err(Error::NewModeTimeout(OpMode::Configuration))
    ));
    assert_eq!(vec![0; 4], chip.regs(Register::RXM0SIDH, 4));
}
