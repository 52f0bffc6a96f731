//! Test doubles: a register-level MCP2515 model behind the SPI/CS traits, and
//! mockall mocks for exact wire expectations.

use std::{cell::RefCell, rc::Rc};

use embedded_hal::{
    blocking::{delay::DelayUs, spi::Transfer},
    digital::v2::OutputPin,
};
use mockall::mock;
use void::Void;

use crate::{
    buffer::{RxBuf, TxBuf},
    regs::Register,
    MCP2515,
};

const CANSTAT: usize = Register::CANSTAT as usize;
const CANCTRL: usize = Register::CANCTRL as usize;
const CANINTF: usize = Register::CANINTF as usize;

/// Internal state of the simulated controller.
#[derive(Debug)]
struct ChipState {
    regs: [u8; 128],
    /// Bytes clocked in during the current chip-select session.
    session: Vec<u8>,
    /// Completed chip-select sessions, oldest first.
    trace: Vec<Vec<u8>>,
    /// Mode requested through `REQOP` and not yet reported by `CANSTAT`.
    pending_mode: Option<u8>,
    /// `CANSTAT` reads left before the pending mode shows up.
    polls_left: u16,
    mode_latency: u16,
    stuck: bool,
    cs_low: bool,
    /// Message that lands in its buffer as soon as that buffer is released.
    arriving: Option<(RxBuf, [u8; 13], bool)>,
}

impl ChipState {
    fn new() -> Self {
        let mut state = Self {
            regs: [0; 128],
            session: Vec::new(),
            trace: Vec::new(),
            pending_mode: None,
            polls_left: 0,
            mode_latency: 0,
            stuck: false,
            cs_low: false,
            arriving: None,
        };
        state.reset();
        state
    }

    fn reset(&mut self) {
        self.regs = [0; 128];
        self.regs[CANSTAT] = 0x80;
        self.regs[CANCTRL] = 0x87;
        self.pending_mode = None;
    }

    fn read_reg(&mut self, addr: u8) -> u8 {
        let addr = usize::from(addr & 0x7F);
        if addr == CANSTAT {
            if let Some(mode) = self.pending_mode {
                if self.polls_left == 0 && !self.stuck {
                    self.regs[CANSTAT] = (self.regs[CANSTAT] & 0x1F) | (mode << 5);
                    self.pending_mode = None;
                } else {
                    self.polls_left = self.polls_left.saturating_sub(1);
                }
            }
        }
        self.regs[addr]
    }

    fn write_reg(&mut self, addr: u8, value: u8) {
        let addr = usize::from(addr & 0x7F);
        match addr {
            // Read-only
            CANSTAT => {}
            CANCTRL => {
                let old_reqop = self.regs[CANCTRL] >> 5;
                self.regs[CANCTRL] = value;
                if value >> 5 != old_reqop || self.pending_mode.is_some() {
                    self.pending_mode = Some(value >> 5);
                    self.polls_left = self.mode_latency;
                }
            }
            _ => self.regs[addr] = value,
        }
    }

    fn load_rx(&mut self, buf: RxBuf, block: [u8; 13], rtr: bool) {
        let sidh = buf.sidh() as usize;
        self.regs[sidh..sidh + 13].copy_from_slice(&block);
        let ctrl = buf.ctrl() as usize;
        if rtr {
            self.regs[ctrl] |= 0x08;
        } else {
            self.regs[ctrl] &= !0x08;
        }
        self.regs[CANINTF] |= 1 << buf.index();
    }

    fn status(&self) -> u8 {
        let intf = self.regs[CANINTF];
        let txreq = |buf: TxBuf| (self.regs[buf.ctrl() as usize] >> 3) & 1;
        (intf & 0b11)
            | (txreq(TxBuf::B0) << 2)
            | (((intf >> 2) & 1) << 3)
            | (txreq(TxBuf::B1) << 4)
            | (((intf >> 3) & 1) << 5)
            | (txreq(TxBuf::B2) << 6)
            | (((intf >> 4) & 1) << 7)
    }

    fn rx_status(&self) -> u8 {
        let intf = self.regs[CANINTF];
        let full = intf & 0b11;
        let buf = match full {
            0 => return 0,
            0b10 => RxBuf::B1,
            _ => RxBuf::B0,
        };
        let ctrl = self.regs[buf.ctrl() as usize];
        let sidl = self.regs[buf.sidh() as usize + 1];
        let rtr = (ctrl >> 3) & 1;
        let extended = (sidl >> 3) & 1;
        (full << 6) | (extended << 4) | (rtr << 3) | (ctrl & 0b111)
    }

    /// Clocks one byte of the current session through the chip.
    fn exchange(&mut self, byte: u8) -> u8 {
        self.session.push(byte);
        let pos = self.session.len() - 1;
        let op = self.session[0];
        match op {
            0xC0 if pos == 0 => {
                self.reset();
                0
            }
            0x80..=0x87 if pos == 0 => {
                for buf in TxBuf::ALL {
                    if op & (1 << buf.index()) != 0 {
                        self.regs[buf.ctrl() as usize] |= 0x08;
                    }
                }
                0
            }
            0x03 if pos >= 2 => {
                let addr = self.session[1].wrapping_add((pos - 2) as u8);
                self.read_reg(addr)
            }
            0x02 if pos >= 2 => {
                let addr = self.session[1].wrapping_add((pos - 2) as u8);
                self.write_reg(addr, byte);
                0
            }
            0x05 if pos == 3 => {
                let addr = self.session[1];
                let mask = self.session[2];
                let current = self.regs[usize::from(addr & 0x7F)];
                self.write_reg(addr, (current & !mask) | (byte & mask));
                0
            }
            0xA0 if pos >= 1 => self.status(),
            0xB0 if pos >= 1 => self.rx_status(),
            0x90 | 0x92 | 0x94 | 0x96 if pos >= 1 => {
                let buf = if op & 0x04 == 0 { RxBuf::B0 } else { RxBuf::B1 };
                let start = if op & 0x02 == 0 {
                    buf.sidh() as u8
                } else {
                    buf.data() as u8
                };
                self.regs[usize::from(start.wrapping_add((pos - 1) as u8) & 0x7F)]
            }
            _ => 0,
        }
    }

    fn select(&mut self) {
        self.cs_low = true;
        self.session.clear();
    }

    fn deselect(&mut self) {
        if !self.cs_low {
            return;
        }
        self.cs_low = false;
        // Raising CS after READ RX BUFFER releases the buffer.
        if let Some(&op) = self.session.first() {
            if matches!(op, 0x90 | 0x92 | 0x94 | 0x96) {
                let released = if op & 0x04 == 0 { RxBuf::B0 } else { RxBuf::B1 };
                self.regs[CANINTF] &= !(1 << released.index());
                if matches!(self.arriving, Some((buf, ..)) if buf == released) {
                    if let Some((buf, block, rtr)) = self.arriving.take() {
                        self.load_rx(buf, block, rtr);
                    }
                }
            }
        }
        let session = core::mem::take(&mut self.session);
        self.trace.push(session);
    }
}

/// Simulated MCP2515. Clones share the same chip.
#[derive(Debug, Clone)]
pub struct SimChip(Rc<RefCell<ChipState>>);

/// SPI side of a [`SimChip`].
#[derive(Debug)]
pub struct SimSpi(Rc<RefCell<ChipState>>);

/// Chip-select side of a [`SimChip`].
#[derive(Debug)]
pub struct SimCs(Rc<RefCell<ChipState>>);

impl SimChip {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(ChipState::new())))
    }

    /// A driver talking to this chip.
    pub fn driver(&self) -> MCP2515<SimSpi, SimCs> {
        MCP2515::new(SimSpi(self.0.clone()), SimCs(self.0.clone()))
    }

    pub fn reg(&self, reg: Register) -> u8 {
        self.0.borrow().regs[reg as usize]
    }

    pub fn set_reg(&self, reg: Register, value: u8) {
        self.0.borrow_mut().regs[reg as usize] = value;
    }

    pub fn regs(&self, start: Register, len: usize) -> Vec<u8> {
        let start = start as usize;
        self.0.borrow().regs[start..start + len].to_vec()
    }

    /// Forces `CANSTAT.OPMOD` without going through a request.
    pub fn force_mode(&self, opmod: u8) {
        let mut state = self.0.borrow_mut();
        state.regs[CANSTAT] = (state.regs[CANSTAT] & 0x1F) | (opmod << 5);
        state.regs[CANCTRL] = (state.regs[CANCTRL] & 0x1F) | (opmod << 5);
        state.pending_mode = None;
    }

    /// Number of `CANSTAT` reads a requested mode stays invisible for.
    pub fn set_mode_latency(&self, polls: u16) {
        self.0.borrow_mut().mode_latency = polls;
    }

    /// Makes the chip ignore mode requests.
    pub fn set_stuck(&self, stuck: bool) {
        self.0.borrow_mut().stuck = stuck;
    }

    /// Chip-select sessions recorded so far.
    pub fn trace(&self) -> Vec<Vec<u8>> {
        self.0.borrow().trace.clone()
    }

    pub fn clear_trace(&self) {
        self.0.borrow_mut().trace.clear();
    }

    /// Finishes the pending transmission of a buffer, as the bus would.
    pub fn complete_tx(&self, buf: TxBuf) {
        self.0.borrow_mut().regs[buf.ctrl() as usize] &= !0x08;
    }

    /// Places a message in a receive buffer. `block` holds `SIDH`..`D7`.
    pub fn receive(&self, buf: RxBuf, block: [u8; 13], rtr: bool) {
        self.0.borrow_mut().load_rx(buf, block, rtr);
    }

    /// Queues a message that arrives in `buf` the moment the buffer is
    /// released by a `READ RX BUFFER` session.
    pub fn receive_on_release(&self, buf: RxBuf, block: [u8; 13], rtr: bool) {
        self.0.borrow_mut().arriving = Some((buf, block, rtr));
    }
}

impl Transfer<u8> for SimSpi {
    type Error = Void;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Void> {
        let mut state = self.0.borrow_mut();
        for word in words.iter_mut() {
            *word = state.exchange(*word);
        }
        Ok(words)
    }
}

impl OutputPin for SimCs {
    type Error = Void;

    fn set_low(&mut self) -> Result<(), Void> {
        self.0.borrow_mut().select();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Void> {
        self.0.borrow_mut().deselect();
        Ok(())
    }
}

/// Delay provider that returns immediately.
#[derive(Debug, Default)]
pub struct NoDelay;

impl DelayUs<u16> for NoDelay {
    fn delay_us(&mut self, _us: u16) {}
}

mock! {
    pub SPIBus {}

    impl Transfer<u8> for SPIBus {
        type Error = u32;

        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'static [u8], u32>;
    }
}

mock! {
    pub Pin {}

    impl OutputPin for Pin {
        type Error = u32;

        fn set_low(&mut self) -> Result<(), u32>;
        fn set_high(&mut self) -> Result<(), u32>;
    }
}
