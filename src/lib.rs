#![cfg_attr(not(test), no_std)]

//! # MCP2515 CAN controller driver
//!
//! Register-level driver for the Microchip MCP2515 stand-alone CAN controller,
//! driven over SPI through the `embedded-hal` 0.2 traits.
//!
//! * Standard (11-bit) and extended (29-bit) identifiers.
//! * Three transmit and two receive buffers, addressed explicitly or picked
//!   automatically.
//! * Acceptance filters and masks.
//! * Bounded, self-confirming operating mode changes.
//!
//! Every driver call runs its own chip-select bracket(s) to completion. When the
//! driver is shared between execution contexts, wrap it in a mutex covering
//! whole driver calls.

pub mod buffer;
pub mod error;
pub mod filter;
pub mod frame;
pub(crate) mod macros;
pub mod regs;
pub mod stat;
pub mod timing;

#[cfg(test)]
pub(crate) mod mocks;
#[cfg(test)]
mod tests;

use core::fmt::Debug;

use buffer::{IdentRegs, RxBuf, RxReadStart, TxBuf, TxBufSet, TxError};
use embedded_hal::{
    blocking::{can::Can as BlockingCan, delay::DelayUs, spi::Transfer},
    can::{nb::Can as NbCan, ExtendedId, Id, StandardId},
    digital::v2::OutputPin,
    spi::{Mode, MODE_0},
};
use filter::{RxFilter, RxMask};
use frame::{CanFrame, BLOCK_LEN};
use log::{debug, trace};
use regs::{OpMode, Register};
use stat::{RxStatus, Status};
use timing::{BitTiming, CanSpeed, McpSpeed};

use crate::{
    error::{Error, Result},
    regs::{
        CanCtrl, CanInte, CanIntf, CanStat, Cnf3, Eflg, RecvBufOpMode, RxbCtrl, Rxb0Ctrl, TxBufPriority,
        TxbCtrl,
    },
};

#[repr(u8)]
enum Instruction {
    Write = 0x02,
    Read = 0x03,
    Bitmod = 0x05,
    ReadStatus = 0xA0,
    RxStatus = 0xB0,
    Reset = 0xC0,
}

/// SPI mode required by the MCP2515: clock idle low, data sampled on the
/// leading edge, MSB first.
pub const SPI_MODE: Mode = MODE_0;

/// Number of `CANSTAT` reads after a mode request before giving up.
pub const DEFAULT_MODE_POLL_LIMIT: u16 = 100;

/// Bring-up parameters for [`MCP2515::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    /// Mode entered once bring-up is done.
    pub mode: OpMode,
    /// Bus bit rate.
    pub can_speed: CanSpeed,
    /// Crystal on the MCP2515 board; picks the bit timing table.
    pub mcp_speed: McpSpeed,
    /// Drive the system clock out on the `CLKOUT` pin.
    pub clkout_en: bool,
    /// Upper bound on `CANSTAT` polls while waiting for a mode change.
    pub mode_poll_limit: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: OpMode::Normal,
            can_speed: CanSpeed::Kbps100,
            mcp_speed: McpSpeed::MHz16,
            clkout_en: false,
            mode_poll_limit: DEFAULT_MODE_POLL_LIMIT,
        }
    }
}

/// MCP2515 driver.
pub struct MCP2515<SPI, CS> {
    spi: SPI,
    /// Active low chip-select.
    cs: CS,
    /// Crystal frequency, selects the bit timing table.
    mcp_speed: McpSpeed,
    /// Bound on the mode change wait.
    mode_poll_limit: u16,
}

impl<SPI, CS, SPIE, CSE> MCP2515<SPI, CS>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    /// Wraps an SPI bus and chip-select pin. Nothing is sent to the chip until
    /// [`init`] or another method is called.
    ///
    /// # SPI setup
    ///
    /// The bus is configured by the caller before it is handed over:
    ///
    /// * [`SPI_MODE`] (mode 0), most significant bit first.
    /// * A clock no faster than 10 MHz. Half the crystal frequency is a safe
    ///   choice on the usual 8 MHz and 16 MHz boards.
    ///
    /// [`init`]: MCP2515::init
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self {
            spi,
            cs,
            mcp_speed: McpSpeed::MHz16,
            mode_poll_limit: DEFAULT_MODE_POLL_LIMIT,
        }
    }

    /// Releases the SPI interface and chip-select pin.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Full bring-up: software reset, bit timing, `CLKOUT`, cleared buffers,
    /// interrupt enables, filtered reception with rollover, open filters and
    /// masks, then `settings.mode`.
    ///
    /// `delay` covers the oscillator start-up after reset.
    pub fn init(
        &mut self,
        delay: &mut impl DelayUs<u16>,
        settings: Settings,
    ) -> Result<(), SPIE, CSE> {
        self.mode_poll_limit = settings.mode_poll_limit;
        self.cs.set_high().map_err(Error::Hal)?;
        self.reset(delay)?;

        // Bit timing and CLKOUT can only change in configuration mode.
        self.set_mode(OpMode::Configuration)?;
        self.set_bitrate(settings.can_speed, settings.mcp_speed, settings.clkout_en)?;
        self.set_clken(settings.clkout_en)?;

        // TXBnCTRL through TXBnD7
        let zeros = [0u8; 14];
        for buf in TxBuf::ALL {
            self.write_registers(buf.ctrl(), &zeros)?;
        }

        for buf in RxBuf::ALL {
            self.write_registers(buf.ctrl(), &[0])?;
        }

        // Receive, error and message error interrupts.
        self.write_register(
            CanInte::new()
                .with_rx0ie(true)
                .with_rx1ie(true)
                .with_errie(true)
                .with_merre(true),
        )?;

        // Filtered reception on both buffers, RXB0 rolls over into RXB1.
        self.modify_register(
            Rxb0Ctrl::new().with_rxm(RecvBufOpMode::FilterOn).with_bukt(true),
            Rxb0Ctrl::MASK_RXM | Rxb0Ctrl::MASK_BUKT,
        )?;
        self.set_rx_mode(RxBuf::B1, RecvBufOpMode::FilterOn)?;

        // RXF1 matches extended frames, the other filters standard frames.
        for filt in RxFilter::ALL {
            let id = if filt == RxFilter::F1 {
                Id::Extended(ExtendedId::ZERO)
            } else {
                Id::Standard(StandardId::ZERO)
            };
            self.write_filter(filt, id)?;
        }

        // Zero masks accept every identifier.
        for mask in RxMask::ALL {
            self.write_mask(mask, Id::Extended(ExtendedId::ZERO))?;
        }

        self.set_mode(settings.mode)
    }

    /// Brings the controller on the bus at `kbps`, keeping the rest of the
    /// register state.
    ///
    /// Waits briefly for the oscillator, then programs the bit timing through
    /// [`configure_bit_timing`](MCP2515::configure_bit_timing). Leaves the chip
    /// in normal mode.
    pub fn begin(&mut self, delay: &mut impl DelayUs<u16>, kbps: u16) -> Result<(), SPIE, CSE> {
        delay.delay_us(5);
        self.configure_bit_timing(kbps)
    }

    /// Programs the bit timing preset for `kbps` at the configured crystal
    /// frequency, falling back to 125 kbps for unsupported rates.
    ///
    /// Switches to configuration mode for the write and back to normal mode
    /// afterwards, whatever mode the chip was in before.
    pub fn configure_bit_timing(&mut self, kbps: u16) -> Result<(), SPIE, CSE> {
        let timing = BitTiming::select(self.mcp_speed, kbps);
        self.set_mode(OpMode::Configuration)?;
        self.set_bit_timing(timing)?;
        self.set_mode(OpMode::Normal)
    }

    /// Programs the preset for `can_speed` at `mcp_speed` and remembers the
    /// crystal frequency. With `clkout_en` the `SOF` bit is cleared so `CLKOUT`
    /// carries the clock. The chip must already be in configuration mode.
    pub fn set_bitrate(
        &mut self,
        can_speed: CanSpeed,
        mcp_speed: McpSpeed,
        clkout_en: bool,
    ) -> Result<(), SPIE, CSE> {
        self.mcp_speed = mcp_speed;
        let mut timing = BitTiming::for_speed_or_default(mcp_speed, can_speed);
        if clkout_en {
            timing.cnf3 = Cnf3::from_bytes([timing.cnf3]).with_sof(false).into_bytes()[0];
        }
        self.set_bit_timing(timing)
    }

    /// Writes `CNF3`, `CNF2` and `CNF1` in one sequential write. The chip must
    /// already be in configuration mode.
    pub fn set_bit_timing(&mut self, timing: BitTiming) -> Result<(), SPIE, CSE> {
        self.write_registers(Register::CNF3, &[timing.cnf3, timing.cnf2, timing.cnf1])
    }

    /// Sets the crystal frequency used by
    /// [`configure_bit_timing`](MCP2515::configure_bit_timing).
    pub fn set_mcp_speed(&mut self, mcp_speed: McpSpeed) {
        self.mcp_speed = mcp_speed;
    }

    /// Sets how many `CANSTAT` polls a mode change may take.
    pub fn set_mode_poll_limit(&mut self, limit: u16) {
        self.mode_poll_limit = limit;
    }

    /// Reads the current operation mode from `CANSTAT`.
    pub fn get_mode(&mut self) -> Result<OpMode, SPIE, CSE> {
        let canstat: CanStat = self.read_register()?;
        canstat
            .opmod_or_err()
            .map_err(|_| Error::InvalidOpMode(canstat.into_bytes()[0] >> 5))
    }

    /// Requests an operating mode and waits until `CANSTAT` reports it, or
    /// fails with [`Error::NewModeTimeout`] after the configured number of
    /// polls.
    ///
    /// A sleeping chip is woken through the wake-up interrupt first and passes
    /// through listen-only mode.
    pub fn set_mode(&mut self, mode: OpMode) -> Result<(), SPIE, CSE> {
        let status: CanStat = self.read_register()?;

        if status.opmod_or_err().ok() == Some(OpMode::Sleep) && mode != OpMode::Sleep {
            // WAKIF only wakes the chip while WAKIE is set
            let caninte: CanInte = self.read_register()?;
            let int_enabled = caninte.wakie();
            if !int_enabled {
                let data = CanInte::new().with_wakie(true);
                self.modify_register(data, data)?;
            }

            let data = CanIntf::new().with_wakif(true);
            self.modify_register(data, CanIntf::MASK_WAKIF)?;

            // The chip wakes into listen-only mode
            self.set_mode_no_wake(OpMode::ListenOnly)?;

            if !int_enabled {
                self.modify_register(CanInte::new().with_wakie(false), CanInte::MASK_WAKIE)?;
            }
        }

        self.modify_register(CanIntf::new().with_wakif(false), CanIntf::MASK_WAKIF)?;
        self.set_mode_no_wake(mode)
    }

    /// Writes `REQOP` and polls `CANSTAT`. Does not handle a sleeping chip.
    fn set_mode_no_wake(&mut self, mode: OpMode) -> Result<(), SPIE, CSE> {
        self.modify_register(CanCtrl::new().with_reqop(mode), CanCtrl::MASK_REQOP)?;

        for _ in 0..self.mode_poll_limit {
            let canstat: CanStat = self.read_register()?;
            if matches!(canstat.opmod_or_err(), Ok(current) if current == mode) {
                debug!("Entered {:?} mode", mode);
                return Ok(());
            }
        }

        debug!(
            "Device did not enter {:?} mode within {} polls",
            mode, self.mode_poll_limit
        );
        Err(Error::NewModeTimeout(mode))
    }

    fn set_clken(&mut self, clken: bool) -> Result<(), SPIE, CSE> {
        self.modify_register(CanCtrl::new().with_clken(clken), CanCtrl::MASK_CLKEN)
    }

    /// Reads the transmit error counter.
    pub fn tec(&mut self) -> Result<u8, SPIE, CSE> {
        self.read_byte(Register::TEC)
    }

    /// Reads the receive error counter.
    pub fn rec(&mut self) -> Result<u8, SPIE, CSE> {
        self.read_byte(Register::REC)
    }

    /// Reads the error flag register.
    pub fn error_flags(&mut self) -> Result<Eflg, SPIE, CSE> {
        self.read_register()
    }

    /// Clears the latched message error flag (`MERRF`).
    pub fn clear_message_error(&mut self) -> Result<(), SPIE, CSE> {
        self.modify_register(CanIntf::new(), CanIntf::MASK_MERRF)
    }

    /// Returns `true` if the Tx buffer has no pending transmission.
    pub fn is_tx_buffer_free(&mut self, buf: TxBuf) -> Result<bool, SPIE, CSE> {
        Ok(!self.read_txb_ctrl(buf)?.txreq())
    }

    /// Fails with [`Error::TxBusy`] if the buffer has a pending transmission.
    fn ensure_tx_free(&mut self, buf: TxBuf) -> Result<(), SPIE, CSE> {
        if self.is_tx_buffer_free(buf)? {
            Ok(())
        } else {
            trace!("{:?} busy", buf);
            Err(Error::TxBusy)
        }
    }

    /// Sets the transmit priority of a Tx buffer.
    pub fn set_tx_priority(&mut self, buf: TxBuf, priority: TxBufPriority) -> Result<(), SPIE, CSE> {
        self.ensure_tx_free(buf)?;
        self.modify_register_addr(
            buf.ctrl(),
            TxbCtrl::MASK_TXP.into_bytes()[0],
            TxbCtrl::new().with_txp(priority).into_bytes()[0],
        )
    }

    /// Loads a standard identifier into a Tx buffer, clearing `EXIDE`.
    pub fn set_tx_standard_id(&mut self, buf: TxBuf, id: StandardId) -> Result<(), SPIE, CSE> {
        self.ensure_tx_free(buf)?;
        self.write_registers(buf.sidh(), &IdentRegs::from_id(Id::Standard(id)).into_bytes())
    }

    /// Loads an extended identifier into a Tx buffer, setting `EXIDE`.
    pub fn set_tx_extended_id(&mut self, buf: TxBuf, id: ExtendedId) -> Result<(), SPIE, CSE> {
        self.ensure_tx_free(buf)?;
        self.write_registers(buf.sidh(), &IdentRegs::from_id(Id::Extended(id)).into_bytes())
    }

    /// Sends `data` from a Tx buffer using the identifier already loaded into
    /// it.
    pub fn transmit(&mut self, buf: TxBuf, data: &[u8]) -> Result<(), SPIE, CSE> {
        if data.len() > 8 {
            return Err(Error::InvalidDataLength(data.len()));
        }
        self.ensure_tx_free(buf)?;

        let mut block = [0u8; 9];
        block[0] = data.len() as u8;
        block[1..=data.len()].copy_from_slice(data);
        self.write_registers(buf.dlc(), &block[..=data.len()])?;
        self.request_to_send(buf.into())
    }

    /// Loads a complete frame (identifier, length, payload) into a Tx buffer and
    /// sends it.
    pub fn transmit_with_id(&mut self, buf: TxBuf, frame: &CanFrame) -> Result<(), SPIE, CSE> {
        self.ensure_tx_free(buf)?;
        self.load_and_send(buf, frame)
    }

    /// Sends a remote frame from a Tx buffer. No payload bytes are written.
    pub fn remote_transmit(&mut self, buf: TxBuf, id: impl Into<Id>) -> Result<(), SPIE, CSE> {
        let frame = CanFrame {
            id: id.into(),
            rtr: true,
            dlc: 0,
            data: [0; 8],
        };
        self.transmit_with_id(buf, &frame)
    }

    fn load_and_send(&mut self, buf: TxBuf, frame: &CanFrame) -> Result<(), SPIE, CSE> {
        let (block, len) = frame.to_tx_block();
        self.write_registers(buf.sidh(), &block[..len])?;
        trace!("Loaded {:?} with {:?}", buf, frame);
        self.request_to_send(buf.into())
    }

    /// Requests transmission of a set of Tx buffers with one `RTS` instruction.
    pub fn request_to_send(&mut self, bufs: TxBufSet) -> Result<(), SPIE, CSE> {
        if bufs.is_empty() {
            return Ok(());
        }
        self.transfer(&mut [bufs.rts_instruction()])?;
        Ok(())
    }

    /// Requests transmission of a Tx buffer by setting `TXREQ`.
    pub fn set_txreq(&mut self, buf: TxBuf) -> Result<(), SPIE, CSE> {
        self.modify_register_addr(
            buf.ctrl(),
            TxbCtrl::MASK_TXREQ.into_bytes()[0],
            TxbCtrl::new().with_txreq(true).into_bytes()[0],
        )
    }

    /// Aborts a pending transmission by clearing `TXREQ`. `ABAT` is left alone.
    pub fn abort_transmit(&mut self, buf: TxBuf) -> Result<(), SPIE, CSE> {
        self.modify_register_addr(buf.ctrl(), TxbCtrl::MASK_TXREQ.into_bytes()[0], 0)
    }

    /// Reports the error state latched for a Tx buffer.
    pub fn tx_error(&mut self, buf: TxBuf) -> Result<TxError, SPIE, CSE> {
        Ok(self.read_txb_ctrl(buf)?.into())
    }

    /// Loads `frame` into the first free Tx buffer and requests transmission.
    pub fn send_message(&mut self, frame: CanFrame) -> Result<(), SPIE, CSE> {
        let buf = self.find_free_tx_buf()?;
        self.load_and_send(buf, &frame)
    }

    /// First Tx buffer without a pending transmission, or [`Error::TxBusy`].
    pub fn find_free_tx_buf(&mut self) -> Result<TxBuf, SPIE, CSE> {
        for buffer in TxBuf::ALL {
            if self.is_tx_buffer_free(buffer)? {
                return Ok(buffer);
            }
        }
        Err(Error::TxBusy)
    }

    fn read_txb_ctrl(&mut self, buf: TxBuf) -> Result<TxbCtrl, SPIE, CSE> {
        Ok(TxbCtrl::from_bytes([self.read_byte(buf.ctrl())?]))
    }

    /// Returns `true` if the Rx buffer holds a message.
    pub fn is_rx_buffer_full(&mut self, buf: RxBuf) -> Result<bool, SPIE, CSE> {
        let status = self.rx_status()?;
        Ok(match buf {
            RxBuf::B0 => status.rx0(),
            RxBuf::B1 => status.rx1(),
        })
    }

    /// Marks an Rx buffer as read by clearing its `RXnIF` flag, making it
    /// available for the next message.
    pub fn enable_rx_buffer(&mut self, buf: RxBuf) -> Result<(), SPIE, CSE> {
        self.modify_register(CanIntf::new(), buf.intf_mask())
    }

    /// Sets the operating mode (`RXM`) of an Rx buffer.
    pub fn set_rx_mode(&mut self, buf: RxBuf, mode: RecvBufOpMode) -> Result<(), SPIE, CSE> {
        self.modify_register_addr(
            buf.ctrl(),
            RxbCtrl::MASK_RXM.into_bytes()[0],
            RxbCtrl::new().with_rxm(mode).into_bytes()[0],
        )
    }

    /// Applies the masks and filters to an Rx buffer.
    pub fn enable_rx_filter(&mut self, buf: RxBuf) -> Result<(), SPIE, CSE> {
        self.set_rx_mode(buf, RecvBufOpMode::FilterOn)
    }

    /// Lets an Rx buffer accept any message.
    pub fn disable_rx_filter(&mut self, buf: RxBuf) -> Result<(), SPIE, CSE> {
        self.set_rx_mode(buf, RecvBufOpMode::FilterOff)
    }

    /// Takes the message out of the first full Rx buffer. The buffer is
    /// released by the read itself. [`Error::NoMessage`] if both are empty.
    pub fn read_message(&mut self) -> Result<CanFrame, SPIE, CSE> {
        let status = self.read_status()?;
        let buf = if status.rx0if() {
            RxBuf::B0
        } else if status.rx1if() {
            RxBuf::B1
        } else {
            return Err(Error::NoMessage);
        };
        self.read_frame(buf)
    }

    /// Decodes the frame held by an Rx buffer.
    ///
    /// The remote flag comes from `RXBnCTRL`. The identifier is streamed with
    /// `READ RX BUFFER`; data frames continue with the length byte and all 8
    /// data registers, remote frames stop after the identifier. The chip
    /// clears `RXnIF` when chip-select rises after `READ RX BUFFER`, so no
    /// separate release follows. A message arriving after that point keeps
    /// its flag.
    pub fn read_frame(&mut self, buf: RxBuf) -> Result<CanFrame, SPIE, CSE> {
        let ctrl = RxbCtrl::from_bytes([self.read_byte(buf.ctrl())?]);
        let rtr = ctrl.rxrtr();

        let mut hdr = [buf.read_instruction(RxReadStart::Ident)];
        let mut ident = [0u8; 4];
        // DLC followed by D0..D7
        let mut tail = [0u8; 9];
        self.with_cs(|spi| -> core::result::Result<(), SPIE> {
            spi.transfer(&mut hdr)?;
            spi.transfer(&mut ident)?;
            if !rtr {
                spi.transfer(&mut tail)?;
            }
            Ok(())
        })?
        .map_err(Error::Spi)?;

        let mut data = [0u8; 8];
        data.copy_from_slice(&tail[1..]);
        let frame = CanFrame::from_rx_regs(
            rtr,
            IdentRegs::from_bytes(ident),
            buffer::Dlc::from_bytes([tail[0]]),
            data,
        );
        trace!("Read {:?} from {:?}", frame, buf);
        Ok(frame)
    }

    /// Reads the raw `SIDH`..`D7` block of an Rx buffer with one
    /// `READ RX BUFFER` instruction.
    pub fn read_rx_buffer_raw(&mut self, buf: RxBuf) -> Result<[u8; BLOCK_LEN], SPIE, CSE> {
        let mut hdr = [buf.read_instruction(RxReadStart::Ident)];
        let mut block = [0u8; BLOCK_LEN];
        self.with_cs(|spi| -> core::result::Result<(), SPIE> {
            spi.transfer(&mut hdr)?;
            spi.transfer(&mut block)?;
            Ok(())
        })?
        .map_err(Error::Spi)?;
        Ok(block)
    }

    /// Programs an acceptance filter. The identifier type selects whether it
    /// matches standard or extended frames.
    ///
    /// Switches to configuration mode for the write and back to **normal** mode
    /// afterwards, whatever mode the chip was in before.
    pub fn set_filter(&mut self, filter: RxFilter, id: Id) -> Result<(), SPIE, CSE> {
        self.set_mode(OpMode::Configuration)?;
        self.write_filter(filter, id)?;
        self.set_mode(OpMode::Normal)
    }

    /// Programs an acceptance mask. A standard identifier only covers the 11
    /// standard bits.
    ///
    /// Same mode round trip as [`set_filter`](MCP2515::set_filter).
    pub fn set_mask(&mut self, mask: RxMask, id: Id) -> Result<(), SPIE, CSE> {
        self.set_mode(OpMode::Configuration)?;
        self.write_mask(mask, id)?;
        self.set_mode(OpMode::Normal)
    }

    fn write_filter(&mut self, filter: RxFilter, id: Id) -> Result<(), SPIE, CSE> {
        self.write_registers(filter.sidh(), &RxFilter::regs(id).into_bytes())
    }

    fn write_mask(&mut self, mask: RxMask, id: Id) -> Result<(), SPIE, CSE> {
        self.write_registers(mask.sidh(), &RxMask::regs(id).into_bytes())
    }

    /// Reads back a receive filter.
    pub fn read_filter(&mut self, filter: RxFilter) -> Result<Id, SPIE, CSE> {
        let mut regs = [0u8; 4];
        self.read_registers(filter.sidh(), &mut regs)?;
        Ok(IdentRegs::from_bytes(regs).id())
    }

    /// Reads back a receive mask as a 29-bit value. Standard identifier bits
    /// occupy bits 28:18.
    pub fn read_mask(&mut self, mask: RxMask) -> Result<u32, SPIE, CSE> {
        let mut regs = [0u8; 4];
        self.read_registers(mask.sidh(), &mut regs)?;
        Ok(IdentRegs::from_bytes(regs).raw())
    }

    /// Resets the MCP2515. The chip comes back in configuration mode with
    /// default register values.
    pub fn reset(&mut self, delay: &mut impl DelayUs<u16>) -> Result<(), SPIE, CSE> {
        self.transfer(&mut [Instruction::Reset as u8])?;
        // Oscillator start-up, longer when coming out of sleep
        delay.delay_us(5_000);

        Ok(())
    }

    /// `READ STATUS`: receive flags and transmit state in one byte.
    pub fn read_status(&mut self) -> Result<Status, SPIE, CSE> {
        let mut data = [Instruction::ReadStatus as u8, 0];
        self.transfer(&mut data)
            .map(|b| [b])
            .map(Status::from_bytes)
    }

    /// `RX STATUS`: which Rx buffers are full and what the latest message is.
    pub fn rx_status(&mut self) -> Result<RxStatus, SPIE, CSE> {
        let mut data = [Instruction::RxStatus as u8, 0];
        self.transfer(&mut data)
            .map(|b| [b])
            .map(RxStatus::from_bytes)
    }

    /// Reads a typed register.
    #[inline]
    pub fn read_register<R: regs::Reg>(&mut self) -> Result<R, SPIE, CSE> {
        self.read_byte(R::ADDRESS).map(R::read)
    }

    /// Reads a single register.
    pub fn read_byte(&mut self, reg: Register) -> Result<u8, SPIE, CSE> {
        let mut data = [Instruction::Read as u8, reg as u8, 0];
        self.transfer(&mut data)
    }

    /// Fills `ret` from consecutive registers starting at `reg`, in one
    /// `READ` instruction.
    pub fn read_registers(&mut self, reg: Register, ret: &mut [u8]) -> Result<(), SPIE, CSE> {
        let mut hdr = [Instruction::Read as u8, reg as u8];
        self.with_cs(|spi| -> core::result::Result<(), SPIE> {
            spi.transfer(&mut hdr)?;
            // The MCP2515 ignores MOSI while reading, so `ret` is clocked out as is and
            // overwritten with the register contents.
            spi.transfer(ret)?;
            Ok(())
        })?
        .map_err(Error::Spi)
    }

    /// Writes a typed register.
    #[inline]
    pub fn write_register<R: regs::Reg>(&mut self, reg: R) -> Result<(), SPIE, CSE> {
        self.write_registers(R::ADDRESS, &[reg.write()])
    }

    /// Writes `data` to consecutive registers starting at `reg`, in one
    /// `WRITE` instruction.
    pub fn write_registers(&mut self, reg: Register, data: &[u8]) -> Result<(), SPIE, CSE> {
        let mut hdr = [Instruction::Write as u8, reg as u8];
        self.with_cs(|spi| -> core::result::Result<(), SPIE> {
            spi.transfer(&mut hdr)?;
            for d in data {
                let mut data = [*d];
                spi.transfer(&mut data)?;
            }
            Ok(())
        })?
        .map_err(Error::Spi)
    }

    /// `BIT MODIFY` on a typed register. Only the bits set in `mask` take the
    /// value from `reg`.
    #[inline]
    pub fn modify_register<R: regs::BitModifiable>(&mut self, reg: R, mask: R) -> Result<(), SPIE, CSE> {
        self.modify_register_addr(R::ADDRESS, mask.write(), reg.write())
    }

    /// Modifies the bits of `reg` selected by `mask`, leaving the others alone.
    pub fn modify_register_addr(&mut self, reg: Register, mask: u8, data: u8) -> Result<(), SPIE, CSE> {
        let mut data = [
            Instruction::Bitmod as u8, // BIT MODIFY
            reg as u8,                 // Register address
            mask,                      // Modify mask byte
            data,                      // Data byte
        ];
        self.transfer(&mut data)?;
        Ok(())
    }

    /// One chip-select session exchanging `bytes` in place. Returns the last
    /// byte clocked in, or 0 for an empty exchange.
    fn transfer(&mut self, bytes: &mut [u8]) -> Result<u8, SPIE, CSE> {
        self.with_cs(|spi| spi.transfer(bytes).map(|_| ()))?
            .map_err(Error::Spi)?;
        Ok(bytes.last().copied().unwrap_or(0))
    }

    /// Runs `f` with the chip selected. CS is raised again even when `f`
    /// reports an SPI error.
    fn with_cs<T>(&mut self, f: impl FnOnce(&mut SPI) -> T) -> Result<T, SPIE, CSE> {
        self.cs.set_low().map_err(Error::Hal)?;
        let result = f(&mut self.spi);
        self.cs.set_high().map_err(Error::Hal)?;
        Ok(result)
    }
}

impl<SPI, CS, SPIE, CSE> NbCan for MCP2515<SPI, CS>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    type Frame = CanFrame;
    type Error = Error<SPIE, CSE>;

    /// Queues a frame in any free Tx buffer, or `WouldBlock` if all three are
    /// pending.
    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        match self.send_message(*frame) {
            Ok(()) => Ok(None),
            Err(Error::TxBusy) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        match self.read_message() {
            Ok(frame) => Ok(frame),
            Err(Error::NoMessage) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    }
}

impl<SPI, CS, SPIE, CSE> BlockingCan for MCP2515<SPI, CS>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    type Frame = CanFrame;
    type Error = Error<SPIE, CSE>;

    #[inline]
    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), SPIE, CSE> {
        nb::block!(NbCan::transmit(self, frame)).map(|_| ())
    }

    #[inline]
    fn receive(&mut self) -> Result<Self::Frame, SPIE, CSE> {
        nb::block!(NbCan::receive(self))
    }
}
