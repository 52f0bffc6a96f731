//! Bit timing (`CNF1`, `CNF2`, `CNF3`) presets.

use log::warn;

/// Speed the CAN bus is operating at.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum CanSpeed {
    Kbps5,
    Kbps10,
    Kbps20,
    Kbps25,
    Kbps31_25,
    Kbps33_3,
    Kbps40,
    Kbps50,
    Kbps80,
    Kbps83_3,
    Kbps95,
    Kbps100,
    Kbps125,
    Kbps200,
    Kbps250,
    Kbps500,
    Kbps666,
    Kbps1000,
}

impl CanSpeed {
    /// Maps a whole-kbps data rate onto a preset, if one exists.
    pub fn from_kbps(kbps: u16) -> Option<Self> {
        let speed = match kbps {
            5 => CanSpeed::Kbps5,
            10 => CanSpeed::Kbps10,
            20 => CanSpeed::Kbps20,
            25 => CanSpeed::Kbps25,
            40 => CanSpeed::Kbps40,
            50 => CanSpeed::Kbps50,
            80 => CanSpeed::Kbps80,
            95 => CanSpeed::Kbps95,
            100 => CanSpeed::Kbps100,
            125 => CanSpeed::Kbps125,
            200 => CanSpeed::Kbps200,
            250 => CanSpeed::Kbps250,
            500 => CanSpeed::Kbps500,
            666 => CanSpeed::Kbps666,
            1000 => CanSpeed::Kbps1000,
            _ => return None,
        };
        Some(speed)
    }
}

/// Speed the MCP2515 is operating at. Should match the crystal frequency
/// onboard.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum McpSpeed {
    MHz8,
    MHz16,
}

/// Content of the three bit timing configuration registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    pub cnf1: u8,
    pub cnf2: u8,
    pub cnf3: u8,
}

impl BitTiming {
    pub const fn new(cnf1: u8, cnf2: u8, cnf3: u8) -> Self {
        Self { cnf1, cnf2, cnf3 }
    }

    /// Looks up the preset for a crystal/bus speed pair.
    pub fn for_speed(mcp_speed: McpSpeed, can_speed: CanSpeed) -> Option<Self> {
        let (cnf1, cnf2, cnf3) = match (mcp_speed, can_speed) {
            (McpSpeed::MHz8, CanSpeed::Kbps5) => (0x1F, 0xBF, 0x07),
            (McpSpeed::MHz8, CanSpeed::Kbps10) => (0x0F, 0xBF, 0x07),
            (McpSpeed::MHz8, CanSpeed::Kbps20) => (0x07, 0xBF, 0x07),
            (McpSpeed::MHz8, CanSpeed::Kbps31_25) => (0x07, 0xA4, 0x04),
            (McpSpeed::MHz8, CanSpeed::Kbps40) => (0x03, 0xBF, 0x07),
            (McpSpeed::MHz8, CanSpeed::Kbps50) => (0x03, 0xB4, 0x06),
            (McpSpeed::MHz8, CanSpeed::Kbps80) => (0x01, 0xBF, 0x07),
            (McpSpeed::MHz8, CanSpeed::Kbps100) => (0x01, 0xB4, 0x06),
            (McpSpeed::MHz8, CanSpeed::Kbps125) => (0x01, 0xB1, 0x05),
            (McpSpeed::MHz8, CanSpeed::Kbps200) => (0x00, 0xB4, 0x06),
            (McpSpeed::MHz8, CanSpeed::Kbps250) => (0x00, 0xB1, 0x05),
            (McpSpeed::MHz8, CanSpeed::Kbps500) => (0x00, 0x90, 0x02),
            (McpSpeed::MHz8, CanSpeed::Kbps1000) => (0x00, 0x80, 0x00),
            (McpSpeed::MHz16, CanSpeed::Kbps5) => (0x3F, 0xFF, 0x87),
            (McpSpeed::MHz16, CanSpeed::Kbps10) => (0x1F, 0xFF, 0x87),
            (McpSpeed::MHz16, CanSpeed::Kbps20) => (0x0F, 0xFF, 0x87),
            (McpSpeed::MHz16, CanSpeed::Kbps25) => (0x0F, 0xBA, 0x07),
            (McpSpeed::MHz16, CanSpeed::Kbps31_25) => (0x0F, 0xF1, 0x85),
            (McpSpeed::MHz16, CanSpeed::Kbps33_3) => (0x09, 0xBE, 0x07),
            (McpSpeed::MHz16, CanSpeed::Kbps40) => (0x07, 0xFF, 0x87),
            (McpSpeed::MHz16, CanSpeed::Kbps50) => (0x07, 0xFA, 0x87),
            (McpSpeed::MHz16, CanSpeed::Kbps80) => (0x03, 0xFF, 0x87),
            (McpSpeed::MHz16, CanSpeed::Kbps83_3) => (0x03, 0xBE, 0x07),
            (McpSpeed::MHz16, CanSpeed::Kbps95) => (0x03, 0xAD, 0x07),
            (McpSpeed::MHz16, CanSpeed::Kbps100) => (0x03, 0xFA, 0x87),
            (McpSpeed::MHz16, CanSpeed::Kbps125) => (0x03, 0xF0, 0x86),
            (McpSpeed::MHz16, CanSpeed::Kbps200) => (0x01, 0xFA, 0x87),
            (McpSpeed::MHz16, CanSpeed::Kbps250) => (0x41, 0xF1, 0x85),
            (McpSpeed::MHz16, CanSpeed::Kbps500) => (0x00, 0xF0, 0x86),
            (McpSpeed::MHz16, CanSpeed::Kbps666) => (0x00, 0xA0, 0x04),
            (McpSpeed::MHz16, CanSpeed::Kbps1000) => (0x00, 0xD0, 0x82),
            _ => return None,
        };
        Some(Self::new(cnf1, cnf2, cnf3))
    }

    /// Preset for `can_speed`, falling back to the 125 kbps preset of the same
    /// crystal when the pair is unsupported.
    pub fn for_speed_or_default(mcp_speed: McpSpeed, can_speed: CanSpeed) -> Self {
        Self::for_speed(mcp_speed, can_speed).unwrap_or_else(|| {
            warn!(
                "No bit timing for {:?} at {:?}, falling back to 125 kbps",
                can_speed, mcp_speed
            );
            Self::fallback(mcp_speed)
        })
    }

    /// Preset for a data rate given in kbps, with the same 125 kbps fallback.
    pub fn select(mcp_speed: McpSpeed, kbps: u16) -> Self {
        match CanSpeed::from_kbps(kbps) {
            Some(can_speed) => Self::for_speed_or_default(mcp_speed, can_speed),
            None => {
                warn!("Unsupported data rate {} kbps, falling back to 125 kbps", kbps);
                Self::fallback(mcp_speed)
            }
        }
    }

    fn fallback(mcp_speed: McpSpeed) -> Self {
        match mcp_speed {
            McpSpeed::MHz8 => Self::new(0x01, 0xB1, 0x05),
            McpSpeed::MHz16 => Self::new(0x03, 0xF0, 0x86),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_500k_at_8mhz() {
        assert_eq!(BitTiming::select(McpSpeed::MHz8, 500), BitTiming::new(0x00, 0x90, 0x02));
    }

    #[test]
    fn unknown_rate_falls_back_to_125k() {
        assert_eq!(BitTiming::select(McpSpeed::MHz8, 42), BitTiming::new(0x01, 0xB1, 0x05));
        assert_eq!(BitTiming::select(McpSpeed::MHz16, 42), BitTiming::new(0x03, 0xF0, 0x86));
    }

    #[test]
    fn rate_missing_for_crystal_falls_back_to_125k() {
        assert_eq!(BitTiming::for_speed(McpSpeed::MHz8, CanSpeed::Kbps666), None);
        assert_eq!(
            BitTiming::select(McpSpeed::MHz8, 666),
            BitTiming::for_speed(McpSpeed::MHz8, CanSpeed::Kbps125).unwrap()
        );
    }

    #[test]
    fn fallback_matches_table() {
        for mcp_speed in [McpSpeed::MHz8, McpSpeed::MHz16] {
            assert_eq!(
                Some(BitTiming::fallback(mcp_speed)),
                BitTiming::for_speed(mcp_speed, CanSpeed::Kbps125)
            );
        }
    }
}
