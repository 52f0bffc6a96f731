use modular_bitfield::prelude::*;

/// Result of the `READ STATUS` instruction.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    #[skip(setters)]
    pub rx0if: bool,
    #[skip(setters)]
    pub rx1if: bool,
    #[skip(setters)]
    pub tx0req: bool,
    #[skip(setters)]
    pub tx0if: bool,
    #[skip(setters)]
    pub tx1req: bool,
    #[skip(setters)]
    pub tx1if: bool,
    #[skip(setters)]
    pub tx2req: bool,
    #[skip(setters)]
    pub tx2if: bool,
}

/// Result of the `RX STATUS` instruction.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStatus {
    /// Index of the filter that accepted the message (6 and 7 are the RXF0
    /// and RXF1 rollover hits into RXB1).
    #[skip(setters)]
    pub filter: B3,
    /// Message is a remote frame.
    #[skip(setters)]
    pub rtr: bool,
    /// Message has an extended identifier.
    #[skip(setters)]
    pub extended: bool,
    #[skip]
    __: B1,
    /// Message waiting in RXB0.
    #[skip(setters)]
    pub rx0: bool,
    /// Message waiting in RXB1.
    #[skip(setters)]
    pub rx1: bool,
}
