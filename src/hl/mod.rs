//! High-level interface to the RFM95
//!
//! The entry point to this API is the [Rf95] struct, built from an
//! [UninitializedRf95] by calling [`init`]. This module implements the
//! driver's operating-mode state machine, packet framing and addressing,
//! link configuration, and completion handling on top of the
//! [register-level interface].
//!
//! # Frames
//!
//! Every on-air payload starts with a four-byte header: destination
//! address, source address, message id, user flags. `0xff` is the broadcast
//! address. Incoming frames are accepted when they are addressed to this
//! node or to the broadcast address, or unconditionally in promiscuous
//! mode; everything else is dropped silently.
//!
//! # Concurrency
//!
//! The driver is a single owned value; every method takes `&mut self`, so
//! the borrow checker rules out overlapping bus transactions. Hardware
//! completion is delivered through [`Rf95::handle_interrupt`]: call it from
//! the handler of the radio's interrupt line (sharing the driver through a
//! critical-section mutex), or poll it from the main loop. The bounded wait
//! helpers poll the completion state themselves, so they work in either
//! setup.
//!
//! [`init`]: struct.UninitializedRf95.html#method.init
//! [register-level interface]: ../ll/index.html

use core::fmt;

use crate::ll;

pub use error::*;
pub use link::*;
pub use uninitialized::*;

mod error;
mod interrupt;
mod link;
mod modes;
mod receive;
mod transmit;
mod uninitialized;

/// Size of the on-chip FIFO in bytes
pub const FIFO_SIZE: usize = 255;

/// Largest on-air payload, frame header included
pub const MAX_PAYLOAD_LEN: usize = FIFO_SIZE;

/// Length of the To/From/Id/Flags frame header
pub const HEADER_LEN: usize = 4;

/// Largest user payload `send` accepts
pub const MAX_MESSAGE_LEN: usize = MAX_PAYLOAD_LEN - HEADER_LEN;

/// Frames addressed here are accepted by every node
pub const BROADCAST_ADDRESS: u8 = 0xff;

// Sleep granularity of the bounded wait helpers.
pub(crate) const POLL_INTERVAL_MS: u16 = 200;

/// What the driver believes the radio is doing
///
/// Mode transitions happen in the `enter_*` methods and in
/// [`Rf95::handle_interrupt`]; both are no-ops when the requested mode
/// already holds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioMode {
    /// Constructed but not configured yet
    Initialising,
    /// Lowest power mode
    Sleep,
    /// Standby; neither transmitting nor listening
    Idle,
    /// A transmission is in flight
    Tx,
    /// Listening for packets
    Rx,
    /// Channel activity detection in progress
    Cad,
}

/// The four header bytes carried in front of every payload
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameHeader {
    /// Destination node address
    pub to: u8,
    /// Source node address
    pub from: u8,
    /// Message id, chosen by the sender
    pub id: u8,
    /// User-defined flags
    pub flags: u8,
}

/// Monotonic counters of link activity
///
/// The counters only ever increase; they are reset at construction and
/// never again.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStatistics {
    /// Frames transmitted to completion
    pub tx_good: u32,
    /// Frames received and accepted
    pub rx_good: u32,
    /// Frames received with a failed payload CRC
    pub rx_bad: u32,
}

/// Result of a bounded wait
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOutcome {
    /// The awaited condition holds
    Completed,
    /// The caller's timeout budget ran out first
    TimedOut,
}

/// Entry point to the RFM95 driver API
pub struct Rf95<SPI, CS> {
    pub(crate) ll: ll::Rf95<SPI, CS>,
    pub(crate) mode: RadioMode,
    pub(crate) this_address: u8,
    pub(crate) promiscuous: bool,
    pub(crate) tx_header: FrameHeader,
    pub(crate) rx_header: FrameHeader,
    pub(crate) rx_buf: [u8; MAX_PAYLOAD_LEN],
    pub(crate) rx_len: u8,
    pub(crate) rx_valid: bool,
    pub(crate) stats: LinkStatistics,
    pub(crate) cad_detected: bool,
    pub(crate) hf_port: bool,
    pub(crate) last_snr: i8,
    pub(crate) last_rssi: i16,
}

impl<SPI, CS> Rf95<SPI, CS> {
    /// Returns the driver's current operating mode
    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    /// Returns the link activity counters
    pub fn statistics(&self) -> LinkStatistics {
        self.stats
    }

    /// Sets the address of this node
    ///
    /// Configured once at startup; incoming frames are filtered against it.
    pub fn set_this_address(&mut self, address: u8) {
        self.this_address = address;
    }

    /// Accept frames regardless of their destination address
    pub fn set_promiscuous(&mut self, promiscuous: bool) {
        self.promiscuous = promiscuous;
    }

    /// Sets the destination address of outgoing frames
    pub fn set_header_to(&mut self, to: u8) {
        self.tx_header.to = to;
    }

    /// Sets the source address carried in outgoing frames
    pub fn set_header_from(&mut self, from: u8) {
        self.tx_header.from = from;
    }

    /// Sets the message id carried in outgoing frames
    pub fn set_header_id(&mut self, id: u8) {
        self.tx_header.id = id;
    }

    /// Sets the user flags carried in outgoing frames
    pub fn set_header_flags(&mut self, flags: u8) {
        self.tx_header.flags = flags;
    }

    /// Whether the last channel activity detection saw activity
    pub fn cad_detected(&self) -> bool {
        self.cad_detected
    }

    /// Provides direct access to the register-level API
    ///
    /// Be aware that by using the register-level API, you can invalidate
    /// various assumptions that the high-level API makes about the operation
    /// of the RFM95. Don't use the register-level and high-level APIs in
    /// tandem, unless you know what you're doing.
    pub fn ll(&mut self) -> &mut ll::Rf95<SPI, CS> {
        &mut self.ll
    }
}

// Can't be derived without putting requirements on `SPI` and `CS`.
impl<SPI, CS> fmt::Debug for Rf95<SPI, CS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Rf95 {{ mode: ")?;
        self.mode.fmt(f)?;
        write!(f, ", .. }}")?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    use embedded_hal_mock::pin::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use embedded_hal_mock::spi::Mock as SpiMock;

    /// One chip-select assert/release pair per bus transaction.
    pub(crate) fn cs_cycles(count: usize) -> Vec<PinTransaction> {
        let mut transactions = Vec::new();
        for _ in 0..count {
            transactions.push(PinTransaction::set(PinState::Low));
            transactions.push(PinTransaction::set(PinState::High));
        }
        transactions
    }

    /// A driver in the given mode, with the state `init` leaves behind.
    pub(crate) fn rf95(spi: SpiMock, cs: PinMock, mode: RadioMode) -> Rf95<SpiMock, PinMock> {
        Rf95 {
            ll: ll::Rf95::new(spi, cs),
            mode,
            this_address: BROADCAST_ADDRESS,
            promiscuous: false,
            tx_header: FrameHeader {
                to: BROADCAST_ADDRESS,
                from: BROADCAST_ADDRESS,
                id: 0,
                flags: 0,
            },
            rx_header: FrameHeader::default(),
            rx_buf: [0; MAX_PAYLOAD_LEN],
            rx_len: 0,
            rx_valid: false,
            stats: LinkStatistics::default(),
            cad_detected: false,
            hf_port: true,
            last_snr: 0,
            last_rssi: 0,
        }
    }
}
