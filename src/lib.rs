//! Driver core for a LoRa + UWB ranging tag
//!
//! This crate contains the two protocol engines of a battery-powered tag
//! node: a driver for the RFM95 (SX1276-based) LoRa transceiver, and a
//! client for the TLV interface of the DWM1001 UWB positioning module.
//!
//! The RFM95 driver is split into a [register-level interface] and a
//! [high-level interface]. The high-level interface is the recommended way
//! to use the radio: it owns the operating-mode state machine, the packet
//! framing and addressing rules, and the completion handling that the
//! register-level interface knows nothing about.
//!
//! The [ranging] module talks to the DWM1001 on its own SPI bus and decodes
//! the module's location responses into typed position and anchor-distance
//! records.
//!
//! Pin setup, interrupt wiring and the application's main loop are the
//! platform's business; see the module documentation of [hl] for how the
//! driver expects to be called from an interrupt handler or a polling loop.
//!
//! [register-level interface]: ll/index.html
//! [high-level interface]: hl/index.html
//! [ranging]: ranging/index.html

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod configs;
pub mod hl;
pub mod ll;
pub mod ranging;

pub use crate::configs::*;
pub use crate::hl::*;
