//! Configuration values for the radio
//!
//! This module houses the value types that the high-level interface programs
//! into the transceiver: operating-mode codes, DIO event routing, and the
//! canned modem settings.

use core::convert::TryFrom;

use num_enum::TryFromPrimitive;

/// Transceiver operating modes
///
/// These are the codes of the `mode` field of the OpMode register. The
/// driver's own notion of what the radio is doing is [`RadioMode`]; the two
/// differ, for example, while a received frame waits to be consumed.
///
/// [`RadioMode`]: ../hl/enum.RadioMode.html
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OperatingMode {
    /// Lowest power mode; configuration is retained
    Sleep = 0x00,
    /// Oscillator and baseband running, no RF activity
    Standby = 0x01,
    /// Frequency synthesis for transmission
    FsTx = 0x02,
    /// Transmitting a packet
    Tx = 0x03,
    /// Frequency synthesis for reception
    FsRx = 0x04,
    /// Continuously listening for packets
    RxContinuous = 0x05,
    /// Listening for a single packet
    RxSingle = 0x06,
    /// Channel activity detection
    Cad = 0x07,
}

impl OperatingMode {
    /// Decodes the mode field of the OpMode register
    pub fn from_bits(bits: u8) -> Option<OperatingMode> {
        OperatingMode::try_from(bits).ok()
    }
}

/// Events that can be routed to the DIO0 interrupt line
///
/// Codes for the `dio0` field of the DioMapping1 register. The driver routes
/// the completion event of the current operation to DIO0, so one interrupt
/// line covers transmit, receive and channel activity detection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Dio0Mapping {
    /// Raise DIO0 when a packet has been received
    RxDone = 0b00,
    /// Raise DIO0 when a transmission has finished
    TxDone = 0b01,
    /// Raise DIO0 when channel activity detection has finished
    CadDone = 0b10,
}

/// Raw values for the three modem configuration registers
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModemConfig {
    /// ModemConfig1: bandwidth, coding rate, header mode
    pub config1: u8,
    /// ModemConfig2: spreading factor, CRC enable
    pub config2: u8,
    /// ModemConfig3: low data rate optimize, AGC
    pub config3: u8,
}

/// Canned modem settings
///
/// Bandwidth / coding rate / spreading factor combinations that cover the
/// usual range-versus-rate trade-offs. Both ends of a link have to use the
/// same choice. All presets enable the payload CRC.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemConfigChoice {
    /// 125 kHz, 4/5, SF 7; the default, a medium-range compromise
    Bw125Cr45Sf128,
    /// 500 kHz, 4/5, SF 7; fast, short range
    Bw500Cr45Sf128,
    /// 31.25 kHz, 4/8, SF 9; slow, long range
    Bw31_25Cr48Sf512,
    /// 125 kHz, 4/8, SF 12; slow, long range
    Bw125Cr48Sf4096,
    /// 125 kHz, 4/5, SF 11; slow, long range
    Bw125Cr45Sf2048,
}

impl ModemConfigChoice {
    /// Returns the register values of this preset
    pub fn registers(self) -> ModemConfig {
        match self {
            ModemConfigChoice::Bw125Cr45Sf128 => ModemConfig {
                config1: 0x72,
                config2: 0x74,
                config3: 0x04,
            },
            ModemConfigChoice::Bw500Cr45Sf128 => ModemConfig {
                config1: 0x92,
                config2: 0x74,
                config3: 0x04,
            },
            ModemConfigChoice::Bw31_25Cr48Sf512 => ModemConfig {
                config1: 0x48,
                config2: 0x94,
                config3: 0x04,
            },
            ModemConfigChoice::Bw125Cr48Sf4096 => ModemConfig {
                config1: 0x78,
                config2: 0xc4,
                config3: 0x0c,
            },
            ModemConfigChoice::Bw125Cr45Sf2048 => ModemConfig {
                config1: 0x72,
                config2: 0xb4,
                config3: 0x04,
            },
        }
    }
}

impl Default for ModemConfigChoice {
    fn default() -> Self {
        ModemConfigChoice::Bw125Cr45Sf128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operating_mode_round_trips_through_its_code() {
        assert_eq!(
            OperatingMode::from_bits(0x05),
            Some(OperatingMode::RxContinuous)
        );
        assert_eq!(OperatingMode::from_bits(0x03), Some(OperatingMode::Tx));
        assert_eq!(OperatingMode::from_bits(0x1f), None);
    }

    #[test]
    fn default_preset_enables_crc() {
        let registers = ModemConfigChoice::default().registers();
        // Bit 2 of ModemConfig2 is RxPayloadCrcOn.
        assert_eq!(registers.config2 & 0x04, 0x04);
    }
}
