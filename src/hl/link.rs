use embedded_hal::{blocking::spi, digital::v2::OutputPin};

use crate::configs::{ModemConfig, ModemConfigChoice};
use crate::hl::{Error, Rf95};

/// Crystal oscillator frequency in Hz
pub const FXOSC: f64 = 32_000_000.0;

/// Frequency synthesizer step in Hz
///
/// The 24-bit frequency word counts in steps of `FXOSC / 2^19`, about 61 Hz.
pub const FSTEP: f64 = FXOSC / 524_288.0;

/// Carrier frequencies from here up use the high-frequency port
const HF_PORT_THRESHOLD_MHZ: f32 = 779.0;

// PaDac field values; 0x07 adds roughly 3 dB on PA_BOOST.
const PA_DAC_ENABLE: u8 = 0x07;
const PA_DAC_DISABLE: u8 = 0x04;

impl<SPI, CS> Rf95<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// Sets the carrier frequency
    ///
    /// Converts the centre frequency into the synthesizer's 24-bit word and
    /// programs it. The result is quantized to [`FSTEP`], well under
    /// crystal tolerance. Also re-derives which RF port the band uses,
    /// which downstream power and signal-strength tables depend on.
    pub fn set_frequency(&mut self, centre_mhz: f32) -> Result<(), Error<SPI, CS>> {
        let frf = (centre_mhz as f64 * 1_000_000.0 / FSTEP + 0.5) as u32;

        self.ll.frf_msb().write(|w| w.value((frf >> 16) as u8))?;
        self.ll.frf_mid().write(|w| w.value((frf >> 8) as u8))?;
        self.ll.frf_lsb().write(|w| w.value(frf as u8))?;

        self.hf_port = centre_mhz >= HF_PORT_THRESHOLD_MHZ;

        Ok(())
    }

    /// Sets the transmit power
    ///
    /// With `use_rfo` the RFO output pin is used and `power_dbm` is clamped
    /// to -1..=14. Without it the PA_BOOST pin is used and `power_dbm` is
    /// clamped to 5..=23; the top three steps additionally enable the
    /// high-power DAC, which contributes a fixed ~3 dB. RFM95 modules only
    /// have PA_BOOST connected.
    ///
    /// There is no feedback from the hardware: a value outside the valid
    /// range is clamped, not reported.
    pub fn set_tx_power(&mut self, power_dbm: i8, use_rfo: bool) -> Result<(), Error<SPI, CS>> {
        if use_rfo {
            let power = power_dbm.max(-1).min(14);
            self.ll
                .pa_config()
                .write(|w| w.max_power(0b111).output_power((power + 1) as u8))?;
        } else {
            let mut power = power_dbm.max(5).min(23);
            if power > 20 {
                self.ll.pa_dac().modify(|_, w| w.pa_dac(PA_DAC_ENABLE))?;
                power -= 3;
            } else {
                self.ll.pa_dac().modify(|_, w| w.pa_dac(PA_DAC_DISABLE))?;
            }
            self.ll
                .pa_config()
                .write(|w| w.pa_select(1).output_power((power - 5) as u8))?;
        }

        Ok(())
    }

    /// Sets the preamble length in symbols
    pub fn set_preamble_length(&mut self, symbols: u16) -> Result<(), Error<SPI, CS>> {
        self.ll
            .preamble_msb()
            .write(|w| w.value((symbols >> 8) as u8))?;
        self.ll.preamble_lsb().write(|w| w.value(symbols as u8))?;

        Ok(())
    }

    /// Applies one of the canned modem settings
    pub fn set_modem_config(&mut self, choice: ModemConfigChoice) -> Result<(), Error<SPI, CS>> {
        let registers = choice.registers();
        self.set_modem_registers(&registers)
    }

    /// Programs the three modem configuration registers directly
    pub fn set_modem_registers(&mut self, config: &ModemConfig) -> Result<(), Error<SPI, CS>> {
        self.ll.modem_config1().write(|w| w.value(config.config1))?;
        self.ll.modem_config2().write(|w| w.value(config.config2))?;
        self.ll.modem_config3().write(|w| w.value(config.config3))?;

        Ok(())
    }

    /// Reads the silicon revision
    pub fn version(&mut self) -> Result<u8, Error<SPI, CS>> {
        Ok(self.ll.version().read()?.value())
    }
}
