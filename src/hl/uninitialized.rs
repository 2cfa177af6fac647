use embedded_hal::{
    blocking::{delay::DelayMs, spi},
    digital::v2::OutputPin,
};

use crate::configs::{ModemConfigChoice, OperatingMode};
use crate::hl::{
    Error, FrameHeader, LinkStatistics, RadioMode, Rf95, BROADCAST_ADDRESS, MAX_PAYLOAD_LEN,
};
use crate::ll;

/// A radio before initialization
///
/// Calling [`init`] checks that the transceiver is actually there, brings it
/// into a known configuration, and hands out the usable [`Rf95`] driver.
///
/// [`init`]: #method.init
pub struct UninitializedRf95<SPI, CS> {
    ll: ll::Rf95<SPI, CS>,
}

impl<SPI, CS> UninitializedRf95<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// Create a new instance of `UninitializedRf95`
    ///
    /// Requires the SPI peripheral and the chip select pin that are
    /// connected to the RFM95.
    pub fn new(spi: SPI, chip_select: CS) -> Self {
        UninitializedRf95 {
            ll: ll::Rf95::new(spi, chip_select),
        }
    }

    /// Get the low-level interface of the uninitialized radio
    pub fn ll(&mut self) -> &mut ll::Rf95<SPI, CS> {
        &mut self.ll
    }

    /// Initialize the RFM95
    ///
    /// Selects the LoRa modem (only possible in sleep mode) and verifies
    /// that the device actually took the setting, which is the one way to
    /// tell that a working transceiver is on the bus. Then programs the
    /// defaults: the whole FIFO for either direction, 8 preamble symbols,
    /// the default modem preset, 915.0 MHz, and 13 dBm on PA_BOOST.
    ///
    /// Fails with [`Error::NoDevice`] when the mode readback does not match;
    /// that is fatal, there is no point talking to the bus further.
    pub fn init<D>(self, delay: &mut D) -> Result<Rf95<SPI, CS>, Error<SPI, CS>>
    where
        D: DelayMs<u8>,
    {
        let mut rf95 = Rf95 {
            ll: self.ll,
            mode: RadioMode::Initialising,
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
        };

        rf95.enter_sleep()?;

        // Give sleep mode time to take over from whatever was running.
        delay.delay_ms(10);

        let op_mode = rf95.ll.op_mode().read()?;
        if op_mode.long_range_mode() != 1
            || OperatingMode::from_bits(op_mode.mode()) != Some(OperatingMode::Sleep)
        {
            return Err(Error::NoDevice);
        }

        // The entire FIFO serves either direction; the driver never receives
        // while it transmits.
        rf95.ll.fifo_tx_base_addr().write(|w| w.value(0))?;
        rf95.ll.fifo_rx_base_addr().write(|w| w.value(0))?;

        rf95.enter_idle()?;

        rf95.set_modem_config(ModemConfigChoice::default())?;
        rf95.set_preamble_length(8)?;
        rf95.set_frequency(915.0)?;
        rf95.set_tx_power(13, false)?;

        Ok(rf95)
    }
}
