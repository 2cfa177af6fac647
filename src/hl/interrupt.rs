use embedded_hal::{blocking::spi, digital::v2::OutputPin};

use crate::hl::{Error, RadioMode, Rf95};
use crate::ll::{Register, FIFO};

impl<SPI, CS> Rf95<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// Processes a completion event signalled on the interrupt line
    ///
    /// This is the single asynchronous entry point of the driver. Call it
    /// from the handler of the radio's interrupt pin, or poll it; either
    /// way it reads the interrupt flags once and advances the state
    /// machine:
    ///
    /// - receiving and a packet arrived: the frame is pulled out of the
    ///   FIFO into the receive buffer and validated. Only an accepted frame
    ///   takes the radio to standby; after a filtered frame it keeps
    ///   listening. A failed payload CRC only counts against `rx_bad`.
    /// - transmitting and the packet left: the good-transmit counter is
    ///   bumped and the radio goes to standby.
    /// - detecting channel activity and detection finished: the result is
    ///   recorded and the radio goes to standby.
    ///
    /// A spurious call (no matching flag for the current mode) only clears
    /// the flags.
    pub fn handle_interrupt(&mut self) -> Result<(), Error<SPI, CS>> {
        let flags = self.ll.irq_flags().read()?;

        if self.mode == RadioMode::Rx && flags.rx_done() == 1 {
            if flags.payload_crc_error() == 1 {
                self.stats.rx_bad += 1;
            } else {
                let len = self.ll.rx_nb_bytes().read()?.value();

                // Wind the FIFO pointer back to the start of the packet.
                let packet_start = self.ll.fifo_rx_current_addr().read()?.value();
                self.ll.fifo_addr_ptr().write(|w| w.value(packet_start))?;

                self.ll
                    .burst_read(FIFO::ADDR, &mut self.rx_buf[..len as usize])?;
                self.rx_len = len;

                self.read_signal_quality()?;
                self.clear_interrupts()?;

                self.validate_rx_buf();
                if self.rx_valid {
                    // Hold the frame; the receiver is re-armed once it has
                    // been consumed.
                    self.enter_idle()?;
                }
            }
        } else if self.mode == RadioMode::Tx && flags.tx_done() == 1 {
            self.stats.tx_good += 1;
            self.enter_idle()?;
        } else if self.mode == RadioMode::Cad && flags.cad_done() == 1 {
            self.cad_detected = flags.cad_detected() == 1;
            self.enter_idle()?;
        }

        // On some hosts a single write-1-to-clear is not taken by the
        // device. The second write is required, not cleanup; do not remove
        // it.
        self.clear_interrupts()?;
        self.clear_interrupts()?;

        Ok(())
    }

    /// Captures SNR and RSSI of the packet that was just received
    fn read_signal_quality(&mut self) -> Result<(), Error<SPI, CS>> {
        // Quarter-dB steps, two's complement.
        self.last_snr = (self.ll.pkt_snr_value().read()?.value() as i8) / 4;

        let mut rssi = self.ll.pkt_rssi_value().read()?.value() as i16;
        if self.last_snr < 0 {
            rssi += self.last_snr as i16;
        } else {
            rssi = rssi * 16 / 15;
        }
        rssi -= if self.hf_port { 157 } else { 164 };
        self.last_rssi = rssi;

        Ok(())
    }

    fn clear_interrupts(&mut self) -> Result<(), Error<SPI, CS>> {
        self.ll.irq_flags().write(|w| {
            w.rx_timeout(1)
                .rx_done(1)
                .payload_crc_error(1)
                .valid_header(1)
                .tx_done(1)
                .cad_done(1)
                .fhss_change_channel(1)
                .cad_detected(1)
        })?;

        Ok(())
    }
}
