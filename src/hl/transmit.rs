use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::{blocking::spi, digital::v2::OutputPin};

use crate::hl::{Error, RadioMode, Rf95, WaitOutcome, HEADER_LEN, MAX_MESSAGE_LEN, POLL_INTERVAL_MS};
use crate::ll::{Register, FIFO};

impl<SPI, CS> Rf95<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// Loads a frame into the FIFO and starts transmitting it
    ///
    /// The payload is prefixed with the configured To/From/Id/Flags header.
    /// If a previous transmission is still in flight, this busy-waits for it
    /// first, processing its completion event.
    ///
    /// The method returns as soon as the transmitter is started; completion
    /// is observed later through [`Rf95::handle_interrupt`], which counts
    /// the frame and drops the radio back into standby. Use
    /// [`Rf95::wait_packet_sent`] to wait for that with a bound.
    pub fn send(&mut self, data: &[u8]) -> Result<(), Error<SPI, CS>> {
        if data.len() > MAX_MESSAGE_LEN {
            return Err(Error::MessageTooLong);
        }

        // Never clobber the FIFO under an outgoing frame.
        loop {
            match self.poll_packet_sent() {
                Ok(()) => break,
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(error)) => return Err(error),
            }
        }

        self.enter_idle()?;

        // Fill the FIFO from the start: header first, then the payload.
        let (to, from, id, flags) = (
            self.tx_header.to,
            self.tx_header.from,
            self.tx_header.id,
            self.tx_header.flags,
        );
        self.ll.fifo_addr_ptr().write(|w| w.value(0))?;
        self.ll.fifo().write(|w| w.value(to))?;
        self.ll.fifo().write(|w| w.value(from))?;
        self.ll.fifo().write(|w| w.value(id))?;
        self.ll.fifo().write(|w| w.value(flags))?;
        self.ll.burst_write(FIFO::ADDR, data)?;
        self.ll
            .payload_length()
            .write(|w| w.value((data.len() + HEADER_LEN) as u8))?;

        self.enter_tx()?;

        Ok(())
    }

    /// Checks whether the transmitter is free
    ///
    /// Returns `WouldBlock` while a transmission is in flight. Processes the
    /// completion event itself, so it makes progress in setups that never
    /// call [`Rf95::handle_interrupt`] from an interrupt handler.
    pub fn poll_packet_sent(&mut self) -> nb::Result<(), Error<SPI, CS>> {
        if self.mode != RadioMode::Tx {
            return Ok(());
        }

        self.handle_interrupt().map_err(nb::Error::Other)?;

        if self.mode != RadioMode::Tx {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Waits for the transmitter to become free, with a bound
    ///
    /// Polls in steps of a fixed granularity until the in-flight
    /// transmission completes or the caller's budget runs out. There is no
    /// cancellation; the outcome is [`WaitOutcome::Completed`] or
    /// [`WaitOutcome::TimedOut`], nothing else.
    pub fn wait_packet_sent<D>(
        &mut self,
        delay: &mut D,
        timeout_ms: u16,
    ) -> Result<WaitOutcome, Error<SPI, CS>>
    where
        D: DelayMs<u16>,
    {
        let mut elapsed = 0;
        loop {
            match self.poll_packet_sent() {
                Ok(()) => return Ok(WaitOutcome::Completed),
                Err(nb::Error::WouldBlock) => (),
                Err(nb::Error::Other(error)) => return Err(error),
            }

            if elapsed >= timeout_ms {
                return Ok(WaitOutcome::TimedOut);
            }
            delay.delay_ms(POLL_INTERVAL_MS);
            elapsed = elapsed.saturating_add(POLL_INTERVAL_MS);
        }
    }
}
