use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::{blocking::spi, digital::v2::OutputPin};

use crate::hl::{
    Error, FrameHeader, RadioMode, Rf95, WaitOutcome, BROADCAST_ADDRESS, HEADER_LEN,
    POLL_INTERVAL_MS,
};

impl<SPI, CS> Rf95<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// Checks whether an accepted frame is waiting, arming the receiver
    ///
    /// Returns false while a transmission is in flight. If a frame is
    /// already waiting, it is reported without touching the radio: the
    /// receiver stays off until the frame is consumed, so a second arrival
    /// cannot overwrite it. Otherwise the receiver is armed and the (still
    /// empty) pending state is reported.
    ///
    /// Checking for data and ensuring the radio is listening are
    /// deliberately one operation.
    pub fn available(&mut self) -> Result<bool, Error<SPI, CS>> {
        if self.mode == RadioMode::Tx {
            return Ok(false);
        }
        if self.rx_valid {
            return Ok(true);
        }

        self.enter_rx()?;

        Ok(self.rx_valid)
    }

    /// Hands out the payload of the waiting frame
    ///
    /// Returns `None` when no accepted frame is pending. Otherwise copies as
    /// much of the payload as fits into `buffer` (the frame header is
    /// stripped), releases the receive buffer, and returns the number of
    /// bytes copied.
    pub fn recv(&mut self, buffer: &mut [u8]) -> Result<Option<usize>, Error<SPI, CS>> {
        if !self.available()? {
            return Ok(None);
        }

        let payload_len = self.rx_len as usize - HEADER_LEN;
        let len = buffer.len().min(payload_len);
        buffer[..len].copy_from_slice(&self.rx_buf[HEADER_LEN..HEADER_LEN + len]);

        self.clear_rx_buf();

        Ok(Some(len))
    }

    /// Waits for an accepted frame, with a bound
    ///
    /// Polls in steps of a fixed granularity, processing completion events,
    /// until a frame is waiting or the caller's budget runs out.
    pub fn wait_available<D>(
        &mut self,
        delay: &mut D,
        timeout_ms: u16,
    ) -> Result<WaitOutcome, Error<SPI, CS>>
    where
        D: DelayMs<u16>,
    {
        let mut elapsed = 0;
        loop {
            self.handle_interrupt()?;
            if self.available()? {
                return Ok(WaitOutcome::Completed);
            }

            if elapsed >= timeout_ms {
                return Ok(WaitOutcome::TimedOut);
            }
            delay.delay_ms(POLL_INTERVAL_MS);
            elapsed = elapsed.saturating_add(POLL_INTERVAL_MS);
        }
    }

    /// Returns the header of the last received frame
    pub fn rx_header(&self) -> FrameHeader {
        self.rx_header
    }

    /// SNR of the last received packet in dB
    pub fn last_snr(&self) -> i8 {
        self.last_snr
    }

    /// Signal strength of the last received packet in dBm
    pub fn last_rssi(&self) -> i16 {
        self.last_rssi
    }

    pub(crate) fn clear_rx_buf(&mut self) {
        self.rx_valid = false;
        self.rx_len = 0;
    }

    /// Decides whether the frame in the receive buffer is for us
    ///
    /// A frame shorter than the header cannot be real and is ignored
    /// entirely. Otherwise the header is captured, and the frame is accepted
    /// when it is addressed to this node or to everyone, or when promiscuous
    /// mode is on. A frame for somebody else is dropped without counting;
    /// filtering is not corruption.
    pub(crate) fn validate_rx_buf(&mut self) {
        if self.rx_len < HEADER_LEN as u8 {
            return;
        }

        self.rx_header = FrameHeader {
            to: self.rx_buf[0],
            from: self.rx_buf[1],
            id: self.rx_buf[2],
            flags: self.rx_buf[3],
        };

        if self.promiscuous
            || self.rx_header.to == self.this_address
            || self.rx_header.to == BROADCAST_ADDRESS
        {
            self.stats.rx_good += 1;
            self.rx_valid = true;
        }
    }
}
