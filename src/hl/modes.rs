use embedded_hal::{blocking::spi, digital::v2::OutputPin};

use crate::configs::{Dio0Mapping, OperatingMode};
use crate::hl::{Error, RadioMode, Rf95};

impl<SPI, CS> Rf95<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// Puts the radio into standby
    ///
    /// Like all mode transitions, this is a no-op when the radio is already
    /// in the requested mode; no registers are touched in that case.
    pub fn enter_idle(&mut self) -> Result<(), Error<SPI, CS>> {
        if self.mode != RadioMode::Idle {
            self.ll
                .op_mode()
                .write(|w| w.long_range_mode(1).mode(OperatingMode::Standby as u8))?;
            self.mode = RadioMode::Idle;
        }

        Ok(())
    }

    /// Puts the radio into its lowest power mode
    pub fn enter_sleep(&mut self) -> Result<(), Error<SPI, CS>> {
        if self.mode != RadioMode::Sleep {
            self.ll
                .op_mode()
                .write(|w| w.long_range_mode(1).mode(OperatingMode::Sleep as u8))?;
            self.mode = RadioMode::Sleep;
        }

        Ok(())
    }

    /// Starts listening for packets
    ///
    /// Programs continuous receive mode and routes the receive-done event to
    /// the interrupt line.
    pub fn enter_rx(&mut self) -> Result<(), Error<SPI, CS>> {
        if self.mode != RadioMode::Rx {
            self.ll
                .op_mode()
                .write(|w| w.long_range_mode(1).mode(OperatingMode::RxContinuous as u8))?;
            self.ll
                .dio_mapping1()
                .write(|w| w.dio0(Dio0Mapping::RxDone as u8))?;
            self.mode = RadioMode::Rx;
        }

        Ok(())
    }

    /// Starts the transmitter
    ///
    /// Programs transmit mode and routes the transmit-done event to the
    /// interrupt line. The frame to send must already be in the FIFO; this
    /// is normally called through [`Rf95::send`].
    pub fn enter_tx(&mut self) -> Result<(), Error<SPI, CS>> {
        if self.mode != RadioMode::Tx {
            self.ll
                .op_mode()
                .write(|w| w.long_range_mode(1).mode(OperatingMode::Tx as u8))?;
            self.ll
                .dio_mapping1()
                .write(|w| w.dio0(Dio0Mapping::TxDone as u8))?;
            self.mode = RadioMode::Tx;
        }

        Ok(())
    }

    /// Starts channel activity detection
    ///
    /// The result is recorded by the interrupt handler and can be read with
    /// [`Rf95::cad_detected`] once the radio is back in standby.
    pub fn enter_cad(&mut self) -> Result<(), Error<SPI, CS>> {
        if self.mode != RadioMode::Cad {
            self.ll
                .op_mode()
                .write(|w| w.long_range_mode(1).mode(OperatingMode::Cad as u8))?;
            self.ll
                .dio_mapping1()
                .write(|w| w.dio0(Dio0Mapping::CadDone as u8))?;
            self.cad_detected = false;
            self.mode = RadioMode::Cad;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::hl::test_support::{cs_cycles, rf95};
    use crate::hl::RadioMode;

    use embedded_hal_mock::pin::Mock as PinMock;
    use embedded_hal_mock::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    #[test]
    fn enter_idle_programs_standby_exactly_once() {
        let mut spi = SpiMock::new(&[SpiTransaction::write(vec![0x81, 0x81])]);
        let mut cs = PinMock::new(&cs_cycles(1));
        let mut radio = rf95(spi.clone(), cs.clone(), RadioMode::Sleep);

        radio.enter_idle().unwrap();
        radio.enter_idle().unwrap();
        assert_eq!(radio.mode(), RadioMode::Idle);

        spi.done();
        cs.done();
    }

    #[test]
    fn enter_rx_arms_the_receive_done_event() {
        let mut spi = SpiMock::new(&[
            SpiTransaction::write(vec![0x81, 0x85]),
            SpiTransaction::write(vec![0xc0, 0x00]),
        ]);
        let mut cs = PinMock::new(&cs_cycles(2));
        let mut radio = rf95(spi.clone(), cs.clone(), RadioMode::Idle);

        radio.enter_rx().unwrap();
        radio.enter_rx().unwrap();
        assert_eq!(radio.mode(), RadioMode::Rx);

        spi.done();
        cs.done();
    }

    #[test]
    fn enter_tx_arms_the_transmit_done_event() {
        let mut spi = SpiMock::new(&[
            SpiTransaction::write(vec![0x81, 0x83]),
            SpiTransaction::write(vec![0xc0, 0x40]),
        ]);
        let mut cs = PinMock::new(&cs_cycles(2));
        let mut radio = rf95(spi.clone(), cs.clone(), RadioMode::Idle);

        radio.enter_tx().unwrap();
        radio.enter_tx().unwrap();
        assert_eq!(radio.mode(), RadioMode::Tx);

        spi.done();
        cs.done();
    }

    #[test]
    fn enter_cad_arms_detection_and_clears_the_old_result() {
        let mut spi = SpiMock::new(&[
            SpiTransaction::write(vec![0x81, 0x87]),
            SpiTransaction::write(vec![0xc0, 0x80]),
        ]);
        let mut cs = PinMock::new(&cs_cycles(2));
        let mut radio = rf95(spi.clone(), cs.clone(), RadioMode::Idle);
        radio.cad_detected = true;

        radio.enter_cad().unwrap();
        assert_eq!(radio.mode(), RadioMode::Cad);
        assert!(!radio.cad_detected());

        spi.done();
        cs.done();
    }
}
