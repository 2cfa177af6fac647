//! Low-level interface to the RFM95
//!
//! This module implements a register-level interface to the SX1276-based
//! RFM95 LoRa transceiver. Users of this crate should typically not need to
//! use this. Please consider using the [high-level interface] instead.
//!
//! All SX1276 registers are one byte wide. A write transaction puts the
//! address on the bus with its high bit set, followed by the data; a read
//! transaction puts the bare address on the bus and receives one turnaround
//! byte (discarded) followed by the register content. Every transaction
//! asserts the chip-select line, performs exactly one exchange, and releases
//! the line again; the bus is never held across calls and nothing is retried
//! here. A failed exchange is reported to the caller as is.
//!
//! [high-level interface]: ../hl/index.html

use core::{fmt, marker::PhantomData};

use embedded_hal::{blocking::spi, digital::v2::OutputPin};

/// Address-byte flag that selects a write transaction
const WRITE_FLAG: u8 = 0x80;

/// Largest number of data bytes a single burst transaction may carry
///
/// Longer bursts are rejected with [`Error::BurstTooLong`], never truncated.
pub const BURST_MAX_LEN: usize = 256;

/// Entry point to the RFM95 driver's register-level API
///
/// Please consider using [hl::Rf95] instead.
///
/// [hl::Rf95]: ../hl/struct.Rf95.html
pub struct Rf95<SPI, CS> {
    spi: SPI,
    chip_select: CS,
}

impl<SPI, CS> Rf95<SPI, CS> {
    /// Create a new instance of `Rf95`
    ///
    /// Requires the SPI peripheral and the chip select pin that are connected
    /// to the RFM95.
    pub fn new(spi: SPI, chip_select: CS) -> Self {
        Rf95 { spi, chip_select }
    }
}

impl<SPI, CS> Rf95<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// Write a run of bytes to one register address
    ///
    /// The SX1276 keeps the address fixed for the duration of a burst, which
    /// is how the FIFO data port is filled: every data byte lands at the same
    /// address. Rejects bursts longer than [`BURST_MAX_LEN`].
    pub fn burst_write(&mut self, addr: u8, data: &[u8]) -> Result<(), Error<SPI, CS>> {
        if data.len() > BURST_MAX_LEN {
            return Err(Error::BurstTooLong);
        }

        let mut buffer = [0; BURST_MAX_LEN + 1];
        buffer[0] = WRITE_FLAG | (addr & 0x7f);
        buffer[1..=data.len()].copy_from_slice(data);

        self.chip_select.set_low().map_err(Error::ChipSelect)?;
        <SPI as spi::Write<u8>>::write(&mut self.spi, &buffer[..data.len() + 1])
            .map_err(Error::Write)?;
        self.chip_select.set_high().map_err(Error::ChipSelect)?;

        Ok(())
    }

    /// Read a run of bytes from one register address
    ///
    /// Fills the whole output buffer. Rejects reads longer than
    /// [`BURST_MAX_LEN`].
    pub fn burst_read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        if buffer.len() > BURST_MAX_LEN {
            return Err(Error::BurstTooLong);
        }

        let mut exchange = [0; BURST_MAX_LEN + 1];
        exchange[0] = addr & 0x7f;
        let len = buffer.len() + 1;

        self.chip_select.set_low().map_err(Error::ChipSelect)?;
        self.spi
            .transfer(&mut exchange[..len])
            .map_err(Error::Transfer)?;
        self.chip_select.set_high().map_err(Error::ChipSelect)?;

        // The first received byte clocks out while the address clocks in; it
        // carries nothing.
        buffer.copy_from_slice(&exchange[1..len]);

        Ok(())
    }
}

/// Provides access to a register
///
/// You can get an instance for a given register using one of the methods on
/// [`Rf95`].
pub struct RegAccessor<'s, R, SPI, CS>(&'s mut Rf95<SPI, CS>, PhantomData<R>);

impl<'s, R, SPI, CS> RegAccessor<'s, R, SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// Read from the register
    pub fn read(&mut self) -> Result<R::Read, Error<SPI, CS>>
    where
        R: Register + Readable,
    {
        let mut r = R::read();
        let buffer = R::buffer(&mut r);

        init_header::<R>(false, buffer);

        self.0.chip_select.set_low().map_err(Error::ChipSelect)?;
        self.0.spi.transfer(buffer).map_err(Error::Transfer)?;
        self.0.chip_select.set_high().map_err(Error::ChipSelect)?;

        Ok(r)
    }

    /// Write to the register
    pub fn write<F>(&mut self, f: F) -> Result<(), Error<SPI, CS>>
    where
        R: Register + Writable,
        F: FnOnce(&mut R::Write) -> &mut R::Write,
    {
        let mut w = R::write();
        f(&mut w);

        let buffer = R::buffer(&mut w);
        init_header::<R>(true, buffer);

        self.0.chip_select.set_low().map_err(Error::ChipSelect)?;
        <SPI as spi::Write<u8>>::write(&mut self.0.spi, buffer).map_err(Error::Write)?;
        self.0.chip_select.set_high().map_err(Error::ChipSelect)?;

        Ok(())
    }

    /// Modify the register
    pub fn modify<F>(&mut self, f: F) -> Result<(), Error<SPI, CS>>
    where
        R: Register + Readable + Writable,
        F: for<'r> FnOnce(&mut R::Read, &'r mut R::Write) -> &'r mut R::Write,
    {
        let mut r = self.read()?;
        let mut w = R::write();

        <R as Writable>::buffer(&mut w).copy_from_slice(<R as Readable>::buffer(&mut r));

        f(&mut r, &mut w);

        let buffer = <R as Writable>::buffer(&mut w);
        init_header::<R>(true, buffer);

        self.0.chip_select.set_low().map_err(Error::ChipSelect)?;
        <SPI as spi::Write<u8>>::write(&mut self.0.spi, buffer).map_err(Error::Write)?;
        self.0.chip_select.set_high().map_err(Error::ChipSelect)?;

        Ok(())
    }
}

/// An SPI error that can occur when communicating with the RFM95
pub enum Error<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// SPI error occured during a transfer transaction
    Transfer(<SPI as spi::Transfer<u8>>::Error),

    /// SPI error occured during a write transaction
    Write(<SPI as spi::Write<u8>>::Error),

    /// Error occured while changing chip select signal
    ChipSelect(<CS as OutputPin>::Error),

    /// A burst transfer was longer than the transaction buffer
    BurstTooLong,
}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<SPI, CS> fmt::Debug for Error<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    <SPI as spi::Transfer<u8>>::Error: fmt::Debug,
    <SPI as spi::Write<u8>>::Error: fmt::Debug,
    CS: OutputPin,
    <CS as OutputPin>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Transfer(error) => write!(f, "Transfer({:?})", error),
            Error::Write(error) => write!(f, "Write({:?})", error),
            Error::ChipSelect(error) => write!(f, "ChipSelect({:?})", error),
            Error::BurstTooLong => write!(f, "BurstTooLong"),
        }
    }
}

/// Initializes the SPI message header
///
/// Initializes the SPI message header for accessing a given register, writing
/// the header directly into the provided buffer. Returns the length of the
/// header that was written.
fn init_header<R: Register>(write: bool, buffer: &mut [u8]) -> usize {
    buffer[0] = if write {
        WRITE_FLAG | (R::ADDR & 0x7f)
    } else {
        R::ADDR & 0x7f
    };

    1
}

/// Implemented for all registers
///
/// This is a mostly internal trait that should not be implemented or used
/// directly by users of this crate. It is exposed through the public API
/// though, so it can't be made private.
///
/// The SX1276 datasheet, table 85, specifies the address of each register.
pub trait Register {
    /// The register address
    const ADDR: u8;
}

/// Marker trait for registers that can be read from
///
/// This is a mostly internal trait that should not be implemented or used
/// directly by users of this crate. It is exposed through the public API
/// though, so it can't be made private.
pub trait Readable {
    /// The type that is used to read from the register
    type Read;

    /// Return the read type for this register
    fn read() -> Self::Read;

    /// Return the read type's internal buffer
    fn buffer(r: &mut Self::Read) -> &mut [u8];
}

/// Marker trait for registers that can be written to
///
/// This is a mostly internal trait that should not be implemented or used
/// directly by users of this crate. It is exposed through the public API
/// though, so it can't be made private.
pub trait Writable {
    /// The type that is used to write to the register
    type Write;

    /// Return the write type for this register
    fn write() -> Self::Write;

    /// Return the write type's internal buffer
    fn buffer(w: &mut Self::Write) -> &mut [u8];
}

/// Generates register implementations
macro_rules! impl_register {
    (
        $(
            $addr:expr,
            $rw:tt,
            $name:ident($name_lower:ident) {
            #[$doc:meta]
            $(
                $field:ident,
                $first_bit:expr,
                $last_bit:expr;
                #[$field_doc:meta]
            )*
            }
        )*
    ) => {
        $(
            #[$doc]
            #[allow(non_camel_case_types)]
            pub struct $name;

            impl Register for $name {
                const ADDR: u8 = $addr;
            }

            #[$doc]
            pub mod $name_lower {
                use core::fmt;

                // One address byte in front of the one-byte register value.
                const HEADER_LEN: usize = 1;

                /// Used to read from the register
                pub struct R(pub(crate) [u8; HEADER_LEN + 1]);

                impl R {
                    $(
                        #[$field_doc]
                        pub fn $field(&self) -> u8 {
                            const MASK: u8 =
                                ((1u16 << ($last_bit - $first_bit + 1)) - 1) as u8;
                            (self.0[HEADER_LEN] >> $first_bit) & MASK
                        }
                    )*
                }

                impl fmt::Debug for R {
                    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                        write!(f, "0x{:02x}", self.0[HEADER_LEN])
                    }
                }

                /// Used to write to the register
                pub struct W(pub(crate) [u8; HEADER_LEN + 1]);

                impl W {
                    $(
                        #[$field_doc]
                        pub fn $field(&mut self, value: u8) -> &mut Self {
                            const MASK: u8 =
                                ((1u16 << ($last_bit - $first_bit + 1)) - 1) as u8;
                            self.0[HEADER_LEN] &= !(MASK << $first_bit);
                            self.0[HEADER_LEN] |= (value & MASK) << $first_bit;
                            self
                        }
                    )*
                }
            }

            impl_rw!($rw, $name, $name_lower);
        )*


        impl<SPI, CS> Rf95<SPI, CS> {
            $(
                #[$doc]
                pub fn $name_lower(&mut self) -> RegAccessor<$name, SPI, CS> {
                    RegAccessor(self, PhantomData)
                }
            )*
        }
    }
}

// Helper macro, used internally by `impl_register!`
macro_rules! impl_rw {
    (RO, $name:ident, $name_lower:ident) => {
        impl_rw!(@R, $name, $name_lower);
    };
    (RW, $name:ident, $name_lower:ident) => {
        impl_rw!(@R, $name, $name_lower);
        impl_rw!(@W, $name, $name_lower);
    };

    (@R, $name:ident, $name_lower:ident) => {
        impl Readable for $name {
            type Read = $name_lower::R;

            fn read() -> Self::Read {
                $name_lower::R([0; 2])
            }

            fn buffer(r: &mut Self::Read) -> &mut [u8] {
                &mut r.0
            }
        }
    };
    (@W, $name:ident, $name_lower:ident) => {
        impl Writable for $name {
            type Write = $name_lower::W;

            fn write() -> Self::Write {
                $name_lower::W([0; 2])
            }

            fn buffer(w: &mut Self::Write) -> &mut [u8] {
                &mut w.0
            }
        }
    };
}

// All registers the driver uses are implemented in this macro invocation.
// It follows the following syntax:
// <addr>, <RO/RW>, <NAME(name)> { /// <doc>
//     <field>, <first-bit>, <last-bit>; /// <doc>
//     ...
// }
//
// The field values are specified in the SX1276 datasheet, chapter 6.

impl_register! {
    0x00, RW, FIFO(fifo) { /// FIFO read/write access port
        value, 0, 7; /// One byte of FIFO data
    }
    0x01, RW, OP_MODE(op_mode) { /// Operating mode and modem selection
        long_range_mode,    7, 7; /// Selects the LoRa modem (only writable in sleep)
        access_shared_reg,  6, 6; /// FSK register page access while in LoRa mode
        low_frequency_mode, 3, 3; /// Low-frequency (sub-525 MHz) register page
        mode,               0, 2; /// Transceiver operating mode
    }
    0x06, RW, FRF_MSB(frf_msb) { /// Carrier frequency word, bits 23:16
        value, 0, 7; /// Most significant byte of the frequency word
    }
    0x07, RW, FRF_MID(frf_mid) { /// Carrier frequency word, bits 15:8
        value, 0, 7; /// Middle byte of the frequency word
    }
    0x08, RW, FRF_LSB(frf_lsb) { /// Carrier frequency word, bits 7:0
        value, 0, 7; /// Least significant byte of the frequency word
    }
    0x09, RW, PA_CONFIG(pa_config) { /// Power amplifier selection and output power
        pa_select,    7, 7; /// Selects the PA_BOOST pin instead of RFO
        max_power,    4, 6; /// Upper power limit on the RFO output
        output_power, 0, 3; /// Output power setting
    }
    0x0D, RW, FIFO_ADDR_PTR(fifo_addr_ptr) { /// FIFO access pointer
        value, 0, 7; /// Address of the next FIFO access
    }
    0x0E, RW, FIFO_TX_BASE_ADDR(fifo_tx_base_addr) { /// Transmit region base
        value, 0, 7; /// Start of the transmit region in the FIFO
    }
    0x0F, RW, FIFO_RX_BASE_ADDR(fifo_rx_base_addr) { /// Receive region base
        value, 0, 7; /// Start of the receive region in the FIFO
    }
    0x10, RO, FIFO_RX_CURRENT_ADDR(fifo_rx_current_addr) { /// Start of the last received packet
        value, 0, 7; /// FIFO address of the most recent packet
    }
    0x12, RW, IRQ_FLAGS(irq_flags) { /// Interrupt flags, write 1 to clear
        rx_timeout,          7, 7; /// Receive operation timed out
        rx_done,             6, 6; /// Packet reception complete
        payload_crc_error,   5, 5; /// Payload CRC check failed
        valid_header,        4, 4; /// Valid header received
        tx_done,             3, 3; /// Transmission complete
        cad_done,            2, 2; /// Channel activity detection finished
        fhss_change_channel, 1, 1; /// Frequency hop request
        cad_detected,        0, 0; /// Channel activity detected
    }
    0x13, RO, RX_NB_BYTES(rx_nb_bytes) { /// Number of received payload bytes
        value, 0, 7; /// Payload byte count of the last packet
    }
    0x19, RO, PKT_SNR_VALUE(pkt_snr_value) { /// SNR estimate of the last packet
        value, 0, 7; /// SNR in quarter-dB steps, two's complement
    }
    0x1A, RO, PKT_RSSI_VALUE(pkt_rssi_value) { /// RSSI of the last packet
        value, 0, 7; /// Raw packet RSSI
    }
    0x1D, RW, MODEM_CONFIG1(modem_config1) { /// Bandwidth, coding rate, header mode
        value, 0, 7; /// Packed modem settings
    }
    0x1E, RW, MODEM_CONFIG2(modem_config2) { /// Spreading factor, CRC, timeout MSB
        value, 0, 7; /// Packed modem settings
    }
    0x20, RW, PREAMBLE_MSB(preamble_msb) { /// Preamble length, bits 15:8
        value, 0, 7; /// Most significant byte of the preamble symbol count
    }
    0x21, RW, PREAMBLE_LSB(preamble_lsb) { /// Preamble length, bits 7:0
        value, 0, 7; /// Least significant byte of the preamble symbol count
    }
    0x22, RW, PAYLOAD_LENGTH(payload_length) { /// On-air payload length
        value, 0, 7; /// Length in bytes, frame header included
    }
    0x26, RW, MODEM_CONFIG3(modem_config3) { /// Low data rate optimize and AGC
        value, 0, 7; /// Packed modem settings
    }
    0x40, RW, DIO_MAPPING1(dio_mapping1) { /// Event routing for DIO0 to DIO3
        dio0, 6, 7; /// Event routed to the DIO0 pin
        dio1, 4, 5; /// Event routed to the DIO1 pin
        dio2, 2, 3; /// Event routed to the DIO2 pin
        dio3, 0, 1; /// Event routed to the DIO3 pin
    }
    0x42, RO, VERSION(version) { /// Silicon revision
        value, 0, 7; /// Chip version code
    }
    0x4D, RW, PA_DAC(pa_dac) { /// High-power DAC control
        pa_dac, 0, 2; /// 0x07 enables the +20 dBm option, 0x04 disables it
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use embedded_hal_mock::pin::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use embedded_hal_mock::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    fn cs_cycles(count: usize) -> Vec<PinTransaction> {
        let mut transactions = Vec::new();
        for _ in 0..count {
            transactions.push(PinTransaction::set(PinState::Low));
            transactions.push(PinTransaction::set(PinState::High));
        }
        transactions
    }

    #[test]
    fn read_discards_the_turnaround_byte() {
        let mut spi = SpiMock::new(&[SpiTransaction::transfer(
            vec![0x01, 0x00],
            vec![0xaa, 0x85],
        )]);
        let mut cs = PinMock::new(&cs_cycles(1));
        let mut ll = Rf95::new(spi.clone(), cs.clone());

        let op_mode = ll.op_mode().read().unwrap();
        assert_eq!(op_mode.long_range_mode(), 1);
        assert_eq!(op_mode.mode(), 0x05);

        spi.done();
        cs.done();
    }

    #[test]
    fn write_sets_the_write_flag() {
        let mut spi = SpiMock::new(&[SpiTransaction::write(vec![0x81, 0x83])]);
        let mut cs = PinMock::new(&cs_cycles(1));
        let mut ll = Rf95::new(spi.clone(), cs.clone());

        ll.op_mode()
            .write(|w| w.long_range_mode(1).mode(0x03))
            .unwrap();

        spi.done();
        cs.done();
    }

    #[test]
    fn modify_reads_then_writes_back() {
        let mut spi = SpiMock::new(&[
            SpiTransaction::transfer(vec![0x4d, 0x00], vec![0x00, 0x84]),
            SpiTransaction::write(vec![0xcd, 0x87]),
        ]);
        let mut cs = PinMock::new(&cs_cycles(2));
        let mut ll = Rf95::new(spi.clone(), cs.clone());

        ll.pa_dac().modify(|_, w| w.pa_dac(0x07)).unwrap();

        spi.done();
        cs.done();
    }

    #[test]
    fn burst_write_frames_the_address() {
        let mut spi = SpiMock::new(&[SpiTransaction::write(vec![0x80, 1, 2, 3])]);
        let mut cs = PinMock::new(&cs_cycles(1));
        let mut ll = Rf95::new(spi.clone(), cs.clone());

        ll.burst_write(FIFO::ADDR, &[1, 2, 3]).unwrap();

        spi.done();
        cs.done();
    }

    #[test]
    fn burst_read_discards_the_turnaround_byte() {
        let mut spi = SpiMock::new(&[SpiTransaction::transfer(
            vec![0x00, 0x00, 0x00, 0x00],
            vec![0xff, 9, 8, 7],
        )]);
        let mut cs = PinMock::new(&cs_cycles(1));
        let mut ll = Rf95::new(spi.clone(), cs.clone());

        let mut buffer = [0; 3];
        ll.burst_read(FIFO::ADDR, &mut buffer).unwrap();
        assert_eq!(buffer, [9, 8, 7]);

        spi.done();
        cs.done();
    }

    #[test]
    fn oversized_bursts_are_rejected_without_bus_traffic() {
        let mut spi = SpiMock::new(&[]);
        let mut cs = PinMock::new(&[]);
        let mut ll = Rf95::new(spi.clone(), cs.clone());

        let data = [0; BURST_MAX_LEN + 1];
        assert!(matches!(
            ll.burst_write(FIFO::ADDR, &data),
            Err(Error::BurstTooLong)
        ));

        let mut buffer = [0; BURST_MAX_LEN + 1];
        assert!(matches!(
            ll.burst_read(FIFO::ADDR, &mut buffer),
            Err(Error::BurstTooLong)
        ));

        spi.done();
        cs.done();
    }
}
