//! Client for the DWM1001 UWB positioning module
//!
//! The DWM1001 sits on its own SPI bus and speaks a type-length-value
//! protocol. This module implements the part of it the tag needs: asking
//! for the current location estimate and decoding the answer into typed
//! records, plus routing the module's location-ready event to its
//! interrupt line.
//!
//! A location response carries a 3-byte status, usually the node's own
//! position estimate, and one block of anchor records. The anchor block
//! comes in two mutually exclusive layouts, selected by a discriminator
//! byte: plain distances (when the responding node is an anchor), or
//! distances with the anchor positions attached (when it is a tag). The
//! decoder keeps the two apart in the type system and refuses to read past
//! the end of a response: a truncated record list is an error, not a
//! partial result.

use core::convert::TryInto;
use core::fmt;

use embedded_hal::{blocking::spi, digital::v2::OutputPin};
use heapless::Vec;

/// Largest TLV frame the module exchanges, in either direction
pub const TLV_MAX_SIZE: usize = 255;

/// Most anchor records a location response can carry
pub const MAX_ANCHORS: usize = 14;

/// Location-ready bit for [`Dwm1001::set_interrupt_config`]
pub const INTR_LOC_READY: u16 = 0x0001;

// TLV type bytes, from the DWM1001 API.
const TLV_TYPE_CMD_LOC_GET: u8 = 0x0c;
const TLV_TYPE_CMD_INT_CFG: u8 = 0x34;
const TLV_TYPE_POS_XYZ: u8 = 0x41;
const TLV_TYPE_RNG_AN_DIST: u8 = 0x48;
const TLV_TYPE_RNG_AN_POS_DIST: u8 = 0x49;

// Fixed layout of a location response.
const STATUS_LEN: usize = 3;
const POS_VALUE_LEN: usize = 13;
const POS_BLOCK_LEN: usize = 2 + POS_VALUE_LEN;
const DIST_BLOCK_OFFSET: usize = STATUS_LEN + POS_BLOCK_LEN;
const MIN_LOC_RESPONSE_LEN: usize = DIST_BLOCK_OFFSET + 3;
const DIST_RECORD_LEN: usize = 8 + 4 + 1;
const DIST_POS_RECORD_LEN: usize = 2 + 4 + 1 + POS_VALUE_LEN;

/// A position estimate in millimeters
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Position {
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
    /// Z coordinate
    pub z: i32,
    /// Quality factor the module attaches to the estimate
    pub quality: u8,
}

/// Measured distance to one ranging partner, by 64-bit address
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnchorDistance {
    /// Address of the ranging partner
    pub address: u64,
    /// Distance in millimeters
    pub distance: u32,
    /// Quality factor of the measurement
    pub quality: u8,
}

/// Measured distance to an anchor, with the anchor's known position
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnchorDistancePosition {
    /// Short address of the anchor
    pub address: u16,
    /// Distance in millimeters
    pub distance: u32,
    /// Quality factor of the measurement
    pub quality: u8,
    /// Where the anchor is
    pub position: Position,
}

/// The anchor records of one location response
///
/// A response carries one record layout, never a mixture; which one is
/// decided by the response's discriminator byte.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AnchorRecords {
    /// Distances only; the responding node is an anchor
    Distances(Vec<AnchorDistance, MAX_ANCHORS>),
    /// Distances with anchor positions; the responding node is a tag
    DistancesWithPositions(Vec<AnchorDistancePosition, MAX_ANCHORS>),
}

impl AnchorRecords {
    /// Number of anchor records in the response
    pub fn len(&self) -> usize {
        match self {
            AnchorRecords::Distances(records) => records.len(),
            AnchorRecords::DistancesWithPositions(records) => records.len(),
        }
    }

    /// Whether the response carried no anchor records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded location response
///
/// Built fresh for every query; owns all its data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocationData {
    /// The node's own position estimate, when the module reported one
    pub position: Option<Position>,
    /// Distances (and possibly positions) of the ranging partners
    pub anchors: AnchorRecords,
}

/// A malformed or unusable location response
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Shorter than the smallest complete response
    TooShort,
    /// The module reported an error instead of a location
    Status(u8),
    /// The discriminator byte matches no known record layout
    UnrecognizedResponse(u8),
    /// The declared record count does not fit the received bytes
    Truncated,
    /// The declared record count exceeds [`MAX_ANCHORS`]
    TooManyAnchors,
}

/// Decodes a location response
///
/// `response` is the raw TLV frame as received, including the status bytes.
/// The decoder never reads past the end of the slice, and it never returns
/// a partially filled result: any defect in the response is an error.
pub fn decode_location(response: &[u8]) -> Result<LocationData, DecodeError> {
    if response.len() < MIN_LOC_RESPONSE_LEN {
        return Err(DecodeError::TooShort);
    }

    // Status TLV: type, length, error code. A nonzero code means the rest
    // of the frame carries no location.
    if response[2] != 0 {
        return Err(DecodeError::Status(response[2]));
    }

    // The node's own position, when the module reported one. The following
    // block sits at a fixed offset either way.
    let position = if response[STATUS_LEN] == TLV_TYPE_POS_XYZ {
        Some(read_position(&response[STATUS_LEN + 2..STATUS_LEN + 2 + POS_VALUE_LEN]))
    } else {
        None
    };

    let discriminator = response[DIST_BLOCK_OFFSET];
    let count = response[DIST_BLOCK_OFFSET + 2] as usize;
    let mut offset = DIST_BLOCK_OFFSET + 3;

    let anchors = match discriminator {
        TLV_TYPE_RNG_AN_DIST => {
            if count > MAX_ANCHORS {
                return Err(DecodeError::TooManyAnchors);
            }
            if response.len() < offset + count * DIST_RECORD_LEN {
                return Err(DecodeError::Truncated);
            }

            let mut records = Vec::new();
            for _ in 0..count {
                let record = AnchorDistance {
                    address: u64::from_le_bytes(
                        response[offset..offset + 8].try_into().unwrap(),
                    ),
                    distance: u32::from_le_bytes(
                        response[offset + 8..offset + 12].try_into().unwrap(),
                    ),
                    quality: response[offset + 12],
                };
                records.push(record).map_err(|_| DecodeError::TooManyAnchors)?;
                offset += DIST_RECORD_LEN;
            }
            AnchorRecords::Distances(records)
        }
        TLV_TYPE_RNG_AN_POS_DIST => {
            if count > MAX_ANCHORS {
                return Err(DecodeError::TooManyAnchors);
            }
            if response.len() < offset + count * DIST_POS_RECORD_LEN {
                return Err(DecodeError::Truncated);
            }

            let mut records = Vec::new();
            for _ in 0..count {
                let record = AnchorDistancePosition {
                    address: u16::from_le_bytes(
                        response[offset..offset + 2].try_into().unwrap(),
                    ),
                    distance: u32::from_le_bytes(
                        response[offset + 2..offset + 6].try_into().unwrap(),
                    ),
                    quality: response[offset + 6],
                    position: read_position(&response[offset + 7..offset + 7 + POS_VALUE_LEN]),
                };
                records.push(record).map_err(|_| DecodeError::TooManyAnchors)?;
                offset += DIST_POS_RECORD_LEN;
            }
            AnchorRecords::DistancesWithPositions(records)
        }
        other => return Err(DecodeError::UnrecognizedResponse(other)),
    };

    Ok(LocationData { position, anchors })
}

/// Reads a 13-byte position value: three little-endian i32, one quality byte
fn read_position(value: &[u8]) -> Position {
    Position {
        x: i32::from_le_bytes(value[0..4].try_into().unwrap()),
        y: i32::from_le_bytes(value[4..8].try_into().unwrap()),
        z: i32::from_le_bytes(value[8..12].try_into().unwrap()),
        quality: value[12],
    }
}

/// Entry point to the DWM1001 client
///
/// Owns the SPI bus handle and chip-select pin wired to the module. Like
/// the radio's register layer, every exchange asserts chip select, runs one
/// transfer, and releases the line; nothing is retried here.
pub struct Dwm1001<SPI, CS> {
    spi: SPI,
    chip_select: CS,
}

impl<SPI, CS> Dwm1001<SPI, CS> {
    /// Create a new instance of `Dwm1001`
    ///
    /// Requires the SPI peripheral and the chip select pin that are
    /// connected to the DWM1001.
    pub fn new(spi: SPI, chip_select: CS) -> Self {
        Dwm1001 { spi, chip_select }
    }
}

impl<SPI, CS> Dwm1001<SPI, CS>
where
    SPI: spi::Transfer<u8> + spi::Write<u8>,
    CS: OutputPin,
{
    /// Asks the module for its current location estimate
    ///
    /// Sends the location request and decodes the module's answer. The
    /// response buffer is read at full TLV size; the decoder works out how
    /// much of it is meaningful.
    pub fn location(&mut self) -> Result<LocationData, Error<SPI, CS>> {
        self.request(&[TLV_TYPE_CMD_LOC_GET, 0])?;

        let mut response = [0; TLV_MAX_SIZE];
        self.read_response(&mut response)?;

        decode_location(&response).map_err(Error::Decode)
    }

    /// Selects which module events are signalled on its interrupt line
    ///
    /// Pass [`INTR_LOC_READY`] to get an edge whenever a new location
    /// estimate is ready, which is how the tag avoids polling the module.
    pub fn set_interrupt_config(&mut self, events: u16) -> Result<(), Error<SPI, CS>> {
        self.request(&[
            TLV_TYPE_CMD_INT_CFG,
            2,
            events as u8,
            (events >> 8) as u8,
        ])?;

        // The module acknowledges with a bare status TLV.
        let mut ack = [0; STATUS_LEN];
        self.read_response(&mut ack)?;
        if ack[2] != 0 {
            return Err(Error::Decode(DecodeError::Status(ack[2])));
        }

        Ok(())
    }

    fn request(&mut self, frame: &[u8]) -> Result<(), Error<SPI, CS>> {
        self.chip_select.set_low().map_err(Error::ChipSelect)?;
        <SPI as spi::Write<u8>>::write(&mut self.spi, frame).map_err(Error::Write)?;
        self.chip_select.set_high().map_err(Error::ChipSelect)?;

        Ok(())
    }

    fn read_response(&mut self, buffer: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        self.chip_select.set_low().map_err(Error::ChipSelect)?;
        self.spi.transfer(buffer).map_err(Error::Transfer)?;
        self.chip_select.set_high().map_err(Error::ChipSelect)?;

        Ok(())
    }
}

/// An error that can occur when talking to the DWM1001
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

    /// The module's response could not be decoded
    Decode(DecodeError),
}

// We can't derive this implementation, as the compiler will complain that
// the associated error type doesn't implement `Debug`.
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
            Error::Decode(error) => write!(f, "Decode({:?})", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use embedded_hal_mock::pin::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use embedded_hal_mock::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    /// A response with a clean status and the given position block
    fn response_head(position: Option<(i32, i32, i32, u8)>) -> std::vec::Vec<u8> {
        let mut response = vec![0x40, 1, 0];
        match position {
            Some((x, y, z, quality)) => {
                response.extend_from_slice(&[TLV_TYPE_POS_XYZ, 13]);
                response.extend_from_slice(&x.to_le_bytes());
                response.extend_from_slice(&y.to_le_bytes());
                response.extend_from_slice(&z.to_le_bytes());
                response.push(quality);
            }
            None => response.extend_from_slice(&[0; POS_BLOCK_LEN]),
        }
        response
    }

    #[test]
    fn decodes_a_position_with_no_anchors() {
        let mut response = response_head(Some((100, 200, 300, 50)));
        response.extend_from_slice(&[TLV_TYPE_RNG_AN_DIST, 1, 0]);

        let location = decode_location(&response).unwrap();
        assert_eq!(
            location.position,
            Some(Position {
                x: 100,
                y: 200,
                z: 300,
                quality: 50,
            })
        );
        assert_eq!(location.anchors.len(), 0);
        assert!(location.anchors.is_empty());
    }

    #[test]
    fn decodes_distance_only_records() {
        let mut response = response_head(Some((1, 2, 3, 100)));
        response.extend_from_slice(&[TLV_TYPE_RNG_AN_DIST, 14, 1]);
        response.extend_from_slice(&0x0011_2233_4455_6677_u64.to_le_bytes());
        response.extend_from_slice(&1234_u32.to_le_bytes());
        response.push(77);

        let location = decode_location(&response).unwrap();
        match location.anchors {
            AnchorRecords::Distances(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].address, 0x0011_2233_4455_6677);
                assert_eq!(records[0].distance, 1234);
                assert_eq!(records[0].quality, 77);
            }
            other => panic!("wrong record kind: {:?}", other),
        }
    }

    #[test]
    fn decodes_two_anchors_with_positions() {
        let mut response = response_head(Some((0, 0, 0, 0)));
        response.extend_from_slice(&[TLV_TYPE_RNG_AN_POS_DIST, 41, 2]);
        for i in 0..2u8 {
            response.extend_from_slice(&(0x1000_u16 + i as u16).to_le_bytes());
            response.extend_from_slice(&(5000_u32 * (i as u32 + 1)).to_le_bytes());
            response.push(90 + i);
            response.extend_from_slice(&(-100_i32 * (i as i32 + 1)).to_le_bytes());
            response.extend_from_slice(&200_i32.to_le_bytes());
            response.extend_from_slice(&300_i32.to_le_bytes());
            response.push(60 + i);
        }

        let location = decode_location(&response).unwrap();
        match location.anchors {
            AnchorRecords::DistancesWithPositions(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[0].address, 0x1000);
                assert_eq!(records[0].distance, 5000);
                assert_eq!(records[0].quality, 90);
                assert_eq!(
                    records[0].position,
                    Position {
                        x: -100,
                        y: 200,
                        z: 300,
                        quality: 60,
                    }
                );
                assert_eq!(records[1].address, 0x1001);
                assert_eq!(records[1].distance, 10000);
                assert_eq!(records[1].quality, 91);
                assert_eq!(records[1].position.x, -200);
                assert_eq!(records[1].position.quality, 61);
            }
            other => panic!("wrong record kind: {:?}", other),
        }
    }

    #[test]
    fn rejects_a_response_truncated_inside_the_last_record() {
        let mut response = response_head(Some((0, 0, 0, 0)));
        response.extend_from_slice(&[TLV_TYPE_RNG_AN_POS_DIST, 41, 2]);
        for _ in 0..2 {
            response.extend_from_slice(&0x1000_u16.to_le_bytes());
            response.extend_from_slice(&5000_u32.to_le_bytes());
            response.push(90);
            response.extend_from_slice(&100_i32.to_le_bytes());
            response.extend_from_slice(&200_i32.to_le_bytes());
            response.extend_from_slice(&300_i32.to_le_bytes());
            response.push(60);
        }

        response.truncate(response.len() - 4);
        assert_eq!(decode_location(&response), Err(DecodeError::Truncated));
    }

    #[test]
    fn rejects_a_response_shorter_than_the_minimum() {
        let response = [0; MIN_LOC_RESPONSE_LEN - 1];
        assert_eq!(decode_location(&response), Err(DecodeError::TooShort));
    }

    #[test]
    fn rejects_an_unknown_discriminator() {
        let mut response = response_head(Some((0, 0, 0, 0)));
        response.extend_from_slice(&[0x47, 1, 0]);

        assert_eq!(
            decode_location(&response),
            Err(DecodeError::UnrecognizedResponse(0x47))
        );
    }

    #[test]
    fn rejects_a_nonzero_status() {
        let mut response = response_head(Some((0, 0, 0, 0)));
        response[2] = 2;
        response.extend_from_slice(&[TLV_TYPE_RNG_AN_DIST, 1, 0]);

        assert_eq!(decode_location(&response), Err(DecodeError::Status(2)));
    }

    #[test]
    fn rejects_a_count_beyond_the_record_capacity() {
        let mut response = response_head(Some((0, 0, 0, 0)));
        response.extend_from_slice(&[TLV_TYPE_RNG_AN_DIST, 14, 15]);
        response.extend_from_slice(&[0; 15 * DIST_RECORD_LEN]);

        assert_eq!(
            decode_location(&response),
            Err(DecodeError::TooManyAnchors)
        );
    }

    #[test]
    fn missing_position_tag_yields_no_position() {
        let mut response = response_head(None);
        response.extend_from_slice(&[TLV_TYPE_RNG_AN_DIST, 1, 0]);

        let location = decode_location(&response).unwrap();
        assert_eq!(location.position, None);
        assert_eq!(location.anchors.len(), 0);
    }

    fn cs_cycles(count: usize) -> std::vec::Vec<PinTransaction> {
        let mut transactions = std::vec::Vec::new();
        for _ in 0..count {
            transactions.push(PinTransaction::set(PinState::Low));
            transactions.push(PinTransaction::set(PinState::High));
        }
        transactions
    }

    #[test]
    fn location_requests_and_decodes_a_full_size_response() {
        let mut payload = response_head(Some((100, 200, 300, 50)));
        payload.extend_from_slice(&[TLV_TYPE_RNG_AN_DIST, 1, 0]);
        payload.resize(TLV_MAX_SIZE, 0);

        let mut spi = SpiMock::new(&[
            SpiTransaction::write(vec![TLV_TYPE_CMD_LOC_GET, 0]),
            SpiTransaction::transfer(vec![0; TLV_MAX_SIZE], payload),
        ]);
        let mut cs = PinMock::new(&cs_cycles(2));
        let mut dwm = Dwm1001::new(spi.clone(), cs.clone());

        let location = dwm.location().unwrap();
        assert_eq!(
            location.position,
            Some(Position {
                x: 100,
                y: 200,
                z: 300,
                quality: 50,
            })
        );
        assert!(location.anchors.is_empty());

        spi.done();
        cs.done();
    }

    #[test]
    fn interrupt_config_checks_the_acknowledgement() {
        let mut spi = SpiMock::new(&[
            SpiTransaction::write(vec![TLV_TYPE_CMD_INT_CFG, 2, 0x01, 0x00]),
            SpiTransaction::transfer(vec![0; 3], vec![0x40, 1, 0]),
            SpiTransaction::write(vec![TLV_TYPE_CMD_INT_CFG, 2, 0x01, 0x00]),
            SpiTransaction::transfer(vec![0; 3], vec![0x40, 1, 4]),
        ]);
        let mut cs = PinMock::new(&cs_cycles(4));
        let mut dwm = Dwm1001::new(spi.clone(), cs.clone());

        dwm.set_interrupt_config(INTR_LOC_READY).unwrap();
        assert!(matches!(
            dwm.set_interrupt_config(INTR_LOC_READY),
            Err(Error::Decode(DecodeError::Status(4)))
        ));

        spi.done();
        cs.done();
    }
}
