// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling FLAC frame headers
//!
//! | Bits   | Field | Meaning |
//! |-------:|------:|---------|
//! | 14     | sync code | always `0b11111111111110` |
//! | 1      | reserved | always 0 |
//! | 1      | blocking strategy | always 1 (variable block size) |
//! | 4      | block size | [`block_size_code`] |
//! | 4      | sample rate | [`sample_rate_code`] |
//! | 4      | channel assignment | [`ChannelAssignment`] |
//! | 3      | bits-per-sample | [`sample_depth_code`] |
//! | 1      | reserved | always 0 |
//! | 8-56   | sample offset | UTF-8-like integer |
//! | 0/8/16 | block size | uncommon block size, minus 1 |
//! | 0/8/16 | sample rate | uncommon sample rate |
//! | 8      | CRC-8 | of all preceding header bytes |

use crate::Error;
use crate::crc::{Checksum, Crc8, CrcReader};
use crate::encode::BitSink;
use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, FromBitStreamWith, ToBitStream};

const SYNC_CODE: u16 = 0b11111111111110;

/// How a frame's subframes map to output channels
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelAssignment {
    /// 1 to 8 channels, each stored as-is
    Independent(u8),
    /// Left channel, then side channel
    LeftSide,
    /// Side channel, then right channel
    SideRight,
    /// Mid channel, then side channel
    MidSide,
}

impl ChannelAssignment {
    /// Returns 4-bit channel assignment code
    ///
    /// # Panics
    ///
    /// Panics if an independent assignment isn't 1 to 8 channels,
    /// which the frame encoder never builds.
    pub fn code(&self) -> u8 {
        match self {
            Self::Independent(c @ 1..=8) => c - 1,
            Self::Independent(c) => unreachable!("invalid independent channel count {c}"),
            Self::LeftSide => 0b1000,
            Self::SideRight => 0b1001,
            Self::MidSide => 0b1010,
        }
    }

    /// Returns number of subframes following the header
    pub fn channel_count(&self) -> u8 {
        match self {
            Self::Independent(c) => *c,
            Self::LeftSide | Self::SideRight | Self::MidSide => 2,
        }
    }
}

impl TryFrom<u8> for ChannelAssignment {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            c @ 0b0000..=0b0111 => Ok(Self::Independent(c + 1)),
            0b1000 => Ok(Self::LeftSide),
            0b1001 => Ok(Self::SideRight),
            0b1010 => Ok(Self::MidSide),
            _ => Err(Error::InvalidChannels),
        }
    }
}

/// A header field's 4-bit code and any value stored
/// after the sample offset
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HeaderCode {
    /// Value is implied by the code alone
    Code(u8),
    /// Code is followed by an 8-bit value
    Byte(u8, u8),
    /// Code is followed by a 16-bit value
    Word(u8, u16),
}

impl HeaderCode {
    /// Returns the 4-bit code itself
    pub fn code(&self) -> u8 {
        match self {
            Self::Code(c) | Self::Byte(c, _) | Self::Word(c, _) => *c,
        }
    }

    fn write_value<W: BitWrite + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        match self {
            Self::Code(_) => Ok(()),
            Self::Byte(_, v) => w.write::<8, u8>(*v),
            Self::Word(_, v) => w.write::<16, u16>(*v),
        }
    }
}

/// Returns the header code of the given block size
///
/// ```
/// use flac_frame::stream::{block_size_code, HeaderCode};
///
/// assert_eq!(block_size_code(4096).unwrap(), HeaderCode::Code(12));
/// assert_eq!(block_size_code(100).unwrap(), HeaderCode::Byte(6, 99));
/// assert_eq!(block_size_code(1000).unwrap(), HeaderCode::Word(7, 999));
/// assert!(block_size_code(65537).is_err());
/// ```
///
/// # Errors
///
/// Returns an error if the block size isn't between 1 and 65536.
pub fn block_size_code(block_size: u32) -> Result<HeaderCode, Error> {
    match block_size {
        192 => Ok(HeaderCode::Code(1)),
        576 => Ok(HeaderCode::Code(2)),
        1152 => Ok(HeaderCode::Code(3)),
        2304 => Ok(HeaderCode::Code(4)),
        4608 => Ok(HeaderCode::Code(5)),
        256 => Ok(HeaderCode::Code(8)),
        512 => Ok(HeaderCode::Code(9)),
        1024 => Ok(HeaderCode::Code(10)),
        2048 => Ok(HeaderCode::Code(11)),
        4096 => Ok(HeaderCode::Code(12)),
        8192 => Ok(HeaderCode::Code(13)),
        16384 => Ok(HeaderCode::Code(14)),
        32768 => Ok(HeaderCode::Code(15)),
        1..=256 => Ok(HeaderCode::Byte(6, (block_size - 1) as u8)),
        1..=65536 => Ok(HeaderCode::Word(7, (block_size - 1) as u16)),
        _ => Err(Error::InvalidBlockSize),
    }
}

/// Returns the header code of the given sample rate
///
/// Rates with no code of their own and too large
/// for any literal field are stored as code 0,
/// which defers to the stream's sample rate.
///
/// ```
/// use flac_frame::stream::{sample_rate_code, HeaderCode};
///
/// assert_eq!(sample_rate_code(44100), HeaderCode::Code(9));
/// assert_eq!(sample_rate_code(200), HeaderCode::Byte(12, 200));
/// assert_eq!(sample_rate_code(11025), HeaderCode::Word(13, 11025));
/// assert_eq!(sample_rate_code(352800), HeaderCode::Word(14, 35280));
/// assert_eq!(sample_rate_code(384001), HeaderCode::Code(0));
/// ```
pub fn sample_rate_code(sample_rate: u32) -> HeaderCode {
    match sample_rate {
        88200 => HeaderCode::Code(1),
        176400 => HeaderCode::Code(2),
        192000 => HeaderCode::Code(3),
        8000 => HeaderCode::Code(4),
        16000 => HeaderCode::Code(5),
        22050 => HeaderCode::Code(6),
        24000 => HeaderCode::Code(7),
        32000 => HeaderCode::Code(8),
        44100 => HeaderCode::Code(9),
        48000 => HeaderCode::Code(10),
        96000 => HeaderCode::Code(11),
        0..256 => HeaderCode::Byte(12, sample_rate as u8),
        0..65536 => HeaderCode::Word(13, sample_rate as u16),
        0..655360 if sample_rate % 10 == 0 => HeaderCode::Word(14, (sample_rate / 10) as u16),
        _ => HeaderCode::Code(0),
    }
}

/// Returns the 3-bit header code of the given bits-per-sample
///
/// Depths without a code of their own are stored as code 0,
/// which defers to the stream's bits-per-sample.
///
/// # Errors
///
/// Returns an error if bits-per-sample isn't between 1 and 32.
pub fn sample_depth_code(bits_per_sample: u32) -> Result<u8, Error> {
    match bits_per_sample {
        8 => Ok(0b001),
        12 => Ok(0b010),
        16 => Ok(0b100),
        20 => Ok(0b101),
        24 => Ok(0b110),
        1..=32 => Ok(0b000),
        _ => Err(Error::InvalidBitsPerSample),
    }
}

/// Sample offsets must be less than this (a 36 bit value)
pub const SAMPLE_OFFSET_LIMIT: u64 = 1 << 36;

/// Writes value as a UTF-8-like integer of 1 to 7 bytes
///
/// ```
/// use bitstream_io::{BigEndian, BitWriter};
/// use flac_frame::stream::write_utf8;
///
/// let mut w = BitWriter::endian(vec![], BigEndian);
/// write_utf8(&mut w, 0x7F).unwrap();
/// write_utf8(&mut w, 0x80).unwrap();
/// assert_eq!(w.into_writer(), vec![0x7F, 0xC2, 0x80]);
/// ```
///
/// # Errors
///
/// Returns an error if the value is 2³⁶ or larger,
/// or if an I/O error occurs writing the value.
pub fn write_utf8<W: BitWrite + ?Sized>(w: &mut W, value: u64) -> Result<(), Error> {
    match value {
        0..0x80 => w.write::<8, u8>(value as u8)?,
        0x80..SAMPLE_OFFSET_LIMIT => {
            let bits = u64::BITS - value.leading_zeros();
            let continuation = (bits - 2) / 5;
            w.write::<8, u8>(
                (0xFF80u32 >> continuation) as u8 | (value >> (continuation * 6)) as u8,
            )?;
            for i in (0..continuation).rev() {
                w.write::<8, u8>(0b10_000000 | ((value >> (i * 6)) & 0b111111) as u8)?;
            }
        }
        _ => return Err(Error::ExcessiveSampleOffset),
    }
    Ok(())
}

/// Reads a UTF-8-like integer of 1 to 7 bytes
///
/// # Errors
///
/// Returns an error if the value is improperly encoded,
/// or if an I/O error occurs reading the value.
pub fn read_utf8<R: BitRead + ?Sized>(r: &mut R) -> Result<u64, Error> {
    match r.read_unary::<0>()? {
        0 => Ok(r.read::<7, u64>()?),
        bytes @ 2..=7 => {
            let mut value = match bytes {
                7 => 0,
                bytes => r.read_var::<u64>(7 - bytes)?,
            };
            for _ in 1..bytes {
                match r.read::<2, u8>()? {
                    0b10 => {
                        value = value << 6 | r.read::<6, u64>()?;
                    }
                    _ => return Err(Error::InvalidSampleOffset),
                }
            }
            Ok(value)
        }
        _ => Err(Error::InvalidSampleOffset),
    }
}

/// Stream-level values which frame headers may defer to
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StreamDefaults {
    /// Sample rate, in Hz
    pub sample_rate: u32,
    /// Bits-per-sample, from 1 to 32
    pub sample_depth: u32,
}

/// A FLAC frame header
///
/// # Example
///
/// ```
/// use flac_frame::encode::BitSink;
/// use flac_frame::stream::{ChannelAssignment, FrameMetadata, StreamDefaults};
///
/// let metadata = FrameMetadata {
///     sample_offset: 0,
///     sample_depth: 16,
///     sample_rate: 44100,
///     block_size: 4096,
///     channel_assignment: ChannelAssignment::Independent(2),
/// };
///
/// let mut sink = BitSink::new(vec![]);
/// metadata.write(&mut sink).unwrap();
/// let bytes = sink.into_inner().unwrap();
/// assert_eq!(bytes, [0xFF, 0xF9, 0xC9, 0x18, 0x00, 0xD4]);
///
/// let defaults = StreamDefaults { sample_rate: 44100, sample_depth: 16 };
/// assert_eq!(FrameMetadata::read(bytes.as_slice(), &defaults).unwrap(), metadata);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameMetadata {
    /// Position of frame's first sample in stream
    pub sample_offset: u64,
    /// Bits-per-sample, from 1 to 32
    pub sample_depth: u32,
    /// Sample rate, in Hz
    pub sample_rate: u32,
    /// Samples per channel, from 1 to 65536
    pub block_size: u32,
    /// Layout of the frame's subframes
    pub channel_assignment: ChannelAssignment,
}

impl FrameMetadata {
    /// Writes whole frame header, including its CRC-8
    ///
    /// The sink's checksums are reset beforehand,
    /// so its CRC-16 covers the frame from its header onward.
    ///
    /// # Errors
    ///
    /// Returns an error if any header field is out of range,
    /// the sink isn't byte-aligned, or an I/O error occurs.
    pub fn write<W: std::io::Write>(&self, sink: &mut BitSink<W>) -> Result<(), Error> {
        sink.reset_checksums()?;
        sink.build(self)?;
        let crc8 = sink.crc8()?;
        sink.write_from(crc8)?;
        Ok(())
    }

    /// Returns length of whole frame header in bytes
    ///
    /// # Errors
    ///
    /// Returns an error if any header field is out of range.
    pub fn header_len(&self) -> Result<u64, Error> {
        let mut sink = BitSink::new(std::io::sink());
        self.write(&mut sink)?;
        Ok(sink.bytes_written()?)
    }

    /// Reads whole frame header and verifies its CRC-8
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid,
    /// its CRC-8 doesn't match, or an I/O error occurs.
    pub fn read<R: std::io::Read>(reader: R, defaults: &StreamDefaults) -> Result<Self, Error> {
        use std::io::Read;

        let mut crc8: CrcReader<_, Crc8> = CrcReader::new(reader);
        let metadata: Self = BitReader::endian(crc8.by_ref(), BigEndian).parse_with(defaults)?;
        // fields always end on a byte boundary
        crc8.read_exact(&mut [0; 1])?;

        match crc8.into_checksum().valid() {
            true => Ok(metadata),
            false => Err(Error::Crc8Mismatch),
        }
    }
}

impl ToBitStream for FrameMetadata {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        let block_size = block_size_code(self.block_size)?;
        let sample_rate = sample_rate_code(self.sample_rate);

        w.write::<14, u16>(SYNC_CODE)?;
        w.write_bit(false)?;
        w.write_bit(true)?;
        w.write::<4, u8>(block_size.code())?;
        w.write::<4, u8>(sample_rate.code())?;
        w.write::<4, u8>(self.channel_assignment.code())?;
        w.write::<3, u8>(sample_depth_code(self.sample_depth)?)?;
        w.write_bit(false)?;
        write_utf8(w, self.sample_offset)?;
        block_size.write_value(w)?;
        sample_rate.write_value(w)?;
        Ok(())
    }
}

impl FromBitStreamWith<'_> for FrameMetadata {
    type Error = Error;
    type Context = StreamDefaults;

    fn from_reader<R: BitRead + ?Sized>(
        r: &mut R,
        defaults: &StreamDefaults,
    ) -> Result<Self, Self::Error> {
        if r.read::<14, u16>()? != SYNC_CODE {
            return Err(Error::InvalidSyncCode);
        }
        if r.read_bit()? {
            return Err(Error::InvalidReservedBit);
        }
        if !r.read_bit()? {
            return Err(Error::UnsupportedBlockingStrategy);
        }
        let encoded_block_size = r.read::<4, u8>()?;
        let encoded_sample_rate = r.read::<4, u8>()?;
        let channel_assignment = ChannelAssignment::try_from(r.read::<4, u8>()?)?;
        let encoded_bps = r.read::<3, u8>()?;
        if r.read_bit()? {
            return Err(Error::InvalidReservedBit);
        }
        let sample_offset = read_utf8(r)?;

        Ok(Self {
            sample_offset,
            block_size: match encoded_block_size {
                0b0000 => return Err(Error::InvalidBlockSize),
                0b0001 => 192,
                v @ 0b0010..=0b0101 => 576 << (v - 2),
                0b0110 => u32::from(r.read::<8, u8>()?) + 1,
                0b0111 => u32::from(r.read::<16, u16>()?) + 1,
                v @ 0b1000..=0b1111 => 1 << v,
                _ => unreachable!(), // 4-bit field
            },
            sample_rate: match encoded_sample_rate {
                0b0000 => defaults.sample_rate,
                0b0001 => 88200,
                0b0010 => 176400,
                0b0011 => 192000,
                0b0100 => 8000,
                0b0101 => 16000,
                0b0110 => 22050,
                0b0111 => 24000,
                0b1000 => 32000,
                0b1001 => 44100,
                0b1010 => 48000,
                0b1011 => 96000,
                0b1100 => r.read::<8, u32>()?,
                0b1101 => r.read::<16, u32>()?,
                0b1110 => r.read::<16, u32>()? * 10,
                0b1111 => return Err(Error::InvalidSampleRate),
                _ => unreachable!(), // 4-bit field
            },
            channel_assignment,
            sample_depth: match encoded_bps {
                0b000 => defaults.sample_depth,
                0b001 => 8,
                0b010 => 12,
                0b011 => return Err(Error::InvalidBitsPerSample),
                0b100 => 16,
                0b101 => 20,
                0b110 => 24,
                0b111 => 32,
                _ => unreachable!(), // 3-bit field
            },
        })
    }
}

#[cfg(test)]
fn utf8_bytes(value: u64) -> Result<Vec<u8>, Error> {
    use bitstream_io::BitWriter;

    let mut w = BitWriter::endian(vec![], BigEndian);
    write_utf8(&mut w, value)?;
    Ok(w.into_writer())
}

#[test]
fn test_utf8_lengths() {
    // (largest value, encoded length)
    for (max, len) in [
        ((1 << 7) - 1, 1),
        ((1 << 11) - 1, 2),
        ((1 << 16) - 1, 3),
        ((1 << 21) - 1, 4),
        ((1 << 26) - 1, 5),
        ((1 << 31) - 1, 6),
        ((1 << 36) - 1, 7),
    ] {
        assert_eq!(utf8_bytes(max).unwrap().len(), len);
        if len < 7 {
            assert_eq!(utf8_bytes(max + 1).unwrap().len(), len + 1);
        }
    }
}

#[test]
fn test_utf8_bytes() {
    assert_eq!(utf8_bytes(0).unwrap(), [0x00]);
    assert_eq!(utf8_bytes(0x7FF).unwrap(), [0xDF, 0xBF]);
    assert_eq!(utf8_bytes(0x800).unwrap(), [0xE0, 0xA0, 0x80]);
    assert_eq!(
        utf8_bytes((1 << 36) - 1).unwrap(),
        [0xFE, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF]
    );
    assert!(matches!(
        utf8_bytes(1 << 36),
        Err(Error::ExcessiveSampleOffset)
    ));
}

#[test]
fn test_utf8_round_trip() {
    fn round_trip(value: u64) {
        let bytes = utf8_bytes(value).unwrap();
        let mut r = BitReader::endian(bytes.as_slice(), BigEndian);
        assert_eq!(read_utf8(&mut r).unwrap(), value);
        assert!(r.read_bit().is_err());
    }

    (0..0x1_0000).for_each(round_trip);
    (0..36).for_each(|bit| {
        round_trip(1 << bit);
        round_trip((1 << bit) - 1);
        round_trip((1 << bit) | 1);
    });
    for _ in 0..10000 {
        round_trip(fastrand::u64(0..SAMPLE_OFFSET_LIMIT));
    }
}

#[test]
fn test_invalid_utf8() {
    for bytes in [&[0x80][..], &[0xFF, 0x80], &[0xC2, 0x00], &[0xE0, 0x80, 0xC0]] {
        let mut r = BitReader::endian(bytes, BigEndian);
        assert!(read_utf8(&mut r).is_err());
    }
}

#[test]
fn test_channel_assignment_codes() {
    for code in 0..=10 {
        assert_eq!(ChannelAssignment::try_from(code).unwrap().code(), code);
    }
    for code in 11..=15 {
        assert!(ChannelAssignment::try_from(code).is_err());
    }
}
