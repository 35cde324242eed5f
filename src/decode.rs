// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For reading encoded frames back to PCM samples
//!
//! This only handles individual frames with
//! a variable blocking strategy, not whole FLAC files.

use crate::Error;
use crate::stream::{ChannelAssignment, FrameMetadata, StreamDefaults};
use bitstream_io::BitRead;

/// A frame's header and its decoded channels
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedFrame {
    /// The frame's header
    pub metadata: FrameMetadata,
    /// One set of samples per channel, in channel order
    pub channels: Vec<Vec<i32>>,
}

/// Reads a whole FLAC frame
///
/// # Errors
///
/// Returns an error if an I/O error occurs when reading
/// the stream, if the frame data is invalid,
/// or if either of its checksums don't match.
///
/// # Example
///
/// ```
/// use flac_frame::decode::read_frame;
/// use flac_frame::encode::{BitSink, FrameEncoder};
/// use flac_frame::stream::StreamDefaults;
/// use flac_frame::subframe::SearchOptions;
///
/// let channels = [vec![1, 2, 3, 4], vec![4, 3, 2, 1], vec![0, 0, 0, 0]];
///
/// let mut sink = BitSink::new(vec![]);
/// FrameEncoder::estimate(0, &channels, 8, 8000, &SearchOptions::default())
///     .unwrap()
///     .into_value()
///     .encode(&channels, &mut sink)
///     .unwrap();
/// let bytes = sink.into_inner().unwrap();
///
/// let defaults = StreamDefaults { sample_rate: 8000, sample_depth: 8 };
/// let frame = read_frame(bytes.as_slice(), &defaults).unwrap();
/// assert_eq!(frame.channels, channels);
/// ```
pub fn read_frame<R: std::io::Read>(
    reader: R,
    defaults: &StreamDefaults,
) -> Result<DecodedFrame, Error> {
    use crate::crc::{Checksum, Crc16, CrcReader};
    use bitstream_io::{BigEndian, BitReader};
    use std::io::Read;

    let mut crc16_reader: CrcReader<_, Crc16> = CrcReader::new(reader);
    let metadata = FrameMetadata::read(crc16_reader.by_ref(), defaults)?;
    let block_size = metadata.block_size as usize;
    let bps = metadata.sample_depth;

    let mut reader = BitReader::endian(crc16_reader.by_ref(), BigEndian);

    let channels = match metadata.channel_assignment {
        ChannelAssignment::Independent(total_channels) => (0..total_channels)
            .map(|_| read_subframe(&mut reader, block_size, bps))
            .collect::<Result<Vec<_>, _>>()?,
        ChannelAssignment::LeftSide => {
            let left = read_subframe(&mut reader, block_size, bps)?;
            let side = read_subframe(&mut reader, block_size, bps + 1)?;
            let right = left
                .iter()
                .zip(&side)
                .map(|(l, s)| l.wrapping_sub(*s))
                .collect();
            vec![left, right]
        }
        ChannelAssignment::SideRight => {
            let side = read_subframe(&mut reader, block_size, bps + 1)?;
            let right = read_subframe(&mut reader, block_size, bps)?;
            let left = side
                .iter()
                .zip(&right)
                .map(|(s, r)| s.wrapping_add(*r))
                .collect();
            vec![left, right]
        }
        ChannelAssignment::MidSide => {
            let mid = read_subframe(&mut reader, block_size, bps)?;
            let side = read_subframe(&mut reader, block_size, bps + 1)?;
            let (left, right) = mid
                .iter()
                .zip(&side)
                .map(|(m, s)| {
                    let sum = m.wrapping_shl(1) | (s & 1);
                    (sum.wrapping_add(*s) >> 1, sum.wrapping_sub(*s) >> 1)
                })
                .unzip();
            vec![left, right]
        }
    };

    reader.byte_align();
    reader.skip(16)?; // CRC-16 checksum
    drop(reader);

    if !crc16_reader.into_checksum().valid() {
        return Err(Error::Crc16Mismatch);
    }

    Ok(DecodedFrame {
        metadata,
        channels: channels
            .into_iter()
            .map(|channel| {
                channel
                    .into_iter()
                    .map(|s| i32::try_from(s).map_err(|_| Error::SampleOutOfRange))
                    .collect()
            })
            .collect::<Result<_, _>>()?,
    })
}

fn read_subframe<R: BitRead + ?Sized>(
    reader: &mut R,
    block_size: usize,
    bits_per_sample: u32,
) -> Result<Vec<i64>, Error> {
    use crate::subframe::FIXED_COEFFICIENTS;

    if reader.read_bit()? {
        return Err(Error::InvalidSubframeHeader);
    }
    let type_code = reader.read::<6, u8>()?;
    let wasted_bps = match reader.read_bit()? {
        false => 0,
        true => reader.read_unary::<1>()? + 1,
    };

    let effective_bps = bits_per_sample
        .checked_sub(wasted_bps)
        .filter(|bps| *bps > 0)
        .ok_or(Error::ExcessiveWastedBits)?;

    let mut samples = match type_code {
        0b000000 => vec![reader.read_var::<i64>(effective_bps)?; block_size],
        0b000001 => (0..block_size)
            .map(|_| reader.read_var::<i64>(effective_bps))
            .collect::<Result<_, _>>()?,
        v @ 0b001000..=0b001100 => {
            let order = usize::from(v & 0b111);
            let warm_up = read_warm_up(reader, block_size, order, effective_bps)?;
            let residuals = read_residuals(reader, block_size, order)?;
            restore(warm_up, residuals, FIXED_COEFFICIENTS[order], 0)
        }
        v @ 0b100000..=0b111111 => {
            let order = usize::from(v & 0b11111) + 1;
            let warm_up = read_warm_up(reader, block_size, order, effective_bps)?;
            let precision = match reader.read::<4, u32>()? {
                0b1111 => return Err(Error::InvalidQlpPrecision),
                p => p + 1,
            };
            let shift = u32::try_from(reader.read::<5, i32>()?)
                .map_err(|_| Error::NegativeLpcShift)?;
            let coefficients = (0..order)
                .map(|_| reader.read_var::<i32>(precision).map(i64::from))
                .collect::<Result<Vec<_>, _>>()?;
            let residuals = read_residuals(reader, block_size, order)?;
            restore(warm_up, residuals, &coefficients, shift)
        }
        _ => return Err(Error::InvalidSubframeHeader),
    };

    if wasted_bps > 0 {
        samples.iter_mut().for_each(|s| *s <<= wasted_bps);
    }

    Ok(samples)
}

fn read_warm_up<R: BitRead + ?Sized>(
    reader: &mut R,
    block_size: usize,
    order: usize,
    bits_per_sample: u32,
) -> Result<Vec<i64>, Error> {
    if order > block_size {
        return Err(Error::InvalidSubframeHeader);
    }
    (0..order)
        .map(|_| reader.read_var(bits_per_sample).map_err(Error::Io))
        .collect()
}

fn read_residuals<R: BitRead + ?Sized>(
    reader: &mut R,
    block_size: usize,
    predictor_order: usize,
) -> Result<Vec<i64>, Error> {
    let (parameter_bits, escape) = match reader.read::<2, u8>()? {
        0 => (4, 0b1111),
        1 => (5, 0b11111),
        _ => return Err(Error::InvalidCodingMethod),
    };
    let partition_order = reader.read::<4, u32>()?;
    let partition_len = block_size >> partition_order;

    if block_size % (1 << partition_order) != 0 || partition_len < predictor_order {
        return Err(Error::InvalidPartitionOrder);
    }

    let mut residuals = Vec::with_capacity(block_size - predictor_order);

    for partition in 0..1usize << partition_order {
        let count = match partition {
            0 => partition_len - predictor_order,
            _ => partition_len,
        };

        match reader.read_var::<u32>(parameter_bits)? {
            p if p == escape => match reader.read::<5, u32>()? {
                0 => residuals.extend(std::iter::repeat_n(0, count)),
                bits => {
                    for _ in 0..count {
                        residuals.push(reader.read_var::<i64>(bits)?);
                    }
                }
            },
            parameter => {
                for _ in 0..count {
                    let msb = u64::from(reader.read_unary::<1>()?);
                    let lsb = match parameter {
                        0 => 0,
                        p => reader.read_var::<u64>(p)?,
                    };
                    let folded = (msb << parameter) | lsb;
                    residuals.push((folded >> 1) as i64 ^ -((folded & 1) as i64));
                }
            }
        }
    }

    Ok(residuals)
}

// corrupt frames may overflow, which the CRC-16 will catch
fn restore(
    mut samples: Vec<i64>,
    residuals: Vec<i64>,
    coefficients: &[i64],
    shift: u32,
) -> Vec<i64> {
    let order = coefficients.len();
    samples.reserve(residuals.len());
    for residual in residuals {
        let prediction = coefficients
            .iter()
            .zip(samples[samples.len() - order..].iter().rev())
            .fold(0i64, |acc, (c, s)| acc.wrapping_add(c.wrapping_mul(*s)));
        samples.push((prediction >> shift).wrapping_add(residual));
    }
    samples
}

#[cfg(test)]
const LEFT_SIDE_FRAME: [u8; 16] = [
    0xFF, 0xF9, 0x69, 0x88, 0x00, 0x00, 0x74, 0x00, 0x63, 0xF4, 0x00, 0x1D, 0xA2, 0x00, 0x22, 0xA9,
];

#[test]
fn test_read_left_side() {
    let defaults = StreamDefaults {
        sample_rate: 44100,
        sample_depth: 16,
    };
    let frame = read_frame(LEFT_SIDE_FRAME.as_slice(), &defaults).unwrap();
    assert_eq!(
        frame.metadata,
        FrameMetadata {
            sample_offset: 0,
            sample_depth: 16,
            sample_rate: 44100,
            block_size: 1,
            channel_assignment: ChannelAssignment::LeftSide,
        }
    );
    assert_eq!(frame.channels, [vec![25588], vec![10416]]);
}

#[test]
fn test_read_corrupted() {
    let defaults = StreamDefaults {
        sample_rate: 44100,
        sample_depth: 16,
    };

    let mut frame = LEFT_SIDE_FRAME;
    frame[8] ^= 0x01;
    assert!(matches!(
        read_frame(frame.as_slice(), &defaults),
        Err(Error::Crc16Mismatch)
    ));

    let mut frame = LEFT_SIDE_FRAME;
    frame[4] ^= 0x01;
    assert!(matches!(
        read_frame(frame.as_slice(), &defaults),
        Err(Error::Crc8Mismatch)
    ));

    assert!(matches!(
        read_frame(&LEFT_SIDE_FRAME[0..12], &defaults),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_restore() {
    // second-order fixed predictor
    assert_eq!(
        restore(vec![1, 4], vec![2, 2, 2, 2], &[2, -1], 0),
        [1, 4, 9, 16, 25, 36]
    );
    // shifted prediction
    assert_eq!(restore(vec![8], vec![1, 1], &[3], 1), [8, 13, 20]);
}

#[test]
fn test_read_escaped_residuals() {
    use bitstream_io::{BigEndian, BitReader, BitWrite, BitWriter};

    let mut w = BitWriter::endian(vec![], BigEndian);
    w.write::<2, u8>(0).unwrap(); // 4-bit parameters
    w.write::<4, u8>(1).unwrap(); // two partitions
    w.write::<4, u8>(0b1111).unwrap(); // escaped
    w.write::<5, u8>(4).unwrap();
    w.write::<4, i8>(-3).unwrap();
    w.write::<4, u8>(0b1111).unwrap(); // escaped with no bits
    w.write::<5, u8>(0).unwrap();
    w.byte_align().unwrap();

    let bytes = w.into_writer();
    let mut r = BitReader::endian(bytes.as_slice(), BigEndian);
    // block of 4 with an order-1 predictor
    assert_eq!(read_residuals(&mut r, 4, 1).unwrap(), [-3, 0, 0]);
}
