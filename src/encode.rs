// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For encoding PCM samples to FLAC frames
//!
//! Encoding happens in two phases.
//! [`FrameEncoder::estimate`] decides how a block of samples
//! should be encoded and returns the exact size of the result,
//! in bits, without writing anything.
//! The caller may compare that size against other candidates
//! and, once satisfied, hand the same samples to
//! [`FrameEncoder::encode`] to write the frame itself.

use crate::Error;
use crate::crc::{Checksum, Crc8, Crc16};
use crate::stream::{ChannelAssignment, FrameMetadata, SAMPLE_OFFSET_LIMIT};
use crate::subframe::{SearchOptions, SubframeEncoder};
use arrayvec::ArrayVec;
use bitstream_io::{BigEndian, BitWrite, BitWriter};

/// The most channels a FLAC frame may hold
pub const MAX_CHANNELS: usize = 8;

/// The largest block size a FLAC frame may hold
pub const MAX_BLOCK_SIZE: usize = 65536;

/// The writer beneath a [`BitSink`]
///
/// Passes whole bytes through to the inner writer
/// while updating both frame checksums.
pub struct Registers<W> {
    writer: W,
    crc8: Crc8,
    crc16: Crc16,
    written: u64,
}

impl<W: std::io::Write> std::io::Write for Registers<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.crc8.update_all(&buf[0..written]);
        self.crc16.update_all(&buf[0..written]);
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// A big-endian bit writer with running CRC-8 and CRC-16 registers
///
/// Fields are written through the [`BitWrite`] methods
/// of the [`BitWriter`] this dereferences to.
/// Both checksums cover every byte written since
/// the most recent [`BitSink::reset_checksums`].
///
/// A sink which returns an error partway through a frame
/// holds a partial frame and should not be reused.
///
/// # Example
///
/// ```
/// use bitstream_io::BitWrite;
/// use flac_frame::encode::BitSink;
///
/// let mut sink = BitSink::new(vec![]);
/// sink.reset_checksums().unwrap();
/// sink.write::<8, u8>(0x31).unwrap();
/// assert_eq!(sink.crc8().unwrap(), 0x97);
/// assert_eq!(sink.into_inner().unwrap(), [0x31]);
/// ```
pub struct BitSink<W: std::io::Write> {
    writer: BitWriter<Registers<W>, BigEndian>,
}

impl<W: std::io::Write> BitSink<W> {
    /// Wraps writer in a new sink
    pub fn new(writer: W) -> Self {
        Self {
            writer: BitWriter::endian(
                Registers {
                    writer,
                    crc8: Crc8::default(),
                    crc16: Crc16::default(),
                    written: 0,
                },
                BigEndian,
            ),
        }
    }

    // BitWriter::aligned_writer pads to a byte boundary on its own,
    // which would alter the frame beneath its checksums
    fn registers(&mut self) -> std::io::Result<&mut Registers<W>> {
        if !self.writer.byte_aligned() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "sink is not byte-aligned",
            ));
        }
        self.writer.aligned_writer()
    }

    /// Resets both checksum registers
    ///
    /// # Errors
    ///
    /// Returns an error if the sink isn't byte-aligned.
    pub fn reset_checksums(&mut self) -> std::io::Result<()> {
        let registers = self.registers()?;
        registers.crc8 = Crc8::default();
        registers.crc16 = Crc16::default();
        Ok(())
    }

    /// Returns CRC-8 of all bytes since the last reset
    ///
    /// # Errors
    ///
    /// Returns an error if the sink isn't byte-aligned.
    pub fn crc8(&mut self) -> std::io::Result<u8> {
        Ok(self.registers()?.crc8.into())
    }

    /// Returns CRC-16 of all bytes since the last reset
    ///
    /// # Errors
    ///
    /// Returns an error if the sink isn't byte-aligned.
    pub fn crc16(&mut self) -> std::io::Result<u16> {
        Ok(self.registers()?.crc16.into())
    }

    /// Pads with 0 bits to the next whole byte, if necessary
    ///
    /// # Errors
    ///
    /// Passes along any I/O error from the underlying stream.
    pub fn byte_align(&mut self) -> std::io::Result<()> {
        self.writer.byte_align()
    }

    /// Returns total number of bytes written
    ///
    /// # Errors
    ///
    /// Returns an error if the sink isn't byte-aligned.
    pub fn bytes_written(&mut self) -> std::io::Result<u64> {
        Ok(self.registers()?.written)
    }

    /// Returns inner writer
    ///
    /// # Errors
    ///
    /// Returns an error if the sink isn't byte-aligned,
    /// since any partial byte would be lost.
    pub fn into_inner(mut self) -> std::io::Result<W> {
        self.registers()?;
        Ok(self.writer.into_writer().writer)
    }
}

impl<W: std::io::Write> std::ops::Deref for BitSink<W> {
    type Target = BitWriter<Registers<W>, BigEndian>;

    fn deref(&self) -> &Self::Target {
        &self.writer
    }
}

impl<W: std::io::Write> std::ops::DerefMut for BitSink<W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.writer
    }
}

/// The exact encoded size of some value, in bits
///
/// Estimates of headers, subframes and whole frames
/// are all summed before anything is written.
#[derive(Clone, Debug)]
pub struct SizeEstimate<T> {
    size: u64,
    value: T,
}

impl<T> SizeEstimate<T> {
    /// Pairs value with its encoded size, in bits
    #[inline]
    pub fn new(size: u64, value: T) -> Self {
        Self { size, value }
    }

    /// Returns encoded size, in bits
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns reference to estimated value
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes estimate and returns its value
    #[inline]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Consumes estimate and returns its size and value
    #[inline]
    pub fn into_parts(self) -> (u64, T) {
        (self.size, self.value)
    }

    /// Converts estimate's value while retaining its size
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SizeEstimate<U> {
        SizeEstimate {
            size: self.size,
            value: f(self.value),
        }
    }
}

// estimates compare by size alone
impl<T> PartialEq for SizeEstimate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size
    }
}

impl<T> Eq for SizeEstimate<T> {}

impl<T> PartialOrd for SizeEstimate<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for SizeEstimate<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.size.cmp(&other.size)
    }
}

/// An encoder for a single FLAC frame
///
/// Built by [`FrameEncoder::estimate`],
/// which has already chosen the channel assignment
/// and each subframe's encoding.
#[derive(Clone, Debug)]
pub struct FrameEncoder {
    metadata: FrameMetadata,
    subframes: ArrayVec<SubframeEncoder, MAX_CHANNELS>,
}

impl FrameEncoder {
    /// Determines the smallest encoding of the given channels
    ///
    /// All channels must have the same length, from 1 to 65536 samples,
    /// and every sample must fit in `sample_depth` signed bits.
    /// Stereo input is tried as independent, left-side,
    /// side-right and mid-side channels,
    /// preferring them in that order when sizes are equal.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn estimate<C: AsRef<[i32]>>(
        sample_offset: u64,
        channels: &[C],
        sample_depth: u32,
        sample_rate: u32,
        options: &SearchOptions,
    ) -> Result<SizeEstimate<Self>, Error> {
        let block_size = validate(channels, sample_depth)?;
        if sample_offset >= SAMPLE_OFFSET_LIMIT {
            return Err(Error::ExcessiveSampleOffset);
        }

        let (channel_assignment, subframes) = match channels {
            [left, right] => {
                let (assignment, pair) =
                    stereo_subframes(left.as_ref(), right.as_ref(), sample_depth, options)?;
                (assignment, pair.into_iter().collect())
            }
            channels => (
                ChannelAssignment::Independent(channels.len() as u8),
                channels
                    .iter()
                    .map(|c| SubframeEncoder::estimate(&widen(c.as_ref()), sample_depth, options))
                    .collect::<Result<ArrayVec<_, MAX_CHANNELS>, _>>()?,
            ),
        };

        let metadata = FrameMetadata {
            sample_offset,
            sample_depth,
            sample_rate,
            block_size,
            channel_assignment,
        };

        let subframes_len = subframes.iter().map(|s| s.size()).sum::<u64>();
        let header_len = metadata.header_len()? * 8;
        // padding to whole byte, then CRC-16
        let size = (header_len + subframes_len).div_ceil(8) * 8 + 16;

        Ok(SizeEstimate::new(
            size,
            Self {
                metadata,
                subframes: subframes.into_iter().map(|s| s.into_value()).collect(),
            },
        ))
    }

    /// Returns the frame's header fields
    #[inline]
    pub fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    /// Returns the frame's chosen channel assignment
    #[inline]
    pub fn channel_assignment(&self) -> ChannelAssignment {
        self.metadata.channel_assignment
    }

    /// Writes whole frame to sink
    ///
    /// `channels` must be the same samples given to
    /// [`FrameEncoder::estimate`], and the number of bits written
    /// is that estimate's size.
    ///
    /// # Errors
    ///
    /// Returns an error if the channels don't match the frame's
    /// channel count or block size, or if an I/O error occurs.
    pub fn encode<C: AsRef<[i32]>, W: std::io::Write>(
        self,
        channels: &[C],
        sink: &mut BitSink<W>,
    ) -> Result<(), Error> {
        if channels.len() != usize::from(self.metadata.channel_assignment.channel_count()) {
            return Err(Error::InvalidChannels);
        }
        if channels
            .iter()
            .any(|c| c.as_ref().len() != self.metadata.block_size as usize)
        {
            return Err(Error::BlockSizeMismatch);
        }
        assert_eq!(
            self.subframes.len(),
            channels.len(),
            "subframe count differs from channel assignment"
        );

        let start = sink.bytes_written()?;

        self.metadata.write(sink)?;

        match (self.metadata.channel_assignment, channels) {
            (ChannelAssignment::Independent(_), channels) => {
                for (subframe, channel) in self.subframes.iter().zip(channels) {
                    subframe.encode(&widen(channel.as_ref()), &mut **sink)?;
                }
            }
            (assignment, [left, right]) => {
                let (left, right) = (left.as_ref(), right.as_ref());
                let (mid, side) = mid_side(left, right);
                let [first, second] = &self.subframes[..] else {
                    unreachable!("stereo frame without two subframes")
                };

                match assignment {
                    ChannelAssignment::LeftSide => {
                        first.encode(&widen(left), &mut **sink)?;
                        second.encode(&side, &mut **sink)?;
                    }
                    ChannelAssignment::SideRight => {
                        first.encode(&side, &mut **sink)?;
                        second.encode(&widen(right), &mut **sink)?;
                    }
                    ChannelAssignment::MidSide => {
                        first.encode(&mid, &mut **sink)?;
                        second.encode(&side, &mut **sink)?;
                    }
                    ChannelAssignment::Independent(_) => unreachable!(),
                }
            }
            (assignment, _) => unreachable!("{assignment:?} assigned to non-stereo frame"),
        }

        sink.byte_align()?;
        let crc16 = sink.crc16()?;
        sink.write_from(crc16)?;

        log::debug!(
            "wrote frame at sample {} in {} bytes",
            self.metadata.sample_offset,
            sink.bytes_written()? - start
        );

        Ok(())
    }
}

/// Determines the smallest encoding of the given channels
///
/// This is equivalent to [`FrameEncoder::estimate`].
///
/// # Errors
///
/// Returns an error if any parameter is out of range.
pub fn estimate_frame<C: AsRef<[i32]>>(
    sample_offset: u64,
    channels: &[C],
    sample_depth: u32,
    sample_rate: u32,
    options: &SearchOptions,
) -> Result<SizeEstimate<FrameEncoder>, Error> {
    FrameEncoder::estimate(sample_offset, channels, sample_depth, sample_rate, options)
}

/// Encodes whole channels as consecutive frames of `block_size` samples
///
/// The final frame holds any remaining samples
/// and may be shorter than the rest.
/// Each frame is estimated independently
/// (in parallel, when the `rayon` feature is enabled)
/// and then written to the sink in order.
///
/// Returns the number of frames written.
///
/// # Errors
///
/// Returns an error if any parameter is out of range,
/// or if an I/O error occurs writing the frames.
pub fn encode_frames<C, W>(
    channels: &[C],
    block_size: usize,
    sample_depth: u32,
    sample_rate: u32,
    options: &SearchOptions,
    sink: &mut BitSink<W>,
) -> Result<u64, Error>
where
    C: AsRef<[i32]> + Sync,
    W: std::io::Write,
{
    #[cfg(feature = "rayon")]
    use rayon::prelude::*;

    if !(1..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(Error::InvalidBlockSize);
    }

    let total = match channels {
        [] => return Err(Error::InvalidChannels),
        [first, rest @ ..] => {
            let total = first.as_ref().len();
            if rest.iter().any(|c| c.as_ref().len() != total) {
                return Err(Error::ChannelsMismatch);
            }
            total
        }
    };

    if channels.len() > MAX_CHANNELS {
        return Err(Error::InvalidChannels);
    }

    let blocks = (0..total).step_by(block_size).collect::<Vec<_>>();

    let block = |start: usize| -> ArrayVec<&[i32], MAX_CHANNELS> {
        channels
            .iter()
            .map(|c| &c.as_ref()[start..total.min(start + block_size)])
            .collect()
    };

    #[cfg(feature = "rayon")]
    let blocks_iter = blocks.par_iter();
    #[cfg(not(feature = "rayon"))]
    let blocks_iter = blocks.iter();

    let frames = blocks_iter
        .map(|start| {
            FrameEncoder::estimate(
                *start as u64,
                block(*start).as_slice(),
                sample_depth,
                sample_rate,
                options,
            )
        })
        .collect::<Result<Vec<_>, Error>>()?;

    for (start, frame) in blocks.iter().zip(frames) {
        frame.into_value().encode(block(*start).as_slice(), sink)?;
    }

    Ok(blocks.len() as u64)
}

// checks channel layout and sample ranges,
// returning the frame's block size
fn validate<C: AsRef<[i32]>>(channels: &[C], sample_depth: u32) -> Result<u32, Error> {
    if !(1..=32).contains(&sample_depth) {
        return Err(Error::InvalidBitsPerSample);
    }
    if !(1..=MAX_CHANNELS).contains(&channels.len()) {
        return Err(Error::InvalidChannels);
    }

    let block_size = channels[0].as_ref().len();
    if !(1..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(Error::InvalidBlockSize);
    }
    if channels.iter().any(|c| c.as_ref().len() != block_size) {
        return Err(Error::ChannelsMismatch);
    }

    let range = (-1i64 << (sample_depth - 1))..(1i64 << (sample_depth - 1));
    if channels
        .iter()
        .flat_map(|c| c.as_ref())
        .any(|s| !range.contains(&i64::from(*s)))
    {
        return Err(Error::SampleOutOfRange);
    }

    Ok(block_size as u32)
}

fn widen(channel: &[i32]) -> Vec<i64> {
    channel.iter().map(|s| i64::from(*s)).collect()
}

// mid is a floor average and side needs one more bit
// than the channels it's derived from
fn mid_side(left: &[i32], right: &[i32]) -> (Vec<i64>, Vec<i64>) {
    left.iter()
        .zip(right)
        .map(|(l, r)| {
            let (l, r) = (i64::from(*l), i64::from(*r));
            ((l + r) >> 1, l - r)
        })
        .unzip()
}

// tries all four stereo assignments and returns the smallest,
// preferring earlier assignments when sizes are equal
fn stereo_subframes(
    left: &[i32],
    right: &[i32],
    sample_depth: u32,
    options: &SearchOptions,
) -> Result<(ChannelAssignment, [SizeEstimate<SubframeEncoder>; 2]), Error> {
    let (mid, side) = mid_side(left, right);

    let left = SubframeEncoder::estimate(&widen(left), sample_depth, options)?;
    let right = SubframeEncoder::estimate(&widen(right), sample_depth, options)?;
    let mid = SubframeEncoder::estimate(&mid, sample_depth, options)?;
    let side = SubframeEncoder::estimate(&side, sample_depth + 1, options)?;

    let independent = left.size() + right.size();
    let (assignment, size) = [
        (ChannelAssignment::LeftSide, left.size() + side.size()),
        (ChannelAssignment::SideRight, side.size() + right.size()),
        (ChannelAssignment::MidSide, mid.size() + side.size()),
    ]
    .into_iter()
    .fold(
        (ChannelAssignment::Independent(2), independent),
        |best, candidate| if candidate.1 < best.1 { candidate } else { best },
    );

    log::debug!(
        "stereo sizes independent={} left-side={} side-right={} mid-side={}, chose {:?} ({} bits)",
        independent,
        left.size() + side.size(),
        side.size() + right.size(),
        mid.size() + side.size(),
        assignment,
        size,
    );

    Ok((
        assignment,
        match assignment {
            ChannelAssignment::Independent(_) => [left, right],
            ChannelAssignment::LeftSide => [left, side],
            ChannelAssignment::SideRight => [side, right],
            ChannelAssignment::MidSide => [mid, side],
        },
    ))
}

#[test]
fn test_mid_side() {
    let (mid, side) = mid_side(&[100, 200, 300, 400], &[90, 190, 290, 390]);
    assert_eq!(mid, [95, 195, 295, 395]);
    assert_eq!(side, [10, 10, 10, 10]);

    // mid rounds toward negative infinity
    let (mid, side) = mid_side(&[-3, 3, i32::MIN, i32::MAX], &[0, 0, i32::MAX, i32::MIN]);
    assert_eq!(mid, [-2, 1, -1, -1]);
    assert_eq!(side, [-3, 3, -(1 << 32) + 1, (1 << 32) - 1]);
}

#[test]
fn test_size_estimate() {
    let estimate = SizeEstimate::new(42, "value");
    assert_eq!(estimate.size(), 42);
    assert_eq!(*estimate.value(), "value");
    assert!(estimate < SizeEstimate::new(43, "other"));
    assert!(estimate == SizeEstimate::new(42, "other"));
    let estimate = estimate.map(str::len);
    assert_eq!(estimate.into_parts(), (42, 5));
}

#[test]
fn test_sink_alignment() {
    let mut sink = BitSink::new(vec![]);
    sink.write::<3, u8>(0b101).unwrap();
    assert!(sink.reset_checksums().is_err());
    assert!(sink.crc16().is_err());
    sink.byte_align().unwrap();
    assert!(sink.crc16().is_ok());
    assert_eq!(sink.bytes_written().unwrap(), 1);
    assert_eq!(sink.into_inner().unwrap(), [0b101_00000]);
}

#[test]
fn test_unaligned_sink_unchanged() {
    // a refused checksum read must not pad the stream
    let mut sink = BitSink::new(vec![]);
    sink.write::<3, u8>(0b101).unwrap();
    assert!(sink.crc8().is_err());
    assert!(sink.crc16().is_err());
    assert!(sink.bytes_written().is_err());
    sink.write::<5, u8>(0b11111).unwrap();
    assert_eq!(sink.bytes_written().unwrap(), 1);
    assert_eq!(sink.into_inner().unwrap(), [0xBF]);

    let sink = {
        let mut sink = BitSink::new(vec![]);
        sink.write_bit(true).unwrap();
        sink
    };
    assert!(sink.into_inner().is_err());
}

#[test]
fn test_encode_unaligned_sink() {
    let channels = [[1i32, 2, 3, 4]];
    let frame = FrameEncoder::estimate(0, &channels, 16, 44100, &SearchOptions::default())
        .unwrap()
        .into_value();

    let mut sink = BitSink::new(vec![]);
    sink.write::<3, u8>(0b101).unwrap();
    assert!(matches!(frame.encode(&channels, &mut sink), Err(Error::Io(_))));
    sink.write::<5, u8>(0).unwrap();
    assert_eq!(sink.into_inner().unwrap(), [0b101_00000]);
}

#[test]
fn test_validation() {
    let options = SearchOptions::default();
    let channel = [0i32; 16];

    assert!(matches!(
        FrameEncoder::estimate::<&[i32]>(0, &[], 16, 44100, &options),
        Err(Error::InvalidChannels)
    ));
    assert!(matches!(
        FrameEncoder::estimate(0, &[&channel[..]; 9], 16, 44100, &options),
        Err(Error::InvalidChannels)
    ));
    assert!(matches!(
        FrameEncoder::estimate(0, &[&channel[..], &channel[1..]], 16, 44100, &options),
        Err(Error::ChannelsMismatch)
    ));
    assert!(matches!(
        FrameEncoder::estimate(0, &[&channel[0..0]], 16, 44100, &options),
        Err(Error::InvalidBlockSize)
    ));
    assert!(matches!(
        FrameEncoder::estimate(0, &[vec![0; MAX_BLOCK_SIZE + 1]], 16, 44100, &options),
        Err(Error::InvalidBlockSize)
    ));
    assert!(matches!(
        FrameEncoder::estimate(0, &[&channel[..]], 0, 44100, &options),
        Err(Error::InvalidBitsPerSample)
    ));
    assert!(matches!(
        FrameEncoder::estimate(0, &[&channel[..]], 33, 44100, &options),
        Err(Error::InvalidBitsPerSample)
    ));
    assert!(matches!(
        FrameEncoder::estimate(0, &[&[128][..]], 8, 44100, &options),
        Err(Error::SampleOutOfRange)
    ));
    assert!(matches!(
        FrameEncoder::estimate(0, &[&[-129][..]], 8, 44100, &options),
        Err(Error::SampleOutOfRange)
    ));
    assert!(FrameEncoder::estimate(0, &[&[-128, 127][..]], 8, 44100, &options).is_ok());
    assert!(matches!(
        FrameEncoder::estimate(1 << 36, &[&channel[..]], 16, 44100, &options),
        Err(Error::ExcessiveSampleOffset)
    ));
    assert!(FrameEncoder::estimate((1 << 36) - 1, &[&channel[..]], 16, 44100, &options).is_ok());
}
