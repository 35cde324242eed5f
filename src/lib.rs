// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Frame-level FLAC encoding
//!
//! Given a block of PCM samples, this crate builds a single
//! bit-exact FLAC frame: a frame header, one subframe per
//! channel, byte-alignment padding and a trailing CRC-16.
//!
//! Stereo frames are tried in all four channel assignments
//! (independent, left-side, side-right and mid-side)
//! and the smallest is kept.
//!
//! # Example
//!
//! ```
//! use flac_frame::encode::{BitSink, FrameEncoder};
//! use flac_frame::subframe::SearchOptions;
//!
//! let left = [100, 200, 300, 400];
//! let right = [90, 190, 290, 390];
//!
//! let estimate = FrameEncoder::estimate(
//!     0,
//!     &[&left[..], &right[..]],
//!     16,
//!     44100,
//!     &SearchOptions::default(),
//! )
//! .unwrap();
//!
//! let bits = estimate.size();
//! let mut sink = BitSink::new(vec![]);
//! estimate
//!     .into_value()
//!     .encode(&[&left[..], &right[..]], &mut sink)
//!     .unwrap();
//!
//! assert_eq!(sink.into_inner().unwrap().len() as u64 * 8, bits);
//! ```

#![warn(missing_docs)]

pub mod crc;
pub mod decode;
pub mod encode;
pub mod stream;
pub mod subframe;

/// A possible error when encoding or decoding a frame
#[derive(Debug)]
pub enum Error {
    /// A general I/O error from the underlying stream
    Io(std::io::Error),
    /// No channels, or more than 8
    InvalidChannels,
    /// The channels of a frame differ in length
    ChannelsMismatch,
    /// Block size is not between 1 and 65536
    InvalidBlockSize,
    /// Channel length differs from the frame's block size
    BlockSizeMismatch,
    /// Bits-per-sample is not between 1 and 32
    InvalidBitsPerSample,
    /// A sample does not fit in the frame's bits-per-sample
    SampleOutOfRange,
    /// Sample offset does not fit in 36 bits
    ExcessiveSampleOffset,
    /// Sample rate code is reserved
    InvalidSampleRate,
    /// Fixed predictor order range exceeds 4
    ExcessiveFixedOrder,
    /// LPC order range exceeds 32
    ExcessiveLpcOrder,
    /// LPC coefficient precision is not between 1 and 15 bits
    InvalidLpcPrecision,
    /// Rice partition order exceeds 15
    ExcessivePartitionOrder,
    /// Frame header does not start with a sync code
    InvalidSyncCode,
    /// Frame header uses a fixed blocking strategy
    UnsupportedBlockingStrategy,
    /// Frame header's reserved bit is set
    InvalidReservedBit,
    /// Sample offset field is not a valid UTF-8-like integer
    InvalidSampleOffset,
    /// Subframe header is reserved or malformed
    InvalidSubframeHeader,
    /// Subframe's wasted bits meet or exceed its bits-per-sample
    ExcessiveWastedBits,
    /// Residual coding method is reserved
    InvalidCodingMethod,
    /// Residual partitions do not divide the block
    InvalidPartitionOrder,
    /// LPC coefficient precision field is reserved
    InvalidQlpPrecision,
    /// LPC shift is negative
    NegativeLpcShift,
    /// Frame header's CRC-8 does not match its contents
    Crc8Mismatch,
    /// Frame's CRC-16 does not match its contents
    Crc16Mismatch,
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::InvalidChannels => "channel count must be between 1 and 8".fmt(f),
            Self::ChannelsMismatch => "channels differ in length".fmt(f),
            Self::InvalidBlockSize => "block size must be between 1 and 65536".fmt(f),
            Self::BlockSizeMismatch => "channel length does not match block size".fmt(f),
            Self::InvalidBitsPerSample => "bits-per-sample must be between 1 and 32".fmt(f),
            Self::SampleOutOfRange => "sample does not fit in bits-per-sample".fmt(f),
            Self::ExcessiveSampleOffset => "sample offset must be less than 2³⁶".fmt(f),
            Self::InvalidSampleRate => "reserved sample rate".fmt(f),
            Self::ExcessiveFixedOrder => "fixed predictor order must be at most 4".fmt(f),
            Self::ExcessiveLpcOrder => "LPC order must be between 1 and 32".fmt(f),
            Self::InvalidLpcPrecision => "LPC precision must be between 1 and 15 bits".fmt(f),
            Self::ExcessivePartitionOrder => "partition order must be at most 15".fmt(f),
            Self::InvalidSyncCode => "invalid frame sync code".fmt(f),
            Self::UnsupportedBlockingStrategy => "fixed blocking strategy not supported".fmt(f),
            Self::InvalidReservedBit => "reserved frame header bit set".fmt(f),
            Self::InvalidSampleOffset => "invalid frame sample offset".fmt(f),
            Self::InvalidSubframeHeader => "invalid subframe header".fmt(f),
            Self::ExcessiveWastedBits => "excessive wasted bits in subframe".fmt(f),
            Self::InvalidCodingMethod => "reserved residual coding method".fmt(f),
            Self::InvalidPartitionOrder => "invalid residual partition order".fmt(f),
            Self::InvalidQlpPrecision => "invalid LPC coefficient precision".fmt(f),
            Self::NegativeLpcShift => "negative LPC shift".fmt(f),
            Self::Crc8Mismatch => "frame header CRC-8 mismatch".fmt(f),
            Self::Crc16Mismatch => "frame CRC-16 mismatch".fmt(f),
        }
    }
}
