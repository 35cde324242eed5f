// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_frame::encode::{BitSink, FrameEncoder};
use flac_frame::stream::{
    ChannelAssignment, FrameMetadata, HeaderCode, SAMPLE_OFFSET_LIMIT, StreamDefaults,
    block_size_code, read_utf8, sample_rate_code, write_utf8,
};
use flac_frame::subframe::SearchOptions;

// bit-at-a-time checksums, independent of the crate's tables
fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |mut crc, byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
        crc
    })
}

fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |mut crc, byte| {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
        crc
    })
}

fn metadata(sample_offset: u64, block_size: u32, sample_rate: u32) -> FrameMetadata {
    FrameMetadata {
        sample_offset,
        sample_depth: 16,
        sample_rate,
        block_size,
        channel_assignment: ChannelAssignment::Independent(2),
    }
}

fn header_bytes(metadata: &FrameMetadata) -> Vec<u8> {
    let mut sink = BitSink::new(vec![]);
    metadata.write(&mut sink).unwrap();
    sink.into_inner().unwrap()
}

#[test]
fn test_block_size_table() {
    for block_size in [
        192, 256, 512, 576, 1024, 1152, 2048, 2304, 4096, 4608, 8192, 16384, 32768,
    ] {
        assert!(matches!(
            block_size_code(block_size).unwrap(),
            HeaderCode::Code(8..=15 | 1..=5)
        ));
        // 4 bytes of sync code and fields, 1 offset byte and CRC-8
        assert_eq!(metadata(0, block_size, 44100).header_len().unwrap(), 6);
    }
}

#[test]
fn test_block_size_fallbacks() {
    for (block_size, extra) in [
        (1, 1),
        (100, 1),
        (255, 1),
        (257, 2),
        (4097, 2),
        (65535, 2),
        (65536, 2),
    ] {
        assert_eq!(
            metadata(0, block_size, 44100).header_len().unwrap(),
            6 + extra
        );
    }

    assert_eq!(header_bytes(&metadata(0, 100, 44100))[2] >> 4, 0b0110);
    assert_eq!(header_bytes(&metadata(0, 100, 44100))[5], 99);
    assert_eq!(header_bytes(&metadata(0, 65536, 44100))[2] >> 4, 0b0111);
    assert_eq!(header_bytes(&metadata(0, 65536, 44100))[5..7], [0xFF, 0xFF]);

    assert!(block_size_code(0).is_err());
    assert!(block_size_code(65537).is_err());
}

#[test]
fn test_sample_rate_table() {
    for (code, sample_rate) in [
        88200, 176400, 192000, 8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
    ]
    .into_iter()
    .enumerate()
    {
        assert_eq!(
            sample_rate_code(sample_rate),
            HeaderCode::Code(code as u8 + 1)
        );
        assert_eq!(metadata(0, 4096, sample_rate).header_len().unwrap(), 6);
    }
}

#[test]
fn test_sample_rate_fallbacks() {
    for (sample_rate, code, extra) in [
        (1, 12, 1),
        (255, 12, 1),
        (256, 13, 2),
        (11025, 13, 2),
        (65535, 13, 2),
        (65540, 14, 2),
        (352800, 14, 2),
        (655350, 14, 2),
        (65541, 0, 0),
        (655360, 0, 0),
        (1_000_000, 0, 0),
    ] {
        assert_eq!(sample_rate_code(sample_rate).code(), code);
        assert_eq!(
            metadata(0, 4096, sample_rate).header_len().unwrap(),
            6 + extra
        );
    }
}

#[test]
fn test_utf8() {
    // largest value of each encoded length
    for (len, max) in [0x7F, 0x7FF, 0xFFFF, 0x1FFFFF, 0x3FFFFFF, 0x7FFFFFFF, 0xFFFFFFFFF]
        .into_iter()
        .enumerate()
    {
        let mut sink = BitSink::new(vec![]);
        write_utf8(&mut *sink, max).unwrap();
        let bytes = sink.into_inner().unwrap();
        assert_eq!(bytes.len(), len + 1);

        let mut r = bitstream_io::BitReader::endian(bytes.as_slice(), bitstream_io::BigEndian);
        assert_eq!(read_utf8(&mut r).unwrap(), max);
    }

    let mut sink = BitSink::new(vec![]);
    assert!(write_utf8(&mut *sink, SAMPLE_OFFSET_LIMIT).is_err());
    let options = SearchOptions::default();
    assert!(
        FrameEncoder::estimate(SAMPLE_OFFSET_LIMIT, &[[0i32; 4]], 16, 44100, &options).is_err()
    );
}

#[test]
fn test_header_crc8() {
    for sample_offset in [0, 1, 0x80, 0x12345, (1 << 36) - 1] {
        for block_size in [1, 192, 1000, 4096, 65536] {
            for sample_rate in [44100, 100, 11025, 352800, 700001] {
                let bytes = header_bytes(&metadata(sample_offset, block_size, sample_rate));
                let (header, crc) = bytes.split_at(bytes.len() - 1);
                assert_eq!(crc8(header), crc[0]);
            }
        }
    }
}

#[test]
fn test_frame_crc16() {
    let channels = [
        (0..1000).map(|_| fastrand::i32(-1000..1000)).collect::<Vec<_>>(),
        (0..1000).map(|_| fastrand::i32(-1000..1000)).collect::<Vec<_>>(),
    ];

    let mut sink = BitSink::new(vec![]);
    FrameEncoder::estimate(5000, &channels, 16, 48000, &SearchOptions::default())
        .unwrap()
        .into_value()
        .encode(&channels, &mut sink)
        .unwrap();
    let bytes = sink.into_inner().unwrap();

    let (frame, crc) = bytes.split_at(bytes.len() - 2);
    assert_eq!(crc16(frame).to_be_bytes(), crc);
}

#[test]
fn test_header_round_trip() {
    let defaults = StreamDefaults {
        sample_rate: 700001,
        sample_depth: 17,
    };

    for channel_assignment in [
        ChannelAssignment::Independent(1),
        ChannelAssignment::Independent(8),
        ChannelAssignment::LeftSide,
        ChannelAssignment::SideRight,
        ChannelAssignment::MidSide,
    ] {
        for sample_depth in [8, 12, 16, 17, 20, 24] {
            let metadata = FrameMetadata {
                sample_offset: fastrand::u64(0..SAMPLE_OFFSET_LIMIT),
                sample_depth,
                sample_rate: 700001,
                block_size: fastrand::u32(1..=65536),
                channel_assignment,
            };
            let bytes = header_bytes(&metadata);
            assert_eq!(bytes.len() as u64, metadata.header_len().unwrap());
            assert_eq!(
                FrameMetadata::read(bytes.as_slice(), &defaults).unwrap(),
                metadata
            );
        }
    }
}

#[test]
fn test_invalid_headers() {
    let defaults = StreamDefaults {
        sample_rate: 44100,
        sample_depth: 16,
    };
    let valid = header_bytes(&metadata(0, 4096, 44100));

    // fix a modified header's CRC-8 so only the field is wrong
    let with_crc = |mut bytes: Vec<u8>| {
        let last = bytes.len() - 1;
        bytes[last] = crc8(&bytes[0..last]);
        bytes
    };

    let mut bytes = valid.clone();
    bytes[0] = 0xFE;
    assert!(FrameMetadata::read(with_crc(bytes).as_slice(), &defaults).is_err());

    // fixed blocking strategy
    let mut bytes = valid.clone();
    bytes[1] = 0xF8;
    assert!(FrameMetadata::read(with_crc(bytes).as_slice(), &defaults).is_err());

    // reserved channel assignment
    let mut bytes = valid.clone();
    bytes[3] = 0xB8;
    assert!(FrameMetadata::read(with_crc(bytes).as_slice(), &defaults).is_err());

    // reserved bits-per-sample
    let mut bytes = valid.clone();
    bytes[3] = 0x16;
    assert!(FrameMetadata::read(with_crc(bytes).as_slice(), &defaults).is_err());

    // reserved sample rate
    let mut bytes = valid.clone();
    bytes[2] = 0xCF;
    assert!(FrameMetadata::read(with_crc(bytes).as_slice(), &defaults).is_err());

    // bad CRC-8
    let mut bytes = valid;
    bytes[5] ^= 0xFF;
    assert!(FrameMetadata::read(bytes.as_slice(), &defaults).is_err());
}
