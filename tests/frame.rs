// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_frame::decode::read_frame;
use flac_frame::encode::{BitSink, FrameEncoder, encode_frames};
use flac_frame::stream::{ChannelAssignment, StreamDefaults};
use flac_frame::subframe::{SearchOptions, SubframeEncoder};

fn noise(len: usize, bits: u32) -> Vec<i32> {
    let range = -(1i64 << (bits - 1))..(1i64 << (bits - 1));
    (0..len)
        .map(|_| fastrand::i64(range.clone()) as i32)
        .collect()
}

fn sine(len: usize, bits: u32, period: f64, phase: f64) -> Vec<i32> {
    let amplitude = ((1i64 << (bits - 1)) - 1) as f64 * 0.8;
    (0..len)
        .map(|i| (amplitude * (i as f64 * std::f64::consts::TAU / period + phase).sin()) as i32)
        .collect()
}

// encodes a single frame, checks its size against its estimate
// and returns its bytes along with its channel assignment
fn encode(
    sample_offset: u64,
    channels: &[Vec<i32>],
    sample_depth: u32,
    sample_rate: u32,
    options: &SearchOptions,
) -> (Vec<u8>, ChannelAssignment) {
    let (size, frame) =
        FrameEncoder::estimate(sample_offset, channels, sample_depth, sample_rate, options)
            .unwrap()
            .into_parts();
    let assignment = frame.channel_assignment();

    let mut sink = BitSink::new(vec![]);
    frame.encode(channels, &mut sink).unwrap();
    let bytes = sink.into_inner().unwrap();
    assert_eq!(bytes.len() as u64 * 8, size);

    (bytes, assignment)
}

fn round_trip(
    sample_offset: u64,
    channels: &[Vec<i32>],
    sample_depth: u32,
    sample_rate: u32,
    options: &SearchOptions,
) {
    let (bytes, assignment) = encode(
        sample_offset,
        channels,
        sample_depth,
        sample_rate,
        options,
    );

    let defaults = StreamDefaults {
        sample_rate,
        sample_depth,
    };
    let mut reader = bytes.as_slice();
    let frame = read_frame(&mut reader, &defaults).unwrap();
    assert!(reader.is_empty());

    assert_eq!(frame.metadata.sample_offset, sample_offset);
    assert_eq!(frame.metadata.sample_depth, sample_depth);
    assert_eq!(frame.metadata.sample_rate, sample_rate);
    assert_eq!(frame.metadata.block_size as usize, channels[0].len());
    assert_eq!(frame.metadata.channel_assignment, assignment);
    assert_eq!(frame.channels, channels);
}

#[test]
fn test_round_trip_depths() {
    for bits in [1, 4, 8, 12, 16, 20, 24, 28, 32] {
        for options in [SearchOptions::fast(), SearchOptions::default()] {
            round_trip(0, &[noise(1000, bits)], bits, 44100, &options);
            round_trip(0, &[noise(1000, bits), noise(1000, bits)], bits, 44100, &options);
            round_trip(
                0,
                &[sine(1000, bits, 100.0, 0.0), sine(1000, bits, 100.0, 0.5)],
                bits,
                44100,
                &options,
            );
        }
    }
}

#[test]
fn test_round_trip_extremes() {
    let options = SearchOptions::default();

    // side channel needs all 33 bits
    round_trip(
        0,
        &[vec![i32::MIN, i32::MAX, 0, i32::MIN], vec![i32::MAX, i32::MIN, 0, i32::MAX]],
        32,
        48000,
        &options,
    );
    round_trip(
        0,
        &[vec![-128, 127, -128, 127], vec![127, -128, 127, -128]],
        8,
        8000,
        &options,
    );
    round_trip(0, &[vec![i32::MIN; 64], vec![i32::MAX; 64]], 32, 48000, &options);
}

#[test]
fn test_round_trip_block_sizes() {
    let options = SearchOptions::default();

    for block_size in [
        1, 2, 7, 16, 192, 255, 256, 257, 576, 1000, 1152, 4096, 4097, 4608, 32768, 65536,
    ] {
        round_trip(
            1234,
            &[sine(block_size, 16, 64.0, 0.0), noise(block_size, 16)],
            16,
            44100,
            &options,
        );
    }
}

#[test]
fn test_round_trip_header_fields() {
    let options = SearchOptions::fast();
    let channels = [sine(100, 16, 20.0, 0.0)];

    for sample_rate in [
        8000, 16000, 22050, 24000, 32000, 44100, 48000, 88200, 96000, 176400, 192000, 0, 100,
        255, 256, 11025, 65535, 65540, 352800, 654320,
    ] {
        round_trip(0, &channels, 16, sample_rate, &options);
    }

    for sample_offset in [0, 0x7F, 0x80, 0x7FF, 0x800, 0xFFFF, 0x10000, 1 << 35, (1 << 36) - 100] {
        round_trip(sample_offset, &channels, 16, 44100, &options);
    }

    // depths without their own header code defer to the stream
    for sample_depth in [1, 7, 17, 31] {
        round_trip(0, &[noise(50, sample_depth)], sample_depth, 44100, &options);
    }
}

#[test]
fn test_round_trip_channel_counts() {
    let options = SearchOptions::default();

    for count in 1..=8 {
        let channels = (0..count)
            .map(|c| sine(512, 24, 30.0 + c as f64, c as f64))
            .collect::<Vec<_>>();
        let (_, assignment) = encode(0, &channels, 24, 96000, &options);
        assert_eq!(usize::from(assignment.channel_count()), count);
        round_trip(0, &channels, 24, 96000, &options);
    }
}

#[test]
fn test_wasted_bits() {
    let options = SearchOptions::default();
    let channels = [
        noise(300, 8).into_iter().map(|s| s << 8).collect::<Vec<_>>(),
        noise(300, 12).into_iter().map(|s| s << 4).collect::<Vec<_>>(),
    ];
    round_trip(0, &channels, 16, 44100, &options);
}

// the chosen assignment's subframes are never larger than another's
#[test]
fn test_stereo_optimality() {
    fn subframe_bits(samples: &[i64], bits: u32, options: &SearchOptions) -> u64 {
        SubframeEncoder::estimate(samples, bits, options)
            .unwrap()
            .size()
    }

    let options = SearchOptions::default();

    for (left, right) in [
        (noise(256, 16), noise(256, 16)),
        (sine(256, 16, 50.0, 0.0), sine(256, 16, 50.0, 0.1)),
        (sine(256, 16, 50.0, 0.0), noise(256, 4)),
        (noise(256, 4), sine(256, 16, 50.0, 0.0)),
        (vec![1000; 256], sine(256, 16, 40.0, 0.0)),
    ] {
        let widen = |c: &[i32]| c.iter().map(|s| i64::from(*s)).collect::<Vec<_>>();
        let l = widen(&left);
        let r = widen(&right);
        let mid = l.iter().zip(&r).map(|(l, r)| (l + r) >> 1).collect::<Vec<_>>();
        let side = l.iter().zip(&r).map(|(l, r)| l - r).collect::<Vec<_>>();

        let l = subframe_bits(&l, 16, &options);
        let r = subframe_bits(&r, 16, &options);
        let mid = subframe_bits(&mid, 16, &options);
        let side = subframe_bits(&side, 17, &options);

        let sizes = [
            (ChannelAssignment::Independent(2), l + r),
            (ChannelAssignment::LeftSide, l + side),
            (ChannelAssignment::SideRight, side + r),
            (ChannelAssignment::MidSide, mid + side),
        ];
        let smallest = sizes.iter().map(|(_, size)| *size).min().unwrap();

        let channels = [left, right];
        let (bytes, assignment) = encode(0, &channels, 16, 44100, &options);
        let chosen = sizes.iter().find(|(a, _)| *a == assignment).unwrap().1;
        assert_eq!(chosen, smallest);

        // the first of several equally-small assignments wins
        assert_eq!(
            sizes.iter().find(|(_, size)| *size == smallest).unwrap().0,
            assignment
        );

        // header, padded subframes and CRC-16
        let header_len = 4 + 1 + 1; // sample offset 0 and CRC-8
        assert_eq!(bytes.len() as u64, (header_len * 8 + chosen).div_ceil(8) + 2);
    }
}

#[test]
fn test_stereo_ties() {
    let options = SearchOptions::default();

    // identical channels make left-side, side-right
    // and mid-side equally small
    let channel = noise(1024, 16);
    let (_, assignment) = encode(0, &[channel.clone(), channel], 16, 44100, &options);
    assert_eq!(assignment, ChannelAssignment::LeftSide);

    // constant channels are smallest stored independently
    let (_, assignment) = encode(0, &[vec![5; 1024], vec![5; 1024]], 16, 44100, &options);
    assert_eq!(assignment, ChannelAssignment::Independent(2));

    // silence too
    let (_, assignment) = encode(0, &[vec![0; 16], vec![0; 16]], 16, 44100, &options);
    assert_eq!(assignment, ChannelAssignment::Independent(2));
}

#[test]
fn test_side_right_chosen() {
    // a smooth right channel and a noisy left channel
    // leave side-right as the only small pair
    let right = sine(4096, 16, 200.0, 0.0);
    let left = right
        .iter()
        .map(|r| r + fastrand::i32(-64..64))
        .collect::<Vec<_>>();
    let channels = [left, right];

    let (_, assignment) = encode(0, &channels, 16, 44100, &SearchOptions::default());
    assert_eq!(assignment, ChannelAssignment::SideRight);
    round_trip(0, &channels, 16, 44100, &SearchOptions::default());
}

#[test]
fn test_mid_side_chosen() {
    // noise which cancels out of the mid channel
    let smooth = sine(4096, 15, 200.0, 0.0);
    let noise = (0..4096).map(|_| fastrand::i32(-64..64)).collect::<Vec<_>>();
    let channels = [
        smooth.iter().zip(&noise).map(|(s, n)| s + n).collect::<Vec<_>>(),
        smooth.iter().zip(&noise).map(|(s, n)| s - n).collect::<Vec<_>>(),
    ];

    let (_, assignment) = encode(0, &channels, 16, 44100, &SearchOptions::default());
    assert_eq!(assignment, ChannelAssignment::MidSide);
    round_trip(0, &channels, 16, 44100, &SearchOptions::default());
}

#[test]
fn test_side_right_mid_side_tie() {
    let options = SearchOptions::default();

    // left is right plus an occasional 1, so mid equals right
    // sample for sample and side-right costs exactly as much as mid-side
    let right = sine(4096, 16, 100.0, 0.0);
    let left = right
        .iter()
        .map(|r| r + i32::from(fastrand::u8(0..8) == 0))
        .collect::<Vec<_>>();

    let widen = |c: &[i32]| c.iter().map(|s| i64::from(*s)).collect::<Vec<_>>();
    let mid = left
        .iter()
        .zip(&right)
        .map(|(l, r)| (i64::from(*l) + i64::from(*r)) >> 1)
        .collect::<Vec<_>>();
    assert_eq!(mid, widen(&right));

    let side = left
        .iter()
        .zip(&right)
        .map(|(l, r)| i64::from(l - r))
        .collect::<Vec<_>>();
    let bits = |samples: &[i64], bps| {
        SubframeEncoder::estimate(samples, bps, &options)
            .unwrap()
            .size()
    };
    // left/side and independent coding must both lose
    assert!(bits(&widen(&left), 16) > bits(&widen(&right), 16));
    assert!(bits(&widen(&left), 16) > bits(&side, 17));

    let channels = [left, right];
    let (_, assignment) = encode(0, &channels, 16, 44100, &options);
    assert_eq!(assignment, ChannelAssignment::SideRight);
    round_trip(0, &channels, 16, 44100, &options);
}

#[test]
fn test_stereo_scenario() {
    let channels = [vec![100, 200, 300, 400], vec![90, 190, 290, 390]];
    let (_, assignment) = encode(0, &channels, 16, 44100, &SearchOptions::default());
    assert!(matches!(
        assignment,
        ChannelAssignment::LeftSide | ChannelAssignment::MidSide
    ));
    round_trip(0, &channels, 16, 44100, &SearchOptions::default());
}

#[test]
fn test_encode_frames() {
    let channels = [sine(10000, 16, 300.0, 0.0), sine(10000, 16, 301.0, 0.2)];

    let mut sink = BitSink::new(vec![]);
    let frames = encode_frames(
        &channels,
        4096,
        16,
        44100,
        &SearchOptions::default(),
        &mut sink,
    )
    .unwrap();
    assert_eq!(frames, 3);

    let bytes = sink.into_inner().unwrap();
    let mut reader = bytes.as_slice();
    let defaults = StreamDefaults {
        sample_rate: 44100,
        sample_depth: 16,
    };

    let mut decoded = [vec![], vec![]];
    for (offset, block_size) in [(0, 4096), (4096, 4096), (8192, 1808)] {
        let frame = read_frame(&mut reader, &defaults).unwrap();
        assert_eq!(frame.metadata.sample_offset, offset);
        assert_eq!(frame.metadata.block_size, block_size);
        for (channel, samples) in decoded.iter_mut().zip(frame.channels) {
            channel.extend(samples);
        }
    }
    assert!(reader.is_empty());
    assert_eq!(decoded, channels);
}

#[test]
fn test_encode_frames_errors() {
    let options = SearchOptions::default();
    let mut sink = BitSink::new(vec![]);

    assert!(encode_frames(&[vec![0i32; 10]], 0, 16, 44100, &options, &mut sink).is_err());
    assert!(encode_frames(&[vec![0i32; 10]], 65537, 16, 44100, &options, &mut sink).is_err());
    assert!(encode_frames::<Vec<i32>, _>(&[], 16, 16, 44100, &options, &mut sink).is_err());
    assert!(
        encode_frames(&[vec![0i32; 10], vec![0; 9]], 16, 16, 44100, &options, &mut sink).is_err()
    );
    assert!(sink.into_inner().unwrap().is_empty());
}

#[test]
fn test_corruption() {
    let channels = [sine(1000, 16, 80.0, 0.0), noise(1000, 8)];
    let (bytes, _) = encode(42, &channels, 16, 44100, &SearchOptions::default());
    let defaults = StreamDefaults {
        sample_rate: 44100,
        sample_depth: 16,
    };

    assert!(read_frame(bytes.as_slice(), &defaults).is_ok());

    for _ in 0..100 {
        let mut bytes = bytes.clone();
        let i = fastrand::usize(0..bytes.len());
        bytes[i] ^= 1 << fastrand::u32(0..8);
        assert!(read_frame(bytes.as_slice(), &defaults).is_err());
    }
}
