// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For choosing and writing each channel's subframe
//!
//! | Bits | Field | Meaning |
//! |-----:|------:|---------|
//! | 1    | pad | always 0 |
//! | 6    | type | CONSTANT, VERBATIM, FIXED or LPC |
//! | 1+k  | wasted bits | 0, or 1 followed by k-1 in unary |
//!
//! followed by the subframe's type-specific data.

use crate::Error;
use crate::encode::SizeEstimate;
use arrayvec::ArrayVec;
use bitstream_io::BitWrite;
use std::borrow::Cow;
use std::ops::RangeInclusive;

/// Options for finding each subframe's smallest encoding
///
/// # Example
///
/// ```
/// use flac_frame::subframe::SearchOptions;
///
/// let options = SearchOptions::default()
///     .fixed_orders(1..=2)
///     .unwrap()
///     .lpc_orders(1..=12)
///     .unwrap()
///     .max_partition_order(6)
///     .unwrap();
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchOptions {
    fixed_orders: RangeInclusive<u8>,
    lpc_orders: RangeInclusive<u8>,
    lpc_precision: u8,
    max_partition_order: u8,
}

impl SearchOptions {
    /// The largest FIXED predictor order
    pub const MAX_FIXED_ORDER: u8 = 4;

    /// The largest LPC order
    pub const MAX_LPC_ORDER: u8 = 32;

    /// The largest LPC coefficient precision, in bits
    pub const MAX_LPC_PRECISION: u8 = 15;

    /// The largest residual partition order
    pub const MAX_PARTITION_ORDER: u8 = 15;

    /// Options which only try low FIXED orders
    pub fn fast() -> Self {
        Self {
            fixed_orders: 0..=2,
            lpc_orders: 1..=0,
            lpc_precision: 12,
            max_partition_order: 3,
        }
    }

    /// Options which try every FIXED and LPC order
    pub fn best() -> Self {
        Self {
            fixed_orders: 0..=Self::MAX_FIXED_ORDER,
            lpc_orders: 1..=Self::MAX_LPC_ORDER,
            lpc_precision: Self::MAX_LPC_PRECISION,
            max_partition_order: 8,
        }
    }

    /// Assigns range of FIXED predictor orders to try
    ///
    /// An empty range tries no FIXED subframes.
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds order 4.
    pub fn fixed_orders(self, fixed_orders: RangeInclusive<u8>) -> Result<Self, Error> {
        match fixed_orders.is_empty() || *fixed_orders.end() <= Self::MAX_FIXED_ORDER {
            true => Ok(Self {
                fixed_orders,
                ..self
            }),
            false => Err(Error::ExcessiveFixedOrder),
        }
    }

    /// Assigns range of LPC orders to try
    ///
    /// An empty range tries no LPC subframes.
    ///
    /// # Errors
    ///
    /// Returns an error if the range includes order 0
    /// or exceeds order 32.
    pub fn lpc_orders(self, lpc_orders: RangeInclusive<u8>) -> Result<Self, Error> {
        match lpc_orders.is_empty()
            || (*lpc_orders.start() >= 1 && *lpc_orders.end() <= Self::MAX_LPC_ORDER)
        {
            true => Ok(Self { lpc_orders, ..self }),
            false => Err(Error::ExcessiveLpcOrder),
        }
    }

    /// Disables LPC subframes
    pub fn no_lpc(self) -> Self {
        Self {
            lpc_orders: 1..=0,
            ..self
        }
    }

    /// Assigns LPC coefficient precision, in bits
    ///
    /// # Errors
    ///
    /// Returns an error if precision isn't between 1 and 15.
    pub fn lpc_precision(self, lpc_precision: u8) -> Result<Self, Error> {
        match (1..=Self::MAX_LPC_PRECISION).contains(&lpc_precision) {
            true => Ok(Self {
                lpc_precision,
                ..self
            }),
            false => Err(Error::InvalidLpcPrecision),
        }
    }

    /// Assigns largest residual partition order to try
    ///
    /// # Errors
    ///
    /// Returns an error if the order exceeds 15.
    pub fn max_partition_order(self, max_partition_order: u8) -> Result<Self, Error> {
        match max_partition_order <= Self::MAX_PARTITION_ORDER {
            true => Ok(Self {
                max_partition_order,
                ..self
            }),
            false => Err(Error::ExcessivePartitionOrder),
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fixed_orders: 0..=Self::MAX_FIXED_ORDER,
            lpc_orders: 1..=8,
            lpc_precision: 12,
            max_partition_order: 5,
        }
    }
}

/// The chosen encoding of a single channel
///
/// Only the encoding parameters are retained;
/// the channel's samples are given again when writing.
#[derive(Clone, Debug)]
pub struct SubframeEncoder {
    bits_per_sample: u32,
    wasted_bits: u32,
    kind: SubframeKind,
}

#[derive(Clone, Debug)]
enum SubframeKind {
    Constant,
    Verbatim,
    Fixed {
        order: usize,
        residual: Residual,
    },
    Lpc {
        coefficients: ArrayVec<i32, 32>,
        precision: u32,
        shift: u32,
        residual: Residual,
    },
}

impl SubframeKind {
    fn type_code(&self) -> u8 {
        match self {
            Self::Constant => 0b000000,
            Self::Verbatim => 0b000001,
            Self::Fixed { order, .. } => 0b001000 | *order as u8,
            Self::Lpc { coefficients, .. } => 0b100000 | (coefficients.len() - 1) as u8,
        }
    }
}

impl SubframeEncoder {
    /// Finds the smallest encoding of the given channel
    ///
    /// `bits_per_sample` is the channel's effective depth,
    /// from 1 to 33 bits (side channels need one more bit
    /// than the frame's bits-per-sample).
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is empty,
    /// bits-per-sample is out of range,
    /// or any sample does not fit in bits-per-sample.
    pub fn estimate(
        samples: &[i64],
        bits_per_sample: u32,
        options: &SearchOptions,
    ) -> Result<SizeEstimate<Self>, Error> {
        if !(1..=33).contains(&bits_per_sample) {
            return Err(Error::InvalidBitsPerSample);
        }
        let range = (-1i64 << (bits_per_sample - 1))..(1i64 << (bits_per_sample - 1));
        if samples.iter().any(|s| !range.contains(s)) {
            return Err(Error::SampleOutOfRange);
        }
        let Some(first) = samples.first() else {
            return Err(Error::InvalidBlockSize);
        };

        let wasted_bits = wasted_bits(samples);
        let samples = shifted(samples, wasted_bits);
        let bps = bits_per_sample - wasted_bits;
        let block_size = samples.len();
        let header = 8 + u64::from(wasted_bits);

        let encoder = |size, kind| {
            SizeEstimate::new(
                size,
                Self {
                    bits_per_sample,
                    wasted_bits,
                    kind,
                },
            )
        };

        if samples.iter().all(|s| *s == first >> wasted_bits) {
            return Ok(encoder(header + u64::from(bps), SubframeKind::Constant));
        }

        let mut best = encoder(
            header + block_size as u64 * u64::from(bps),
            SubframeKind::Verbatim,
        );

        for order in options.fixed_orders.clone().map(usize::from) {
            if order > block_size {
                break;
            }
            let residuals = residuals(&samples, &FIXED_COEFFICIENTS[order], 0);
            if let Some(residual) =
                fits_residual(&residuals, order, options.max_partition_order)
            {
                let size = header + order as u64 * u64::from(bps) + residual.size();
                if size < best.size() {
                    best = encoder(
                        size,
                        SubframeKind::Fixed {
                            order,
                            residual: residual.into_value(),
                        },
                    );
                }
            }
        }

        let max_lpc_order = usize::from(*options.lpc_orders.end()).min(block_size - 1);
        if !options.lpc_orders.is_empty() && max_lpc_order >= 1 {
            let precision = u32::from(options.lpc_precision);

            for (coefficients, order) in lpc_coefficients(&samples, max_lpc_order)
                .iter()
                .zip(1..)
                .filter(|(_, order)| options.lpc_orders.contains(&(*order as u8)))
            {
                let Some((coefficients, shift)) = quantize(coefficients, precision) else {
                    continue;
                };
                let residuals = residuals(
                    &samples,
                    &coefficients.iter().map(|c| i64::from(*c)).collect::<Vec<_>>(),
                    shift,
                );
                if let Some(residual) =
                    fits_residual(&residuals, order, options.max_partition_order)
                {
                    let size = header
                        + order as u64 * u64::from(bps + precision)
                        + 4
                        + 5
                        + residual.size();
                    if size < best.size() {
                        best = encoder(
                            size,
                            SubframeKind::Lpc {
                                coefficients,
                                precision,
                                shift,
                                residual: residual.into_value(),
                            },
                        );
                    }
                }
            }
        }

        log::trace!(
            "{} samples at {} bits as {:?} in {} bits",
            block_size,
            bits_per_sample,
            best.value().kind,
            best.size()
        );

        Ok(best)
    }

    /// Returns channel's bits-per-sample, including wasted bits
    #[inline]
    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Returns number of wasted low bits shared by every sample
    #[inline]
    pub fn wasted_bits(&self) -> u32 {
        self.wasted_bits
    }

    /// Writes subframe of the given samples
    ///
    /// `samples` must be the same samples given to
    /// [`SubframeEncoder::estimate`], and the number of bits
    /// written is that estimate's size.
    ///
    /// # Errors
    ///
    /// Passes along any I/O error from the underlying stream.
    pub fn encode<W: BitWrite + ?Sized>(&self, samples: &[i64], w: &mut W) -> Result<(), Error> {
        let samples = shifted(samples, self.wasted_bits);
        let bps = self.bits_per_sample - self.wasted_bits;

        w.write_bit(false)?;
        w.write::<6, u8>(self.kind.type_code())?;
        match self.wasted_bits {
            0 => w.write_bit(false)?,
            wasted => {
                w.write_bit(true)?;
                w.write_unary::<1>(wasted - 1)?;
            }
        }

        match &self.kind {
            SubframeKind::Constant => {
                w.write_var(bps, samples[0])?;
            }
            SubframeKind::Verbatim => {
                samples.iter().try_for_each(|s| w.write_var(bps, *s))?;
            }
            SubframeKind::Fixed { order, residual } => {
                samples[0..*order]
                    .iter()
                    .try_for_each(|s| w.write_var(bps, *s))?;
                residual.write(
                    w,
                    &residuals(&samples, &FIXED_COEFFICIENTS[*order], 0),
                    *order,
                )?;
            }
            SubframeKind::Lpc {
                coefficients,
                precision,
                shift,
                residual,
            } => {
                samples[0..coefficients.len()]
                    .iter()
                    .try_for_each(|s| w.write_var(bps, *s))?;
                w.write::<4, u32>(precision - 1)?;
                w.write::<5, u32>(*shift)?;
                coefficients
                    .iter()
                    .try_for_each(|c| w.write_var(*precision, *c))?;
                residual.write(
                    w,
                    &residuals(
                        &samples,
                        &coefficients.iter().map(|c| i64::from(*c)).collect::<Vec<_>>(),
                        *shift,
                    ),
                    coefficients.len(),
                )?;
            }
        }

        Ok(())
    }
}

fn wasted_bits(samples: &[i64]) -> u32 {
    match samples.iter().fold(0, |acc, s| acc | s) {
        0 => 0,
        bits => bits.trailing_zeros(),
    }
}

fn shifted(samples: &[i64], wasted_bits: u32) -> Cow<'_, [i64]> {
    match wasted_bits {
        0 => Cow::Borrowed(samples),
        wasted => Cow::Owned(samples.iter().map(|s| s >> wasted).collect()),
    }
}

pub(crate) const FIXED_COEFFICIENTS: [&[i64]; 5] =
    [&[], &[1], &[2, -1], &[3, -3, 1], &[4, -6, 4, -1]];

/// Returns prediction residuals of all samples following the warm-up samples
///
/// `coefficients[0]` applies to the most recent sample.
fn residuals(samples: &[i64], coefficients: &[i64], shift: u32) -> Vec<i64> {
    samples
        .windows(coefficients.len() + 1)
        .map(|window| {
            let [history @ .., current] = window else {
                unreachable!() // windows are never empty
            };
            current - (predict(history, coefficients) >> shift)
        })
        .collect()
}

/// Returns unshifted prediction from preceding samples, oldest first
fn predict(history: &[i64], coefficients: &[i64]) -> i64 {
    coefficients
        .iter()
        .zip(history.iter().rev())
        .map(|(c, s)| c * s)
        .sum()
}

// residuals of a valid stream must fit in 32 bits
fn fits_residual(
    residuals: &[i64],
    predictor_order: usize,
    max_partition_order: u8,
) -> Option<SizeEstimate<Residual>> {
    residuals
        .iter()
        .all(|r| i32::try_from(*r).is_ok())
        .then(|| Residual::estimate(residuals, predictor_order, max_partition_order))
        .flatten()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum RiceMethod {
    // 4-bit parameters, 0 to 14
    Rice,
    // 5-bit parameters, 0 to 30
    Rice2,
}

impl RiceMethod {
    fn code(self) -> u8 {
        match self {
            Self::Rice => 0,
            Self::Rice2 => 1,
        }
    }

    fn parameter_bits(self) -> u32 {
        match self {
            Self::Rice => 4,
            Self::Rice2 => 5,
        }
    }

    fn max_parameter(self) -> u32 {
        match self {
            Self::Rice => 14,
            Self::Rice2 => 30,
        }
    }
}

const MAX_RICE_PARAMETER: usize = 30;

// bits needed by a partition's folded residuals for every Rice parameter
#[derive(Clone)]
struct PartitionCost {
    count: u64,
    // sum of each folded residual shifted right by the index
    quotients: [u64; MAX_RICE_PARAMETER + 1],
}

impl PartitionCost {
    fn new(folded: &[u64]) -> Self {
        let mut quotients = [0; MAX_RICE_PARAMETER + 1];
        for u in folded {
            for (k, q) in quotients.iter_mut().enumerate() {
                *q += u >> k;
            }
        }
        Self {
            count: folded.len() as u64,
            quotients,
        }
    }

    fn merge(&self, other: &Self) -> Self {
        let mut quotients = self.quotients;
        quotients
            .iter_mut()
            .zip(other.quotients)
            .for_each(|(q, o)| *q += o);
        Self {
            count: self.count + other.count,
            quotients,
        }
    }

    // smallest parameter and its size, excluding the parameter itself
    fn best(&self, method: RiceMethod) -> (u32, u64) {
        (0..=method.max_parameter())
            .map(|k| {
                (
                    k,
                    self.count * u64::from(1 + k) + self.quotients[k as usize],
                )
            })
            .min_by_key(|(_, bits)| *bits)
            .unwrap_or((0, 0))
    }
}

#[inline]
fn fold(residual: i64) -> u64 {
    ((residual << 1) ^ (residual >> 63)) as u64
}

#[derive(Clone, Debug)]
struct Residual {
    method: RiceMethod,
    partition_order: u32,
    parameters: Vec<u32>,
}

impl Residual {
    fn estimate(
        residuals: &[i64],
        predictor_order: usize,
        max_partition_order: u8,
    ) -> Option<SizeEstimate<Self>> {
        let block_size = residuals.len() + predictor_order;
        let folded = residuals.iter().map(|r| fold(*r)).collect::<Vec<_>>();

        let finest = (1..=u32::from(max_partition_order))
            .rev()
            .find(|p| block_size % (1 << p) == 0 && (block_size >> p) > predictor_order)
            .unwrap_or(0);

        let partition_len = block_size >> finest;
        let mut costs = (0..1 << finest)
            .map(|i| {
                let start = match i {
                    0 => 0,
                    i => i * partition_len - predictor_order,
                };
                PartitionCost::new(&folded[start..(i + 1) * partition_len - predictor_order])
            })
            .collect::<Vec<_>>();

        let mut best: Option<SizeEstimate<Self>> = None;

        for partition_order in (0..=finest).rev() {
            for method in [RiceMethod::Rice, RiceMethod::Rice2] {
                let (parameters, sizes): (Vec<u32>, Vec<u64>) =
                    costs.iter().map(|c| c.best(method)).unzip();
                let size = 2
                    + 4
                    + costs.len() as u64 * u64::from(method.parameter_bits())
                    + sizes.iter().sum::<u64>();

                if best.as_ref().is_none_or(|b| size < b.size()) {
                    best = Some(SizeEstimate::new(
                        size,
                        Self {
                            method,
                            partition_order,
                            parameters,
                        },
                    ));
                }
            }

            costs = costs
                .chunks_exact(2)
                .map(|pair| pair[0].merge(&pair[1]))
                .collect();
        }

        best
    }

    fn write<W: BitWrite + ?Sized>(
        &self,
        w: &mut W,
        mut residuals: &[i64],
        predictor_order: usize,
    ) -> std::io::Result<()> {
        let block_size = residuals.len() + predictor_order;
        let partition_len = block_size >> self.partition_order;

        w.write::<2, u8>(self.method.code())?;
        w.write::<4, u32>(self.partition_order)?;

        for (i, k) in self.parameters.iter().copied().enumerate() {
            let (partition, rest) = residuals.split_at(match i {
                0 => partition_len - predictor_order,
                _ => partition_len,
            });
            residuals = rest;

            match self.method {
                RiceMethod::Rice => w.write::<4, u32>(k)?,
                RiceMethod::Rice2 => w.write::<5, u32>(k)?,
            }

            for u in partition.iter().map(|r| fold(*r)) {
                w.write_unary::<1>((u >> k) as u32)?;
                if k > 0 {
                    w.write_var::<u64>(k, u & ((1 << k) - 1))?;
                }
            }
        }

        Ok(())
    }
}

/// Returns LPC coefficients of every order from 1 to `max_order`
fn lpc_coefficients(samples: &[i64], max_order: usize) -> Vec<Vec<f64>> {
    // Welch window
    let half = (samples.len() as f64 - 1.0) / 2.0;
    let windowed = samples
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let x = (i as f64 - half) / (half + 1.0);
            *s as f64 * (1.0 - x * x)
        })
        .collect::<Vec<_>>();

    let autocorrelation = (0..=max_order)
        .map(|lag| {
            windowed[lag..]
                .iter()
                .zip(&windowed)
                .map(|(a, b)| a * b)
                .sum::<f64>()
        })
        .collect::<Vec<_>>();

    // Levinson-Durbin recursion
    let mut orders = Vec::with_capacity(max_order);
    let mut lpc = vec![0.0; max_order];
    let mut error = autocorrelation[0];

    for i in 0..max_order {
        if error <= 0.0 || !error.is_finite() {
            break;
        }

        let mut r = -autocorrelation[i + 1];
        for j in 0..i {
            r -= lpc[j] * autocorrelation[i - j];
        }
        r /= error;

        lpc[i] = r;
        for j in 0..(i >> 1) {
            let tmp = lpc[j];
            lpc[j] += r * lpc[i - 1 - j];
            lpc[i - 1 - j] += r * tmp;
        }
        if i & 1 == 1 {
            let j = i >> 1;
            lpc[j] += lpc[j] * r;
        }
        error *= 1.0 - r * r;

        orders.push(lpc[0..=i].iter().map(|c| -c).collect());
    }

    orders
}

/// Quantizes coefficients to the given precision,
/// returning them and their shift
fn quantize(coefficients: &[f64], precision: u32) -> Option<(ArrayVec<i32, 32>, u32)> {
    let max = coefficients.iter().fold(0.0f64, |max, c| max.max(c.abs()));
    if !(max > 0.0 && max.is_finite()) {
        return None;
    }

    // one bit of precision goes to the sign
    let magnitude = precision as i32 - 1;
    let shift = (magnitude - (max.log2().floor() as i32 + 1)).min(15);
    if shift < 0 {
        return None;
    }

    let (min_q, max_q) = (-(1i64 << magnitude), (1i64 << magnitude) - 1);
    let mut error = 0.0;
    Some((
        coefficients
            .iter()
            .map(|c| {
                error += c * f64::from(1 << shift);
                let q = (error.round() as i64).clamp(min_q, max_q);
                error -= q as f64;
                q as i32
            })
            .collect(),
        shift as u32,
    ))
}

#[cfg(test)]
fn encoded_bits(samples: &[i64], bits_per_sample: u32, options: &SearchOptions) -> (u64, Vec<u8>) {
    use bitstream_io::{BigEndian, BitWriter};

    let estimate = SubframeEncoder::estimate(samples, bits_per_sample, options).unwrap();
    let mut w = BitWriter::endian(vec![], BigEndian);
    estimate.value().encode(samples, &mut w).unwrap();
    let padding = (8 - estimate.size() % 8) % 8;
    if padding > 0 {
        w.write_var::<u8>(padding as u32, 0).unwrap();
    }
    assert!(w.byte_aligned());
    let bytes = w.into_writer();
    assert_eq!(bytes.len() as u64 * 8, estimate.size() + padding);
    (estimate.size(), bytes)
}

#[test]
fn test_residuals() {
    let samples = [1, 4, 9, 16, 25, 36];
    assert_eq!(residuals(&samples, FIXED_COEFFICIENTS[0], 0), samples);
    assert_eq!(
        residuals(&samples, FIXED_COEFFICIENTS[1], 0),
        [3, 5, 7, 9, 11]
    );
    assert_eq!(residuals(&samples, FIXED_COEFFICIENTS[2], 0), [2, 2, 2, 2]);
    assert_eq!(residuals(&samples, FIXED_COEFFICIENTS[3], 0), [0, 0, 0]);
    assert_eq!(residuals(&samples, FIXED_COEFFICIENTS[4], 0), [0, 0]);
    assert!(residuals(&samples[0..3], FIXED_COEFFICIENTS[4], 0).is_empty());
}

#[test]
fn test_fold() {
    assert_eq!([0, -1, 1, -2, 2].map(fold), [0, 1, 2, 3, 4]);
    assert_eq!(fold(i64::from(i32::MIN)), u64::from(u32::MAX));
}

#[test]
fn test_wasted_bits() {
    assert_eq!(wasted_bits(&[0, 0, 0]), 0);
    assert_eq!(wasted_bits(&[4, -8, 12]), 2);
    assert_eq!(wasted_bits(&[4, -8, 13]), 0);

    let options = SearchOptions::default();
    let encoder = SubframeEncoder::estimate(&[4, -8, 12, 20], 16, &options)
        .unwrap()
        .into_value();
    assert_eq!(encoder.bits_per_sample(), 16);
    assert_eq!(encoder.wasted_bits(), 2);

    let encoder = SubframeEncoder::estimate(&[3, 5, -7], 17, &options)
        .unwrap()
        .into_value();
    assert_eq!(encoder.bits_per_sample(), 17);
    assert_eq!(encoder.wasted_bits(), 0);
}

#[test]
fn test_constant() {
    let options = SearchOptions::default();
    assert_eq!(encoded_bits(&[0; 100], 16, &options).0, 8 + 16);
    assert_eq!(encoded_bits(&[-5; 100], 17, &options).0, 8 + 17);

    // subframe header, value 0x1235
    let (_, bytes) = encoded_bits(&[0x1235; 10], 16, &options);
    assert_eq!(bytes, [0x00, 0x12, 0x35]);

    // low bits shared by every sample don't shrink a constant
    assert_eq!(encoded_bits(&[0x1234; 10], 16, &options).0, 8 + 16);
}

#[test]
fn test_verbatim() {
    // too short for any predictor to pay off
    let (size, bytes) = encoded_bits(&[1, -1], 2, &SearchOptions::fast());
    assert_eq!(size, 8 + 4);
    assert_eq!(bytes, [0b0_000001_0, 0b01_11_0000]);
}

#[test]
fn test_estimate_matches_encoding() {
    fn sine(len: usize, amplitude: f64, period: f64) -> Vec<i64> {
        (0..len)
            .map(|i| (amplitude * (i as f64 * std::f64::consts::TAU / period).sin()).round() as i64)
            .collect()
    }

    for options in [
        SearchOptions::fast(),
        SearchOptions::default(),
        SearchOptions::best(),
        SearchOptions::default().no_lpc().max_partition_order(0).unwrap(),
    ] {
        for len in [1, 2, 3, 5, 16, 33, 192, 1000, 4096] {
            encoded_bits(&sine(len, 30000.0, 41.5), 16, &options);
            encoded_bits(&sine(len, 100.0, 7.0), 8, &options);
            encoded_bits(
                &(0..len).map(|_| fastrand::i64(-32768..32768)).collect::<Vec<_>>(),
                16,
                &options,
            );
            encoded_bits(
                &(0..len).map(|_| fastrand::i64(-8..8) * 256).collect::<Vec<_>>(),
                16,
                &options,
            );
            encoded_bits(
                &(0..len)
                    .map(|_| fastrand::i64(-(1 << 32)..(1 << 32)))
                    .collect::<Vec<_>>(),
                33,
                &options,
            );
        }
    }
}

#[test]
fn test_predictors_win() {
    // a smooth signal should be smaller than verbatim
    let samples = (0..4096)
        .map(|i| ((i as f64 / 50.0).sin() * 20000.0) as i64)
        .collect::<Vec<_>>();

    let fixed = SubframeEncoder::estimate(&samples, 16, &SearchOptions::fast()).unwrap();
    assert!(matches!(fixed.value().kind, SubframeKind::Fixed { .. }));
    assert!(fixed.size() < 4096 * 16);

    let lpc = SubframeEncoder::estimate(&samples, 16, &SearchOptions::best()).unwrap();
    assert!(lpc.size() <= fixed.size());
}

#[test]
fn test_invalid_input() {
    let options = SearchOptions::default();
    assert!(matches!(
        SubframeEncoder::estimate(&[], 16, &options),
        Err(Error::InvalidBlockSize)
    ));
    assert!(matches!(
        SubframeEncoder::estimate(&[256], 8, &options),
        Err(Error::SampleOutOfRange)
    ));
    assert!(matches!(
        SubframeEncoder::estimate(&[0], 34, &options),
        Err(Error::InvalidBitsPerSample)
    ));
}

#[test]
fn test_options() {
    assert!(SearchOptions::default().fixed_orders(0..=5).is_err());
    assert!(SearchOptions::default().fixed_orders(3..=1).is_ok());
    assert!(SearchOptions::default().lpc_orders(0..=4).is_err());
    assert!(SearchOptions::default().lpc_orders(1..=33).is_err());
    assert!(SearchOptions::default().lpc_orders(1..=32).is_ok());
    assert!(SearchOptions::default().lpc_precision(0).is_err());
    assert!(SearchOptions::default().lpc_precision(16).is_err());
    assert!(SearchOptions::default().max_partition_order(16).is_err());
}
