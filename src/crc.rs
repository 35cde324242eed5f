// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Running checksums for FLAC frames
//!
//! Frame headers end with a CRC-8 and whole frames
//! end with a CRC-16, both calculated MSB-first
//! with an initial value of 0.

/// A running checksum over a stream of bytes
pub trait Checksum: Default + Copy {
    /// Updates checksum with a single byte
    fn update(&mut self, byte: u8);

    /// Updates checksum with all the given bytes
    fn update_all(&mut self, bytes: &[u8]) {
        bytes.iter().for_each(|b| self.update(*b))
    }

    /// Whether the data read so far, including a trailing
    /// checksum, is valid
    fn valid(&self) -> bool;
}

const CRC8_TABLE: [u8; 256] = {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

const CRC16_TABLE: [u16; 256] = {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// The CRC-8 of a frame header (polynomial 0x07)
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Crc8(u8);

impl Checksum for Crc8 {
    #[inline]
    fn update(&mut self, byte: u8) {
        self.0 = CRC8_TABLE[usize::from(self.0 ^ byte)];
    }

    #[inline]
    fn valid(&self) -> bool {
        self.0 == 0
    }
}

impl From<Crc8> for u8 {
    #[inline]
    fn from(Crc8(crc): Crc8) -> Self {
        crc
    }
}

/// The CRC-16 of a whole frame (polynomial 0x8005)
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Crc16(u16);

impl Checksum for Crc16 {
    #[inline]
    fn update(&mut self, byte: u8) {
        self.0 = (self.0 << 8) ^ CRC16_TABLE[usize::from((self.0 >> 8) as u8 ^ byte)];
    }

    #[inline]
    fn valid(&self) -> bool {
        self.0 == 0
    }
}

impl From<Crc16> for u16 {
    #[inline]
    fn from(Crc16(crc): Crc16) -> Self {
        crc
    }
}

/// A reader which updates a running checksum with every byte read
pub struct CrcReader<R, C> {
    reader: R,
    checksum: C,
}

impl<R, C: Checksum> CrcReader<R, C> {
    /// Wraps reader with a fresh checksum
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            checksum: C::default(),
        }
    }

    /// Returns checksum of everything read so far
    pub fn checksum(&self) -> C {
        self.checksum
    }

    /// Consumes reader and returns its checksum
    pub fn into_checksum(self) -> C {
        self.checksum
    }
}

impl<R: std::io::Read, C: Checksum> std::io::Read for CrcReader<R, C> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.reader.read(buf)?;
        self.checksum.update_all(&buf[0..read]);
        Ok(read)
    }
}

#[cfg(test)]
fn checksum_of<C: Checksum>(bytes: &[u8]) -> C {
    let mut c = C::default();
    c.update_all(bytes);
    c
}

#[test]
fn test_crc8() {
    // a frame header's bytes followed by its stored CRC-8
    let header = [0xFF, 0xF8, 0x69, 0x18, 0x00, 0x00];
    let crc: u8 = checksum_of::<Crc8>(&header).into();
    assert_eq!(crc, 0xBF);

    let mut with_crc = header.to_vec();
    with_crc.push(crc);
    assert!(checksum_of::<Crc8>(&with_crc).valid());

    // the check value of CRC-8/SMBUS
    assert_eq!(u8::from(checksum_of::<Crc8>(b"123456789")), 0xF4);
}

#[test]
fn test_crc16() {
    // the check value of CRC-16/UMTS
    assert_eq!(u16::from(checksum_of::<Crc16>(b"123456789")), 0xFEE8);

    let mut data = b"123456789".to_vec();
    data.extend(0xFEE8u16.to_be_bytes());
    assert!(checksum_of::<Crc16>(&data).valid());
    data[3] ^= 0x10;
    assert!(!checksum_of::<Crc16>(&data).valid());
}

#[test]
fn test_crc_reader() {
    use std::io::Read;

    let data = b"123456789";
    let mut r: CrcReader<_, Crc16> = CrcReader::new(&data[..]);
    let mut buf = [0; 4];
    r.read_exact(&mut buf).unwrap();
    assert_eq!(r.checksum(), checksum_of::<Crc16>(b"1234"));
    r.read_exact(&mut buf).unwrap();
    r.read_exact(&mut buf[0..1]).unwrap();
    assert_eq!(u16::from(r.into_checksum()), 0xFEE8);
}
