// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The compression ("PBC") header.

use crate::capsule::expect_magic;
use crate::capsule::Error;
use crate::capsule::BLOCK_SIZE;
use crate::io::Read;

/// The header describing a capsule's bitmaps and payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompressionHeader {
    /// The header version.
    pub version: u32,
    /// The size of a block, in bytes. Only 4 KiB is supported.
    pub page_size: u32,
    /// The size of the fill pattern, in bytes.
    pub pattern_size: u32,
    /// The fill pattern.
    pub pattern: u32,
    /// The number of blocks each bitmap covers; a multiple of eight.
    pub bitmap_size: u32,
    /// The length of the payload, in bytes.
    pub payload_length: u32,
}

impl CompressionHeader {
    /// The magic number of a compression header, `"CBP_"` on the wire.
    pub const MAGIC: u32 = 0x5f504243;
    /// The encoded size of a compression header.
    pub const SIZE: usize = 128;

    /// Parses a compression header.
    pub fn parse<'a, R: Read<'a>>(mut r: R) -> crate::Result<Self, Error> {
        let mut r = r.read_bytes(Self::SIZE)?;
        expect_magic(&mut r, Self::MAGIC)?;
        let header = Self {
            version: r.read_le()?,
            page_size: r.read_le()?,
            pattern_size: r.read_le()?,
            pattern: r.read_le()?,
            bitmap_size: r.read_le()?,
            payload_length: r.read_le()?,
        };

        check!(header.page_size == BLOCK_SIZE, Error::UnsupportedPageSize);
        check!(header.bitmap_size % 8 == 0, Error::BadBitmapSize);
        Ok(header)
    }
}
