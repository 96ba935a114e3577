// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Traits for converting integers from byte representations.
//!
//! Integrations should never have to interact with this module directly.

use core::mem;

use byteorder::ByteOrder as _;
use byteorder::LE;

use crate::io;
use crate::io::Read;
use crate::Result;

/// A little-endian integer, which can be read out of a buffer.
///
/// Every multi-byte field in a capsule is little-endian; this trait is the
/// only place that fact is encoded.
pub trait LeInt: Sized + Copy {
    /// Reads a value of type `Self`, in little-endian order.
    fn read_from<'a, R: Read<'a>>(r: R) -> Result<Self, io::Error>;
}

impl LeInt for u8 {
    #[inline]
    fn read_from<'a, R: Read<'a>>(mut r: R) -> Result<Self, io::Error> {
        Ok(r.read_bytes(mem::size_of::<Self>())?[0])
    }
}

impl LeInt for u16 {
    #[inline]
    fn read_from<'a, R: Read<'a>>(mut r: R) -> Result<Self, io::Error> {
        Ok(LE::read_u16(r.read_bytes(mem::size_of::<Self>())?))
    }
}

impl LeInt for u32 {
    #[inline]
    fn read_from<'a, R: Read<'a>>(mut r: R) -> Result<Self, io::Error> {
        Ok(LE::read_u32(r.read_bytes(mem::size_of::<Self>())?))
    }
}

impl LeInt for u64 {
    #[inline]
    fn read_from<'a, R: Read<'a>>(mut r: R) -> Result<Self, io::Error> {
        Ok(LE::read_u64(r.read_bytes(mem::size_of::<Self>())?))
    }
}
