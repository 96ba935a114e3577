// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Provides the [`Read`] trait, analogous to [`std::io::Read`].

use static_assertions::assert_obj_safe;

use crate::io;
use crate::io::endian::LeInt;
use crate::Result;

/// Represents a place that bytes can be read from, such as a `&[u8]`.
///
/// Unlike [`std::io::Read`], reads borrow directly from the underlying
/// buffer for the lifetime `'a`, so that decoded capsule structures can
/// point into the original image rather than copying it.
pub trait Read<'a> {
    /// Reads exactly `n` bytes from `self`.
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], io::Error>;

    /// Returns the number of bytes still available to read.
    fn remaining_data(&self) -> usize;

    /// Reads a little-endian integer.
    ///
    /// # Note
    /// Do not implement this function yourself. Callers are not required to
    /// call it in order to actually perform a read, so whether or not it is
    /// called is an implementation detail.
    #[inline]
    fn read_le<I: LeInt>(&mut self) -> Result<I, io::Error>
    where
        Self: Sized,
    {
        I::read_from(self)
    }

    /// Reads a fixed-size byte array, such as a hash or a key coordinate.
    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], io::Error>
    where
        Self: Sized,
    {
        let mut out = [0; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Skips over `n` bytes, such as reserved padding.
    #[inline]
    fn skip(&mut self, n: usize) -> Result<(), io::Error>
    where
        Self: Sized,
    {
        self.read_bytes(n).map(|_| ())
    }
}
assert_obj_safe!(Read<'static>);

impl<'a, R: Read<'a> + ?Sized> Read<'a> for &'_ mut R {
    #[inline]
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], io::Error> {
        R::read_bytes(*self, n)
    }

    #[inline]
    fn remaining_data(&self) -> usize {
        R::remaining_data(*self)
    }
}

impl<'a> Read<'a> for &'a [u8] {
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], io::Error> {
        check!(self.len() >= n, io::Error::BufferExhausted);

        let (head, tail) = self.split_at(n);
        *self = tail;
        Ok(head)
    }

    fn remaining_data(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_bytes() {
        let mut bytes: &[u8] = b"Hello!";
        assert_eq!(bytes.read_bytes(3).unwrap(), b"Hel");
        assert_eq!(bytes.remaining_data(), 3);
        assert_eq!(bytes.read_le::<u16>().unwrap(), 0x6f6c);
        assert_eq!(bytes.len(), 1);
        assert!(bytes.read_le::<u32>().is_err());
        // A failed read consumes nothing.
        assert_eq!(bytes, b"!");
    }

    #[test]
    fn read_array_and_skip() {
        let mut bytes: &[u8] = &[1, 2, 3, 4, 5, 6];
        bytes.skip(2).unwrap();
        assert_eq!(bytes.read_array::<3>().unwrap(), [3, 4, 5]);
        assert!(bytes.read_array::<2>().is_err());
        assert!(bytes.skip(2).is_err());
        assert_eq!(bytes.remaining_data(), 1);
    }
}
