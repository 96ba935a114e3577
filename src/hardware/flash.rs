// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! External flash abstraction.
//!
//! This module provides the [`Flash`] trait, which represents an *abstract
//! flash device*: a byte-addressed region of NOR-like storage that must be
//! erased (set to all-ones) before it can be programmed. Such a "device" can
//! range from a simple Rust slice to a SPI flash part behind an MTD driver.
//!
//! Alongside the trait, this module provides [`RamMut`], an in-memory
//! device, and, with the `std` feature, [`FileFlash`], a file-backed
//! emulation, and [`Recorder`], which journals every operation passed
//! through it.

use core::convert::TryInto;

use static_assertions::assert_obj_safe;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The size of a flash sector: the smallest unit the update path erases.
pub const SECTOR_SIZE: u32 = 0x10000;

/// The size of a flash block, the unit addressed by capsule bitmaps.
pub const BLOCK_SIZE: u32 = 0x1000;

/// A [`Flash`] error.
///
/// All of these errors are non-retryable; a [`Flash`] implementation should
/// block until the operation succeeds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Indicates that an operation failed because the requested
    /// operation was outside of the device's address space.
    OutOfRange,

    /// Indicates that the device is locked in some manner and cannot
    /// be affected by the operation.
    Locked,

    /// Indicates that an erase was requested at a size or alignment the
    /// device cannot perform.
    BadErase,

    /// Indicates that an unspecified error occured, such as a failed
    /// syscall in a host emulation.
    Unspecified,
}

/// Provides access to a flash-like storage device.
///
/// This trait provides abstract operations on a device, as if it were a
/// block of erasable memory. It is the implementation's responsibility to
/// implement these operations efficiently with respect to the underlying
/// device.
///
/// Erases must be requested at the granularity reported by
/// [`Flash::erase_size()`]; the update path never relies on 4 KiB erases,
/// even when [`Flash::supports_4k_erase()`] reports them as available.
pub trait Flash {
    /// Returns the size, in bytes, of this device.
    fn size(&self) -> Result<u32, Error>;

    /// Returns the erase granularity of this device, in bytes.
    fn erase_size(&self) -> u32 {
        SECTOR_SIZE
    }

    /// Returns whether this device can erase a single 4 KiB block.
    fn supports_4k_erase(&self) -> bool {
        false
    }

    /// Attempts to read `out.len()` bytes starting at `offset`.
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error>;

    /// Attempts to erase `region`, setting every byte in it to `0xff`.
    fn erase(&mut self, region: Region) -> Result<(), Error>;

    /// Attempts to write `buf.len()` bytes starting at `offset`.
    ///
    /// The target range must have been erased beforehand; programming
    /// flash can only clear bits.
    ///
    /// Note that this function is not guaranteed to succeed (and be
    /// reflected in the return value of `read`) until `flush()` is called.
    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error>;

    /// Flushes any pending `program()` operations.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
assert_obj_safe!(Flash);

impl<F: Flash + ?Sized> Flash for &mut F {
    #[inline]
    fn size(&self) -> Result<u32, Error> {
        F::size(self)
    }

    #[inline]
    fn erase_size(&self) -> u32 {
        F::erase_size(self)
    }

    #[inline]
    fn supports_4k_erase(&self) -> bool {
        F::supports_4k_erase(self)
    }

    #[inline]
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        F::read(self, offset, out)
    }

    #[inline]
    fn erase(&mut self, region: Region) -> Result<(), Error> {
        F::erase(self, region)
    }

    #[inline]
    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
        F::program(self, offset, buf)
    }

    #[inline]
    fn flush(&mut self) -> Result<(), Error> {
        F::flush(self)
    }
}

/// Adapter for converting mutable, RAM-backed storage into a [`Flash`].
///
/// For the purposes of this type, "RAM-backed" means that `AsRef<[u8]>`
/// and `AsMut<[u8]>` are implemented.
///
/// Erases are checked against [`Flash::erase_size()`], so that tests catch
/// the same misaligned requests a real part would reject.
#[derive(Copy, Clone)]
pub struct RamMut<Bytes>(pub Bytes);

impl<Bytes: AsRef<[u8]>> RamMut<Bytes> {
    fn range(&self, region: Region) -> Result<core::ops::Range<usize>, Error> {
        let start = region.ptr.address as usize;
        let end = start
            .checked_add(region.len as usize)
            .ok_or(Error::OutOfRange)?;
        if end > self.0.as_ref().len() {
            return Err(Error::OutOfRange);
        }
        Ok(start..end)
    }
}

impl<Bytes: AsRef<[u8]> + AsMut<[u8]>> Flash for RamMut<Bytes> {
    fn size(&self) -> Result<u32, Error> {
        self.0
            .as_ref()
            .len()
            .try_into()
            .map_err(|_| Error::Unspecified)
    }

    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        let range = self.range(Region::new(offset.address, out.len() as u32))?;
        out.copy_from_slice(&self.0.as_ref()[range]);
        Ok(())
    }

    fn erase(&mut self, region: Region) -> Result<(), Error> {
        if !region.is_aligned_to(self.erase_size()) {
            return Err(Error::BadErase);
        }
        let range = self.range(region)?;
        for byte in &mut self.0.as_mut()[range] {
            *byte = 0xff;
        }
        Ok(())
    }

    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
        let range = self.range(Region::new(offset.address, buf.len() as u32))?;
        // Programming can only clear bits, exactly as on real NOR flash.
        for (dst, src) in self.0.as_mut()[range].iter_mut().zip(buf) {
            *dst &= *src;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
pub use self::std_impls::*;

#[cfg(feature = "std")]
mod std_impls {
    use core::convert::TryInto as _;
    use std::fs::File;
    use std::fs::OpenOptions;
    use std::io::Read as _;
    use std::io::Seek as _;
    use std::io::SeekFrom;
    use std::io::Write as _;
    use std::path::Path;
    use std::vec::Vec;

    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    use super::*;

    /// A file-backed emulation of a SPI flash part.
    ///
    /// The emulated device has the same shape as the hardware it stands in
    /// for: a 64 KiB erase size and no 4 KiB erase.
    pub struct FileFlash {
        file: File,
        len: u32,
    }

    impl FileFlash {
        /// Opens an existing flash image for reading and writing.
        pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|_| Error::Unspecified)?;
            let len = file
                .metadata()
                .map_err(|_| Error::Unspecified)?
                .len()
                .try_into()
                .map_err(|_| Error::OutOfRange)?;
            Ok(Self { file, len })
        }

        /// Creates a blank (all `0xff`) flash image of `len` bytes.
        pub fn create(path: impl AsRef<Path>, len: u32) -> Result<Self, Error> {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map_err(|_| Error::Unspecified)?;
            let blank = vec![0xff; SECTOR_SIZE as usize];
            let mut left = len as usize;
            while left > 0 {
                let n = left.min(blank.len());
                file.write_all(&blank[..n])
                    .map_err(|_| Error::Unspecified)?;
                left -= n;
            }
            Ok(Self { file, len })
        }

        fn seek(&self, region: Region) -> Result<&File, Error> {
            let end = region
                .ptr
                .address
                .checked_add(region.len)
                .ok_or(Error::OutOfRange)?;
            if end > self.len {
                return Err(Error::OutOfRange);
            }
            let mut file = &self.file;
            file.seek(SeekFrom::Start(region.ptr.address as u64))
                .map_err(|_| Error::Unspecified)?;
            Ok(file)
        }
    }

    impl Flash for FileFlash {
        fn size(&self) -> Result<u32, Error> {
            Ok(self.len)
        }

        fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
            let region = Region::new(offset.address, out.len() as u32);
            self.seek(region)?
                .read_exact(out)
                .map_err(|_| Error::Unspecified)
        }

        fn erase(&mut self, region: Region) -> Result<(), Error> {
            if !region.is_aligned_to(self.erase_size()) {
                return Err(Error::BadErase);
            }
            let mut file = self.seek(region)?;
            let blank = vec![0xff; self.erase_size() as usize];
            for _ in 0..region.len / self.erase_size() {
                file.write_all(&blank).map_err(|_| Error::Unspecified)?;
            }
            Ok(())
        }

        fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
            let region = Region::new(offset.address, buf.len() as u32);
            let mut current = vec![0; buf.len()];
            self.seek(region)?
                .read_exact(&mut current)
                .map_err(|_| Error::Unspecified)?;
            for (dst, src) in current.iter_mut().zip(buf) {
                *dst &= *src;
            }
            self.seek(region)?
                .write_all(&current)
                .map_err(|_| Error::Unspecified)
        }

        fn flush(&mut self) -> Result<(), Error> {
            self.file.sync_data().map_err(|_| Error::Unspecified)
        }
    }

    /// An operation journaled by a [`Recorder`].
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "serde", serde(tag = "op", rename_all = "snake_case"))]
    pub enum Op {
        /// An erase of the given region.
        Erase(Region),
        /// A program of the given region.
        Program(Region),
    }

    /// A [`Flash`] wrapper that records every erase and program.
    ///
    /// Reads and flushes are forwarded without being recorded. Operations
    /// the inner device rejects are still recorded, since they were issued.
    pub struct Recorder<F> {
        inner: F,
        ops: Vec<Op>,
    }

    impl<F: Flash> Recorder<F> {
        /// Wraps `inner`, with an empty journal.
        pub fn new(inner: F) -> Self {
            Self {
                inner,
                ops: Vec::new(),
            }
        }

        /// Returns the journal so far.
        pub fn ops(&self) -> &[Op] {
            &self.ops
        }

        /// Returns the recorded erases, in order.
        pub fn erases(&self) -> impl Iterator<Item = Region> + '_ {
            self.ops.iter().filter_map(|op| match op {
                Op::Erase(r) => Some(*r),
                _ => None,
            })
        }

        /// Returns the recorded programs, in order.
        pub fn programs(&self) -> impl Iterator<Item = Region> + '_ {
            self.ops.iter().filter_map(|op| match op {
                Op::Program(r) => Some(*r),
                _ => None,
            })
        }

        /// Returns the wrapped device.
        pub fn inner(&self) -> &F {
            &self.inner
        }

        /// Unwraps this recorder, returning the device and the journal.
        pub fn into_parts(self) -> (F, Vec<Op>) {
            (self.inner, self.ops)
        }
    }

    impl<F: Flash> Flash for Recorder<F> {
        fn size(&self) -> Result<u32, Error> {
            self.inner.size()
        }

        fn erase_size(&self) -> u32 {
            self.inner.erase_size()
        }

        fn supports_4k_erase(&self) -> bool {
            self.inner.supports_4k_erase()
        }

        fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
            self.inner.read(offset, out)
        }

        fn erase(&mut self, region: Region) -> Result<(), Error> {
            self.ops.push(Op::Erase(region));
            self.inner.erase(region)
        }

        fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
            self.ops
                .push(Op::Program(Region::new(offset.address, buf.len() as u32)));
            self.inner.program(offset, buf)
        }

        fn flush(&mut self) -> Result<(), Error> {
            self.inner.flush()
        }
    }
}

/// An abstract pointer into a [`Flash`] type.
///
/// A `Ptr` needs to be used in conjunction with a [`Flash`]
/// implementation to be read from or written to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ptr {
    /// The abstract address of this pointer.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub address: u32,
}

impl Ptr {
    /// Convenience method for creating a `Ptr` without having to use
    /// a struct literal.
    pub const fn new(address: u32) -> Self {
        Self { address }
    }
}

/// A region within a [`Flash`] type.
///
/// Much like a [`Ptr`], a `Region` needs to be interpreted with
/// respect to a [`Flash`] implementation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    /// The base pointer for this slice.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub ptr: Ptr,
    /// The length of the slice, in bytes.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub len: u32,
}

impl Region {
    /// Convenience method for creating a `Region` without having to use
    /// a struct literal.
    pub const fn new(ptr: u32, len: u32) -> Self {
        Self {
            ptr: Ptr::new(ptr),
            len,
        }
    }

    /// Returns the first address past the end of this region, if it does
    /// not overflow.
    pub fn end(self) -> Option<u32> {
        self.ptr.address.checked_add(self.len)
    }

    /// Returns whether both the start and length of this region are
    /// multiples of `align`, which must be a power of two.
    pub fn is_aligned_to(self, align: u32) -> bool {
        (self.ptr.address | self.len) & (align - 1) == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ram_erase_and_program() {
        let mut flash = RamMut(vec![0u8; 2 * SECTOR_SIZE as usize]);
        flash.erase(Region::new(SECTOR_SIZE, SECTOR_SIZE)).unwrap();
        flash.program(Ptr::new(SECTOR_SIZE + 4), b"abcd").unwrap();

        let mut out = [0; 8];
        flash.read(Ptr::new(SECTOR_SIZE), &mut out).unwrap();
        assert_eq!(&out, b"\xff\xff\xff\xffabcd");
        flash.read(Ptr::new(0), &mut out).unwrap();
        assert_eq!(out, [0; 8]);
    }

    #[test]
    fn ram_rejects_bad_requests() {
        let mut flash = RamMut(vec![0xffu8; SECTOR_SIZE as usize]);
        assert_eq!(
            flash.erase(Region::new(BLOCK_SIZE, SECTOR_SIZE)),
            Err(Error::BadErase)
        );
        assert_eq!(
            flash.erase(Region::new(SECTOR_SIZE, SECTOR_SIZE)),
            Err(Error::OutOfRange)
        );
        assert_eq!(
            flash.program(Ptr::new(SECTOR_SIZE - 2), b"abcd"),
            Err(Error::OutOfRange)
        );
    }

    #[test]
    #[cfg(feature = "std")]
    fn file_flash() {
        let path = std::env::temp_dir()
            .join(format!("pfr-update-flash-{}.img", std::process::id()));
        let mut flash = FileFlash::create(&path, 2 * SECTOR_SIZE).unwrap();
        assert_eq!(flash.size().unwrap(), 2 * SECTOR_SIZE);
        assert!(!flash.supports_4k_erase());

        flash.program(Ptr::new(0x10), b"hello").unwrap();
        flash.flush().unwrap();
        drop(flash);

        let mut flash = FileFlash::open(&path).unwrap();
        let mut out = [0; 6];
        flash.read(Ptr::new(0x10), &mut out).unwrap();
        assert_eq!(&out, b"hello\xff");

        flash.erase(Region::new(0, SECTOR_SIZE)).unwrap();
        flash.read(Ptr::new(0x10), &mut out).unwrap();
        assert_eq!(out, [0xff; 6]);
        assert_eq!(
            flash.erase(Region::new(0, BLOCK_SIZE)),
            Err(Error::BadErase)
        );
        assert_eq!(
            flash.read(Ptr::new(2 * SECTOR_SIZE - 1), &mut out),
            Err(Error::OutOfRange)
        );

        drop(flash);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    #[cfg(feature = "std")]
    fn recorder_journal() {
        let mut flash = Recorder::new(RamMut(vec![0u8; SECTOR_SIZE as usize]));
        flash.erase(Region::new(0, SECTOR_SIZE)).unwrap();
        flash.program(Ptr::new(0x20), &[0; 16]).unwrap();
        assert!(flash.program(Ptr::new(SECTOR_SIZE), &[0; 1]).is_err());

        assert_eq!(
            flash.ops(),
            &[
                Op::Erase(Region::new(0, SECTOR_SIZE)),
                Op::Program(Region::new(0x20, 16)),
                Op::Program(Region::new(SECTOR_SIZE, 1)),
            ]
        );
        assert_eq!(flash.erases().count(), 1);
        assert_eq!(flash.programs().map(|r| r.len).sum::<u32>(), 17);
    }
}
