// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! I/O interfaces, in lieu of [`std::io`].
//!
//! These traits are intended for walking byte buffers, such as a capsule
//! image, with every access bounds-checked. A failed read never panics; it
//! returns [`Error::BufferExhausted`].

pub mod endian;
pub mod read;

pub use read::Read;

/// A generic, low-level I/O error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that some underlying buffer has been completely used up,
    /// either for reading from or writing to.
    ///
    /// This is typically a fatal error, since it is probably not possible
    /// to re-allocate that underlying buffer.
    BufferExhausted,
}
