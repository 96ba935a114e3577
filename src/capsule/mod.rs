// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! PFR signed capsules.
//!
//! A capsule is the signed image handed to the update path. It carries a
//! Platform Firmware Manifest (PFM) describing the protected regions of the
//! flash, and a "compressed" payload: only the 4 KiB blocks that actually
//! change are present, addressed by a pair of bitmaps.
//!
//! # Wire Format
//!
//! A capsule has the following layout, expressed as a pseudo-Rust struct.
//! Integers are encoded in little-endian order.
//! ```ignore
//! struct Capsule {
//!     // Signs everything after it; see `block::SignedHeader`.
//!     capsule_header: [u8; 1024],
//!
//!     // Signs the manifest alone.
//!     manifest_header: [u8; 1024],
//!     manifest: Manifest, // See `manifest::ManifestHeader`.
//!     _: [u8; block_round(manifest.length, 128) - manifest.length],
//!
//!     compression: CompressionHeader, // See `pbc::CompressionHeader`.
//!     active_map: [u8; compression.bitmap_size / 8],
//!     copy_map: [u8; compression.bitmap_size / 8],
//!     payload: [u8; compression.payload_length],
//! }
//! ```
//!
//! Bit `n` of either bitmap refers to the 4 KiB block at flash offset
//! `n * 0x1000`, counting from the most significant bit of each byte. The
//! *active map* marks blocks that must be erased; the *copy map* marks the
//! erased blocks that are then overwritten, in order, from the payload.
//!
//! Every size field is treated as untrusted: [`Capsule::parse()`] checks
//! each structure against the bytes actually present, and fails with an
//! [`Error`] rather than reading out of bounds.

use crate::io;
use crate::io::Read;

pub mod block;
pub mod manifest;
pub mod pbc;

pub use block::SignedHeader;
pub use manifest::Descriptor;
pub use manifest::Manifest;
pub use manifest::SpiRegion;
pub use pbc::CompressionHeader;

/// The size of a block addressed by a capsule bitmap.
pub use crate::hardware::flash::BLOCK_SIZE;

/// The alignment the manifest is padded to within a capsule.
pub const MANIFEST_ALIGN: u32 = 128;

/// A capsule parsing error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The capsule ended before a structure it declares.
    Truncated,
    /// A structure did not start with its magic number.
    BadMagic {
        /// The magic number this structure should start with.
        expected: u32,
        /// The value actually found.
        found: u32,
    },
    /// The manifest is shorter than its own header.
    ManifestTooShort,
    /// The manifest, once padded, runs past the end of the capsule.
    ManifestTooLong,
    /// The compression header declares a page size other than 4 KiB.
    UnsupportedPageSize,
    /// The bitmap size is not a whole number of bytes.
    BadBitmapSize,
    /// The payload is shorter than the compression header declares, or
    /// than the copy map requires.
    PayloadTooShort,
    /// A region descriptor runs past the end of the manifest.
    TruncatedDescriptor,
    /// The structure does not have the content type required of it, such
    /// as a key cancellation certificate without the cancellation bit.
    WrongContentType {
        /// The raw content type found.
        found: u32,
    },
}

impl From<io::Error> for Error {
    fn from(_: io::Error) -> Self {
        Self::Truncated
    }
}

debug_from!(Error => io::Error);

/// Rounds `len` up to a multiple of `blk`, which must be a power of two.
///
/// Returns `None` on overflow.
pub fn block_round(len: u32, blk: u32) -> Option<u32> {
    len.checked_add(blk.wrapping_sub(len & (blk - 1)) & (blk - 1))
}

/// Reads a `u32` magic number, failing unless it is `expected`.
pub(crate) fn expect_magic<'a, R: Read<'a>>(
    mut r: R,
    expected: u32,
) -> crate::Result<(), Error> {
    let found = r.read_le::<u32>()?;
    check!(found == expected, Error::BadMagic { expected, found });
    Ok(())
}

wire_enum! {
    /// A content type, the `pc_type` of a Header Block.
    ///
    /// Key cancellation certificates use the content type whose keys they
    /// cancel, with [`ContentType::CANCELLATION`] set.
    pub enum ContentType: u32 {
        /// A CPLD firmware update.
        CpldUpdate = 0x00,
        /// A PCH (host) PFM.
        PchPfm = 0x01,
        /// A PCH (host) firmware update.
        PchUpdate = 0x02,
        /// A BMC PFM.
        BmcPfm = 0x03,
        /// A BMC firmware update.
        BmcUpdate = 0x04,
        /// A partial update.
        PartialUpdate = 0x05,
        /// An attestation firmware manifest (AFM) update.
        AfmUpdate = 0x06,
        /// A combined CPLD update.
        CombinedCpldUpdate = 0x07,
        /// A per-device AFM.
        PerDeviceAfm = 0x08,
        /// A retimer firmware update.
        RetimerUpdate = 0x09,
        /// An AFM to be added to an existing AFM update.
        AddToUpdateAfm = 0x0a,
        /// A secure-boot BMC image.
        SecureBootBmc = 0xf1,
        /// A secure-boot OTP image.
        SecureBootOtp = 0xf2,
        /// A PFR decommission request.
        Decommission = 0x200,
    }
}

impl ContentType {
    /// The bit marking a key cancellation certificate.
    pub const CANCELLATION: u32 = 0x100;

    /// Decodes a raw `pc_type`, returning the base content type and whether
    /// the cancellation bit is set.
    pub fn from_pc_type(pc_type: u32) -> Option<(Self, bool)> {
        use crate::wire::WireEnum as _;

        if let Some(ty) = Self::from_wire_value(pc_type) {
            return Some((ty, false));
        }
        if pc_type & !0xff == Self::CANCELLATION {
            return Self::from_wire_value(pc_type & 0xff).map(|ty| (ty, true));
        }
        None
    }

    /// Returns the largest protected content, in bytes, a capsule of this
    /// type may carry, if the type has such a limit.
    pub fn max_size(self) -> Option<u32> {
        const K: u32 = 1024;
        const M: u32 = 1024 * K;
        Some(match self {
            Self::PchPfm | Self::BmcPfm => 64 * K,
            Self::CpldUpdate | Self::RetimerUpdate => M,
            Self::PchUpdate => 24 * M,
            Self::BmcUpdate => 33 * M,
            Self::AfmUpdate | Self::PerDeviceAfm | Self::AddToUpdateAfm => {
                512 * K
            }
            Self::CombinedCpldUpdate => 2 * M,
            Self::SecureBootBmc => 32 * M,
            Self::SecureBootOtp => 67 * K,
            Self::PartialUpdate | Self::Decommission => return None,
        })
    }
}

/// Bit access to capsule bitmaps.
#[extend::ext(name = BitmapExt)]
pub impl [u8] {
    /// Returns bit `blk`, counting from the most significant bit of each
    /// byte. Bits past the end of the map read as clear.
    fn bit(&self, blk: u32) -> bool {
        let byte = match self.get(blk as usize / 8) {
            Some(b) => *b,
            None => return false,
        };
        (byte >> (7 - blk % 8)) & 1 == 1
    }

    /// Returns whether the two bytes starting at bit `blk` (that is, the
    /// next sixteen blocks) are both equal to `byte`.
    fn window_is(&self, blk: u32, byte: u8) -> bool {
        let i = blk as usize / 8;
        matches!(self.get(i..i + 2), Some(w) if w == [byte, byte])
    }

    /// Returns the number of set bits.
    fn count_set(&self) -> u32 {
        self.iter().map(|b| b.count_ones()).sum()
    }
}

/// A parsed capsule.
///
/// All variable-length parts borrow from the image passed to
/// [`Capsule::parse()`].
#[derive(Clone, Debug)]
pub struct Capsule<'a> {
    bytes: &'a [u8],
    header: SignedHeader,
    manifest_header: SignedHeader,
    manifest_bytes: &'a [u8],
    manifest: Manifest<'a>,
    compression: CompressionHeader,
    active_map: &'a [u8],
    copy_map: &'a [u8],
    payload: &'a [u8],
}

impl<'a> Capsule<'a> {
    /// Parses a capsule out of `bytes`.
    ///
    /// Trailing bytes past the declared payload are ignored.
    pub fn parse(bytes: &'a [u8]) -> crate::Result<Self, Error> {
        let mut r = bytes;
        let header = SignedHeader::parse(&mut r)?;

        let manifest_start = r;
        let manifest_header = SignedHeader::parse(&mut r)?;
        let manifest = Manifest::parse(&mut r)?;
        let manifest_len = SignedHeader::SIZE + manifest.padded_len() as usize;
        let manifest_bytes = &manifest_start[..manifest_len];

        let compression = CompressionHeader::parse(&mut r)?;
        let map_len = compression.bitmap_size as usize / 8;
        let active_map = r.read_bytes(map_len)?;
        let copy_map = r.read_bytes(map_len)?;

        let payload_len = compression.payload_length as usize;
        check!(r.remaining_data() >= payload_len, Error::PayloadTooShort);
        let copied = copy_map.count_set() as u64 * BLOCK_SIZE as u64;
        check!(payload_len as u64 >= copied, Error::PayloadTooShort);
        let payload = r.read_bytes(payload_len)?;

        trace!(
            "parsed capsule: pc_type {:#x}, {} bitmap bits, {} payload bytes",
            header.header.pc_type,
            compression.bitmap_size,
            payload_len,
        );

        Ok(Self {
            bytes,
            header,
            manifest_header,
            manifest_bytes,
            manifest,
            compression,
            active_map,
            copy_map,
            payload,
        })
    }

    /// Returns the whole capsule image, as passed to `parse()`.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Returns the Header Block and Signature Block signing the capsule.
    pub fn header(&self) -> &SignedHeader {
        &self.header
    }

    /// Returns the raw content type of the capsule.
    pub fn pc_type(&self) -> u32 {
        self.header.header.pc_type
    }

    /// Returns the Header Block and Signature Block signing the manifest.
    pub fn manifest_header(&self) -> &SignedHeader {
        &self.manifest_header
    }

    /// Returns the bytes written verbatim to the manifest region of the
    /// flash: the manifest's Header and Signature Blocks followed by the
    /// padded manifest.
    pub fn manifest_bytes(&self) -> &'a [u8] {
        self.manifest_bytes
    }

    /// Returns the parsed manifest.
    pub fn manifest(&self) -> &Manifest<'a> {
        &self.manifest
    }

    /// Returns the compression header.
    pub fn compression(&self) -> &CompressionHeader {
        &self.compression
    }

    /// Returns the number of blocks the bitmaps cover.
    pub fn bitmap_bits(&self) -> u32 {
        self.compression.bitmap_size
    }

    /// Returns the active (erase) map.
    pub fn active_map(&self) -> &'a [u8] {
        self.active_map
    }

    /// Returns the copy (program) map.
    pub fn copy_map(&self) -> &'a [u8] {
        self.copy_map
    }

    /// Returns the payload: the copy-marked blocks, concatenated in order.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use pretty_assertions::assert_eq;
    use testutil::capsule::Builder;

    use crate::wire::WireEnum as _;

    #[test]
    fn rounding() {
        assert_eq!(block_round(0, 128), Some(0));
        assert_eq!(block_round(1, 128), Some(128));
        assert_eq!(block_round(128, 128), Some(128));
        assert_eq!(block_round(129, 128), Some(256));
        assert_eq!(block_round(0x50, 128), Some(128));
        assert_eq!(block_round(u32::MAX, 128), None);
    }

    #[test]
    fn bitmap_bits() {
        let map = [0b1000_0001, 0xff, 0x00];
        assert!(map.bit(0));
        assert!(!map.bit(1));
        assert!(map.bit(7));
        assert!(map.bit(8));
        assert!(!map.bit(16));
        assert!(!map.bit(100));
        assert!(!map[1..].window_is(0, 0xff));
        assert!([0xff, 0xff].window_is(0, 0xff));
        assert!(!map.window_is(16, 0x00));
        assert_eq!(map.count_set(), 10);
    }

    #[test]
    fn content_types() {
        assert_eq!(
            ContentType::from_pc_type(0x04),
            Some((ContentType::BmcUpdate, false))
        );
        assert_eq!(
            ContentType::from_pc_type(0x104),
            Some((ContentType::BmcUpdate, true))
        );
        assert_eq!(
            ContentType::from_pc_type(0x200),
            Some((ContentType::Decommission, false))
        );
        assert_eq!(ContentType::from_pc_type(0x0b), None);
        assert_eq!(ContentType::from_pc_type(0x3f1), None);
        assert_eq!(ContentType::SecureBootBmc.to_wire_value(), 0xf1);
        assert_eq!(ContentType::PchPfm.max_size(), Some(64 * 1024));
    }

    #[test]
    fn parse_round_trip() {
        let image = Builder::new()
            .pc_type(0x04)
            .svn(7)
            .oem_byte(0x01)
            .spi_region(0x0, 0x10000, 0x01)
            .spi_region(0x10000, 0x20000, 0x00)
            .smbus_rule(2, 1, 0x40)
            .bitmaps(&[0xff, 0xff], &[0xff, 0x00])
            .build();
        let capsule = Capsule::parse(&image).unwrap();

        assert_eq!(capsule.pc_type(), 0x04);
        assert_eq!(capsule.header().header.pc_length as usize, image.len() - 1024);
        assert_eq!(capsule.manifest().header().svn, 7);
        assert!(capsule.manifest().header().uses_current_layout());
        assert_eq!(capsule.bitmap_bits(), 16);
        assert_eq!(capsule.active_map(), &[0xff, 0xff]);
        assert_eq!(capsule.copy_map(), &[0xff, 0x00]);
        assert_eq!(capsule.payload().len(), 8 * BLOCK_SIZE as usize);
        assert_eq!(capsule.compression().page_size, BLOCK_SIZE);

        let manifest_len = capsule.manifest().padded_len() as usize;
        assert_eq!(manifest_len % 128, 0);
        assert_eq!(capsule.manifest_bytes(), &image[1024..2048 + manifest_len]);

        let regions = capsule
            .manifest()
            .descriptors()
            .filter_map(|d| match d {
                Descriptor::Spi(r) => Some((r.start, r.end, r.is_signed())),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(regions, vec![(0, 0x10000, true), (0x10000, 0x20000, false)]);
        assert_eq!(capsule.manifest().descriptors().count(), 3);
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut image = Builder::new().build();
        image[0] ^= 1;
        assert_eq!(
            Capsule::parse(&image).unwrap_err().into_inner(),
            Error::BadMagic {
                expected: block::HeaderBlock::MAGIC,
                found: block::HeaderBlock::MAGIC ^ 1,
            }
        );

        let image = Builder::new().manifest_magic(0x1234_5678).build();
        assert_eq!(
            Capsule::parse(&image).unwrap_err().into_inner(),
            Error::BadMagic {
                expected: manifest::ManifestKind::Pfm.to_wire_value(),
                found: 0x1234_5678,
            }
        );
    }

    #[test]
    fn parse_rejects_truncation() {
        let image = Builder::new().bitmaps(&[0xff, 0xff], &[0xff, 0xff]).build();
        for &len in &[0, 100, 1024, 2048 + 16, image.len() - 1] {
            assert!(Capsule::parse(&image[..len]).is_err(), "len = {}", len);
        }
        assert!(Capsule::parse(&image).is_ok());

        let mut long = image.clone();
        long.extend_from_slice(&[0; 64]);
        assert_eq!(Capsule::parse(&long).unwrap().payload().len(), 16 * 4096);
    }

    #[test]
    fn parse_rejects_bad_sizes() {
        let image = Builder::new().bitmap_size_override(12).build();
        assert_eq!(
            Capsule::parse(&image).unwrap_err().into_inner(),
            Error::BadBitmapSize
        );

        let image = Builder::new().page_size(0x10000).build();
        assert_eq!(
            Capsule::parse(&image).unwrap_err().into_inner(),
            Error::UnsupportedPageSize
        );

        let image = Builder::new().manifest_length_override(16).build();
        assert_eq!(
            Capsule::parse(&image).unwrap_err().into_inner(),
            Error::ManifestTooShort
        );

        let image = Builder::new().manifest_length_override(0x10_0000).build();
        assert_eq!(
            Capsule::parse(&image).unwrap_err().into_inner(),
            Error::ManifestTooLong
        );

        let image = Builder::new()
            .bitmaps(&[0xff, 0xff], &[0xff, 0xff])
            .payload_length_override(17 * 4096)
            .build();
        assert_eq!(
            Capsule::parse(&image).unwrap_err().into_inner(),
            Error::PayloadTooShort
        );

        // The payload must hold every copy-marked block, even if the header
        // agrees with the bytes present.
        let image = Builder::new()
            .bitmaps(&[0xff, 0xff], &[0xff, 0xf0])
            .payload(vec![0x5a; 11 * 4096])
            .build();
        assert_eq!(
            Capsule::parse(&image).unwrap_err().into_inner(),
            Error::PayloadTooShort
        );
        let image = Builder::new()
            .bitmaps(&[0xff, 0xff], &[0xff, 0xf0])
            .payload(vec![0x5a; 12 * 4096])
            .build();
        assert!(Capsule::parse(&image).is_ok());
    }
}
