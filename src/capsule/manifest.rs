// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Platform Firmware Manifests.
//!
//! A manifest is a short header followed by a packed list of descriptors,
//! each starting with a one-byte tag that selects its shape:
//! ```ignore
//! struct ManifestHeader {
//!     magic: u32, // See `ManifestKind`.
//!     svn: u8,
//!     bkc: u8,
//!     revision: u16,
//!     platform: u32, // Absent in AFMs.
//!     oem_data: [u8; 16],
//!     length: u32, // Including this header.
//! }
//!
//! struct SpiRegion { // Tag 1.
//!     tag: u8,
//!     mask: u8,
//!     hash_info: u16,
//!     _: u32,
//!     start: u32,
//!     end: u32,
//!     sha256: [u8; 32], // If `hash_info & 0x01`.
//!     sha384: [u8; 48], // If `hash_info & 0x02`.
//! }
//!
//! struct SmbusRule { // Tag 2.
//!     tag: u8,
//!     _: u32,
//!     bus: u8,
//!     rule: u8,
//!     addr: u8,
//!     allowlist: [u8; 32],
//! }
//!
//! struct FvmAddress { // Tag 3.
//!     tag: u8,
//!     fvm_type: u16,
//!     _: u32,
//!     addr: u32,
//! }
//!
//! struct FvmCapabilities { // Tag 4.
//!     tag: u8,
//!     _: u16,
//!     revision: u8,
//!     length: u16,
//!     version: [u8; 4],
//!     layout: u32,
//!     actions: u32,
//!     _: [u8; 26],
//!     description: [u8; 20],
//! }
//! ```
//! A tag outside this set ends the list.

use core::ops::Range;

use crate::capsule::block_round;
use crate::capsule::Error;
use crate::capsule::MANIFEST_ALIGN;
use crate::io;
use crate::io::Read;
use crate::wire::WireEnum as _;

type Result<T> = crate::Result<T, Error>;

wire_enum! {
    /// A kind of manifest, identified by its magic number.
    pub enum ManifestKind: u32 {
        /// A Platform Firmware Manifest.
        Pfm = 0x02b3ce1d,
        /// An Attestation Firmware Manifest.
        Afm = 0x8883ce1d,
        /// A CPLD Firmware Manifest.
        Cfm = 0xa8e7c2d6,
        /// A Firmware Volume Manifest.
        Fvm = 0xa8e7c2d4,
    }
}

/// A manifest header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ManifestHeader {
    /// The kind of manifest this is.
    pub kind: ManifestKind,
    /// The security version number.
    pub svn: u8,
    /// The BKC version.
    pub bkc: u8,
    /// The manifest revision.
    pub revision: u16,
    /// Platform-specific data; zero for AFMs, which lack this field.
    pub platform: u32,
    /// OEM-defined data.
    pub oem_data: [u8; 16],
    /// The length of the manifest, including this header, excluding
    /// padding.
    pub length: u32,
}

impl ManifestHeader {
    /// The index of the OEM data byte selecting the flash layout.
    pub const LAYOUT_BYTE: usize = 4;
    /// The value of [`Self::LAYOUT_BYTE`] selecting the current flash
    /// layout.
    pub const CURRENT_LAYOUT: u8 = 0x01;

    /// Parses a manifest header.
    pub fn parse<'a, R: Read<'a>>(mut r: R) -> Result<Self> {
        let (found, kind) = ManifestKind::read_from(&mut r)?;
        let kind = match kind {
            Some(kind) => kind,
            None => {
                return fail!(Error::BadMagic {
                    expected: ManifestKind::Pfm.to_wire_value(),
                    found,
                })
            }
        };

        let svn = r.read_le()?;
        let bkc = r.read_le()?;
        let revision = r.read_le()?;
        let platform = match kind {
            ManifestKind::Afm => 0,
            _ => r.read_le()?,
        };
        Ok(Self {
            kind,
            svn,
            bkc,
            revision,
            platform,
            oem_data: r.read_array()?,
            length: r.read_le()?,
        })
    }

    /// Returns the encoded size of this header.
    pub fn size(&self) -> u32 {
        match self.kind {
            ManifestKind::Afm => 28,
            _ => 32,
        }
    }

    /// Returns whether the OEM data selects the current flash layout,
    /// rather than the legacy one.
    pub fn uses_current_layout(&self) -> bool {
        self.oem_data[Self::LAYOUT_BYTE] == Self::CURRENT_LAYOUT
    }
}

/// A parsed manifest.
#[derive(Copy, Clone, Debug)]
pub struct Manifest<'a> {
    header: ManifestHeader,
    body: &'a [u8],
    padded_len: u32,
}

impl<'a> Manifest<'a> {
    /// Parses a manifest, consuming it and its padding out of `r`.
    ///
    /// Every descriptor is checked to lie within the manifest's declared
    /// length.
    pub fn parse<R: Read<'a>>(mut r: R) -> Result<Self> {
        let header = ManifestHeader::parse(&mut r)?;
        check!(header.length >= header.size(), Error::ManifestTooShort);
        let padded_len = match block_round(header.length, MANIFEST_ALIGN) {
            Some(len) => len,
            None => return fail!(Error::ManifestTooLong),
        };

        let rest = (padded_len - header.size()) as usize;
        check!(r.remaining_data() >= rest, Error::ManifestTooLong);
        let body = r.read_bytes((header.length - header.size()) as usize)?;
        r.skip((padded_len - header.length) as usize)?;

        let mut descriptors = body;
        while Descriptor::parse(&mut descriptors)?.is_some() {}

        Ok(Self {
            header,
            body,
            padded_len,
        })
    }

    /// Returns the manifest header.
    pub fn header(&self) -> &ManifestHeader {
        &self.header
    }

    /// Returns the encoded length of the manifest, padding included.
    pub fn padded_len(&self) -> u32 {
        self.padded_len
    }

    /// Returns an iterator over this manifest's descriptors, in order.
    pub fn descriptors(&self) -> Descriptors<'a> {
        Descriptors { r: self.body }
    }

    /// Returns an iterator over this manifest's SPI regions, in order.
    pub fn spi_regions(&self) -> impl Iterator<Item = SpiRegion> + 'a {
        self.descriptors().filter_map(|d| match d {
            Descriptor::Spi(region) => Some(region),
            _ => None,
        })
    }
}

/// An iterator over the descriptors of a [`Manifest`].
#[derive(Clone)]
pub struct Descriptors<'a> {
    r: &'a [u8],
}

impl Iterator for Descriptors<'_> {
    type Item = Descriptor;

    fn next(&mut self) -> Option<Descriptor> {
        let next = Descriptor::parse(&mut self.r).ok().flatten();
        if next.is_none() {
            self.r = &[];
        }
        next
    }
}

wire_enum! {
    /// The tag selecting the shape of a [`Descriptor`].
    pub enum DescriptorTag: u8 {
        /// A [`SpiRegion`].
        SpiRegion = 1,
        /// An [`SmbusRule`].
        SmbusRule = 2,
        /// An [`FvmAddress`].
        FvmAddress = 3,
        /// An [`FvmCapabilities`].
        FvmCapabilities = 4,
    }
}

/// A manifest descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Descriptor {
    /// A protected SPI flash region.
    Spi(SpiRegion),
    /// An SMBus filtering rule.
    Smbus(SmbusRule),
    /// The address of a firmware volume.
    FvmAddress(FvmAddress),
    /// The capabilities of a firmware volume.
    FvmCapabilities(FvmCapabilities),
}

impl Descriptor {
    /// Parses the next descriptor out of `r`.
    ///
    /// Returns `None` at the end of the list: when `r` is exhausted or the
    /// next tag is not a known one.
    pub fn parse<'a, R: Read<'a>>(mut r: R) -> Result<Option<Self>> {
        if r.remaining_data() == 0 {
            return Ok(None);
        }
        let tag = match DescriptorTag::read_from(&mut r)? {
            (_, Some(tag)) => tag,
            (raw, None) => {
                trace!("descriptor list ends at tag {:#04x}", raw);
                return Ok(None);
            }
        };

        match Self::parse_body(tag, r) {
            Ok(d) => Ok(Some(d)),
            Err(_) => fail!(Error::TruncatedDescriptor),
        }
    }

    fn parse_body<'a, R: Read<'a>>(
        tag: DescriptorTag,
        mut r: R,
    ) -> crate::Result<Self, io::Error> {
        Ok(match tag {
            DescriptorTag::SpiRegion => {
                let mask = r.read_le()?;
                let hash_info: u16 = r.read_le()?;
                r.skip(4)?;
                let start = r.read_le()?;
                let end = r.read_le()?;
                let sha256 = match hash_info & SpiRegion::HAS_SHA256 {
                    0 => None,
                    _ => Some(r.read_array()?),
                };
                let sha384 = match hash_info & SpiRegion::HAS_SHA384 {
                    0 => None,
                    _ => Some(r.read_array()?),
                };
                Self::Spi(SpiRegion {
                    mask,
                    hash_info,
                    start,
                    end,
                    sha256,
                    sha384,
                })
            }
            DescriptorTag::SmbusRule => {
                r.skip(4)?;
                Self::Smbus(SmbusRule {
                    bus: r.read_le()?,
                    rule: r.read_le()?,
                    addr: r.read_le()?,
                    allowlist: r.read_array()?,
                })
            }
            DescriptorTag::FvmAddress => {
                let fvm_type = r.read_le()?;
                r.skip(4)?;
                Self::FvmAddress(FvmAddress {
                    fvm_type,
                    addr: r.read_le()?,
                })
            }
            DescriptorTag::FvmCapabilities => {
                r.skip(2)?;
                let revision = r.read_le()?;
                let length = r.read_le()?;
                let version = r.read_array()?;
                let layout = r.read_le()?;
                let actions = r.read_le()?;
                r.skip(26)?;
                Self::FvmCapabilities(FvmCapabilities {
                    revision,
                    length,
                    version,
                    layout,
                    actions,
                    description: r.read_array()?,
                })
            }
        })
    }
}

/// A protected region of SPI flash.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpiRegion {
    /// The protection mask.
    pub mask: u8,
    /// Which digests of the region follow; zero for an unsigned region.
    pub hash_info: u16,
    /// The first byte of the region.
    pub start: u32,
    /// The first byte past the region.
    pub end: u32,
    /// The region's SHA-256 digest, if present.
    pub sha256: Option<[u8; 32]>,
    /// The region's SHA-384 digest, if present.
    pub sha384: Option<[u8; 48]>,
}

impl SpiRegion {
    /// The `hash_info` bit indicating a SHA-256 digest.
    pub const HAS_SHA256: u16 = 0x01;
    /// The `hash_info` bit indicating a SHA-384 digest.
    pub const HAS_SHA384: u16 = 0x02;

    /// Returns whether the region is covered by a signature.
    pub fn is_signed(&self) -> bool {
        self.hash_info != 0
    }

    /// Returns the region as a half-open address range.
    pub fn range(&self) -> Range<u32> {
        self.start..self.end
    }
}

/// An SMBus filtering rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SmbusRule {
    /// The bus id.
    pub bus: u8,
    /// The rule id.
    pub rule: u8,
    /// The device address.
    pub addr: u8,
    /// The command allowlist, as a bitmap.
    pub allowlist: [u8; 32],
}

/// The address of a firmware volume.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FvmAddress {
    /// The volume type.
    pub fvm_type: u16,
    /// The volume's address.
    pub addr: u32,
}

/// The capabilities of a firmware volume.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FvmCapabilities {
    /// The capability format revision.
    pub revision: u8,
    /// The capability length.
    pub length: u16,
    /// The volume version: major, minor, release, hotfix.
    pub version: [u8; 4],
    /// The volume layout.
    pub layout: u32,
    /// The actions to take on update.
    pub actions: u32,
    /// A human-readable description.
    pub description: [u8; 20],
}

#[cfg(test)]
mod test {
    use super::*;

    use pretty_assertions::assert_eq;
    use testutil::capsule::Builder;

    fn manifest_of(image: &[u8]) -> Manifest<'_> {
        Manifest::parse(&image[2048..]).unwrap()
    }

    #[test]
    fn descriptor_shapes() {
        let image = Builder::new()
            .spi_region(0x1000, 0x2000, 0x03)
            .smbus_rule(1, 2, 0x70)
            .fvm_address(0x2, 0x0400_0000)
            .fvm_capabilities([1, 2, 3, 4], 0x1)
            .spi_region(0x2000, 0x3000, 0x00)
            .build();
        let manifest = manifest_of(&image);
        let ds = manifest.descriptors().collect::<Vec<_>>();
        assert_eq!(ds.len(), 5);

        match ds[0] {
            Descriptor::Spi(r) => {
                assert_eq!(r.range(), 0x1000..0x2000);
                assert!(r.is_signed());
                assert!(r.sha256.is_some());
                assert!(r.sha384.is_some());
            }
            d => panic!("unexpected descriptor: {:?}", d),
        }
        match ds[1] {
            Descriptor::Smbus(s) => assert_eq!((s.bus, s.rule, s.addr), (1, 2, 0x70)),
            d => panic!("unexpected descriptor: {:?}", d),
        }
        match ds[2] {
            Descriptor::FvmAddress(f) => {
                assert_eq!((f.fvm_type, f.addr), (0x2, 0x0400_0000))
            }
            d => panic!("unexpected descriptor: {:?}", d),
        }
        match ds[3] {
            Descriptor::FvmCapabilities(c) => {
                assert_eq!(c.version, [1, 2, 3, 4]);
                assert_eq!(c.actions, 0x1);
            }
            d => panic!("unexpected descriptor: {:?}", d),
        }
        assert_eq!(manifest.spi_regions().count(), 2);
    }

    #[test]
    fn unknown_tag_ends_list() {
        let image = Builder::new()
            .spi_region(0, 0x1000, 0)
            .raw_descriptor(&[0x7f, 1, 2, 3])
            .spi_region(0x1000, 0x2000, 0)
            .build();
        let manifest = manifest_of(&image);
        assert_eq!(manifest.descriptors().count(), 1);
    }

    #[test]
    fn truncated_descriptor() {
        let image = Builder::new()
            .spi_region(0, 0x1000, 0)
            .raw_descriptor(&[1, 0, 0x01, 0, 0, 0, 0, 0])
            .build();
        assert_eq!(
            Manifest::parse(&image[2048..]).unwrap_err().into_inner(),
            Error::TruncatedDescriptor
        );
    }

    #[test]
    fn layout_byte() {
        for &(byte, current) in &[(0x01, true), (0xff, false), (0x00, false)] {
            let image = Builder::new().oem_byte(byte).build();
            assert_eq!(manifest_of(&image).header().uses_current_layout(), current);
        }
    }

    #[test]
    fn afm_header() {
        let image = Builder::new()
            .manifest_magic(0x8883ce1d)
            .spi_region(0, 0x1000, 0)
            .build();
        let manifest = manifest_of(&image);
        assert_eq!(manifest.header().kind, ManifestKind::Afm);
        assert_eq!(manifest.header().size(), 28);
        assert_eq!(manifest.header().platform, 0);
        assert_eq!(manifest.spi_regions().count(), 1);
    }
}
