// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Region policy.
//!
//! The update path may leave blocks that no signature covers alone rather
//! than erase them. This module answers, for a range of flash, whether the
//! manifest declares it signed or unsigned.

use core::ops::Range;

use crate::capsule::Manifest;
use crate::capsule::BLOCK_SIZE;

/// Whether a region is covered by a signature.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// The region carries no digest.
    Unsigned,
    /// The region carries at least one digest.
    Signed,
}

/// The result of classifying a range against a [`RegionIndex`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Coverage {
    /// The range lies wholly within a region with the given status.
    Within(Status),
    /// The first region containing the first block of the range ends
    /// inside it.
    Straddles,
    /// No region contains the first block of the range.
    Outside,
}

/// An index over the SPI regions of a manifest.
///
/// Regions are consulted in manifest order, and the first match wins.
#[derive(Copy, Clone, Debug)]
pub struct RegionIndex<'a> {
    manifest: Manifest<'a>,
}

impl<'a> RegionIndex<'a> {
    /// Builds an index over `manifest`.
    pub fn new(manifest: &Manifest<'a>) -> Self {
        Self {
            manifest: *manifest,
        }
    }

    /// Classifies the half-open address range `range`.
    ///
    /// A region that starts at or before the range but ends before its
    /// first whole block is passed over, as if it did not contain the range
    /// at all.
    pub fn classify(&self, range: Range<u32>) -> Coverage {
        let first_block_end = range.start.saturating_add(BLOCK_SIZE);
        for region in self.manifest.spi_regions() {
            if region.start > range.start {
                continue;
            }
            if range.end <= region.end {
                return Coverage::Within(match region.is_signed() {
                    true => Status::Signed,
                    false => Status::Unsigned,
                });
            }
            if first_block_end <= region.end {
                return Coverage::Straddles;
            }
        }
        Coverage::Outside
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use testutil::capsule::Builder;

    use crate::capsule::Capsule;

    fn with_index(builder: Builder, f: impl FnOnce(RegionIndex)) {
        let image = builder.build();
        let capsule = Capsule::parse(&image).unwrap();
        f(RegionIndex::new(capsule.manifest()))
    }

    #[test]
    fn within() {
        let builder = Builder::new()
            .spi_region(0x0, 0x10000, 0x01)
            .spi_region(0x10000, 0x40000, 0x00);
        with_index(builder, |index| {
            assert_eq!(
                index.classify(0x0..0x10000),
                Coverage::Within(Status::Signed)
            );
            assert_eq!(
                index.classify(0x10000..0x20000),
                Coverage::Within(Status::Unsigned)
            );
            assert_eq!(
                index.classify(0x3f000..0x40000),
                Coverage::Within(Status::Unsigned)
            );
        });
    }

    #[test]
    fn first_match_wins() {
        let builder = Builder::new()
            .spi_region(0x0, 0x40000, 0x00)
            .spi_region(0x10000, 0x20000, 0x02);
        with_index(builder, |index| {
            assert_eq!(
                index.classify(0x10000..0x11000),
                Coverage::Within(Status::Unsigned)
            );
        });
    }

    #[test]
    fn straddles() {
        let builder = Builder::new()
            .spi_region(0x0, 0x8000, 0x00)
            .spi_region(0x8000, 0x20000, 0x00);
        with_index(builder, |index| {
            assert_eq!(index.classify(0x0..0x10000), Coverage::Straddles);
            assert_eq!(
                index.classify(0x0..0x1000),
                Coverage::Within(Status::Unsigned)
            );
        });
    }

    #[test]
    fn partial_first_block() {
        let builder = Builder::new()
            .spi_region(0x0, 0x800, 0x00)
            .spi_region(0x0, 0x20000, 0x01);
        with_index(builder, |index| {
            assert_eq!(
                index.classify(0x0..0x10000),
                Coverage::Within(Status::Signed)
            );
        });

        let builder = Builder::new().spi_region(0x0, 0x800, 0x00);
        with_index(builder, |index| {
            assert_eq!(index.classify(0x0..0x10000), Coverage::Outside);
            assert_eq!(index.classify(0x0..0x1000), Coverage::Outside);
        });
    }

    #[test]
    fn outside() {
        let builder = Builder::new()
            .spi_region(0x10000, 0x20000, 0x00)
            .smbus_rule(0, 0, 0)
            .raw_descriptor(&[0xee])
            .spi_region(0x0, 0x10000, 0x00);
        with_index(builder, |index| {
            // The region after the unknown tag is never seen.
            assert_eq!(index.classify(0x0..0x10000), Coverage::Outside);
            assert_eq!(index.classify(0x20000..0x30000), Coverage::Outside);
        });
    }
}
