// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Fixed flash addresses used by the update path.
//!
//! These describe the single hardware generation known to use the
//! dual-image layout. They are plain data so that an integration with a
//! different flash map can supply its own.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::capsule::manifest::ManifestHeader;

/// Where the standard update path writes a capsule's manifest.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct ManifestPlacement {
    /// The manifest address for images using the legacy flash map.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub legacy: u32,

    /// The manifest address for images using the current flash map, as
    /// selected by the manifest's layout byte.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub current: u32,

    /// The size of the region erased before the manifest is written.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub region_size: u32,
}

impl Default for ManifestPlacement {
    fn default() -> Self {
        Self {
            legacy: 0x80000,
            current: 0x100000,
            region_size: 0x20000,
        }
    }
}

impl ManifestPlacement {
    /// Returns the address, before any device offset, of the manifest
    /// described by `header`.
    pub fn address_for(&self, header: &ManifestHeader) -> u32 {
        match header.uses_current_layout() {
            true => self.current,
            false => self.legacy,
        }
    }
}

/// The flash map of a dual-image ("secure boot") device.
///
/// The secondary image is a copy of the primary placed at
/// `secondary_image_offset`, with the blocks between the loader and the FIT
/// image dropped. Block numbers are in units of
/// [`BLOCK_SIZE`](crate::capsule::BLOCK_SIZE).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct SecureBootLayout {
    /// The device offset of the secondary image.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub secondary_image_offset: u32,

    /// The first block of the FIT image.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub fit_image_block: u32,

    /// How many blocks the secondary image omits before the FIT image.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub blocks_skip: u32,

    /// The first block past the boot loader. Loader blocks of a secure-boot
    /// image aimed at the secondary image are written to the primary.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub loader_block: u32,

    /// The manifest address, before any device offset.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub manifest_address: u32,

    /// The size of the region erased before the manifest is written.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde::de_radix")
    )]
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::serde::se_hex"))]
    pub manifest_region_size: u32,
}

impl Default for SecureBootLayout {
    fn default() -> Self {
        Self {
            secondary_image_offset: 0x04000000,
            fit_image_block: 0xb00,
            blocks_skip: 0xa60,
            loader_block: 0x10,
            manifest_address: 0x80000,
            manifest_region_size: 0x20000,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let layout = SecureBootLayout::default();
        assert_eq!(layout.secondary_image_offset, 0x04000000);
        assert_eq!(layout.fit_image_block - layout.blocks_skip, 0xa0);
        assert_eq!(ManifestPlacement::default().current, 0x100000);
    }

    #[test]
    #[cfg(feature = "serde")]
    fn from_json() {
        let layout: SecureBootLayout = serde_json::from_str(
            r#"{
                "secondary_image_offset": "0x2000000",
                "loader_block": 32
            }"#,
        )
        .unwrap();
        assert_eq!(
            layout,
            SecureBootLayout {
                secondary_image_offset: 0x2000000,
                loader_block: 32,
                ..SecureBootLayout::default()
            }
        );

        let json = serde_json::to_value(&ManifestPlacement::default()).unwrap();
        assert_eq!(json["current"], "0x100000");

        assert!(serde_json::from_str::<ManifestPlacement>(r#"{"bogus": 1}"#)
            .is_err());
    }
}
