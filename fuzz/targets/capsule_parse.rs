// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Fuzz tests for the capsule decoders and the region index built over
//! them.

#![no_main]

use libfuzzer_sys::fuzz_target;

use pfr_update::capsule::block::CancellationCert;
use pfr_update::capsule::Capsule;
use pfr_update::policy::RegionIndex;

fuzz_target!(|data: &[u8]| {
    let _ = CancellationCert::parse(data);

    let capsule = match Capsule::parse(data) {
        Ok(c) => c,
        Err(_) => return,
    };
    assert!(capsule.payload().len() <= data.len());

    let index = RegionIndex::new(capsule.manifest());
    for region in capsule.manifest().spi_regions() {
        let _ = index.classify(region.range());
    }
});
