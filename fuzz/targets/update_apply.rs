// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Fuzz tests for the update path, against a small in-memory flash.
//!
//! Authentication always succeeds, so that the walk sees arbitrary bitmaps.

#![no_main]

use libfuzzer_sys::fuzz_target;

use pfr_update::hardware::flash::RamMut;
use pfr_update::update;

fuzz_target!(|data: &[u8]| {
    let mut flash = RamMut(vec![0xff; 0x200000]);
    let mut accept = |_: &[u8], _: bool| true;
    let _ = update::apply_update(&mut flash, &mut accept, data, 0, false);
});
