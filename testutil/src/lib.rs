// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Test data for `pfr-update`.
//!
//! Capsules are assembled on the fly rather than checked in, so that each
//! test can state the handful of fields it cares about.

pub mod capsule;
