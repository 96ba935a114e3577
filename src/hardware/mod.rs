// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable hardware functionality.
//!
//! This module provides traits for plugging in the platform's flash driver.
//! `pfr-update` drives erase and program operations through these traits
//! and never talks to device registers itself.

pub mod flash;
