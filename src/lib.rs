// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `pfr-update` applies signed Platform Firmware Resilience (PFR) update
//! capsules to raw flash.
//!
//! A capsule is a self-describing signed image: a Header Block and Signature
//! Block, a Platform Firmware Manifest (PFM) listing the protected regions of
//! the flash, and a compressed payload addressed by a pair of block bitmaps.
//! This crate decodes that layout without trusting any of its size fields
//! (see [`capsule`]), classifies flash ranges against the manifest's region
//! list (see [`policy`]), and turns the bitmaps into a short sequence of
//! erase and program operations against a [`Flash`] device (see [`update`]).
//!
//! Signature verification and the flash driver itself are supplied by the
//! integration, through the [`Authenticate`] and [`Flash`] traits.
//!
//! [`Flash`]: hardware::flash::Flash
//! [`Authenticate`]: crypto::Authenticate

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

#[cfg(feature = "log")]
#[doc(hidden)]
pub extern crate log as __raw_log;

#[macro_use]
mod debug;
pub use debug::Error;

#[macro_use]
pub mod wire;

#[cfg(feature = "serde")]
pub mod serde;

pub mod capsule;
pub mod crypto;
pub mod hardware;
pub mod io;
pub mod policy;
pub mod update;

/// A `Result` whose error is wrapped in [`Error`].
///
/// Every fallible operation in this crate returns this type; the wrapper is
/// how failures get logged at the point they are created.
pub type Result<T, E> = core::result::Result<T, Error<E>>;
