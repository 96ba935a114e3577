// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable capsule authentication.
//!
//! `pfr-update` never applies a capsule that has not been authenticated,
//! but it does not verify signatures itself. Instead, the integration
//! provides an [`Authenticate`] implementation, which may suit particular
//! hardware or certification needs.
//!
//! A software implementation that checks everything short of the ECDSA
//! signatures themselves is provided under the [`ring` module], based on the
//! [`ring`] crate. Its presence is controlled by the `ring` feature flag.
//!
//! [`ring` module]: ring/index.html

use static_assertions::assert_obj_safe;

#[cfg(feature = "ring")]
pub mod ring;

/// A capsule authenticator.
///
/// Closures of the shape `FnMut(&[u8], bool) -> bool` implement this trait.
pub trait Authenticate {
    /// Returns whether `capsule`, a complete capsule image, is authentic.
    ///
    /// When `require_root_key_chain` is set, the capsule's root key must
    /// also match the key provisioned on the platform. Recovery flows clear
    /// it.
    fn authenticate(
        &mut self,
        capsule: &[u8],
        require_root_key_chain: bool,
    ) -> bool;
}
assert_obj_safe!(Authenticate);

impl<F> Authenticate for F
where
    F: FnMut(&[u8], bool) -> bool,
{
    fn authenticate(
        &mut self,
        capsule: &[u8],
        require_root_key_chain: bool,
    ) -> bool {
        self(capsule, require_root_key_chain)
    }
}
