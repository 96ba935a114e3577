// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! An [`Authenticate`] implementation using the `ring` crate.
//!
//! [`Integrity`] checks the structure of a capsule's key chain and the
//! digests its Header Block declares. It does *not* verify any ECDSA
//! signature, so it is not a substitute for the platform's authenticator:
//! it catches corrupted and mis-assembled capsules, not forged ones.

use ring::digest;

use crate::capsule::block::CancellationCert;
use crate::capsule::block::Curve;
use crate::capsule::block::KeyEntry;
use crate::capsule::block::SignedHeader;
use crate::capsule::ContentType;
use crate::crypto::Authenticate;

/// A reason a capsule was rejected by [`Integrity`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The Header Block or Signature Block did not parse.
    Malformed,
    /// The content type is not a known one.
    UnknownContentType,
    /// A key uses an unknown curve, or a curve other than the root key's.
    BadCurve,
    /// A signature's magic does not match the signing key's curve.
    BadSignatureMagic,
    /// A key id is outside the cancellable range.
    BadKeyId,
    /// The signing key lacks the permission for the content type.
    NotPermitted,
    /// The protected content is larger than the capsule or than the
    /// content type allows.
    BadLength,
    /// The protected content does not match the Header Block's digest.
    DigestMismatch,
    /// The root key does not match the provisioned root key.
    UntrustedRoot,
}

/// A structural capsule authenticator.
#[derive(Clone, Debug, Default)]
pub struct Integrity {
    root_key_hash: Option<[u8; 32]>,
}

impl Integrity {
    /// Creates a new `Integrity` with no provisioned root key, which
    /// accepts any well-formed key chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `Integrity` that, when asked to check the root key
    /// chain, requires the SHA-256 of the root key to be `hash`.
    ///
    /// See [`root_key_hash()`] for how the hash is computed.
    pub fn with_root_key_hash(hash: [u8; 32]) -> Self {
        Self {
            root_key_hash: Some(hash),
        }
    }

    /// Checks `capsule`, returning why it was rejected, if it was.
    pub fn verify(
        &self,
        capsule: &[u8],
        require_root_key_chain: bool,
    ) -> crate::Result<(), Rejection> {
        let signed = match SignedHeader::parse(capsule) {
            Ok(signed) => signed,
            Err(_) => return fail!(Rejection::Malformed),
        };
        let header = &signed.header;
        let signature = &signed.signature;

        let (ty, cancellation) = match ContentType::from_pc_type(header.pc_type)
        {
            Some(ty) => ty,
            None => return fail!(Rejection::UnknownContentType),
        };

        let root = &signature.root_key;
        let curve = match root.curve() {
            Some(curve) => curve,
            None => return fail!(Rejection::BadCurve),
        };
        check!(
            root.has_valid_id() || root.key_id == KeyEntry::NON_CANCELLABLE,
            Rejection::BadKeyId
        );
        if let Some(csk) = &signature.csk {
            check!(csk.key.curve() == Some(curve), Rejection::BadCurve);
            check!(
                csk.signature.magic == curve.signature_magic(),
                Rejection::BadSignatureMagic
            );
            check!(csk.key.has_valid_id(), Rejection::BadKeyId);
        }
        check!(
            signature.header_signature.magic == curve.signature_magic(),
            Rejection::BadSignatureMagic
        );
        check!(signature.signing_key().may_sign(ty), Rejection::NotPermitted);

        let pc_length = header.pc_length as usize;
        let limit = match cancellation {
            true => CancellationCert::PAYLOAD_SIZE,
            false => ty.max_size().map(|n| n as usize).unwrap_or(usize::MAX),
        };
        check!(pc_length <= limit, Rejection::BadLength);
        let content = match capsule[SignedHeader::SIZE..].get(..pc_length) {
            Some(content) => content,
            None => return fail!(Rejection::BadLength),
        };
        if cancellation {
            match CancellationCert::parse(capsule) {
                Ok(cert) if cert.csk_id <= KeyEntry::MAX_KEY_ID => {}
                _ => return fail!(Rejection::BadKeyId),
            }
        }

        let matches = match curve {
            Curve::Secp256r1 => {
                digest::digest(&digest::SHA256, content).as_ref()
                    == &header.sha256[..]
            }
            Curve::Secp384r1 => {
                digest::digest(&digest::SHA384, content).as_ref()
                    == &header.sha384[..]
            }
        };
        check!(matches, Rejection::DigestMismatch);

        if let (true, Some(expected)) =
            (require_root_key_chain, &self.root_key_hash)
        {
            check!(root_key_hash(root) == *expected, Rejection::UntrustedRoot);
        }

        trace!("capsule of type {} passed integrity checks", ty);
        Ok(())
    }
}

impl Authenticate for Integrity {
    fn authenticate(
        &mut self,
        capsule: &[u8],
        require_root_key_chain: bool,
    ) -> bool {
        match self.verify(capsule, require_root_key_chain) {
            Ok(()) => true,
            Err(e) => {
                warn!("rejecting capsule: {:?}", e.as_ref());
                false
            }
        }
    }
}

/// Computes the SHA-256 of a root key: its x coordinate followed by its y
/// coordinate, each at the curve's native length.
///
/// Returns all zeroes for a key on an unknown curve.
pub fn root_key_hash(key: &KeyEntry) -> [u8; 32] {
    let mut out = [0; 32];
    let len = match key.curve() {
        Some(curve) => curve.coordinate_len(),
        None => return out,
    };
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(&key.x[..len]);
    ctx.update(&key.y[..len]);
    out.copy_from_slice(ctx.finish().as_ref());
    out
}

#[cfg(test)]
mod test {
    use super::*;

    use testutil::capsule::Builder;
    use testutil::capsule::Key;

    fn hasher(content: &[u8]) -> ([u8; 32], [u8; 48]) {
        let mut sha256 = [0; 32];
        let mut sha384 = [0; 48];
        sha256.copy_from_slice(
            digest::digest(&digest::SHA256, content).as_ref(),
        );
        sha384.copy_from_slice(
            digest::digest(&digest::SHA384, content).as_ref(),
        );
        (sha256, sha384)
    }

    fn verify(image: &[u8], integrity: &Integrity) -> Result<(), Rejection> {
        integrity
            .verify(image, true)
            .map_err(|e| e.into_inner())
    }

    #[test]
    fn accepts_well_formed() {
        let image = Builder::new()
            .bitmaps(&[0xff, 0xff], &[0xf0, 0x00])
            .hasher(hasher)
            .build();
        assert_eq!(verify(&image, &Integrity::new()), Ok(()));
        assert!(Integrity::new().authenticate(&image, false));
    }

    #[test]
    fn rejects_tampering() {
        let mut image = Builder::new()
            .bitmaps(&[0xff, 0xff], &[0xf0, 0x00])
            .hasher(hasher)
            .build();
        let last = image.len() - 1;
        image[last] ^= 0xff;
        assert_eq!(
            verify(&image, &Integrity::new()),
            Err(Rejection::DigestMismatch)
        );

        assert_eq!(
            verify(&image[..100], &Integrity::new()),
            Err(Rejection::Malformed)
        );
    }

    #[test]
    fn checks_permissions() {
        let csk = Key {
            permissions: 0x04,
            ..Key::csk()
        };
        let image = Builder::new().pc_type(0x04).csk(csk).hasher(hasher).build();
        assert_eq!(
            verify(&image, &Integrity::new()),
            Err(Rejection::NotPermitted)
        );

        let image = Builder::new().pc_type(0x03).csk(csk).hasher(hasher).build();
        assert_eq!(verify(&image, &Integrity::new()), Ok(()));
    }

    #[test]
    fn checks_key_chain() {
        let csk = Key {
            key_id: 200,
            ..Key::csk()
        };
        let image = Builder::new().csk(csk).hasher(hasher).build();
        assert_eq!(verify(&image, &Integrity::new()), Err(Rejection::BadKeyId));

        let csk = Key {
            curve: 0xc7b88c74,
            ..Key::csk()
        };
        let image = Builder::new().csk(csk).hasher(hasher).build();
        assert_eq!(verify(&image, &Integrity::new()), Err(Rejection::BadCurve));

        let image = Builder::new().pc_type(0x0b).hasher(hasher).build();
        assert_eq!(
            verify(&image, &Integrity::new()),
            Err(Rejection::UnknownContentType)
        );
    }

    #[test]
    fn root_key_provisioning() {
        let image = Builder::new().hasher(hasher).build();
        let signed = SignedHeader::parse(&image[..]).unwrap();
        let good = root_key_hash(&signed.signature.root_key);

        let mut integrity = Integrity::with_root_key_hash(good);
        assert!(integrity.authenticate(&image, true));

        let mut integrity = Integrity::with_root_key_hash([0x42; 32]);
        assert!(!integrity.authenticate(&image, true));
        // Recovery flows do not check the root key.
        assert!(integrity.authenticate(&image, false));
    }

    #[test]
    fn cancellation_certs() {
        let image = Builder::new()
            .pc_type(0x102)
            .hasher(hasher)
            .build_cancellation(5);
        assert_eq!(verify(&image, &Integrity::new()), Ok(()));

        let image = Builder::new()
            .pc_type(0x102)
            .hasher(hasher)
            .build_cancellation(128);
        assert_eq!(verify(&image, &Integrity::new()), Err(Rejection::BadKeyId));
    }
}
