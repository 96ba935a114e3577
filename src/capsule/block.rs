// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Header Blocks, Signature Blocks and the key chain.
//!
//! Every signed PFR object starts with a 1024-byte [`SignedHeader`]: a
//! 128-byte Header Block describing the protected content that follows,
//! and an 896-byte Signature Block carrying the key chain that signs the
//! Header Block.
//!
//! ```ignore
//! struct HeaderBlock {
//!     magic: u32, // 0xb6eafd19
//!     pc_length: u32,
//!     pc_type: u32,
//!     _: u32, // Absent in key cancellation certificates.
//!     sha256: [u8; 32],
//!     sha384: [u8; 48],
//!     _: [u8; 32], // 36 bytes in key cancellation certificates.
//! }
//!
//! struct SignatureBlock {
//!     magic: u32, // 0xf27f28d7
//!     _: [u8; 12],
//!     root_key: KeyEntry,
//!     csk: CskEntry, // Absent in key cancellation certificates.
//!     header_signature_magic: u32, // 0x15364367
//!     header_signature: Signature,
//!     _: [u8; 412], // 644 bytes in key cancellation certificates.
//! }
//! ```

use enumflags2::bitflags;
use enumflags2::BitFlags;
use static_assertions::const_assert_eq;

use crate::capsule::expect_magic;
use crate::capsule::ContentType;
use crate::capsule::Error;
use crate::io::Read;

type Result<T> = crate::Result<T, Error>;

wire_enum! {
    /// An elliptic curve a key in the chain may use.
    pub enum Curve: u32 {
        /// NIST P-256.
        Secp256r1 = 0xc7b88c74,
        /// NIST P-384.
        Secp384r1 = 0x08f07b47,
    }
}

impl Curve {
    /// Returns the signature magic that signatures over this curve carry.
    pub fn signature_magic(self) -> u32 {
        match self {
            Self::Secp256r1 => 0xde64437d,
            Self::Secp384r1 => 0xea2a50e9,
        }
    }

    /// Returns the length of a single coordinate, in bytes.
    ///
    /// Coordinates shorter than 48 bytes occupy the low bytes of their
    /// field.
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::Secp256r1 => 32,
            Self::Secp384r1 => 48,
        }
    }
}

/// A permission a key may carry, gating the content types it may sign.
#[bitflags]
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Permission {
    /// Sign PCH PFMs.
    PchPfm = 0x01,
    /// Sign PCH updates.
    PchUpdate = 0x02,
    /// Sign BMC PFMs and retimer updates.
    BmcPfm = 0x04,
    /// Sign BMC updates and secure-boot images.
    BmcUpdate = 0x08,
    /// Sign CPLD updates.
    CpldUpdate = 0x10,
    /// Sign AFM updates.
    AfmUpdate = 0x20,
    /// Sign combined CPLD updates.
    CombinedCpldUpdate = 0x40,
}

impl Permission {
    /// The raw permission word meaning "may sign everything".
    pub const ALL: u32 = u32::MAX;

    /// Returns the permission needed to sign `ty`.
    pub fn required_for(ty: ContentType) -> Self {
        match ty {
            ContentType::PchPfm => Self::PchPfm,
            ContentType::PchUpdate => Self::PchUpdate,
            ContentType::BmcPfm | ContentType::RetimerUpdate => Self::BmcPfm,
            ContentType::BmcUpdate
            | ContentType::PartialUpdate
            | ContentType::SecureBootBmc
            | ContentType::SecureBootOtp => Self::BmcUpdate,
            ContentType::CpldUpdate | ContentType::Decommission => {
                Self::CpldUpdate
            }
            ContentType::AfmUpdate
            | ContentType::PerDeviceAfm
            | ContentType::AddToUpdateAfm => Self::AfmUpdate,
            ContentType::CombinedCpldUpdate => Self::CombinedCpldUpdate,
        }
    }
}

/// A Key Entry: a public key with its permissions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyEntry {
    /// The raw curve identifier; see [`Curve`].
    pub curve: u32,
    /// The raw permission word; see [`Permission`].
    pub permissions: u32,
    /// The key id, used for cancellation.
    pub key_id: u32,
    /// The public key's x coordinate.
    pub x: [u8; 48],
    /// The public key's y coordinate.
    pub y: [u8; 48],
}

impl KeyEntry {
    /// The magic number of a root Key Entry.
    pub const ROOT_MAGIC: u32 = 0xa757a046;
    /// The magic number of a Key Entry inside a [`CskEntry`].
    pub const CSK_MAGIC: u32 = 0x14711c2f;
    /// The encoded size of a Key Entry.
    pub const SIZE: usize = 132;
    /// The largest key id that may be cancelled.
    pub const MAX_KEY_ID: u32 = 127;
    /// The key id of a key that can never be cancelled.
    pub const NON_CANCELLABLE: u32 = u32::MAX;

    /// Parses a Key Entry that must start with `magic`.
    pub fn parse<'a, R: Read<'a>>(mut r: R, magic: u32) -> Result<Self> {
        expect_magic(&mut r, magic)?;
        let curve = r.read_le()?;
        let permissions = r.read_le()?;
        let key_id = r.read_le()?;
        let x = r.read_array()?;
        let y = r.read_array()?;
        r.skip(20)?;
        Ok(Self {
            curve,
            permissions,
            key_id,
            x,
            y,
        })
    }

    /// Returns this key's curve, if it is a known one.
    pub fn curve(&self) -> Option<Curve> {
        use crate::wire::WireEnum as _;
        Curve::from_wire_value(self.curve)
    }

    /// Returns the known permission bits this key carries.
    pub fn permissions(&self) -> BitFlags<Permission> {
        BitFlags::from_bits_truncate(self.permissions)
    }

    /// Returns whether this key may sign content of type `ty`.
    pub fn may_sign(&self, ty: ContentType) -> bool {
        self.permissions == Permission::ALL
            || self.permissions().contains(Permission::required_for(ty))
    }

    /// Returns whether this key id is in the cancellable range.
    pub fn has_valid_id(&self) -> bool {
        self.key_id <= Self::MAX_KEY_ID
    }
}

/// An ECDSA signature as stored in a Signature Block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// The signature magic, naming the curve; see
    /// [`Curve::signature_magic()`].
    pub magic: u32,
    /// The `r` component.
    pub r: [u8; 48],
    /// The `s` component.
    pub s: [u8; 48],
}

impl Signature {
    fn parse<'a, R: Read<'a>>(mut r: R) -> Result<Self> {
        Ok(Self {
            magic: r.read_le()?,
            r: r.read_array()?,
            s: r.read_array()?,
        })
    }
}

/// A Co-Signing Key (CSK) Entry: a key signed by the root key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CskEntry {
    /// The co-signing key.
    pub key: KeyEntry,
    /// The root key's signature over `key`.
    pub signature: Signature,
}

impl CskEntry {
    /// The encoded size of a CSK Entry.
    pub const SIZE: usize = 232;

    /// Parses a CSK Entry.
    pub fn parse<'a, R: Read<'a>>(mut r: R) -> Result<Self> {
        Ok(Self {
            key: KeyEntry::parse(&mut r, KeyEntry::CSK_MAGIC)?,
            signature: Signature::parse(&mut r)?,
        })
    }
}

/// A Header Block: the description of the protected content.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeaderBlock {
    /// The length of the protected content, in bytes.
    pub pc_length: u32,
    /// The raw content type; see [`ContentType`].
    pub pc_type: u32,
    /// The SHA-256 digest of the protected content.
    pub sha256: [u8; 32],
    /// The SHA-384 digest of the protected content.
    pub sha384: [u8; 48],
}

impl HeaderBlock {
    /// The magic number of a Header Block.
    pub const MAGIC: u32 = 0xb6eafd19;
    /// The encoded size of a Header Block.
    pub const SIZE: usize = 128;

    /// Parses a Header Block, in either of its two layouts.
    pub fn parse<'a, R: Read<'a>>(mut r: R) -> Result<Self> {
        let mut r = r.read_bytes(Self::SIZE)?;
        expect_magic(&mut r, Self::MAGIC)?;
        let pc_length = r.read_le()?;
        let pc_type = r.read_le()?;
        if pc_type & ContentType::CANCELLATION == 0 {
            r.skip(4)?;
        }
        Ok(Self {
            pc_length,
            pc_type,
            sha256: r.read_array()?,
            sha384: r.read_array()?,
        })
    }

    /// Returns the content type this header declares, if it is a known
    /// one.
    pub fn content_type(&self) -> Option<ContentType> {
        ContentType::from_pc_type(self.pc_type).map(|(ty, _)| ty)
    }

    /// Returns whether this is the header of a key cancellation
    /// certificate.
    pub fn is_cancellation(&self) -> bool {
        self.pc_type & ContentType::CANCELLATION != 0
    }
}

/// A Signature Block: the key chain signing a Header Block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SignatureBlock {
    /// The root key.
    pub root_key: KeyEntry,
    /// The co-signing key, absent in key cancellation certificates, which
    /// are signed by the root key directly.
    pub csk: Option<CskEntry>,
    /// The signature over the Header Block.
    pub header_signature: Signature,
}

impl SignatureBlock {
    /// The magic number of a Signature Block.
    pub const MAGIC: u32 = 0xf27f28d7;
    /// The magic number of the Header Block signature entry.
    pub const HEADER_SIGNATURE_MAGIC: u32 = 0x15364367;
    /// The encoded size of a Signature Block.
    pub const SIZE: usize = 896;

    /// Parses a Signature Block; `cancellation` selects the key
    /// cancellation layout.
    pub fn parse<'a, R: Read<'a>>(mut r: R, cancellation: bool) -> Result<Self> {
        let mut r = r.read_bytes(Self::SIZE)?;
        expect_magic(&mut r, Self::MAGIC)?;
        r.skip(12)?;
        let root_key = KeyEntry::parse(&mut r, KeyEntry::ROOT_MAGIC)?;
        let csk = if cancellation {
            None
        } else {
            Some(CskEntry::parse(&mut r)?)
        };
        expect_magic(&mut r, Self::HEADER_SIGNATURE_MAGIC)?;
        let header_signature = Signature::parse(&mut r)?;
        Ok(Self {
            root_key,
            csk,
            header_signature,
        })
    }

    /// Returns the key that signs the Header Block: the CSK if there is
    /// one, or else the root key.
    pub fn signing_key(&self) -> &KeyEntry {
        match &self.csk {
            Some(csk) => &csk.key,
            None => &self.root_key,
        }
    }
}

/// A Header Block followed by its Signature Block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SignedHeader {
    /// The Header Block.
    pub header: HeaderBlock,
    /// The Signature Block.
    pub signature: SignatureBlock,
}

impl SignedHeader {
    /// The encoded size of a `SignedHeader`.
    pub const SIZE: usize = 1024;

    /// Parses a `SignedHeader`, consuming exactly [`Self::SIZE`] bytes.
    pub fn parse<'a, R: Read<'a>>(mut r: R) -> Result<Self> {
        let mut r = r.read_bytes(Self::SIZE)?;
        let header = HeaderBlock::parse(&mut r)?;
        let signature = SignatureBlock::parse(&mut r, header.is_cancellation())?;
        Ok(Self { header, signature })
    }
}

// Reserved tails, as laid out in the module docs.
const_assert_eq!(
    SignatureBlock::SIZE,
    16 + KeyEntry::SIZE + CskEntry::SIZE + 104 + 412
);
const_assert_eq!(SignatureBlock::SIZE, 16 + KeyEntry::SIZE + 104 + 644);
const_assert_eq!(
    SignedHeader::SIZE,
    HeaderBlock::SIZE + SignatureBlock::SIZE
);

/// A key cancellation certificate: a request to revoke a CSK id for one
/// content type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CancellationCert {
    /// The certificate's signed header, always in the cancellation layout.
    pub header: SignedHeader,
    /// The id of the key being cancelled.
    pub csk_id: u32,
}

impl CancellationCert {
    /// The size of the cancellation payload.
    pub const PAYLOAD_SIZE: usize = 128;

    /// Parses a key cancellation certificate.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = bytes;
        let header = SignedHeader::parse(&mut r)?;
        let pc_type = header.header.pc_type;
        check!(
            header.header.is_cancellation(),
            Error::WrongContentType { found: pc_type }
        );

        let mut payload = r.read_bytes(Self::PAYLOAD_SIZE)?;
        let csk_id = payload.read_le()?;
        Ok(Self { header, csk_id })
    }

    /// Returns the content type whose key is being cancelled.
    pub fn cancelled_type(&self) -> Option<ContentType> {
        self.header.header.content_type()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use pretty_assertions::assert_eq;
    use testutil::capsule::Builder;
    use testutil::capsule::Key;

    #[test]
    fn header_sizes() {
        let image = Builder::new().build();
        let mut r = &image[..];

        let header = HeaderBlock::parse(&mut r).unwrap();
        assert_eq!(image.len() - r.len(), HeaderBlock::SIZE);
        assert_eq!(header.pc_length as usize, image.len() - 1024);

        r.skip(16).unwrap();
        let root = KeyEntry::parse(&mut r, KeyEntry::ROOT_MAGIC).unwrap();
        assert_eq!(image.len() - r.len(), HeaderBlock::SIZE + 16 + 132);
        let csk = CskEntry::parse(&mut r).unwrap();
        assert_eq!(image.len() - r.len(), HeaderBlock::SIZE + 16 + 132 + 232);
        assert_eq!(root.curve(), Some(Curve::Secp384r1));
        assert_eq!(csk.signature.magic, Curve::Secp384r1.signature_magic());

        let mut r = &image[..];
        SignedHeader::parse(&mut r).unwrap();
        assert_eq!(image.len() - r.len(), 1024);
    }

    #[test]
    fn key_fields() {
        let root = Key {
            curve: 0xc7b88c74,
            permissions: u32::MAX,
            key_id: u32::MAX,
            fill: 0x5a,
        };
        let csk = Key {
            curve: 0xc7b88c74,
            permissions: 0x08,
            key_id: 3,
            fill: 0xa5,
        };
        let image = Builder::new().root_key(root).csk(csk).build();
        let signed = SignedHeader::parse(&image[..]).unwrap();

        let root_key = signed.signature.root_key;
        assert_eq!(root_key.curve(), Some(Curve::Secp256r1));
        assert_eq!(root_key.key_id, KeyEntry::NON_CANCELLABLE);
        assert_eq!(root_key.x, [0x5a; 48]);

        let csk = signed.signature.csk.unwrap();
        assert_eq!(csk.key.key_id, 3);
        assert!(csk.key.has_valid_id());
        assert_eq!(csk.key.y, [0xa5; 48]);
        assert_eq!(signed.signature.signing_key(), &csk.key);
    }

    #[test]
    fn permissions() {
        let mut key = KeyEntry {
            curve: 0,
            permissions: 0x08,
            key_id: 0,
            x: [0; 48],
            y: [0; 48],
        };
        assert!(key.may_sign(ContentType::BmcUpdate));
        assert!(key.may_sign(ContentType::SecureBootBmc));
        assert!(!key.may_sign(ContentType::BmcPfm));
        assert!(!key.may_sign(ContentType::CpldUpdate));

        key.permissions = 0x04;
        assert!(key.may_sign(ContentType::RetimerUpdate));
        assert!(key.may_sign(ContentType::BmcPfm));

        key.permissions = 0x80 | 0x40;
        assert_eq!(
            key.permissions(),
            BitFlags::from(Permission::CombinedCpldUpdate)
        );
        assert!(key.may_sign(ContentType::CombinedCpldUpdate));

        key.permissions = Permission::ALL;
        assert!(key.may_sign(ContentType::PchPfm));
        assert!(key.may_sign(ContentType::Decommission));
    }

    #[test]
    fn cancellation_layout() {
        let image = Builder::new().pc_type(0x104).build_cancellation(42);
        assert_eq!(image.len(), 1024 + 128);

        let cert = CancellationCert::parse(&image).unwrap();
        assert!(cert.header.header.is_cancellation());
        assert_eq!(cert.cancelled_type(), Some(ContentType::BmcUpdate));
        assert_eq!(cert.header.signature.csk, None);
        assert_eq!(cert.csk_id, 42);
        assert_eq!(cert.header.header.pc_length, 128);
        assert_eq!(
            cert.header.signature.signing_key(),
            &cert.header.signature.root_key
        );

        // The hashes sit four bytes earlier than in a regular header.
        assert_eq!(&image[12..44], &cert.header.header.sha256[..]);
    }

    #[test]
    fn cancellation_requires_bit() {
        let image = Builder::new().pc_type(0x04).build_cancellation(1);
        assert_eq!(
            CancellationCert::parse(&image).unwrap_err().into_inner(),
            Error::WrongContentType { found: 0x04 }
        );
    }
}
