// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! A builder for capsule images.
//!
//! Signatures are never real: key coordinates and signature values are
//! filled with a fixed byte. Header Block digests are placeholders unless a
//! hash function is supplied with [`Builder::hasher()`].

const HEADER_MAGIC: u32 = 0xb6eafd19;
const SIGNATURE_MAGIC: u32 = 0xf27f28d7;
const ROOT_MAGIC: u32 = 0xa757a046;
const CSK_MAGIC: u32 = 0x14711c2f;
const HEADER_SIGNATURE_MAGIC: u32 = 0x15364367;
const PBC_MAGIC: u32 = 0x5f504243;

const SECP256R1: u32 = 0xc7b88c74;
const SECP384R1: u32 = 0x08f07b47;

const PFM_MAGIC: u32 = 0x02b3ce1d;
const AFM_MAGIC: u32 = 0x8883ce1d;

const CANCELLATION: u32 = 0x100;
const MANIFEST_PC_TYPE: u32 = 0x03;
const BLOCK_SIZE: usize = 0x1000;

/// A function computing the SHA-256 and SHA-384 of protected content.
pub type Hasher = fn(&[u8]) -> ([u8; 32], [u8; 48]);

/// A key entry in a Signature Block.
#[derive(Copy, Clone, Debug)]
pub struct Key {
    /// The raw curve magic.
    pub curve: u32,
    /// The raw permission bits.
    pub permissions: u32,
    /// The key id.
    pub key_id: u32,
    /// The byte both coordinates are filled with.
    pub fill: u8,
}

impl Key {
    /// A P-384 root key that may sign anything.
    pub fn root() -> Self {
        Self {
            curve: SECP384R1,
            permissions: u32::MAX,
            key_id: u32::MAX,
            fill: 0x11,
        }
    }

    /// A P-384 CSK with id 1 that may sign anything.
    pub fn csk() -> Self {
        Self {
            curve: SECP384R1,
            permissions: u32::MAX,
            key_id: 1,
            fill: 0x22,
        }
    }
}

fn signature_magic(curve: u32) -> u32 {
    match curve {
        SECP256R1 => 0xde64437d,
        SECP384R1 => 0xea2a50e9,
        _ => 0,
    }
}

fn put_u16(out: &mut Vec<u8>, x: u16) {
    out.extend_from_slice(&x.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, x: u32) {
    out.extend_from_slice(&x.to_le_bytes());
}

/// Zero-pads `out` to a multiple of `align`.
fn pad(out: &mut Vec<u8>, align: usize) {
    let len = (out.len() + align - 1) / align * align;
    out.resize(len, 0);
}

/// Builds capsule images.
#[derive(Clone)]
pub struct Builder {
    pc_type: u32,
    svn: u8,
    oem_data: [u8; 16],
    manifest_magic: u32,
    descriptors: Vec<u8>,
    active: Vec<u8>,
    copy: Vec<u8>,
    payload: Option<Vec<u8>>,
    page_size: u32,
    bitmap_size: Option<u32>,
    manifest_length: Option<u32>,
    payload_length: Option<u32>,
    root: Key,
    csk: Key,
    hasher: Option<Hasher>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Creates a builder for a BMC update capsule with an empty manifest and
    /// 128-block bitmaps with nothing set.
    pub fn new() -> Self {
        let mut oem_data = [0; 16];
        oem_data[4] = 0xff;
        Self {
            pc_type: 0x04,
            svn: 0,
            oem_data,
            manifest_magic: PFM_MAGIC,
            descriptors: Vec::new(),
            active: vec![0; 16],
            copy: vec![0; 16],
            payload: None,
            page_size: BLOCK_SIZE as u32,
            bitmap_size: None,
            manifest_length: None,
            payload_length: None,
            root: Key::root(),
            csk: Key::csk(),
            hasher: None,
        }
    }

    /// Sets the capsule's content type.
    pub fn pc_type(mut self, pc_type: u32) -> Self {
        self.pc_type = pc_type;
        self
    }

    /// Sets the manifest's security version.
    pub fn svn(mut self, svn: u8) -> Self {
        self.svn = svn;
        self
    }

    /// Sets the OEM data byte that selects the flash layout.
    pub fn oem_byte(mut self, byte: u8) -> Self {
        self.oem_data[4] = byte;
        self
    }

    /// Sets the manifest magic. An AFM magic drops the platform field from
    /// the manifest header.
    pub fn manifest_magic(mut self, magic: u32) -> Self {
        self.manifest_magic = magic;
        self
    }

    /// Appends a SPI region descriptor, with a digest for each bit set in
    /// `hash_info`.
    pub fn spi_region(mut self, start: u32, end: u32, hash_info: u16) -> Self {
        let d = &mut self.descriptors;
        d.push(1);
        d.push(0xff);
        put_u16(d, hash_info);
        put_u32(d, 0);
        put_u32(d, start);
        put_u32(d, end);
        if hash_info & 0x01 != 0 {
            d.extend_from_slice(&[0xa2; 32]);
        }
        if hash_info & 0x02 != 0 {
            d.extend_from_slice(&[0xa3; 48]);
        }
        self
    }

    /// Appends an SMBus rule descriptor.
    pub fn smbus_rule(mut self, bus: u8, rule: u8, addr: u8) -> Self {
        let d = &mut self.descriptors;
        d.push(2);
        put_u32(d, 0);
        d.extend_from_slice(&[bus, rule, addr]);
        d.extend_from_slice(&[0xff; 32]);
        self
    }

    /// Appends an FVM address descriptor.
    pub fn fvm_address(mut self, fvm_type: u16, addr: u32) -> Self {
        let d = &mut self.descriptors;
        d.push(3);
        put_u16(d, fvm_type);
        put_u32(d, 0);
        put_u32(d, addr);
        self
    }

    /// Appends an FVM capabilities descriptor.
    pub fn fvm_capabilities(mut self, version: [u8; 4], actions: u32) -> Self {
        let d = &mut self.descriptors;
        d.push(4);
        put_u16(d, 0);
        d.push(1);
        put_u16(d, 64);
        d.extend_from_slice(&version);
        put_u32(d, 0);
        put_u32(d, actions);
        d.extend_from_slice(&[0; 26]);
        d.extend_from_slice(b"test capabilities\0\0\0");
        self
    }

    /// Appends raw bytes to the descriptor list.
    pub fn raw_descriptor(mut self, bytes: &[u8]) -> Self {
        self.descriptors.extend_from_slice(bytes);
        self
    }

    /// Sets the active and copy maps, which must be the same length.
    ///
    /// Unless [`Builder::payload()`] is called, the payload is one distinct
    /// block for each bit set in `copy`.
    pub fn bitmaps(mut self, active: &[u8], copy: &[u8]) -> Self {
        assert_eq!(active.len(), copy.len(), "bitmaps differ in length");
        self.active = active.to_vec();
        self.copy = copy.to_vec();
        self
    }

    /// Sets the payload.
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the compression header's page size.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Overrides the compression header's bitmap size.
    pub fn bitmap_size_override(mut self, bits: u32) -> Self {
        self.bitmap_size = Some(bits);
        self
    }

    /// Overrides the manifest header's length field.
    pub fn manifest_length_override(mut self, len: u32) -> Self {
        self.manifest_length = Some(len);
        self
    }

    /// Overrides the compression header's payload length.
    pub fn payload_length_override(mut self, len: u32) -> Self {
        self.payload_length = Some(len);
        self
    }

    /// Sets the root key.
    pub fn root_key(mut self, key: Key) -> Self {
        self.root = key;
        self
    }

    /// Sets the CSK.
    pub fn csk(mut self, key: Key) -> Self {
        self.csk = key;
        self
    }

    /// Sets the function used to fill in Header Block digests.
    pub fn hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Builds a full update capsule.
    pub fn build(&self) -> Vec<u8> {
        let mut content = self.signed(MANIFEST_PC_TYPE, &self.manifest());

        let payload = self.payload.clone().unwrap_or_else(|| self.payload_blocks());
        put_u32(&mut content, PBC_MAGIC);
        put_u32(&mut content, 2);
        put_u32(&mut content, self.page_size);
        put_u32(&mut content, 1);
        put_u32(&mut content, 0xff);
        put_u32(
            &mut content,
            self.bitmap_size.unwrap_or(self.active.len() as u32 * 8),
        );
        put_u32(
            &mut content,
            self.payload_length.unwrap_or(payload.len() as u32),
        );
        pad(&mut content, 128);
        content.extend_from_slice(&self.active);
        content.extend_from_slice(&self.copy);
        content.extend_from_slice(&payload);

        self.signed(self.pc_type, &content)
    }

    /// Builds a key cancellation certificate revoking CSK `csk_id`.
    ///
    /// The content type is used as-is; without the cancellation bit, the
    /// result has a regular Signature Block.
    pub fn build_cancellation(&self, csk_id: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        put_u32(&mut payload, csk_id);
        payload.resize(128, 0);
        self.signed(self.pc_type, &payload)
    }

    /// Returns the manifest, padded to 128 bytes.
    fn manifest(&self) -> Vec<u8> {
        let header_len = match self.manifest_magic {
            AFM_MAGIC => 28,
            _ => 32,
        };
        let length = self
            .manifest_length
            .unwrap_or((header_len + self.descriptors.len()) as u32);

        let mut out = Vec::new();
        put_u32(&mut out, self.manifest_magic);
        out.push(self.svn);
        out.push(0);
        put_u16(&mut out, 1);
        if self.manifest_magic != AFM_MAGIC {
            put_u32(&mut out, 0);
        }
        out.extend_from_slice(&self.oem_data);
        put_u32(&mut out, length);
        out.extend_from_slice(&self.descriptors);
        pad(&mut out, 128);
        out
    }

    fn payload_blocks(&self) -> Vec<u8> {
        let blocks = self
            .copy
            .iter()
            .map(|b| b.count_ones() as usize)
            .sum::<usize>();
        (0..blocks * BLOCK_SIZE)
            .map(|i| (i / BLOCK_SIZE * 7 + i % 251) as u8)
            .collect()
    }

    /// Prepends a Header Block and Signature Block to `content`.
    fn signed(&self, pc_type: u32, content: &[u8]) -> Vec<u8> {
        let cancellation = pc_type & CANCELLATION != 0;
        let (sha256, sha384) = match self.hasher {
            Some(hasher) => hasher(content),
            None => ([0x5a; 32], [0x5b; 48]),
        };

        let mut out = Vec::with_capacity(1024 + content.len());
        put_u32(&mut out, HEADER_MAGIC);
        put_u32(&mut out, content.len() as u32);
        put_u32(&mut out, pc_type);
        if !cancellation {
            put_u32(&mut out, 0);
        }
        out.extend_from_slice(&sha256);
        out.extend_from_slice(&sha384);
        out.resize(128, 0);

        put_u32(&mut out, SIGNATURE_MAGIC);
        out.extend_from_slice(&[0; 12]);
        key_entry(&mut out, ROOT_MAGIC, &self.root);
        let signer = if cancellation {
            &self.root
        } else {
            key_entry(&mut out, CSK_MAGIC, &self.csk);
            signature(&mut out, self.root.curve);
            &self.csk
        };
        put_u32(&mut out, HEADER_SIGNATURE_MAGIC);
        signature(&mut out, signer.curve);
        out.resize(1024, 0);

        out.extend_from_slice(content);
        out
    }
}

fn key_entry(out: &mut Vec<u8>, magic: u32, key: &Key) {
    put_u32(out, magic);
    put_u32(out, key.curve);
    put_u32(out, key.permissions);
    put_u32(out, key.key_id);
    out.extend_from_slice(&[key.fill; 96]);
    out.extend_from_slice(&[0; 20]);
}

fn signature(out: &mut Vec<u8>, curve: u32) {
    put_u32(out, signature_magic(curve));
    out.extend_from_slice(&[0x33; 48]);
    out.extend_from_slice(&[0x44; 48]);
}
