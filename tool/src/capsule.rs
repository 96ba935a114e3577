// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Capsule inspection commands.

use std::path::PathBuf;

use serde::Serialize;

use pfr_update::capsule;
use pfr_update::capsule::block::CancellationCert;
use pfr_update::capsule::block::KeyEntry;
use pfr_update::capsule::block::SignedHeader;
use pfr_update::capsule::BitmapExt as _;
use pfr_update::capsule::ContentType;
use pfr_update::capsule::Descriptor;
use pfr_update::crypto::ring::Integrity;

/// A CLI interface for the capsule parser.
#[derive(structopt::StructOpt)]
#[structopt(author)]
pub enum Capsule {
    /// Decode a capsule or key cancellation certificate and print it as
    /// JSON.
    Show {
        /// Whether to pretty-print the resulting JSON.
        #[structopt(long)]
        pretty: bool,

        /// Input file, defaults to stdin.
        #[structopt(short = "i", long, parse(from_os_str))]
        input: Option<PathBuf>,

        /// Output file, defaults to stdout.
        #[structopt(short = "o", long, parse(from_os_str))]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct Key {
    curve: String,
    permissions: String,
    key_id: u32,
}

impl From<&KeyEntry> for Key {
    fn from(key: &KeyEntry) -> Self {
        Self {
            curve: match key.curve() {
                Some(curve) => curve.to_string(),
                None => format!("{:#x}", key.curve),
            },
            permissions: format!("{:#x}", key.permissions),
            key_id: key.key_id,
        }
    }
}

#[derive(Serialize)]
struct Header {
    pc_type: String,
    content_type: Option<String>,
    cancellation: bool,
    pc_length: u32,
    root_key: Key,
    csk: Option<Key>,
}

impl From<&SignedHeader> for Header {
    fn from(h: &SignedHeader) -> Self {
        Self {
            pc_type: format!("{:#x}", h.header.pc_type),
            content_type: h.header.content_type().map(|ty| ty.to_string()),
            cancellation: h.header.is_cancellation(),
            pc_length: h.header.pc_length,
            root_key: (&h.signature.root_key).into(),
            csk: h.signature.csk.as_ref().map(|csk| (&csk.key).into()),
        }
    }
}

#[derive(Serialize)]
struct Region {
    start: String,
    end: String,
    hash_info: u16,
    signed: bool,
}

#[derive(Serialize)]
struct Manifest {
    kind: String,
    svn: u8,
    bkc: u8,
    revision: u16,
    platform: u32,
    current_layout: bool,
    length: u32,
    regions: Vec<Region>,
    other_descriptors: usize,
}

#[derive(Serialize)]
struct Bitmaps {
    page_size: u32,
    bitmap_size: u32,
    payload_length: u32,
    erase_blocks: u32,
    copy_blocks: u32,
}

#[derive(Serialize)]
struct Cancellation {
    header: Header,
    cancelled_type: Option<String>,
    csk_id: u32,
    integrity: String,
}

#[derive(Serialize)]
struct Update {
    header: Header,
    manifest_header: Header,
    manifest: Manifest,
    bitmaps: Bitmaps,
    integrity: String,
}

fn integrity(bytes: &[u8]) -> String {
    match Integrity::new().verify(bytes, false) {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("{:?}", e.into_inner()),
    }
}

fn show_update(bytes: &[u8]) -> Update {
    let c = check!(
        capsule::Capsule::parse(bytes).map_err(|e| e.into_inner()),
        "failed to parse capsule"
    );
    let m = c.manifest();

    let mut other_descriptors = 0;
    let mut regions = Vec::new();
    for d in m.descriptors() {
        match d {
            Descriptor::Spi(r) => regions.push(Region {
                start: format!("{:#x}", r.start),
                end: format!("{:#x}", r.end),
                hash_info: r.hash_info,
                signed: r.is_signed(),
            }),
            _ => other_descriptors += 1,
        }
    }

    let header = m.header();
    Update {
        header: c.header().into(),
        manifest_header: c.manifest_header().into(),
        manifest: Manifest {
            kind: header.kind.to_string(),
            svn: header.svn,
            bkc: header.bkc,
            revision: header.revision,
            platform: header.platform,
            current_layout: header.uses_current_layout(),
            length: header.length,
            regions,
            other_descriptors,
        },
        bitmaps: Bitmaps {
            page_size: c.compression().page_size,
            bitmap_size: c.bitmap_bits(),
            payload_length: c.compression().payload_length,
            erase_blocks: c.active_map().count_set(),
            copy_blocks: c.copy_map().count_set(),
        },
        integrity: integrity(bytes),
    }
}

fn show_cancellation(bytes: &[u8]) -> Cancellation {
    let cert = check!(
        CancellationCert::parse(bytes).map_err(|e| e.into_inner()),
        "failed to parse key cancellation certificate"
    );
    Cancellation {
        header: (&cert.header).into(),
        cancelled_type: cert.cancelled_type().map(|ty| ty.to_string()),
        csk_id: cert.csk_id,
        integrity: integrity(bytes),
    }
}

impl Capsule {
    pub fn run(self) {
        match self {
            Self::Show {
                pretty,
                input,
                output,
            } => {
                let bytes = crate::util::read_input(input.as_deref());
                let w = crate::util::output(output.as_deref());

                let signed = check!(
                    SignedHeader::parse(&bytes[..]).map_err(|e| e.into_inner()),
                    "failed to parse header"
                );
                match ContentType::from_pc_type(signed.header.pc_type) {
                    Some((_, true)) => crate::util::write_json(
                        w,
                        &show_cancellation(&bytes),
                        pretty,
                    ),
                    _ => crate::util::write_json(w, &show_update(&bytes), pretty),
                }
            }
        }
    }
}
