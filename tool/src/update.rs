// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Update commands, run against emulated flash.

use std::convert::TryFrom as _;
use std::fs::File;
use std::path::PathBuf;

use serde::Serialize;

use pfr_update::capsule::Capsule;
use pfr_update::capsule::BLOCK_SIZE;
use pfr_update::crypto::ring::Integrity;
use pfr_update::crypto::Authenticate;
use pfr_update::hardware::flash::FileFlash;
use pfr_update::hardware::flash::Op;
use pfr_update::hardware::flash::RamMut;
use pfr_update::hardware::flash::Recorder;
use pfr_update::hardware::flash::SECTOR_SIZE;
use pfr_update::serde::parse_int;
use pfr_update::update;
use pfr_update::update::ManifestPlacement;
use pfr_update::update::Options;
use pfr_update::update::Report;
use pfr_update::update::SecureBootLayout;
use pfr_update::update::Variant;

/// Options shared by every command that applies a capsule.
#[derive(structopt::StructOpt)]
pub struct Target {
    /// The device address at which the image starts.
    #[structopt(long, default_value = "0", parse(try_from_str = parse_int))]
    offset: u32,

    /// Erase blocks in unsigned regions too.
    #[structopt(long)]
    force: bool,

    /// Perform a dual-image update, with the flash map in the given JSON
    /// file. Use `{}` for the default map.
    #[structopt(long, parse(from_os_str))]
    secure_boot: Option<PathBuf>,

    /// Accept the capsule without checking its key chain or digests.
    #[structopt(long)]
    skip_auth: bool,
}

impl Target {
    fn options(&self) -> Options {
        let variant = match &self.secure_boot {
            Some(path) => {
                let file = check!(File::open(path), "failed to open layout");
                let layout: SecureBootLayout = check!(
                    serde_json::from_reader(file),
                    "failed to parse layout"
                );
                Variant::SecureBoot(layout)
            }
            None => Variant::Standard(ManifestPlacement::default()),
        };
        Options {
            device_offset: self.offset,
            force_erase_unsigned: self.force,
            variant,
        }
    }
}

fn authenticator(skip_auth: bool) -> Box<dyn Authenticate> {
    match skip_auth {
        true => Box::new(|_: &[u8], _: bool| true),
        false => Box::new(Integrity::new()),
    }
}

/// A CLI interface for the update path.
#[derive(structopt::StructOpt)]
#[structopt(author)]
pub enum Update {
    /// Run an update against blank in-memory flash and print the erases and
    /// programs it issues.
    Plan {
        #[structopt(flatten)]
        target: Target,

        /// The size of the scratch flash; by default, just large enough for
        /// the capsule.
        #[structopt(long, parse(try_from_str = parse_int))]
        flash_size: Option<u32>,

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

    /// Apply a capsule to a flash image file.
    Apply {
        #[structopt(flatten)]
        target: Target,

        /// The flash image to update.
        #[structopt(long, parse(from_os_str))]
        flash: PathBuf,

        /// Input file, defaults to stdin.
        #[structopt(short = "i", long, parse(from_os_str))]
        input: Option<PathBuf>,
    },

    /// Write a capsule verbatim into a flash image file.
    Stage {
        /// The device address to stage the capsule at.
        #[structopt(long, parse(try_from_str = parse_int))]
        offset: u32,

        /// The flash image to write to.
        #[structopt(long, parse(from_os_str))]
        flash: PathBuf,

        /// Accept the capsule without checking its key chain or digests.
        #[structopt(long)]
        skip_auth: bool,

        /// Input file, defaults to stdin.
        #[structopt(short = "i", long, parse(from_os_str))]
        input: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct Plan {
    ops: Vec<Op>,
    report: Option<Report>,
    error: Option<String>,
}

/// Returns a flash size that fits every address an update of `bytes` could
/// touch.
fn scratch_size(bytes: &[u8], opts: &Options) -> u32 {
    let capsule = check!(
        Capsule::parse(bytes).map_err(|e| e.into_inner()),
        "failed to parse capsule"
    );
    let (manifest_end, image_base) = match &opts.variant {
        Variant::Standard(p) => {
            (p.legacy.max(p.current) as u64 + p.region_size as u64, 0)
        }
        Variant::SecureBoot(l) => (
            l.manifest_address as u64 + l.manifest_region_size as u64,
            l.secondary_image_offset as u64,
        ),
    };
    let offset = opts.device_offset as u64;
    let image_end = capsule.bitmap_bits() as u64 * BLOCK_SIZE as u64
        + SECTOR_SIZE as u64;
    let end = (offset + manifest_end)
        .max(offset + image_end)
        .max(image_base + image_end);
    let sector = SECTOR_SIZE as u64;
    check!(
        u32::try_from((end + sector - 1) / sector * sector),
        "capsule does not fit in a 32-bit address space"
    )
}

impl Update {
    pub fn run(self) {
        match self {
            Self::Plan {
                target,
                flash_size,
                pretty,
                input,
                output,
            } => {
                let bytes = crate::util::read_input(input.as_deref());
                let w = crate::util::output(output.as_deref());
                let opts = target.options();

                let size = flash_size
                    .unwrap_or_else(|| scratch_size(&bytes, &opts));
                let mut flash =
                    Recorder::new(RamMut(vec![0xff; size as usize]));
                let mut auth = authenticator(target.skip_auth);
                let result = update::apply(&mut flash, &mut *auth, &bytes, &opts);

                let (_, ops) = flash.into_parts();
                let failed = result.is_err();
                let plan = match result {
                    Ok(report) => Plan {
                        ops,
                        report: Some(report),
                        error: None,
                    },
                    Err(e) => Plan {
                        ops,
                        report: None,
                        error: Some(format!("{:?}", e.into_inner())),
                    },
                };
                crate::util::write_json(w, &plan, pretty);
                if failed {
                    std::process::exit(2);
                }
            }

            Self::Apply {
                target,
                flash,
                input,
            } => {
                let bytes = crate::util::read_input(input.as_deref());
                let mut flash =
                    check!(FileFlash::open(flash), "failed to open flash");
                let mut auth = authenticator(target.skip_auth);
                let report = check!(
                    update::apply(
                        &mut flash,
                        &mut *auth,
                        &bytes,
                        &target.options()
                    )
                    .map_err(|e| e.into_inner()),
                    "update failed"
                );
                crate::util::write_json(std::io::stdout(), &report, true);
            }

            Self::Stage {
                offset,
                flash,
                skip_auth,
                input,
            } => {
                let bytes = crate::util::read_input(input.as_deref());
                let mut flash =
                    check!(FileFlash::open(flash), "failed to open flash");
                let mut auth = authenticator(skip_auth);
                check!(
                    update::stage(&mut flash, &mut *auth, &bytes, offset)
                        .map_err(|e| e.into_inner()),
                    "staging failed"
                );
            }
        }
    }
}
