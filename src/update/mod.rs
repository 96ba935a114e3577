// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Capsule application.
//!
//! This module turns a capsule's bitmaps into erase and program operations
//! against a [`Flash`] device. There are two flavors of update, which share
//! the same bitmap walk and differ only in a handful of policies captured by
//! [`Variant`]:
//!
//! - The standard update, [`apply_update()`], walks the bitmaps sixteen
//!   blocks at a time and requires every erase to cover a whole 64 KiB
//!   sector.
//! - The dual-image update, [`apply_secure_boot_update()`], walks them eight
//!   blocks at a time, erases only on sector boundaries, and relocates
//!   blocks according to a [`SecureBootLayout`].
//!
//! In both cases, the manifest is written to a fixed address first, and
//! then the walk proceeds over the blocks in order. Every block whose bit in
//! the active map is set gets an erase decision; every block whose bit in
//! the copy map is set is programmed from the payload, in order. Blocks
//! that would only be erased are checked against the manifest's regions:
//! erasing a region no digest covers is skipped unless the caller forces
//! it.
//!
//! Copy-marked blocks are programmed in runs, and a run is only programmed
//! once every block in it has had its erase decided. The walk never issues
//! a program past the end of the flash it has erased so far; when the
//! bitmaps ask for one, it first erases the sectors it is missing.
//!
//! Nothing here retries or rolls back: the first failure is returned, and
//! the flash is left however far the update got.

use core::convert::TryFrom as _;
use core::ops::Range;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::capsule;
use crate::capsule::BitmapExt as _;
use crate::capsule::Capsule;
use crate::capsule::ContentType;
use crate::capsule::BLOCK_SIZE;
use crate::crypto::Authenticate;
use crate::hardware::flash;
use crate::hardware::flash::Flash;
use crate::hardware::flash::Ptr;
use crate::hardware::flash::Region;
use crate::hardware::flash::SECTOR_SIZE;
use crate::policy::Coverage;
use crate::policy::RegionIndex;
use crate::policy::Status;
use crate::wire::WireEnum as _;

mod layout;
pub use layout::ManifestPlacement;
pub use layout::SecureBootLayout;

/// The number of blocks in a sector.
const SECTOR_BLOCKS: u32 = SECTOR_SIZE / BLOCK_SIZE;

/// An error returned by an update operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateError {
    /// The authenticator rejected the capsule.
    AuthenticationFailed,
    /// The capsule could not be decoded, or its payload ran out.
    MalformedCapsule(capsule::Error),
    /// The bitmaps asked for an erase smaller than a sector.
    UnsupportedEraseGranularity {
        /// The device address of the block.
        address: u32,
    },
    /// A sector erase would straddle two of the manifest's regions.
    MisalignedRegion {
        /// The address of the sector, relative to the image.
        address: u32,
    },
    /// The flash device reported an error.
    DeviceIo(flash::Error),
}

impl From<capsule::Error> for UpdateError {
    fn from(e: capsule::Error) -> Self {
        Self::MalformedCapsule(e)
    }
}

impl From<flash::Error> for UpdateError {
    fn from(e: flash::Error) -> Self {
        Self::DeviceIo(e)
    }
}

debug_from!(UpdateError => capsule::Error);

/// Converts a raw device result, logging the failure.
fn device<T>(r: Result<T, flash::Error>) -> crate::Result<T, UpdateError> {
    r.or_else(|e| fail!(UpdateError::DeviceIo(e)))
}

/// Which flavor of update to perform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// A standard update, placing the manifest according to its layout
    /// byte.
    Standard(ManifestPlacement),
    /// A dual-image update.
    SecureBoot(SecureBootLayout),
}

impl Variant {
    /// The interval, in blocks, at which run lengths are recomputed.
    fn stride(&self) -> u32 {
        match self {
            Self::Standard(_) => 16,
            Self::SecureBoot(_) => 8,
        }
    }
}

/// Options for [`apply()`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// The device address of block zero of the image.
    pub device_offset: u32,
    /// Whether to erase blocks that lie in a region no digest covers.
    ///
    /// For a standard update, setting this also relaxes authentication:
    /// the authenticator is told not to require the root key chain.
    pub force_erase_unsigned: bool,
    /// The flavor of update.
    pub variant: Variant,
}

/// What an update did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Report {
    /// Where the manifest was written.
    pub manifest: Option<Region>,
    /// The number of sector erases requested by the active map.
    pub erases: u32,
    /// The number of additional sector erases issued to cover a program.
    pub catch_up_erases: u32,
    /// The number of payload programs.
    pub programs: u32,
    /// The number of payload bytes programmed, not counting the manifest.
    pub bytes_written: u32,
    /// The number of erases left out because they would only have touched
    /// unsigned regions.
    pub skipped_erases: u32,
    /// How far into the payload the update read.
    pub payload_consumed: usize,
}

/// Applies a standard update.
///
/// `device_offset` is the device address at which the image starts. If
/// `force_erase_unsigned` is set, blocks in unsigned regions are erased too,
/// and the capsule is authenticated without requiring the root key chain.
pub fn apply_update<F, A>(
    flash: &mut F,
    auth: &mut A,
    capsule: &[u8],
    device_offset: u32,
    force_erase_unsigned: bool,
) -> crate::Result<Report, UpdateError>
where
    F: Flash + ?Sized,
    A: Authenticate + ?Sized,
{
    apply(
        flash,
        auth,
        capsule,
        &Options {
            device_offset,
            force_erase_unsigned,
            variant: Variant::Standard(ManifestPlacement::default()),
        },
    )
}

/// Applies a dual-image update, with the given flash map.
///
/// The capsule is always authenticated against the root key chain.
pub fn apply_secure_boot_update<F, A>(
    flash: &mut F,
    auth: &mut A,
    capsule: &[u8],
    device_offset: u32,
    force_erase_unsigned: bool,
    layout: &SecureBootLayout,
) -> crate::Result<Report, UpdateError>
where
    F: Flash + ?Sized,
    A: Authenticate + ?Sized,
{
    apply(
        flash,
        auth,
        capsule,
        &Options {
            device_offset,
            force_erase_unsigned,
            variant: Variant::SecureBoot(*layout),
        },
    )
}

/// Applies `capsule` to `flash`, as described by `opts`.
pub fn apply<F, A>(
    flash: &mut F,
    auth: &mut A,
    capsule: &[u8],
    opts: &Options,
) -> crate::Result<Report, UpdateError>
where
    F: Flash + ?Sized,
    A: Authenticate + ?Sized,
{
    let require_root_key_chain = match opts.variant {
        Variant::Standard(_) => !opts.force_erase_unsigned,
        Variant::SecureBoot(_) => true,
    };
    check!(
        auth.authenticate(capsule, require_root_key_chain),
        UpdateError::AuthenticationFailed
    );

    let capsule = Capsule::parse(capsule)?;
    let mut walk = Walk {
        flash,
        opts,
        pc_type: capsule.pc_type(),
        index: RegionIndex::new(capsule.manifest()),
        bits: capsule.bitmap_bits(),
        active: capsule.active_map(),
        copy: capsule.copy_map(),
        payload: capsule.payload(),
        erased: Erased::default(),
        report: Report::default(),
    };

    walk.write_manifest(&capsule)?;

    let stride = opts.variant.stride();
    let mut run = Run::default();
    let mut queued: Option<Range<u32>> = None;
    for blk in 0..walk.bits {
        if blk % stride == 0 {
            run = walk.run_at(blk);
        }
        if let Some(blocks) = queued.clone() {
            if blocks.end == blk {
                walk.program(blocks)?;
                queued = None;
            }
        }

        walk.settle_erase(blk, &mut run)?;
        if queued.is_none() && walk.copy.bit(blk) {
            queued = Some(blk..blk + run.write);
        }
    }
    if let Some(blocks) = queued {
        walk.program(blocks)?;
    }

    device(walk.flash.flush())?;
    info!(
        "update complete: {} erases ({} catch-up, {} skipped), {} bytes programmed",
        walk.report.erases,
        walk.report.catch_up_erases,
        walk.report.skipped_erases,
        walk.report.bytes_written,
    );
    Ok(walk.report)
}

/// Writes `capsule` verbatim to `flash` at `offset`, for a later update to
/// pick up.
///
/// The capsule is authenticated against the root key chain but is not
/// otherwise decoded. `offset` must be aligned to the device's erase size.
pub fn stage<F, A>(
    flash: &mut F,
    auth: &mut A,
    capsule: &[u8],
    offset: u32,
) -> crate::Result<(), UpdateError>
where
    F: Flash + ?Sized,
    A: Authenticate + ?Sized,
{
    check!(
        auth.authenticate(capsule, true),
        UpdateError::AuthenticationFailed
    );

    let erase_size = flash.erase_size();
    check!(
        offset % erase_size == 0,
        UpdateError::MisalignedRegion { address: offset }
    );
    let len = match u32::try_from(capsule.len())
        .ok()
        .and_then(|len| capsule::block_round(len, erase_size))
    {
        Some(len) => len,
        None => return fail!(UpdateError::DeviceIo(flash::Error::OutOfRange)),
    };

    trace!("staging {} bytes at {:#x}", capsule.len(), offset);
    device(flash.erase(Region::new(offset, len)))?;
    device(flash.program(Ptr::new(offset), capsule))?;
    device(flash.flush())
}

/// What the current run of blocks asks for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EraseRun {
    /// Only the current block is marked.
    Block,
    /// The whole sector is marked.
    Sector,
    /// The sector has already been erased, or its erase was skipped.
    Done,
}

/// Run lengths, recomputed every stride.
#[derive(Copy, Clone, Debug)]
struct Run {
    erase: EraseRun,
    /// The number of blocks a program starting at the top of the stride
    /// covers.
    write: u32,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            erase: EraseRun::Block,
            write: 1,
        }
    }
}

/// The last contiguous range of device addresses erased.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Erased {
    from: u32,
    to: u32,
}

impl Erased {
    fn covers(self, range: &Range<u32>) -> bool {
        self.from <= range.start && range.end <= self.to
    }

    /// Returns the next sector to erase on the way to covering a program
    /// starting at `start`.
    fn next_sector(self, start: u32) -> u32 {
        match (self.from..=self.to).contains(&start) {
            true => self.to,
            false => start & !(SECTOR_SIZE - 1),
        }
    }

    fn record(self, erase: Range<u32>) -> Self {
        if erase.start == self.to {
            Self {
                from: self.from,
                to: erase.end,
            }
        } else if erase.end == self.from {
            Self {
                from: erase.start,
                to: self.to,
            }
        } else {
            Self {
                from: erase.start,
                to: erase.end,
            }
        }
    }
}

/// The state of a bitmap walk.
struct Walk<'a, 'f, F: ?Sized> {
    flash: &'f mut F,
    opts: &'f Options,
    pc_type: u32,
    index: RegionIndex<'a>,
    bits: u32,
    active: &'a [u8],
    copy: &'a [u8],
    payload: &'a [u8],
    erased: Erased,
    report: Report,
}

impl<F: Flash + ?Sized> Walk<'_, '_, F> {
    fn write_manifest(
        &mut self,
        capsule: &Capsule,
    ) -> crate::Result<(), UpdateError> {
        let (base, region_size) = match &self.opts.variant {
            Variant::Standard(placement) => (
                placement.address_for(capsule.manifest().header()),
                placement.region_size,
            ),
            Variant::SecureBoot(layout) => {
                (layout.manifest_address, layout.manifest_region_size)
            }
        };
        let bytes = capsule.manifest_bytes();
        check!(
            bytes.len() <= region_size as usize,
            UpdateError::MalformedCapsule(capsule::Error::ManifestTooLong)
        );

        let address = match base.checked_add(self.opts.device_offset) {
            Some(a) => a,
            None => {
                return fail!(UpdateError::DeviceIo(flash::Error::OutOfRange))
            }
        };
        trace!("writing {} manifest bytes at {:#x}", bytes.len(), address);
        device(self.flash.erase(Region::new(address, region_size)))?;
        device(self.flash.program(Ptr::new(address), bytes))?;
        self.report.manifest = Some(Region::new(address, bytes.len() as u32));
        Ok(())
    }

    /// Computes run lengths for the stride starting at `blk`.
    fn run_at(&self, blk: u32) -> Run {
        let mut run = Run::default();
        if blk + 8 < self.bits {
            if self.active.window_is(blk, 0xff) {
                run.erase = EraseRun::Sector;
            }
            if self.copy.window_is(blk, 0xff) || self.copy.window_is(blk, 0x00)
            {
                run.write = SECTOR_BLOCKS;
            }
        }
        run
    }

    /// Issues whatever erase the active map asks of block `blk`.
    fn settle_erase(
        &mut self,
        blk: u32,
        run: &mut Run,
    ) -> crate::Result<(), UpdateError> {
        if !self.active.bit(blk) {
            return Ok(());
        }
        let span = match self.pending_erase(blk, run) {
            Some(span) => span,
            None => return Ok(()),
        };
        if !self.copy.bit(blk) && !self.may_erase(blk, span)? {
            self.report.skipped_erases += 1;
            if span == SECTOR_BLOCKS {
                run.erase = EraseRun::Done;
            }
            return Ok(());
        }
        self.erase(blk, run)
    }

    /// Returns the number of blocks, starting at `blk`, that an erase at
    /// `blk` would be asked to cover, if there is one to issue.
    fn pending_erase(&self, blk: u32, run: &Run) -> Option<u32> {
        let span = match run.erase {
            EraseRun::Sector => SECTOR_BLOCKS,
            EraseRun::Block => 1,
            EraseRun::Done => return None,
        };
        match self.opts.variant {
            Variant::SecureBoot(_) if blk % SECTOR_BLOCKS != 0 => None,
            _ => Some(span),
        }
    }

    /// Decides whether the `span` blocks at `blk` may be erased.
    fn may_erase(
        &self,
        blk: u32,
        span: u32,
    ) -> crate::Result<bool, UpdateError> {
        let range = image_range(blk, span)?;
        match self.index.classify(range.clone()) {
            Coverage::Within(Status::Signed) => Ok(true),
            Coverage::Within(Status::Unsigned) => {
                if !self.opts.force_erase_unsigned {
                    info!(
                        "skipping erase of unsigned region {:#x}..{:#x}",
                        range.start, range.end
                    );
                }
                Ok(self.opts.force_erase_unsigned)
            }
            Coverage::Straddles => match self.opts.variant {
                Variant::SecureBoot(_) if span > 1 => self.may_erase(blk, 1),
                _ => fail!(UpdateError::MisalignedRegion {
                    address: range.start
                }),
            },
            Coverage::Outside => {
                warn!(
                    "no region covers {:#x}..{:#x}; erasing anyway",
                    range.start, range.end
                );
                Ok(true)
            }
        }
    }

    fn erase(
        &mut self,
        blk: u32,
        run: &mut Run,
    ) -> crate::Result<(), UpdateError> {
        let sector = match (&self.opts.variant, run.erase) {
            (_, EraseRun::Done) => return Ok(()),
            (Variant::Standard(_), EraseRun::Block) => {
                return fail!(UpdateError::UnsupportedEraseGranularity {
                    address: self.device_address(blk)?,
                })
            }
            (Variant::Standard(_), EraseRun::Sector) => {
                run.erase = EraseRun::Done;
                blk - blk % SECTOR_BLOCKS
            }
            (Variant::SecureBoot(_), EraseRun::Block) => {
                trace!("widening erase at block {:#x} to a sector", blk);
                blk
            }
            (Variant::SecureBoot(_), EraseRun::Sector) => blk,
        };

        let start = self.device_address(sector)?;
        self.erase_sector(start)?;
        self.report.erases += 1;
        Ok(())
    }

    fn erase_sector(&mut self, start: u32) -> crate::Result<(), UpdateError> {
        let end = match start.checked_add(SECTOR_SIZE) {
            Some(end) => end,
            None => {
                return fail!(UpdateError::DeviceIo(flash::Error::OutOfRange))
            }
        };
        trace!("erasing {:#x}..{:#x}", start, end);
        device(self.flash.erase(Region::new(start, SECTOR_SIZE)))?;
        self.erased = self.erased.record(start..end);
        Ok(())
    }

    /// Programs `blocks` from the next bytes of the payload.
    fn program(
        &mut self,
        blocks: Range<u32>,
    ) -> crate::Result<(), UpdateError> {
        let start = self.device_address(blocks.start)?;
        let len = (blocks.end - blocks.start) * BLOCK_SIZE;
        let target = match start.checked_add(len) {
            Some(end) => start..end,
            None => {
                return fail!(UpdateError::DeviceIo(flash::Error::OutOfRange))
            }
        };

        while !self.erased.covers(&target) {
            let sector = self.erased.next_sector(target.start);
            trace!("catching up to {:#x}", target.end);
            self.erase_sector(sector)?;
            self.report.catch_up_erases += 1;
        }

        let cursor = self.report.payload_consumed;
        let data = match self.payload.get(cursor..cursor + len as usize) {
            Some(data) => data,
            None => {
                return fail!(UpdateError::MalformedCapsule(
                    capsule::Error::PayloadTooShort
                ))
            }
        };

        trace!("programming {:#x}..{:#x}", target.start, target.end);
        device(self.flash.program(Ptr::new(start), data))?;
        self.report.programs += 1;
        self.report.bytes_written += len;
        self.report.payload_consumed += len as usize;
        Ok(())
    }

    /// Maps block `blk` of the image to a device address.
    fn device_address(&self, blk: u32) -> crate::Result<u32, UpdateError> {
        let mut blk = blk;
        let mut offset = self.opts.device_offset;
        if let Variant::SecureBoot(layout) = &self.opts.variant {
            if offset == layout.secondary_image_offset {
                if blk >= layout.fit_image_block {
                    blk = blk.saturating_sub(layout.blocks_skip);
                } else if blk < layout.loader_block
                    && self.pc_type == ContentType::SecureBootBmc.to_wire_value()
                {
                    offset = 0;
                }
            }
        }

        match blk
            .checked_mul(BLOCK_SIZE)
            .and_then(|a| a.checked_add(offset))
        {
            Some(address) => Ok(address),
            None => fail!(UpdateError::DeviceIo(flash::Error::OutOfRange)),
        }
    }
}

/// Returns the image addresses of the `span` blocks at `blk`.
fn image_range(blk: u32, span: u32) -> crate::Result<Range<u32>, UpdateError> {
    let end = blk.checked_add(span).and_then(|b| b.checked_mul(BLOCK_SIZE));
    match (blk.checked_mul(BLOCK_SIZE), end) {
        (Some(start), Some(end)) => Ok(start..end),
        _ => fail!(UpdateError::DeviceIo(flash::Error::OutOfRange)),
    }
}
