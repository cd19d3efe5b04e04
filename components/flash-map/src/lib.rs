#![no_std]

//! Flash partition table and the flash-area window used by the log store.
//!
//! A `FlashArea` restricts a NOR flash device to one partition of the map
//! and translates area-relative offsets to device offsets.  It only knows
//! how to read, write and erase; it has no notion of entries or sectors
//! beyond the device's erase size.

use core::ops::Range;

mod area;

pub use area::{FlashArea, FlashAreaError, ERASED_BYTE, MAX_WRITE_SIZE};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AreaId {
    Log,
    ImageScratch,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlashMap {
    pub log: Range<u32>,
    pub scratch: Range<u32>,
}

impl FlashMap {
    /// Host simulation: four 4 KiB log sectors followed by one scratch sector.
    pub const SIM: Self = Self::split(0..0x5_000, 0x4_000);

    pub const fn split(region: Range<u32>, boundary: u32) -> Self {
        Self {
            log: region.start..boundary,
            scratch: boundary..region.end,
        }
    }

    pub fn area(&self, id: AreaId) -> Range<u32> {
        match id {
            AreaId::Log => self.log.clone(),
            AreaId::ImageScratch => self.scratch.clone(),
        }
    }
}


#[cfg(test)]
#[macro_use]
extern crate std;
