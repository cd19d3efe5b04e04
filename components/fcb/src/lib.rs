#![no_std]

//! Flash circular buffer: an append-only sequence of entries spread over the
//! sectors of one flash area, with wraparound by whole-sector erase.
//!
//! # Sector Layout
//! ```text
//! SectorHeader (16 bytes) | Entry1 | Entry2 | … | erased
//! ```
//! The header is a postcard-serialized `SectorHeader` padded with erased
//! bytes.  `id` grows by one (wrapping) for every sector that becomes active,
//! so after a reboot the oldest and the active sector can be recovered from
//! the headers alone.
//!
//! With `EntryX` being, each field padded to the write size of the device:
//!
//! | field  | content                                          |
//! |--------|--------------------------------------------------|
//! | length | 1 byte if < 0x80, else 2 bytes (7 bits each)     |
//! | data   | `length` bytes                                   |
//! | crc    | CRC-32 over length and data, little endian       |
//!
//! # Two-Phase Append
//! `append` reserves a slot and programs the length, the caller writes the
//! data and `append_finish` programs the CRC.  An entry whose CRC does not
//! match (never finished, or torn by a power cut) still carries a valid
//! length, so iteration steps over it and later entries stay reachable.

#[macro_use]
extern crate delog;
generate_macros!();

mod entry;
mod fcb;
mod sector;

pub use crate::entry::EntryLocator;
pub use crate::fcb::Fcb;
pub use crate::sector::SectorHeader;

use flash_map::FlashAreaError;

/// Largest entry length the length prefix can encode.
pub const FCB_MAX_LEN: u16 = 0x3fff;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FcbError {
    InvalidArg,
    /// Entry does not fit into an empty sector.
    TooLarge,
    /// Every sector is in use; rotate or clear to make room.
    NoSpace,
    Version,
    Encoding,
    Flash(FlashAreaError),
}

impl From<FlashAreaError> for FcbError {
    fn from(error: FlashAreaError) -> Self {
        Self::Flash(error)
    }
}

pub type Result<T, E = FcbError> = core::result::Result<T, E>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FcbConfig {
    pub magic: u32,
    pub version: u8,
    /// Sectors kept free ahead of the active one.
    pub scratch_cnt: u8,
}

impl FcbConfig {
    pub const fn new(magic: u32, version: u8) -> Self {
        Self {
            magic,
            version,
            scratch_cnt: 0,
        }
    }

    pub const fn with_scratch_cnt(mut self, scratch_cnt: u8) -> Self {
        self.scratch_cnt = scratch_cnt;
        self
    }
}


#[cfg(test)]
#[macro_use]
extern crate std;
