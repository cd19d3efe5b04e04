#![no_std]

//! Log storage on top of a flash circular buffer.
//!
//! This component realizes the storage side of a logging front end: records
//! are appended to an `Fcb` and read back, walked or flushed through the
//! `LogHandler` trait.  When the buffer runs out of space the oldest sector
//! is rotated away, or, with a `ScratchRegion` bound and a retention count
//! `N > 0`, the last `N` records are carried over an erase of the buffer.
//!
//! # Record Layout
//! Every record stored by the front end is:
//! ```text
//! LogEntryHdr (14 bytes) | message
//! ```
//! With `LogEntryHdr` being, all fields little endian:
//!
//! | bytes   | content                |
//! |---------|------------------------|
//! |  0 - 7  | timestamp (`i64`)      |
//! |  8 - 11 | record index (`u32`)   |
//! |    12   | module                 |
//! |    13   | level                  |
//!
//! # Preserve and Erase
//! 1. clear the scratch buffer (one sector, `SCRATCH_MAGIC`)
//! 2. locate the first of the last `N` records
//! 3. copy them out to scratch
//! 4. clear the live buffer
//! 5. copy them back
//!
//! Until step 4 the live buffer is untouched, errors are returned as they
//! are.  A failure in steps 4 or 5 is reported as `RestoreErr`; the live
//! buffer then holds fewer records, but only complete ones.

#[macro_use]
extern crate delog;
generate_macros!();

mod entry;
mod fcb_log;
mod handler;
mod retain;
mod scratch;

pub use crate::entry::{LogEntryHdr, LOG_ENTRY_HDR_SIZE};
pub use crate::fcb_log::FcbLog;
pub use crate::handler::{LogHandler, ReadEntry};
pub use crate::retain::{copy_entry, copy_from, preserve_and_erase};
pub use crate::scratch::{scratch_claimed, ScratchRegion};

use fcb::FcbError;
use flash_map::FlashAreaError;

/// Longest message the front end puts behind a record header.
pub const LOG_PRINTF_MAX_ENTRY_LEN: usize = 128;

/// Longest record the copy engine moves, header included.
pub const LOG_MAX_RECORD_LEN: usize = LOG_ENTRY_HDR_SIZE + LOG_PRINTF_MAX_ENTRY_LEN;

pub const SCRATCH_MAGIC: u32 = 0x7EAD_BADF;
pub const SCRATCH_VERSION: u8 = 0;

/// Corrective actions (rotate or preserve-and-erase) one append may take.
pub const MAX_APPEND_RETRIES: u8 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogError {
    FcbErr(FcbError),
    FlashErr(FlashAreaError),
    RecordTooLongErr,
    ShortEntryErr,
    RetriesExhaustedErr,
    NoScratchErr,
    ScratchBusyErr,
    ScratchSizeErr,
    RestoreErr,
}

impl From<FcbError> for LogError {
    fn from(error: FcbError) -> Self {
        Self::FcbErr(error)
    }
}

impl From<FlashAreaError> for LogError {
    fn from(error: FlashAreaError) -> Self {
        Self::FlashErr(error)
    }
}

pub type Result<T, E = LogError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests;

#[cfg(test)]
#[macro_use]
extern crate std;
