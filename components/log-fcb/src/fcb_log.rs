use core::ops::ControlFlow;

use embedded_storage::nor_flash::NorFlash;
use fcb::{EntryLocator, Fcb, FcbError};
use flash_map::FlashArea;

use crate::retain::{self, commit};
use crate::{
    LogError, LogHandler, ReadEntry, Result, ScratchRegion, LOG_ENTRY_HDR_SIZE, LOG_MAX_RECORD_LEN,
    MAX_APPEND_RETRIES,
};

/// Reads the part of the entry at `loc` starting at `offset` that fits
/// into `buf`.
pub(crate) fn read_clipped<F: NorFlash>(
    area: &mut FlashArea<F>,
    loc: &EntryLocator,
    offset: u16,
    buf: &mut [u8],
) -> Result<usize> {
    let len = usize::from(loc.data_len.saturating_sub(offset)).min(buf.len());
    if len == 0 {
        return Ok(0);
    }
    area.read(loc.data_off + u32::from(offset), &mut buf[..len])?;
    Ok(len)
}

impl<F: NorFlash> ReadEntry<EntryLocator> for FlashArea<F> {
    fn read_entry(&mut self, loc: &EntryLocator, offset: u16, buf: &mut [u8]) -> usize {
        read_clipped(self, loc, offset, buf).unwrap_or_else(|_err| {
            warn!("log: read of entry at {:#x} failed: {:?}", loc.data_off, _err);
            0
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum Recovery {
    Rotate,
    PreserveErase,
}

#[derive(Clone, Copy, Debug)]
enum AppendState {
    Reserving,
    Retrying(Recovery),
    Committing(EntryLocator),
}

/// Log stored in a flash circular buffer, optionally keeping the newest
/// `entries` records when the buffer has to be erased to make room.
pub struct FcbLog<F, S = F> {
    fcb: Fcb<F>,
    entries: u8,
    scratch: Option<ScratchRegion<S>>,
}

impl<F: NorFlash> FcbLog<F> {
    /// Log that rotates away the oldest sector when full.
    pub fn new(fcb: Fcb<F>) -> Self {
        Self {
            fcb,
            entries: 0,
            scratch: None,
        }
    }
}

impl<F: NorFlash, S: NorFlash> FcbLog<F, S> {
    /// Log that keeps the newest `entries` records across the erase that
    /// makes room once it is full.
    ///
    /// The kept records have to fit into the single scratch sector.  If they
    /// do not, the copy to scratch fails with `FcbErr(NoSpace)` and the full
    /// log stays unwritable until it is flushed.  Records shorter than a
    /// `LogEntryHdr` or longer than `LOG_MAX_RECORD_LEN` are refused.
    pub fn with_retention(fcb: Fcb<F>, entries: u8, scratch: ScratchRegion<S>) -> Self {
        Self {
            fcb,
            entries,
            scratch: Some(scratch),
        }
    }

    pub fn entries(&self) -> u8 {
        self.entries
    }

    pub fn fcb(&self) -> &Fcb<F> {
        &self.fcb
    }

    pub fn fcb_mut(&mut self) -> &mut Fcb<F> {
        &mut self.fcb
    }

    pub fn into_parts(self) -> (Fcb<F>, Option<ScratchRegion<S>>) {
        (self.fcb, self.scratch)
    }

    /// Like `LogHandler::read`, but a failing flash read is an error instead
    /// of an empty read.
    pub fn try_read(&mut self, loc: &EntryLocator, offset: u16, buf: &mut [u8]) -> Result<usize> {
        read_clipped(self.fcb.area_mut(), loc, offset, buf)
    }

    fn recovery(&self) -> Recovery {
        if self.entries > 0 && self.scratch.is_some() {
            Recovery::PreserveErase
        } else {
            Recovery::Rotate
        }
    }
}

impl<F: NorFlash, S: NorFlash> LogHandler for FcbLog<F, S> {
    type Locator = EntryLocator;
    type Reader = FlashArea<F>;

    fn reader(&mut self) -> &mut FlashArea<F> {
        self.fcb.area_mut()
    }

    fn append(&mut self, data: &[u8]) -> Result<EntryLocator> {
        // preserved records must survive the copy engine whole
        if self.scratch.is_some() {
            if data.len() > LOG_MAX_RECORD_LEN {
                return Err(LogError::RecordTooLongErr);
            }
            if data.len() < LOG_ENTRY_HDR_SIZE {
                return Err(LogError::ShortEntryErr);
            }
        }
        let len = u16::try_from(data.len()).map_err(|_| FcbError::InvalidArg)?;

        let mut retries = 0;
        let mut state = AppendState::Reserving;
        loop {
            state = match state {
                AppendState::Reserving => match self.fcb.append(len) {
                    Ok(loc) => AppendState::Committing(loc),
                    Err(FcbError::NoSpace) if retries < MAX_APPEND_RETRIES => {
                        retries += 1;
                        AppendState::Retrying(self.recovery())
                    }
                    Err(FcbError::NoSpace) => {
                        warn!("log: no space after {} retries", retries);
                        return Err(LogError::RetriesExhaustedErr);
                    }
                    Err(err) => return Err(err.into()),
                },
                AppendState::Retrying(Recovery::Rotate) => {
                    trace!("log: full, rotating");
                    self.fcb.rotate()?;
                    AppendState::Reserving
                }
                AppendState::Retrying(Recovery::PreserveErase) => {
                    trace!("log: full, keeping last {} records", self.entries);
                    self.preserve_and_erase()?;
                    AppendState::Reserving
                }
                AppendState::Committing(loc) => {
                    commit(&mut self.fcb, &loc, data)?;
                    return Ok(loc);
                }
            };
        }
    }

    fn walk<B, W>(&mut self, mut walker: W) -> Result<Option<B>>
    where
        W: FnMut(&mut Self::Reader, &Self::Locator, u16) -> ControlFlow<B>,
    {
        let mut cursor = None;
        while let Some(loc) = self.fcb.get_next(cursor.as_ref())? {
            if let ControlFlow::Break(status) = walker(self.fcb.area_mut(), &loc, loc.data_len) {
                return Ok(Some(status));
            }
            cursor = Some(loc);
        }
        Ok(None)
    }

    fn flush(&mut self) -> Result<()> {
        self.fcb.clear()?;
        Ok(())
    }

    fn preserve_and_erase(&mut self) -> Result<()> {
        let Some(scratch) = self.scratch.as_mut() else {
            return Err(LogError::NoScratchErr);
        };
        retain::preserve_and_erase(&mut self.fcb, scratch, self.entries)
    }
}
