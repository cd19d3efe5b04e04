use embedded_storage::nor_flash::NorFlash;
use fcb::{EntryLocator, Fcb, FcbError};
use heapless::Vec;

use crate::fcb_log::read_clipped;
use crate::{
    LogEntryHdr, LogError, Result, ScratchRegion, LOG_ENTRY_HDR_SIZE, LOG_MAX_RECORD_LEN,
};

/// Writes `data` into a slot reserved by `Fcb::append` and commits it.
pub(crate) fn commit<F: NorFlash>(fcb: &mut Fcb<F>, loc: &EntryLocator, data: &[u8]) -> Result<()> {
    fcb.area_mut().write(loc.data_off, data)?;
    fcb.append_finish(loc)?;
    Ok(())
}

/// Appends `data` to `dst` as one entry.  Never rotates: a full `dst` is
/// reported as `NoSpace`.
fn append_to<F: NorFlash>(dst: &mut Fcb<F>, data: &[u8]) -> Result<EntryLocator> {
    let len = u16::try_from(data.len()).map_err(|_| FcbError::InvalidArg)?;
    let loc = dst.append(len)?;
    commit(dst, &loc, data)?;
    Ok(loc)
}

/// Copies the record at `loc` in `src` into `dst`.
///
/// At most `LOG_MAX_RECORD_LEN` bytes are carried over.  Entries too short
/// to hold a `LogEntryHdr` are not records and are refused.
pub fn copy_entry<S: NorFlash, D: NorFlash>(
    src: &mut Fcb<S>,
    loc: &EntryLocator,
    dst: &mut Fcb<D>,
) -> Result<EntryLocator> {
    let len = usize::from(loc.data_len).min(LOG_MAX_RECORD_LEN);
    if len < LOG_ENTRY_HDR_SIZE {
        return Err(LogError::ShortEntryErr);
    }

    let mut record: Vec<u8, LOG_MAX_RECORD_LEN> = Vec::new();
    record
        .resize(len, 0)
        .map_err(|_| LogError::RecordTooLongErr)?;
    read_clipped(src.area_mut(), loc, 0, &mut record)?;

    if let Some(hdr) = LogEntryHdr::decode(&record) {
        trace!("log: copying record {} ({} bytes)", hdr.index, len);
    }
    append_to(dst, &record)
}

/// Copies `start` and every entry after it from `src` into `dst`, returns
/// the number of entries copied.
pub fn copy_from<S: NorFlash, D: NorFlash>(
    src: &mut Fcb<S>,
    dst: &mut Fcb<D>,
    start: Option<EntryLocator>,
) -> Result<usize> {
    let mut cursor = start;
    let mut copied = 0;
    while let Some(loc) = cursor {
        copy_entry(src, &loc, dst)?;
        copied += 1;
        cursor = src.get_next(Some(&loc))?;
    }
    Ok(copied)
}

fn restore_failed(err: LogError) -> LogError {
    error!("log: restoring preserved records failed: {:?}", err);
    LogError::RestoreErr
}

/// Erases `live`, keeping its newest `entries` records.
pub fn preserve_and_erase<F: NorFlash, S: NorFlash>(
    live: &mut Fcb<F>,
    scratch: &mut ScratchRegion<S>,
    entries: u8,
) -> Result<()> {
    if entries == 0 {
        live.clear()?;
        return Ok(());
    }

    let spare = scratch.prepare()?;
    let start = live.offset_last_n(entries)?;
    let kept = copy_from(live, spare, start)?;
    info!("log: erasing, {} records parked in scratch", kept);

    live.clear().map_err(|err| restore_failed(err.into()))?;

    let first = spare
        .get_next(None)
        .map_err(|err| restore_failed(err.into()))?;
    let restored = copy_from(spare, live, first).map_err(restore_failed)?;
    debug!("log: {} records restored", restored);
    Ok(())
}
