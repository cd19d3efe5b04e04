use core::ops::ControlFlow;

use fcb::{Fcb, FcbConfig, FcbError};
use flash_map::{FlashArea, FlashAreaError};

use embedded_storage::nor_flash::{NorFlash, NorFlashErrorKind};
use quickcheck::{QuickCheck, TestResult};
use rand::Rng;
use serial_test::serial;
use utils::RamFlash;

use std::vec::Vec;

use crate::{
    copy_entry, scratch_claimed, FcbLog, LogEntryHdr, LogError, LogHandler, ReadEntry,
    ScratchRegion, LOG_MAX_RECORD_LEN,
};

// two sectors, two 30 byte records in each
type LiveFlash = RamFlash<256, 128, 4>;
// three sectors holding a single record each
type NarrowFlash = RamFlash<192, 64, 4>;
// room for six records
type ScratchFlash = RamFlash<256, 256, 4>;
// room for two records
type SmallScratch = RamFlash<128, 128, 4>;

const LOG_CONFIG: FcbConfig = FcbConfig::new(0x4c4f_4721, 1);

fn mount<F: NorFlash>(flash: F, len: u32) -> Fcb<F> {
    Fcb::new(FlashArea::new(flash, 0..len).unwrap(), LOG_CONFIG).unwrap()
}

fn claim<S: NorFlash>(flash: S, len: u32) -> ScratchRegion<S> {
    ScratchRegion::claim(FlashArea::new(flash, 0..len).unwrap()).unwrap()
}

fn rotating() -> FcbLog<LiveFlash> {
    FcbLog::new(mount(LiveFlash::new(), 256))
}

fn retaining(entries: u8) -> FcbLog<LiveFlash, ScratchFlash> {
    FcbLog::with_retention(
        mount(LiveFlash::new(), 256),
        entries,
        claim(ScratchFlash::new(), 256),
    )
}

/// 30 byte record: header followed by a 16 byte message
fn record(index: u32) -> Vec<u8> {
    let hdr = LogEntryHdr {
        ts: 1_000 + i64::from(index),
        index,
        module: 3,
        level: 1,
    };
    let mut raw = hdr.encode().to_vec();
    raw.extend_from_slice(&[b'a' + (index % 26) as u8; 16]);
    raw
}

fn append_all<L: LogHandler>(log: &mut L, indices: core::ops::Range<u32>) {
    for index in indices {
        log.append(&record(index)).unwrap();
    }
}

fn contents<L: LogHandler>(log: &mut L) -> Vec<Vec<u8>> {
    let mut entries = Vec::new();
    let status: Option<()> = log
        .walk(|reader, loc, len| {
            let mut buf = vec![0u8; usize::from(len)];
            assert_eq!(reader.read_entry(loc, 0, &mut buf), usize::from(len));
            entries.push(buf);
            ControlFlow::Continue(())
        })
        .unwrap();
    assert!(status.is_none());
    entries
}

fn indices<L: LogHandler>(log: &mut L) -> Vec<u32> {
    contents(log)
        .iter()
        .map(|raw| LogEntryHdr::decode(raw).unwrap().index)
        .collect()
}

#[test]
fn entry_header_layout() {
    let hdr = LogEntryHdr {
        ts: -2,
        index: 0x0102_0304,
        module: 7,
        level: 4,
    };
    let raw = hdr.encode();
    assert_eq!(&raw[..8], &[0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    assert_eq!(&raw[8..], &[4, 3, 2, 1, 7, 4]);
    assert_eq!(LogEntryHdr::decode(&raw), Some(hdr));
    assert_eq!(LogEntryHdr::decode(&raw[..13]), None);
}

#[test]
fn appended_payloads_read_back() {
    let mut rng = rand::thread_rng();
    let mut log = rotating();
    for _ in 0..16 {
        let mut payload = vec![0u8; rng.gen_range(1..=60)];
        rng.fill(payload.as_mut_slice());

        let loc = log.append(&payload).unwrap();
        let mut buf = vec![0u8; payload.len()];
        assert_eq!(log.read(&loc, 0, &mut buf), payload.len());
        assert_eq!(buf, payload);
    }
}

#[test]
fn reads_are_clipped_to_the_entry() {
    let mut log = rotating();
    let payload = record(0);
    let loc = log.append(&payload).unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(log.read(&loc, 20, &mut buf), 10);
    assert_eq!(&buf[..10], &payload[20..]);

    assert_eq!(log.read(&loc, 0, &mut buf[..4]), 4);
    assert_eq!(&buf[..4], &payload[..4]);

    assert_eq!(log.read(&loc, 30, &mut buf), 0);
    assert_eq!(log.read(&loc, 200, &mut buf), 0);
    assert_eq!(log.try_read(&loc, 30, &mut buf), Ok(0));
}

#[test]
fn read_failures_read_as_empty() {
    let mut log = rotating();
    let loc = log.append(&record(0)).unwrap();

    log.fcb_mut().area_mut().flash_mut().fail_reads(true);
    let mut buf = [0u8; 30];
    assert_eq!(log.read(&loc, 0, &mut buf), 0);
    assert_eq!(
        log.try_read(&loc, 0, &mut buf),
        Err(LogError::FlashErr(FlashAreaError::Device(
            NorFlashErrorKind::Other
        )))
    );

    log.fcb_mut().area_mut().flash_mut().fail_reads(false);
    assert_eq!(log.try_read(&loc, 0, &mut buf), Ok(30));
}

#[test]
fn walk_visits_in_append_order_and_stops_on_break() {
    let mut log = rotating();
    append_all(&mut log, 0..3);
    assert_eq!(indices(&mut log), [0, 1, 2]);

    let mut visited = 0;
    let status = log
        .walk(|reader, loc, _| {
            visited += 1;
            let mut raw = [0u8; 14];
            reader.read_entry(loc, 0, &mut raw);
            match LogEntryHdr::decode(&raw) {
                Some(hdr) if hdr.index == 1 => ControlFlow::Break(hdr.ts),
                _ => ControlFlow::Continue(()),
            }
        })
        .unwrap();
    assert_eq!(status, Some(1_001));
    assert_eq!(visited, 2);
}

#[test]
fn rotation_drops_the_oldest_sector() {
    let mut log = rotating();
    append_all(&mut log, 0..5);
    assert_eq!(indices(&mut log), [2, 3, 4]);
}

#[test]
fn preserve_without_scratch_is_refused() {
    let mut log = rotating();
    append_all(&mut log, 0..2);
    assert_eq!(log.preserve_and_erase(), Err(LogError::NoScratchErr));
    assert_eq!(indices(&mut log), [0, 1]);
}

#[test]
fn oversized_records() {
    let mut log = rotating();
    assert_eq!(
        log.append(&[0u8; 200]),
        Err(LogError::FcbErr(FcbError::TooLarge))
    );
    assert_eq!(
        log.append(&vec![0u8; 0x4000]),
        Err(LogError::FcbErr(FcbError::InvalidArg))
    );
}

#[test]
#[serial]
fn flush_discards_everything() {
    let mut log = retaining(3);
    append_all(&mut log, 0..3);
    log.flush().unwrap();
    assert!(contents(&mut log).is_empty());

    append_all(&mut log, 3..4);
    assert_eq!(indices(&mut log), [3]);
}

#[test]
#[serial]
fn retention_keeps_the_newest_records() {
    let mut log = retaining(3);
    append_all(&mut log, 0..5);
    assert_eq!(indices(&mut log), [1, 2, 3, 4]);
    drop(log);

    let mut log = retaining(1);
    append_all(&mut log, 0..5);
    assert_eq!(indices(&mut log), [3, 4]);
}

#[test]
#[serial]
fn retention_with_single_record_sectors() {
    let mut log = FcbLog::with_retention(
        mount(NarrowFlash::new(), 192),
        2,
        claim(ScratchFlash::new(), 256),
    );
    append_all(&mut log, 0..4);
    assert_eq!(indices(&mut log), [1, 2, 3]);
}

#[test]
#[serial]
fn zero_retention_rotates() {
    let mut log = retaining(0);
    append_all(&mut log, 0..5);
    assert_eq!(indices(&mut log), [2, 3, 4]);
}

#[test]
#[serial]
fn preserved_records_are_intact() {
    let mut log = retaining(3);
    append_all(&mut log, 0..7);
    assert_eq!(
        contents(&mut log),
        (3..7).map(record).collect::<Vec<_>>()
    );

    let (fcb, _scratch) = log.into_parts();
    let mut log = FcbLog::new(Fcb::new(fcb.into_area(), LOG_CONFIG).unwrap());
    assert_eq!(indices(&mut log), [3, 4, 5, 6]);
}

#[test]
#[serial]
fn retaining_a_full_buffer_exhausts_retries() {
    let mut log = retaining(4);
    append_all(&mut log, 0..4);
    assert_eq!(
        log.append(&record(4)),
        Err(LogError::RetriesExhaustedErr)
    );
    assert_eq!(indices(&mut log), [0, 1, 2, 3]);
}

#[test]
#[serial]
fn copy_out_overflow_leaves_the_log_unwritable() {
    let mut log = FcbLog::with_retention(
        mount(LiveFlash::new(), 256),
        3,
        claim(SmallScratch::new(), 128),
    );
    append_all(&mut log, 0..4);
    // three records never fit the two-record scratch, every append fails
    for index in 4..7 {
        assert_eq!(
            log.append(&record(index)),
            Err(LogError::FcbErr(FcbError::NoSpace))
        );
    }
    assert_eq!(indices(&mut log), [0, 1, 2, 3]);

    log.flush().unwrap();
    append_all(&mut log, 7..8);
    assert_eq!(indices(&mut log), [7]);
}

#[test]
#[serial]
fn records_longer_than_the_copy_limit_are_refused() {
    let mut log = retaining(2);
    assert_eq!(
        log.append(&[0u8; LOG_MAX_RECORD_LEN + 1]),
        Err(LogError::RecordTooLongErr)
    );
    assert!(contents(&mut log).is_empty());
}

#[test]
#[serial]
fn records_shorter_than_a_header_are_refused() {
    let mut log = retaining(3);
    append_all(&mut log, 0..3);
    assert_eq!(log.append(b"hi"), Err(LogError::ShortEntryErr));

    // the log keeps making room for later records
    append_all(&mut log, 10..13);
    assert_eq!(indices(&mut log), [2, 10, 11, 12]);

    // without retention there is nothing to copy, short records are fine
    let mut log = rotating();
    log.append(b"hi").unwrap();
}

#[test]
#[serial]
fn one_retaining_log_at_a_time() {
    let first = retaining(1);
    let area = FlashArea::new(ScratchFlash::new(), 0..256).unwrap();
    assert!(matches!(
        ScratchRegion::claim(area),
        Err(LogError::ScratchBusyErr)
    ));

    drop(first);
    let mut second = retaining(1);
    append_all(&mut second, 0..5);
    assert_eq!(indices(&mut second), [3, 4]);
}

#[test]
fn short_entries_are_not_copied() {
    let mut src = mount(LiveFlash::new(), 256);
    let mut dst = mount(ScratchFlash::new(), 256);
    let loc = src.append(5).unwrap();
    src.area_mut().write(loc.data_off, b"short").unwrap();
    src.append_finish(&loc).unwrap();

    assert_eq!(
        copy_entry(&mut src, &loc, &mut dst),
        Err(LogError::ShortEntryErr)
    );
    assert!(dst.is_empty().unwrap());
}

// Device writes per 30 byte record: length, data body, data tail, CRC.
// Clearing the log programs one sector header before the copy-back.

#[test]
#[serial]
fn failed_copy_back_keeps_complete_records() {
    let mut log = retaining(3);
    append_all(&mut log, 0..4);

    // header and record 1 make it, the length of record 2 does not
    log.fcb_mut()
        .area_mut()
        .flash_mut()
        .fail_writes_after(Some(5));
    assert_eq!(log.append(&record(4)), Err(LogError::RestoreErr));

    log.fcb_mut().area_mut().flash_mut().fail_writes_after(None);
    assert_eq!(indices(&mut log), [1]);
}

#[test]
#[serial]
fn torn_copy_back_record_is_skipped() {
    let mut log = retaining(3);
    append_all(&mut log, 0..4);

    // record 2 gets reserved but its data never lands
    log.fcb_mut()
        .area_mut()
        .flash_mut()
        .fail_writes_after(Some(6));
    assert_eq!(log.append(&record(4)), Err(LogError::RestoreErr));

    log.fcb_mut().area_mut().flash_mut().fail_writes_after(None);
    assert_eq!(indices(&mut log), [1]);

    append_all(&mut log, 6..7);
    assert_eq!(
        contents(&mut log),
        [record(1), record(6)]
    );
}

#[test]
#[serial]
fn scratch_is_claimed_once() {
    assert!(!scratch_claimed());
    let scratch = claim(ScratchFlash::new(), 256);
    assert!(scratch_claimed());

    let second = ScratchRegion::claim(FlashArea::new(ScratchFlash::new(), 0..256).unwrap());
    assert!(matches!(second, Err(LogError::ScratchBusyErr)));

    drop(scratch);
    assert!(!scratch_claimed());
    let _scratch = claim(ScratchFlash::new(), 256);
}

#[test]
#[serial]
fn scratch_must_be_one_sector() {
    let area = FlashArea::new(LiveFlash::new(), 0..256).unwrap();
    assert!(matches!(
        ScratchRegion::claim(area),
        Err(LogError::ScratchSizeErr)
    ));
    assert!(!scratch_claimed());
}

#[test]
#[serial]
fn retention_keeps_a_contiguous_suffix() {
    fn prop(total: u8, entries: u8) -> TestResult {
        let total = u32::from(total % 24);
        let entries = entries % 3 + 1;

        let mut log = retaining(entries);
        for index in 0..total {
            if log.append(&record(index)).is_err() {
                return TestResult::failed();
            }
        }
        let kept = indices(&mut log);
        let newest: Vec<u32> = (total - kept.len() as u32..total).collect();
        TestResult::from_bool(
            kept == newest && kept.len() as u32 >= total.min(u32::from(entries)),
        )
    }

    QuickCheck::new()
        .tests(64)
        .quickcheck(prop as fn(u8, u8) -> TestResult);
}
