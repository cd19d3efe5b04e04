mod flash;

use std::{
    ops::ControlFlow,
    path::PathBuf,
    process::ExitCode,
    time::{SystemTime, UNIX_EPOCH},
};

use clap::Parser;
use embedded_storage::nor_flash::NorFlash;
use fcb::{Fcb, FcbConfig, FcbError};
use flash_map::{AreaId, FlashArea, FlashAreaError, FlashMap};
use log::{debug, error, info};
use log_fcb::{
    FcbLog, LogEntryHdr, LogError, LogHandler, ReadEntry, ScratchRegion, LOG_ENTRY_HDR_SIZE,
    LOG_MAX_RECORD_LEN, LOG_PRINTF_MAX_ENTRY_LEN,
};
use utils::RamFlash;

use flash::{FileFlash, FLASH_SIZE, SECTOR_SIZE, WORD_SIZE};

const LOG_CONFIG: FcbConfig = FcbConfig::new(0x4c4f_4721, 1);

type RamSim = RamFlash<FLASH_SIZE, SECTOR_SIZE, WORD_SIZE>;

/// Host simulation of the flash-backed circular log.
#[derive(Parser, Debug)]
#[clap(about, author, version)]
struct Args {
    /// Flash image file (default: use RAM).
    #[clap(short, long)]
    flash: Option<PathBuf>,

    /// Records to keep when the log is erased to make room.
    ///
    /// With 0 the oldest sector is rotated away instead.
    #[clap(short, long, default_value_t = 0)]
    retain: u8,

    /// Number of records to append.
    #[clap(short, long, default_value_t = 16)]
    count: u32,

    /// Module id put into the record headers.
    #[clap(short, long, default_value_t = 0)]
    module: u8,

    /// Erase the log before appending.
    #[clap(long)]
    flush: bool,
}

#[derive(Debug)]
enum SimError {
    Io(std::io::Error),
    Flash(FlashAreaError),
    Fcb(FcbError),
    Log(LogError),
}

impl From<std::io::Error> for SimError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<FlashAreaError> for SimError {
    fn from(error: FlashAreaError) -> Self {
        Self::Flash(error)
    }
}

impl From<FcbError> for SimError {
    fn from(error: FcbError) -> Self {
        Self::Fcb(error)
    }
}

impl From<LogError> for SimError {
    fn from(error: LogError) -> Self {
        Self::Log(error)
    }
}

fn timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_micros() as i64)
}

fn last_index<L: LogHandler>(log: &mut L) -> Result<Option<u32>, SimError> {
    let mut last = None;
    let _: Option<()> = log.walk(|reader, loc, _| {
        let mut raw = [0u8; LOG_ENTRY_HDR_SIZE];
        let n = reader.read_entry(loc, 0, &mut raw);
        if let Some(hdr) = LogEntryHdr::decode(&raw[..n]) {
            last = Some(hdr.index);
        }
        ControlFlow::Continue(())
    })?;
    Ok(last)
}

fn dump<L: LogHandler>(log: &mut L) -> Result<(), SimError> {
    let mut total = 0;
    let _: Option<()> = log.walk(|reader, loc, len| {
        total += 1;
        let mut raw = [0u8; LOG_MAX_RECORD_LEN];
        let n = reader.read_entry(loc, 0, &mut raw);
        match LogEntryHdr::decode(&raw[..n]) {
            Some(hdr) => println!(
                "{:>8} {:>18} m{:<3} l{} {}",
                hdr.index,
                hdr.ts,
                hdr.module,
                hdr.level,
                String::from_utf8_lossy(&raw[LOG_ENTRY_HDR_SIZE..n])
            ),
            None => println!("<{len} byte entry>"),
        }
        ControlFlow::Continue(())
    })?;
    info!("{total} records in log");
    Ok(())
}

fn simulate<L: LogHandler>(log: &mut L, args: &Args) -> Result<(), SimError> {
    if args.flush {
        info!("flushing log");
        log.flush()?;
    }

    let next = last_index(log)?.map_or(0, |index| index.wrapping_add(1));
    info!("appending {} records from index {}", args.count, next);
    for index in (0..args.count).map(|n| next.wrapping_add(n)) {
        let hdr = LogEntryHdr {
            ts: timestamp(),
            index,
            module: args.module,
            level: (index % 4) as u8,
        };
        let mut message = format!("simulated record {index}").into_bytes();
        message.truncate(LOG_PRINTF_MAX_ENTRY_LEN);

        let mut record = hdr.encode().to_vec();
        record.extend_from_slice(&message);
        log.append(&record)?;
        debug!("appended record {index}");
    }

    dump(log)
}

fn run<F: NorFlash, S: NorFlash>(log_flash: F, scratch_flash: S, args: &Args) -> Result<(), SimError> {
    let map = FlashMap::SIM;
    let fcb = Fcb::new(FlashArea::open(log_flash, &map, AreaId::Log)?, LOG_CONFIG)?;
    info!("log mounted on {} sectors", fcb.sector_count());

    if args.retain > 0 {
        let area = FlashArea::open(scratch_flash, &map, AreaId::ImageScratch)?;
        let scratch = ScratchRegion::claim(area)?;
        simulate(&mut FcbLog::with_retention(fcb, args.retain, scratch), args)
    } else {
        simulate(&mut FcbLog::new(fcb), args)
    }
}

fn exec(args: &Args) -> Result<(), SimError> {
    match &args.flash {
        Some(path) => {
            let flash = FileFlash::new(path)?;
            // both areas live in the same image
            run(flash.clone(), flash, args)
        }
        None => run(RamSim::new(), RamSim::new(), args),
    }
}

fn main() -> ExitCode {
    pretty_env_logger::init();

    let args = Args::parse();
    match exec(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("simulation failed: {err:?}");
            ExitCode::FAILURE
        }
    }
}
