use std::{
    fs::{File, OpenOptions},
    io::{self, Read as _, Seek as _, SeekFrom, Write as _},
    path::{Path, PathBuf},
};

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use log::{error, info};

// Modelled after the internal flash of the target: 4 KiB sectors, word writes
pub const FLASH_SIZE: usize = 0x5_000;
pub const SECTOR_SIZE: usize = 0x1_000;
pub const WORD_SIZE: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileFlashError {
    NotAligned,
    OutOfBounds,
    Io,
}

impl NorFlashError for FileFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::NotAligned => NorFlashErrorKind::NotAligned,
            Self::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            Self::Io => NorFlashErrorKind::Other,
        }
    }
}

fn io<T>(result: io::Result<T>) -> Result<T, FileFlashError> {
    result.map_err(|err| {
        error!("flash file access failed: {err}");
        FileFlashError::Io
    })
}

/// NOR flash image kept in a file, so the log survives between runs.
#[derive(Clone, Debug)]
pub struct FileFlash {
    path: PathBuf,
}

impl FileFlash {
    pub fn new(path: &Path) -> io::Result<Self> {
        let len = FLASH_SIZE as u64;
        if let Ok(file) = File::open(path) {
            let found = file.metadata()?.len();
            if found != len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("flash file has {found} bytes, expected {len}"),
                ));
            }
            info!("using existing flash file: {path:?}");
        } else {
            let mut file = File::create(path)?;
            file.write_all(&[0xff; FLASH_SIZE])?;
            info!("created new flash file: {path:?}");
        }
        Ok(Self { path: path.into() })
    }

    fn check(offset: u32, len: usize, align: usize) -> Result<u64, FileFlashError> {
        let start = offset as usize;
        if start % align != 0 || len % align != 0 {
            return Err(FileFlashError::NotAligned);
        }
        if start + len > FLASH_SIZE {
            return Err(FileFlashError::OutOfBounds);
        }
        Ok(start as u64)
    }

    fn read_at(&self, start: u64, buf: &mut [u8]) -> Result<(), FileFlashError> {
        let mut file = io(File::open(&self.path))?;
        io(file.seek(SeekFrom::Start(start)))?;
        io(file.read_exact(buf))
    }

    fn write_at(&self, start: u64, data: &[u8]) -> Result<(), FileFlashError> {
        let mut file = io(OpenOptions::new().write(true).open(&self.path))?;
        io(file.seek(SeekFrom::Start(start)))?;
        io(file.write_all(data))?;
        io(file.flush())
    }
}

impl ErrorType for FileFlash {
    type Error = FileFlashError;
}

impl ReadNorFlash for FileFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = Self::check(offset, bytes.len(), Self::READ_SIZE)?;
        self.read_at(start, bytes)
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE
    }
}

impl NorFlash for FileFlash {
    const WRITE_SIZE: usize = WORD_SIZE;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from > to {
            return Err(FileFlashError::OutOfBounds);
        }
        let start = Self::check(from, (to - from) as usize, SECTOR_SIZE)?;
        self.write_at(start, &vec![0xff; (to - from) as usize])
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = Self::check(offset, bytes.len(), WORD_SIZE)?;
        // programming only clears bits
        let mut cells = vec![0u8; bytes.len()];
        self.read_at(start, &mut cells)?;
        for (cell, byte) in cells.iter_mut().zip(bytes) {
            *cell &= byte;
        }
        self.write_at(start, &cells)
    }
}
