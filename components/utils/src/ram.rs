use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

const ERASED: u8 = 0xff;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RamFlashError {
    NotAligned,
    OutOfBounds,
    NotErased,
    Injected,
}

impl NorFlashError for RamFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::NotAligned => NorFlashErrorKind::NotAligned,
            Self::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            Self::NotErased | Self::Injected => NorFlashErrorKind::Other,
        }
    }
}

/// NOR flash simulated in RAM.
///
/// Words can only be programmed once between erases, like on real parts.
/// Writes and reads can be made to fail on demand.
pub struct RamFlash<const SIZE: usize, const ERASE: usize, const WRITE: usize = 4> {
    buf: [u8; SIZE],
    writes_left: Option<usize>,
    fail_reads: bool,
    writes: usize,
    erases: usize,
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> RamFlash<SIZE, ERASE, WRITE> {
    pub const fn new() -> Self {
        assert!(SIZE % ERASE == 0);
        assert!(ERASE % WRITE == 0);
        Self {
            buf: [ERASED; SIZE],
            writes_left: None,
            fail_reads: false,
            writes: 0,
            erases: 0,
        }
    }

    /// Let `count` more writes succeed, then fail every write.  `None`
    /// disables the fault.
    pub fn fail_writes_after(&mut self, count: Option<usize>) {
        self.writes_left = count;
    }

    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn erases(&self) -> usize {
        self.erases
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn check(offset: u32, len: usize, align: usize) -> Result<usize, RamFlashError> {
        let start = offset as usize;
        if start % align != 0 || len % align != 0 {
            return Err(RamFlashError::NotAligned);
        }
        if start + len > SIZE {
            return Err(RamFlashError::OutOfBounds);
        }
        Ok(start)
    }
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> Default
    for RamFlash<SIZE, ERASE, WRITE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> ErrorType
    for RamFlash<SIZE, ERASE, WRITE>
{
    type Error = RamFlashError;
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> ReadNorFlash
    for RamFlash<SIZE, ERASE, WRITE>
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = Self::check(offset, bytes.len(), Self::READ_SIZE)?;
        if self.fail_reads {
            trace!("ram flash: failing read at {:#x}", offset);
            return Err(RamFlashError::Injected);
        }
        bytes.copy_from_slice(&self.buf[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> NorFlash
    for RamFlash<SIZE, ERASE, WRITE>
{
    const WRITE_SIZE: usize = WRITE;
    const ERASE_SIZE: usize = ERASE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from > to {
            return Err(RamFlashError::OutOfBounds);
        }
        let start = Self::check(from, (to - from) as usize, ERASE)?;
        self.buf[start..to as usize].fill(ERASED);
        self.erases += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = Self::check(offset, bytes.len(), WRITE)?;
        if let Some(left) = self.writes_left.as_mut() {
            if *left == 0 {
                trace!("ram flash: failing write at {:#x}", offset);
                return Err(RamFlashError::Injected);
            }
            *left -= 1;
        }
        let target = &mut self.buf[start..start + bytes.len()];
        if target.chunks(WRITE).any(|word| word.iter().any(|b| *b != ERASED)) {
            return Err(RamFlashError::NotErased);
        }
        target.copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }
}
