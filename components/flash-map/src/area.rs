use core::ops::Range;

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

use crate::{AreaId, FlashMap};

/// Value of an erased byte on NOR flash.
pub const ERASED_BYTE: u8 = 0xff;

/// Largest device write (and read) granularity a `FlashArea` can bounce.
pub const MAX_WRITE_SIZE: usize = 32;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlashAreaError {
    OutOfBounds,
    NotAligned,
    Device(NorFlashErrorKind),
}

fn device<E: NorFlashError>(error: E) -> FlashAreaError {
    FlashAreaError::Device(error.kind())
}

pub struct FlashArea<F> {
    flash: F,
    off: u32,
    len: u32,
}

impl<F: NorFlash> FlashArea<F> {
    /// `region` is given in device offsets and has to start and end on an
    /// erase boundary.
    pub fn new(flash: F, region: Range<u32>) -> Result<Self, FlashAreaError> {
        if region.start > region.end || region.end as usize > flash.capacity() {
            return Err(FlashAreaError::OutOfBounds);
        }
        let erase = Self::sector_size();
        if region.start % erase != 0 || region.end % erase != 0 {
            return Err(FlashAreaError::NotAligned);
        }
        if F::WRITE_SIZE > MAX_WRITE_SIZE || F::READ_SIZE > MAX_WRITE_SIZE {
            return Err(FlashAreaError::NotAligned);
        }
        Ok(Self {
            flash,
            off: region.start,
            len: region.end - region.start,
        })
    }

    pub fn open(flash: F, map: &FlashMap, id: AreaId) -> Result<Self, FlashAreaError> {
        Self::new(flash, map.area(id))
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn sector_size() -> u32 {
        F::ERASE_SIZE as u32
    }

    pub fn sector_count(&self) -> u32 {
        self.len / Self::sector_size()
    }

    pub const fn align() -> u32 {
        F::WRITE_SIZE as u32
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    fn check_range(&self, off: u32, len: usize) -> Result<u32, FlashAreaError> {
        let end = (off as usize)
            .checked_add(len)
            .ok_or(FlashAreaError::OutOfBounds)?;
        if end > self.len as usize {
            return Err(FlashAreaError::OutOfBounds);
        }
        Ok(self.off + off)
    }

    /// Reads `buf.len()` bytes at `off`.  Offsets and lengths that do not
    /// match the device read size go through a bounce buffer.
    pub fn read(&mut self, off: u32, buf: &mut [u8]) -> Result<(), FlashAreaError> {
        let mut addr = self.check_range(off, buf.len())?;
        let read_size = F::READ_SIZE;
        let mut done = 0;
        while done < buf.len() {
            let skip = addr as usize % read_size;
            let remaining = buf.len() - done;
            if skip == 0 && remaining >= read_size {
                let n = remaining - remaining % read_size;
                self.flash
                    .read(addr, &mut buf[done..done + n])
                    .map_err(device)?;
                done += n;
                addr += n as u32;
            } else {
                let mut bounce = [0u8; MAX_WRITE_SIZE];
                let bounce = &mut bounce[..read_size];
                self.flash
                    .read(addr - skip as u32, bounce)
                    .map_err(device)?;
                let n = core::cmp::min(read_size - skip, remaining);
                buf[done..done + n].copy_from_slice(&bounce[skip..skip + n]);
                done += n;
                addr += n as u32;
            }
        }
        Ok(())
    }

    /// Writes `data` at a write-aligned `off`.  A trailing partial word is
    /// padded with `ERASED_BYTE`, so the bytes after `data` up to the next
    /// word boundary stay programmable as erased.
    pub fn write(&mut self, off: u32, data: &[u8]) -> Result<(), FlashAreaError> {
        let write_size = F::WRITE_SIZE;
        if off as usize % write_size != 0 {
            return Err(FlashAreaError::NotAligned);
        }
        let padded = data.len().div_ceil(write_size) * write_size;
        let addr = self.check_range(off, padded)?;

        let body = data.len() - data.len() % write_size;
        if body > 0 {
            self.flash.write(addr, &data[..body]).map_err(device)?;
        }
        let tail = &data[body..];
        if !tail.is_empty() {
            let mut word = [ERASED_BYTE; MAX_WRITE_SIZE];
            word[..tail.len()].copy_from_slice(tail);
            self.flash
                .write(addr + body as u32, &word[..write_size])
                .map_err(device)?;
        }
        Ok(())
    }

    pub fn erase(&mut self, off: u32, len: u32) -> Result<(), FlashAreaError> {
        let erase = Self::sector_size();
        if off % erase != 0 || len % erase != 0 {
            return Err(FlashAreaError::NotAligned);
        }
        let addr = self.check_range(off, len as usize)?;
        self.flash.erase(addr, addr + len).map_err(device)
    }
}
