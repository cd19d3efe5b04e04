use core::ops::ControlFlow;

use crate::{LogError, Result};

/// Byte access to stored entries, handed to `LogHandler::walk` callbacks.
pub trait ReadEntry<L> {
    /// Reads at most `buf.len()` bytes of the entry at `loc`, starting
    /// `offset` bytes into it, and returns how many were read.
    ///
    /// Reads never extend past the entry.  A failing read returns 0, which
    /// callers cannot tell apart from reading at the end of the entry.
    fn read_entry(&mut self, loc: &L, offset: u16, buf: &mut [u8]) -> usize;
}

/// Storage side of a log, as seen by the logging front end.
pub trait LogHandler {
    type Locator;
    type Reader: ReadEntry<Self::Locator>;

    fn reader(&mut self) -> &mut Self::Reader;

    fn read(&mut self, loc: &Self::Locator, offset: u16, buf: &mut [u8]) -> usize {
        self.reader().read_entry(loc, offset, buf)
    }

    /// Stores `data` as one entry, making room if the log is full.
    fn append(&mut self, data: &[u8]) -> Result<Self::Locator>;

    /// Calls `walker` for every entry, oldest first, with the entry length.
    ///
    /// Returns the status of the first `Break`, `None` if every entry was
    /// visited.
    fn walk<B, W>(&mut self, walker: W) -> Result<Option<B>>
    where
        W: FnMut(&mut Self::Reader, &Self::Locator, u16) -> ControlFlow<B>;

    /// Drops every entry.
    fn flush(&mut self) -> Result<()>;

    /// Erases the log keeping the newest entries.  Logs that have nowhere to
    /// keep them only support plain rotation.
    fn preserve_and_erase(&mut self) -> Result<()> {
        Err(LogError::NoScratchErr)
    }
}
