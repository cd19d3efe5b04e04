use core::sync::atomic::{AtomicBool, Ordering};

use embedded_storage::nor_flash::NorFlash;
use fcb::{Fcb, FcbConfig};
use flash_map::FlashArea;

use crate::{LogError, Result, SCRATCH_MAGIC, SCRATCH_VERSION};

static CLAIMED: AtomicBool = AtomicBool::new(false);

/// Whether a `ScratchRegion` is currently claimed.
pub fn scratch_claimed() -> bool {
    CLAIMED.load(Ordering::Acquire)
}

const SCRATCH_CONFIG: FcbConfig = FcbConfig::new(SCRATCH_MAGIC, SCRATCH_VERSION);

/// The one-sector spare area records are parked in while the live buffer is
/// erased.
///
/// There is a single scratch region per process: while a `ScratchRegion`
/// exists, further claims fail with `ScratchBusyErr`.  Dropping it releases
/// the claim.
///
/// A retaining `FcbLog` holds its region for as long as it lives, not just
/// during an erase, so only one retaining log can exist at a time.
pub struct ScratchRegion<S> {
    fcb: Fcb<S>,
}

impl<S: NorFlash> ScratchRegion<S> {
    pub fn claim(area: FlashArea<S>) -> Result<Self> {
        if area.sector_count() != 1 {
            return Err(LogError::ScratchSizeErr);
        }
        if CLAIMED
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(LogError::ScratchBusyErr);
        }
        match Fcb::new(area, SCRATCH_CONFIG) {
            Ok(fcb) => Ok(Self { fcb }),
            Err(err) => {
                CLAIMED.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    /// Empties the scratch buffer for a new round of copies.
    pub fn prepare(&mut self) -> Result<&mut Fcb<S>> {
        self.fcb.clear()?;
        Ok(&mut self.fcb)
    }

    pub fn fcb(&mut self) -> &mut Fcb<S> {
        &mut self.fcb
    }
}

impl<S> Drop for ScratchRegion<S> {
    fn drop(&mut self) {
        CLAIMED.store(false, Ordering::Release);
    }
}
