use serde::{Deserialize, Serialize};

use flash_map::ERASED_BYTE;

use crate::{FcbConfig, FcbError, Result};

/// Bytes reserved for the serialized header at the start of every sector.
pub(crate) const SECTOR_HDR_LEN: usize = 16;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SectorHeader {
    pub magic: u32,
    pub version: u8,
    pub id: u16,
}

impl SectorHeader {
    pub(crate) fn new(config: &FcbConfig, id: u16) -> Self {
        Self {
            magic: config.magic,
            version: config.version,
            id,
        }
    }

    pub(crate) fn encode(&self) -> Result<[u8; SECTOR_HDR_LEN]> {
        let mut raw = [ERASED_BYTE; SECTOR_HDR_LEN];
        postcard::to_slice(self, &mut raw).map_err(|_| FcbError::Encoding)?;
        Ok(raw)
    }

    /// `Ok(None)` for an erased or foreign sector.
    pub(crate) fn decode(raw: &[u8; SECTOR_HDR_LEN], config: &FcbConfig) -> Result<Option<Self>> {
        let header: Self = match postcard::from_bytes(raw) {
            Ok(header) => header,
            Err(_) => return Ok(None),
        };
        if header.magic != config.magic {
            return Ok(None);
        }
        if header.version != config.version {
            return Err(FcbError::Version);
        }
        Ok(Some(header))
    }
}

/// `a` was assigned after `b`, taking wraparound of the id into account.
pub(crate) fn id_after(a: u16, b: u16) -> bool {
    (a.wrapping_sub(b) as i16) > 0
}
