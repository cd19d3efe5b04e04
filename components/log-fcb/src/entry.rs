pub const LOG_ENTRY_HDR_SIZE: usize = 14;

/// Header the logging front end puts in front of every record.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LogEntryHdr {
    pub ts: i64,
    pub index: u32,
    pub module: u8,
    pub level: u8,
}

impl LogEntryHdr {
    pub fn encode(&self) -> [u8; LOG_ENTRY_HDR_SIZE] {
        let mut raw = [0u8; LOG_ENTRY_HDR_SIZE];
        raw[..8].copy_from_slice(&self.ts.to_le_bytes());
        raw[8..12].copy_from_slice(&self.index.to_le_bytes());
        raw[12] = self.module;
        raw[13] = self.level;
        raw
    }

    /// `None` if `raw` is too short to hold a header.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        let raw = raw.get(..LOG_ENTRY_HDR_SIZE)?;
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&raw[..8]);
        let mut index = [0u8; 4];
        index.copy_from_slice(&raw[8..12]);
        Some(Self {
            ts: i64::from_le_bytes(ts),
            index: u32::from_le_bytes(index),
            module: raw[12],
            level: raw[13],
        })
    }
}
