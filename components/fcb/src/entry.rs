use crate::FCB_MAX_LEN;

pub(crate) const CRC_LEN: u32 = 4;

/// Handle to one stored entry.  Holds no payload, only where it lives.
///
/// Becomes stale once its sector is rotated away or the buffer is cleared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EntryLocator {
    /// Sector index inside the flash area.
    pub sector: u16,
    /// Offset of the entry (its length prefix) inside the sector.
    pub elem_off: u32,
    /// Offset of the entry data inside the flash area.
    pub data_off: u32,
    pub data_len: u16,
}

pub(crate) fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// Encodes `len` into `raw`, returns the number of bytes used.
pub(crate) fn put_len(len: u16, raw: &mut [u8; 2]) -> usize {
    debug_assert!(len <= FCB_MAX_LEN);
    if len < 0x80 {
        raw[0] = len as u8;
        1
    } else {
        raw[0] = (len as u8 & 0x7f) | 0x80;
        raw[1] = (len >> 7) as u8;
        2
    }
}

/// Decodes a length prefix, `None` if the slot is still erased.
pub(crate) fn get_len(raw: &[u8; 2]) -> Option<(u16, usize)> {
    if raw[0] & 0x80 != 0 {
        if raw[0] == 0xff && raw[1] == 0xff {
            return None;
        }
        Some(((raw[0] & 0x7f) as u16 | ((raw[1] as u16) << 7), 2))
    } else {
        Some((raw[0] as u16, 1))
    }
}

pub(crate) fn len_bytes(len: u16) -> u32 {
    if len < 0x80 {
        1
    } else {
        2
    }
}

/// Space an entry with `len` data bytes takes up in a sector.
pub(crate) fn footprint(len: u16, align: u32) -> u32 {
    align_up(len_bytes(len), align) + align_up(len as u32, align) + align_up(CRC_LEN, align)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix() {
        let mut raw = [0xff; 2];
        assert_eq!(put_len(0x7f, &mut raw), 1);
        assert_eq!(get_len(&raw), Some((0x7f, 1)));

        for len in [0x80, 0x1234, FCB_MAX_LEN] {
            let mut raw = [0xff; 2];
            assert_eq!(put_len(len, &mut raw), 2);
            assert_eq!(get_len(&raw), Some((len, 2)));
        }

        assert_eq!(get_len(&[0xff, 0xff]), None);
    }

    #[test]
    fn footprint_is_aligned() {
        assert_eq!(footprint(30, 4), 4 + 32 + 4);
        assert_eq!(footprint(30, 1), 1 + 30 + 4);
        assert_eq!(footprint(200, 8), 8 + 200 + 8);
    }
}
