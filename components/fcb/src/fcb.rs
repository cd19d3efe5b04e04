use crc32fast::Hasher;
use embedded_storage::nor_flash::NorFlash;
use flash_map::FlashArea;

use crate::entry::{align_up, footprint, get_len, put_len, CRC_LEN};
use crate::sector::{id_after, SectorHeader, SECTOR_HDR_LEN};
use crate::{EntryLocator, FcbConfig, FcbError, Result, FCB_MAX_LEN};

#[derive(Clone, Copy, Debug)]
struct Active {
    sector: u16,
    id: u16,
    /// Where the next entry of the active sector goes.
    next_off: u32,
}

enum Slot {
    Entry(EntryLocator),
    End,
}

pub struct Fcb<F> {
    area: FlashArea<F>,
    config: FcbConfig,
    sector_count: u16,
    oldest: u16,
    active: Active,
}

impl<F: NorFlash> Fcb<F> {
    /// Mounts the buffer found in `area`, or formats the first sector if
    /// there is none.
    pub fn new(area: FlashArea<F>, config: FcbConfig) -> Result<Self> {
        let sector_count =
            u16::try_from(area.sector_count()).map_err(|_| FcbError::InvalidArg)?;
        if sector_count == 0 || u16::from(config.scratch_cnt) >= sector_count {
            return Err(FcbError::InvalidArg);
        }
        let mut fcb = Self {
            area,
            config,
            sector_count,
            oldest: 0,
            active: Active {
                sector: 0,
                id: 0,
                next_off: 0,
            },
        };
        fcb.mount()?;
        Ok(fcb)
    }

    pub fn config(&self) -> &FcbConfig {
        &self.config
    }

    pub fn sector_count(&self) -> u16 {
        self.sector_count
    }

    pub fn area(&self) -> &FlashArea<F> {
        &self.area
    }

    pub fn area_mut(&mut self) -> &mut FlashArea<F> {
        &mut self.area
    }

    pub fn into_area(self) -> FlashArea<F> {
        self.area
    }

    fn align(&self) -> u32 {
        FlashArea::<F>::align()
    }

    fn sector_size(&self) -> u32 {
        FlashArea::<F>::sector_size()
    }

    fn sector_base(&self, sector: u16) -> u32 {
        u32::from(sector) * self.sector_size()
    }

    fn first_off(&self) -> u32 {
        align_up(SECTOR_HDR_LEN as u32, self.align())
    }

    fn next_sector(&self, sector: u16) -> u16 {
        (sector + 1) % self.sector_count
    }

    fn mount(&mut self) -> Result<()> {
        let mut newest: Option<SectorHeader> = None;
        let mut newest_sector = 0;
        let mut oldest: Option<SectorHeader> = None;
        let mut oldest_sector = 0;

        for sector in 0..self.sector_count {
            let Some(header) = self.read_header(sector)? else {
                continue;
            };
            if newest.map_or(true, |n| id_after(header.id, n.id)) {
                newest = Some(header);
                newest_sector = sector;
            }
            if oldest.map_or(true, |o| id_after(o.id, header.id)) {
                oldest = Some(header);
                oldest_sector = sector;
            }
        }

        match newest {
            Some(header) => {
                self.oldest = oldest_sector;
                self.active = Active {
                    sector: newest_sector,
                    id: header.id,
                    next_off: self.first_off(),
                };
                self.active.next_off = self.scan_end(newest_sector)?;
                trace!(
                    "fcb: mounted, oldest {} active {} (id {}) at {:#x}",
                    self.oldest,
                    self.active.sector,
                    self.active.id,
                    self.active.next_off
                );
            }
            None => {
                info!("fcb: no valid sector, formatting");
                self.format_sector(0, 0)?;
                self.oldest = 0;
                self.active = Active {
                    sector: 0,
                    id: 0,
                    next_off: self.first_off(),
                };
            }
        }
        Ok(())
    }

    fn read_header(&mut self, sector: u16) -> Result<Option<SectorHeader>> {
        let mut raw = [0u8; SECTOR_HDR_LEN];
        self.area.read(self.sector_base(sector), &mut raw)?;
        SectorHeader::decode(&raw, &self.config)
    }

    fn format_sector(&mut self, sector: u16, id: u16) -> Result<()> {
        let base = self.sector_base(sector);
        self.area.erase(base, self.sector_size())?;
        let raw = SectorHeader::new(&self.config, id).encode()?;
        self.area.write(base, &raw)?;
        Ok(())
    }

    /// Offset of the first unused slot in `sector`.
    fn scan_end(&mut self, sector: u16) -> Result<u32> {
        let mut off = self.first_off();
        while let Some((len, _)) = self.read_len(sector, off)? {
            let next = off + footprint(len, self.align());
            if next > self.sector_size() {
                break;
            }
            off = next;
        }
        Ok(off)
    }

    fn read_len(&mut self, sector: u16, off: u32) -> Result<Option<(u16, usize)>> {
        let min = footprint(0, self.align());
        if off + min > self.sector_size() {
            return Ok(None);
        }
        let mut raw = [0u8; 2];
        self.area.read(self.sector_base(sector) + off, &mut raw)?;
        Ok(get_len(&raw))
    }

    /// Sector the active one moves to once it is full, `None` if that would
    /// run into the oldest sector or the kept-free sectors behind it.
    fn next_free_sector(&self) -> Option<u16> {
        let mut sector = self.active.sector;
        let mut free = None;
        for _ in 0..=self.config.scratch_cnt {
            sector = self.next_sector(sector);
            if sector == self.oldest {
                return None;
            }
            free.get_or_insert(sector);
        }
        free
    }

    /// Reserves space for an entry of `len` bytes and programs its length.
    ///
    /// The data is written by the caller at `data_off` of the returned
    /// locator, the entry only becomes visible after `append_finish`.
    pub fn append(&mut self, len: u16) -> Result<EntryLocator> {
        if len > FCB_MAX_LEN {
            return Err(FcbError::InvalidArg);
        }
        let need = footprint(len, self.align());
        if self.first_off() + need > self.sector_size() {
            return Err(FcbError::TooLarge);
        }

        if self.active.next_off + need > self.sector_size() {
            let sector = self.next_free_sector().ok_or(FcbError::NoSpace)?;
            let id = self.active.id.wrapping_add(1);
            self.format_sector(sector, id)?;
            trace!("fcb: sector {} active (id {})", sector, id);
            self.active = Active {
                sector,
                id,
                next_off: self.first_off(),
            };
        }

        let mut raw = [0u8; 2];
        let n = put_len(len, &mut raw);
        let elem_off = self.active.next_off;
        self.area
            .write(self.sector_base(self.active.sector) + elem_off, &raw[..n])?;
        self.active.next_off += need;

        Ok(EntryLocator {
            sector: self.active.sector,
            elem_off,
            data_off: self.sector_base(self.active.sector)
                + elem_off
                + align_up(n as u32, self.align()),
            data_len: len,
        })
    }

    /// Commits an entry reserved by `append` once its data is in place.
    pub fn append_finish(&mut self, loc: &EntryLocator) -> Result<()> {
        let crc = self.entry_crc(loc)?;
        let crc_off = loc.data_off + align_up(u32::from(loc.data_len), self.align());
        self.area.write(crc_off, &crc.to_le_bytes())?;
        Ok(())
    }

    fn entry_crc(&mut self, loc: &EntryLocator) -> Result<u32> {
        let mut hasher = Hasher::new();
        let mut raw = [0u8; 2];
        let n = put_len(loc.data_len, &mut raw);
        hasher.update(&raw[..n]);

        let mut chunk = [0u8; 32];
        let mut done = 0;
        let len = usize::from(loc.data_len);
        while done < len {
            let n = core::cmp::min(chunk.len(), len - done);
            self.area
                .read(loc.data_off + done as u32, &mut chunk[..n])?;
            hasher.update(&chunk[..n]);
            done += n;
        }
        Ok(hasher.finalize())
    }

    fn crc_matches(&mut self, loc: &EntryLocator) -> Result<bool> {
        let mut stored = [0u8; CRC_LEN as usize];
        let crc_off = loc.data_off + align_up(u32::from(loc.data_len), self.align());
        self.area.read(crc_off, &mut stored)?;
        Ok(u32::from_le_bytes(stored) == self.entry_crc(loc)?)
    }

    fn slot_at(&mut self, sector: u16, elem_off: u32) -> Result<Slot> {
        if sector == self.active.sector && elem_off >= self.active.next_off {
            return Ok(Slot::End);
        }
        let Some((len, n)) = self.read_len(sector, elem_off)? else {
            return Ok(Slot::End);
        };
        if elem_off + footprint(len, self.align()) > self.sector_size() {
            return Ok(Slot::End);
        }
        let base = self.sector_base(sector);
        Ok(Slot::Entry(EntryLocator {
            sector,
            elem_off,
            data_off: base + elem_off + align_up(n as u32, self.align()),
            data_len: len,
        }))
    }

    /// Entry following `cursor`, or the oldest entry for `None`.
    ///
    /// Entries that were never finished or fail their CRC are skipped.
    pub fn get_next(&mut self, cursor: Option<&EntryLocator>) -> Result<Option<EntryLocator>> {
        let (mut sector, mut off) = match cursor {
            Some(loc) => (loc.sector, loc.elem_off + footprint(loc.data_len, self.align())),
            None => (self.oldest, self.first_off()),
        };
        loop {
            match self.slot_at(sector, off)? {
                Slot::Entry(loc) => {
                    if self.crc_matches(&loc)? {
                        return Ok(Some(loc));
                    }
                    trace!("fcb: skipping entry at {}:{:#x}", sector, off);
                    off += footprint(loc.data_len, self.align());
                }
                Slot::End => {
                    if sector == self.active.sector {
                        return Ok(None);
                    }
                    sector = self.next_sector(sector);
                    off = self.first_off();
                }
            }
        }
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.get_next(None)?.is_none())
    }

    /// Erases the oldest sector, dropping every entry in it.
    pub fn rotate(&mut self) -> Result<()> {
        let oldest = self.oldest;
        self.area
            .erase(self.sector_base(oldest), self.sector_size())?;
        if oldest == self.active.sector {
            let sector = self.next_sector(oldest);
            let id = self.active.id.wrapping_add(1);
            self.format_sector(sector, id)?;
            self.active = Active {
                sector,
                id,
                next_off: self.first_off(),
            };
        }
        self.oldest = self.next_sector(oldest);
        trace!("fcb: rotated, oldest now {}", self.oldest);
        Ok(())
    }

    /// Erases every sector and starts over with an empty buffer.
    pub fn clear(&mut self) -> Result<()> {
        // sector 0 is erased by the format
        for sector in 1..self.sector_count {
            self.area
                .erase(self.sector_base(sector), self.sector_size())?;
        }
        self.format_sector(0, 0)?;
        self.oldest = 0;
        self.active = Active {
            sector: 0,
            id: 0,
            next_off: self.first_off(),
        };
        Ok(())
    }

    /// First entry of the newest `n`, or the oldest entry if there are
    /// fewer.  `None` for an empty buffer.
    pub fn offset_last_n(&mut self, n: u8) -> Result<Option<EntryLocator>> {
        if n == 0 {
            return Err(FcbError::InvalidArg);
        }
        let mut start: Option<EntryLocator> = None;
        let mut cursor: Option<EntryLocator> = None;
        let mut seen: u32 = 0;
        while let Some(loc) = self.get_next(cursor.as_ref())? {
            if start.is_none() {
                start = Some(loc);
            } else if seen >= u32::from(n) {
                start = self.get_next(start.as_ref())?;
            }
            seen += 1;
            cursor = Some(loc);
        }
        Ok(start)
    }
}
