//! Single-sector write-back cache shared by the FAT accessor and the
//! directory/data-sector routines built on top of it.

use esfat_ds::BlockDevice;

use crate::{Volume, SECTOR_SIZE};

pub(crate) struct SectorCache {
    sector: Option<u64>,
    dirty: bool,
    buf: [u8; SECTOR_SIZE],
}

impl SectorCache {
    pub(crate) fn new() -> Self {
        Self {
            sector: None,
            dirty: false,
            buf: [0; SECTOR_SIZE],
        }
    }
}

impl<DS: BlockDevice> Volume<DS> {
    /// Ensures `sector` is the cached sector, flushing a dirty prior
    /// occupant first. A hit is a no-op.
    pub(crate) fn cache_ensure(&self, sector: u64) {
        let mut cache = self.cache.borrow_mut();
        if cache.sector == Some(sector) {
            log::trace!("cache hit sector {sector}");
            return;
        }
        if cache.dirty {
            if let Some(old) = cache.sector {
                log::debug!("cache evict dirty sector {old} for {sector}");
                let n = self.bytes_per_sector();
                self.device.write(old * n as u64, &cache.buf[..n]);
            }
            cache.dirty = false;
        } else {
            log::trace!("cache miss sector {sector}");
        }
        let n = self.bytes_per_sector();
        self.device.read(sector * n as u64, &mut cache.buf[..n]);
        cache.sector = Some(sector);
    }

    /// Flushes the cache if dirty.
    pub(crate) fn cache_flush(&self) {
        let mut cache = self.cache.borrow_mut();
        if cache.dirty {
            if let Some(sector) = cache.sector {
                log::debug!("cache flush sector {sector}");
                let n = self.bytes_per_sector();
                self.device.write(sector * n as u64, &cache.buf[..n]);
            }
            cache.dirty = false;
        }
    }

    /// Declares that the cache buffer now represents `sector` with pending
    /// writes, without touching the device.
    fn cache_mark_dirty(&self, sector: u64) {
        let mut cache = self.cache.borrow_mut();
        cache.sector = Some(sector);
        cache.dirty = true;
    }

    pub(crate) fn cache_read_bytes(&self, sector: u64, offset: usize, out: &mut [u8]) {
        self.cache_ensure(sector);
        let cache = self.cache.borrow();
        out.copy_from_slice(&cache.buf[offset..offset + out.len()]);
    }

    pub(crate) fn cache_write_bytes(&self, sector: u64, offset: usize, data: &[u8]) {
        self.cache_ensure(sector);
        {
            let mut cache = self.cache.borrow_mut();
            cache.buf[offset..offset + data.len()].copy_from_slice(data);
        }
        self.cache_mark_dirty(sector);
    }

    /// Zeroes the cache buffer and declares it dirty as `sector`, without
    /// first reading the old contents. Used when a freshly-allocated
    /// directory cluster's sectors need to start life empty.
    ///
    /// Flushes first if the cache currently holds a dirty sector other than
    /// `sector`: this is the only write path that replaces the buffer's
    /// contents outright rather than reading-then-patching it, so it must
    /// not silently drop a pending write to a different sector (e.g. the
    /// FAT entry linking this very cluster into its chain).
    pub(crate) fn cache_zero_and_mark_dirty(&self, sector: u64) {
        {
            let cache = self.cache.borrow();
            if cache.dirty && cache.sector != Some(sector) {
                drop(cache);
                self.cache_flush();
            }
        }
        {
            let mut cache = self.cache.borrow_mut();
            let n = self.bytes_per_sector();
            cache.buf[..n].fill(0);
        }
        self.cache_mark_dirty(sector);
    }

    /// Reads file content straight from the block device, bypassing the
    /// sector cache entirely. File data sectors are never shared with the
    /// FAT or directory regions the cache serves, and per-byte file I/O
    /// would otherwise thrash the single cache slot on every access.
    pub(crate) fn content_read(&self, sector: u64, offset: usize, out: &mut [u8]) {
        let byte_offset = sector * self.bytes_per_sector() as u64 + offset as u64;
        self.device.read(byte_offset, out);
    }

    /// Writes file content straight to the block device, bypassing the
    /// sector cache. See [`Volume::content_read`].
    pub(crate) fn content_write(&self, sector: u64, offset: usize, data: &[u8]) {
        let byte_offset = sector * self.bytes_per_sector() as u64 + offset as u64;
        self.device.write(byte_offset, data);
    }

    pub(crate) fn read_u16(&self, sector: u64, offset: usize) -> u16 {
        let mut buf = [0u8; 2];
        self.cache_read_bytes(sector, offset, &mut buf);
        u16::from_le_bytes(buf)
    }

    pub(crate) fn read_u32(&self, sector: u64, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        self.cache_read_bytes(sector, offset, &mut buf);
        u32::from_le_bytes(buf)
    }

    pub(crate) fn write_u16(&self, sector: u64, offset: usize, value: u16) {
        self.cache_write_bytes(sector, offset, &value.to_le_bytes());
    }

    pub(crate) fn write_u32(&self, sector: u64, offset: usize, value: u32) {
        self.cache_write_bytes(sector, offset, &value.to_le_bytes());
    }
}
