//! The open-file handle: `open`, `read`, `write`, `lseek`, `close`, `unlink`,
//! and the volume-wide `stats` type.

use std::cell::Cell;

use esfat_ds::BlockDevice;
use esfat_err::{Error, Result};
use zerocopy::{little_endian::U32, FromBytes, FromZeros, IntoBytes};

use crate::cluster::Cluster;
use crate::dir::{ShortEntry, ATTR_NORMAL, DIR_ENTRY_SIZE, SLOT_DELETED};
use crate::path::FoundEntry;
use crate::Volume;

/// Open-mode flags, passed to [`Volume::open`].
///
/// A hand-rolled bitmask rather than a `bitflags` type: the set is small and
/// fixed, and nothing else in this crate needs generated flag combinators.
pub mod open_flags {
    pub const READ_ONLY: u32 = 0x0000;
    pub const WRITE_ONLY: u32 = 0x0001;
    pub const READ_WRITE: u32 = 0x0002;
    pub const ACCESS_MASK: u32 = 0x0003;

    pub const CREATE: u32 = 0x0100;
    pub const TRUNCATE: u32 = 0x0200;
    pub const APPEND: u32 = 0x0400;
    pub const EXCLUSIVE: u32 = 0x0800;
    pub const BINARY: u32 = 0x1000;
    pub const TEXT: u32 = 0x2000;
}

pub use open_flags::*;

/// Bitmask of [`open_flags`] values describing how [`Volume::open`] should
/// locate or create a file.
pub type OpenFlags = u32;

/// Reference point for [`File::lseek`].
#[derive(Debug, Clone, Copy)]
pub enum SeekFrom {
    Start(u32),
    Current(i32),
    End(i32),
}

/// Allocated/free cluster counts for a mounted volume, from [`Volume::stats`].
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub total: u32,
    pub free: u32,
    pub allocated: u32,
}

/// An open file.
///
/// Borrows the [`Volume`] it was opened from, so the volume cannot be
/// unmounted (via [`Volume::into_device`]) while this handle is live.
pub struct File<'a, DS: BlockDevice> {
    volume: &'a Volume<DS>,
    flags: OpenFlags,
    start_cluster: Cell<u32>,
    size: Cell<u32>,
    offset: Cell<u32>,
    /// Cluster backing the current offset, or `0` if a write needs to
    /// allocate one before it can proceed.
    current_cluster: Cell<u32>,
    /// Last cluster known to be linked into the chain; the append target
    /// when `current_cluster` is `0`.
    tail_cluster: Cell<u32>,
    de_sector: u64,
    de_offset: usize,
}

impl<DS: BlockDevice> Volume<DS> {
    /// Opens `path`, creating or truncating it per `flags`.
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<File<'_, DS>> {
        let search = self.search(path);

        if let Some(found) = search.found {
            if found.is_dir {
                log::error!("{path} is a directory");
                return Err(Error::IsDirectory);
            }
            if flags & EXCLUSIVE != 0 {
                log::error!("{path} already exists and EXCLUSIVE was requested");
                return Err(Error::AlreadyExists);
            }

            let mut size = found.size;
            if flags & TRUNCATE != 0 {
                self.truncate_entry(&found);
                size = 0;
            }

            let offset = if flags & APPEND != 0 { size } else { 0 };
            let start_cluster = if flags & TRUNCATE != 0 {
                0
            } else {
                found.cluster
            };

            let file = File {
                volume: self,
                flags,
                start_cluster: Cell::new(start_cluster),
                size: Cell::new(size),
                offset: Cell::new(0),
                current_cluster: Cell::new(start_cluster),
                tail_cluster: Cell::new(start_cluster),
                de_sector: found.de_sector,
                de_offset: found.de_offset,
            };
            if offset != 0 {
                file.lseek(SeekFrom::Start(offset))?;
            }
            return Ok(file);
        }

        if flags & CREATE == 0 {
            log::info!("{path} not found and CREATE was not requested");
            return Err(Error::NotFound);
        }
        if search.parent_dir_cluster == 0 {
            log::error!("{path}: parent directory does not exist");
            return Err(Error::NotFound);
        }

        let (component, de_sector, de_offset) = self.create_entry(search.parent_dir_cluster, path)?;
        log::info!("created {component}");

        Ok(File {
            volume: self,
            flags,
            start_cluster: Cell::new(0),
            size: Cell::new(0),
            offset: Cell::new(0),
            current_cluster: Cell::new(0),
            tail_cluster: Cell::new(0),
            de_sector,
            de_offset,
        })
    }

    /// Removes `path`. Fails if it names a directory.
    pub fn unlink(&self, path: &str) -> Result<()> {
        let search = self.search(path);
        let found = search.found.ok_or(Error::NotFound)?;
        if found.is_dir {
            log::error!("{path} is a directory");
            return Err(Error::IsDirectory);
        }

        if found.cluster != 0 {
            self.chain_free(found.cluster);
        }

        let mut buf = [0u8; DIR_ENTRY_SIZE];
        self.cache_read_bytes(found.de_sector, found.de_offset, &mut buf);
        buf[0] = SLOT_DELETED;
        self.cache_write_bytes(found.de_sector, found.de_offset, &buf);

        self.unmark_preceding_long_name_entries(found.de_sector, found.de_offset);
        self.cache_flush();
        Ok(())
    }

    /// Walks backward from a short entry's slot, marking preceding
    /// long-filename fragments deleted, stopping at the first slot that
    /// isn't a long-name fragment (or the start of the directory).
    fn unmark_preceding_long_name_entries(&self, sector: u64, offset: usize) {
        let mut sector = sector;
        let mut offset = offset;
        loop {
            if offset == 0 {
                if sector == self.sector_of(self.root_dir_cluster()) {
                    return;
                }
                sector -= 1;
                offset = self.bytes_per_sector() - DIR_ENTRY_SIZE;
            } else {
                offset -= DIR_ENTRY_SIZE;
            }

            let mut buf = [0u8; DIR_ENTRY_SIZE];
            self.cache_read_bytes(sector, offset, &mut buf);
            let entry = ShortEntry::ref_from_bytes(&buf).expect("32-byte slice matches layout");
            if !entry.is_long_name() {
                return;
            }
            buf[0] = SLOT_DELETED;
            self.cache_write_bytes(sector, offset, &buf);
        }
    }

    fn truncate_entry(&self, found: &FoundEntry) {
        if found.cluster != 0 {
            self.chain_free(found.cluster);
        }
        self.set_entry_cluster_and_size(found.de_sector, found.de_offset, 0, 0);
    }

    fn set_entry_cluster_and_size(&self, sector: u64, offset: usize, cluster: u32, size: u32) {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        self.cache_read_bytes(sector, offset, &mut buf);
        let entry = ShortEntry::mut_from_bytes(&mut buf).expect("32-byte slice matches layout");
        entry.cluster_high.set((cluster >> 16) as u16);
        entry.cluster_low.set(cluster as u16);
        entry.file_size.set(size);
        self.cache_write_bytes(sector, offset, &buf);
    }

    /// Appends a new, zero-length short directory entry for the final
    /// component of `path` in `dir_cluster`.
    ///
    /// Always appends at the directory's terminator entry, even if an
    /// earlier slot was freed by an `unlink` (see DESIGN.md).
    fn create_entry(&self, dir_cluster: u32, path: &str) -> Result<(String, u64, usize)> {
        let component = path.rsplit('/').next().unwrap_or(path);
        if component.len() > crate::MAX_COMPONENT_LEN {
            log::error!("{component} exceeds the maximum component length");
            return Err(Error::InvalidArgument);
        }

        let (mut cursor, mut raw) = self.dir_cursor_first(dir_cluster);
        loop {
            let short = ShortEntry::ref_from_bytes(&raw).expect("32-byte slice matches layout");
            if short.is_end() {
                break;
            }
            if cursor.exhausted() {
                log::error!("out of space adding directory entry for {component}");
                return Err(Error::OutOfSpace);
            }
            raw = self.dir_cursor_next(&mut cursor);
        }
        if cursor.exhausted() {
            return Err(Error::OutOfSpace);
        }

        let (sector, offset) = self.dir_cursor_location(&cursor);
        let (name, ext) = short_name_from_component(component);

        // The slot after this one is already zeroed (directory clusters are
        // zero-filled on allocation), so it's already a valid terminator.
        let mut entry = ShortEntry::new_zeroed();
        entry.name = name;
        entry.ext = ext;
        entry.attr = ATTR_NORMAL;
        entry.file_size = U32::new(0);
        self.cache_write_bytes(sector, offset, entry.as_bytes());

        self.cache_flush();
        Ok((component.to_string(), sector, offset))
    }
}

/// Formats a path component as a space-padded, upper-cased short name.
/// Matches the reference driver's `fat_de_sfn_create`: no `~N` collision
/// suffixing, names are truncated to 8.3 rather than rejected.
fn short_name_from_component(component: &str) -> ([u8; 8], [u8; 3]) {
    let mut name = [b' '; 8];
    let mut ext = [b' '; 3];
    let (base, extension) = match component.rsplit_once('.') {
        Some((b, e)) => (b, e),
        None => (component, ""),
    };
    for (i, b) in base.bytes().take(8).enumerate() {
        name[i] = b.to_ascii_uppercase();
    }
    for (i, b) in extension.bytes().take(3).enumerate() {
        ext[i] = b.to_ascii_uppercase();
    }
    (name, ext)
}

impl<'a, DS: BlockDevice> File<'a, DS> {
    /// Reads up to `buf.len()` bytes starting at the current offset,
    /// stopping at the end of the file or the end of the chain.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.flags & ACCESS_MASK == WRITE_ONLY {
            log::error!("read on a write-only handle");
            return Err(Error::InvalidState);
        }

        let remaining = self.size.get().saturating_sub(self.offset.get());
        let want = buf.len().min(remaining as usize);
        if want == 0 {
            return Ok(0);
        }

        let bytes_per_cluster = self.volume.bytes_per_cluster();
        let mut done = 0usize;
        while done < want {
            if self.current_cluster.get() == 0 {
                break;
            }
            let in_cluster = self.offset.get() % bytes_per_cluster;
            let sector_in_cluster = in_cluster / self.volume.bytes_per_sector() as u32;
            let in_sector = (in_cluster % self.volume.bytes_per_sector() as u32) as usize;
            let sector = self.volume.sector_of(self.current_cluster.get()) + sector_in_cluster as u64;

            let chunk = (want - done)
                .min(self.volume.bytes_per_sector() - in_sector)
                .min((bytes_per_cluster - in_cluster) as usize);
            self.volume
                .content_read(sector, in_sector, &mut buf[done..done + chunk]);

            done += chunk;
            self.offset.set(self.offset.get() + chunk as u32);
            self.advance_cluster(bytes_per_cluster, false);
        }
        Ok(done)
    }

    /// Writes `data` at the current offset, allocating clusters on demand as
    /// the file grows past its current chain, and extending `size` if the
    /// write reaches past the old end of file.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        if self.flags & ACCESS_MASK == READ_ONLY {
            log::error!("write on a read-only handle");
            return Err(Error::InvalidArgument);
        }

        let bytes_per_cluster = self.volume.bytes_per_cluster();
        let mut done = 0usize;
        while done < data.len() {
            if self.current_cluster.get() == 0 {
                let new = self.volume.clusters_allocate(self.tail_cluster.get(), 1);
                if new == 0 {
                    log::error!("out of space writing file");
                    self.finish_write(done);
                    return if done == 0 {
                        Err(Error::OutOfSpace)
                    } else {
                        Ok(done)
                    };
                }
                if self.start_cluster.get() == 0 {
                    self.start_cluster.set(new);
                }
                self.current_cluster.set(new);
                self.tail_cluster.set(new);
            }

            let in_cluster = self.offset.get() % bytes_per_cluster;
            let sector_in_cluster = in_cluster / self.volume.bytes_per_sector() as u32;
            let in_sector = (in_cluster % self.volume.bytes_per_sector() as u32) as usize;
            let sector = self.volume.sector_of(self.current_cluster.get()) + sector_in_cluster as u64;

            let chunk = (data.len() - done)
                .min(self.volume.bytes_per_sector() - in_sector)
                .min((bytes_per_cluster - in_cluster) as usize);
            self.volume
                .content_write(sector, in_sector, &data[done..done + chunk]);

            done += chunk;
            self.offset.set(self.offset.get() + chunk as u32);
            if self.offset.get() > self.size.get() {
                self.size.set(self.offset.get());
            }
            self.advance_cluster(bytes_per_cluster, true);
        }
        self.finish_write(done);
        Ok(done)
    }

    fn finish_write(&self, written: usize) {
        if written > 0 {
            self.volume.set_entry_cluster_and_size(
                self.de_sector,
                self.de_offset,
                self.start_cluster.get(),
                self.size.get(),
            );
            self.volume.cache_flush();
        }
    }

    /// Moves onto the next cluster once the offset lands exactly on a
    /// cluster boundary. On a read, stops at the chain's recorded end. On a
    /// write, always leaves `current_cluster` at `0` past the boundary so
    /// the next write allocates — even if a stale next-cluster link exists
    /// past the file's old end.
    fn advance_cluster(&self, bytes_per_cluster: u32, for_write: bool) {
        if self.offset.get() % bytes_per_cluster != 0 {
            return;
        }
        if for_write {
            self.current_cluster.set(0);
            return;
        }
        if self.offset.get() >= self.size.get() {
            return;
        }
        match self.volume.entry_get_checked(self.current_cluster.get()) {
            Cluster::Data(next) => {
                self.current_cluster.set(next);
                self.tail_cluster.set(next);
            }
            _ => {
                log::error!("cluster chain ends before the recorded file size");
                self.current_cluster.set(0);
            }
        }
    }

    /// Repositions the file offset, clamped to `[0, size]`. The next write
    /// past the old end of the chain allocates from the last cluster
    /// reached during the walk; a read at an offset past the chain's
    /// current extent simply returns `0`.
    pub fn lseek(&self, pos: SeekFrom) -> Result<u32> {
        let new_offset = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(delta) => self.offset.get() as i64 + delta as i64,
            SeekFrom::End(delta) => self.size.get() as i64 + delta as i64,
        };
        let new_offset = new_offset.clamp(0, self.size.get() as i64) as u32;

        let bytes_per_cluster = self.volume.bytes_per_cluster();
        let mut cluster = self.start_cluster.get();
        let mut last_valid = cluster;
        let mut remaining_clusters = new_offset / bytes_per_cluster;
        while remaining_clusters > 0 && cluster != 0 {
            match self.volume.entry_get_checked(cluster) {
                Cluster::Data(next) => cluster = next,
                _ => {
                    cluster = 0;
                    break;
                }
            }
            if cluster != 0 {
                last_valid = cluster;
            }
            remaining_clusters -= 1;
        }
        self.current_cluster.set(cluster);
        self.tail_cluster.set(last_valid);
        self.offset.set(new_offset);
        Ok(new_offset)
    }

    /// Flushes any pending sector writes. There is no per-handle state to
    /// release: the volume's cache is shared and outlives this handle.
    pub fn close(&self) -> Result<()> {
        self.volume.cache_flush();
        Ok(())
    }

    pub fn size(&self) -> u32 {
        self.size.get()
    }

    pub fn offset(&self) -> u32 {
        self.offset.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_from_component_pads_and_uppercases() {
        let (name, ext) = short_name_from_component("read.me");
        assert_eq!(&name, b"READ    ");
        assert_eq!(&ext, b"ME ");
    }

    #[test]
    fn short_name_from_component_without_extension() {
        let (name, ext) = short_name_from_component("readme");
        assert_eq!(&name, b"README  ");
        assert_eq!(&ext, b"   ");
    }
}
