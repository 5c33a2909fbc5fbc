// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A minimal read/write FAT32 (with partial FAT16) filesystem engine that
//! drives a caller-supplied [`BlockDevice`] rather than a real disk or SD
//! card. See [`Volume::mount`] and [`File`].

mod alloc;
mod boot;
mod cache;
mod cluster;
mod dir;
mod path;
mod file;

use std::cell::RefCell;

use esfat_ds::BlockDevice;
pub use esfat_err::{Error, Result};

pub use cluster::Cluster;
pub use dir::wildcard_match;
pub use file::{open_flags, File, OpenFlags, SeekFrom, Stats};
pub use path::FoundEntry;

use boot::Geometry;
use cache::SectorCache;

/// Maximum length of a single path component considered during matching.
///
/// Mirrors the reference driver's `FAT_MAXLEN_USE`: long-filename
/// reassembly and wildcard matching both work against a buffer this size.
pub const MAX_COMPONENT_LEN: usize = 32;

/// Maximum length of an assembled long filename.
///
/// Mirrors the reference driver's `FAT_MAXLEN`.
pub const MAX_NAME_LEN: usize = 256;

pub(crate) const SECTOR_SIZE: usize = 512;

/// A mounted FAT32/FAT16 volume.
///
/// Owns the block device and the single write-back sector cache shared by
/// every FAT and directory/data access. [`File`] handles borrow a `Volume`
/// for their lifetime, so the borrow checker — not a runtime flag — rejects
/// any attempt to drop or move the volume out from under an open handle.
pub struct Volume<DS: BlockDevice> {
    device: DS,
    geometry: Geometry,
    cache: RefCell<SectorCache>,
}

impl<DS: BlockDevice> Volume<DS> {
    /// Mounts a volume from an MBR-partitioned block device.
    ///
    /// Reads sector 0, rejects bare boot sectors (a leading jump opcode),
    /// validates the first partition's type, then parses the BPB at that
    /// partition's start to derive the volume's geometry.
    pub fn mount(device: DS) -> Result<Self> {
        let geometry = boot::probe(&device)?;
        log::info!(
            "mounted {:?} volume: {} bytes/sector, {} sectors/cluster, {} clusters",
            geometry.variant,
            geometry.bytes_per_sector,
            geometry.sectors_per_cluster,
            geometry.num_clusters
        );
        let volume = Self {
            device,
            geometry,
            cache: RefCell::new(SectorCache::new()),
        };
        volume.check_mountable()?;
        Ok(volume)
    }

    /// Releases the volume, returning the underlying block device.
    ///
    /// Takes `self` by value: any outstanding [`File`] borrowing this
    /// volume makes this call a compile error, not a runtime one.
    pub fn into_device(self) -> DS {
        self.device
    }

    fn check_mountable(&self) -> Result<()> {
        if self.geometry.bytes_per_sector == 0 || self.geometry.bytes_per_cluster == 0 {
            log::error!("volume not mountable: zero bytes_per_sector/bytes_per_cluster");
            return Err(Error::InvalidState);
        }
        Ok(())
    }

    /// Scans the FAT once, returning allocated/free cluster counts.
    pub fn stats(&self) -> Stats {
        let mut allocated = 0u32;
        for cluster in cluster::CLUST_FIRST..=self.geometry.num_clusters + 1 {
            if !matches!(self.entry_get(cluster), Cluster::Free) {
                allocated += 1;
            }
        }
        Stats {
            total: self.geometry.num_clusters,
            free: self.geometry.num_clusters - allocated,
            allocated,
        }
    }

    pub(crate) fn bytes_per_sector(&self) -> usize {
        self.geometry.bytes_per_sector as usize
    }

    pub(crate) fn bytes_per_cluster(&self) -> u32 {
        self.geometry.bytes_per_cluster
    }

    /// Absolute LBA of the first sector of `cluster`. Cluster `0` is the
    /// FAT16 fixed-root-directory sentinel.
    pub(crate) fn sector_of(&self, cluster: u32) -> u64 {
        if cluster == 0 {
            self.geometry.first_dir_sector
        } else {
            self.geometry.first_data_sector
                + (cluster - cluster::CLUST_FIRST) as u64 * self.geometry.sectors_per_cluster as u64
        }
    }

    pub(crate) fn is_fat16_fixed_root(&self, cluster: u32) -> bool {
        matches!(self.geometry.variant, boot::Variant::Fat16) && cluster == 0
    }

    pub(crate) fn dir_cluster_sector_count(&self, cluster: u32) -> u32 {
        if self.is_fat16_fixed_root(cluster) {
            self.geometry.root_dir_sectors
        } else {
            self.geometry.sectors_per_cluster as u32
        }
    }

    pub(crate) fn root_dir_cluster(&self) -> u32 {
        self.geometry.root_dir_cluster
    }
}
