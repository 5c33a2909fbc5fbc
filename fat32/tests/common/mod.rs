//! Shared test fixtures: an in-memory block device and a hand-built FAT32
//! disk image (one FAT, one sector per cluster, 32 data clusters).

use std::cell::RefCell;

use esfat_ds::BlockDevice;

pub const BYTES_PER_SECTOR: usize = 512;
pub const SECTORS_PER_CLUSTER: usize = 1;
pub const NUM_CLUSTERS: usize = 32;
pub const PARTITION_START: usize = 1;
pub const FAT_SECTOR: usize = 2;
pub const ROOT_DIR_SECTOR: usize = 3;
pub const FIRST_DATA_SECTOR: usize = 3;
pub const TOTAL_SECTORS: usize = FIRST_DATA_SECTOR + NUM_CLUSTERS;

pub struct MemoryDevice {
    bytes: RefCell<Vec<u8>>,
}

impl MemoryDevice {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            bytes: RefCell::new(image),
        }
    }
}

impl BlockDevice for MemoryDevice {
    fn read(&self, byte_offset: u64, buf: &mut [u8]) -> usize {
        let bytes = self.bytes.borrow();
        let start = byte_offset as usize;
        let n = buf.len().min(bytes.len().saturating_sub(start));
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        n
    }

    fn write(&self, byte_offset: u64, buf: &[u8]) -> usize {
        let mut bytes = self.bytes.borrow_mut();
        let start = byte_offset as usize;
        let n = buf.len().min(bytes.len().saturating_sub(start));
        bytes[start..start + n].copy_from_slice(&buf[..n]);
        n
    }
}

fn sector_range(sector: usize) -> std::ops::Range<usize> {
    sector * BYTES_PER_SECTOR..(sector + 1) * BYTES_PER_SECTOR
}

/// Builds a minimal, valid FAT32 image: an MBR with a single FAT32LBA
/// partition, a BPB describing one FAT and 32 one-sector clusters, a FAT
/// with only the root directory's cluster (2) chained to end-of-chain, and
/// an empty root directory.
pub fn build_fat32_image() -> Vec<u8> {
    let mut image = vec![0u8; TOTAL_SECTORS * BYTES_PER_SECTOR];

    // MBR partition table entry (bytes 446..462 of sector 0).
    let mbr = &mut image[sector_range(0)];
    mbr[446] = 0x00; // not active
    mbr[446 + 4] = 0x0C; // PART_TYPE_FAT32LBA
    mbr[446 + 8..446 + 12].copy_from_slice(&(PARTITION_START as u32).to_le_bytes());
    mbr[446 + 12..446 + 16].copy_from_slice(&((TOTAL_SECTORS - PARTITION_START) as u32).to_le_bytes());
    image[510] = 0x55;
    image[511] = 0xAA;

    // BPB at the partition's boot sector, standard FAT32 field offsets.
    let bpb = &mut image[sector_range(PARTITION_START)];
    bpb[11..13].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes()); // bpb_bytes_per_sec
    bpb[13] = SECTORS_PER_CLUSTER as u8; // bpb_sec_per_clus
    bpb[14..16].copy_from_slice(&1u16.to_le_bytes()); // bpb_rsvd_sec_cnt
    bpb[16] = 1; // bpb_num_fats
    bpb[17..19].copy_from_slice(&0u16.to_le_bytes()); // bpb_root_ent_cnt (0 on FAT32)
    bpb[19..21].copy_from_slice(&0u16.to_le_bytes()); // bpb_tot_sec16
    bpb[21] = 0xF8; // bpb_media
    bpb[22..24].copy_from_slice(&0u16.to_le_bytes()); // bpb_fat_sz16
    bpb[32..36].copy_from_slice(&((TOTAL_SECTORS - PARTITION_START) as u32).to_le_bytes()); // bpb_tot_sec32
    bpb[36..40].copy_from_slice(&1u32.to_le_bytes()); // bpb_fat_sz32
    bpb[44..48].copy_from_slice(&2u32.to_le_bytes()); // bpb_root_clus

    // FAT: cluster 2 (the root directory) is a single-cluster chain.
    let fat = &mut image[sector_range(FAT_SECTOR)];
    fat[8..12].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());

    image
}

pub fn mount() -> esfat::Volume<MemoryDevice> {
    esfat::Volume::mount(MemoryDevice::new(build_fat32_image())).expect("image mounts")
}
