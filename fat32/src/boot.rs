//! MBR partition table and BIOS Parameter Block parsing.

use std::mem::MaybeUninit;

use esfat_ds::BlockDevice;
use esfat_err::{Error, Result};
use log::error;
use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

use crate::SECTOR_SIZE;

const PART_TYPE_FAT16: u8 = 0x06;
const PART_TYPE_FAT32: u8 = 0x0B;
const PART_TYPE_FAT32LBA: u8 = 0x0C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Variant {
    Fat16,
    Fat32,
}

pub(crate) struct Geometry {
    pub variant: Variant,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub bytes_per_cluster: u32,
    pub first_fat_sector: u64,
    pub num_fat_sectors: u32,
    pub first_data_sector: u64,
    pub first_dir_sector: u64,
    pub root_dir_sectors: u32,
    pub root_dir_cluster: u32,
    pub num_clusters: u32,
}

/// One 16-byte entry of the MBR partition table (bytes 446..510 of sector 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout)]
struct PartitionRecord {
    is_active: u8,
    start_head: u8,
    start_cyl_sect: U16,
    part_type: u8,
    end_head: u8,
    end_cyl_sect: U16,
    start_lba: U32,
    size: U32,
}

/// BIOS Parameter Block, the common prefix shared by FAT16 and FAT32 boot
/// sectors. Fields past `bpb_fatsz16` only apply to FAT32; on FAT16 they
/// hold whatever the extended boot-block bytes contain and are ignored.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, IntoBytes, KnownLayout)]
struct Bpb {
    bs_jmp: [u8; 3],
    bs_oem_name: [u8; 8],
    bpb_bytes_per_sec: U16,
    bpb_sec_per_clus: u8,
    bpb_rsvd_sec_cnt: U16,
    bpb_num_fats: u8,
    bpb_root_ent_cnt: U16,
    bpb_tot_sec16: U16,
    bpb_media: u8,
    bpb_fat_sz16: U16,
    bpb_sec_per_trk: U16,
    bpb_num_heads: U16,
    bpb_hidd_sec: U32,
    bpb_tot_sec32: U32,
    bpb_fat_sz32: U32,
    bpb_ext_flags: U16,
    bpb_fs_ver: U16,
    bpb_root_clus: U32,
}

/// Reads sector 0, validates it as an MBR (not a bare boot record), reads
/// the first partition's boot sector, and derives a [`Geometry`].
pub(crate) fn probe<DS: BlockDevice>(device: &DS) -> Result<Geometry> {
    let mut sector0 = [0u8; SECTOR_SIZE];
    device.read(0, &mut sector0);

    if sector0[0] == 0xE9 || sector0[0] == 0xEB {
        error!("sector 0 begins with a jump opcode; bare boot records are not supported");
        return Err(Error::InvalidState);
    }

    let mut record: PartitionRecord = unsafe { MaybeUninit::uninit().assume_init() };
    record.as_mut_bytes().copy_from_slice(&sector0[446..462]);
    let partition_start = record.start_lba.get() as u64;
    let part_type = record.part_type;

    let variant = match part_type {
        PART_TYPE_FAT16 => Variant::Fat16,
        PART_TYPE_FAT32 | PART_TYPE_FAT32LBA => Variant::Fat32,
        other => {
            error!("unsupported partition type 0x{other:02x}");
            return Err(Error::InvalidState);
        }
    };

    let mut boot_sector = [0u8; SECTOR_SIZE];
    let n = device.read(partition_start * SECTOR_SIZE as u64, &mut boot_sector);
    if n != SECTOR_SIZE {
        error!("short read of boot sector at partition start {partition_start}");
        return Err(Error::InvalidState);
    }
    let mut bpb: Bpb = unsafe { MaybeUninit::uninit().assume_init() };
    let bpb_size = bpb.as_bytes().len();
    bpb.as_mut_bytes().copy_from_slice(&boot_sector[..bpb_size]);
    let bpb = &bpb;

    let bytes_per_sector = bpb.bpb_bytes_per_sec.get();
    if bytes_per_sector == 0 || bytes_per_sector as usize > SECTOR_SIZE {
        error!("bytes per sector ({bytes_per_sector}) out of supported range");
        return Err(Error::InvalidState);
    }
    let sectors_per_cluster = bpb.bpb_sec_per_clus;
    if sectors_per_cluster == 0 {
        error!("sectors per cluster is zero");
        return Err(Error::InvalidState);
    }

    let num_fats = bpb.bpb_num_fats as u64;
    let reserved_sectors = bpb.bpb_rsvd_sec_cnt.get() as u64;
    let fat_sz16 = bpb.bpb_fat_sz16.get() as u32;
    let num_fat_sectors = if fat_sz16 != 0 {
        fat_sz16
    } else {
        bpb.bpb_fat_sz32.get()
    };

    let root_dir_sectors = ((bpb.bpb_root_ent_cnt.get() as u32 * 32)
        + (bytes_per_sector as u32 - 1))
        / bytes_per_sector as u32;

    let first_fat_sector = partition_start + reserved_sectors;
    let first_dir_sector = first_fat_sector + num_fats * num_fat_sectors as u64;
    let first_data_sector = first_dir_sector + root_dir_sectors as u64;

    let tot_sec16 = bpb.bpb_tot_sec16.get() as u32;
    let total_sectors = if tot_sec16 != 0 {
        tot_sec16
    } else {
        bpb.bpb_tot_sec32.get()
    };
    let first_data_sector_relative =
        reserved_sectors as u32 + num_fats as u32 * num_fat_sectors + root_dir_sectors;
    if total_sectors < first_data_sector_relative {
        error!("total sectors ({total_sectors}) smaller than reserved + FAT + root dir region");
        return Err(Error::InvalidState);
    }
    let data_sectors = total_sectors - first_data_sector_relative;
    let num_clusters = data_sectors / sectors_per_cluster as u32;

    let root_dir_cluster = match variant {
        Variant::Fat32 => bpb.bpb_root_clus.get(),
        Variant::Fat16 => 0,
    };

    log::debug!(
        "fat_offset={first_fat_sector} data_offset={first_data_sector} \
         dir_offset={first_dir_sector} clusters={num_clusters}"
    );

    Ok(Geometry {
        variant,
        bytes_per_sector,
        sectors_per_cluster,
        bytes_per_cluster: sectors_per_cluster as u32 * bytes_per_sector as u32,
        first_fat_sector,
        num_fat_sectors,
        first_data_sector,
        first_dir_sector,
        root_dir_sectors,
        root_dir_cluster,
        num_clusters,
    })
}
