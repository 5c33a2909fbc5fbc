mod common;

use esfat::open_flags::{APPEND, CREATE, EXCLUSIVE, READ_ONLY, READ_WRITE, TRUNCATE};
use esfat::SeekFrom;
use esfat_ds::BlockDevice;

#[test]
fn mount_reports_free_clusters() {
    let volume = common::mount();
    let stats = volume.stats();
    assert_eq!(stats.total, common::NUM_CLUSTERS as u32);
    assert_eq!(stats.allocated, 1); // the root directory's own cluster
    assert_eq!(stats.free, common::NUM_CLUSTERS as u32 - 1);
}

#[test]
fn create_write_read_round_trip() {
    let volume = common::mount();

    let file = volume.open("hello.txt", CREATE | READ_WRITE).unwrap();
    let written = file.write(b"hello, world").unwrap();
    assert_eq!(written, 12);
    file.close().unwrap();

    let file = volume.open("hello.txt", READ_ONLY).unwrap();
    assert_eq!(file.size(), 12);
    let mut buf = [0u8; 12];
    let n = file.read(&mut buf).unwrap();
    assert_eq!(n, 12);
    assert_eq!(&buf, b"hello, world");
}

#[test]
fn write_spans_multiple_clusters() {
    let volume = common::mount();
    let data = vec![0xABu8; common::BYTES_PER_SECTOR + 100];

    let file = volume.open("big.bin", CREATE | READ_WRITE).unwrap();
    let written = file.write(&data).unwrap();
    assert_eq!(written, data.len());
    file.close().unwrap();

    let stats = volume.stats();
    // root directory's cluster, plus two clusters for the file's data.
    assert_eq!(stats.allocated, 3);

    let file = volume.open("big.bin", READ_ONLY).unwrap();
    let mut readback = vec![0u8; data.len()];
    let n = file.read(&mut readback).unwrap();
    assert_eq!(n, data.len());
    assert_eq!(readback, data);
}

#[test]
fn unlink_removes_entry_and_frees_clusters() {
    let volume = common::mount();

    let file = volume.open("gone.txt", CREATE | READ_WRITE).unwrap();
    file.write(b"temporary").unwrap();
    file.close().unwrap();

    let stats_before = volume.stats();
    assert_eq!(stats_before.allocated, 2);

    volume.unlink("gone.txt").unwrap();

    let stats_after = volume.stats();
    assert_eq!(stats_after.allocated, 1);

    let err = volume.open("gone.txt", READ_ONLY).unwrap_err();
    assert!(matches!(err, esfat::Error::NotFound));
}

#[test]
fn exclusive_create_fails_if_file_exists() {
    let volume = common::mount();
    volume.open("once.txt", CREATE | READ_WRITE).unwrap();
    let err = volume
        .open("once.txt", CREATE | EXCLUSIVE | READ_WRITE)
        .unwrap_err();
    assert!(matches!(err, esfat::Error::AlreadyExists));
}

#[test]
fn truncate_resets_size_and_frees_old_clusters() {
    let volume = common::mount();

    let file = volume.open("shrink.txt", CREATE | READ_WRITE).unwrap();
    file.write(&vec![0x11u8; common::BYTES_PER_SECTOR + 10]).unwrap();
    file.close().unwrap();
    assert_eq!(volume.stats().allocated, 3);

    let file = volume.open("shrink.txt", TRUNCATE | READ_WRITE).unwrap();
    assert_eq!(file.size(), 0);
    file.close().unwrap();
    assert_eq!(volume.stats().allocated, 1);
}

#[test]
fn append_seeks_to_end_before_writing() {
    let volume = common::mount();

    let file = volume.open("log.txt", CREATE | READ_WRITE).unwrap();
    file.write(b"first").unwrap();
    file.close().unwrap();

    let file = volume.open("log.txt", APPEND | READ_WRITE).unwrap();
    assert_eq!(file.offset(), 5);
    file.write(b"second").unwrap();
    file.close().unwrap();

    let file = volume.open("log.txt", READ_ONLY).unwrap();
    let mut buf = [0u8; 11];
    file.read(&mut buf).unwrap();
    assert_eq!(&buf, b"firstsecond");
}

#[test]
fn lseek_from_start_and_current() {
    let volume = common::mount();
    let file = volume.open("seek.txt", CREATE | READ_WRITE).unwrap();
    file.write(b"0123456789").unwrap();

    file.lseek(SeekFrom::Start(3)).unwrap();
    let mut buf = [0u8; 2];
    file.read(&mut buf).unwrap();
    assert_eq!(&buf, b"34");

    file.lseek(SeekFrom::Current(-2)).unwrap();
    file.read(&mut buf).unwrap();
    assert_eq!(&buf, b"34");
}

#[test]
fn lseek_clamps_to_file_bounds_instead_of_erroring() {
    let volume = common::mount();
    let file = volume.open("clamp.txt", CREATE | READ_WRITE).unwrap();
    file.write(b"0123456789").unwrap();

    let pos = file.lseek(SeekFrom::Current(-100)).unwrap();
    assert_eq!(pos, 0);

    let pos = file.lseek(SeekFrom::End(100)).unwrap();
    assert_eq!(pos, file.size());
}

#[test]
fn write_on_read_only_handle_is_an_invalid_argument() {
    let volume = common::mount();
    volume.open("ro.txt", CREATE | READ_WRITE).unwrap().close().unwrap();

    let file = volume.open("ro.txt", READ_ONLY).unwrap();
    let err = file.write(b"x").unwrap_err();
    assert!(matches!(err, esfat::Error::InvalidArgument));
}

#[test]
fn trailing_slash_on_a_file_path_fails_to_resolve() {
    let volume = common::mount();
    volume.open("plain.txt", CREATE | READ_WRITE).unwrap().close().unwrap();

    let err = volume.open("plain.txt/", READ_ONLY).unwrap_err();
    assert!(matches!(err, esfat::Error::NotFound));
}

#[test]
fn running_out_of_clusters_fails_a_later_write() {
    let volume = common::mount();
    let free_bytes = (common::NUM_CLUSTERS - 1) * common::BYTES_PER_SECTOR;

    let file = volume.open("fill.bin", CREATE | READ_WRITE).unwrap();
    let written = file.write(&vec![0x42u8; free_bytes]).unwrap();
    assert_eq!(written, free_bytes);
    file.close().unwrap();
    assert_eq!(volume.stats().free, 0);

    // The directory still has room for a new zero-length entry...
    let other = volume.open("overflow.bin", CREATE | READ_WRITE).unwrap();
    // ...but there isn't a cluster left to back its first write.
    let err = other.write(b"x").unwrap_err();
    assert!(matches!(err, esfat::Error::OutOfSpace));
}

#[test]
fn resolves_a_long_filename_entry() {
    let image = common::build_fat32_image();
    let device = common::MemoryDevice::new(image);
    write_long_name_entry(&device, "longname.txt", b"LONGN~1 ", b"TXT");

    let volume = esfat::Volume::mount(device).unwrap();
    let file = volume.open("longname.txt", esfat::open_flags::READ_ONLY);
    assert!(file.is_ok());
}

/// Hand-writes a long-filename entry followed by its paired short entry
/// directly into the root directory's first sector, bypassing `Volume`
/// entirely (this crate's own `open(..., CREATE)` only ever writes short
/// names).
fn write_long_name_entry(
    device: &common::MemoryDevice,
    long_name: &str,
    short_name: &[u8; 8],
    short_ext: &[u8; 3],
) {
    assert!(long_name.len() <= 13);
    let mut units: Vec<u16> = long_name.encode_utf16().collect();
    units.push(0);
    while units.len() < 13 {
        units.push(0xFFFF);
    }

    let mut lde = [0u8; 32];
    lde[0] = 0x41; // WIN_LAST | sequence 1
    for (i, u) in units[0..5].iter().enumerate() {
        lde[1 + i * 2..3 + i * 2].copy_from_slice(&u.to_le_bytes());
    }
    lde[11] = 0x0F; // ATTR_LONG_NAME
    lde[12] = 0x00;
    lde[13] = 0x00; // checksum, unchecked by this driver
    for (i, u) in units[5..11].iter().enumerate() {
        lde[14 + i * 2..16 + i * 2].copy_from_slice(&u.to_le_bytes());
    }
    lde[26..28].copy_from_slice(&0u16.to_le_bytes());
    for (i, u) in units[11..13].iter().enumerate() {
        lde[28 + i * 2..30 + i * 2].copy_from_slice(&u.to_le_bytes());
    }

    let mut short = [0u8; 32];
    short[0..8].copy_from_slice(short_name);
    short[8..11].copy_from_slice(short_ext);
    short[11] = 0x00; // ATTR_NORMAL

    let root_dir_offset = (common::ROOT_DIR_SECTOR * common::BYTES_PER_SECTOR) as u64;
    device.write(root_dir_offset, &lde);
    device.write(root_dir_offset + 32, &short);
}
