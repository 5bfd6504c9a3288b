//! End-to-end round-trips over a real temp-file image: format, relabel,
//! create entries, close, and reopen, checking what survives on disk.

use fat32::{Fat32Context, FileDevice};

const DISK_SIZE: u64 = 20 * 1024 * 1024;

fn format_temp() -> (tempfile::TempPath, Fat32Context) {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.into_temp_path();
    let device = FileDevice::create(&path, DISK_SIZE).unwrap();
    let ctx = Fat32Context::create(Box::new(device), DISK_SIZE, 0x1234_5678).unwrap();
    (path, ctx)
}

#[test]
fn format_produces_canonical_geometry_and_a_volume_label_entry() {
    let (_path, mut ctx) = format_temp();
    assert_eq!(ctx.bpb().bpb.sector_count_32, 40960);
    assert_eq!(ctx.bpb().ebpb.root_cluster, 2);
    let root = ctx.root_address();
    assert_eq!(ctx.bpb().data_address_of(2), root);

    // The only entry in a freshly-formatted root is the volume-label record
    // `rename_volume` depends on finding.
    let entries = ctx.list_directory(root).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].short.is_volume_label());
}

#[test]
fn close_with_no_mutations_leaves_image_bytes_unchanged() {
    let (path, ctx) = format_temp();
    let before = std::fs::read(&path).unwrap();
    ctx.close().unwrap();
    let after = std::fs::read(&path).unwrap();
    assert_eq!(before, after);
}

#[test]
fn relabel_then_reopen_reflects_new_label_in_both_copies() {
    let (path, mut ctx) = format_temp();
    fat32::mutate::rename_volume(&mut ctx, "hello").unwrap();
    assert_eq!(&ctx.bpb().ebpb.volume_label, b"HELLO      ");
    ctx.close().unwrap();

    let device = FileDevice::open(&path).unwrap();
    let reopened = Fat32Context::open(Box::new(device)).unwrap();
    assert_eq!(&reopened.bpb().ebpb.volume_label, b"HELLO      ");

    // Backup boot sector mirrors the primary one byte-for-byte.
    let bytes = std::fs::read(&path).unwrap();
    let backup_offset = reopened.bpb().backup_offset() as usize;
    let label_offset = 36 + 35; // BASIC_BPB_SIZE + volume_label field offset within EBPB
    assert_eq!(
        &bytes[label_offset..label_offset + 11],
        &bytes[backup_offset + label_offset..backup_offset + label_offset + 11]
    );
}

#[test]
fn relabel_with_overlong_name_is_rejected_and_changes_nothing() {
    let (path, mut ctx) = format_temp();
    let before = std::fs::read(&path).unwrap();
    let err = fat32::mutate::rename_volume(&mut ctx, "TWELVE CHARS").unwrap_err();
    assert!(matches!(err, fat32::Fat32Error::InvalidArg(_)));
    ctx.close().unwrap();
    let after = std::fs::read(&path).unwrap();
    assert_eq!(before, after);
}

#[test]
fn created_directory_entry_is_found_by_path_and_terminates_its_chain() {
    let (_path, mut ctx) = format_temp();
    let root = ctx.root_address();
    fat32::mutate::create_directory_entry(&mut ctx, root, "SUBDIR", true).unwrap();

    let found = ctx.resolve("/SUBDIR").unwrap();
    assert!(found.short.is_directory());
    assert_eq!(found.short.short_name(), "SUBDIR");

    let chain = ctx.fat().chain(found.short.first_cluster()).unwrap();
    assert_eq!(chain.len(), 1);

    // The new directory is empty: reading its data area immediately hits
    // the end-of-directory sentinel written alongside the new record.
    let data_address = ctx.bpb().data_address_of(found.short.first_cluster());
    let listing = ctx.list_directory(data_address).unwrap();
    assert!(listing.is_empty());
}

#[test]
fn cd_into_a_file_is_not_a_directory_error() {
    let (_path, mut ctx) = format_temp();
    let root = ctx.root_address();
    fat32::mutate::create_directory_entry(&mut ctx, root, "FILE.TXT", false).unwrap();
    let err = ctx.resolve("/FILE.TXT/SUB").unwrap_err();
    assert!(matches!(err, fat32::Fat32Error::NotADirectory(_)));
}
