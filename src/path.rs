//! Resolving '/'-separated paths against the directory stream.

use crate::bpb::BiosParameterBlock;
use crate::device::ByteDevice;
use crate::dir::{DirectoryEntry, DirectoryIterator};
use crate::error::{Fat32Error, Fat32Result};
use crate::fat::FatTable;

/// Find `name` among the immediate children of the directory at `dir_address`,
/// comparing case-insensitively.
pub fn find_in_directory(
    device: &mut dyn ByteDevice,
    bpb: &BiosParameterBlock,
    fat: &FatTable,
    dir_address: u64,
    name: &str,
) -> Fat32Result<DirectoryEntry> {
    let mut it = DirectoryIterator::new(dir_address);
    let wanted = name.to_ascii_uppercase();
    while let Some(entry) = it.next(device, bpb, fat)? {
        if entry.display_name().to_ascii_uppercase() == wanted {
            return Ok(entry);
        }
    }
    Err(Fat32Error::NotFound(name.to_string()))
}

/// Resolve a '/'-separated path, starting from `start_address` (typically the
/// root directory). An empty path, or a bare "/", resolves to nothing — the
/// caller treats the starting directory itself as the result in that case.
pub fn open_path(
    device: &mut dyn ByteDevice,
    bpb: &BiosParameterBlock,
    fat: &FatTable,
    start_address: u64,
    path: &str,
) -> Fat32Result<DirectoryEntry> {
    let mut components = path.split('/').filter(|c| !c.is_empty());
    let mut current_address = start_address;

    let mut head = components
        .next()
        .ok_or_else(|| Fat32Error::InvalidArg("empty path".into()))?;

    loop {
        let entry = find_in_directory(device, bpb, fat, current_address, head)?;
        match components.next() {
            None => return Ok(entry),
            Some(next) => {
                if !entry.short.is_directory() {
                    return Err(Fat32Error::NotADirectory(entry.display_name()));
                }
                current_address = bpb.data_address_of(entry.short.first_cluster());
                head = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_support::MemDevice;
    use crate::entry::ENTRY_SIZE;
    use crate::entry::ShortDirEntry;

    fn test_bpb() -> BiosParameterBlock {
        BiosParameterBlock::format(2 * 1024 * 1024, 1)
    }

    fn write_short_entry(device: &mut MemDevice, address: u64, name: &[u8; 11], attrs: u8) {
        let entry = ShortDirEntry {
            file_name: *name,
            attributes: attrs,
            nt_reserved: 0,
            creation_time_tenth: 0,
            creation_time: 0,
            creation_date: 0,
            access_date: 0,
            first_cluster_hi: 0,
            modification_time: 0,
            modification_date: 0,
            first_cluster_lo: 0,
            file_size: 0,
        };
        let mut buf = [0u8; ENTRY_SIZE];
        entry.encode(&mut buf);
        device.write_at(address, &buf).unwrap();
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let bpb = test_bpb();
        let root = bpb.root_dir_address();
        let mut device = MemDevice::new((root + bpb.cluster_size()) as usize);
        write_short_entry(&mut device, root, b"HELLO   TXT", 0x20);
        let fat = FatTable::load(&mut device, &bpb).unwrap();
        let found = find_in_directory(&mut device, &bpb, &fat, root, "hello.txt").unwrap();
        assert_eq!(found.short.short_name(), "HELLO.TXT");
    }

    #[test]
    fn not_found_is_an_error() {
        let bpb = test_bpb();
        let root = bpb.root_dir_address();
        let mut device = MemDevice::new((root + bpb.cluster_size()) as usize);
        let fat = FatTable::load(&mut device, &bpb).unwrap();
        assert!(find_in_directory(&mut device, &bpb, &fat, root, "nope.txt").is_err());
    }
}
