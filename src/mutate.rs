//! The three mutating operations: volume relabel, directory-entry creation,
//! and image format.

use log::warn;

use crate::context::Fat32Context;
use crate::device::ByteDevice;
use crate::entry::{ShortDirEntry, ENTRY_SIZE};
use crate::error::{Fat32Error, Fat32Result};
use crate::fat::ClusterPtr;
use crate::{ATTR_ARCHIVE, ATTR_DIRECTORY, DIR_ENTRY_DELETED, DIR_ENTRY_END, DIR_ENTRY_SIZE};

/// Re-format an image in place: identical to `Fat32Context::create`, just
/// named for symmetry with the other mutators.
pub fn format(
    device: Box<dyn ByteDevice>,
    disk_size: u64,
    serial_number: u32,
) -> Fat32Result<Fat32Context> {
    Fat32Context::create(device, disk_size, serial_number)
}

/// Uppercase, validate, and pad a label to 11 bytes, then overwrite the root
/// directory's volume-label record and the EBPB's mirror of it.
pub fn rename_volume(ctx: &mut Fat32Context, new_label: &str) -> Fat32Result<()> {
    if new_label.len() > 11 {
        return Err(Fat32Error::InvalidArg(format!(
            "volume label {new_label:?} exceeds 11 characters"
        )));
    }

    let folded = if new_label.chars().any(|c| c.is_ascii_lowercase()) {
        warn!("volume label {new_label:?} contains lowercase letters, folding to uppercase");
        new_label.to_ascii_uppercase()
    } else {
        new_label.to_string()
    };

    let mut padded = [0x20u8; 11];
    padded[..folded.len()].copy_from_slice(folded.as_bytes());

    let root = ctx.root_address();
    let address = find_volume_label_address(ctx, root)?;

    ctx.device_mut().write_at(address, &padded)?;
    ctx.bpb_mut().ebpb.volume_label = padded;
    ctx.mark_bpb_dirty();
    Ok(())
}

fn find_volume_label_address(ctx: &mut Fat32Context, dir_address: u64) -> Fat32Result<u64> {
    let bpb = *ctx.bpb();
    scan_for_volume_label(ctx, &bpb, dir_address)
        .ok_or_else(|| Fat32Error::NotFound("no volume label record in root directory".into()))
}

fn scan_for_volume_label(
    ctx: &mut Fat32Context,
    bpb: &crate::bpb::BiosParameterBlock,
    dir_address: u64,
) -> Option<u64> {
    let mut address = dir_address;
    loop {
        if address == 0 {
            return None;
        }
        let mut buf = [0u8; ENTRY_SIZE];
        ctx.device_mut().read_at(address, &mut buf).ok()?;
        let mut next_address = address + DIR_ENTRY_SIZE;

        if next_address % bpb.cluster_size() == 0 {
            let cluster = bpb.cluster_of_address(address);
            match ctx.fat().get(cluster) {
                ClusterPtr::EndOfChain => next_address = 0,
                ClusterPtr::Next(n) => next_address = bpb.data_address_of(n),
                ClusterPtr::Free | ClusterPtr::Bad => return None,
            }
        }

        if buf[0] == DIR_ENTRY_END {
            return None;
        }
        if buf[0] != DIR_ENTRY_DELETED {
            let short = ShortDirEntry::decode(&buf);
            if short.is_volume_label() {
                return Some(address);
            }
        }
        address = next_address;
    }
}

/// Append a new directory entry (file or subdirectory) in the directory at
/// `dir_address`. Allocates one cluster, writes a short record with
/// placeholder timestamps, marks the allocated cluster `EndOfChain`, and
/// writes a fresh end-of-directory sentinel after the new record — both
/// steps the original directory-entry creation omitted.
pub fn create_directory_entry(
    ctx: &mut Fat32Context,
    dir_address: u64,
    name: &str,
    is_dir: bool,
) -> Fat32Result<()> {
    let (base, ext) = split_short_name(name)?;
    let bpb = ctx.bpb().clone();

    let slot = find_insertion_slot(ctx, &bpb, dir_address)?;

    let count_of_clusters = bpb.count_of_clusters();
    let hint = ctx.next_free_hint();
    let cluster = ctx.fat_mut().find_free_cluster(hint, count_of_clusters)?;
    ctx.fat_mut().set(cluster, ClusterPtr::EndOfChain);
    let free = ctx.free_clusters();
    ctx.set_free_clusters(free.saturating_sub(1));
    ctx.set_next_free_hint(cluster + 1);

    let mut file_name = [0x20u8; 11];
    file_name[0..base.len()].copy_from_slice(base.as_bytes());
    file_name[8..8 + ext.len()].copy_from_slice(ext.as_bytes());

    let mut entry = ShortDirEntry {
        file_name,
        attributes: if is_dir { ATTR_DIRECTORY } else { ATTR_ARCHIVE },
        nt_reserved: 0,
        creation_time_tenth: 0,
        creation_time: 0,
        creation_date: 0x21, // 1980-01-01, the original source's fixed stamp
        access_date: 0x21,
        first_cluster_hi: 0,
        modification_time: 0,
        modification_date: 0x21,
        first_cluster_lo: 0,
        file_size: 0,
    };
    entry.set_first_cluster(cluster);

    let mut buf = [0u8; ENTRY_SIZE];
    entry.encode(&mut buf);
    ctx.device_mut().write_at(slot, &buf)?;

    let sentinel = [0u8; ENTRY_SIZE];
    ctx.device_mut().write_at(slot + DIR_ENTRY_SIZE, &sentinel)?;

    Ok(())
}

fn find_insertion_slot(
    ctx: &mut Fat32Context,
    bpb: &crate::bpb::BiosParameterBlock,
    dir_address: u64,
) -> Fat32Result<u64> {
    let mut address = dir_address;
    loop {
        let mut buf = [0u8; ENTRY_SIZE];
        ctx.device_mut().read_at(address, &mut buf)?;
        if buf[0] == DIR_ENTRY_END {
            return Ok(address);
        }

        let mut next_address = address + DIR_ENTRY_SIZE;
        if next_address % bpb.cluster_size() == 0 {
            let cluster = bpb.cluster_of_address(address);
            match ctx.fat().get(cluster) {
                ClusterPtr::EndOfChain => {
                    return Err(Fat32Error::NoSpace);
                }
                ClusterPtr::Next(n) => next_address = bpb.data_address_of(n),
                ClusterPtr::Free | ClusterPtr::Bad => {
                    return Err(Fat32Error::Integrity(
                        "directory chain hit a free or bad cluster while scanning for a slot".into(),
                    ))
                }
            }
        }
        address = next_address;
    }
}

/// Split `name` into an 8-character base and 3-character extension, both
/// uppercased, for an 8.3 short record. Rejects names that don't fit.
fn split_short_name(name: &str) -> Fat32Result<(String, String)> {
    let upper = name.to_ascii_uppercase();
    let (base, ext) = match upper.rfind('.') {
        Some(i) => (&upper[..i], &upper[i + 1..]),
        None => (&upper[..], ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(Fat32Error::InvalidArg(format!("{name:?} is not a valid 8.3 name")));
    }
    Ok((base.to_string(), ext.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FileDevice;

    #[test]
    fn rejects_overlong_volume_label() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let device: Box<dyn ByteDevice> =
            Box::new(FileDevice::create(tmp.path(), 2 * 1024 * 1024).unwrap());
        let mut ctx = Fat32Context::create(device, 2 * 1024 * 1024, 1).unwrap();
        let err = rename_volume(&mut ctx, "WAY TOO LONG LABEL").unwrap_err();
        assert!(matches!(err, Fat32Error::InvalidArg(_)));
    }

    #[test]
    fn split_short_name_rejects_long_base() {
        assert!(split_short_name("ABCDEFGHI.TXT").is_err());
        assert_eq!(split_short_name("hello.txt").unwrap(), ("HELLO".to_string(), "TXT".to_string()));
    }
}
