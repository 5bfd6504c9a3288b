//! The directory stream: a restartable cursor that walks a directory's
//! cluster chain one 32-byte record at a time, reassembling long file names
//! from their fragments as it goes.

use crate::bpb::BiosParameterBlock;
use crate::device::ByteDevice;
use crate::entry::{decode_long_name, LfnEntry, ShortDirEntry, ENTRY_SIZE};
use crate::error::{Fat32Error, Fat32Result};
use crate::fat::{ClusterPtr, FatTable};
use crate::DIR_ENTRY_SIZE;

const MAX_LFN_ORDINALS: usize = 20;

/// One yielded entry: the short record, its reconstructed long name (if any
/// and if its checksum matched), and the byte address the short record lives at.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub short: ShortDirEntry,
    pub long_name: Option<String>,
    pub address: u64,
}

impl DirectoryEntry {
    /// The name to present to callers: the long name when present, else the
    /// rendered 8.3 short name (or the raw 11 bytes for a directory).
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.long_name {
            return name.clone();
        }
        if self.short.is_directory() {
            return String::from_utf8_lossy(&self.short.file_name).to_string();
        }
        self.short.short_name()
    }
}

struct LfnAccumulator {
    chars: [Option<Vec<u16>>; MAX_LFN_ORDINALS],
    checksums: [Option<u8>; MAX_LFN_ORDINALS],
}

impl LfnAccumulator {
    fn new() -> Self {
        Self {
            chars: std::array::from_fn(|_| None),
            checksums: std::array::from_fn(|_| None),
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn record(&mut self, fragment: &LfnEntry) -> Fat32Result<()> {
        let ordinal = fragment.ordinal() as usize;
        if ordinal >= MAX_LFN_ORDINALS {
            return Err(Fat32Error::Integrity(format!("LFN ordinal {ordinal} out of range")));
        }
        if self.chars[ordinal].is_some() {
            return Err(Fat32Error::Integrity(format!("duplicate LFN ordinal {ordinal}")));
        }
        self.chars[ordinal] = Some(fragment.chars());
        self.checksums[ordinal] = Some(fragment.checksum);
        Ok(())
    }

    /// Assemble the accumulated fragments into one name, verifying every
    /// recorded checksum matches the short record's. A mismatch (or no
    /// fragments at all) yields `None`, per the local-recovery rule: a bad
    /// checksum silently downgrades to "no long filename".
    fn finish(&self, short_checksum: u8) -> Option<String> {
        if self.checksums.iter().all(Option::is_none) {
            return None;
        }
        if self.checksums.iter().flatten().any(|&c| c != short_checksum) {
            log::warn!("LFN checksum mismatch, discarding reconstructed long name");
            return None;
        }
        let mut units = Vec::new();
        for slot in &self.chars {
            match slot {
                Some(cs) => units.extend(cs),
                None => break,
            }
        }
        decode_long_name(&units).ok()
    }
}

/// A lazy cursor over one directory's entry stream.
pub struct DirectoryIterator {
    init_address: u64,
    current_address: u64,
    lfn: LfnAccumulator,
}

impl DirectoryIterator {
    pub fn new(address: u64) -> Self {
        Self { init_address: address, current_address: address, lfn: LfnAccumulator::new() }
    }

    pub fn rewind(&mut self) {
        self.current_address = self.init_address;
        self.lfn.reset();
    }

    pub fn set_address(&mut self, address: u64) {
        self.init_address = address;
        self.current_address = address;
        self.lfn.reset();
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_address == 0
    }

    /// Advance the cursor and return the next logical entry, or `None` at
    /// end-of-directory / end-of-chain.
    pub fn next(
        &mut self,
        device: &mut dyn ByteDevice,
        bpb: &BiosParameterBlock,
        fat: &FatTable,
    ) -> Fat32Result<Option<DirectoryEntry>> {
        loop {
            if self.current_address == 0 {
                return Ok(None);
            }

            let mut buf = [0u8; ENTRY_SIZE];
            device.read_at(self.current_address, &mut buf)?;
            let address = self.current_address;
            let mut new_address = self.current_address + DIR_ENTRY_SIZE;

            if new_address % bpb.cluster_size() == 0 {
                let cluster = bpb.cluster_of_address(self.current_address);
                match fat.get(cluster) {
                    ClusterPtr::EndOfChain => new_address = 0,
                    ClusterPtr::Next(next) => new_address = bpb.data_address_of(next),
                    ClusterPtr::Free | ClusterPtr::Bad => {
                        return Err(Fat32Error::Integrity(format!(
                            "directory chain hit a free or bad cluster after {cluster}"
                        )))
                    }
                }
            }

            if buf[0] == crate::DIR_ENTRY_END {
                self.current_address = 0;
                return Ok(None);
            }

            if buf[0] == crate::DIR_ENTRY_DELETED {
                self.current_address = new_address;
                continue;
            }

            let short = ShortDirEntry::decode(&buf);
            if short.is_long_name_entry() {
                let fragment = LfnEntry::decode(&buf);
                self.lfn.record(&fragment)?;
                self.current_address = new_address;
                continue;
            }

            let long_name = self.lfn.finish(short.checksum());
            self.lfn.reset();
            self.current_address = new_address;
            return Ok(Some(DirectoryEntry { short, long_name, address }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_support::MemDevice;

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
    fn stops_at_end_sentinel() {
        let bpb = test_bpb();
        let root = bpb.root_dir_address();
        let mut device = MemDevice::new((root + bpb.cluster_size()) as usize);
        write_short_entry(&mut device, root, b"FILE    TXT", 0x20);
        // byte after that stays zeroed: the end sentinel.
        let fat = FatTable::load(&mut device, &bpb).unwrap();
        let mut it = DirectoryIterator::new(root);
        let first = it.next(&mut device, &bpb, &fat).unwrap();
        assert!(first.is_some());
        let second = it.next(&mut device, &bpb, &fat).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn skips_deleted_entries() {
        let bpb = test_bpb();
        let root = bpb.root_dir_address();
        let mut device = MemDevice::new((root + bpb.cluster_size()) as usize);
        write_short_entry(&mut device, root, b"\xE5ILE    TXT", 0x20);
        write_short_entry(&mut device, root + DIR_ENTRY_SIZE, b"REAL    TXT", 0x20);
        let fat = FatTable::load(&mut device, &bpb).unwrap();
        let mut it = DirectoryIterator::new(root);
        let entry = it.next(&mut device, &bpb, &fat).unwrap().unwrap();
        assert_eq!(entry.short.short_name(), "REAL.TXT");
    }
}
