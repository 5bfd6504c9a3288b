//! `Fat32Context`: owns the superblock and FAT caches for one open image and
//! drives every other module through them.

use chrono::Utc;
use log::debug;

use crate::bpb::{BiosParameterBlock, FsInfo, BASIC_BPB_SIZE, EBPB_SIZE, FSINFO_SIZE};
use crate::device::ByteDevice;
use crate::dir::{DirectoryEntry, DirectoryIterator};
use crate::entry::{ShortDirEntry, ENTRY_SIZE};
use crate::error::Fat32Result;
use crate::fat::FatTable;
use crate::path;
use crate::{ATTR_VOLUME_ID, END_OF_CHAIN};

/// An open FAT32 image: the superblock cache, the FAT cache, and the device
/// they were read from. Not reentrant — callers serialise access themselves
/// (see the concurrency model this crate assumes).
pub struct Fat32Context {
    device: Box<dyn ByteDevice>,
    bpb: BiosParameterBlock,
    fsinfo: FsInfo,
    fat: FatTable,
    bpb_dirty: bool,
    fsinfo_dirty: bool,
}

impl Fat32Context {
    /// Read BPB/EBPB/FSInfo/FAT from an existing image.
    pub fn open(mut device: Box<dyn ByteDevice>) -> Fat32Result<Self> {
        let mut boot_buf = vec![0u8; BASIC_BPB_SIZE + EBPB_SIZE];
        device.read_at(0, &mut boot_buf)?;
        let bpb = BiosParameterBlock::decode(&boot_buf)?;

        let mut fsinfo_buf = vec![0u8; FSINFO_SIZE];
        device.read_at(bpb.fs_info_offset(), &mut fsinfo_buf)?;
        let fsinfo = FsInfo::decode(&fsinfo_buf)?;

        let fat = FatTable::load(device.as_mut(), &bpb)?;

        debug!(
            "opened FAT32 image: {} clusters, {} bytes/cluster",
            bpb.count_of_clusters(),
            bpb.cluster_size()
        );

        Ok(Self { device, bpb, fsinfo, fat, bpb_dirty: false, fsinfo_dirty: false })
    }

    /// Zero-fill a fresh image of `disk_size` bytes and write canonical
    /// BPB/EBPB/FSInfo/FAT regions, per the format mutator.
    pub fn create(mut device: Box<dyn ByteDevice>, disk_size: u64, serial_number: u32) -> Fat32Result<Self> {
        let zero_block = vec![0u8; 1 << 20];
        let mut written = 0u64;
        while written < disk_size {
            let chunk = (disk_size - written).min(zero_block.len() as u64) as usize;
            device.write_at(written, &zero_block[..chunk])?;
            written += chunk as u64;
        }

        let bpb = BiosParameterBlock::format(disk_size, serial_number);
        let mut boot_buf = vec![0u8; BASIC_BPB_SIZE + EBPB_SIZE];
        bpb.encode(&mut boot_buf);
        device.write_at(0, &boot_buf)?;

        let fsinfo = FsInfo::format(bpb.count_of_clusters());
        let mut fsinfo_buf = vec![0u8; FSINFO_SIZE];
        fsinfo.encode(&mut fsinfo_buf);
        device.write_at(bpb.fs_info_offset(), &fsinfo_buf)?;

        // Reserve clusters 0 and 1 (never allocatable) and terminate the root
        // directory's own cluster, so the very first allocation doesn't
        // alias the root directory it's supposed to live alongside.
        let mut fat_buf = vec![0u8; bpb.fat_bytes() as usize];
        fat_buf[0..4].copy_from_slice(&(0x0FFF_FF00 | bpb.bpb.media_type as u32).to_le_bytes());
        fat_buf[4..8].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        let root_cluster = bpb.ebpb.root_cluster as usize;
        fat_buf[root_cluster * 4..root_cluster * 4 + 4].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        device.write_at(bpb.fat_offset(0), &fat_buf)?;

        let fat = FatTable::load(device.as_mut(), &bpb)?;

        // Seed the root directory with its volume-label record so `rename_volume`
        // has something to find; the sentinel right after it is already zero
        // from the whole-disk zero-fill above.
        let label_entry = ShortDirEntry {
            file_name: bpb.ebpb.volume_label,
            attributes: ATTR_VOLUME_ID,
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
        let mut label_buf = [0u8; ENTRY_SIZE];
        label_entry.encode(&mut label_buf);
        device.write_at(bpb.root_dir_address(), &label_buf)?;

        debug!("formatted FAT32 image: {} bytes, {} clusters", disk_size, bpb.count_of_clusters());

        Ok(Self { device, bpb, fsinfo, fat, bpb_dirty: false, fsinfo_dirty: false })
    }

    /// Convenience over `create` that stamps the volume serial number with
    /// the current wall-clock time in seconds, per the canonical `format()`.
    pub fn create_now(device: Box<dyn ByteDevice>, disk_size: u64) -> Fat32Result<Self> {
        let serial_number = Utc::now().timestamp() as u32;
        Self::create(device, disk_size, serial_number)
    }

    pub fn bpb(&self) -> &BiosParameterBlock {
        &self.bpb
    }

    pub fn fat(&self) -> &FatTable {
        &self.fat
    }

    pub fn root_address(&self) -> u64 {
        self.bpb.root_dir_address()
    }

    pub(crate) fn device_mut(&mut self) -> &mut dyn ByteDevice {
        self.device.as_mut()
    }

    pub(crate) fn fat_mut(&mut self) -> &mut FatTable {
        &mut self.fat
    }

    pub(crate) fn mark_bpb_dirty(&mut self) {
        self.bpb_dirty = true;
    }

    pub(crate) fn bpb_mut(&mut self) -> &mut BiosParameterBlock {
        &mut self.bpb
    }

    /// List the immediate children of the directory at `dir_address`.
    pub fn list_directory(&mut self, dir_address: u64) -> Fat32Result<Vec<DirectoryEntry>> {
        let mut it = DirectoryIterator::new(dir_address);
        let mut out = Vec::new();
        let Self { device, bpb, fat, .. } = self;
        while let Some(entry) = it.next(device.as_mut(), bpb, fat)? {
            out.push(entry);
        }
        Ok(out)
    }

    /// Resolve a '/'-separated path starting from the root directory.
    pub fn resolve(&mut self, full_path: &str) -> Fat32Result<DirectoryEntry> {
        let root = self.root_address();
        let Self { device, bpb, fat, .. } = self;
        path::open_path(device.as_mut(), bpb, fat, root, full_path)
    }

    /// Flush every dirty cache to its primary offset and its backup-sector
    /// mirror, then release the device. Per the resolved design note, this
    /// always writes the in-memory image to both locations without an
    /// intervening read from disk.
    pub fn close(mut self) -> Fat32Result<()> {
        if self.bpb_dirty {
            let mut boot_buf = vec![0u8; BASIC_BPB_SIZE + EBPB_SIZE];
            self.bpb.encode(&mut boot_buf);
            self.device.write_at(0, &boot_buf)?;
            self.device.write_at(self.bpb.backup_offset(), &boot_buf)?;
        }

        if self.fsinfo_dirty {
            let mut fsinfo_buf = vec![0u8; FSINFO_SIZE];
            self.fsinfo.encode(&mut fsinfo_buf);
            self.device.write_at(self.bpb.fs_info_offset(), &fsinfo_buf)?;
            self.device.write_at(
                self.bpb.backup_offset() + self.bpb.fs_info_offset(),
                &fsinfo_buf,
            )?;
        }

        if self.fat.is_dirty() {
            let mut fat_buf = vec![0u8; self.bpb.fat_bytes() as usize];
            self.fat.encode(&mut fat_buf);
            self.device.write_at(self.bpb.fat_offset(0), &fat_buf)?;
            self.device.write_at(
                self.bpb.backup_offset() + self.bpb.fat_offset(0),
                &fat_buf,
            )?;
            self.fat.clear_dirty();
        }

        Ok(())
    }

    pub(crate) fn set_free_clusters(&mut self, free_count: u32) {
        self.fsinfo.free_count = free_count;
        self.fsinfo_dirty = true;
    }

    pub(crate) fn free_clusters(&self) -> u32 {
        self.fsinfo.free_count
    }

    pub(crate) fn next_free_hint(&self) -> u32 {
        self.fsinfo.next_free
    }

    pub(crate) fn set_next_free_hint(&mut self, cluster: u32) {
        self.fsinfo.next_free = cluster;
        self.fsinfo_dirty = true;
    }
}
