//! BIOS Parameter Block, Extended BPB, and FSInfo sector.
//!
//! These are the three on-disk structures that anchor every offset
//! computation in the rest of the crate. They are decoded and encoded
//! explicitly field-by-field rather than cast from raw bytes: the on-disk
//! layout is little-endian and unpadded, which does not necessarily match
//! this platform's in-memory struct layout.

use crate::error::{Fat32Error, Fat32Result};
use crate::{read_le_u16, read_le_u32, LEAD_SIGNATURE, STRUCT_SIGNATURE, TRAIL_SIGNATURE};

pub const BASIC_BPB_SIZE: usize = 36;
pub const EBPB_SIZE: usize = 54;
pub const FSINFO_SIZE: usize = 512;

/// The first 36 bytes of the boot sector, common to FAT12/16/32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicBpb {
    pub jump_boot: [u8; 3],
    pub oem_id: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub fat_count: u8,
    pub root_entry_count: u16,
    pub sector_count_16: u16,
    pub media_type: u8,
    pub sectors_per_fat_16: u16,
    pub sectors_per_track: u16,
    pub head_count: u16,
    pub hidden_sector_count: u32,
    pub sector_count_32: u32,
}

impl BasicBpb {
    pub fn decode(buf: &[u8]) -> Fat32Result<Self> {
        if buf.len() < BASIC_BPB_SIZE {
            return Err(Fat32Error::Integrity("BPB sector truncated".into()));
        }
        Ok(Self {
            jump_boot: [buf[0], buf[1], buf[2]],
            oem_id: buf[3..11].try_into().unwrap(),
            bytes_per_sector: read_le_u16(&buf[11..13]),
            sectors_per_cluster: buf[13],
            reserved_sector_count: read_le_u16(&buf[14..16]),
            fat_count: buf[16],
            root_entry_count: read_le_u16(&buf[17..19]),
            sector_count_16: read_le_u16(&buf[19..21]),
            media_type: buf[21],
            sectors_per_fat_16: read_le_u16(&buf[22..24]),
            sectors_per_track: read_le_u16(&buf[24..26]),
            head_count: read_le_u16(&buf[26..28]),
            hidden_sector_count: read_le_u32(&buf[28..32]),
            sector_count_32: read_le_u32(&buf[32..36]),
        })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..3].copy_from_slice(&self.jump_boot);
        buf[3..11].copy_from_slice(&self.oem_id);
        buf[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        buf[13] = self.sectors_per_cluster;
        buf[14..16].copy_from_slice(&self.reserved_sector_count.to_le_bytes());
        buf[16] = self.fat_count;
        buf[17..19].copy_from_slice(&self.root_entry_count.to_le_bytes());
        buf[19..21].copy_from_slice(&self.sector_count_16.to_le_bytes());
        buf[21] = self.media_type;
        buf[22..24].copy_from_slice(&self.sectors_per_fat_16.to_le_bytes());
        buf[24..26].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        buf[26..28].copy_from_slice(&self.head_count.to_le_bytes());
        buf[28..32].copy_from_slice(&self.hidden_sector_count.to_le_bytes());
        buf[32..36].copy_from_slice(&self.sector_count_32.to_le_bytes());
    }

    /// Effective total sector count: the 16-bit field when non-zero, else the 32-bit one.
    pub fn total_sectors(&self) -> u64 {
        if self.sector_count_16 != 0 {
            self.sector_count_16 as u64
        } else {
            self.sector_count_32 as u64
        }
    }
}

/// The FAT32-specific extension of the boot sector, immediately following the basic BPB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ebpb {
    pub sectors_per_fat_32: u32,
    pub flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fs_info_sector: u16,
    pub backup_boot_sector: u16,
    pub drive_number: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

impl Ebpb {
    pub fn decode(buf: &[u8]) -> Fat32Result<Self> {
        if buf.len() < EBPB_SIZE {
            return Err(Fat32Error::Integrity("EBPB sector truncated".into()));
        }
        Ok(Self {
            sectors_per_fat_32: read_le_u32(&buf[0..4]),
            flags: read_le_u16(&buf[4..6]),
            fs_version: read_le_u16(&buf[6..8]),
            root_cluster: read_le_u32(&buf[8..12]),
            fs_info_sector: read_le_u16(&buf[12..14]),
            backup_boot_sector: read_le_u16(&buf[14..16]),
            drive_number: buf[28],
            boot_signature: buf[30],
            volume_id: read_le_u32(&buf[31..35]),
            volume_label: buf[35..46].try_into().unwrap(),
            fs_type: buf[46..54].try_into().unwrap(),
        })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.sectors_per_fat_32.to_le_bytes());
        buf[4..6].copy_from_slice(&self.flags.to_le_bytes());
        buf[6..8].copy_from_slice(&self.fs_version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.root_cluster.to_le_bytes());
        buf[12..14].copy_from_slice(&self.fs_info_sector.to_le_bytes());
        buf[14..16].copy_from_slice(&self.backup_boot_sector.to_le_bytes());
        buf[16..28].fill(0);
        buf[28] = self.drive_number;
        buf[29] = 0;
        buf[30] = self.boot_signature;
        buf[31..35].copy_from_slice(&self.volume_id.to_le_bytes());
        buf[35..46].copy_from_slice(&self.volume_label);
        buf[46..54].copy_from_slice(&self.fs_type);
    }

    pub fn is_valid(&self) -> bool {
        self.boot_signature == 0x28 || self.boot_signature == 0x29
    }
}

/// The combined boot-sector view used throughout the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiosParameterBlock {
    pub bpb: BasicBpb,
    pub ebpb: Ebpb,
}

impl BiosParameterBlock {
    pub fn decode(buf: &[u8]) -> Fat32Result<Self> {
        let bpb = BasicBpb::decode(&buf[0..BASIC_BPB_SIZE])?;
        let ebpb = Ebpb::decode(&buf[BASIC_BPB_SIZE..BASIC_BPB_SIZE + EBPB_SIZE])?;
        if !ebpb.is_valid() {
            return Err(Fat32Error::Integrity("illegal EBPB signature".into()));
        }
        Ok(Self { bpb, ebpb })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        self.bpb.encode(&mut buf[0..BASIC_BPB_SIZE]);
        self.ebpb.encode(&mut buf[BASIC_BPB_SIZE..BASIC_BPB_SIZE + EBPB_SIZE]);
    }

    pub fn bytes_per_sector(&self) -> u64 {
        self.bpb.bytes_per_sector as u64
    }

    pub fn sectors_per_cluster(&self) -> u64 {
        self.bpb.sectors_per_cluster as u64
    }

    pub fn cluster_size(&self) -> u64 {
        self.bytes_per_sector() * self.sectors_per_cluster()
    }

    pub fn fat_offset(&self, fat_index: u64) -> u64 {
        let reserved = self.bpb.reserved_sector_count as u64;
        let fat_sectors = self.ebpb.sectors_per_fat_32 as u64;
        (reserved + fat_index * fat_sectors) * self.bytes_per_sector()
    }

    pub fn fat_bytes(&self) -> u64 {
        self.ebpb.sectors_per_fat_32 as u64 * self.bytes_per_sector()
    }

    pub fn fs_info_offset(&self) -> u64 {
        self.ebpb.fs_info_sector as u64 * self.bytes_per_sector()
    }

    pub fn backup_offset(&self) -> u64 {
        self.ebpb.backup_boot_sector as u64 * self.bytes_per_sector()
    }

    pub fn first_data_sector(&self) -> u64 {
        self.bpb.reserved_sector_count as u64
            + self.bpb.fat_count as u64 * self.ebpb.sectors_per_fat_32 as u64
    }

    pub fn root_dir_address(&self) -> u64 {
        self.data_address_of(self.ebpb.root_cluster)
    }

    /// Byte offset for cluster `n`'s data. Clusters 0 and 1 are reserved; the
    /// data region begins at cluster 2.
    pub fn data_address_of(&self, cluster: u32) -> u64 {
        let first_sector =
            (cluster as u64 - 2) * self.sectors_per_cluster() + self.first_data_sector();
        first_sector * self.bytes_per_sector()
    }

    /// Inverse of `data_address_of`: the cluster number whose data region
    /// contains `address`.
    pub fn cluster_of_address(&self, address: u64) -> u32 {
        let first_sector = address / self.bytes_per_sector();
        ((first_sector - self.first_data_sector()) / self.sectors_per_cluster() + 2) as u32
    }

    /// Data sectors, corrected per the resolved design note: the total
    /// sector count minus the first data sector, not `sectorsPerFat -
    /// firstDataSector` as in the original source.
    pub fn data_sectors(&self) -> u64 {
        self.bpb.total_sectors().saturating_sub(self.first_data_sector())
    }

    pub fn count_of_clusters(&self) -> u64 {
        self.data_sectors() / self.sectors_per_cluster()
    }

    pub fn is_fat32(&self) -> bool {
        self.count_of_clusters() >= 65526
    }

    /// Build a canonical BPB/EBPB pair for a freshly formatted image of `disk_size` bytes.
    pub fn format(disk_size: u64, serial_number: u32) -> Self {
        const SECTOR_SIZE: u16 = 512;
        const RESERVED_SECTORS: u16 = 32;
        const FAT_COUNT: u8 = 2;

        let total_sectors = (disk_size / SECTOR_SIZE as u64) as u32;
        // clusters = (totalSectors - reservedSectors) / (sectorsPerCluster + fatCount*4/sectorSize)
        let usable_sectors = total_sectors.saturating_sub(RESERVED_SECTORS as u32);
        let clusters = usable_sectors / (1 + (FAT_COUNT as u32 * 4) / SECTOR_SIZE as u32);
        let sectors_per_fat = (clusters as u64 * 4).div_ceil(SECTOR_SIZE as u64) as u32;

        let bpb = BasicBpb {
            jump_boot: [0xEB, 0x58, 0x90],
            oem_id: *b"MSDOS4.1",
            bytes_per_sector: SECTOR_SIZE,
            sectors_per_cluster: 1,
            reserved_sector_count: RESERVED_SECTORS,
            fat_count: FAT_COUNT,
            root_entry_count: 0,
            sector_count_16: 0,
            media_type: 0xF8,
            sectors_per_fat_16: 0,
            sectors_per_track: 0,
            head_count: 0,
            hidden_sector_count: 0,
            sector_count_32: total_sectors,
        };

        let mut volume_label = [0x20u8; 11];
        volume_label[0..11].copy_from_slice(b"MSDOS 4.1  ");

        let ebpb = Ebpb {
            sectors_per_fat_32: sectors_per_fat,
            flags: 0,
            fs_version: 0,
            root_cluster: 2,
            fs_info_sector: 1,
            backup_boot_sector: 6,
            drive_number: 0x80,
            boot_signature: 0x29,
            volume_id: serial_number,
            volume_label,
            fs_type: *b"FAT32   ",
        };

        Self { bpb, ebpb }
    }
}

/// The FSInfo sector: free-cluster bookkeeping hints, not authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfo {
    pub free_count: u32,
    pub next_free: u32,
}

impl FsInfo {
    pub fn decode(buf: &[u8]) -> Fat32Result<Self> {
        if buf.len() < FSINFO_SIZE {
            return Err(Fat32Error::Integrity("FSInfo sector truncated".into()));
        }
        let lead = read_le_u32(&buf[0..4]);
        let structsig = read_le_u32(&buf[484..488]);
        let trail = read_le_u32(&buf[508..512]);
        if lead != LEAD_SIGNATURE || structsig != STRUCT_SIGNATURE || trail != TRAIL_SIGNATURE {
            return Err(Fat32Error::Integrity("illegal FSInfo signature".into()));
        }
        Ok(Self {
            free_count: read_le_u32(&buf[488..492]),
            next_free: read_le_u32(&buf[492..496]),
        })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf.fill(0);
        buf[0..4].copy_from_slice(&LEAD_SIGNATURE.to_le_bytes());
        buf[484..488].copy_from_slice(&STRUCT_SIGNATURE.to_le_bytes());
        buf[488..492].copy_from_slice(&self.free_count.to_le_bytes());
        buf[492..496].copy_from_slice(&self.next_free.to_le_bytes());
        buf[508..512].copy_from_slice(&TRAIL_SIGNATURE.to_le_bytes());
    }

    pub fn format(total_clusters: u64) -> Self {
        Self { free_count: (total_clusters.saturating_sub(1)) as u32, next_free: 3 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_round_trips_through_encode_decode() {
        let bpb = BiosParameterBlock::format(20 * 1024 * 1024, 0x1234_5678);
        let mut buf = [0u8; BASIC_BPB_SIZE + EBPB_SIZE];
        bpb.encode(&mut buf);
        let decoded = BiosParameterBlock::decode(&buf).unwrap();
        assert_eq!(bpb, decoded);
        assert!(decoded.is_fat32());
    }

    #[test]
    fn first_data_sector_matches_reserved_plus_fats() {
        let bpb = BiosParameterBlock::format(20 * 1024 * 1024, 1);
        assert_eq!(
            bpb.first_data_sector(),
            bpb.bpb.reserved_sector_count as u64
                + bpb.bpb.fat_count as u64 * bpb.ebpb.sectors_per_fat_32 as u64
        );
    }

    #[test]
    fn fsinfo_round_trips() {
        let info = FsInfo::format(1000);
        let mut buf = [0u8; FSINFO_SIZE];
        info.encode(&mut buf);
        let decoded = FsInfo::decode(&buf).unwrap();
        assert_eq!(info, decoded);
    }
}
