//! Disk Parameter Block, the drive geometry record the legacy disk BIOS works with, derived from
//! the BIOS Parameter Block in the boot sector of a FAT12 floppy.

use std::convert::TryFrom;

use log::warn;
use scroll::{Pread, Pwrite};

use crate::sense::DiskError;

pub const DPB_LEN: usize = 18;
pub const SECTOR_SIZE: u16 = 512;

const DIR_ENTRIES_PER_SECTOR: u16 = SECTOR_SIZE / 32;
/// Largest root directory size that fits the one byte DPB field.
const MAX_ROOT_ENTRIES: u16 = 254;

/// The leading part of a FAT boot sector, up to the sectors per FAT field.
#[derive(Clone, Copy, Debug, Default, Pread, Pwrite)]
pub struct BiosParameterBlock {
    pub jump: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub root_entries: u16,
    pub total_sectors: u16,
    pub media_descriptor: u8,
    pub sectors_per_fat: u16,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Dpb {
    pub media: u8,
    pub sector_size: u16,
    /// (sector size / 32) - 1
    pub dir_mask: u8,
    /// number of bits set in `dir_mask`
    pub dir_shift: u8,
    pub cluster_mask: u8,
    /// number of bits set in `cluster_mask`, plus one
    pub cluster_shift: u8,
    pub first_fat_sector: u16,
    pub fat_count: u8,
    pub root_entries: u8,
    pub first_data_sector: u16,
    /// Cluster numbering starts at 2.
    pub max_cluster: u16,
    pub sectors_per_fat: u8,
    pub first_dir_sector: u16,
}

fn to_u16(value: u32, what: &str) -> Result<u16, DiskError> {
    u16::try_from(value).map_err(|_| {
        warn!("{} out of range: {}", what, value);
        DiskError::Other
    })
}

impl Dpb {
    pub fn from_boot_sector(sector: &[u8]) -> Result<Self, DiskError> {
        let bpb: BiosParameterBlock = sector.pread_with(0, scroll::LE).map_err(|err| {
            warn!("unable to parse boot sector: {}", err);
            DiskError::Other
        })?;
        Self::from_bpb(&bpb)
    }

    pub fn from_bpb(bpb: &BiosParameterBlock) -> Result<Self, DiskError> {
        if bpb.bytes_per_sector != SECTOR_SIZE {
            warn!(
                "boot sector declares {} bytes per sector, assuming {}",
                bpb.bytes_per_sector, SECTOR_SIZE
            );
        }

        let sectors_per_cluster = bpb.sectors_per_cluster;
        if sectors_per_cluster == 0 {
            warn!("boot sector declares zero sectors per cluster");
            return Err(DiskError::Other);
        }

        let reserved = u32::from(bpb.reserved_sectors);
        let fat_sectors = u32::from(bpb.fat_count) * u32::from(bpb.sectors_per_fat);
        let root_dir_sectors = u32::from(bpb.root_entries / DIR_ENTRIES_PER_SECTOR);

        let first_dir_sector = reserved + fat_sectors;
        let first_data_sector = first_dir_sector + root_dir_sectors;
        let data_sectors = u32::from(bpb.total_sectors)
            .checked_sub(first_data_sector)
            .ok_or_else(|| {
                warn!(
                    "{} sectors in total but data starts at {}",
                    bpb.total_sectors, first_data_sector
                );
                DiskError::Other
            })?;
        let max_cluster = data_sectors / u32::from(sectors_per_cluster) + 1;

        Ok(Self {
            media: bpb.media_descriptor,
            sector_size: SECTOR_SIZE,
            dir_mask: (DIR_ENTRIES_PER_SECTOR - 1) as u8,
            dir_shift: DIR_ENTRIES_PER_SECTOR.trailing_zeros() as u8,
            cluster_mask: sectors_per_cluster - 1,
            cluster_shift: (u8::BITS - sectors_per_cluster.leading_zeros()) as u8,
            first_fat_sector: bpb.reserved_sectors,
            fat_count: bpb.fat_count,
            root_entries: bpb.root_entries.min(MAX_ROOT_ENTRIES) as u8,
            first_data_sector: to_u16(first_data_sector, "first data sector")?,
            max_cluster: to_u16(max_cluster, "max cluster")?,
            sectors_per_fat: bpb.sectors_per_fat as u8,
            first_dir_sector: to_u16(first_dir_sector, "first directory sector")?,
        })
    }

    /// The packed little-endian layout handed to the disk BIOS.
    pub fn to_bytes(&self) -> [u8; DPB_LEN] {
        let mut bytes = [0u8; DPB_LEN];
        bytes[0] = self.media;
        bytes[1..3].copy_from_slice(&self.sector_size.to_le_bytes());
        bytes[3] = self.dir_mask;
        bytes[4] = self.dir_shift;
        bytes[5] = self.cluster_mask;
        bytes[6] = self.cluster_shift;
        bytes[7..9].copy_from_slice(&self.first_fat_sector.to_le_bytes());
        bytes[9] = self.fat_count;
        bytes[10] = self.root_entries;
        bytes[11..13].copy_from_slice(&self.first_data_sector.to_le_bytes());
        bytes[13..15].copy_from_slice(&self.max_cluster.to_le_bytes());
        bytes[15] = self.sectors_per_fat;
        bytes[16..18].copy_from_slice(&self.first_dir_sector.to_le_bytes());
        bytes
    }
}
