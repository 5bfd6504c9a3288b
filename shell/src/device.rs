//! Opens or creates the host file backing a FAT32 image for the shell.

use std::path::Path;

use anyhow::Result;
use fat32::{FileDevice, DEFAULT_DISK_SIZE};

/// Whether an image already existed on disk, or had to be created fresh.
pub enum Opened {
    Existing(FileDevice),
    Created(FileDevice),
}

/// Open `path` if it exists, otherwise create it at `DEFAULT_DISK_SIZE` bytes.
pub fn open_or_create(path: &Path) -> Result<Opened> {
    if path.exists() {
        Ok(Opened::Existing(FileDevice::open(path)?))
    } else {
        Ok(Opened::Created(FileDevice::create(path, DEFAULT_DISK_SIZE)?))
    }
}
