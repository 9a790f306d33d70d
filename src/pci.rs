// Copyright 2018-2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use crate::{
    address::DeviceAddress,
    errors::{ReadError, WriteError},
};
use std::{
    fs::{self, OpenOptions},
    io,
    ops::RangeInclusive,
    os::unix::fs::FileExt,
    path::PathBuf,
};

pub const SYSFS_DEVICES: &str = "/sys/bus/pci/devices";

/// Size of the conventional configuration space that every image must cover.
pub const CONFIG_SPACE_LEN: usize = 256;

/// Offsets that may be written. The base header below 0x40 is never touched.
pub const WRITABLE: RangeInclusive<usize> = 0x40..=0xFF;

/// Raw configuration space of one device at one instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigSpaceImage(Vec<u8>);

impl ConfigSpaceImage {
    pub fn from_bytes(device: DeviceAddress, bytes: Vec<u8>) -> Result<Self, ReadError> {
        if bytes.len() < CONFIG_SPACE_LEN {
            return Err(ReadError::Truncated(device, bytes.len()));
        }

        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    pub fn byte(&self, offset: usize) -> Option<u8> { self.0.get(offset).copied() }

    pub fn vendor_device(&self) -> (u16, u16) {
        let b = &self.0;
        (u16::from_le_bytes([b[0], b[1]]), u16::from_le_bytes([b[2], b[3]]))
    }
}

/// Raw access to device configuration space.
pub trait ConfigSpace {
    fn read(&self, device: DeviceAddress) -> Result<ConfigSpaceImage, ReadError>;

    /// Writes a single byte. Callers go through [`write_register`], which
    /// guards the offset.
    fn write_byte(&self, device: DeviceAddress, offset: usize, value: u8) -> Result<(), WriteError>;
}

/// Writes one byte, refusing any offset outside [`WRITABLE`].
pub fn write_register<C: ConfigSpace + ?Sized>(
    io: &C,
    device: DeviceAddress,
    offset: usize,
    value: u8,
) -> Result<(), WriteError> {
    if !WRITABLE.contains(&offset) {
        return Err(WriteError::OutOfRange(device, offset));
    }

    log::debug!("{}: writing {:#04x} at offset {:#04x}", device, value, offset);
    io.write_byte(device, offset, value)
}

/// Configuration space exposed by the kernel under `/sys/bus/pci/devices`.
pub struct SysfsPci {
    path: PathBuf,
}

impl SysfsPci {
    pub fn new() -> io::Result<Self> { Self::with_path(SYSFS_DEVICES) }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> io::Result<Self> {
        let path = path.into();
        if path.is_dir() {
            Ok(Self { path })
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "pci directory not found"))
        }
    }

    fn config(&self, device: DeviceAddress) -> PathBuf {
        self.path.join(device.to_string()).join("config")
    }
}

impl ConfigSpace for SysfsPci {
    fn read(&self, device: DeviceAddress) -> Result<ConfigSpaceImage, ReadError> {
        // Unprivileged reads of this file stop after the 64 byte header.
        let bytes = fs::read(self.config(device)).map_err(|why| ReadError::Io(device, why))?;
        ConfigSpaceImage::from_bytes(device, bytes)
    }

    fn write_byte(&self, device: DeviceAddress, offset: usize, value: u8) -> Result<(), WriteError> {
        let io_error = |why| WriteError::Io { address: device, offset, value, why };

        let file = OpenOptions::new().write(true).open(self.config(device)).map_err(io_error)?;
        match file.write_at(&[value], offset as u64).map_err(io_error)? {
            1 => Ok(()),
            _ => Err(io_error(io::Error::new(io::ErrorKind::WriteZero, "short write"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::addr;

    fn fake_sysfs(bytes: &[u8]) -> (tempfile::TempDir, SysfsPci) {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("0000:00:1c.0");
        fs::create_dir(&device).unwrap();
        fs::write(device.join("config"), bytes).unwrap();
        let pci = SysfsPci::with_path(dir.path()).unwrap();
        (dir, pci)
    }

    #[test]
    fn sysfs_read_and_write() {
        let (_dir, pci) = fake_sysfs(&[0u8; 256]);
        let device = addr("0000:00:1c.0");

        write_register(&pci, device, 0x70, 0x43).unwrap();
        let image = pci.read(device).unwrap();
        assert_eq!(image.byte(0x70), Some(0x43));
        assert_eq!(image.as_bytes().iter().filter(|&&b| b != 0).count(), 1);
    }

    #[test]
    fn unprivileged_read_is_truncated() {
        let (_dir, pci) = fake_sysfs(&[0u8; 64]);
        match pci.read(addr("0000:00:1c.0")) {
            Err(ReadError::Truncated(_, 64)) => (),
            other => panic!("expected truncated read, got {:?}", other),
        }
    }

    #[test]
    fn missing_device_is_read_error() {
        let (_dir, pci) = fake_sysfs(&[0u8; 256]);
        assert!(matches!(pci.read(addr("0000:03:00.0")), Err(ReadError::Io(..))));
    }

    #[test]
    fn header_writes_are_refused() {
        let (_dir, pci) = fake_sysfs(&[0u8; 256]);
        let device = addr("0000:00:1c.0");
        for offset in [0x00, 0x04, 0x3f, 0x100] {
            assert!(matches!(
                write_register(&pci, device, offset, 0xff),
                Err(WriteError::OutOfRange(_, o)) if o == offset
            ));
        }
        assert!(pci.read(device).unwrap().as_bytes().iter().all(|&b| b == 0));
    }
}
