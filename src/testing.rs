// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

//! Fakes shared by the unit tests.

use crate::{
    address::DeviceAddress,
    backup::Clock,
    errors::{ReadError, WriteError},
    pci::{ConfigSpace, ConfigSpaceImage, CONFIG_SPACE_LEN},
    util::entries,
};
use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    io,
    path::{Path, PathBuf},
};
use time::OffsetDateTime;

pub fn addr(text: &str) -> DeviceAddress { text.parse().unwrap() }

pub fn bytes_with(pairs: &[(usize, u8)]) -> Vec<u8> {
    let mut bytes = vec![0u8; CONFIG_SPACE_LEN];
    for &(offset, value) in pairs {
        bytes[offset] = value;
    }
    bytes
}

pub fn image_with(device: DeviceAddress, pairs: &[(usize, u8)]) -> ConfigSpaceImage {
    ConfigSpaceImage::from_bytes(device, bytes_with(pairs)).unwrap()
}

/// An Intel device whose PCI Express capability sits at 0x60, making the
/// low byte of Link Control offset 0x70.
pub fn pcie_bytes(link_control: u8) -> Vec<u8> {
    bytes_with(&[(0x00, 0x86), (0x01, 0x80), (0x34, 0x60), (0x60, 0x10), (0x70, link_control)])
}

pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime { self.0 }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Read(DeviceAddress),
    Write {
        device:    DeviceAddress,
        offset:    usize,
        value:     u8,
        /// Whether a snapshot of the device existed on disk when the write
        /// was issued.
        backed_up: bool,
    },
}

/// In-memory configuration space that records every access.
#[derive(Default)]
pub struct FakePci {
    devices:     RefCell<HashMap<DeviceAddress, Vec<u8>>>,
    read_only:   HashSet<(DeviceAddress, usize)>,
    unreadable:  HashSet<DeviceAddress>,
    backup_root: Option<PathBuf>,
    drop_writes: bool,
    pub calls:   RefCell<Vec<Call>>,
}

impl FakePci {
    pub fn new() -> Self { Self::default() }

    pub fn with_device(self, device: DeviceAddress, bytes: Vec<u8>) -> Self {
        self.devices.borrow_mut().insert(device, bytes);
        self
    }

    pub fn read_only(mut self, device: DeviceAddress, offset: usize) -> Self {
        self.read_only.insert((device, offset));
        self
    }

    pub fn unreadable(mut self, device: DeviceAddress) -> Self {
        self.unreadable.insert(device);
        self
    }

    /// Accepts writes without changing anything, like a locked register.
    pub fn dropping_writes(mut self) -> Self {
        self.drop_writes = true;
        self
    }

    pub fn watching_backups(mut self, root: &Path) -> Self {
        self.backup_root = Some(root.to_path_buf());
        self
    }

    pub fn byte(&self, device: DeviceAddress, offset: usize) -> u8 {
        self.devices.borrow()[&device][offset]
    }

    pub fn set_byte(&self, device: DeviceAddress, offset: usize, value: u8) {
        self.devices.borrow_mut().get_mut(&device).unwrap()[offset] = value;
    }

    pub fn writes(&self) -> Vec<(DeviceAddress, usize, u8)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match *call {
                Call::Write { device, offset, value, .. } => Some((device, offset, value)),
                Call::Read(_) => None,
            })
            .collect()
    }

    fn snapshot_exists(&self, device: DeviceAddress) -> bool {
        let root = match self.backup_root {
            Some(ref root) => root,
            None => return false,
        };

        entries(root)
            .unwrap_or_default()
            .iter()
            .any(|(_, set)| set.join(device.file_name()).is_file())
    }
}

impl ConfigSpace for FakePci {
    fn read(&self, device: DeviceAddress) -> Result<ConfigSpaceImage, ReadError> {
        self.calls.borrow_mut().push(Call::Read(device));
        if self.unreadable.contains(&device) {
            return Err(ReadError::Io(device, io::Error::from(io::ErrorKind::PermissionDenied)));
        }

        match self.devices.borrow().get(&device) {
            Some(bytes) => ConfigSpaceImage::from_bytes(device, bytes.clone()),
            None => Err(ReadError::Io(device, io::Error::from(io::ErrorKind::NotFound))),
        }
    }

    fn write_byte(&self, device: DeviceAddress, offset: usize, value: u8) -> Result<(), WriteError> {
        let backed_up = self.snapshot_exists(device);
        self.calls.borrow_mut().push(Call::Write { device, offset, value, backed_up });

        if self.read_only.contains(&(device, offset)) {
            let why = io::Error::new(io::ErrorKind::PermissionDenied, "read-only register");
            return Err(WriteError::Io { address: device, offset, value, why });
        }

        if !self.drop_writes {
            self.set_byte(device, offset, value);
        }

        Ok(())
    }
}
