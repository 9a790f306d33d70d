// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use crate::{address::DeviceAddress, aspm::AspmState, pci::CONFIG_SPACE_LEN};
use std::{io, path::PathBuf, process};

/// Conditions that must hold before any device is touched.
#[derive(Debug, thiserror::Error)]
pub enum PrerequisiteError {
    #[error("unsupported platform: PCI configuration space access requires Linux")]
    UnsupportedPlatform,
    #[error("pci directory not found at {:?}", _0)]
    PciSysfsMissing(PathBuf),
    #[error("must be run as root")]
    NotRoot,
    #[error("required tool '{}' was not found in PATH", _0)]
    MissingTool(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid PCI address '{}': {}", _0, _1)]
    Invalid(String, &'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("failed to read configuration space of {}: {}", _0, _1)]
    Io(DeviceAddress, io::Error),
    #[error(
        "configuration space of {} is truncated: read {} bytes, need {}",
        _0,
        _1,
        CONFIG_SPACE_LEN
    )]
    Truncated(DeviceAddress, usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("PCI Express capability not found")]
    NotFound,
    #[error("capability list is corrupt at offset {:#04x}", _0)]
    ListCorrupt(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("refusing to write {} at offset {:#04x}: outside the capability region", _0, _1)]
    OutOfRange(DeviceAddress, usize),
    #[error("failed to write {:#04x} to {} at offset {:#04x}: {}", value, address, offset, why)]
    Io { address: DeviceAddress, offset: usize, value: u8, why: io::Error },
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("failed to create backup directory {:?}: {}", _0, _1)]
    CreateDir(PathBuf, io::Error),
    #[error("failed to write backup {:?}: {}", _0, _1)]
    Write(PathBuf, io::Error),
    #[error("failed to read backup {:?}: {}", _0, _1)]
    Read(PathBuf, io::Error),
    #[error("backup not found at {:?}", _0)]
    Missing(PathBuf),
    #[error("backup {:?} has no snapshot of {}", _0, _1)]
    DeviceMissing(PathBuf, DeviceAddress),
    #[error("backup {:?} is not a configuration space snapshot", _0)]
    Invalid(PathBuf),
    #[error("failed to serialize backup manifest: {}", _0)]
    Manifest(serde_json::Error),
    #[error("failed to name backup set: {}", _0)]
    Timestamp(time::error::Format),
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("failed to run lspci: {}", _0)]
    Spawn(io::Error),
    #[error("lspci exited with {}", _0)]
    ExitStatus(process::ExitStatus),
    #[error("lspci output was not valid UTF-8")]
    Utf8,
    #[error("lspci could not read the capabilities of {} device(s); run as root", _0.len())]
    AccessDenied(Vec<DeviceAddress>),
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("failed to open lock file {:?}: {}", _0, _1)]
    Open(PathBuf, io::Error),
    #[error("{} is busy: another process holds its lock", _0)]
    Busy(DeviceAddress),
    #[error("failed to lock {}: {}", _0, _1)]
    Flock(DeviceAddress, io::Error),
}

/// Reasons a single device could not be patched.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("{}", _0)]
    Read(ReadError),
    #[error("{}", _0)]
    Capability(CapabilityError),
    #[error("failed to back up before writing: {}", _0)]
    Backup(BackupError),
    #[error("{}", _0)]
    Write(WriteError),
    #[error("{}", _0)]
    Lock(LockError),
    #[error("verification failed: wrote {} but device reports {}", expected, found)]
    Verify { expected: AspmState, found: AspmState },
}

impl From<ReadError> for PatchError {
    fn from(why: ReadError) -> PatchError { PatchError::Read(why) }
}

impl From<CapabilityError> for PatchError {
    fn from(why: CapabilityError) -> PatchError { PatchError::Capability(why) }
}

impl From<BackupError> for PatchError {
    fn from(why: BackupError) -> PatchError { PatchError::Backup(why) }
}

impl From<WriteError> for PatchError {
    fn from(why: WriteError) -> PatchError { PatchError::Write(why) }
}

impl From<LockError> for PatchError {
    fn from(why: LockError) -> PatchError { PatchError::Lock(why) }
}

/// Reasons a single device could not be restored.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("{}", _0)]
    Read(ReadError),
    #[error("{}", _0)]
    Backup(BackupError),
    #[error("{}", _0)]
    Lock(LockError),
    #[error(
        "{} now reports vendor:device {:04x}:{:04x}, but the backup was taken from {:04x}:{:04x}",
        address,
        current.0,
        current.1,
        backup.0,
        backup.1
    )]
    DeviceMismatch { address: DeviceAddress, current: (u16, u16), backup: (u16, u16) },
}

impl From<ReadError> for RestoreError {
    fn from(why: ReadError) -> RestoreError { RestoreError::Read(why) }
}

impl From<BackupError> for RestoreError {
    fn from(why: BackupError) -> RestoreError { RestoreError::Backup(why) }
}

impl From<LockError> for RestoreError {
    fn from(why: LockError) -> RestoreError { RestoreError::Lock(why) }
}
