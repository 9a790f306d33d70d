// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

//! Per-device advisory locks, so that two processes never interleave
//! read-modify-write cycles on the configuration space of one device.

use crate::{address::DeviceAddress, errors::LockError};
use std::{
    fs::{self, File, OpenOptions},
    io,
    os::unix::io::AsRawFd,
    path::PathBuf,
};

pub struct DeviceLocks {
    dir: PathBuf,
}

/// Held until dropped; closing the file releases the lock.
#[derive(Debug)]
pub struct DeviceLock {
    _file: File,
}

impl DeviceLocks {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self { Self { dir: dir.into() } }

    /// Takes the lock for `device` without waiting. A lock held elsewhere
    /// yields [`LockError::Busy`].
    pub fn acquire(&self, device: DeviceAddress) -> Result<DeviceLock, LockError> {
        let path = self.dir.join(format!("{}.lock", device.file_name()));
        fs::create_dir_all(&self.dir).map_err(|why| LockError::Open(self.dir.clone(), why))?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|why| LockError::Open(path, why))?;

        if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            let why = io::Error::last_os_error();
            return Err(match why.kind() {
                io::ErrorKind::WouldBlock => LockError::Busy(device),
                _ => LockError::Flock(device, why),
            });
        }

        log::debug!("{}: acquired device lock", device);
        Ok(DeviceLock { _file: file })
    }
}
