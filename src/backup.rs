// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

//! Snapshots of device configuration space, grouped into backup sets.
//!
//! A backup set is a directory named after the UTC time of the run that
//! created it. It holds one raw dump per device, named by
//! [`DeviceAddress::file_name`], and a `manifest.json` describing why each
//! snapshot was taken.

use crate::{
    address::DeviceAddress,
    errors::BackupError,
    pci::ConfigSpaceImage,
    util::{entries, sync_dir, write_durable},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};
use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

const MANIFEST: &str = "manifest.json";

/// Backup set directory names, before any collision suffix.
const SET_NAME: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]-[hour][minute][second]");

/// Source of the timestamp that names a backup set.
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime { OffsetDateTime::now_utc() }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    Enable,
    PreRestore,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Reason::Enable => "enable",
            Reason::PreRestore => "pre-restore",
        })
    }
}

/// A stored snapshot of one device.
#[derive(Clone, Debug)]
pub struct BackupEntry {
    pub device:    DeviceAddress,
    pub timestamp: OffsetDateTime,
    pub image:     ConfigSpaceImage,
    pub path:      PathBuf,
}

/// One device file of a backup set, loaded or not.
#[derive(Debug)]
pub struct Snapshot {
    pub device: DeviceAddress,
    pub entry:  Result<BackupEntry, BackupError>,
}

#[derive(Clone, Debug)]
pub struct BackupSetSummary {
    pub path:      PathBuf,
    pub timestamp: OffsetDateTime,
    pub devices:   usize,
    pub reason:    Option<Reason>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Manifest {
    #[serde(with = "time::serde::rfc3339")]
    created: OffsetDateTime,
    version: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ManifestEntry {
    device: String,
    file:   String,
    reason: Reason,
}

struct ActiveSet {
    path:     PathBuf,
    manifest: Manifest,
}

pub struct BackupStore {
    root:   PathBuf,
    clock:  Box<dyn Clock>,
    active: Option<ActiveSet>,
}

impl BackupStore {
    pub fn new<P: Into<PathBuf>>(root: P, clock: Box<dyn Clock>) -> Self {
        Self { root: root.into(), clock, active: None }
    }

    pub fn root(&self) -> &Path { &self.root }

    /// The set written by this invocation, if anything has been saved yet.
    pub fn current_set(&self) -> Option<&Path> { self.active.as_ref().map(|set| set.path.as_path()) }

    /// Persists the full image of `device` into this invocation's backup set.
    ///
    /// The data is synced to disk before this returns. Saving a device that
    /// already has a snapshot in the set keeps the earlier snapshot.
    pub fn save(
        &mut self,
        device: DeviceAddress,
        image: &ConfigSpaceImage,
        reason: Reason,
    ) -> Result<BackupEntry, BackupError> {
        let set = self.active_set()?;
        let timestamp = set.manifest.created;
        let name = device.file_name();
        let path = set.path.join(&name);

        if path.exists() {
            log::debug!("{}: keeping existing snapshot {}", device, path.display());
            return load_entry(&path, device, timestamp);
        }

        write_durable(&path, image.as_bytes()).map_err(|why| BackupError::Write(path.clone(), why))?;

        set.manifest.entries.push(ManifestEntry { device: device.to_string(), file: name, reason });
        let manifest = serde_json::to_vec_pretty(&set.manifest).map_err(BackupError::Manifest)?;
        let staging = set.path.join(".manifest.json.tmp");
        let manifest_path = set.path.join(MANIFEST);
        write_durable(&staging, &manifest)
            .and_then(|()| fs::rename(&staging, &manifest_path))
            .and_then(|()| sync_dir(&set.path))
            .map_err(|why| BackupError::Write(manifest_path, why))?;

        log::info!("{}: saved configuration space to {}", device, path.display());
        Ok(BackupEntry { device, timestamp, image: image.clone(), path })
    }

    fn active_set(&mut self) -> Result<&mut ActiveSet, BackupError> {
        let set = match self.active.take() {
            Some(set) => set,
            None => self.create_set()?,
        };

        Ok(self.active.insert(set))
    }

    fn create_set(&self) -> Result<ActiveSet, BackupError> {
        let created = self.clock.now();
        fs::create_dir_all(&self.root).map_err(|why| BackupError::CreateDir(self.root.clone(), why))?;

        let base = set_name(created)?;
        let mut path = self.root.join(&base);
        let mut collision = 0;
        loop {
            match fs::create_dir(&path) {
                Ok(()) => break,
                Err(why) if why.kind() == io::ErrorKind::AlreadyExists => {
                    collision += 1;
                    path = self.root.join(format!("{}-{}", base, collision));
                }
                Err(why) => return Err(BackupError::CreateDir(path, why)),
            }
        }

        sync_dir(&self.root).map_err(|why| BackupError::CreateDir(path.clone(), why))?;
        log::debug!("created backup set {}", path.display());

        Ok(ActiveSet {
            path,
            manifest: Manifest {
                created,
                version: env!("CARGO_PKG_VERSION").into(),
                entries: Vec::new(),
            },
        })
    }

    /// Backup sets under the root, oldest first. Sets are summarized as the
    /// iterator advances.
    pub fn list(
        &self,
    ) -> Result<impl Iterator<Item = Result<BackupSetSummary, BackupError>>, BackupError> {
        let mut sets: Vec<(OffsetDateTime, PathBuf)> = match entries(&self.root) {
            Ok(entries) => entries
                .into_iter()
                .filter(|(_, path)| path.is_dir())
                .filter_map(|(name, path)| parse_set_name(&name).map(|timestamp| (timestamp, path)))
                .collect(),
            Err(ref why) if why.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(why) => return Err(BackupError::Read(self.root.clone(), why)),
        };

        sets.sort();

        Ok(sets.into_iter().map(|(timestamp, path)| summarize(path, timestamp)))
    }

    /// Loads the snapshots at `path`, which is either a backup set directory
    /// or a single device file inside one.
    ///
    /// Only a missing or unnamed `path` fails as a whole. A device file that
    /// cannot be loaded is returned as a failed [`Snapshot`] next to the rest.
    pub fn open(path: &Path) -> Result<Vec<Snapshot>, BackupError> {
        let metadata = fs::metadata(path).map_err(|why| match why.kind() {
            io::ErrorKind::NotFound => BackupError::Missing(path.to_path_buf()),
            _ => BackupError::Read(path.to_path_buf(), why),
        })?;

        if !metadata.is_dir() {
            let name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
            let device = DeviceAddress::from_file_name(name)
                .map_err(|_| BackupError::Invalid(path.to_path_buf()))?;
            let set = path.parent().unwrap_or_else(|| Path::new("."));
            let entry = load_entry(path, device, set_timestamp(set)?);
            return Ok(vec![Snapshot { device, entry }]);
        }

        let timestamp = set_timestamp(path)?;
        let mut loaded = Vec::new();
        for (name, file) in entries(path).map_err(|why| BackupError::Read(path.to_path_buf(), why))? {
            if let Ok(device) = DeviceAddress::from_file_name(&name) {
                loaded.push(Snapshot { device, entry: load_entry(&file, device, timestamp) });
            }
        }

        loaded.sort_by_key(|snapshot| snapshot.device);
        Ok(loaded)
    }
}

fn set_name(timestamp: OffsetDateTime) -> Result<String, BackupError> {
    timestamp.format(SET_NAME).map_err(BackupError::Timestamp)
}

/// Accepts `YYYYMMDD-HHMMSS` with an optional `-N` collision suffix.
fn parse_set_name(name: &str) -> Option<OffsetDateTime> {
    let stamp = name.get(..15)?;
    let suffix = name.get(15..)?;
    let collision = suffix.strip_prefix('-');
    if !suffix.is_empty() && !collision.is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    PrimitiveDateTime::parse(stamp, SET_NAME)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn read_manifest(set: &Path) -> Option<Manifest> {
    let data = fs::read(set.join(MANIFEST)).ok()?;
    match serde_json::from_slice(&data) {
        Ok(manifest) => Some(manifest),
        Err(why) => {
            log::warn!("{}: ignoring unreadable manifest: {}", set.display(), why);
            None
        }
    }
}

fn set_timestamp(set: &Path) -> Result<OffsetDateTime, BackupError> {
    set.file_name()
        .and_then(|name| name.to_str())
        .and_then(parse_set_name)
        .or_else(|| read_manifest(set).map(|manifest| manifest.created))
        .ok_or_else(|| BackupError::Invalid(set.to_path_buf()))
}

fn summarize(path: PathBuf, timestamp: OffsetDateTime) -> Result<BackupSetSummary, BackupError> {
    let devices = entries(&path)
        .map_err(|why| BackupError::Read(path.clone(), why))?
        .iter()
        .filter(|(name, _)| DeviceAddress::from_file_name(name).is_ok())
        .count();

    let reason = read_manifest(&path).and_then(|manifest| manifest.entries.first().map(|e| e.reason));

    Ok(BackupSetSummary { path, timestamp, devices, reason })
}

fn load_entry(
    path: &Path,
    device: DeviceAddress,
    timestamp: OffsetDateTime,
) -> Result<BackupEntry, BackupError> {
    let bytes = fs::read(path).map_err(|why| BackupError::Read(path.to_path_buf(), why))?;
    let image = ConfigSpaceImage::from_bytes(device, bytes)
        .map_err(|_| BackupError::Invalid(path.to_path_buf()))?;

    Ok(BackupEntry { device, timestamp, image, path: path.to_path_buf() })
}
