// Copyright 2018-2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use crate::address::DeviceAddress;
use serde::Deserialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const DEFAULT: &str = "/etc/system76-aspm/config.toml";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where backup sets are written.
    pub backup_dir: PathBuf,
    /// Where per-device lock files live.
    pub lock_dir:   PathBuf,
    /// Re-read Link Control after every write.
    pub verify:     bool,
    /// Devices that are never patched.
    pub exclude:    Vec<DeviceAddress>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("/var/lib/system76-aspm/backups"),
            lock_dir:   PathBuf::from("/run/system76-aspm"),
            verify:     true,
            exclude:    Vec::new(),
        }
    }
}

impl Config {
    /// Loads `path` when given. Otherwise the system config is read if it
    /// exists, falling back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None if Path::new(DEFAULT).exists() => Self::from_path(Path::new(DEFAULT)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        fs::read_to_string(path)
            .map_err(|error| ConfigError::Read(path.to_path_buf(), error))
            .and_then(|ref data| {
                toml::from_str::<Self>(data).map_err(|error| ConfigError::Parse(path.to_path_buf(), error))
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config file at {:?}: {}", _0, _1)]
    Read(PathBuf, io::Error),
    #[error("failed to parse config at {:?}: {}", _0, _1)]
    Parse(PathBuf, toml::de::Error),
}
