// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use crate::{errors::PrerequisiteError, pci::SYSFS_DEVICES};
use std::{env, ffi::OsStr, path::Path};

/// What a command needs from the system before it may touch any device.
pub struct Prerequisites {
    pub root:  bool,
    pub tools: &'static [&'static str],
}

impl Prerequisites {
    pub fn check(&self) -> Result<(), PrerequisiteError> {
        if !cfg!(target_os = "linux") {
            return Err(PrerequisiteError::UnsupportedPlatform);
        }

        if let Some(tool) = missing_tool(self.tools, env::var_os("PATH")) {
            return Err(PrerequisiteError::MissingTool(tool));
        }

        if !Path::new(SYSFS_DEVICES).is_dir() {
            return Err(PrerequisiteError::PciSysfsMissing(SYSFS_DEVICES.into()));
        }

        if self.root && unsafe { libc::geteuid() } != 0 {
            return Err(PrerequisiteError::NotRoot);
        }

        Ok(())
    }
}

/// The first of `tools` with no executable in `paths`.
fn missing_tool<P: AsRef<OsStr>>(tools: &[&'static str], paths: Option<P>) -> Option<&'static str> {
    tools.iter().copied().find(|tool| which::which_in(tool, paths.as_ref(), "/").is_err())
}
