// Copyright 2018-2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Entries of a directory as `(file name, path)` pairs. Names that are not
/// valid UTF-8 are skipped.
pub fn entries(path: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut ret = Vec::new();
    for entry_res in path.read_dir()? {
        let entry = entry_res?;
        if let Ok(name) = entry.file_name().into_string() {
            ret.push((name, entry.path()));
        }
    }

    Ok(ret)
}

/// Writes a file and flushes it to the storage device before returning.
pub fn write_durable(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Flushes directory metadata so that newly created entries survive a crash.
pub fn sync_dir(path: &Path) -> io::Result<()> { fs::File::open(path)?.sync_all() }
