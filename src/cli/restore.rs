// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Context;
use std::path::PathBuf;
use system76_aspm::{
    address::DeviceAddress,
    backup::{BackupStore, SystemClock},
    config::Config,
    lock::DeviceLocks,
    pci::SysfsPci,
    prerequisites::Prerequisites,
    restore::{select, RestoreEngine, RestoreOutcome, StdinConfirm},
};

/// Writes backed-up capability registers back to their devices.
///
/// Only offsets 0x40 through 0xff are restored. The current state of each
/// device is saved to a new backup set first.
#[derive(clap::Args)]
pub struct Command {
    /// Backup set directory, or a single device file inside one
    path: PathBuf,

    /// Restore only this device from the set
    #[arg(long, value_name = "ADDR")]
    device: Option<DeviceAddress>,

    /// Do not ask for confirmation
    #[arg(long)]
    force: bool,
}

impl Command {
    pub fn run(&self, config: &Config) -> anyhow::Result<()> {
        Prerequisites { root: true, tools: &[] }.check()?;

        let snapshots = BackupStore::open(&self.path)
            .and_then(|snapshots| select(&self.path, snapshots, self.device))
            .with_context(|| format!("cannot restore from {}", self.path.display()))?;

        let pci = SysfsPci::new().context("failed to open PCI sysfs")?;
        let mut store = BackupStore::new(&config.backup_dir, Box::new(SystemClock));
        let locks = DeviceLocks::new(&config.lock_dir);
        let mut confirm = StdinConfirm;
        let mut engine = RestoreEngine::new(&pci, &mut store, &locks, &mut confirm);

        for snapshot in snapshots {
            let device = snapshot.device;
            match engine.restore_snapshot(snapshot, self.force) {
                RestoreOutcome::Restored { written: 0, failed: 0, .. } => {
                    println!("{}: already matches the backup", device);
                }
                RestoreOutcome::Restored { written, failed, snapshot: saved } => {
                    print!("{}: restored {} register(s)", device, written);
                    if failed > 0 {
                        print!(", {} failed", failed);
                    }
                    match saved {
                        Some(set) => println!(", previous state saved in {}", set.display()),
                        None => println!(),
                    }
                }
                RestoreOutcome::Aborted => println!("{}: restore aborted", device),
                RestoreOutcome::Failed(why) => println!("{}: restore failed: {}", device, why),
            }
        }

        Ok(())
    }
}
