// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Context;
use std::io;
use system76_aspm::{
    address::DeviceAddress,
    aspm::AspmState,
    backup::{BackupStore, SystemClock},
    config::Config,
    enable::{enable, EnableOptions},
    lock::DeviceLocks,
    lspci::{DeviceLister, Lspci},
    patch::{Mode, PatchEngine},
    pci::SysfsPci,
    prerequisites::Prerequisites,
};

/// Enables ASPM on every PCI Express device that advertises support for it.
///
/// The configuration space of each device is saved to a backup set before
/// it is written.
#[derive(clap::Args)]
pub struct Command {
    /// Report the change for each device without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Set every device to this state (disabled, L0s, L1 or L0sL1) instead of
    /// the one it advertises
    #[arg(long, value_name = "MODE")]
    mode: Option<AspmState>,

    /// Only touch this device; may be given more than once
    #[arg(long = "device", value_name = "ADDR")]
    devices: Vec<DeviceAddress>,
}

impl Command {
    pub fn run(&self, config: &Config) -> anyhow::Result<()> {
        let mode = if self.dry_run { Mode::DryRun } else { Mode::Apply };
        Prerequisites { root: mode == Mode::Apply, tools: &["lspci"] }.check()?;

        let pci = SysfsPci::new().context("failed to open PCI sysfs")?;
        let listed = Lspci.devices().context("failed to list PCI devices")?;
        log::debug!("lspci reported {} PCI Express device(s)", listed.len());

        let mut store = BackupStore::new(&config.backup_dir, Box::new(SystemClock));
        let locks = DeviceLocks::new(&config.lock_dir);
        let mut engine = PatchEngine::new(&pci, &mut store, &locks).verify(config.verify);

        let options = EnableOptions {
            mode,
            target: self.mode,
            only: self.devices.clone(),
            exclude: config.exclude.clone(),
        };

        let stdout = io::stdout();
        let summary = enable(&listed, &mut engine, &options, &mut stdout.lock())?;
        log::info!(
            "{} patched, {} unchanged, {} planned, {} skipped, {} failed",
            summary.patched,
            summary.unchanged,
            summary.planned,
            summary.skipped,
            summary.failed
        );

        Ok(())
    }
}
