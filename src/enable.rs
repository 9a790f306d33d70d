// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use crate::{
    address::DeviceAddress,
    aspm::AspmState,
    lspci::ListedDevice,
    patch::{Mode, PatchEngine, PatchOutcome},
    pci::ConfigSpace,
};
use std::io::{self, Write};

pub struct EnableOptions {
    pub mode:    Mode,
    /// Target for every device. When unset, each device gets the state it
    /// advertises.
    pub target:  Option<AspmState>,
    /// Restricts the run to these devices when non-empty.
    pub only:    Vec<DeviceAddress>,
    pub exclude: Vec<DeviceAddress>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub unchanged: usize,
    pub patched:   usize,
    pub planned:   usize,
    pub skipped:   usize,
    pub failed:    usize,
}

/// Patches every listed device in turn, writing one line per device to
/// `out`. Per-device failures are reported and the run continues.
pub fn enable<C: ConfigSpace + ?Sized, W: Write>(
    listed: &[ListedDevice],
    engine: &mut PatchEngine<C>,
    options: &EnableOptions,
    out: &mut W,
) -> io::Result<Summary> {
    let mut summary = Summary::default();

    for device in listed {
        let address = device.address;
        if !options.only.is_empty() && !options.only.contains(&address) {
            continue;
        }

        if options.exclude.contains(&address) {
            log::info!("{}: excluded by configuration", address);
            summary.skipped += 1;
            continue;
        }

        let desired = match options.target {
            Some(target) => target,
            None => match AspmState::parse(&device.advertised) {
                AspmState::Disabled => {
                    writeln!(out, "{}: ASPM not advertised ({}), skipping", address, device.advertised)?;
                    summary.skipped += 1;
                    continue;
                }
                advertised => advertised,
            },
        };

        match (options.mode, engine.apply(address, desired, options.mode)) {
            (_, PatchOutcome::WouldPatch(plan)) => {
                writeln!(out, "{}: would set ASPM to {} (currently {})", address, desired, plan.current())?;
                summary.planned += 1;
            }
            (Mode::DryRun, PatchOutcome::Unchanged(current)) => {
                writeln!(out, "{}: would set ASPM to {} (currently {}, no change)", address, desired, current)?;
                summary.unchanged += 1;
            }
            (Mode::DryRun, PatchOutcome::Failed(why)) => {
                writeln!(
                    out,
                    "{}: would set ASPM to {} (unable to read current state: {})",
                    address, desired, why
                )?;
                summary.failed += 1;
            }
            (_, PatchOutcome::Unchanged(current)) => {
                writeln!(out, "{}: ASPM already {}", address, current)?;
                summary.unchanged += 1;
            }
            (_, PatchOutcome::Patched { plan, backup_set }) => {
                writeln!(
                    out,
                    "{}: ASPM set to {} (was {}), backup in {}",
                    address,
                    desired,
                    plan.current(),
                    backup_set.display()
                )?;
                summary.patched += 1;
            }
            (_, PatchOutcome::Failed(why)) => {
                writeln!(out, "{}: failed: {}", address, why)?;
                summary.failed += 1;
            }
        }
    }

    for &address in &options.only {
        if !listed.iter().any(|device| device.address == address) {
            log::warn!("{}: requested, but lspci does not list it as a PCI Express device", address);
            writeln!(out, "{}: not listed by lspci, skipping", address)?;
            summary.skipped += 1;
        }
    }

    Ok(summary)
}
