// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use crate::{
    address::DeviceAddress,
    aspm::AspmState,
    backup::{BackupStore, Reason},
    capability,
    errors::{CapabilityError, PatchError},
    lock::DeviceLocks,
    pci::{write_register, ConfigSpace, ConfigSpaceImage},
};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    DryRun,
    Apply,
}

/// A computed change to the Link Control register of one device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchPlan {
    pub device:          DeviceAddress,
    pub register_offset: usize,
    pub current_byte:    u8,
    pub desired_byte:    u8,
}

impl PatchPlan {
    pub fn current(&self) -> AspmState { AspmState::decode(self.current_byte) }

    pub fn desired(&self) -> AspmState { AspmState::decode(self.desired_byte) }
}

#[derive(Debug)]
pub enum PatchOutcome {
    Unchanged(AspmState),
    /// Dry run report of the change that would be made.
    WouldPatch(PatchPlan),
    /// `backup_set` holds the snapshot taken before the write.
    Patched { plan: PatchPlan, backup_set: PathBuf },
    Failed(PatchError),
}

/// Locates Link Control in `image` and works out the byte that selects
/// `desired`. Returns `None` when the device is already in that state.
pub fn plan(
    device: DeviceAddress,
    image: &ConfigSpaceImage,
    desired: AspmState,
) -> Result<Option<PatchPlan>, CapabilityError> {
    let cap = capability::find_pci_express(image)?;
    let register_offset = cap.link_control_offset()?;
    let current_byte = image.as_bytes()[register_offset];
    log::debug!(
        "{}: PCI Express capability at {:#04x}, link control {:#04x} ({})",
        device,
        cap.structure_offset,
        current_byte,
        AspmState::decode(current_byte)
    );

    if AspmState::decode(current_byte) == desired {
        return Ok(None);
    }

    Ok(Some(PatchPlan {
        device,
        register_offset,
        current_byte,
        desired_byte: desired.encode(current_byte),
    }))
}

pub struct PatchEngine<'a, C: ConfigSpace + ?Sized> {
    io:     &'a C,
    store:  &'a mut BackupStore,
    locks:  &'a DeviceLocks,
    verify: bool,
}

impl<'a, C: ConfigSpace + ?Sized> PatchEngine<'a, C> {
    pub fn new(io: &'a C, store: &'a mut BackupStore, locks: &'a DeviceLocks) -> Self {
        Self { io, store, locks, verify: true }
    }

    /// Re-read the register after writing and fail on a mismatch.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn apply(&mut self, device: DeviceAddress, desired: AspmState, mode: Mode) -> PatchOutcome {
        match self.try_apply(device, desired, mode) {
            Ok(outcome) => outcome,
            Err(why) => {
                log::error!("{}: {}", device, why);
                PatchOutcome::Failed(why)
            }
        }
    }

    fn try_apply(
        &mut self,
        device: DeviceAddress,
        desired: AspmState,
        mode: Mode,
    ) -> Result<PatchOutcome, PatchError> {
        let _lock = match mode {
            Mode::Apply => Some(self.locks.acquire(device)?),
            Mode::DryRun => None,
        };

        let image = self.io.read(device)?;
        let plan = match plan(device, &image, desired)? {
            Some(plan) => plan,
            None => return Ok(PatchOutcome::Unchanged(desired)),
        };

        if mode == Mode::DryRun {
            return Ok(PatchOutcome::WouldPatch(plan));
        }

        // No write may happen until the snapshot is on disk.
        let backup = self.store.save(device, &image, Reason::Enable)?;
        write_register(self.io, device, plan.register_offset, plan.desired_byte)?;

        if self.verify {
            let found = self.io.read(device)?.as_bytes()[plan.register_offset];
            let found = AspmState::decode(found);
            if found != desired {
                return Err(PatchError::Verify { expected: desired, found });
            }
        }

        log::info!("{}: ASPM changed from {} to {}", device, plan.current(), desired);
        let backup_set = backup.path.parent().map_or_else(|| backup.path.clone(), Path::to_path_buf);
        Ok(PatchOutcome::Patched { plan, backup_set })
    }
}
