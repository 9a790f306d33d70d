// Copyright 2018-2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

//! Enables PCIe Active State Power Management by rewriting the ASPM Control
//! field of each device's Link Control register, after saving a snapshot of
//! the device's configuration space that can be restored later.

#![deny(clippy::all)]
#![deny(unused_imports)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod address;
pub mod aspm;
pub mod backup;
pub mod capability;
pub mod config;
pub mod enable;
pub mod errors;
pub mod lock;
pub mod logging;
pub mod lspci;
pub mod patch;
pub mod pci;
pub mod prerequisites;
pub mod restore;
pub mod util;

#[cfg(test)]
mod testing;
