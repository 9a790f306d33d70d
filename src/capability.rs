// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

//! Walks the standard capability list of a configuration space image.
//!
//! The list head lives at offset 0x34. Each node starts with a one byte
//! capability id followed by a one byte pointer to the next node, and a
//! pointer of zero terminates the list. The contents come from hardware and
//! are not trusted: the walk is bounded and rejects loops and pointers into
//! the base header.

use crate::{errors::CapabilityError, pci::ConfigSpaceImage};

pub const CAPABILITY_LIST_POINTER: usize = 0x34;
pub const PCI_EXPRESS_CAPABILITY_ID: u8 = 0x10;
pub const LINK_CONTROL: usize = 0x10;

/// 192 bytes of capability region over a minimum node size of 4 bytes.
const MAX_NODES: usize = 48;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capability {
    pub id:               u8,
    pub structure_offset: usize,
}

/// Finds the PCI Express capability structure.
pub fn find_pci_express(image: &ConfigSpaceImage) -> Result<Capability, CapabilityError> {
    find(image, PCI_EXPRESS_CAPABILITY_ID)
}

pub fn find(image: &ConfigSpaceImage, id: u8) -> Result<Capability, CapabilityError> {
    let bytes = image.as_bytes();
    let mut visited = [false; 256];
    let mut pos = usize::from(bytes[CAPABILITY_LIST_POINTER]);

    for _ in 0..MAX_NODES {
        if pos == 0 {
            return Err(CapabilityError::NotFound);
        }

        if pos < 0x40 || pos + 1 >= bytes.len() || visited[pos] {
            return Err(CapabilityError::ListCorrupt(pos));
        }
        visited[pos] = true;

        if bytes[pos] == id {
            return Ok(Capability { id, structure_offset: pos });
        }

        pos = usize::from(bytes[pos + 1]);
    }

    Err(CapabilityError::ListCorrupt(pos))
}

impl Capability {
    /// Offset of the low byte of the Link Control register.
    pub fn link_control_offset(&self) -> Result<usize, CapabilityError> {
        let offset = self.structure_offset + LINK_CONTROL;
        if offset > 0xFF {
            return Err(CapabilityError::ListCorrupt(self.structure_offset));
        }

        Ok(offset)
    }
}
