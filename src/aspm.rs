// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use std::{fmt, str::FromStr};

/// ASPM Control, bits 1:0 of the Link Control register.
const ASPM_MASK: u8 = 0b11;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AspmState {
    Disabled = 0,
    L0s = 1,
    L1 = 2,
    L0sAndL1 = 3,
}

impl AspmState {
    pub const ALL: [AspmState; 4] =
        [AspmState::Disabled, AspmState::L0s, AspmState::L1, AspmState::L0sAndL1];

    pub fn decode(link_control: u8) -> Self {
        match link_control & ASPM_MASK {
            0 => AspmState::Disabled,
            1 => AspmState::L0s,
            2 => AspmState::L1,
            _ => AspmState::L0sAndL1,
        }
    }

    /// Replaces the ASPM bits of `link_control`, keeping bits 7:2 intact.
    pub fn encode(self, link_control: u8) -> u8 { (link_control & !ASPM_MASK) | self as u8 }

    pub fn name(self) -> &'static str {
        match self {
            AspmState::Disabled => "DISABLED",
            AspmState::L0s => "L0s",
            AspmState::L1 => "L1",
            AspmState::L0sAndL1 => "L0sL1",
        }
    }

    /// Interprets the free text a device lister advertises for a device.
    ///
    /// Unrecognized text is treated as `Disabled` and reported with a warning.
    /// A device advertising a format this does not anticipate will therefore
    /// be skipped rather than patched.
    pub fn parse(text: &str) -> Self {
        match text {
            "L0s" => AspmState::L0s,
            "L1" => AspmState::L1,
            _ if text.contains("L0s") && text.contains("L1") => AspmState::L0sAndL1,
            "DISABLED" | "Disabled" | "not supported" => AspmState::Disabled,
            _ => {
                log::warn!("unrecognized ASPM mode '{}', treating it as {}", text, AspmState::Disabled);
                AspmState::Disabled
            }
        }
    }
}

impl fmt::Display for AspmState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { f.write_str(self.name()) }
}

/// Strict parsing for user supplied modes.
impl FromStr for AspmState {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(AspmState::Disabled),
            "l0s" => Ok(AspmState::L0s),
            "l1" => Ok(AspmState::L1),
            "l0sl1" | "l0s+l1" | "l0s,l1" => Ok(AspmState::L0sAndL1),
            _ => Err(format!("unknown ASPM mode '{}': expected disabled, L0s, L1 or L0sL1", input)),
        }
    }
}
