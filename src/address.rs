// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use crate::errors::AddressError;
use serde::Deserialize;
use std::{fmt, num::ParseIntError, str::FromStr};

/// A PCI function address in `domain:bus:device.function` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct DeviceAddress {
    domain:   u16,
    bus:      u8,
    device:   u8,
    function: u8,
}

impl DeviceAddress {
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, AddressError> {
        let addr = format!("{:04x}:{:02x}:{:02x}.{:x}", domain, bus, device, function);
        if device > 0x1f {
            return Err(AddressError::Invalid(addr, "device number exceeds 0x1f"));
        }

        if function > 7 {
            return Err(AddressError::Invalid(addr, "function number exceeds 7"));
        }

        Ok(Self { domain, bus, device, function })
    }

    /// File name for this device inside a backup set.
    pub fn file_name(&self) -> String { self.to_string().replace(':', "_") }

    pub fn from_file_name(name: &str) -> Result<Self, AddressError> {
        if name.contains(':') {
            return Err(AddressError::Invalid(name.into(), "file names never contain ':'"));
        }

        name.replace('_', ":").parse()
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04x}:{:02x}:{:02x}.{:x}", self.domain, self.bus, self.device, self.function)
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |why| AddressError::Invalid(input.into(), why);

        let (rest, function) = input.rsplit_once('.').ok_or_else(|| invalid("missing '.'"))?;
        let mut fields = rest.split(':').rev();
        let device = fields.next().ok_or_else(|| invalid("missing device"))?;
        let bus = fields.next().ok_or_else(|| invalid("missing bus"))?;
        let domain = fields.next().unwrap_or("0000");
        if fields.next().is_some() {
            return Err(invalid("too many ':' separators"));
        }

        let domain = hex(domain, 4, u16::from_str_radix).ok_or_else(|| invalid("bad domain"))?;
        let bus = hex(bus, 2, u8::from_str_radix).ok_or_else(|| invalid("bad bus"))?;
        let device = hex(device, 2, u8::from_str_radix).ok_or_else(|| invalid("bad device"))?;
        let function = hex(function, 1, u8::from_str_radix).ok_or_else(|| invalid("bad function"))?;

        DeviceAddress::new(domain, bus, device, function)
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = AddressError;

    fn try_from(input: String) -> Result<Self, Self::Error> { input.parse() }
}

/// Parses a hex field of at most `width` digits. Signs are not digits.
fn hex<T>(field: &str, width: usize, parse: fn(&str, u32) -> Result<T, ParseIntError>) -> Option<T> {
    if field.is_empty() || field.len() > width || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    parse(field, 16).ok()
}
