use crate::{address::DeviceAddress, errors::ListError};
use std::process::{Command, Stdio};

/// A device reported by a lister, with the ASPM support it claims.
///
/// `advertised` is free text from a human oriented tool. It is only used to
/// pick a target state; the current state is always read from the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedDevice {
    pub address:    DeviceAddress,
    pub advertised: String,
}

pub trait DeviceLister {
    fn devices(&self) -> Result<Vec<ListedDevice>, ListError>;
}

/// Lists PCI Express devices through `lspci -D -vv`.
pub struct Lspci;

impl DeviceLister for Lspci {
    fn devices(&self) -> Result<Vec<ListedDevice>, ListError> {
        let output = Command::new("lspci")
            .args(["-D", "-vv"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(ListError::Spawn)?;

        if !output.status.success() {
            return Err(ListError::ExitStatus(output.status));
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| ListError::Utf8)?;
        let listing = parse(&stdout);
        if !listing.denied.is_empty() {
            return Err(ListError::AccessDenied(listing.denied));
        }

        Ok(listing.devices)
    }
}

/// Result of parsing a listing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub devices: Vec<ListedDevice>,
    /// Devices whose capabilities lspci was not allowed to read.
    pub denied:  Vec<DeviceAddress>,
}

/// Extracts devices and the ASPM field of their `LnkCap` line.
///
/// Device records start in the first column with the address; their
/// details are indented. Devices without `LnkCap` are not PCI Express and
/// are left out. Without root, lspci prints `Capabilities: <access denied>`
/// instead of the capability list; those devices are collected in `denied`.
pub fn parse(listing: &str) -> Listing {
    let mut parsed = Listing::default();
    let mut current = None;

    for line in listing.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if !line.starts_with(char::is_whitespace) {
            let token = line.split_whitespace().next().unwrap_or_default();
            current = match token.parse::<DeviceAddress>() {
                Ok(address) => Some(address),
                Err(why) => {
                    log::warn!("lspci: skipping device record: {}", why);
                    None
                }
            };
            continue;
        }

        let detail = line.trim_start();
        if detail.starts_with("Capabilities: <access denied>") {
            if let Some(address) = current.take() {
                parsed.denied.push(address);
            }
            continue;
        }

        let caps = match detail.strip_prefix("LnkCap:") {
            Some(caps) => caps,
            None => continue,
        };

        if let Some(address) = current.take() {
            let advertised = caps
                .split(',')
                .map(str::trim)
                .find_map(|field| field.strip_prefix("ASPM "))
                .map_or("", str::trim);

            log::debug!("{}: advertises ASPM '{}'", address, advertised);
            parsed.devices.push(ListedDevice { address, advertised: advertised.into() });
        }
    }

    parsed
}
