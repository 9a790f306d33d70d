// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

//! Replays backed-up configuration space onto devices.
//!
//! Only the capability region is replayed. The base header holds identity,
//! command/status and BARs, none of which are ever written back. Each
//! register is written independently so that one locked register does not
//! prevent the rest from being restored.

use crate::{
    address::DeviceAddress,
    backup::{BackupEntry, BackupStore, Reason, Snapshot},
    errors::{BackupError, RestoreError},
    lock::DeviceLocks,
    pci::{write_register, ConfigSpace, ConfigSpaceImage, WRITABLE},
};
use std::{
    fmt,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

/// Number of differing registers shown before the preview is cut short.
const PREVIEW_LINES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterChange {
    pub offset:  usize,
    pub current: u8,
    pub backup:  u8,
}

/// The registers a restore would rewrite on one device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preview {
    pub device:  DeviceAddress,
    pub changes: Vec<RegisterChange>,
}

impl Preview {
    pub fn new(device: DeviceAddress, current: &ConfigSpaceImage, backup: &ConfigSpaceImage) -> Self {
        let (current, backup) = (current.as_bytes(), backup.as_bytes());
        let changes = WRITABLE
            .filter(|&offset| current[offset] != backup[offset])
            .map(|offset| RegisterChange { offset, current: current[offset], backup: backup[offset] })
            .collect();

        Self { device, changes }
    }
}

impl fmt::Display for Preview {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}: {} register(s) differ from the backup", self.device, self.changes.len())?;
        for change in self.changes.iter().take(PREVIEW_LINES) {
            writeln!(f, "  {:#04x}: {:02x} -> {:02x}", change.offset, change.current, change.backup)?;
        }

        if self.changes.len() > PREVIEW_LINES {
            writeln!(f, "  ... and {} more", self.changes.len() - PREVIEW_LINES)?;
        }

        Ok(())
    }
}

/// Asks whether a previewed restore should go ahead.
pub trait Confirm {
    fn confirm(&mut self, preview: &Preview) -> bool;
}

/// Prompts on stdout and reads the answer from stdin. Anything other than
/// `y` or `yes` declines.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, preview: &Preview) -> bool {
        ask(&mut io::stdin().lock(), &mut io::stdout().lock(), preview)
    }
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, preview: &Preview) -> bool {
    let _ = write!(output, "{}Restore {}? [y/N] ", preview, preview.device);
    let _ = output.flush();

    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(why) => {
            log::error!("failed to read confirmation: {}", why);
            false
        }
    }
}

#[derive(Debug)]
pub enum RestoreOutcome {
    /// `snapshot` is the set holding the pre-restore state, absent when
    /// nothing needed writing.
    Restored { written: usize, failed: usize, snapshot: Option<PathBuf> },
    Aborted,
    Failed(RestoreError),
}

/// Picks the snapshots to restore, optionally narrowed to a single device.
pub fn select(
    source: &Path,
    snapshots: Vec<Snapshot>,
    only: Option<DeviceAddress>,
) -> Result<Vec<Snapshot>, BackupError> {
    let only = match only {
        Some(device) => device,
        None => return Ok(snapshots),
    };

    let selected: Vec<_> = snapshots.into_iter().filter(|snapshot| snapshot.device == only).collect();
    if selected.is_empty() {
        return Err(BackupError::DeviceMissing(source.to_path_buf(), only));
    }

    Ok(selected)
}

pub struct RestoreEngine<'a, C: ConfigSpace + ?Sized> {
    io:      &'a C,
    store:   &'a mut BackupStore,
    locks:   &'a DeviceLocks,
    confirm: &'a mut dyn Confirm,
}

impl<'a, C: ConfigSpace + ?Sized> RestoreEngine<'a, C> {
    pub fn new(
        io: &'a C,
        store: &'a mut BackupStore,
        locks: &'a DeviceLocks,
        confirm: &'a mut dyn Confirm,
    ) -> Self {
        Self { io, store, locks, confirm }
    }

    pub fn restore(&mut self, entry: &BackupEntry, force: bool) -> RestoreOutcome {
        match self.try_restore(entry, force) {
            Ok(outcome) => outcome,
            Err(why) => {
                log::error!("{}: restore failed: {}", entry.device, why);
                RestoreOutcome::Failed(why)
            }
        }
    }

    /// Restores one device of a set. A snapshot that failed to load fails
    /// only its own device.
    pub fn restore_snapshot(&mut self, snapshot: Snapshot, force: bool) -> RestoreOutcome {
        match snapshot.entry {
            Ok(ref entry) => self.restore(entry, force),
            Err(why) => {
                log::error!("{}: restore failed: {}", snapshot.device, why);
                RestoreOutcome::Failed(RestoreError::Backup(why))
            }
        }
    }

    fn try_restore(&mut self, entry: &BackupEntry, force: bool) -> Result<RestoreOutcome, RestoreError> {
        let device = entry.device;
        let _lock = self.locks.acquire(device)?;
        let current = self.io.read(device)?;

        if current.vendor_device() != entry.image.vendor_device() {
            return Err(RestoreError::DeviceMismatch {
                address: device,
                current: current.vendor_device(),
                backup:  entry.image.vendor_device(),
            });
        }

        let preview = Preview::new(device, &current, &entry.image);
        if preview.changes.is_empty() {
            log::info!("{}: already matches {}", device, entry.path.display());
            return Ok(RestoreOutcome::Restored { written: 0, failed: 0, snapshot: None });
        }

        if !force && !self.confirm.confirm(&preview) {
            log::info!("{}: restore declined", device);
            return Ok(RestoreOutcome::Aborted);
        }

        let snapshot = self.store.save(device, &current, Reason::PreRestore)?;

        let (mut written, mut failed) = (0, 0);
        for change in &preview.changes {
            match write_register(self.io, device, change.offset, change.backup) {
                Ok(()) => written += 1,
                Err(why) => {
                    log::error!("{}: {}", device, why);
                    failed += 1;
                }
            }
        }

        log::info!("{}: restored {} register(s), {} failed", device, written, failed);
        Ok(RestoreOutcome::Restored {
            written,
            failed,
            snapshot: snapshot.path.parent().map(Path::to_path_buf),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, pcie_bytes, Call, FakePci, FixedClock};
    use time::macros::datetime;

    struct Answer {
        accept: bool,
        asked:  usize,
    }

    impl Confirm for Answer {
        fn confirm(&mut self, _preview: &Preview) -> bool {
            self.asked += 1;
            self.accept
        }
    }

    struct Fixture {
        dir:   tempfile::TempDir,
        store: BackupStore,
        locks: DeviceLocks,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = BackupStore::new(
                dir.path().join("backups"),
                Box::new(FixedClock(datetime!(2026-10-19 10:00:00 UTC))),
            );
            let locks = DeviceLocks::new(dir.path().join("locks"));
            Self { dir, store, locks }
        }

        fn backups(&self) -> PathBuf { self.dir.path().join("backups") }
    }

    fn entry(device: DeviceAddress, bytes: Vec<u8>) -> BackupEntry {
        BackupEntry {
            device,
            timestamp: datetime!(2026-10-18 08:00:00 UTC),
            image: ConfigSpaceImage::from_bytes(device, bytes).unwrap(),
            path: PathBuf::from("/var/lib/system76-aspm/backups/20261018-080000/0000_00_1c.0"),
        }
    }

    #[test]
    fn declined_restore_aborts() {
        let mut fx = Fixture::new();
        let device = addr("0000:00:1c.0");
        let pci = FakePci::new().with_device(device, pcie_bytes(0x43));
        let mut answer = Answer { accept: false, asked: 0 };

        let outcome = RestoreEngine::new(&pci, &mut fx.store, &fx.locks, &mut answer)
            .restore(&entry(device, pcie_bytes(0x40)), false);

        assert!(matches!(outcome, RestoreOutcome::Aborted));
        assert_eq!(answer.asked, 1);
        assert!(pci.writes().is_empty());
        assert!(!fx.backups().exists());
    }

    #[test]
    fn confirmed_restore_snapshots_first() {
        let mut fx = Fixture::new();
        let device = addr("0000:00:1c.0");
        let pci = FakePci::new().with_device(device, pcie_bytes(0x43)).watching_backups(&fx.backups());
        let mut answer = Answer { accept: true, asked: 0 };

        let outcome = RestoreEngine::new(&pci, &mut fx.store, &fx.locks, &mut answer)
            .restore(&entry(device, pcie_bytes(0x40)), false);

        match outcome {
            RestoreOutcome::Restored { written: 1, failed: 0, snapshot: Some(ref set) } => {
                assert_eq!(set, &fx.backups().join("20261019-100000"));
                let saved = BackupStore::open(&set.join(device.file_name())).unwrap();
                assert_eq!(saved[0].entry.as_ref().unwrap().image.byte(0x70), Some(0x43));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(pci.writes(), vec![(device, 0x70, 0x40)]);
        assert!(matches!(pci.calls.borrow().last(), Some(Call::Write { backed_up: true, .. })));
    }

    #[test]
    fn header_bytes_are_never_written() {
        let mut fx = Fixture::new();
        let device = addr("0000:00:1c.0");
        let mut current = pcie_bytes(0x43);
        current[0x04] = 0x07;
        current[0x10] = 0xf0;
        let pci = FakePci::new().with_device(device, current);
        let mut answer = Answer { accept: true, asked: 0 };

        let outcome = RestoreEngine::new(&pci, &mut fx.store, &fx.locks, &mut answer)
            .restore(&entry(device, pcie_bytes(0x40)), true);

        assert!(matches!(outcome, RestoreOutcome::Restored { written: 1, .. }));
        assert_eq!(answer.asked, 0);
        assert!(pci.writes().iter().all(|&(_, offset, _)| offset >= 0x40));
        assert_eq!(pci.byte(device, 0x04), 0x07);
    }

    #[test]
    fn locked_register_does_not_stop_others() {
        let mut fx = Fixture::new();
        let device = addr("0000:00:1c.0");
        let mut backup = pcie_bytes(0x40);
        backup[0x71] = 0x01;
        backup[0x90] = 0x0a;
        let pci = FakePci::new().with_device(device, pcie_bytes(0x43)).read_only(device, 0x71);
        let mut answer = Answer { accept: true, asked: 0 };

        let outcome = RestoreEngine::new(&pci, &mut fx.store, &fx.locks, &mut answer)
            .restore(&entry(device, backup), true);

        assert!(matches!(outcome, RestoreOutcome::Restored { written: 2, failed: 1, .. }));
        assert_eq!(pci.writes().len(), 3);
        assert_eq!(pci.byte(device, 0x70), 0x40);
        assert_eq!(pci.byte(device, 0x71), 0x00);
        assert_eq!(pci.byte(device, 0x90), 0x0a);
    }

    #[test]
    fn identical_device_needs_nothing() {
        let mut fx = Fixture::new();
        let device = addr("0000:00:1c.0");
        let pci = FakePci::new().with_device(device, pcie_bytes(0x40));
        let mut answer = Answer { accept: false, asked: 0 };

        let outcome = RestoreEngine::new(&pci, &mut fx.store, &fx.locks, &mut answer)
            .restore(&entry(device, pcie_bytes(0x40)), false);

        assert!(matches!(outcome, RestoreOutcome::Restored { written: 0, failed: 0, snapshot: None }));
        assert_eq!(answer.asked, 0);
        assert!(!fx.backups().exists());
    }

    #[test]
    fn different_device_is_refused() {
        let mut fx = Fixture::new();
        let device = addr("0000:00:1c.0");
        let mut other = pcie_bytes(0x43);
        other[0x00] = 0xde;
        other[0x01] = 0x10;
        let pci = FakePci::new().with_device(device, other);
        let mut answer = Answer { accept: true, asked: 0 };

        let outcome = RestoreEngine::new(&pci, &mut fx.store, &fx.locks, &mut answer)
            .restore(&entry(device, pcie_bytes(0x40)), true);

        assert!(matches!(outcome, RestoreOutcome::Failed(RestoreError::DeviceMismatch { .. })));
        assert!(pci.writes().is_empty());
    }

    #[test]
    fn preview_is_short() {
        let device = addr("0000:00:1c.0");
        let current = ConfigSpaceImage::from_bytes(device, vec![0u8; 256]).unwrap();
        let backup = ConfigSpaceImage::from_bytes(device, vec![1u8; 256]).unwrap();
        let preview = Preview::new(device, &current, &backup);

        assert_eq!(preview.changes.len(), 0xc0);
        let text = preview.to_string();
        assert_eq!(text.lines().count(), 1 + PREVIEW_LINES + 1);
        assert!(text.contains("  0x40: 00 -> 01"));
        assert!(text.ends_with("  ... and 176 more\n"));
    }

    #[test]
    fn unreadable_snapshot_fails_only_its_device() {
        let mut fx = Fixture::new();
        let good = addr("0000:00:1c.0");
        let bad = addr("0000:02:00.0");
        let pci = FakePci::new().with_device(good, pcie_bytes(0x43)).with_device(bad, pcie_bytes(0x43));
        let mut answer = Answer { accept: true, asked: 0 };
        let mut engine = RestoreEngine::new(&pci, &mut fx.store, &fx.locks, &mut answer);

        let snapshots = vec![
            Snapshot { device: good, entry: Ok(entry(good, pcie_bytes(0x40))) },
            Snapshot { device: bad, entry: Err(BackupError::Invalid(PathBuf::from("0000_02_00.0"))) },
        ];
        let outcomes: Vec<_> =
            snapshots.into_iter().map(|snapshot| engine.restore_snapshot(snapshot, true)).collect();
        drop(engine);

        assert!(matches!(outcomes[0], RestoreOutcome::Restored { written: 1, failed: 0, .. }));
        assert!(matches!(
            outcomes[1],
            RestoreOutcome::Failed(RestoreError::Backup(BackupError::Invalid(_)))
        ));
        assert_eq!(pci.writes(), vec![(good, 0x70, 0x40)]);
    }

    #[test]
    fn prompt_accepts_only_yes() {
        let device = addr("0000:00:1c.0");
        let current = ConfigSpaceImage::from_bytes(device, pcie_bytes(0x43)).unwrap();
        let backup = ConfigSpaceImage::from_bytes(device, pcie_bytes(0x40)).unwrap();
        let preview = Preview::new(device, &current, &backup);

        let answers = [("y\n", true), ("YES\n", true), (" yes \n", true), ("n\n", false), ("\n", false), ("", false)];
        for (answer, expected) in answers {
            let mut output = Vec::new();
            assert_eq!(ask(&mut answer.as_bytes(), &mut output, &preview), expected, "{:?}", answer);

            let prompt = String::from_utf8(output).unwrap();
            assert!(prompt.contains("  0x70: 43 -> 40\n"), "{}", prompt);
            assert!(prompt.ends_with("Restore 0000:00:1c.0? [y/N] "), "{}", prompt);
        }
    }

    #[test]
    fn select_single_device() {
        let a = addr("0000:00:1c.0");
        let b = addr("0000:02:00.0");
        let source = Path::new("/backups/20261018-080000");
        let all = || {
            vec![
                Snapshot { device: a, entry: Ok(entry(a, pcie_bytes(0))) },
                Snapshot { device: b, entry: Err(BackupError::Invalid(source.join("0000_02_00.0"))) },
            ]
        };

        assert_eq!(select(source, all(), None).unwrap().len(), 2);
        let only = select(source, all(), Some(b)).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].device, b);
        assert!(only[0].entry.is_err());

        let missing = addr("0000:03:00.0");
        assert!(matches!(
            select(source, all(), Some(missing)),
            Err(BackupError::DeviceMissing(_, d)) if d == missing
        ));
    }
}
