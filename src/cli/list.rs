// Copyright 2026 System76 <info@system76.com>
//
// SPDX-License-Identifier: GPL-3.0-only

use system76_aspm::{
    backup::{BackupStore, SystemClock},
    config::Config,
};
use time::macros::format_description;

/// Lists backup sets, oldest first
#[derive(clap::Args)]
pub struct Command {}

impl Command {
    pub fn run(&self, config: &Config) -> anyhow::Result<()> {
        let store = BackupStore::new(&config.backup_dir, Box::new(SystemClock));

        let mut found = false;
        for set in store.list()? {
            let set = match set {
                Ok(set) => set,
                Err(why) => {
                    log::warn!("{}", why);
                    continue;
                }
            };

            found = true;
            let when = set
                .timestamp
                .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC"))?;
            let reason = set.reason.map_or_else(|| "unknown".to_string(), |reason| reason.to_string());
            println!("{}  {:>3} device(s)  {:<11}  {}", when, set.devices, reason, set.path.display());
        }

        if !found {
            log::info!("no backup sets in {}", store.root().display());
        }

        Ok(())
    }
}
