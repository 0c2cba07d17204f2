//! `list` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{DeviceRecord, Status};

use crate::cli::ListArgs;
use crate::pipeline::build_manager;
use crate::settings::load_config;

#[derive(Serialize)]
struct DeviceInfo {
    index: i32,
    serial: String,
    nickname: String,
    resolved: bool,
}

impl From<DeviceRecord> for DeviceInfo {
    fn from(record: DeviceRecord) -> Self {
        Self {
            resolved: record.has_serial(),
            index: record.index,
            serial: record.serial,
            nickname: record.nickname,
        }
    }
}

/// Execute the `list` command
///
/// An empty enumeration is not an error here: it prints an empty list.
pub fn run_list(args: &ListArgs) -> Result<()> {
    let config = load_config(&args.device)?;
    let mut manager = build_manager(&config);

    let devices: Vec<DeviceInfo> = match manager.refresh() {
        Ok(count) => {
            info!(count, "devices enumerated");
            manager.list().into_iter().map(DeviceInfo::from).collect()
        }
        Err(e) if e.status() == Status::EmptyData => Vec::new(),
        Err(e) => return Err(e).context("device enumeration failed"),
    };

    if args.json {
        let json = serde_json::to_string_pretty(&devices).context("failed to serialize devices")?;
        println!("{json}");
    } else {
        print_devices(&devices);
    }
    Ok(())
}

fn print_devices(devices: &[DeviceInfo]) {
    if devices.is_empty() {
        println!("No devices attached");
        return;
    }
    println!("{:<6} {:<16} {:<12}", "INDEX", "SERIAL", "NICKNAME");
    for device in devices {
        let serial = if device.resolved {
            device.serial.as_str()
        } else {
            "(unresolved)"
        };
        println!("{:<6} {:<16} {:<12}", device.index, serial, device.nickname);
    }
}
