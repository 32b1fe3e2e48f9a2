//! Command implementations for the CLI binary

use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use std::path::PathBuf;

use crate::cli::args::Command;
use crate::cli::progress;
use crate::core::config::Config;
use crate::device::object::Device;
use crate::facade::{DeviceHandle, PortableAccess};
use crate::transfer::{CancelToken, TransferOptions};

/// Dispatch one parsed subcommand
pub fn run(command: Command, access: &PortableAccess, config: &Config) -> Result<()> {
    let options = TransferOptions::with_chunk_size(config.transfer.chunk_size)
        .with_cancel(install_ctrlc_token()?);

    match command {
        Command::Devices => cmd_devices(access),
        Command::Tree { device, path } => {
            let handle = open_selected(access, &device)?;
            cmd_tree(&handle, path.as_deref(), options.cancel.clone())
        }
        Command::Pull {
            device,
            remote,
            local,
        } => {
            let handle = open_selected(access, &device)?;
            cmd_pull(&handle, &remote, local, &options)
        }
        Command::Push {
            device,
            local,
            remote_dir,
        } => {
            let handle = open_selected(access, &device)?;
            cmd_push(&handle, &local, &remote_dir, &options)
        }
        Command::Mkdir { device, path } => {
            let handle = open_selected(access, &device)?;
            handle.make_dirs(&path)?;
            println!("Created {}", path);
            Ok(())
        }
        Command::Rm { device, path } => {
            let handle = open_selected(access, &device)?;
            let object = handle
                .object_by_path(&path)?
                .ok_or_else(|| anyhow!("'{}' not found on the device", path))?;
            handle.remove(&object)?;
            println!("Deleted {}", path);
            Ok(())
        }
    }
}

/// Wire Ctrl-C to a cancellation token
fn install_ctrlc_token() -> Result<CancelToken> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling...");
        handler_token.cancel();
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(token)
}

/// Match a device by list index, label or id prefix
fn select_device(devices: &[Device], selector: &str) -> Result<Device> {
    if devices.is_empty() {
        bail!("no MTP devices attached");
    }
    if let Ok(index) = selector.parse::<usize>() {
        if let Some(device) = devices.get(index) {
            return Ok(device.clone());
        }
    }
    devices
        .iter()
        .find(|d| d.label == selector || d.id.starts_with(selector))
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "no device matches '{}' (try 'mtp-access devices')",
                selector
            )
        })
}

fn open_selected(access: &PortableAccess, selector: &str) -> Result<DeviceHandle> {
    let devices = access.list_devices()?;
    let device = select_device(&devices, selector)?;
    Ok(access.open(&device)?)
}

fn cmd_devices(access: &PortableAccess) -> Result<()> {
    let devices = access.list_devices()?;
    if devices.is_empty() {
        println!("No MTP devices attached.");
        return Ok(());
    }
    for (index, device) in devices.iter().enumerate() {
        println!("[{}] {}", index, device);
        match access.open(device) {
            Ok(handle) => {
                if let Some(serial) = handle.serial_number() {
                    println!("    serial: {}", serial);
                }
                for storage in handle.storages() {
                    match (storage.capacity, storage.free_space) {
                        (Some(capacity), Some(free)) => println!(
                            "    {} ({} free of {})",
                            storage.description,
                            human_bytes(free),
                            human_bytes(capacity)
                        ),
                        _ => println!("    {}", storage.description),
                    }
                }
            }
            Err(e) => {
                warn!("Could not open '{}': {}", device.label, e);
                println!("    (not accessible: {})", e);
            }
        }
    }
    Ok(())
}

fn cmd_tree(handle: &DeviceHandle, path: Option<&str>, cancel: CancelToken) -> Result<()> {
    let spinner = progress::walk_spinner();

    let walker = match path {
        Some(path) => handle.walk_path(path)?,
        None => handle.walk(),
    }
    .with_cancel(cancel);

    let mut folders = 0usize;
    let mut files = 0usize;
    for entry in walker {
        let entry = entry?;
        folders += 1;
        spinner.set_message(format!("{} folders, {} files", folders, files));
        spinner.suspend(|| {
            println!("{}/", entry.path);
            for file in &entry.files {
                println!("{}/{}  ({})", entry.path, file.name, human_bytes(file.size));
                files += 1;
            }
        });
    }
    spinner.finish_and_clear();
    println!("{} folder(s), {} file(s)", folders, files);
    Ok(())
}

fn cmd_pull(
    handle: &DeviceHandle,
    remote: &str,
    local: Option<PathBuf>,
    options: &TransferOptions,
) -> Result<()> {
    let object = handle
        .object_by_path(remote)?
        .ok_or_else(|| anyhow!("'{}' not found on the device", remote))?;
    if !object.is_file() {
        bail!("'{}' is a folder; pull copies single files", remote);
    }

    let local = local.unwrap_or_else(|| PathBuf::from(&object.name));
    let bar = progress::transfer_bar(Some(object.size), object.name.clone());
    let written = handle.download(&object, &local, options, |bytes| bar.set_position(bytes))?;
    bar.finish_and_clear();
    println!("{} -> {} ({})", remote, local.display(), human_bytes(written));
    Ok(())
}

fn cmd_push(
    handle: &DeviceHandle,
    local: &PathBuf,
    remote_dir: &str,
    options: &TransferOptions,
) -> Result<()> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("'{}' has no usable file name", local.display()))?;

    let folder = handle.make_dirs(remote_dir)?;
    let size = std::fs::metadata(local).map(|m| m.len()).ok();
    let bar = progress::transfer_bar(size, name.to_string());

    let uploaded = handle.upload(&folder.id, name, local, options, |bytes| {
        bar.set_position(bytes)
    })?;
    bar.finish_and_clear();
    println!(
        "{} -> {}/{} ({})",
        local.display(),
        remote_dir,
        uploaded.name,
        human_bytes(uploaded.size)
    );
    Ok(())
}

/// Render a byte count the way humans read them
fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, label: &str) -> Device {
        Device {
            id: id.to_string(),
            label: label.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn selects_by_index_label_and_prefix() {
        let devices = vec![
            device("usb#vid_1#serial_a", "Phone A"),
            device("usb#vid_2#serial_b", "Phone B"),
        ];

        assert_eq!(select_device(&devices, "1").unwrap().label, "Phone B");
        assert_eq!(select_device(&devices, "Phone A").unwrap().label, "Phone A");
        assert_eq!(
            select_device(&devices, "usb#vid_2").unwrap().label,
            "Phone B"
        );
        assert!(select_device(&devices, "Phone C").is_err());
    }

    #[test]
    fn human_readable_sizes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
