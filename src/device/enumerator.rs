//! Device discovery and display-name normalization
//!
//! Platforms report device names unreliably: locked phones return empty
//! strings, some devices report nothing but their USB path. Enumeration
//! never lets one malformed device abort the listing, and every returned
//! device carries a non-empty label.

use log::{debug, warn};

use crate::core::error::Result;
use crate::device::object::Device;
use crate::device::traits::{DeviceBackend, RawDeviceInfo};

/// Label used when nothing usable can be derived from the device identity
const UNKNOWN_DEVICE_LABEL: &str = "Unknown device";

/// List all attached MTP devices.
///
/// Re-queries the platform on every call. Each device gets a display label
/// that is guaranteed non-empty: the friendly name if usable, else the
/// description, else a label synthesized from the device identity.
pub fn list_devices(backend: &dyn DeviceBackend) -> Result<Vec<Device>> {
    let raw = backend.enumerate_devices()?;
    debug!("Platform reported {} attached device(s)", raw.len());

    let devices: Vec<Device> = raw.into_iter().map(normalize).collect();

    for dev in &devices {
        debug!("Device '{}' (id: {})", dev.label, dev.id);
    }

    Ok(devices)
}

/// Turn a raw platform identity into a `Device` with a usable label
fn normalize(raw: RawDeviceInfo) -> Device {
    let description = non_blank(raw.description.as_deref()).unwrap_or_default();

    let label = match non_blank(raw.friendly_name.as_deref()) {
        Some(name) => name,
        None => {
            if description.is_empty() {
                let fallback = synthesize_label(&raw.device_id);
                warn!(
                    "Device '{}' reports no usable name, labelling it '{}'",
                    raw.device_id, fallback
                );
                fallback
            } else {
                description.clone()
            }
        }
    };

    Device {
        id: raw.device_id,
        label,
        description,
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Derive a deterministic label from a device identity.
///
/// Platform ids look like `\\?\usb#vid_2717&pid_ff40#a1b2c3#{...}` on
/// Windows or `mtp:host=Xiaomi_Mi9_a1b2c3` on Linux; the last meaningful
/// segment usually carries the serial or host part.
fn synthesize_label(device_id: &str) -> String {
    device_id
        .split(['\\', '/', '#', '='])
        .map(str::trim)
        .filter(|part| !part.is_empty() && !part.starts_with('{'))
        .next_back()
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_DEVICE_LABEL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, friendly: Option<&str>, desc: Option<&str>) -> RawDeviceInfo {
        RawDeviceInfo {
            device_id: id.to_string(),
            friendly_name: friendly.map(str::to_string),
            description: desc.map(str::to_string),
        }
    }

    #[test]
    fn friendly_name_wins() {
        let dev = normalize(raw("usb#1", Some("John's Phone"), Some("Pixel 8")));
        assert_eq!(dev.label, "John's Phone");
        assert_eq!(dev.description, "Pixel 8");
    }

    #[test]
    fn description_used_when_friendly_name_blank() {
        let dev = normalize(raw("usb#1", Some("   "), Some("Pixel 8")));
        assert_eq!(dev.label, "Pixel 8");

        let dev = normalize(raw("usb#1", None, Some("Pixel 8")));
        assert_eq!(dev.label, "Pixel 8");
    }

    #[test]
    fn label_synthesized_from_identity() {
        let dev = normalize(raw("mtp:host=Xiaomi_Mi9_a1b2c3", None, None));
        assert_eq!(dev.label, "Xiaomi_Mi9_a1b2c3");

        let dev = normalize(raw(r"\\?\usb#vid_2717&pid_ff40#serial123", Some(""), None));
        assert_eq!(dev.label, "serial123");
    }

    #[test]
    fn label_never_empty() {
        // Even a degenerate identity produces a non-empty label
        for id in ["", "###", "{guid-only}"] {
            let dev = normalize(raw(id, None, None));
            assert!(
                !dev.label.trim().is_empty(),
                "empty label for id {:?}",
                id
            );
        }
    }

    #[test]
    fn list_devices_never_yields_empty_labels() {
        use crate::testdb::mock_backend::{MockBackend, MockFs};

        let mut backend = MockBackend::new();
        backend.add_device_raw(
            RawDeviceInfo {
                device_id: "usb#vid_1#good".to_string(),
                friendly_name: Some("Good Phone".to_string()),
                description: None,
            },
            MockFs::new(),
        );
        backend.add_device_raw(
            RawDeviceInfo {
                device_id: "usb#vid_2#broken".to_string(),
                friendly_name: Some("".to_string()),
                description: Some("  ".to_string()),
            },
            MockFs::new(),
        );

        let devices = list_devices(&backend).unwrap();
        assert_eq!(devices.len(), 2);
        for device in &devices {
            assert!(!device.label.trim().is_empty());
        }
        assert_eq!(devices[1].label, "broken");
    }

    #[test]
    fn windows_guid_suffix_skipped() {
        let dev = normalize(raw(
            r"\\?\usb#vid_05ac&pid_12a8#abc123#{6ac27878-a6fa-4155-ba85-f98f491d4f33}",
            None,
            None,
        ));
        assert_eq!(dev.label, "abc123");
    }
}
