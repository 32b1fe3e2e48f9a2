//! Object model for MTP devices
//!
//! Devices expose a handle-based object store, not a POSIX filesystem.
//! The types here mirror that: a [`Device`] is an identity plus display
//! metadata, a [`Storage`] is one of its storage areas, and an
//! [`ObjectInfo`] is a single file or folder materialized on demand.
//!
//! Handles ([`ObjectId`]) are only valid within the device session that
//! produced them. Nothing in this crate caches them across sessions; a
//! remote filesystem mutates outside our control, so objects are
//! re-resolved on every access instead of being held in a live tree.

use chrono::{DateTime, Local};
use std::fmt;

/// Opaque, session-scoped handle for an object on a device.
///
/// On Windows this wraps a WPD object id, on Linux a path below the gvfs
/// mount point. Callers must treat it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap a backend-native identifier
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The backend-native identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// What an object on the device is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A storage root ("Internal Storage", an SD card). Functional objects
    /// on WPD devices; walked like folders.
    Storage,
    /// A directory
    Folder,
    /// A regular file
    File,
}

impl ObjectKind {
    /// Storages and folders both contain children
    pub fn is_container(self) -> bool {
        !matches!(self, ObjectKind::File)
    }
}

/// A file or folder on a device
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Session-scoped handle
    pub id: ObjectId,
    /// Handle of the containing object, if known
    pub parent: Option<ObjectId>,
    /// Name as reported by the device
    pub name: String,
    /// File, folder or storage
    pub kind: ObjectKind,
    /// Size in bytes (0 for containers)
    pub size: u64,
    /// Last modification time, where the device reports one
    pub modified: Option<DateTime<Local>>,
}

impl ObjectInfo {
    /// Create a folder entry
    pub fn folder(id: ObjectId, parent: Option<ObjectId>, name: &str) -> Self {
        Self {
            id,
            parent,
            name: name.to_string(),
            kind: ObjectKind::Folder,
            size: 0,
            modified: None,
        }
    }

    /// Create a file entry
    pub fn file(id: ObjectId, parent: Option<ObjectId>, name: &str, size: u64) -> Self {
        Self {
            id,
            parent,
            name: name.to_string(),
            kind: ObjectKind::File,
            size,
            modified: None,
        }
    }

    /// True for storages and folders
    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }

    /// True for regular files
    pub fn is_file(&self) -> bool {
        self.kind == ObjectKind::File
    }
}

/// One storage area of a device
#[derive(Debug, Clone)]
pub struct Storage {
    /// Session-scoped handle of the storage root object
    pub id: ObjectId,
    /// Human-readable description ("Internal Storage", "SD card")
    pub description: String,
    /// Total capacity in bytes, where the platform reports it
    pub capacity: Option<u64>,
    /// Free space in bytes, where the platform reports it
    pub free_space: Option<u64>,
}

/// An attached MTP device as seen by enumeration.
///
/// Carries identity and display metadata only. Storages are enumerated on
/// the open session (see `DeviceHandle::storages`), because storage handles
/// are not stable across sessions.
#[derive(Debug, Clone)]
pub struct Device {
    /// Stable platform identity, used to open the device
    pub id: String,
    /// Display label; never empty (a fallback is synthesized when the
    /// platform reports nothing usable)
    pub label: String,
    /// Model/description string, may be empty
    pub description: String,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() || self.description == self.label {
            write!(f, "{}", self.label)
        } else {
            write!(f, "{} ({})", self.label, self.description)
        }
    }
}

/// Join a virtual path prefix and an entry name with `/`.
///
/// Virtual paths are built by the walker and facade; devices do not store
/// them.
pub fn join_virtual_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_container_classification() {
        assert!(ObjectKind::Storage.is_container());
        assert!(ObjectKind::Folder.is_container());
        assert!(!ObjectKind::File.is_container());
    }

    #[test]
    fn object_constructors() {
        let folder = ObjectInfo::folder(ObjectId::from("o2"), Some(ObjectId::from("s1")), "DCIM");
        assert!(folder.is_container());
        assert_eq!(folder.size, 0);

        let file = ObjectInfo::file(ObjectId::from("o3"), Some(ObjectId::from("o2")), "a.jpg", 42);
        assert!(file.is_file());
        assert_eq!(file.size, 42);
    }

    #[test]
    fn virtual_path_join() {
        assert_eq!(join_virtual_path("", "Internal Storage"), "Internal Storage");
        assert_eq!(
            join_virtual_path("Internal Storage/DCIM", "IMG_0001.JPG"),
            "Internal Storage/DCIM/IMG_0001.JPG"
        );
    }

    #[test]
    fn device_display() {
        let dev = Device {
            id: "usb#1".into(),
            label: "Nokia 6".into(),
            description: "Nokia 6".into(),
        };
        assert_eq!(dev.to_string(), "Nokia 6");

        let dev = Device {
            id: "usb#2".into(),
            label: "My Phone".into(),
            description: "Pixel 8".into(),
        };
        assert_eq!(dev.to_string(), "My Phone (Pixel 8)");
    }
}
