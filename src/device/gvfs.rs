//! Linux backend using the gvfs MTP mount
//!
//! On a Linux desktop, connected MTP devices are mounted by gvfs below
//! `$XDG_RUNTIME_DIR/gvfs` (i.e. `/run/user/<uid>/gvfs`), one directory per
//! device named like `mtp:host=Xiaomi_Mi_9_a1b2c3`. Browsing and transfer
//! go through ordinary filesystem calls against that mount; the MTP
//! protocol itself is gvfs's problem.
//!
//! Object handles are absolute paths below the mount. They are as unstable
//! as any MTP handle: the phone can delete objects at any time, and the
//! whole mount disappears when the device is unplugged. Errors are mapped
//! accordingly: a missing object is `ObjectNotFound`, unless the device
//! mount itself is gone, which is `DeviceDisconnected`.

use chrono::{DateTime, Local};
use log::{debug, trace, warn};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::core::error::{AccessError, Result};
use crate::device::object::{ObjectId, ObjectInfo, ObjectKind, Storage};
use crate::device::traits::{DeviceBackend, DeviceSession, ObjectWriter, RawDeviceInfo};

/// Linux MTP backend over the gvfs mount point
pub struct GvfsBackend {
    mount_root: PathBuf,
}

impl GvfsBackend {
    /// Backend over the standard gvfs location, `$XDG_RUNTIME_DIR/gvfs`
    pub fn new() -> Result<Self> {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map_err(|_| AccessError::Backend("XDG_RUNTIME_DIR is not set".to_string()))?;
        Ok(Self {
            mount_root: PathBuf::from(runtime_dir).join("gvfs"),
        })
    }

    /// Backend over an arbitrary mount directory. Used by tests to point
    /// the backend at a synthetic device tree.
    pub fn with_root(mount_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
        }
    }
}

impl DeviceBackend for GvfsBackend {
    fn enumerate_devices(&self) -> Result<Vec<RawDeviceInfo>> {
        if !self.mount_root.exists() {
            debug!(
                "gvfs mount root '{}' does not exist, no devices",
                self.mount_root.display()
            );
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.mount_root).map_err(|e| {
            AccessError::Backend(format!(
                "cannot read gvfs mounts at '{}': {}",
                self.mount_root.display(),
                e
            ))
        })?;

        let mut devices = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            let (friendly_name, description, _) = parse_mount_name(&dir_name);
            devices.push(RawDeviceInfo {
                device_id: path.to_string_lossy().into_owned(),
                friendly_name,
                description,
            });
        }

        Ok(devices)
    }

    fn open_device(&self, device_id: &str) -> Result<Box<dyn DeviceSession>> {
        let root = PathBuf::from(device_id);
        if !root.is_dir() {
            return Err(AccessError::DeviceNotFound(device_id.to_string()));
        }
        debug!("Opened gvfs device at '{}'", root.display());
        Ok(Box::new(GvfsSession { root }))
    }
}

/// Split a gvfs mount directory name into (friendly name, description,
/// serial). Names look like `mtp:host=Nokia_6_PLEGAR177xxxx`; the part
/// after `=` is `<vendor>_<model>_<serial>`.
fn parse_mount_name(dir_name: &str) -> (Option<String>, Option<String>, Option<String>) {
    let Some((_, device_part)) = dir_name.split_once('=') else {
        return (None, None, None);
    };
    if device_part.is_empty() {
        return (None, None, None);
    }
    let name = device_part.to_string();
    let description = device_part.split('_').next().map(str::to_string);
    let serial = if device_part.contains('_') {
        device_part.rsplit('_').next().map(str::to_string)
    } else {
        None
    };
    (Some(name), description, serial)
}

/// Open session on one gvfs-mounted device
pub struct GvfsSession {
    root: PathBuf,
}

impl GvfsSession {
    /// Map a filesystem error on `path`, distinguishing a vanished object
    /// from a vanished device.
    fn map_io_error(&self, err: std::io::Error, path: &Path) -> AccessError {
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                if self.root.exists() {
                    AccessError::ObjectNotFound(path.to_string_lossy().into_owned())
                } else {
                    AccessError::DeviceDisconnected
                }
            }
            std::io::ErrorKind::PermissionDenied => {
                AccessError::AccessDenied(path.to_string_lossy().into_owned())
            }
            std::io::ErrorKind::NotConnected => AccessError::DeviceDisconnected,
            _ => AccessError::Backend(format!("'{}': {}", path.display(), err)),
        }
    }

    fn object_from_path(&self, path: &Path) -> Result<ObjectInfo> {
        let metadata = fs::metadata(path).map_err(|e| self.map_io_error(e, path))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = path
            .parent()
            .map(|p| ObjectId::new(p.to_string_lossy().into_owned()));

        let kind = if metadata.is_dir() {
            // Direct children of the device root are its storages
            if path.parent() == Some(self.root.as_path()) {
                ObjectKind::Storage
            } else {
                ObjectKind::Folder
            }
        } else {
            ObjectKind::File
        };

        let modified: Option<DateTime<Local>> = metadata.modified().ok().map(DateTime::from);

        Ok(ObjectInfo {
            id: ObjectId::new(path.to_string_lossy().into_owned()),
            parent,
            name,
            kind,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified,
        })
    }
}

impl DeviceSession for GvfsSession {
    fn device_id(&self) -> &str {
        self.root.to_str().unwrap_or("")
    }

    fn storages(&self) -> Result<Vec<Storage>> {
        let entries =
            fs::read_dir(&self.root).map_err(|e| self.map_io_error(e, self.root.as_path()))?;

        let mut storages = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let description = entry.file_name().to_string_lossy().into_owned();
            storages.push(Storage {
                id: ObjectId::new(path.to_string_lossy().into_owned()),
                description,
                // gvfs does not expose capacity through the mount
                capacity: None,
                free_space: None,
            });
        }
        storages.sort_by(|a, b| a.description.cmp(&b.description));

        if storages.is_empty() {
            warn!(
                "Device at '{}' reports no storages; it may be locked",
                self.root.display()
            );
        }

        Ok(storages)
    }

    fn list_children(&self, parent: &ObjectId) -> Result<Vec<ObjectInfo>> {
        let parent_path = PathBuf::from(parent.as_str());
        trace!("Listing children of '{}'", parent_path.display());

        let entries =
            fs::read_dir(&parent_path).map_err(|e| self.map_io_error(e, &parent_path))?;

        let mut children = Vec::new();
        for entry in entries.flatten() {
            // An entry can vanish between readdir and stat; that child is
            // simply not reported.
            match self.object_from_path(&entry.path()) {
                Ok(info) => children.push(info),
                Err(err) if err.is_entry_recoverable() => {
                    trace!("Skipping vanished entry '{}'", entry.path().display());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(children)
    }

    fn object_info(&self, id: &ObjectId) -> Result<ObjectInfo> {
        self.object_from_path(Path::new(id.as_str()))
    }

    fn open_read<'a>(&'a self, id: &ObjectId) -> Result<Box<dyn Read + 'a>> {
        let path = PathBuf::from(id.as_str());
        let file = fs::File::open(&path).map_err(|e| self.map_io_error(e, &path))?;
        Ok(Box::new(file))
    }

    fn create_file<'a>(
        &'a self,
        parent: &ObjectId,
        name: &str,
        _size_hint: Option<u64>,
    ) -> Result<Box<dyn ObjectWriter + 'a>> {
        let path = PathBuf::from(parent.as_str()).join(name);
        let file = fs::File::create(&path).map_err(|e| self.map_io_error(e, &path))?;
        Ok(Box::new(GvfsWriter {
            file: Some(file),
            path,
        }))
    }

    fn create_folder(&self, parent: &ObjectId, name: &str) -> Result<ObjectInfo> {
        let path = PathBuf::from(parent.as_str()).join(name);
        fs::create_dir(&path).map_err(|e| self.map_io_error(e, &path))?;
        debug!("Created folder '{}'", path.display());
        self.object_from_path(&path)
    }

    fn delete_object(&self, id: &ObjectId) -> Result<()> {
        let path = PathBuf::from(id.as_str());
        let metadata = fs::metadata(&path).map_err(|e| self.map_io_error(e, &path))?;
        if metadata.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| self.map_io_error(e, &path))?;
        } else {
            fs::remove_file(&path).map_err(|e| self.map_io_error(e, &path))?;
        }
        debug!("Deleted '{}'", path.display());
        Ok(())
    }

    fn serial_number(&self) -> Option<String> {
        let dir_name = self.root.file_name()?.to_string_lossy().into_owned();
        parse_mount_name(&dir_name).2
    }
}

/// Streamed upload onto the mount. The file is written in place; abort
/// unlinks whatever was written so far.
struct GvfsWriter {
    file: Option<fs::File>,
    path: PathBuf,
}

impl ObjectWriter for GvfsWriter {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        use std::io::Write;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| AccessError::Backend("writer already finished".to_string()))?;
        file.write_all(chunk)
            .map_err(|e| AccessError::Backend(format!("'{}': {}", self.path.display(), e)))
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        use std::io::Write;
        if let Some(mut file) = self.file.take() {
            file.flush()
                .map_err(|e| AccessError::Backend(format!("'{}': {}", self.path.display(), e)))?;
        }
        Ok(())
    }

    fn abort(mut self: Box<Self>) -> Result<()> {
        // Close before unlinking
        self.file.take();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AccessError::Backend(format!(
                "'{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}
