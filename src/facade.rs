//! Unified access to MTP devices, independent of the platform backend
//!
//! [`PortableAccess`] picks the native backend once, at construction:
//! Windows Portable Devices on Windows, the gvfs MTP mount on Linux.
//! Callers never branch on platform; on anything else construction fails
//! fast with [`AccessError::PlatformUnsupported`].
//!
//! Opening a device yields a [`DeviceHandle`], the exclusive session scope
//! for every handle obtained through it. Dropping the handle releases the
//! underlying platform session on any exit path.

use log::{debug, info};
use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use crate::core::error::{AccessError, Result};
use crate::device::enumerator;
use crate::device::object::{join_virtual_path, Device, ObjectId, ObjectInfo, Storage};
use crate::device::traits::{DeviceBackend, DeviceSession};
use crate::transfer::{self, ChunkReader, TransferOptions};
use crate::walk::Walker;

/// Entry point for device discovery, hiding which backend is active
pub struct PortableAccess {
    backend: Box<dyn DeviceBackend>,
}

impl PortableAccess {
    /// Use the native backend for the host platform.
    ///
    /// On Windows, COM must already be initialized (see
    /// [`initialize_com`](crate::device::wpd::initialize_com)).
    pub fn new() -> Result<Self> {
        Ok(Self {
            backend: native_backend()?,
        })
    }

    /// Use a specific backend (tests, mock devices)
    pub fn with_backend(backend: Box<dyn DeviceBackend>) -> Self {
        Self { backend }
    }

    /// All attached MTP devices, each with a usable display label.
    ///
    /// Re-queries the platform on every call.
    pub fn list_devices(&self) -> Result<Vec<Device>> {
        enumerator::list_devices(self.backend.as_ref())
    }

    /// Open an exclusive session on a device
    pub fn open(&self, device: &Device) -> Result<DeviceHandle> {
        self.open_by_id(&device.id)
    }

    /// Open an exclusive session by platform device id
    pub fn open_by_id(&self, device_id: &str) -> Result<DeviceHandle> {
        let session = self.backend.open_device(device_id)?;
        let storages = session.storages()?;
        info!(
            "Opened '{}' with {} storage(s)",
            device_id,
            storages.len()
        );
        Ok(DeviceHandle { session, storages })
    }
}

/// An open, exclusive session on one device.
///
/// All [`ObjectId`]s obtained through this handle are valid only for its
/// lifetime; they must not be kept across sessions.
pub struct DeviceHandle {
    session: Box<dyn DeviceSession>,
    storages: Vec<Storage>,
}

impl DeviceHandle {
    /// The device's storage areas, enumerated when the session opened
    pub fn storages(&self) -> &[Storage] {
        &self.storages
    }

    /// The underlying session, for use with [`Walker`](crate::walk::Walker)
    /// and [`transfer`](crate::transfer) directly
    pub fn session(&self) -> &dyn DeviceSession {
        self.session.as_ref()
    }

    /// Device serial number, where the platform reports one
    pub fn serial_number(&self) -> Option<String> {
        self.session.serial_number()
    }

    /// Re-resolve the root object of a storage
    pub fn root_object(&self, storage: &Storage) -> Result<ObjectInfo> {
        self.session.object_info(&storage.id)
    }

    /// Walk the whole device: every storage, top-down. Entry paths are
    /// rooted at the storage descriptions (`Internal Storage/DCIM/...`).
    pub fn walk(&self) -> Walker<'_> {
        let roots: Vec<(String, ObjectId)> = self
            .storages
            .iter()
            .map(|s| (s.description.clone(), s.id.clone()))
            .collect();
        Walker::with_roots(self.session.as_ref(), roots)
    }

    /// Walk the subtree below a container object, rooting entry paths at
    /// `root_path`
    pub fn walk_object(&self, object: &ObjectInfo, root_path: &str) -> Walker<'_> {
        Walker::new(self.session.as_ref(), root_path, object.id.clone())
    }

    /// Walk the subtree at a virtual path (see [`object_by_path`]).
    ///
    /// [`object_by_path`]: DeviceHandle::object_by_path
    pub fn walk_path(&self, path: &str) -> Result<Walker<'_>> {
        let object = self
            .object_by_path(path)?
            .ok_or_else(|| AccessError::ObjectNotFound(path.to_string()))?;
        if !object.is_container() {
            return Err(AccessError::Backend(format!("'{}' is not a folder", path)));
        }
        Ok(Walker::new(
            self.session.as_ref(),
            path,
            object.id.clone(),
        ))
    }

    /// Resolve a `/`-separated virtual path to an object. The first
    /// component is a storage description; the rest are child names,
    /// matched case-sensitively. `Ok(None)` if any component is missing.
    pub fn object_by_path(&self, path: &str) -> Result<Option<ObjectInfo>> {
        let mut components = path.split('/').filter(|c| !c.is_empty());
        let Some(storage_name) = components.next() else {
            return Ok(None);
        };
        let Some(storage) = self
            .storages
            .iter()
            .find(|s| s.description == storage_name)
        else {
            return Ok(None);
        };

        let mut current = ObjectInfo {
            id: storage.id.clone(),
            parent: None,
            name: storage.description.clone(),
            kind: crate::device::object::ObjectKind::Storage,
            size: 0,
            modified: None,
        };

        for component in components {
            let Some(child) = self
                .session
                .list_children(&current.id)?
                .into_iter()
                .find(|c| c.name == component)
            else {
                return Ok(None);
            };
            current = child;
        }
        Ok(Some(current))
    }

    /// Lazy chunked read of a file object
    pub fn read(&self, object: &ObjectInfo, options: &TransferOptions) -> Result<ChunkReader<'_>> {
        transfer::read(self.session.as_ref(), object, options)
    }

    /// Stream a chunk sequence into a new file under `parent`
    pub fn write<I>(
        &self,
        parent: &ObjectId,
        name: &str,
        chunks: I,
        size_hint: Option<u64>,
        options: &TransferOptions,
        progress: impl FnMut(u64),
    ) -> Result<ObjectInfo>
    where
        I: IntoIterator<Item = Result<Vec<u8>>>,
    {
        transfer::write(
            self.session.as_ref(),
            parent,
            name,
            chunks,
            size_hint,
            options,
            progress,
        )
    }

    /// Download a file object into a local file
    pub fn download(
        &self,
        object: &ObjectInfo,
        local_path: &Path,
        options: &TransferOptions,
        mut progress: impl FnMut(u64),
    ) -> Result<u64> {
        let mut output = File::create(local_path)?;
        let mut written = 0u64;
        for chunk in self.read(object, options)? {
            let chunk = chunk?;
            output.write_all(&chunk)?;
            written += chunk.len() as u64;
            progress(written);
        }
        output.flush()?;
        debug!(
            "Downloaded '{}' to '{}' ({} bytes)",
            object.name,
            local_path.display(),
            written
        );
        Ok(written)
    }

    /// Upload a local file as a new object under `parent`
    pub fn upload(
        &self,
        parent: &ObjectId,
        name: &str,
        local_path: &Path,
        options: &TransferOptions,
        progress: impl FnMut(u64),
    ) -> Result<ObjectInfo> {
        let input = File::open(local_path)?;
        let size = input.metadata().map(|m| m.len()).ok();
        transfer::write_from_reader(
            self.session.as_ref(),
            parent,
            name,
            input,
            size,
            options,
            progress,
        )
    }

    /// Create every missing directory along a virtual path and return the
    /// final folder. The storage component must already exist.
    pub fn make_dirs(&self, path: &str) -> Result<ObjectInfo> {
        let mut components = path.split('/').filter(|c| !c.is_empty());
        let Some(storage_name) = components.next() else {
            return Err(AccessError::Backend("empty path".to_string()));
        };
        let storage = self
            .storages
            .iter()
            .find(|s| s.description == storage_name)
            .ok_or_else(|| AccessError::ObjectNotFound(storage_name.to_string()))?;

        let mut current = ObjectInfo {
            id: storage.id.clone(),
            parent: None,
            name: storage.description.clone(),
            kind: crate::device::object::ObjectKind::Storage,
            size: 0,
            modified: None,
        };
        let mut current_path = storage.description.clone();

        for component in components {
            current_path = join_virtual_path(&current_path, component);
            let existing = self
                .session
                .list_children(&current.id)?
                .into_iter()
                .find(|c| c.name == component);
            current = match existing {
                Some(child) if child.is_container() => child,
                Some(_) => {
                    return Err(AccessError::Backend(format!(
                        "'{}' exists and is not a folder",
                        current_path
                    )))
                }
                None => {
                    debug!("Creating folder '{}'", current_path);
                    self.session.create_folder(&current.id, component)?
                }
            };
        }
        Ok(current)
    }

    /// Delete a file, or a folder with its contents
    pub fn remove(&self, object: &ObjectInfo) -> Result<()> {
        self.session.delete_object(&object.id)
    }
}

/// The native backend for the host platform
fn native_backend() -> Result<Box<dyn DeviceBackend>> {
    #[cfg(windows)]
    {
        Ok(Box::new(crate::device::wpd::WpdBackend::new()?))
    }
    #[cfg(all(unix, not(windows)))]
    {
        Ok(Box::new(crate::device::gvfs::GvfsBackend::new()?))
    }
    #[cfg(not(any(windows, unix)))]
    {
        Err(AccessError::PlatformUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::mock_backend::{MockBackend, MockFs};

    fn sample_backend() -> MockBackend {
        let mut fs = MockFs::new();
        fs.add_storage("s1", "Internal Storage");
        fs.add_storage("s2", "SD card");
        fs.add_folder("music", "s1", "Music");
        fs.add_file("t1", "music", "track.mp3", b"riff".to_vec());
        fs.add_file("r1", "s2", "note.txt", b"hello".to_vec());
        MockBackend::single_device("dev-1", "Test Phone", fs)
    }

    fn open_sample() -> (PortableAccess, DeviceHandle) {
        let access = PortableAccess::with_backend(Box::new(sample_backend()));
        let devices = access.list_devices().unwrap();
        let handle = access.open(&devices[0]).unwrap();
        (access, handle)
    }

    #[test]
    fn lists_devices_and_storages() {
        let (access, handle) = open_sample();
        let devices = access.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].label, "Test Phone");

        let descriptions: Vec<&str> = handle
            .storages()
            .iter()
            .map(|s| s.description.as_str())
            .collect();
        assert_eq!(descriptions, vec!["Internal Storage", "SD card"]);
    }

    #[test]
    fn whole_device_walk_covers_all_storages() {
        let (_access, handle) = open_sample();
        let paths: Vec<String> = handle.walk().map(|e| e.unwrap().path).collect();
        assert_eq!(
            paths,
            vec!["Internal Storage", "SD card", "Internal Storage/Music"]
        );
    }

    #[test]
    fn storage_roots_resolve_to_container_objects() {
        let (_access, handle) = open_sample();
        let root = handle.root_object(&handle.storages()[0]).unwrap();
        assert!(root.is_container());
        assert_eq!(root.name, "Internal Storage");
    }

    #[test]
    fn resolves_objects_by_path() {
        let (_access, handle) = open_sample();

        let track = handle
            .object_by_path("Internal Storage/Music/track.mp3")
            .unwrap()
            .unwrap();
        assert_eq!(track.name, "track.mp3");
        assert_eq!(track.size, 4);

        assert!(handle
            .object_by_path("Internal Storage/Music/missing.mp3")
            .unwrap()
            .is_none());
        assert!(handle.object_by_path("No Such Storage").unwrap().is_none());

        // Matching is case-sensitive, like the device's own namespace
        assert!(handle
            .object_by_path("Internal Storage/music")
            .unwrap()
            .is_none());
    }

    #[test]
    fn walk_path_rejects_files() {
        let (_access, handle) = open_sample();
        assert!(handle.walk_path("Internal Storage/Music").is_ok());
        assert!(handle
            .walk_path("Internal Storage/Music/track.mp3")
            .is_err());
    }

    #[test]
    fn make_dirs_creates_missing_levels_idempotently() {
        let (_access, handle) = open_sample();

        let created = handle.make_dirs("Internal Storage/Music/Albums/Live").unwrap();
        assert_eq!(created.name, "Live");

        // Second call resolves the same folders without error
        let again = handle.make_dirs("Internal Storage/Music/Albums/Live").unwrap();
        assert_eq!(again.id, created.id);

        assert!(handle
            .object_by_path("Internal Storage/Music/Albums/Live")
            .unwrap()
            .is_some());
    }

    #[test]
    fn make_dirs_refuses_file_components() {
        let (_access, handle) = open_sample();
        assert!(handle
            .make_dirs("Internal Storage/Music/track.mp3/sub")
            .is_err());
    }

    #[test]
    fn remove_deletes_subtrees() {
        let (_access, handle) = open_sample();
        let music = handle
            .object_by_path("Internal Storage/Music")
            .unwrap()
            .unwrap();
        handle.remove(&music).unwrap();
        assert!(handle.object_by_path("Internal Storage/Music").unwrap().is_none());
    }

    #[test]
    fn download_and_upload_round_trip() {
        let (_access, handle) = open_sample();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("track.mp3");

        let track = handle
            .object_by_path("Internal Storage/Music/track.mp3")
            .unwrap()
            .unwrap();
        let bytes = handle
            .download(&track, &local, &TransferOptions::default(), |_| {})
            .unwrap();
        assert_eq!(bytes, 4);
        assert_eq!(std::fs::read(&local).unwrap(), b"riff");

        let music = handle
            .object_by_path("Internal Storage/Music")
            .unwrap()
            .unwrap();
        let uploaded = handle
            .upload(
                &music.id,
                "copy.mp3",
                &local,
                &TransferOptions::default(),
                |_| {},
            )
            .unwrap();
        assert_eq!(uploaded.size, 4);
    }

    #[test]
    fn open_unknown_device_fails() {
        let access = PortableAccess::with_backend(Box::new(sample_backend()));
        assert!(matches!(
            access.open_by_id("no-such-device"),
            Err(AccessError::DeviceNotFound(_))
        ));
    }
}
