//! In-memory mock implementation of the backend traits

use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Local;

use crate::core::error::{AccessError, Result};
use crate::device::object::{ObjectId, ObjectInfo, ObjectKind, Storage};
use crate::device::traits::{DeviceBackend, DeviceSession, ObjectWriter, RawDeviceInfo};

/// Root parent id used by the mock store
const MOCK_ROOT: &str = "DEVICE";

/// Fault injection for a mock device
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Simulate a locked device: every operation is denied
    pub locked: bool,
    /// Disconnect after this many successful child listings
    pub disconnect_after_lists: Option<usize>,
    /// Disconnect after this many file reads
    pub disconnect_after_reads: Option<usize>,
    /// Object ids whose reads fail mid-stream
    pub read_error_objects: Vec<String>,
    /// Object ids the device refuses to list or read (e.g. DRM folders)
    pub denied_objects: Vec<String>,
    /// Probability (0-100) that any read fails
    pub flaky_read_rate: u8,
}

impl MockConfig {
    /// Config simulating a locked device
    pub fn locked() -> Self {
        Self {
            locked: true,
            ..Default::default()
        }
    }

    /// Config that disconnects after N listings
    pub fn disconnect_after_lists(count: usize) -> Self {
        Self {
            disconnect_after_lists: Some(count),
            ..Default::default()
        }
    }

    /// Config with a percentage of randomly failing reads
    pub fn flaky(rate: u8) -> Self {
        Self {
            flaky_read_rate: rate.min(100),
            ..Default::default()
        }
    }
}

/// One object in the mock store
#[derive(Debug, Clone)]
struct MockObject {
    id: String,
    parent: String,
    name: String,
    kind: ObjectKind,
    content: Vec<u8>,
}

impl MockObject {
    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            id: ObjectId::new(self.id.as_str()),
            parent: Some(ObjectId::new(self.parent.as_str())),
            name: self.name.clone(),
            kind: self.kind,
            size: if self.kind == ObjectKind::File {
                self.content.len() as u64
            } else {
                0
            },
            modified: Some(Local::now()),
        }
    }
}

/// In-memory device filesystem, shared between a session and the test that
/// mutates it mid-operation
#[derive(Debug, Default)]
pub struct MockFs {
    objects: HashMap<String, MockObject>,
    config: MockConfig,
}

impl MockFs {
    /// Empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fault-injection config
    pub fn set_config(&mut self, config: MockConfig) {
        self.config = config;
    }

    /// Add a storage root
    pub fn add_storage(&mut self, id: &str, description: &str) {
        self.objects.insert(
            id.to_string(),
            MockObject {
                id: id.to_string(),
                parent: MOCK_ROOT.to_string(),
                name: description.to_string(),
                kind: ObjectKind::Storage,
                content: Vec::new(),
            },
        );
    }

    /// Add a folder below `parent`
    pub fn add_folder(&mut self, id: &str, parent: &str, name: &str) {
        self.objects.insert(
            id.to_string(),
            MockObject {
                id: id.to_string(),
                parent: parent.to_string(),
                name: name.to_string(),
                kind: ObjectKind::Folder,
                content: Vec::new(),
            },
        );
    }

    /// Add a file below `parent`
    pub fn add_file(&mut self, id: &str, parent: &str, name: &str, content: Vec<u8>) {
        self.objects.insert(
            id.to_string(),
            MockObject {
                id: id.to_string(),
                parent: parent.to_string(),
                name: name.to_string(),
                kind: ObjectKind::File,
                content,
            },
        );
    }

    /// Delete an object and everything below it, as the device itself
    /// would (e.g. an app clearing its cache mid-walk)
    pub fn remove_object(&mut self, id: &str) {
        let children: Vec<String> = self
            .objects
            .values()
            .filter(|obj| obj.parent == id)
            .map(|obj| obj.id.clone())
            .collect();
        for child in children {
            self.remove_object(&child);
        }
        self.objects.remove(id);
    }

    /// Look up a child by name below `parent`
    pub fn find_by_name(&self, parent: &str, name: &str) -> Option<ObjectInfo> {
        self.objects
            .values()
            .find(|obj| obj.parent == parent && obj.name == name)
            .map(MockObject::info)
    }

    /// Number of objects currently in the store
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn children_of(&self, parent: &str) -> Vec<&MockObject> {
        self.objects
            .values()
            .filter(|obj| obj.parent == parent)
            .collect()
    }
}

/// Mock device backend holding any number of mock devices
#[derive(Default)]
pub struct MockBackend {
    devices: Vec<(RawDeviceInfo, Arc<Mutex<MockFs>>)>,
}

impl MockBackend {
    /// Backend with no devices attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with exactly one device
    pub fn single_device(device_id: &str, name: &str, fs: MockFs) -> Self {
        let mut backend = Self::new();
        backend.add_device(device_id, name, fs);
        backend
    }

    /// Backend with one device using the given fault config
    pub fn single_device_with_config(
        device_id: &str,
        name: &str,
        fs: MockFs,
        config: MockConfig,
    ) -> Self {
        let mut backend = Self::new();
        backend.add_device_with_config(device_id, name, fs, config);
        backend
    }

    /// Attach a device
    pub fn add_device(&mut self, device_id: &str, name: &str, fs: MockFs) {
        self.add_device_raw(
            RawDeviceInfo {
                device_id: device_id.to_string(),
                friendly_name: Some(name.to_string()),
                description: Some(name.to_string()),
            },
            fs,
        );
    }

    /// Attach a device with fault injection
    pub fn add_device_with_config(
        &mut self,
        device_id: &str,
        name: &str,
        mut fs: MockFs,
        config: MockConfig,
    ) {
        fs.set_config(config);
        self.add_device(device_id, name, fs);
    }

    /// Attach a device with full control over the raw identity, e.g. to
    /// simulate devices that report empty or missing names
    pub fn add_device_raw(&mut self, raw: RawDeviceInfo, fs: MockFs) {
        self.devices.push((raw, Arc::new(Mutex::new(fs))));
    }

    /// Shared handle to a device's filesystem, for mid-operation mutation
    pub fn fs_handle(&self, device_id: &str) -> Option<Arc<Mutex<MockFs>>> {
        self.devices
            .iter()
            .find(|(raw, _)| raw.device_id == device_id)
            .map(|(_, fs)| Arc::clone(fs))
    }
}

impl DeviceBackend for MockBackend {
    fn enumerate_devices(&self) -> Result<Vec<RawDeviceInfo>> {
        Ok(self.devices.iter().map(|(raw, _)| raw.clone()).collect())
    }

    fn open_device(&self, device_id: &str) -> Result<Box<dyn DeviceSession>> {
        let fs = self
            .fs_handle(device_id)
            .ok_or_else(|| AccessError::DeviceNotFound(device_id.to_string()))?;
        Ok(Box::new(MockSession {
            device_id: device_id.to_string(),
            fs,
            list_count: AtomicUsize::new(0),
            read_count: AtomicUsize::new(0),
        }))
    }
}

/// Session over one mock device
pub struct MockSession {
    device_id: String,
    fs: Arc<Mutex<MockFs>>,
    list_count: AtomicUsize,
    read_count: AtomicUsize,
}

impl MockSession {
    fn check_locked(&self, fs: &MockFs) -> Result<()> {
        if fs.config.locked {
            return Err(AccessError::AccessDenied(self.device_id.clone()));
        }
        Ok(())
    }

    fn check_denied(&self, fs: &MockFs, id: &str) -> Result<()> {
        if fs.config.denied_objects.iter().any(|denied| denied == id) {
            return Err(AccessError::AccessDenied(id.to_string()));
        }
        Ok(())
    }

    fn tick_list_counter(&self, fs: &MockFs) -> Result<()> {
        if let Some(limit) = fs.config.disconnect_after_lists {
            let count = self.list_count.fetch_add(1, Ordering::SeqCst) + 1;
            if count > limit {
                return Err(AccessError::DeviceDisconnected);
            }
        }
        Ok(())
    }

    fn tick_read_counter(&self, fs: &MockFs) -> Result<()> {
        if let Some(limit) = fs.config.disconnect_after_reads {
            let count = self.read_count.fetch_add(1, Ordering::SeqCst) + 1;
            if count > limit {
                return Err(AccessError::DeviceDisconnected);
            }
        }
        Ok(())
    }
}

impl DeviceSession for MockSession {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn storages(&self) -> Result<Vec<Storage>> {
        let fs = self.fs.lock().unwrap();
        self.check_locked(&fs)?;
        let mut storages: Vec<Storage> = fs
            .children_of(MOCK_ROOT)
            .into_iter()
            .filter(|obj| obj.kind == ObjectKind::Storage)
            .map(|obj| Storage {
                id: ObjectId::new(obj.id.as_str()),
                description: obj.name.clone(),
                capacity: None,
                free_space: None,
            })
            .collect();
        storages.sort_by(|a, b| a.description.cmp(&b.description));
        Ok(storages)
    }

    fn list_children(&self, parent: &ObjectId) -> Result<Vec<ObjectInfo>> {
        let fs = self.fs.lock().unwrap();
        self.check_locked(&fs)?;
        self.check_denied(&fs, parent.as_str())?;
        self.tick_list_counter(&fs)?;

        if !fs.objects.contains_key(parent.as_str()) {
            return Err(AccessError::ObjectNotFound(parent.to_string()));
        }
        Ok(fs
            .children_of(parent.as_str())
            .into_iter()
            .map(MockObject::info)
            .collect())
    }

    fn object_info(&self, id: &ObjectId) -> Result<ObjectInfo> {
        let fs = self.fs.lock().unwrap();
        self.check_locked(&fs)?;
        fs.objects
            .get(id.as_str())
            .map(MockObject::info)
            .ok_or_else(|| AccessError::ObjectNotFound(id.to_string()))
    }

    fn open_read<'a>(&'a self, id: &ObjectId) -> Result<Box<dyn Read + 'a>> {
        let fs = self.fs.lock().unwrap();
        self.check_locked(&fs)?;
        self.check_denied(&fs, id.as_str())?;
        self.tick_read_counter(&fs)?;

        let obj = fs
            .objects
            .get(id.as_str())
            .ok_or_else(|| AccessError::ObjectNotFound(id.to_string()))?;
        if obj.kind != ObjectKind::File {
            return Err(AccessError::Backend(format!(
                "'{}' is not a file",
                obj.name
            )));
        }

        if fs.config.read_error_objects.contains(&obj.id) {
            return Ok(Box::new(FailingReader));
        }
        if fs.config.flaky_read_rate > 0 {
            let roll = rand::random::<u8>() % 100;
            if roll < fs.config.flaky_read_rate {
                return Ok(Box::new(FailingReader));
            }
        }

        Ok(Box::new(Cursor::new(obj.content.clone())))
    }

    fn create_file<'a>(
        &'a self,
        parent: &ObjectId,
        name: &str,
        _size_hint: Option<u64>,
    ) -> Result<Box<dyn ObjectWriter + 'a>> {
        let mut fs = self.fs.lock().unwrap();
        self.check_locked(&fs)?;
        if !fs.objects.contains_key(parent.as_str()) {
            return Err(AccessError::ObjectNotFound(parent.to_string()));
        }
        let object_id = format!("{}:{}", parent, name);
        // The in-progress object is visible from creation, like on a real
        // device; abort removes it again.
        fs.add_file(&object_id, parent.as_str(), name, Vec::new());
        drop(fs);

        Ok(Box::new(MockWriter {
            fs: Arc::clone(&self.fs),
            object_id,
            parent: parent.to_string(),
            name: name.to_string(),
            buffer: Vec::new(),
        }))
    }

    fn create_folder(&self, parent: &ObjectId, name: &str) -> Result<ObjectInfo> {
        let mut fs = self.fs.lock().unwrap();
        self.check_locked(&fs)?;
        if !fs.objects.contains_key(parent.as_str()) {
            return Err(AccessError::ObjectNotFound(parent.to_string()));
        }
        if fs.find_by_name(parent.as_str(), name).is_some() {
            return Err(AccessError::Backend(format!(
                "'{}' already exists",
                name
            )));
        }
        let id = format!("{}:{}", parent, name);
        fs.add_folder(&id, parent.as_str(), name);
        Ok(fs.objects[&id].info())
    }

    fn delete_object(&self, id: &ObjectId) -> Result<()> {
        let mut fs = self.fs.lock().unwrap();
        self.check_locked(&fs)?;
        if !fs.objects.contains_key(id.as_str()) {
            return Err(AccessError::ObjectNotFound(id.to_string()));
        }
        fs.remove_object(id.as_str());
        Ok(())
    }

    fn serial_number(&self) -> Option<String> {
        Some(format!("MOCK-{}", self.device_id))
    }
}

/// Reader that always fails, used for injected read errors
struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("injected read failure"))
    }
}

/// Upload into the mock store. A placeholder object exists from creation
/// until `commit` or `abort`, mirroring backends where the object appears
/// on the device while the transfer runs.
struct MockWriter {
    fs: Arc<Mutex<MockFs>>,
    object_id: String,
    parent: String,
    name: String,
    buffer: Vec<u8>,
}

impl ObjectWriter for MockWriter {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let mut fs = self.fs.lock().unwrap();
        // Drop any other object still holding this name
        let existing: Vec<String> = fs
            .objects
            .values()
            .filter(|obj| {
                obj.parent == self.parent && obj.name == self.name && obj.id != self.object_id
            })
            .map(|obj| obj.id.clone())
            .collect();
        for id in existing {
            fs.remove_object(&id);
        }
        fs.add_file(&self.object_id, &self.parent, &self.name, self.buffer);
        Ok(())
    }

    fn abort(self: Box<Self>) -> Result<()> {
        let mut fs = self.fs.lock().unwrap();
        fs.remove_object(&self.object_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_device_denies_everything() {
        let mut fs = MockFs::new();
        fs.add_storage("s1", "Internal Storage");
        let backend =
            MockBackend::single_device_with_config("dev-1", "Phone", fs, MockConfig::locked());
        let session = backend.open_device("dev-1").unwrap();

        assert!(matches!(
            session.storages(),
            Err(AccessError::AccessDenied(_))
        ));
        assert!(matches!(
            session.list_children(&ObjectId::from("s1")),
            Err(AccessError::AccessDenied(_))
        ));
    }

    #[test]
    fn removal_is_recursive() {
        let mut fs = MockFs::new();
        fs.add_storage("s1", "Internal Storage");
        fs.add_folder("a", "s1", "A");
        fs.add_file("f1", "a", "f1.txt", b"x".to_vec());
        assert_eq!(fs.object_count(), 3);

        fs.remove_object("a");
        assert_eq!(fs.object_count(), 1);
    }

    #[test]
    fn injected_read_errors_fail_the_stream() {
        let mut fs = MockFs::new();
        fs.add_storage("s1", "Internal Storage");
        fs.add_file("f1", "s1", "bad.bin", vec![0u8; 16]);
        fs.set_config(MockConfig {
            read_error_objects: vec!["f1".to_string()],
            ..Default::default()
        });

        let backend = MockBackend::single_device("dev-1", "Phone", fs);
        let session = backend.open_device("dev-1").unwrap();
        let mut reader = session.open_read(&ObjectId::from("f1")).unwrap();
        let mut buf = [0u8; 8];
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn fully_flaky_device_always_fails_reads() {
        let mut fs = MockFs::new();
        fs.add_storage("s1", "Internal Storage");
        fs.add_file("f1", "s1", "data.bin", vec![0u8; 16]);

        let backend =
            MockBackend::single_device_with_config("dev-1", "Phone", fs, MockConfig::flaky(100));
        let session = backend.open_device("dev-1").unwrap();
        let mut reader = session.open_read(&ObjectId::from("f1")).unwrap();
        let mut buf = [0u8; 8];
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn unknown_parent_reports_object_not_found() {
        let backend = MockBackend::single_device("dev-1", "Phone", MockFs::new());
        let session = backend.open_device("dev-1").unwrap();
        assert!(matches!(
            session.list_children(&ObjectId::from("nope")),
            Err(AccessError::ObjectNotFound(_))
        ));
    }
}
