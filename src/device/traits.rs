//! Backend abstraction traits
//!
//! Each platform device stack (Windows WPD, Linux gvfs) and the in-memory
//! test backend implement the same small capability set: enumerate devices,
//! open a session, list children, read bytes, write bytes. Everything above
//! this seam — enumeration policy, walking, transfers, the facade — is
//! platform independent.
//!
//! Sessions serialize all operations against one device; device access
//! stacks are generally not safe for concurrent calls on the same device.
//! Independent devices may be driven from separate sessions.

use std::io::Read;

use crate::core::error::Result;
use crate::device::object::{ObjectId, ObjectInfo, Storage};

/// Raw device identity as the platform reports it.
///
/// Names may be missing, empty or whitespace; the enumerator turns this
/// into a [`Device`](crate::device::object::Device) with a usable label.
#[derive(Debug, Clone, Default)]
pub struct RawDeviceInfo {
    /// Stable platform identity
    pub device_id: String,
    /// User-assigned name, if the platform reports one
    pub friendly_name: Option<String>,
    /// Model/description string, if the platform reports one
    pub description: Option<String>,
}

/// A platform device stack: discovers attached devices and opens sessions
pub trait DeviceBackend: Send + Sync {
    /// Identities of all attached MTP devices.
    ///
    /// Re-queries the platform on every call; devices attach and detach
    /// outside this process's control, so results are never cached.
    /// Failure to read one device's names must not abort the listing —
    /// backends report unreadable names as `None`, not as errors.
    fn enumerate_devices(&self) -> Result<Vec<RawDeviceInfo>>;

    /// Open an exclusive session on a device.
    ///
    /// All handles obtained through the session are valid only until the
    /// session is dropped or the device disconnects.
    fn open_device(&self, device_id: &str) -> Result<Box<dyn DeviceSession>>;
}

/// An open, exclusive session on one device.
///
/// Dropping the session releases the underlying platform resources on
/// every exit path (the WPD session closes its COM device object in
/// `Drop`).
pub trait DeviceSession {
    /// Identity of the device this session is bound to
    fn device_id(&self) -> &str;

    /// The device's storage areas
    fn storages(&self) -> Result<Vec<Storage>>;

    /// Immediate children of a container object.
    ///
    /// Fails with `ObjectNotFound` if the container was deleted on the
    /// device since its handle was obtained.
    fn list_children(&self, parent: &ObjectId) -> Result<Vec<ObjectInfo>>;

    /// Re-resolve a single object
    fn object_info(&self, id: &ObjectId) -> Result<ObjectInfo>;

    /// Open a file object for reading.
    ///
    /// Read errors caused by the device going away surface as
    /// `std::io::ErrorKind::NotConnected`; the transfer engine maps those
    /// to `DeviceDisconnected`.
    fn open_read<'a>(&'a self, id: &ObjectId) -> Result<Box<dyn Read + 'a>>;

    /// Start writing a new file object under `parent`.
    ///
    /// `size_hint` is the total length when the caller knows it; the WPD
    /// backend forwards it as the object size property.
    fn create_file<'a>(
        &'a self,
        parent: &ObjectId,
        name: &str,
        size_hint: Option<u64>,
    ) -> Result<Box<dyn ObjectWriter + 'a>>;

    /// Create an empty folder under `parent`
    fn create_folder(&self, parent: &ObjectId, name: &str) -> Result<ObjectInfo>;

    /// Delete a file, or a folder together with its contents
    fn delete_object(&self, id: &ObjectId) -> Result<()>;

    /// Device serial number, where the platform reports one
    fn serial_number(&self) -> Option<String>;
}

/// In-progress upload of one file object.
///
/// The object only becomes visible as a committed file after [`commit`];
/// [`abort`] discards everything written so far. Exactly one of the two
/// must be called — dropping a writer without committing also discards the
/// partial object, so an abandoned upload never leaves a half-written file
/// behind.
///
/// [`commit`]: ObjectWriter::commit
/// [`abort`]: ObjectWriter::abort
pub trait ObjectWriter {
    /// Append one chunk
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;

    /// Finalize the object on the device
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the partial object
    fn abort(self: Box<Self>) -> Result<()>;
}
