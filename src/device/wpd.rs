//! Windows backend using the Windows Portable Devices (WPD) API
//!
//! Wraps the WPD COM interface set: `IPortableDeviceManager` for discovery,
//! `IPortableDevice`/`IPortableDeviceContent` for an open session, and
//! `IStream` resources for content transfer. COM must be initialized before
//! any of this is used; see [`initialize_com`].
//!
//! WPD object ids are strings that stay valid only while the device session
//! that produced them is open, which is exactly the contract of
//! [`ObjectId`](crate::device::object::ObjectId).

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use log::{debug, info, trace, warn};
use std::io::{self, Read};
use std::ptr::null_mut;

use windows::{
    core::{GUID, PCWSTR, PWSTR},
    Win32::{
        Devices::PortableDevices::{
            IEnumPortableDeviceObjectIDs, IPortableDevice, IPortableDeviceContent,
            IPortableDeviceKeyCollection, IPortableDeviceManager, IPortableDeviceProperties,
            IPortableDevicePropVariantCollection, IPortableDeviceValues, PortableDeviceFTM,
            PortableDeviceKeyCollection, PortableDeviceManager, PortableDevicePropVariantCollection,
            PortableDeviceValues, WPD_CLIENT_MAJOR_VERSION, WPD_CLIENT_MINOR_VERSION,
            WPD_CLIENT_NAME, WPD_CLIENT_REVISION, WPD_CLIENT_SECURITY_QUALITY_OF_SERVICE,
            WPD_DEVICE_SERIAL_NUMBER, WPD_OBJECT_CONTENT_TYPE, WPD_OBJECT_DATE_MODIFIED,
            WPD_OBJECT_NAME, WPD_OBJECT_ORIGINAL_FILE_NAME, WPD_OBJECT_PARENT_ID, WPD_OBJECT_SIZE,
            WPD_RESOURCE_DEFAULT, WPD_STORAGE_CAPACITY, WPD_STORAGE_FREE_SPACE_IN_BYTES,
        },
        System::Com::{
            CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize,
            StructuredStorage::PROPVARIANT, CLSCTX_INPROC_SERVER, COINIT_MULTITHREADED, IStream,
            STGC_DEFAULT,
        },
        UI::Shell::PropertiesSystem::PROPERTYKEY,
    },
};

use crate::core::error::{AccessError, Result};
use crate::device::object::{ObjectId, ObjectInfo, ObjectKind, Storage};
use crate::device::traits::{DeviceBackend, DeviceSession, ObjectWriter, RawDeviceInfo};

/// Root object id of every WPD device
const DEVICE_OBJECT_ID: &str = "DEVICE";

/// GUID for folder content type
const WPD_CONTENT_TYPE_FOLDER: GUID = GUID::from_u128(0x27e2e392_a111_48e0_ab0c_e17705a05f85);

/// GUID for functional object content type (storage roots like
/// "Internal Storage")
const WPD_CONTENT_TYPE_FUNCTIONAL_OBJECT: GUID =
    GUID::from_u128(0x99ed0160_17ff_4c44_9d98_1d7a6f941921);

/// Delete flag accepted by `IPortableDeviceContent::Delete`
const WPD_DELETE_WITH_RECURSION: u32 = 1;

// HRESULTs that classify how a COM failure propagates
const E_ACCESSDENIED: u32 = 0x8007_0005;
const HR_FILE_NOT_FOUND: u32 = 0x8007_0002;
const HR_ELEMENT_NOT_FOUND: u32 = 0x8007_0490;
const HR_DEVICE_NOT_CONNECTED: u32 = 0x8007_048F;
const HR_DEVICE_REMOVED: u32 = 0x8007_0651;

/// Classify a COM error into the crate's error kinds
fn map_com_error(err: &windows::core::Error, context: &str) -> AccessError {
    match err.code().0 as u32 {
        E_ACCESSDENIED => AccessError::AccessDenied(context.to_string()),
        HR_FILE_NOT_FOUND | HR_ELEMENT_NOT_FOUND => AccessError::ObjectNotFound(context.to_string()),
        HR_DEVICE_NOT_CONNECTED | HR_DEVICE_REMOVED => AccessError::DeviceDisconnected,
        _ => AccessError::Backend(format!("{}: {}", context, err)),
    }
}

fn is_device_gone(hresult: u32) -> bool {
    matches!(hresult, HR_DEVICE_NOT_CONNECTED | HR_DEVICE_REMOVED)
}

/// NUL-terminated UTF-16 for passing strings into COM
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Windows MTP backend over the WPD COM interfaces
pub struct WpdBackend {
    manager: IPortableDeviceManager,
}

impl WpdBackend {
    /// Create the backend (COM must already be initialized)
    pub fn new() -> Result<Self> {
        unsafe {
            let manager: IPortableDeviceManager =
                CoCreateInstance(&PortableDeviceManager, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| AccessError::Com(format!("failed to create device manager: {}", e)))?;
            Ok(Self { manager })
        }
    }

    /// Read one of the manager's per-device strings, tolerating absence
    fn manager_string<F>(&self, device_id: &str, read: F) -> Option<String>
    where
        F: Fn(PCWSTR, PWSTR, &mut u32) -> windows::core::Result<()>,
    {
        let device_id_wide = to_wide(device_id);
        let device_id_pcwstr = PCWSTR(device_id_wide.as_ptr());

        let mut length: u32 = 0;
        let _ = read(device_id_pcwstr, PWSTR::null(), &mut length);
        if length == 0 {
            return None;
        }

        let mut buffer: Vec<u16> = vec![0; length as usize];
        read(device_id_pcwstr, PWSTR(buffer.as_mut_ptr()), &mut length).ok()?;
        Some(String::from_utf16_lossy(&buffer[..length.saturating_sub(1) as usize]))
    }
}

impl DeviceBackend for WpdBackend {
    fn enumerate_devices(&self) -> Result<Vec<RawDeviceInfo>> {
        unsafe {
            let _ = self.manager.RefreshDeviceList();

            let mut device_count: u32 = 0;
            self.manager
                .GetDevices(null_mut(), &mut device_count)
                .map_err(|e| map_com_error(&e, "failed to get device count"))?;

            if device_count == 0 {
                return Ok(Vec::new());
            }

            let mut device_ids: Vec<PWSTR> = vec![PWSTR::null(); device_count as usize];
            self.manager
                .GetDevices(device_ids.as_mut_ptr(), &mut device_count)
                .map_err(|e| map_com_error(&e, "failed to enumerate devices"))?;

            let mut devices = Vec::new();
            for device_id_ptr in device_ids.iter().take(device_count as usize) {
                if device_id_ptr.is_null() {
                    continue;
                }
                let device_id = device_id_ptr.to_string().unwrap_or_default();

                // A device that refuses its name properties still gets
                // listed; the enumerator synthesizes a label.
                let friendly_name = self.manager_string(&device_id, |id, buf, len| {
                    self.manager.GetDeviceFriendlyName(id, buf, len)
                });
                let description = self.manager_string(&device_id, |id, buf, len| {
                    self.manager.GetDeviceDescription(id, buf, len)
                });

                devices.push(RawDeviceInfo {
                    device_id,
                    friendly_name,
                    description,
                });

                CoTaskMemFree(Some(device_id_ptr.0 as *const _));
            }

            Ok(devices)
        }
    }

    fn open_device(&self, device_id: &str) -> Result<Box<dyn DeviceSession>> {
        unsafe {
            let device: IPortableDevice =
                CoCreateInstance(&PortableDeviceFTM, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| map_com_error(&e, "failed to create device object"))?;

            let client_info: IPortableDeviceValues =
                CoCreateInstance(&PortableDeviceValues, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| map_com_error(&e, "failed to create client info"))?;

            let client_name = to_wide("mtp-access");
            client_info
                .SetStringValue(&WPD_CLIENT_NAME, PCWSTR(client_name.as_ptr()))
                .map_err(|e| map_com_error(&e, "failed to set client name"))?;
            client_info
                .SetUnsignedIntegerValue(&WPD_CLIENT_MAJOR_VERSION, 1)
                .map_err(|e| map_com_error(&e, "failed to set client version"))?;
            client_info
                .SetUnsignedIntegerValue(&WPD_CLIENT_MINOR_VERSION, 0)
                .map_err(|e| map_com_error(&e, "failed to set client version"))?;
            client_info
                .SetUnsignedIntegerValue(&WPD_CLIENT_REVISION, 0)
                .map_err(|e| map_com_error(&e, "failed to set client revision"))?;
            client_info
                .SetUnsignedIntegerValue(&WPD_CLIENT_SECURITY_QUALITY_OF_SERVICE, 0x0002_0000)
                .map_err(|e| map_com_error(&e, "failed to set security QOS"))?;

            let device_id_wide = to_wide(device_id);
            device
                .Open(PCWSTR(device_id_wide.as_ptr()), &client_info)
                .map_err(|e| map_com_error(&e, &format!("failed to open device '{}'", device_id)))?;

            let content = device
                .Content()
                .map_err(|e| map_com_error(&e, "failed to get device content"))?;
            let properties = content
                .Properties()
                .map_err(|e| map_com_error(&e, "failed to get device properties"))?;

            // One key collection for every property read, like the single
            // set of keys the device is asked for on each object.
            let object_keys: IPortableDeviceKeyCollection =
                CoCreateInstance(&PortableDeviceKeyCollection, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| map_com_error(&e, "failed to create key collection"))?;
            object_keys.Add(&WPD_OBJECT_NAME).ok();
            object_keys.Add(&WPD_OBJECT_ORIGINAL_FILE_NAME).ok();
            object_keys.Add(&WPD_OBJECT_PARENT_ID).ok();
            object_keys.Add(&WPD_OBJECT_CONTENT_TYPE).ok();
            object_keys.Add(&WPD_OBJECT_SIZE).ok();
            object_keys.Add(&WPD_OBJECT_DATE_MODIFIED).ok();
            object_keys.Add(&WPD_STORAGE_CAPACITY).ok();
            object_keys.Add(&WPD_STORAGE_FREE_SPACE_IN_BYTES).ok();
            object_keys.Add(&WPD_DEVICE_SERIAL_NUMBER).ok();

            info!("Opened device session: {}", device_id);

            Ok(Box::new(WpdSession {
                device,
                content,
                properties,
                object_keys,
                device_id: device_id.to_string(),
            }))
        }
    }
}

/// Properties of one object as read from the device
struct RawObject {
    info: ObjectInfo,
    capacity: Option<u64>,
    free_space: Option<u64>,
}

/// Open session on one WPD device.
///
/// Closes the COM device object on drop, so handles are released on every
/// exit path.
pub struct WpdSession {
    device: IPortableDevice,
    content: IPortableDeviceContent,
    properties: IPortableDeviceProperties,
    object_keys: IPortableDeviceKeyCollection,
    device_id: String,
}

impl Drop for WpdSession {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.Close();
        }
    }
}

impl WpdSession {
    /// Get a string value out of a property bag, freeing the COM string
    fn get_string_value(
        &self,
        values: &IPortableDeviceValues,
        key: &PROPERTYKEY,
    ) -> Option<String> {
        unsafe {
            let pwstr = values.GetStringValue(key).ok()?;
            let result = pwstr.to_string().unwrap_or_default();
            CoTaskMemFree(Some(pwstr.0 as *const _));
            Some(result)
        }
    }

    /// Read and parse one object's properties
    fn read_object(&self, object_id: &str) -> Result<RawObject> {
        unsafe {
            let object_id_wide = to_wide(object_id);
            let values = self
                .properties
                .GetValues(PCWSTR(object_id_wide.as_ptr()), &self.object_keys)
                .map_err(|e| map_com_error(&e, object_id))?;

            // Prefer the original filename; fall back to the object name.
            // Some objects resolve neither — the walker suppresses them.
            let name = self
                .get_string_value(&values, &WPD_OBJECT_ORIGINAL_FILE_NAME)
                .or_else(|| self.get_string_value(&values, &WPD_OBJECT_NAME))
                .unwrap_or_default();

            let size = values.GetUnsignedLargeIntegerValue(&WPD_OBJECT_SIZE).ok();

            let kind = match values.GetGuidValue(&WPD_OBJECT_CONTENT_TYPE) {
                Ok(content_type) if content_type == WPD_CONTENT_TYPE_FOLDER => ObjectKind::Folder,
                Ok(content_type) if content_type == WPD_CONTENT_TYPE_FUNCTIONAL_OBJECT => {
                    ObjectKind::Storage
                }
                Ok(_) => ObjectKind::File,
                // No content type reported: objects with a size are files
                Err(_) => {
                    if size.is_some() {
                        ObjectKind::File
                    } else {
                        ObjectKind::Folder
                    }
                }
            };

            let parent = self
                .get_string_value(&values, &WPD_OBJECT_PARENT_ID)
                .map(ObjectId::new);

            let modified = self
                .get_string_value(&values, &WPD_OBJECT_DATE_MODIFIED)
                .and_then(|s| parse_wpd_timestamp(&s));

            let capacity = values
                .GetUnsignedLargeIntegerValue(&WPD_STORAGE_CAPACITY)
                .ok();
            let free_space = values
                .GetUnsignedLargeIntegerValue(&WPD_STORAGE_FREE_SPACE_IN_BYTES)
                .ok();

            Ok(RawObject {
                info: ObjectInfo {
                    id: ObjectId::new(object_id),
                    parent,
                    name,
                    kind,
                    size: if kind == ObjectKind::File {
                        size.unwrap_or(0)
                    } else {
                        0
                    },
                    modified,
                },
                capacity,
                free_space,
            })
        }
    }

    /// Enumerate the object ids below a parent and read each one
    fn enumerate_children(&self, parent_id: &str) -> Result<Vec<RawObject>> {
        trace!("Enumerating children of '{}'", parent_id);
        unsafe {
            let parent_id_wide = to_wide(parent_id);

            let enum_objects: IEnumPortableDeviceObjectIDs = self
                .content
                .EnumObjects(0, PCWSTR(parent_id_wide.as_ptr()), None)
                .map_err(|e| {
                    warn!("Failed to enumerate objects in '{}': {}", parent_id, e);
                    map_com_error(&e, parent_id)
                })?;

            let mut objects = Vec::new();
            loop {
                let mut object_ids: [PWSTR; 16] = [PWSTR::null(); 16];
                let mut fetched: u32 = 0;

                let result = enum_objects.Next(&mut object_ids, &mut fetched as *mut u32);
                if fetched == 0 {
                    break;
                }

                for object_id_ptr in object_ids.iter().take(fetched as usize) {
                    if object_id_ptr.is_null() {
                        continue;
                    }
                    let object_id = object_id_ptr.to_string().unwrap_or_default();

                    match self.read_object(&object_id) {
                        Ok(obj) => objects.push(obj),
                        Err(e) if e.is_disconnect() => return Err(e),
                        Err(e) => {
                            // One unreadable child never aborts the listing
                            warn!("Failed to read object '{}': {}", object_id, e);
                        }
                    }

                    CoTaskMemFree(Some(object_id_ptr.0 as *const _));
                }

                if result.is_err() {
                    break;
                }
            }

            debug!("Found {} objects in '{}'", objects.len(), parent_id);
            Ok(objects)
        }
    }
}

impl DeviceSession for WpdSession {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn storages(&self) -> Result<Vec<Storage>> {
        let children = self.enumerate_children(DEVICE_OBJECT_ID)?;
        let mut storages: Vec<Storage> = children
            .into_iter()
            .filter(|obj| obj.info.kind.is_container())
            .map(|obj| Storage {
                id: obj.info.id,
                description: obj.info.name,
                capacity: obj.capacity,
                free_space: obj.free_space,
            })
            .collect();
        storages.sort_by(|a, b| a.description.cmp(&b.description));

        if storages.is_empty() {
            warn!("No storages found; the device may be locked or untrusted");
        }

        Ok(storages)
    }

    fn list_children(&self, parent: &ObjectId) -> Result<Vec<ObjectInfo>> {
        Ok(self
            .enumerate_children(parent.as_str())?
            .into_iter()
            .map(|obj| obj.info)
            .collect())
    }

    fn object_info(&self, id: &ObjectId) -> Result<ObjectInfo> {
        Ok(self.read_object(id.as_str())?.info)
    }

    fn open_read<'a>(&'a self, id: &ObjectId) -> Result<Box<dyn Read + 'a>> {
        unsafe {
            let resources = self
                .content
                .Transfer()
                .map_err(|e| map_com_error(&e, "failed to get transfer interface"))?;

            let object_id_wide = to_wide(id.as_str());
            let mut optimal_buffer_size: u32 = 0;
            let mut stream_opt: Option<IStream> = None;

            resources
                .GetStream(
                    PCWSTR(object_id_wide.as_ptr()),
                    &WPD_RESOURCE_DEFAULT,
                    0, // STGM_READ
                    &mut optimal_buffer_size,
                    &mut stream_opt,
                )
                .map_err(|e| map_com_error(&e, id.as_str()))?;

            let stream = stream_opt
                .ok_or_else(|| AccessError::Backend("device returned no read stream".to_string()))?;

            Ok(Box::new(WpdReadStream { stream }))
        }
    }

    fn create_file<'a>(
        &'a self,
        parent: &ObjectId,
        name: &str,
        size_hint: Option<u64>,
    ) -> Result<Box<dyn ObjectWriter + 'a>> {
        unsafe {
            let values: IPortableDeviceValues =
                CoCreateInstance(&PortableDeviceValues, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| map_com_error(&e, "failed to create object properties"))?;

            let parent_wide = to_wide(parent.as_str());
            let name_wide = to_wide(name);
            values
                .SetStringValue(&WPD_OBJECT_PARENT_ID, PCWSTR(parent_wide.as_ptr()))
                .map_err(|e| map_com_error(&e, "failed to set parent id"))?;
            values
                .SetStringValue(&WPD_OBJECT_NAME, PCWSTR(name_wide.as_ptr()))
                .map_err(|e| map_com_error(&e, "failed to set object name"))?;
            values
                .SetStringValue(&WPD_OBJECT_ORIGINAL_FILE_NAME, PCWSTR(name_wide.as_ptr()))
                .map_err(|e| map_com_error(&e, "failed to set file name"))?;
            if let Some(size) = size_hint {
                values
                    .SetUnsignedLargeIntegerValue(&WPD_OBJECT_SIZE, size)
                    .map_err(|e| map_com_error(&e, "failed to set object size"))?;
            }

            let mut stream_opt: Option<IStream> = None;
            let mut optimal_buffer_size: u32 = 0;
            self.content
                .CreateObjectWithPropertiesAndData(
                    &values,
                    &mut stream_opt,
                    &mut optimal_buffer_size,
                    null_mut(),
                )
                .map_err(|e| map_com_error(&e, &format!("failed to create '{}'", name)))?;

            let stream = stream_opt
                .ok_or_else(|| AccessError::Backend("device returned no write stream".to_string()))?;

            debug!("Started upload of '{}' under '{}'", name, parent);

            Ok(Box::new(WpdWriter { stream }))
        }
    }

    fn create_folder(&self, parent: &ObjectId, name: &str) -> Result<ObjectInfo> {
        unsafe {
            let values: IPortableDeviceValues =
                CoCreateInstance(&PortableDeviceValues, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| map_com_error(&e, "failed to create object properties"))?;

            let parent_wide = to_wide(parent.as_str());
            let name_wide = to_wide(name);
            values
                .SetStringValue(&WPD_OBJECT_PARENT_ID, PCWSTR(parent_wide.as_ptr()))
                .map_err(|e| map_com_error(&e, "failed to set parent id"))?;
            values
                .SetStringValue(&WPD_OBJECT_NAME, PCWSTR(name_wide.as_ptr()))
                .map_err(|e| map_com_error(&e, "failed to set folder name"))?;
            values
                .SetStringValue(&WPD_OBJECT_ORIGINAL_FILE_NAME, PCWSTR(name_wide.as_ptr()))
                .map_err(|e| map_com_error(&e, "failed to set folder name"))?;
            values
                .SetGuidValue(&WPD_OBJECT_CONTENT_TYPE, &WPD_CONTENT_TYPE_FOLDER)
                .map_err(|e| map_com_error(&e, "failed to set content type"))?;

            let mut new_object_id = PWSTR::null();
            self.content
                .CreateObjectWithPropertiesOnly(&values, &mut new_object_id)
                .map_err(|e| map_com_error(&e, &format!("failed to create folder '{}'", name)))?;

            let object_id = new_object_id.to_string().unwrap_or_default();
            if !new_object_id.is_null() {
                CoTaskMemFree(Some(new_object_id.0 as *const _));
            }

            debug!("Created folder '{}' (id: {})", name, object_id);

            Ok(ObjectInfo::folder(
                ObjectId::new(object_id),
                Some(parent.clone()),
                name,
            ))
        }
    }

    fn delete_object(&self, id: &ObjectId) -> Result<()> {
        unsafe {
            let objects_to_delete: IPortableDevicePropVariantCollection =
                CoCreateInstance(&PortableDevicePropVariantCollection, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| map_com_error(&e, "failed to create id collection"))?;

            let object_id = PROPVARIANT::from(id.as_str());
            objects_to_delete
                .Add(&object_id)
                .map_err(|e| map_com_error(&e, "failed to queue object for deletion"))?;

            self.content
                .Delete(WPD_DELETE_WITH_RECURSION, &objects_to_delete, null_mut())
                .map_err(|e| map_com_error(&e, id.as_str()))?;

            debug!("Deleted object '{}'", id);
            Ok(())
        }
    }

    fn serial_number(&self) -> Option<String> {
        // The serial number rides on the DEVICE object's property bag
        unsafe {
            let device_wide = to_wide(DEVICE_OBJECT_ID);
            let values = self
                .properties
                .GetValues(PCWSTR(device_wide.as_ptr()), &self.object_keys)
                .ok()?;
            self.get_string_value(&values, &WPD_DEVICE_SERIAL_NUMBER)
        }
    }
}

/// WPD timestamps arrive as strings on most devices, usually in the MTP
/// `YYYYMMDDThhmmss` shape or a `YYYY/MM/DD:hh:mm:ss` variant. Devices that
/// only report OLE dates yield `None`; the field is best-effort.
fn parse_wpd_timestamp(raw: &str) -> Option<DateTime<Local>> {
    const FORMATS: &[&str] = &[
        "%Y%m%dT%H%M%S",
        "%Y%m%dT%H%M%S%.f",
        "%Y/%m/%d:%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];
    let trimmed = raw.trim();
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Local.from_local_datetime(&naive).single();
        }
    }
    None
}

/// `io::Read` over a WPD object's default resource stream
struct WpdReadStream {
    stream: IStream,
}

impl Read for WpdReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut bytes_read: u32 = 0;
        let result = unsafe {
            self.stream.Read(
                buf.as_mut_ptr() as *mut _,
                buf.len() as u32,
                Some(&mut bytes_read),
            )
        };
        // S_FALSE signals end-of-stream with bytes_read == 0
        if result.is_err() && bytes_read == 0 {
            let kind = if is_device_gone(result.0 as u32) {
                io::ErrorKind::NotConnected
            } else {
                io::ErrorKind::Other
            };
            let err = windows::core::Error::from_hresult(result);
            return Err(io::Error::new(kind, format!("device read failed: {}", err)));
        }
        Ok(bytes_read as usize)
    }
}

/// Streamed upload through the IStream returned by
/// `CreateObjectWithPropertiesAndData`. The object only materializes on
/// `Commit`; reverting (or never committing) discards it, which is how a
/// cancelled transfer leaves no partial file on the device.
struct WpdWriter {
    stream: IStream,
}

impl ObjectWriter for WpdWriter {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let mut written_total = 0usize;
        while written_total < chunk.len() {
            let remaining = &chunk[written_total..];
            let mut written: u32 = 0;
            let result = unsafe {
                self.stream.Write(
                    remaining.as_ptr() as *const _,
                    remaining.len() as u32,
                    Some(&mut written),
                )
            };
            if result.is_err() {
                let err = windows::core::Error::from(result);
                return Err(map_com_error(&err, "device write failed"));
            }
            if written == 0 {
                return Err(AccessError::Backend(
                    "device accepted no data on write".to_string(),
                ));
            }
            written_total += written as usize;
        }
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        unsafe {
            self.stream
                .Commit(STGC_DEFAULT)
                .map_err(|e| map_com_error(&e, "failed to commit upload"))?;
        }
        Ok(())
    }

    fn abort(self: Box<Self>) -> Result<()> {
        unsafe {
            let _ = self.stream.Revert();
        }
        Ok(())
    }
}

/// RAII guard for COM initialization
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Initialize the COM library for this thread
    pub fn new() -> Result<Self> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| AccessError::Com(format!("failed to initialize COM: {}", e)))?;
            Ok(Self { initialized: true })
        }
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

/// Initialize COM and return a guard that uninitializes on drop
pub fn initialize_com() -> Result<ComGuard> {
    ComGuard::new()
}
