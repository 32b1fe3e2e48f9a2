//! Device access: object model, backend traits and the platform backends
//!
//! The platform-independent parts of the crate only ever see the traits in
//! [`traits`]; the concrete backend is chosen once, at facade construction.
//!
//! # Submodules
//!
//! - `object` - Devices, storages, objects and handles
//! - `traits` - The backend capability set
//! - `enumerator` - Device discovery and display-name policy
//! - `wpd` - Windows backend (Windows Portable Devices COM API)
//! - `gvfs` - Linux backend (gvfs MTP mount)

pub mod enumerator;
pub mod object;
pub mod traits;

#[cfg(unix)]
pub mod gvfs;
#[cfg(windows)]
pub mod wpd;

pub use enumerator::list_devices;
pub use object::{Device, ObjectId, ObjectInfo, ObjectKind, Storage};
pub use traits::{DeviceBackend, DeviceSession, ObjectWriter, RawDeviceInfo};

#[cfg(windows)]
pub use wpd::{initialize_com, ComGuard, WpdBackend};

#[cfg(unix)]
pub use gvfs::GvfsBackend;
