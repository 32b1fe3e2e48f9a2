//! MTP Access Library
//!
//! A unified abstraction for browsing and transferring files on MTP devices
//! (smartphones, tablets, media players) across Windows and Linux. Windows
//! goes through the Windows Portable Devices (WPD) COM API; Linux goes
//! through the gvfs MTP mount. Callers see one contract and never branch on
//! platform.
//!
//! # Architecture
//!
//! - [`core`] - Error handling and configuration
//! - [`device`] - Object model, backend traits and the platform backends
//! - [`walk`] - Lazy, race-tolerant directory traversal
//! - [`transfer`] - Streaming chunked reads and writes with cancellation
//! - [`facade`] - [`PortableAccess`], the single entry point
//! - [`cli`] - Command-line interface (only used by the binary)
//! - [`testdb`] - In-memory mock backend for testing without a device
//!
//! MTP devices expose a handle-based object store that mutates outside this
//! process's control: the phone's apps create and delete files while we
//! browse, and the cable can be pulled at any time. The crate treats
//! staleness as an expected condition — handles are session-scoped, objects
//! are re-resolved on every access, and the walker skips entries that
//! vanish mid-traversal instead of failing the walk.
//!
//! # Example
//!
//! ```rust,no_run
//! use mtp_access::facade::PortableAccess;
//! use mtp_access::transfer::TransferOptions;
//!
//! fn main() -> mtp_access::core::Result<()> {
//!     // On Windows, initialize COM first:
//!     // let _com = mtp_access::device::wpd::initialize_com()?;
//!
//!     let access = PortableAccess::new()?;
//!     for device in access.list_devices()? {
//!         println!("{}", device);
//!         let handle = access.open(&device)?;
//!         for entry in handle.walk() {
//!             let entry = entry?;
//!             for file in &entry.files {
//!                 println!("  {}/{}", entry.path, file.name);
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Testing without a device
//!
//! ```rust
//! use mtp_access::facade::PortableAccess;
//! use mtp_access::testdb::{MockBackend, MockFs};
//!
//! let mut fs = MockFs::new();
//! fs.add_storage("s1", "Internal Storage");
//! fs.add_file("f1", "s1", "hello.txt", b"hi".to_vec());
//!
//! let access = PortableAccess::with_backend(Box::new(
//!     MockBackend::single_device("dev-1", "Fake Phone", fs),
//! ));
//! assert_eq!(access.list_devices().unwrap().len(), 1);
//! ```

pub mod cli;
pub mod core;
pub mod device;
pub mod facade;
pub mod testdb;
pub mod transfer;
pub mod walk;

pub use self::core::error::{AccessError, Result};
pub use self::device::object::{Device, ObjectId, ObjectInfo, ObjectKind, Storage};
pub use self::facade::{DeviceHandle, PortableAccess};
pub use self::transfer::{CancelToken, TransferOptions};
pub use self::walk::{WalkEntry, Walker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
