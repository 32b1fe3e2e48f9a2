//! Test backend: an in-memory device without the hardware
//!
//! [`MockBackend`](mock_backend::MockBackend) implements the same traits as
//! the platform backends over an in-memory object store, with fault
//! injection for the conditions that matter on real devices: objects
//! vanishing between listing and visit, devices disconnecting mid-walk or
//! mid-transfer, locked devices, flaky reads.
//!
//! Tests hold the shared filesystem handle and mutate it while a walk or
//! transfer is in flight, which is exactly how a phone behaves.

pub mod mock_backend;

pub use mock_backend::{MockBackend, MockConfig, MockFs};
