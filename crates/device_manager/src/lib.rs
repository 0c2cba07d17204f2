//! # Device Manager
//!
//! Depth camera device management.
//!
//! Responsibilities:
//! - Enumerate devices through the hardware layer and track the selection
//! - Drive devices through open / start / stop / close
//! - Own native handles with guaranteed release
//! - Provide a mock hardware layer for running without devices
//!
//! ## Usage
//!
//! ```ignore
//! let backend = Arc::new(MockBackend::with_serials(["AB12"]));
//! let mut manager = DeviceManager::new(backend);
//! manager.refresh()?;
//! manager.select(0);
//! manager.open(0)?;
//! let sync = manager.start_streaming(0, ChannelSet::ALL)?;
//! ```

pub mod backend;
pub mod handle;
pub mod lifecycle;
pub mod manager;
pub mod mock_backend;
pub mod registry;

pub use backend::DeviceBackend;
pub use contracts::{DeviceIndex, DeviceRecord, DeviceState};
pub use frame_sync::{FrameSet, FrameSynchronizer};
pub use handle::ScopedHandle;
pub use lifecycle::LifecycleController;
pub use manager::{DeviceManager, SharedDeviceManager};
pub use mock_backend::{MockBackend, MockConfig, MockHandle};
pub use registry::DeviceRegistry;
