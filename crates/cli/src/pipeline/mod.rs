//! Pipeline orchestration module.

mod orchestrator;
mod stats;

use std::sync::Arc;

use contracts::VisionConfig;
use device_manager::{DeviceManager, MockBackend, MockConfig};

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;

/// Device manager over the configured hardware layer
pub fn build_manager(config: &VisionConfig) -> DeviceManager<MockBackend> {
    let backend = MockBackend::with_config(MockConfig::from(&config.backend));
    DeviceManager::new(Arc::new(backend))
}
