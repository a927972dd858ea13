//! Compute device pinning.

use serde::{Deserialize, Serialize};

/// Adapter pinned by configuration. Unset fields leave the choice to the
/// automatic throughput ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelection {
    /// Backend name, e.g. "Vulkan" or "Metal" (case-insensitive)
    pub platform: Option<String>,

    /// Adapter name as reported by the driver (case-insensitive)
    pub device: Option<String>,
}

impl DeviceSelection {
    pub fn is_pinned(&self) -> bool {
        self.platform.is_some() || self.device.is_some()
    }
}
