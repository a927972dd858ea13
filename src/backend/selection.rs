//! Adapter choice: pure ranking over adapter summaries.

use crate::params::DeviceSelection;

/// Adapter kind, ordered by expected floating-point throughput
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterClass {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
    Cpu,
    Other,
}

impl AdapterClass {
    fn throughput_rank(self) -> u8 {
        match self {
            AdapterClass::DiscreteGpu => 4,
            AdapterClass::IntegratedGpu => 3,
            AdapterClass::VirtualGpu => 2,
            AdapterClass::Cpu => 1,
            AdapterClass::Other => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSummary {
    pub name: String,
    /// Backend name, e.g. "Vulkan"
    pub platform: String,
    pub class: AdapterClass,
    /// Compute kernels can be compiled and run
    pub compute: bool,
    /// Adapter can present to the window surface, so kernel output is
    /// visible to the graphics pipeline without a host copy
    pub presentable: bool,
}

impl AdapterSummary {
    pub fn eligible(&self) -> bool {
        self.compute && self.presentable
    }

    fn matches(&self, selection: &DeviceSelection) -> bool {
        let platform_ok = selection
            .platform
            .as_ref()
            .map_or(true, |p| p.eq_ignore_ascii_case(&self.platform));
        let device_ok = selection
            .device
            .as_ref()
            .map_or(true, |d| d.eq_ignore_ascii_case(&self.name));
        platform_ok && device_ok
    }
}

/// Index of the adapter to use.
///
/// Only eligible adapters are considered. A pinned platform/device wins when
/// it is eligible; otherwise the highest-throughput adapter is chosen, first
/// enumerated on ties. Without hardware acceleration CPU adapters are
/// preferred when one exists.
pub fn select_adapter(
    adapters: &[AdapterSummary],
    selection: &DeviceSelection,
    hardware_accelerated: bool,
) -> Option<usize> {
    let eligible: Vec<usize> = adapters
        .iter()
        .enumerate()
        .filter(|(_, adapter)| adapter.eligible())
        .map(|(index, _)| index)
        .collect();

    if selection.is_pinned() {
        if let Some(&index) = eligible
            .iter()
            .find(|&&index| adapters[index].matches(selection))
        {
            return Some(index);
        }
        log::warn!(
            "Pinned adapter (platform {:?}, device {:?}) is unavailable, selecting automatically",
            selection.platform,
            selection.device
        );
    }

    let mut candidates = eligible;
    if !hardware_accelerated {
        let software: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&index| adapters[index].class == AdapterClass::Cpu)
            .collect();
        if software.is_empty() {
            log::warn!("No software adapter available, using hardware");
        } else {
            candidates = software;
        }
    }

    // max_by_key returns the last maximum; iterate in reverse to keep the first
    candidates
        .into_iter()
        .rev()
        .max_by_key(|&index| adapters[index].class.throughput_rank())
}
