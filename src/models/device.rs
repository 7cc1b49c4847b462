//! Device detection and placement for ONNX Runtime.
//!
//! A [`DeviceSelector`] reports which accelerators are present; the
//! [`Placement`] chosen from it at construction time decides how many model
//! replicas are loaded and on which execution providers.

use std::fmt;

use nvml_wrapper::Nvml;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::Session;
use tracing::debug;

use crate::config::Device;
use crate::error::{GeneratorError, Result};

/// A concrete device hosting one model replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeDevice {
    /// General-purpose processor.
    Cpu,
    /// NVIDIA GPU with its CUDA ordinal.
    Cuda(i32),
    /// Apple Silicon through CoreML.
    CoreMl,
}

impl ComputeDevice {
    /// Returns true for anything other than the CPU.
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, ComputeDevice::Cpu)
    }

    /// Builds the execution provider that pins a session to this device.
    pub fn execution_provider(&self) -> ExecutionProviderDispatch {
        match self {
            ComputeDevice::Cpu => CPUExecutionProvider::default().build(),
            ComputeDevice::Cuda(id) => CUDAExecutionProvider::default().with_device_id(*id).build(),
            ComputeDevice::CoreMl => CoreMLExecutionProvider::default().build(),
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
            ComputeDevice::Cuda(id) => write!(f, "cuda:{}", id),
            ComputeDevice::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Reports the accelerators visible to the runtime.
///
/// Injected into [`MusicGenerator::with_selector`](crate::MusicGenerator::with_selector)
/// so hardware inspection happens once and can be substituted in tests.
pub trait DeviceSelector {
    /// Accelerators in priority order. An empty list means CPU only.
    fn accelerators(&self) -> Vec<ComputeDevice>;
}

/// Probes ONNX Runtime execution providers on the current system.
///
/// ONNX Runtime does not expose a device count, so CUDA devices are counted
/// through NVML. `CUDA_VISIBLE_DEVICES`, when set, narrows that count.
#[derive(Debug, Clone, Default)]
pub struct OrtDeviceSelector {
    visible_devices: Option<String>,
    physical_devices: Option<usize>,
}

impl OrtDeviceSelector {
    /// Creates a selector from NVML and `CUDA_VISIBLE_DEVICES`.
    pub fn from_env() -> Self {
        Self {
            visible_devices: std::env::var("CUDA_VISIBLE_DEVICES").ok(),
            physical_devices: nvml_device_count(),
        }
    }

    /// Number of CUDA ordinals to use once CUDA itself is known to work.
    fn cuda_device_count(&self) -> usize {
        cuda_device_count(self.visible_devices.as_deref(), self.physical_devices)
    }
}

impl DeviceSelector for OrtDeviceSelector {
    fn accelerators(&self) -> Vec<ComputeDevice> {
        if provider_registers(&CUDAExecutionProvider::default()) {
            let count = self.cuda_device_count();
            if count > 0 {
                return (0..count as i32).map(ComputeDevice::Cuda).collect();
            }
        }

        if provider_registers(&CoreMLExecutionProvider::default()) {
            return vec![ComputeDevice::CoreMl];
        }

        Vec::new()
    }
}

/// Physical NVIDIA GPUs reported by the driver, or None without NVML.
fn nvml_device_count() -> Option<usize> {
    let nvml = match Nvml::init() {
        Ok(nvml) => nvml,
        Err(e) => {
            debug!("NVML unavailable: {}", e);
            return None;
        }
    };
    match nvml.device_count() {
        Ok(count) => Some(count as usize),
        Err(e) => {
            debug!("NVML device count failed: {}", e);
            None
        }
    }
}

/// Resolves how many CUDA ordinals are usable.
///
/// The visible-device list wins but never exceeds the physical count. With
/// neither source one device is assumed, since the CUDA provider loaded.
fn cuda_device_count(visible: Option<&str>, physical: Option<usize>) -> usize {
    match (visible.map(count_visible_devices), physical) {
        (Some(visible), Some(physical)) => visible.min(physical),
        (Some(visible), None) => visible,
        (None, Some(physical)) => physical,
        (None, None) => 1,
    }
}

/// Attempts to register a provider with a throwaway session builder.
fn provider_registers(provider: &impl ExecutionProvider) -> bool {
    match Session::builder() {
        Ok(mut builder) => provider.register(&mut builder).is_ok(),
        Err(_) => false,
    }
}

/// Counts entries of a `CUDA_VISIBLE_DEVICES` style list.
///
/// An empty list or a leading `-1` hides every device.
fn count_visible_devices(list: &str) -> usize {
    let mut count = 0;
    for entry in list.split(',').map(str::trim) {
        if entry.is_empty() || entry.starts_with('-') {
            break;
        }
        count += 1;
    }
    count
}

/// A fixed accelerator list, for tests and for callers that already know
/// their hardware.
#[derive(Debug, Clone, Default)]
pub struct StaticDevices(pub Vec<ComputeDevice>);

impl DeviceSelector for StaticDevices {
    fn accelerators(&self) -> Vec<ComputeDevice> {
        self.0.clone()
    }
}

/// Devices chosen for one generator. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    devices: Vec<ComputeDevice>,
}

impl Placement {
    /// A placement on the CPU only.
    pub fn cpu() -> Self {
        Self {
            devices: vec![ComputeDevice::Cpu],
        }
    }

    /// Builds a placement from an explicit list; an empty list means CPU.
    pub fn new(devices: Vec<ComputeDevice>) -> Self {
        if devices.is_empty() {
            Self::cpu()
        } else {
            Self { devices }
        }
    }

    /// The device hosting the first replica.
    pub fn primary(&self) -> ComputeDevice {
        self.devices[0]
    }

    /// All placed devices, primary first.
    pub fn devices(&self) -> &[ComputeDevice] {
        &self.devices
    }

    /// True when the model is mirrored across more than one device.
    pub fn is_replicated(&self) -> bool {
        self.devices.len() > 1
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.devices.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Chooses the devices for a generator from a preference and a selector.
///
/// `Auto` takes every accelerator of the highest-priority kind and falls back
/// to the CPU. Explicit accelerator preferences fail when nothing matches.
pub fn select_placement(preference: Device, selector: &dyn DeviceSelector) -> Result<Placement> {
    let accelerators = selector.accelerators();

    let devices: Vec<ComputeDevice> = match preference {
        Device::Cpu => return Ok(Placement::cpu()),
        Device::Auto => match accelerators.first() {
            Some(ComputeDevice::Cuda(_)) => accelerators
                .iter()
                .copied()
                .filter(|d| matches!(d, ComputeDevice::Cuda(_)))
                .collect(),
            Some(first) if first.is_accelerator() => vec![*first],
            _ => return Ok(Placement::cpu()),
        },
        Device::Cuda => accelerators
            .iter()
            .copied()
            .filter(|d| matches!(d, ComputeDevice::Cuda(_)))
            .collect(),
        Device::Metal => accelerators
            .iter()
            .copied()
            .filter(|d| matches!(d, ComputeDevice::CoreMl))
            .take(1)
            .collect(),
    };

    if devices.is_empty() {
        return Err(GeneratorError::device_unavailable(preference.as_str()));
    }

    Ok(Placement::new(devices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn cuda(n: i32) -> StaticDevices {
        StaticDevices((0..n).map(ComputeDevice::Cuda).collect())
    }

    #[test]
    fn auto_without_accelerators_uses_cpu() {
        let placement = select_placement(Device::Auto, &StaticDevices::default()).unwrap();
        assert_eq!(placement.primary(), ComputeDevice::Cpu);
        assert!(!placement.is_replicated());
    }

    #[test]
    fn auto_with_one_gpu_is_not_replicated() {
        let placement = select_placement(Device::Auto, &cuda(1)).unwrap();
        assert_eq!(placement.devices(), &[ComputeDevice::Cuda(0)]);
        assert!(!placement.is_replicated());
    }

    #[test]
    fn auto_with_many_gpus_replicates() {
        let placement = select_placement(Device::Auto, &cuda(3)).unwrap();
        assert!(placement.is_replicated());
        assert_eq!(placement.primary(), ComputeDevice::Cuda(0));
        assert_eq!(placement.devices().len(), 3);
        assert_eq!(placement.to_string(), "cuda:0, cuda:1, cuda:2");
    }

    #[test]
    fn cpu_preference_ignores_accelerators() {
        let placement = select_placement(Device::Cpu, &cuda(2)).unwrap();
        assert_eq!(placement, Placement::cpu());
    }

    #[test]
    fn missing_cuda_is_an_error() {
        let err = select_placement(Device::Cuda, &StaticDevices(vec![ComputeDevice::CoreMl]))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DeviceUnavailable);
    }

    #[test]
    fn metal_preference_picks_coreml() {
        let placement =
            select_placement(Device::Metal, &StaticDevices(vec![ComputeDevice::CoreMl])).unwrap();
        assert_eq!(placement.primary(), ComputeDevice::CoreMl);
    }

    #[test]
    fn visible_device_list_counting() {
        assert_eq!(count_visible_devices("0,1,2"), 3);
        assert_eq!(count_visible_devices("3"), 1);
        assert_eq!(count_visible_devices(""), 0);
        assert_eq!(count_visible_devices("-1"), 0);
        assert_eq!(count_visible_devices("0, 1"), 2);
    }

    #[test]
    fn nvml_count_is_used_without_visible_list() {
        assert_eq!(cuda_device_count(None, Some(4)), 4);
        assert_eq!(cuda_device_count(None, Some(0)), 0);
    }

    #[test]
    fn visible_list_narrows_physical_count() {
        assert_eq!(cuda_device_count(Some("0,1"), Some(4)), 2);
        assert_eq!(cuda_device_count(Some("0,1,2,3,4,5"), Some(2)), 2);
        assert_eq!(cuda_device_count(Some("-1"), Some(4)), 0);
        assert_eq!(cuda_device_count(Some("0,1,2"), None), 3);
    }

    #[test]
    fn one_device_assumed_without_any_count() {
        assert_eq!(cuda_device_count(None, None), 1);
    }

    #[test]
    fn multi_gpu_host_without_visible_list_replicates() {
        let selector = OrtDeviceSelector {
            visible_devices: None,
            physical_devices: Some(2),
        };
        assert_eq!(selector.cuda_device_count(), 2);
    }

    #[test]
    fn ort_selector_never_panics() {
        let accelerators = OrtDeviceSelector::from_env().accelerators();
        assert!(accelerators.iter().all(|d| d.is_accelerator()));
    }

    #[test]
    fn empty_placement_falls_back_to_cpu() {
        assert_eq!(Placement::new(Vec::new()), Placement::cpu());
    }
}
