use tracing::debug;

use crate::capability::EnvironmentSignals;

/// Values the caller already knows; they take precedence over detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalOverrides {
    pub accelerated_graphics: Option<bool>,
    pub logical_processors: Option<u32>,
    pub pixel_density: Option<f64>,
    pub viewport: Option<(u32, u32)>,
    pub network_hint: Option<String>,
}

/// Signals read from the running host.
///
/// Processor count comes from the OS; accelerated graphics support is tested
/// by requesting a `wgpu` adapter (software adapters do not count). Viewport,
/// density and network have no portable native source and are only known
/// when supplied through [`SignalOverrides`].
#[derive(Debug, Clone, Default)]
pub struct HostSignals {
    overrides: SignalOverrides,
}

impl HostSignals {
    pub fn new(overrides: SignalOverrides) -> Self {
        Self { overrides }
    }
}

impl EnvironmentSignals for HostSignals {
    fn accelerated_graphics(&self) -> bool {
        self.overrides
            .accelerated_graphics
            .unwrap_or_else(probe_gpu_adapter)
    }

    fn logical_processors(&self) -> Option<u32> {
        self.overrides.logical_processors.or_else(|| {
            std::thread::available_parallelism()
                .ok()
                .map(|count| count.get() as u32)
        })
    }

    fn pixel_density(&self) -> Option<f64> {
        self.overrides.pixel_density
    }

    fn viewport(&self) -> Option<(u32, u32)> {
        self.overrides.viewport
    }

    fn network_hint(&self) -> Option<String> {
        self.overrides.network_hint.clone()
    }
}

#[cfg(feature = "gpu-probe")]
fn probe_gpu_adapter() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::LowPower,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));
    match adapter {
        Ok(adapter) => {
            let info = adapter.get_info();
            let accelerated = info.device_type != wgpu::DeviceType::Cpu;
            debug!(
                adapter = %info.name,
                backend = ?info.backend,
                device_type = ?info.device_type,
                accelerated,
                "graphics adapter probe"
            );
            accelerated
        }
        Err(err) => {
            debug!(error = %err, "no graphics adapter available");
            false
        }
    }
}

#[cfg(not(feature = "gpu-probe"))]
fn probe_gpu_adapter() -> bool {
    debug!("gpu-probe feature disabled; reporting no accelerated graphics");
    false
}
