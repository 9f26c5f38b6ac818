use std::sync::Arc;

use anyhow::anyhow;
use wgpu::{
    Adapter, AdapterInfo, Backends, Device, DeviceDescriptor, Features, Instance,
    InstanceDescriptor, Limits, Queue, RequestAdapterOptions, Surface,
};

/// An opened graphics device.
///
/// Unlike a global handle, a [`Gpu`] is owned by whichever thread renders with it. The render
/// thread opens it and moves it into its backend.
pub struct Gpu {
    instance: Arc<Instance>,
    adapter: Arc<Adapter>,
    device: Arc<Device>,
    queue: Arc<Queue>,
}

impl Gpu {
    /// Creates the [`Instance`] a [`Gpu`] and its window surfaces are created from.
    pub fn new_instance() -> Instance {
        // The OpenGL backend panics spuriously, so don't enable it.
        Instance::new(InstanceDescriptor {
            backends: Backends::PRIMARY,
            ..Default::default()
        })
    }

    /// Opens a graphics adapter, optionally one that can present to `surface`.
    pub async fn open(instance: Instance, surface: Option<&Surface>) -> anyhow::Result<Self> {
        log::info!("available graphics adapters:");
        for adapter in instance.enumerate_adapters(Backends::PRIMARY) {
            log_adapter("-", &adapter.get_info());
        }

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                compatible_surface: surface,
                ..Default::default()
            })
            .await
            .ok_or_else(|| anyhow!("no graphics adapter found"))?;
        log_adapter("using", &adapter.get_info());
        log::debug!("adapter limits: {:?}", adapter.limits());

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("facewarp"),
                    features: Features::empty(),
                    // Camera frames can be large; use the adapter's texture size limits.
                    limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
                },
                None,
            )
            .await?;

        Ok(Self {
            instance: Arc::new(instance),
            adapter: Arc::new(adapter),
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    #[inline]
    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }
}

fn log_adapter(prefix: &str, info: &AdapterInfo) {
    let backend = match info.backend {
        wgpu::Backend::Empty => "dummy",
        wgpu::Backend::Vulkan => "Vulkan",
        wgpu::Backend::Metal => "Metal",
        wgpu::Backend::Dx12 => "DX12",
        wgpu::Backend::Dx11 => "DX11",
        wgpu::Backend::Gl => "OpenGL",
        wgpu::Backend::BrowserWebGpu => "WebGPU",
    };
    let device_type = match info.device_type {
        wgpu::DeviceType::Other => "Unknown",
        wgpu::DeviceType::IntegratedGpu => "iGPU",
        wgpu::DeviceType::DiscreteGpu => "dGPU",
        wgpu::DeviceType::VirtualGpu => "vGPU",
        wgpu::DeviceType::Cpu => "CPU",
    };
    log::info!("{} [{}] [{}] {}", prefix, backend, device_type, info.name);
}
