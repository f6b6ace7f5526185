// SPDX-License-Identifier: GPL-3.0-only

//! Compute device for the depth passes
//!
//! Alignment and relaxation bind whole frames as storage buffers. The
//! adapter's binding limit is kept on [`ComputeDevice`] so a frame that does
//! not fit is rejected before allocation and the caller can stay on the CPU.

use std::sync::Arc;
use tracing::{debug, info};

/// Re-export of the compute wgpu so processors share one version
pub use wgpu_compute as wgpu;

/// Device, queue and the limits the depth passes are sized against
pub struct ComputeDevice {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    pub backend: wgpu::Backend,
    /// Largest storage buffer a single binding may cover, in bytes
    pub max_binding_bytes: u64,
}

impl ComputeDevice {
    /// Open the preferred Vulkan adapter with its full limits
    pub async fn request(label: &str) -> Result<Self, String> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| format!("No compute adapter for {}: {}", label, e))?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        let max_binding_bytes =
            u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| format!("Failed to open {} on {}: {}", label, adapter_info.name, e))?;

        info!(
            label,
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            max_binding_bytes,
            max_frame_pixels = max_frame_pixels(max_binding_bytes, std::mem::size_of::<[f32; 2]>()),
            "Compute device ready"
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name: adapter_info.name,
            backend: adapter_info.backend,
            max_binding_bytes,
        })
    }

    /// Fail when a `bytes` sized binding exceeds this device's limit
    pub fn check_binding(&self, label: &str, bytes: u64) -> Result<(), String> {
        check_binding_size(label, bytes, self.max_binding_bytes)
    }
}

/// Pixels per frame a binding limit allows for `element_size` byte texels
pub fn max_frame_pixels(max_binding_bytes: u64, element_size: usize) -> u64 {
    max_binding_bytes / element_size.max(1) as u64
}

pub fn check_binding_size(label: &str, bytes: u64, max_binding_bytes: u64) -> Result<(), String> {
    if bytes > max_binding_bytes {
        return Err(format!(
            "{} needs {} bytes but the device binds at most {}",
            label, bytes, max_binding_bytes
        ));
    }
    debug!(label, bytes, "Binding fits device limit");
    Ok(())
}
