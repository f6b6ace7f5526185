// SPDX-License-Identifier: GPL-3.0-only

//! Buffer plumbing shared by the alignment and relaxation processors
//!
//! Frame buffers are sized from a [`GridExtent`] and checked against the
//! device binding limit before allocation. Results come back through a
//! MAP_READ staging copy decoded with `bytemuck`.

use crate::gpu::{ComputeDevice, wgpu};

/// Pixel grid a set of frame buffers is allocated for
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GridExtent {
    pub width: u32,
    pub height: u32,
}

impl GridExtent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of a buffer holding one `T` per pixel, never zero
    pub fn byte_size<T>(&self) -> u64 {
        (self.len().max(1) * std::mem::size_of::<T>()) as u64
    }

    /// Workgroup counts covering the grid with square `workgroup_size` tiles
    pub fn workgroups(&self, workgroup_size: u32) -> (u32, u32) {
        (
            self.width.div_ceil(workgroup_size),
            self.height.div_ceil(workgroup_size),
        )
    }
}

/// Per-pixel storage buffer, rejected when it exceeds the binding limit
pub fn storage_buffer<T>(
    gpu: &ComputeDevice,
    label: &str,
    extent: GridExtent,
    usage: wgpu::BufferUsages,
) -> Result<wgpu::Buffer, String> {
    let size = extent.byte_size::<T>();
    gpu.check_binding(label, size)?;
    Ok(gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | usage,
        mapped_at_creation: false,
    }))
}

/// MAP_READ staging buffer matching `source`
pub fn staging_buffer(device: &wgpu::Device, label: &str, source: &wgpu::Buffer) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: source.size(),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}

/// Bind group layout entry for a compute storage buffer
pub fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Bind group layout entry for a compute uniform buffer
pub fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// First `len` elements of a raw readback
pub fn decode_readback<T: bytemuck::Pod>(bytes: &[u8], len: usize) -> Result<Vec<T>, String> {
    let size = std::mem::size_of::<T>();
    if bytes.len() < len * size {
        return Err(format!(
            "Readback holds {} bytes, expected {} values of {}",
            bytes.len(),
            len,
            std::any::type_name::<T>()
        ));
    }
    Ok(bytes
        .chunks_exact(size)
        .take(len)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

/// Wait for `staging` to map and decode its first `len` elements.
///
/// The buffer is unmapped again before returning.
pub async fn read_staging<T: bytemuck::Pod>(
    device: &wgpu::Device,
    staging: &wgpu::Buffer,
    len: usize,
) -> Result<Vec<T>, String> {
    let slice = staging.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |mapped| {
        let _ = sender.send(mapped);
    });
    let _ = device.poll(wgpu::PollType::wait_indefinitely());

    receiver
        .await
        .map_err(|_| "Staging map callback dropped".to_string())?
        .map_err(|e| format!("Failed to map staging buffer: {:?}", e))?;

    let values = {
        let mapped = slice.get_mapped_range();
        decode_readback::<T>(&mapped, len)
    };
    staging.unmap();
    values
}

/// Define an async accessor for a processor created once per process.
///
/// The processor is built by its `new()` on first use; a failed build is
/// logged and retried on the next call.
#[macro_export]
macro_rules! shared_processor {
    ($vis:vis fn $get_fn:ident() -> $processor:ty) => {
        $vis async fn $get_fn()
        -> Result<tokio::sync::MappedMutexGuard<'static, $processor>, String> {
            static SLOT: tokio::sync::Mutex<Option<$processor>> = tokio::sync::Mutex::const_new(None);

            let mut slot = SLOT.lock().await;
            if slot.is_none() {
                let processor = <$processor>::new().await.inspect_err(|e| {
                    tracing::warn!(processor = stringify!($processor), error = %e, "GPU processor unavailable");
                })?;
                *slot = Some(processor);
            }
            tokio::sync::MutexGuard::try_map(slot, Option::as_mut)
                .map_err(|_| concat!(stringify!($processor), " missing after init").to_string())
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_extent_sizes() {
        let extent = GridExtent::new(640, 480);
        assert_eq!(extent.len(), 307_200);
        assert_eq!(extent.byte_size::<f32>(), 1_228_800);
        assert_eq!(extent.byte_size::<[f32; 2]>(), 2_457_600);
        // Empty grids still get a bindable buffer
        assert_eq!(GridExtent::new(0, 3).byte_size::<u32>(), 4);
        assert!(GridExtent::new(0, 3).is_empty());
    }

    #[test]
    fn test_workgroups_cover_grid() {
        assert_eq!(GridExtent::new(640, 480).workgroups(16), (40, 30));
        assert_eq!(GridExtent::new(641, 1).workgroups(16), (41, 1));
        assert_eq!(GridExtent::new(0, 0).workgroups(16), (0, 0));
    }

    #[test]
    fn test_decode_readback() {
        let bytes: Vec<u8> = [1.5f32, -2.0, 7.25, 0.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(decode_readback::<f32>(&bytes, 3).unwrap(), vec![1.5, -2.0, 7.25]);
        assert_eq!(decode_readback::<[f32; 2]>(&bytes, 2).unwrap(), vec![[1.5, -2.0], [7.25, 0.0]]);
        assert!(decode_readback::<f32>(&bytes, 5).is_err());
        assert!(decode_readback::<f32>(&bytes[..6], 2).is_err());
    }
}
