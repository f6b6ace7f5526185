// SPDX-License-Identifier: GPL-3.0-only

//! GPU depth alignment processor
//!
//! Runs the UV map, clear, two scatter phases and resolve as five compute
//! passes in one submission. wgpu orders the passes, so every phase sees
//! the complete output of the previous one.

use crate::camera::CameraIntrinsicData;
use crate::constants::alignment::WORKGROUP_SIZE;
use crate::frame::{DepthImage, UvMap};
use crate::gpu::{ComputeDevice, wgpu};
use crate::pipelines::alignment::{AlignedDepth, DepthAlignmentParams, PatchSize, compute_patch_size};
use crate::shaders::gpu_processor::{
    GridExtent, read_staging, staging_buffer, storage_buffer, storage_entry, uniform_entry,
};
use crate::shared_processor;
use nalgebra::Matrix4;
use tracing::{debug, info};

/// Uniform block shared by every alignment entry point
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct AlignParams {
    source_ndc_to_view: [[f32; 4]; 4],
    source_view_to_ndc: [[f32; 4]; 4],
    target_ndc_to_view: [[f32; 4]; 4],
    target_view_to_ndc: [[f32; 4]; 4],
    source_to_target: [[f32; 4]; 4],
    target_to_source: [[f32; 4]; 4],
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
    patch_x: u32,
    patch_y: u32,
    reference_depth: f32,
    _pad: u32,
}

/// Column-major, as WGSL `mat4x4<f32>` expects
fn columns(m: &Matrix4<f32>) -> [[f32; 4]; 4] {
    (*m).into()
}

impl AlignParams {
    fn new(
        params: &DepthAlignmentParams,
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        patch: PatchSize,
    ) -> Self {
        let camera = |c: &CameraIntrinsicData| (columns(&c.ndc_to_view), columns(&c.view_to_ndc));
        let (source_ndc_to_view, source_view_to_ndc) = camera(&params.source_camera);
        let (target_ndc_to_view, target_view_to_ndc) = camera(&params.target_camera);
        Self {
            source_ndc_to_view,
            source_view_to_ndc,
            target_ndc_to_view,
            target_view_to_ndc,
            source_to_target: columns(&params.source_to_target.to_matrix()),
            target_to_source: columns(&params.source_to_target.inverse().to_matrix()),
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            patch_x: patch.x,
            patch_y: patch.y,
            reference_depth: params.uv_map_reference_depth,
            _pad: 0,
        }
    }
}

/// Entry points in dispatch order
const ENTRY_POINTS: [&str; 5] = [
    "compute_uv_map",
    "clear_grid",
    "scatter_depth",
    "scatter_index",
    "resolve",
];

struct AlignmentBuffers {
    source: GridExtent,
    target: GridExtent,
    source_depth: wgpu::Buffer,
    uv_map: wgpu::Buffer,
    out_depth: wgpu::Buffer,
    out_uv: wgpu::Buffer,
    staging_uv_map: wgpu::Buffer,
    staging_depth: wgpu::Buffer,
    staging_uv: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// GPU processor for [`align_depth`](crate::pipelines::alignment::align_depth)
pub struct AlignmentProcessor {
    gpu: ComputeDevice,
    /// One pipeline per entry in [`ENTRY_POINTS`]
    pipelines: Vec<wgpu::ComputePipeline>,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    buffers: Option<AlignmentBuffers>,
}

impl AlignmentProcessor {
    pub async fn new() -> Result<Self, String> {
        info!("Initializing GPU alignment processor");

        let gpu = ComputeDevice::request("alignment_processor_gpu").await?;
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("alignment_shader"),
            source: wgpu::ShaderSource::Wgsl(super::ALIGNMENT_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("alignment_bind_group_layout"),
            entries: &[
                uniform_entry(0),
                // Source depth
                storage_entry(1, true),
                // UV map
                storage_entry(2, false),
                // Grid depth bits and winning index
                storage_entry(3, false),
                storage_entry(4, false),
                // Resolved depth and source UV
                storage_entry(5, false),
                storage_entry(6, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("alignment_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = ENTRY_POINTS
            .iter()
            .map(|&entry| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(entry),
                    compilation_options: Default::default(),
                    cache: None,
                })
            })
            .collect();

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("alignment_uniform_buffer"),
            size: std::mem::size_of::<AlignParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            gpu,
            pipelines,
            bind_group_layout,
            uniform_buffer,
            buffers: None,
        })
    }

    fn ensure_resources(&mut self, source: GridExtent, target: GridExtent) -> Result<(), String> {
        if self
            .buffers
            .as_ref()
            .is_some_and(|b| b.source == source && b.target == target)
        {
            return Ok(());
        }
        debug!(
            source_width = source.width,
            source_height = source.height,
            target_width = target.width,
            target_height = target.height,
            "Allocating alignment buffers"
        );

        let gpu = &self.gpu;
        let none = wgpu::BufferUsages::empty();
        let copy_src = wgpu::BufferUsages::COPY_SRC;

        let source_depth =
            storage_buffer::<f32>(gpu, "alignment_source_depth", source, wgpu::BufferUsages::COPY_DST)?;
        let uv_map = storage_buffer::<[f32; 2]>(gpu, "alignment_uv_map", target, copy_src)?;
        // The grid is only touched by the shader; the bind group keeps it alive
        let grid_depth = storage_buffer::<u32>(gpu, "alignment_grid_depth", target, none)?;
        let grid_index = storage_buffer::<u32>(gpu, "alignment_grid_index", target, none)?;
        let out_depth = storage_buffer::<f32>(gpu, "alignment_out_depth", target, copy_src)?;
        let out_uv = storage_buffer::<[f32; 2]>(gpu, "alignment_out_uv", target, copy_src)?;

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("alignment_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: source_depth.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uv_map.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: grid_depth.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: grid_index.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: out_depth.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: out_uv.as_entire_binding(),
                },
            ],
        });

        let buffers = AlignmentBuffers {
            source,
            target,
            staging_uv_map: staging_buffer(&gpu.device, "alignment_staging_uv_map", &uv_map),
            staging_depth: staging_buffer(&gpu.device, "alignment_staging_depth", &out_depth),
            staging_uv: staging_buffer(&gpu.device, "alignment_staging_uv", &out_uv),
            source_depth,
            uv_map,
            out_depth,
            out_uv,
            bind_group,
        };
        self.buffers = Some(buffers);
        Ok(())
    }

    /// Align `source` into a `target_width` x `target_height` destination.
    ///
    /// `params` must already be validated.
    pub async fn align(
        &mut self,
        source: &DepthImage,
        target_width: u32,
        target_height: u32,
        params: &DepthAlignmentParams,
    ) -> Result<AlignedDepth, String> {
        let source_dims = (source.width(), source.height());
        let target_dims = (target_width, target_height);
        if source.is_empty() || target_width == 0 || target_height == 0 {
            return Err("Alignment needs non-empty source and destination".to_string());
        }

        let patch = compute_patch_size(
            &params.source_camera,
            &params.target_camera,
            source_dims,
            target_dims,
            params.hole_filling_bias,
        );

        let source_extent = GridExtent::new(source_dims.0, source_dims.1);
        let target_extent = GridExtent::new(target_width, target_height);
        self.ensure_resources(source_extent, target_extent)?;
        let buffers = self.buffers.as_ref().ok_or("Alignment buffers not allocated")?;
        let (device, queue) = (&self.gpu.device, &self.gpu.queue);

        queue.write_buffer(&buffers.source_depth, 0, bytemuck::cast_slice(source.data()));
        let uniforms = AlignParams::new(params, source_dims, target_dims, patch);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("alignment_encoder"),
        });

        let target_groups = target_extent.workgroups(WORKGROUP_SIZE);
        let source_groups = source_extent.workgroups(WORKGROUP_SIZE);
        for (pipeline, entry) in self.pipelines.iter().zip(ENTRY_POINTS) {
            let groups = match entry {
                "scatter_depth" | "scatter_index" => source_groups,
                _ => target_groups,
            };
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(entry),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, Some(&buffers.bind_group), &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }

        for (from, to) in [
            (&buffers.uv_map, &buffers.staging_uv_map),
            (&buffers.out_depth, &buffers.staging_depth),
            (&buffers.out_uv, &buffers.staging_uv),
        ] {
            encoder.copy_buffer_to_buffer(from, 0, to, 0, to.size());
        }
        queue.submit(std::iter::once(encoder.finish()));

        let len = target_extent.len();
        let uv_map = read_staging::<[f32; 2]>(device, &buffers.staging_uv_map, len).await?;
        let source_uv = read_staging::<[f32; 2]>(device, &buffers.staging_uv, len).await?;
        let depth = read_staging::<f32>(device, &buffers.staging_depth, len).await?;

        let uv_map = UvMap::from_vec(target_width, target_height, uv_map).map_err(|e| e.to_string())?;
        let source_uv = UvMap::from_vec(target_width, target_height, source_uv).map_err(|e| e.to_string())?;
        let depth = DepthImage::from_vec(target_width, target_height, depth).map_err(|e| e.to_string())?;

        debug!(
            source_width = source_dims.0,
            source_height = source_dims.1,
            target_width,
            target_height,
            patch_x = patch.x,
            patch_y = patch.y,
            filled = depth.valid_count(),
            "GPU depth alignment complete"
        );

        Ok(AlignedDepth {
            depth,
            source_uv,
            uv_map,
            patch,
        })
    }
}

shared_processor!(pub fn get_alignment_processor() -> AlignmentProcessor);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout_matches_shader() {
        // Six mat4x4 then eight 4-byte scalars, padded to 16 bytes
        assert_eq!(std::mem::size_of::<AlignParams>(), 6 * 64 + 32);
        assert_eq!(std::mem::size_of::<AlignParams>() % 16, 0);
    }

    #[test]
    fn test_columns_are_column_major() {
        let m = Matrix4::new(
            1.0, 2.0, 3.0, 4.0, //
            5.0, 6.0, 7.0, 8.0, //
            9.0, 10.0, 11.0, 12.0, //
            13.0, 14.0, 15.0, 16.0,
        );
        let c = columns(&m);
        assert_eq!(c[0], [1.0, 5.0, 9.0, 13.0]);
        assert_eq!(c[3], [4.0, 8.0, 12.0, 16.0]);
    }
}
