// SPDX-License-Identifier: GPL-3.0-only

//! GPU Jacobi relaxation processor
//!
//! Two storage buffers alternate as input and output. Every step is its own
//! compute pass, so a step only starts once the previous one has finished
//! writing.

use crate::constants::alignment::WORKGROUP_SIZE;
use crate::constants::depth::RELAXATION_WEIGHT;
use crate::frame::DepthImage;
use crate::gpu::{ComputeDevice, wgpu};
use crate::shaders::gpu_processor::{
    GridExtent, read_staging, staging_buffer, storage_buffer, storage_entry, uniform_entry,
};
use crate::shared_processor;
use tracing::{debug, info};

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct RelaxParams {
    width: u32,
    height: u32,
    weight: f32,
    _pad: u32,
}

/// Ping-pong buffers for one image size
struct RelaxationBuffers {
    extent: GridExtent,
    depth: [wgpu::Buffer; 2],
    /// `bind_groups[i]` reads `depth[i]` and writes the other buffer
    bind_groups: [wgpu::BindGroup; 2],
    staging: wgpu::Buffer,
}

/// GPU processor for the reconstruction filter's relaxation steps
pub struct RelaxationProcessor {
    gpu: ComputeDevice,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    buffers: Option<RelaxationBuffers>,
}

impl RelaxationProcessor {
    pub async fn new() -> Result<Self, String> {
        info!("Initializing GPU relaxation processor");

        let gpu = ComputeDevice::request("relaxation_processor_gpu").await?;
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("relaxation_shader"),
            source: wgpu::ShaderSource::Wgsl(super::RELAXATION_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("relaxation_bind_group_layout"),
            entries: &[uniform_entry(0), storage_entry(1, true), storage_entry(2, false)],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("relaxation_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("relaxation_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("relaxation_uniform_buffer"),
            size: std::mem::size_of::<RelaxParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            gpu,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            buffers: None,
        })
    }

    fn ensure_resources(&mut self, extent: GridExtent) -> Result<(), String> {
        if self.buffers.as_ref().is_some_and(|b| b.extent == extent) {
            return Ok(());
        }
        debug!(width = extent.width, height = extent.height, "Allocating relaxation buffers");

        let usage = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        let depth = [
            storage_buffer::<f32>(&self.gpu, "relaxation_depth_a", extent, usage)?,
            storage_buffer::<f32>(&self.gpu, "relaxation_depth_b", extent, usage)?,
        ];
        let bind_group = |read: &wgpu::Buffer, write: &wgpu::Buffer, label: &str| {
            self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: read.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: write.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [
            bind_group(&depth[0], &depth[1], "relaxation_bind_group_a_to_b"),
            bind_group(&depth[1], &depth[0], "relaxation_bind_group_b_to_a"),
        ];
        let staging = staging_buffer(&self.gpu.device, "relaxation_staging", &depth[0]);

        self.buffers = Some(RelaxationBuffers {
            extent,
            depth,
            bind_groups,
            staging,
        });
        Ok(())
    }

    /// Run `steps` relaxation passes over an already pre-processed image
    pub async fn relax(&mut self, depth: &DepthImage, steps: u32) -> Result<DepthImage, String> {
        let (width, height) = (depth.width(), depth.height());
        if depth.is_empty() {
            return Err("Cannot relax an empty depth image".to_string());
        }
        if steps == 0 {
            return Ok(depth.clone());
        }
        let extent = GridExtent::new(width, height);
        self.ensure_resources(extent)?;
        let buffers = self.buffers.as_ref().ok_or("Relaxation buffers not allocated")?;
        let (device, queue) = (&self.gpu.device, &self.gpu.queue);

        queue
            .write_buffer(&buffers.depth[0], 0, bytemuck::cast_slice(depth.data()));
        let params = RelaxParams {
            width,
            height,
            weight: RELAXATION_WEIGHT,
            _pad: 0,
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&params));

        let mut encoder = device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("relaxation_encoder"),
            });
        let (workgroups_x, workgroups_y) = extent.workgroups(WORKGROUP_SIZE);
        for step in 0..steps {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("relaxation_step"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, Some(&buffers.bind_groups[(step % 2) as usize]), &[]);
            pass.dispatch_workgroups(workgroups_x, workgroups_y, 1);
        }

        // An odd step count leaves the result in the second buffer
        let result = &buffers.depth[(steps % 2) as usize];
        encoder.copy_buffer_to_buffer(result, 0, &buffers.staging, 0, buffers.staging.size());
        queue.submit(std::iter::once(encoder.finish()));

        let data = read_staging::<f32>(device, &buffers.staging, extent.len()).await?;
        debug!(width, height, steps, "GPU relaxation complete");
        DepthImage::from_vec(width, height, data).map_err(|e| e.to_string())
    }
}

shared_processor!(pub fn get_relaxation_processor() -> RelaxationProcessor);

/// Relax `depth` with the shared GPU processor
pub async fn relax_depth_gpu(depth: &DepthImage, steps: u32) -> Result<DepthImage, String> {
    let mut processor = get_relaxation_processor().await?;
    processor.relax(depth, steps).await
}
