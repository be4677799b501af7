//! The kernel dispatch boundary.
//!
//! One dispatch covers every pixel once: derive the camera ray, evaluate the
//! scene, add the radiance sample into the accumulation buffer, and write
//! `accumulation / pass_index` into the framebuffer. The engine provides all
//! synchronization (the mapped window around the dispatch); implementations
//! must not add their own.

use crate::error::EngineError;
use crate::gpu::Gpu;

/// Device buffers a kernel reads and writes during a pass.
///
/// `bind` is called whenever any of these are (re)created — after engine
/// construction, resize, and scene reload.
pub struct KernelBindings<'a> {
    pub pixels: &'a wgpu::Buffer,
    pub accumulation: &'a wgpu::Buffer,
    pub rays: &'a wgpu::Buffer,
    pub camera: &'a wgpu::Buffer,
    pub pass_state: &'a wgpu::Buffer,
    pub spheres: &'a wgpu::Buffer,
}

/// Arguments for one pass dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassArgs {
    pub width: u32,
    pub height: u32,
    pub pass_index: u32,
    pub sphere_count: u32,
}

pub trait KernelDispatch {
    /// Rebind to freshly (re)created device buffers.
    fn bind(&mut self, gpu: &Gpu, bindings: &KernelBindings<'_>) -> Result<(), EngineError>;

    /// Record one pass over every pixel into `encoder`.
    fn dispatch(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        args: &PassArgs,
    ) -> Result<(), EngineError>;
}

/// Production kernel: WGSL compute path tracer over the sphere list.
///
/// Sampling is seeded per (pixel, pass index), so a pass is deterministic for
/// a given resolution, camera, and scene.
pub struct PathTraceKernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    bind_group: Option<wgpu::BindGroup>,
}

impl PathTraceKernel {
    const WORKGROUP_SIZE: u32 = 8;

    pub fn new(gpu: &Gpu) -> Result<Self, EngineError> {
        let shader = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("path trace kernel"),
                source: wgpu::ShaderSource::Wgsl(include_str!("shaders/pathtrace.wgsl").into()),
            });

        let storage_rw = wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        };
        let uniform = wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        };

        let entry = |binding, ty| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        };

        let layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("path trace layout"),
                entries: &[
                    entry(0, storage_rw),
                    entry(1, storage_rw),
                    entry(2, storage_rw),
                    entry(3, uniform),
                    entry(4, uniform),
                    entry(
                        5,
                        wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                    ),
                ],
            });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("path trace pipeline layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let pipeline = gpu
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("path trace pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: "main",
                compilation_options: Default::default(),
                cache: None,
            });

        Ok(Self {
            pipeline,
            layout,
            bind_group: None,
        })
    }
}

impl KernelDispatch for PathTraceKernel {
    fn bind(&mut self, gpu: &Gpu, bindings: &KernelBindings<'_>) -> Result<(), EngineError> {
        self.bind_group = Some(gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("path trace bindings"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: bindings.pixels.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: bindings.accumulation.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: bindings.rays.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: bindings.camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: bindings.pass_state.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: bindings.spheres.as_entire_binding(),
                },
            ],
        }));
        Ok(())
    }

    fn dispatch(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        args: &PassArgs,
    ) -> Result<(), EngineError> {
        let bind_group = self
            .bind_group
            .as_ref()
            .ok_or_else(|| EngineError::Dispatch("kernel dispatched before bind".into()))?;

        let groups_x = args.width.div_ceil(Self::WORKGROUP_SIZE);
        let groups_y = args.height.div_ceil(Self::WORKGROUP_SIZE);

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("path trace pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(groups_x, groups_y, 1);

        Ok(())
    }
}
