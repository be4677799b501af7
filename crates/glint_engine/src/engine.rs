//! Pass orchestration and device buffer lifecycle.

use std::sync::Arc;

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use glint_math::CameraState;
use glint_scene::{Scene, SphereData};

use crate::error::EngineError;
use crate::framebuffer::{FrameBuffer, PIXEL_STRIDE};
use crate::gpu::Gpu;
use crate::interop::{DisplayLink, InteropHandle};
use crate::kernel::{KernelBindings, KernelDispatch, PassArgs};
use crate::uniforms::{CameraUniform, PassUniform, RAY_STRIDE};

/// One renderable pass result: the framebuffer plus its live display
/// registration, ready to blit.
pub struct Frame<'a> {
    pub framebuffer: &'a FrameBuffer,
    pub interop: &'a InteropHandle,
}

/// Orchestrates pass execution and owns every device-side resource: the
/// accumulation buffer, the ray buffer, the camera and scene mirrors, and
/// the framebuffer's display registration.
///
/// A single host thread drives it; each [`render_pass`](Self::render_pass)
/// blocks until the device has finished, so passes never overlap and pass
/// *n*'s accumulation writes are visible before pass *n + 1* starts.
pub struct RenderEngine<K: KernelDispatch> {
    gpu: Arc<Gpu>,
    kernel: K,

    framebuffer: FrameBuffer,
    accumulation: wgpu::Buffer,
    rays: wgpu::Buffer,

    camera: CameraState,
    camera_buffer: wgpu::Buffer,
    pass_buffer: wgpu::Buffer,

    scene_buffer: wgpu::Buffer,
    sphere_count: u32,

    link: DisplayLink,
    registration: Option<InteropHandle>,

    pass_counter: u32,
    frames_since_title: u32,
}

impl<K: KernelDispatch> RenderEngine<K> {
    /// Allocate all device resources for `camera.resolution`, register the
    /// framebuffer for display, and bind the kernel.
    ///
    /// Failures here are unrecoverable environment faults; callers terminate
    /// rather than continue partially initialized.
    pub fn new(gpu: Arc<Gpu>, kernel: K, camera: CameraState) -> Result<Self, EngineError> {
        let mut framebuffer = FrameBuffer::new(&gpu, camera.resolution.x, camera.resolution.y)?;
        let (accumulation, rays) = Self::create_pass_buffers(&gpu, framebuffer.pixel_count)?;

        let camera_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("camera mirror"),
                contents: bytemuck::bytes_of(&CameraUniform::from_camera(&camera)),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let pass_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("pass state"),
                contents: bytemuck::bytes_of(&PassUniform::zeroed()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let scene_buffer = Self::upload_scene_mirror(&gpu, &[])?;

        let mut link = DisplayLink::new(&gpu);
        let registration = link.register(&gpu, &mut framebuffer)?;

        let mut engine = Self {
            gpu,
            kernel,
            framebuffer,
            accumulation,
            rays,
            camera,
            camera_buffer,
            pass_buffer,
            scene_buffer,
            sphere_count: 0,
            link,
            registration: Some(registration),
            pass_counter: 0,
            frames_since_title: 0,
        };
        engine.bind_kernel()?;

        log::info!(
            "render engine ready: {}x{}",
            engine.framebuffer.width,
            engine.framebuffer.height
        );
        Ok(engine)
    }

    /// Execute one pass and return the frame for presentation.
    ///
    /// Increments the pass counter, opens the exclusive device-access window
    /// on the interop buffer (closed on every exit path), dispatches the
    /// kernel, and blocks until the device completes.
    pub fn render_pass(&mut self) -> Result<Frame<'_>, EngineError> {
        self.pass_counter += 1;
        self.frames_since_title += 1;

        let args = PassArgs {
            width: self.framebuffer.width,
            height: self.framebuffer.height,
            pass_index: self.pass_counter,
            sphere_count: self.sphere_count,
        };
        self.gpu.queue.write_buffer(
            &self.pass_buffer,
            0,
            bytemuck::bytes_of(&PassUniform {
                width: args.width,
                height: args.height,
                pass_index: args.pass_index,
                sphere_count: args.sphere_count,
            }),
        );

        let registration = self.registration.as_ref().ok_or(EngineError::Registration {
            what: "framebuffer pixels",
            reason: "no live registration".into(),
        })?;
        let mapped = self.link.map_for_pass(registration)?;

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render pass"),
            });
        self.kernel.dispatch(&mut encoder, &args)?;
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        // Synchronous contract: the pass is complete and the window closed
        // before the display side may consume the buffer.
        let _ = self.gpu.device.poll(wgpu::Maintain::Wait);
        drop(mapped);

        Ok(Frame {
            framebuffer: &self.framebuffer,
            interop: registration,
        })
    }

    /// Replace the device scene mirror wholesale.
    ///
    /// The previous allocation is dropped, never appended to; safe to call on
    /// every reload. A zero-primitive scene is valid and dispatches with
    /// `sphere_count == 0`.
    pub fn init_scene(&mut self, scene: &Scene) -> Result<(), EngineError> {
        let data = scene.gpu_data();
        self.scene_buffer = Self::upload_scene_mirror(&self.gpu, &data)?;
        self.sphere_count = data.len() as u32;

        log::info!("scene mirror replaced: {} spheres", self.sphere_count);
        self.bind_kernel()
    }

    /// Tear down and rebuild everything sized by resolution.
    ///
    /// The registration is released before the framebuffer is touched, and
    /// every new size is derived from the freshly resized framebuffer —
    /// never from the previous allocation.
    pub fn resize(&mut self, camera: CameraState) -> Result<(), EngineError> {
        if let Some(handle) = self.registration.take() {
            self.link.release(&mut self.framebuffer, handle);
        }

        self.framebuffer
            .resize(&self.gpu, camera.resolution.x, camera.resolution.y)?;

        let (accumulation, rays) = Self::create_pass_buffers(&self.gpu, self.framebuffer.pixel_count)?;
        self.accumulation = accumulation;
        self.rays = rays;

        self.camera = camera;
        self.gpu.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&CameraUniform::from_camera(&camera)),
        );

        self.pass_counter = 0;

        self.registration = Some(self.link.register(&self.gpu, &mut self.framebuffer)?);
        self.bind_kernel()?;

        log::info!(
            "resized to {}x{}",
            self.framebuffer.width,
            self.framebuffer.height
        );
        Ok(())
    }

    /// Zero the accumulation buffer in place and restart the pass count.
    /// Used when the pose changes but the resolution does not.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("accumulation reset"),
            });
        encoder.clear_buffer(&self.accumulation, 0, None);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.gpu.device.poll(wgpu::Maintain::Wait);

        self.pass_counter = 0;
        Ok(())
    }

    /// Apply a camera update: pose changes rewrite the mirror and reset the
    /// accumulation; a resolution change is a full [`resize`](Self::resize).
    pub fn update_camera(&mut self, camera: CameraState) -> Result<(), EngineError> {
        if camera.resolution != self.camera.resolution {
            return self.resize(camera);
        }

        self.camera = camera;
        self.gpu.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&CameraUniform::from_camera(&camera)),
        );
        self.reset()
    }

    pub fn pass_counter(&self) -> u32 {
        self.pass_counter
    }

    /// Frames rendered since the driver last refreshed its title display.
    pub fn frames_since_title(&self) -> u32 {
        self.frames_since_title
    }

    /// Read and clear the title frame counter.
    pub fn take_title_frames(&mut self) -> u32 {
        std::mem::take(&mut self.frames_since_title)
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn sphere_count(&self) -> u32 {
        self.sphere_count
    }

    pub fn accumulation(&self) -> &wgpu::Buffer {
        &self.accumulation
    }

    pub fn rays(&self) -> &wgpu::Buffer {
        &self.rays
    }

    pub fn scene_mirror(&self) -> &wgpu::Buffer {
        &self.scene_buffer
    }

    pub fn display_link(&self) -> &DisplayLink {
        &self.link
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    fn create_pass_buffers(
        gpu: &Gpu,
        pixel_count: u32,
    ) -> Result<(wgpu::Buffer, wgpu::Buffer), EngineError> {
        let accumulation =
            gpu.create_storage_buffer("accumulation", u64::from(pixel_count) * PIXEL_STRIDE)?;
        let rays = gpu.create_storage_buffer("ray parameters", u64::from(pixel_count) * RAY_STRIDE)?;
        Ok((accumulation, rays))
    }

    fn upload_scene_mirror(gpu: &Gpu, data: &[SphereData]) -> Result<wgpu::Buffer, EngineError> {
        // Zero-size bindings are invalid device-side: an empty scene uploads
        // one zeroed placeholder record while sphere_count stays 0.
        let placeholder = [SphereData::zeroed()];
        let upload = if data.is_empty() { &placeholder[..] } else { data };

        let bytes = std::mem::size_of_val(upload) as u64;
        gpu.check_allocation("scene mirror", bytes)?;

        Ok(gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("scene mirror"),
                contents: bytemuck::cast_slice(upload),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            }))
    }

    fn bind_kernel(&mut self) -> Result<(), EngineError> {
        self.kernel.bind(
            &self.gpu,
            &KernelBindings {
                pixels: self.framebuffer.pixels(),
                accumulation: &self.accumulation,
                rays: &self.rays,
                camera: &self.camera_buffer,
                pass_state: &self.pass_buffer,
                spheres: &self.scene_buffer,
            },
        )
    }
}

impl<K: KernelDispatch> Drop for RenderEngine<K> {
    fn drop(&mut self) {
        // Teardown in reverse dependency order: the registration goes before
        // the framebuffer storage.
        if let Some(handle) = self.registration.take() {
            self.link.release(&mut self.framebuffer, handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::PIXEL_STRIDE;
    use crate::kernel::PathTraceKernel;
    use crate::test_support;

    /// Stand-in kernel that records every dispatch without touching the GPU.
    #[derive(Default)]
    struct RecordingKernel {
        bound: u32,
        dispatched: Vec<PassArgs>,
    }

    impl KernelDispatch for RecordingKernel {
        fn bind(&mut self, _gpu: &Gpu, _bindings: &KernelBindings<'_>) -> Result<(), EngineError> {
            self.bound += 1;
            Ok(())
        }

        fn dispatch(
            &mut self,
            _encoder: &mut wgpu::CommandEncoder,
            args: &PassArgs,
        ) -> Result<(), EngineError> {
            self.dispatched.push(*args);
            Ok(())
        }
    }

    /// Deterministic stand-in implementing the accumulate-then-divide
    /// contract: each pass adds `(pass_index, 0.25, 1.0, 1.0)`.
    struct FlatFieldKernel {
        pipeline: wgpu::ComputePipeline,
        layout: wgpu::BindGroupLayout,
        bind_group: Option<wgpu::BindGroup>,
    }

    const FLAT_FIELD_WGSL: &str = r#"
struct PassState {
    width: u32,
    height: u32,
    pass_index: u32,
    sphere_count: u32,
}

@group(0) @binding(0) var<storage, read_write> pixels: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read_write> accumulation: array<vec4<f32>>;
@group(0) @binding(2) var<uniform> pass_state: PassState;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= pass_state.width || gid.y >= pass_state.height) {
        return;
    }
    let pixel = gid.y * pass_state.width + gid.x;
    let sample = vec4<f32>(f32(pass_state.pass_index), 0.25, 1.0, 1.0);
    let total = accumulation[pixel] + sample;
    accumulation[pixel] = total;
    pixels[pixel] = total / f32(pass_state.pass_index);
}
"#;

    impl FlatFieldKernel {
        fn new(gpu: &Gpu) -> Self {
            let shader = gpu
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("flat field kernel"),
                    source: wgpu::ShaderSource::Wgsl(FLAT_FIELD_WGSL.into()),
                });

            let storage_rw = wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            };
            let layout = gpu
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("flat field layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: storage_rw,
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: storage_rw,
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

            let pipeline_layout = gpu
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("flat field pipeline layout"),
                    bind_group_layouts: &[&layout],
                    push_constant_ranges: &[],
                });

            let pipeline = gpu
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("flat field pipeline"),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: "main",
                    compilation_options: Default::default(),
                    cache: None,
                });

            Self {
                pipeline,
                layout,
                bind_group: None,
            }
        }
    }

    impl KernelDispatch for FlatFieldKernel {
        fn bind(&mut self, gpu: &Gpu, bindings: &KernelBindings<'_>) -> Result<(), EngineError> {
            self.bind_group = Some(gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("flat field bindings"),
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
                        resource: bindings.pass_state.as_entire_binding(),
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
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("flat field pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(args.width.div_ceil(8), args.height.div_ceil(8), 1);
            Ok(())
        }
    }

    fn camera(width: u32, height: u32) -> CameraState {
        CameraState::new(width, height)
    }

    fn recording_engine(
        gpu: &Arc<Gpu>,
        width: u32,
        height: u32,
    ) -> RenderEngine<RecordingKernel> {
        RenderEngine::new(gpu.clone(), RecordingKernel::default(), camera(width, height)).unwrap()
    }

    #[test]
    fn test_construct_sizes_buffers_to_resolution() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let engine = recording_engine(&gpu, 96, 64);
        assert_eq!(engine.framebuffer().pixel_count, 96 * 64);
        assert_eq!(engine.accumulation().size(), 96 * 64 * PIXEL_STRIDE);
        assert_eq!(engine.rays().size(), 96 * 64 * RAY_STRIDE);
        assert_eq!(engine.pass_counter(), 0);
        assert_eq!(engine.kernel().bound, 1);
    }

    #[test]
    fn test_pass_counter_is_monotonic() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let mut engine = recording_engine(&gpu, 32, 32);
        for expected in 1..=5 {
            engine.render_pass().unwrap();
            assert_eq!(engine.pass_counter(), expected);
        }
        assert_eq!(engine.kernel().dispatched.len(), 5);
        assert_eq!(engine.frames_since_title(), 5);
        assert_eq!(engine.take_title_frames(), 5);
        assert_eq!(engine.frames_since_title(), 0);
    }

    #[test]
    fn test_pass_args_reflect_state() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let mut engine = recording_engine(&gpu, 40, 24);
        engine.render_pass().unwrap();

        let args = engine.kernel().dispatched[0];
        assert_eq!(args.width, 40);
        assert_eq!(args.height, 24);
        assert_eq!(args.pass_index, 1);
        assert_eq!(args.sphere_count, 0);
    }

    #[test]
    fn test_reset_zeroes_accumulation() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let mut engine = recording_engine(&gpu, 16, 16);
        engine.render_pass().unwrap();
        engine.render_pass().unwrap();

        // Seed the accumulation with junk so the clear is observable.
        let junk = vec![7.5f32; 16 * 16 * 4];
        gpu.queue
            .write_buffer(engine.accumulation(), 0, bytemuck::cast_slice(&junk));

        engine.reset().unwrap();
        assert_eq!(engine.pass_counter(), 0);

        let contents: Vec<f32> = gpu.read_buffer(engine.accumulation()).unwrap();
        assert!(contents.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_resize_recomputes_sizes_each_step() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let mut engine = recording_engine(&gpu, 1280, 720);

        // Each step's sizes must derive from that step's resolution alone.
        for (width, height) in [(640u32, 480u32), (333, 217), (96, 64), (1280, 720)] {
            let mut cam = *engine.camera();
            cam.set_resolution(width, height);
            engine.resize(cam).unwrap();

            let pixels = u64::from(width) * u64::from(height);
            assert_eq!(engine.framebuffer().pixel_count as u64, pixels);
            assert_eq!(engine.framebuffer().pixels().size(), pixels * PIXEL_STRIDE);
            assert_eq!(engine.accumulation().size(), pixels * PIXEL_STRIDE);
            assert_eq!(engine.rays().size(), pixels * RAY_STRIDE);
        }
    }

    #[test]
    fn test_resize_resets_pass_counter() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let mut engine = recording_engine(&gpu, 64, 64);
        engine.render_pass().unwrap();
        engine.render_pass().unwrap();
        assert_eq!(engine.pass_counter(), 2);

        let mut cam = *engine.camera();
        cam.set_resolution(48, 48);
        engine.resize(cam).unwrap();
        assert_eq!(engine.pass_counter(), 0);

        engine.render_pass().unwrap();
        assert_eq!(engine.pass_counter(), 1);
    }

    #[test]
    fn test_interop_pairing_across_resizes() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let mut engine = recording_engine(&gpu, 64, 64);
        for i in 0..8u32 {
            let mut cam = *engine.camera();
            cam.set_resolution(32 + i, 32 + i);
            engine.resize(cam).unwrap();
        }

        let link = engine.display_link();
        assert_eq!(link.outstanding(), 1);
        assert_eq!(link.registered_total(), 9);
        assert_eq!(link.released_total(), 8);
        assert!(engine.framebuffer().is_registered());
    }

    #[test]
    fn test_init_scene_replaces_wholesale() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };
        let sphere_stride = std::mem::size_of::<SphereData>() as u64;

        let mut engine = recording_engine(&gpu, 32, 32);

        engine.init_scene(&Scene::empty()).unwrap();
        engine.render_pass().unwrap();
        assert_eq!(engine.kernel().dispatched.last().unwrap().sphere_count, 0);

        engine.init_scene(&Scene::random(300, 11)).unwrap();
        engine.render_pass().unwrap();

        // Full replacement: exactly 300 records, not 300 plus the prior count.
        assert_eq!(engine.sphere_count(), 300);
        assert_eq!(engine.kernel().dispatched.last().unwrap().sphere_count, 300);
        assert_eq!(engine.scene_mirror().size(), 300 * sphere_stride);

        engine.init_scene(&Scene::open_scene()).unwrap();
        assert_eq!(engine.sphere_count(), 6);
        assert_eq!(engine.scene_mirror().size(), 6 * sphere_stride);
    }

    #[test]
    fn test_averaging_contract_with_deterministic_kernel() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let kernel = FlatFieldKernel::new(&gpu);
        let mut engine = RenderEngine::new(gpu.clone(), kernel, camera(96, 64)).unwrap();

        for _ in 0..4 {
            engine.render_pass().unwrap();
        }

        // Samples were 1, 2, 3, 4 in the red channel: average 2.5.
        let pixels = engine.framebuffer().read_back(&gpu).unwrap();
        assert_eq!(pixels.len(), 96 * 64);
        for pixel in &pixels {
            assert!((pixel[0] - 2.5).abs() < 1e-6);
            assert!((pixel[1] - 0.25).abs() < 1e-6);
            assert!((pixel[2] - 1.0).abs() < 1e-6);
        }

        let accumulation: Vec<[f32; 4]> = gpu.read_buffer(engine.accumulation()).unwrap();
        for texel in &accumulation {
            assert!((texel[0] - 10.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pathtrace_framebuffer_is_accumulation_average() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let kernel = PathTraceKernel::new(&gpu).unwrap();
        let mut engine = RenderEngine::new(gpu.clone(), kernel, camera(96, 64)).unwrap();
        engine.init_scene(&Scene::open_scene()).unwrap();

        for _ in 0..3 {
            engine.render_pass().unwrap();
        }

        let pixels = engine.framebuffer().read_back(&gpu).unwrap();
        let accumulation: Vec<[f32; 4]> = gpu.read_buffer(engine.accumulation()).unwrap();

        for (pixel, texel) in pixels.iter().zip(&accumulation) {
            for channel in 0..3 {
                let expected = texel[channel] / 3.0;
                assert!(
                    (pixel[channel] - expected).abs() < 1e-4,
                    "framebuffer {} vs accumulation/3 {}",
                    pixel[channel],
                    expected
                );
            }
        }
    }

    #[test]
    fn test_pathtrace_is_deterministic_per_pass() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let render = |passes: u32| {
            let kernel = PathTraceKernel::new(&gpu).unwrap();
            let mut engine = RenderEngine::new(gpu.clone(), kernel, camera(64, 48)).unwrap();
            engine.init_scene(&Scene::random(40, 5)).unwrap();
            for _ in 0..passes {
                engine.render_pass().unwrap();
            }
            engine.framebuffer().read_back(&gpu).unwrap()
        };

        assert_eq!(render(2), render(2));
    }

    #[test]
    fn test_pathtrace_converges_on_static_scene() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let kernel = PathTraceKernel::new(&gpu).unwrap();
        let mut engine = RenderEngine::new(gpu.clone(), kernel, camera(64, 48)).unwrap();
        engine.init_scene(&Scene::open_scene()).unwrap();

        let mut estimates = Vec::new();
        for _ in 0..10 {
            engine.render_pass().unwrap();
            estimates.push(engine.framebuffer().read_back(&gpu).unwrap());
        }

        let mean_delta = |a: &[[f32; 4]], b: &[[f32; 4]]| -> f32 {
            let total: f32 = a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    (x[0] - y[0]).abs() + (x[1] - y[1]).abs() + (x[2] - y[2]).abs()
                })
                .sum();
            total / a.len() as f32
        };

        // The running average settles: late inter-pass deltas are smaller
        // than the first one.
        let early = mean_delta(&estimates[0], &estimates[1]);
        let late = mean_delta(&estimates[8], &estimates[9]);
        assert!(early > 0.0, "static scene produced no signal");
        assert!(late < early, "estimate is not settling: {late} >= {early}");
    }

    #[test]
    fn test_resize_then_render_stays_in_bounds() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let kernel = PathTraceKernel::new(&gpu).unwrap();
        let mut engine = RenderEngine::new(gpu.clone(), kernel, camera(320, 180)).unwrap();
        engine.init_scene(&Scene::random(20, 3)).unwrap();
        engine.render_pass().unwrap();

        let mut cam = *engine.camera();
        cam.set_resolution(160, 120);
        engine.resize(cam).unwrap();
        engine.render_pass().unwrap();

        let pixels = engine.framebuffer().read_back(&gpu).unwrap();
        assert_eq!(pixels.len(), 160 * 120);
        assert!(pixels.iter().flatten().all(|v| v.is_finite()));

        let accumulation: Vec<[f32; 4]> = gpu.read_buffer(engine.accumulation()).unwrap();
        assert_eq!(accumulation.len(), 160 * 120);
    }

    #[test]
    fn test_update_camera_resets_accumulation() {
        let Some(gpu) = test_support::gpu() else {
            return;
        };

        let mut engine = recording_engine(&gpu, 32, 32);
        engine.render_pass().unwrap();
        engine.render_pass().unwrap();

        let mut cam = *engine.camera();
        cam.orbit(0.2, 0.0);
        engine.update_camera(cam).unwrap();
        assert_eq!(engine.pass_counter(), 0);

        // Same resolution: no re-registration happened.
        assert_eq!(engine.display_link().registered_total(), 1);
    }
}
