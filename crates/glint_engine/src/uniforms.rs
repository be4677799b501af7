//! Host-side images of the device uniform and storage records.
//!
//! Layouts must match the WGSL structs in `shaders/`; `vec3` fields carry
//! explicit padding to 16-byte alignment.

use glint_math::CameraState;

/// Device mirror of [`CameraState`], rewritten whenever any field changes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub position: [f32; 3],
    _pad0: f32,
    pub forward: [f32; 3],
    _pad1: f32,
    pub right: [f32; 3],
    _pad2: f32,
    pub up: [f32; 3],
    _pad3: f32,
    pub resolution: [f32; 2],
    pub fov_scale: f32,
    _pad4: f32,
}

impl CameraUniform {
    pub fn from_camera(camera: &CameraState) -> Self {
        let basis = camera.basis();
        Self {
            position: camera.position.to_array(),
            _pad0: 0.0,
            forward: basis.forward.to_array(),
            _pad1: 0.0,
            right: basis.right.to_array(),
            _pad2: 0.0,
            up: basis.up.to_array(),
            _pad3: 0.0,
            resolution: [camera.resolution.x as f32, camera.resolution.y as f32],
            fov_scale: camera.fov_scale(),
            _pad4: 0.0,
        }
    }
}

/// Per-pass state, rewritten at the start of every pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassUniform {
    pub width: u32,
    pub height: u32,
    pub pass_index: u32,
    pub sphere_count: u32,
}

/// Device ray record, written by the kernel's ray-generation step.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RayData {
    pub origin: [f32; 3],
    _pad0: f32,
    pub direction: [f32; 3],
    _pad1: f32,
}

/// Bytes per device ray record.
pub const RAY_STRIDE: u64 = std::mem::size_of::<RayData>() as u64;
