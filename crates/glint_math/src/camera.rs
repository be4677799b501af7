use glam::{UVec2, Vec3};

use crate::Ray;

/// Pinhole camera state for ray generation.
///
/// Holds the host-authoritative resolution and pose; the renderer keeps a
/// device-side mirror that is rewritten whenever any of these fields change.
#[derive(Debug, Clone, Copy)]
pub struct CameraState {
    pub resolution: UVec2,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
}

/// Orthonormal view basis derived from a [`CameraState`].
#[derive(Debug, Clone, Copy)]
pub struct CameraBasis {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl CameraState {
    /// Create a camera with default pose, looking into the scene volume.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: UVec2::new(width, height),
            position: Vec3::new(0.0, 1.0, 2.5),
            target: Vec3::new(0.0, 0.6, -2.0),
            up: Vec3::Y,
            fov_y: 45.0_f32.to_radians(),
        }
    }

    /// Update resolution (e.g., on window resize). Pose is unchanged.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = UVec2::new(width, height);
    }

    /// Number of pixels at the current resolution.
    pub fn pixel_count(&self) -> usize {
        self.resolution.x as usize * self.resolution.y as usize
    }

    pub fn aspect(&self) -> f32 {
        self.resolution.x as f32 / self.resolution.y as f32
    }

    /// Half-height of the image plane at unit distance.
    pub fn fov_scale(&self) -> f32 {
        (self.fov_y * 0.5).tan()
    }

    /// Derive the orthonormal view basis.
    pub fn basis(&self) -> CameraBasis {
        let forward = (self.target - self.position).normalize();
        let right = forward.cross(self.up).normalize();
        let up = right.cross(forward);
        CameraBasis { forward, right, up }
    }

    /// Primary ray through a pixel center.
    ///
    /// Host-side reference for the device kernel's ray generation; both
    /// derive the direction from the same basis and fov scale.
    pub fn primary_ray(&self, x: u32, y: u32) -> Ray {
        let basis = self.basis();
        let u = ((x as f32 + 0.5) / self.resolution.x as f32) * 2.0 - 1.0;
        let v = ((y as f32 + 0.5) / self.resolution.y as f32) * 2.0 - 1.0;

        let direction = (basis.forward + u * self.aspect() * self.fov_scale() * basis.right
            - v * self.fov_scale() * basis.up)
            .normalize();
        Ray::new(self.position, direction)
    }

    /// Orbit the position around the target by yaw/pitch deltas (radians).
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        let offset = self.position - self.target;
        let distance = offset.length();

        let mut yaw = offset.z.atan2(offset.x);
        let mut pitch = (offset.y / distance).clamp(-1.0, 1.0).asin();

        yaw += delta_yaw;
        // Keep away from the poles so the basis stays well defined
        pitch = (pitch + delta_pitch).clamp(-1.5, 1.5);

        self.position = self.target
            + Vec3::new(
                distance * pitch.cos() * yaw.cos(),
                distance * pitch.sin(),
                distance * pitch.cos() * yaw.sin(),
            );
    }

    /// Move the position along the view direction. Positive moves closer.
    pub fn dolly(&mut self, amount: f32) {
        let offset = self.position - self.target;
        let distance = (offset.length() - amount).max(0.05);
        self.position = self.target + offset.normalize() * distance;
    }
}
