//! Sphere primitive and its device-side representation.

use glint_math::Vec3;

/// Surface attributes of a primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Diffuse reflectance (RGB, 0-1)
    pub diffuse: Vec3,
    /// Emitted radiance (RGB, for light sources)
    pub emission: Vec3,
}

impl Material {
    pub fn diffuse(diffuse: Vec3) -> Self {
        Self {
            diffuse,
            emission: Vec3::ZERO,
        }
    }

    pub fn emissive(emission: Vec3) -> Self {
        Self {
            diffuse: Vec3::ZERO,
            emission,
        }
    }

    pub fn is_emissive(&self) -> bool {
        self.emission.length_squared() > 0.0
    }
}

/// A sphere primitive. Immutable once uploaded for a given scene generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub position: Vec3,
    pub radius: f32,
    pub material: Material,
}

impl Sphere {
    pub fn new(position: Vec3, radius: f32, material: Material) -> Self {
        Self {
            position,
            radius: radius.max(0.0),
            material,
        }
    }

    /// Flatten into the device record.
    pub fn to_gpu(&self) -> SphereData {
        SphereData {
            position: self.position.to_array(),
            radius: self.radius,
            diffuse: self.material.diffuse.to_array(),
            _pad0: 0.0,
            emission: self.material.emission.to_array(),
            _pad1: 0.0,
        }
    }
}

/// Device-side sphere record.
///
/// Layout must match the WGSL `Sphere` struct: vec3 fields are 16-byte
/// aligned, so the record is padded to 48 bytes. The array is flat and
/// self-contained — no pointers or indices into other allocations.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SphereData {
    pub position: [f32; 3],
    pub radius: f32,
    pub diffuse: [f32; 3],
    pub _pad0: f32,
    pub emission: [f32; 3],
    pub _pad1: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_data_layout() {
        // WGSL sizes the struct at 48 bytes; the upload is a byte cast.
        assert_eq!(std::mem::size_of::<SphereData>(), 48);
        assert_eq!(std::mem::align_of::<SphereData>(), 4);
    }

    #[test]
    fn test_to_gpu_roundtrip() {
        let sphere = Sphere::new(
            Vec3::new(1.0, 2.0, 3.0),
            0.5,
            Material {
                diffuse: Vec3::new(0.8, 0.1, 0.2),
                emission: Vec3::new(0.0, 5.0, 0.0),
            },
        );

        let data = sphere.to_gpu();
        assert_eq!(data.position, [1.0, 2.0, 3.0]);
        assert_eq!(data.radius, 0.5);
        assert_eq!(data.diffuse, [0.8, 0.1, 0.2]);
        assert_eq!(data.emission, [0.0, 5.0, 0.0]);
    }

    #[test]
    fn test_negative_radius_clamped() {
        let sphere = Sphere::new(Vec3::ZERO, -1.0, Material::diffuse(Vec3::ONE));
        assert_eq!(sphere.radius, 0.0);
    }

    #[test]
    fn test_is_emissive() {
        assert!(!Material::diffuse(Vec3::ONE).is_emissive());
        assert!(Material::emissive(Vec3::new(5.0, 5.0, 5.4)).is_emissive());
    }
}
