//! Scene construction and the flat device mirror image.

use glint_math::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Material, Sphere, SphereData};

/// An ordered list of sphere primitives.
///
/// The host copy is authoritative. [`Scene::gpu_data`] produces the flat
/// array the renderer uploads wholesale on every (re)load.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub spheres: Vec<Sphere>,
}

impl Scene {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    /// Flatten into the device records uploaded to the scene mirror.
    pub fn gpu_data(&self) -> Vec<SphereData> {
        self.spheres.iter().map(Sphere::to_gpu).collect()
    }

    /// Randomly colored sphere field with a fixed overhead light and ground.
    ///
    /// All but the last two spheres are scattered through the view volume;
    /// roughly one in five of them emits. The same seed reproduces the same
    /// scene exactly.
    pub fn random(count: usize, seed: u64) -> Self {
        assert!(count >= 2, "random scene needs room for light and ground");

        let mut rng = StdRng::seed_from_u64(seed);
        let mut spheres = Vec::with_capacity(count);

        for _ in 0..count - 2 {
            let position = Vec3::new(
                2.0 - 4.0 * rng.gen::<f32>(),
                0.1 + 1.4 * rng.gen::<f32>(),
                -4.0 * rng.gen::<f32>(),
            );
            let radius = 0.01 + 0.2 * rng.gen::<f32>();
            let diffuse = Vec3::new(rng.gen(), rng.gen(), rng.gen());

            let emission = if rng.gen::<f32>() > 0.8 {
                Vec3::new(
                    5.0 * rng.gen::<f32>(),
                    5.0 * rng.gen::<f32>(),
                    5.4 * rng.gen::<f32>(),
                )
            } else {
                Vec3::ZERO
            };

            spheres.push(Sphere::new(position, radius, Material { diffuse, emission }));
        }

        // Overhead light
        spheres.push(Sphere::new(
            Vec3::new(0.0, 3.0, 0.0),
            0.8,
            Material::emissive(Vec3::new(5.0, 5.0, 5.4)),
        ));

        // Ground
        spheres.push(Sphere::new(
            Vec3::new(0.0, -1e5, 0.0),
            1e5,
            Material::diffuse(Vec3::splat(0.15)),
        ));

        log::debug!("generated random scene: {} spheres, seed {}", count, seed);
        Self { spheres }
    }

    /// Fixed six-sphere open scene.
    pub fn open_scene() -> Self {
        let spheres = vec![
            Sphere::new(
                Vec3::new(0.1, 0.8, -2.0),
                0.8,
                Material::diffuse(Vec3::new(0.60, 0.40, 0.87)),
            ),
            Sphere::new(
                Vec3::new(1.4, 0.9, -0.3),
                0.8,
                Material::diffuse(Vec3::new(0.15, 0.35, 0.87)),
            ),
            Sphere::new(
                Vec3::new(0.0, 3.0, 0.0),
                0.8,
                Material::emissive(Vec3::new(5.0, 5.0, 5.4)),
            ),
            Sphere::new(
                Vec3::new(0.0, -1e5, 0.0),
                1e5,
                Material::diffuse(Vec3::splat(0.15)),
            ),
            Sphere::new(
                Vec3::new(-2.0, 1.3, -3.4),
                1.2,
                Material::diffuse(Vec3::new(0.80, 0.30, 0.80)),
            ),
            Sphere::new(
                Vec3::new(0.0, 0.4, -0.3),
                0.3,
                Material::diffuse(Vec3::new(0.40, 0.87, 0.87)),
            ),
        ];

        Self { spheres }
    }
}
