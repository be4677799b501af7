//! Host-side scene model for the glint renderer.
//!
//! The host `Scene` is authoritative; the renderer mirrors it to the device
//! as a flat array of [`SphereData`] records on every scene (re)load.

mod scene;
mod sphere;

pub use scene::Scene;
pub use sphere::{Material, Sphere, SphereData};
