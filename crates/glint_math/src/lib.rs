// Re-export glam for convenience
pub use glam::*;

mod camera;
mod ray;

pub use camera::{CameraBasis, CameraState};
pub use ray::Ray;
