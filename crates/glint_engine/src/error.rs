//! Engine fault taxonomy.
//!
//! Device allocation, interop registration, map/unmap, and kernel dispatch
//! failures are all environment faults with no retry policy: callers are
//! expected to log the diagnostic and terminate rather than continue in a
//! partially initialized state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no compatible GPU adapter found")]
    AdapterNotFound,

    #[error("failed to acquire GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("device allocation of {bytes} bytes for {what} exceeds device limits")]
    Allocation { what: &'static str, bytes: u64 },

    #[error("display registration failed for {what}: {reason}")]
    Registration { what: &'static str, reason: String },

    #[error("interop buffer is already mapped for a pass")]
    AlreadyMapped,

    #[error("buffer readback failed: {0}")]
    Readback(String),

    #[error("kernel dispatch failed: {0}")]
    Dispatch(String),

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("surface creation failed: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
}
