//! Shared host/device display pixel storage.

use crate::error::EngineError;
use crate::gpu::Gpu;

/// Bytes per pixel: linear RGBA, `vec4<f32>` device-side.
pub const PIXEL_STRIDE: u64 = 16;

/// The pixel buffer written by the kernel and presented by the display path.
///
/// The buffer is device-resident storage; the display subsystem reads it
/// through an interop registration (see [`crate::interop::DisplayLink`]).
/// A registered framebuffer must never be resized directly — the owner goes
/// through the unregister → resize → register sequence.
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub pixel_count: u32,
    pixels: wgpu::Buffer,
    registered: bool,
}

impl FrameBuffer {
    /// Allocate `width * height` pixels, not yet interop-registered.
    pub fn new(gpu: &Gpu, width: u32, height: u32) -> Result<Self, EngineError> {
        // Sized in u64 so oversize requests fail the limit check instead of
        // wrapping; a successful allocation always fits u32 pixels.
        let pixel_count = u64::from(width) * u64::from(height);
        let pixels = gpu.create_storage_buffer("framebuffer pixels", pixel_count * PIXEL_STRIDE)?;

        log::debug!("framebuffer allocated: {width}x{height} ({pixel_count} pixels)");

        Ok(Self {
            width,
            height,
            pixel_count: pixel_count as u32,
            pixels,
            registered: false,
        })
    }

    /// Reallocate storage for a new resolution.
    ///
    /// The caller must have released any interop registration first; the old
    /// allocation is freed when the new one replaces it.
    pub fn resize(&mut self, gpu: &Gpu, width: u32, height: u32) -> Result<(), EngineError> {
        assert!(
            !self.registered,
            "framebuffer resized while interop-registered"
        );

        *self = Self::new(gpu, width, height)?;
        Ok(())
    }

    pub fn pixels(&self) -> &wgpu::Buffer {
        &self.pixels
    }

    pub fn byte_size(&self) -> u64 {
        u64::from(self.pixel_count) * PIXEL_STRIDE
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn set_registered(&mut self, registered: bool) {
        self.registered = registered;
    }

    /// Copy the device pixels back to host memory (one `[r, g, b, a]` per
    /// pixel, row-major).
    pub fn read_back(&self, gpu: &Gpu) -> Result<Vec<[f32; 4]>, EngineError> {
        gpu.read_buffer(&self.pixels)
    }
}
