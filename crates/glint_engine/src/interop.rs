//! Display interop registration and the per-pass exclusive access window.
//!
//! The framebuffer's pixel storage is shared between the compute path (the
//! kernel writes it) and the display path (the blit pipeline reads it). The
//! handoff is sequential, never concurrent: the engine holds the buffer for
//! exactly one mapped window per pass, and the display side only consumes it
//! between windows.

use std::cell::Cell;

use wgpu::util::DeviceExt;

use crate::error::EngineError;
use crate::framebuffer::FrameBuffer;
use crate::gpu::Gpu;

/// Registration bookkeeping plus the bind-group layout shared with the blit
/// pipeline.
///
/// Every successful [`register`](Self::register) must be paired with exactly
/// one [`release`](Self::release) before the underlying framebuffer is freed
/// or resized; the counters make that pairing observable.
pub struct DisplayLink {
    layout: wgpu::BindGroupLayout,
    registered_total: u32,
    released_total: u32,
    in_flight: Cell<bool>,
}

/// A live registration of a framebuffer for display consumption.
#[derive(Debug)]
pub struct InteropHandle {
    bind_group: wgpu::BindGroup,
    pub pixel_count: u32,
}

impl InteropHandle {
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

/// Scoped exclusive device access to the registered buffer during one pass.
///
/// Released on every exit path via `Drop`, including kernel failure.
pub struct PassAccess<'a> {
    link: &'a DisplayLink,
}

impl Drop for PassAccess<'_> {
    fn drop(&mut self) {
        self.link.in_flight.set(false);
    }
}

impl DisplayLink {
    pub fn new(gpu: &Gpu) -> Self {
        let layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("display interop layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        Self {
            layout,
            registered_total: 0,
            released_total: 0,
            in_flight: Cell::new(false),
        }
    }

    /// Layout the blit pipeline is built against.
    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Register a framebuffer for display consumption.
    pub fn register(
        &mut self,
        gpu: &Gpu,
        framebuffer: &mut FrameBuffer,
    ) -> Result<InteropHandle, EngineError> {
        if framebuffer.is_registered() {
            return Err(EngineError::Registration {
                what: "framebuffer pixels",
                reason: "already registered".into(),
            });
        }

        let bytes = framebuffer.byte_size();
        let limits = gpu.device.limits();
        if bytes > u64::from(limits.max_storage_buffer_binding_size) {
            return Err(EngineError::Registration {
                what: "framebuffer pixels",
                reason: format!("binding of {bytes} bytes exceeds device limits"),
            });
        }

        let extent = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("display extent"),
                contents: bytemuck::bytes_of(&[framebuffer.width, framebuffer.height, 0u32, 0u32]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("display interop"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: framebuffer.pixels().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: extent.as_entire_binding(),
                },
            ],
        });

        framebuffer.set_registered(true);
        self.registered_total += 1;
        log::debug!(
            "framebuffer registered for display: {}x{}",
            framebuffer.width,
            framebuffer.height
        );

        Ok(InteropHandle {
            bind_group,
            pixel_count: framebuffer.pixel_count,
        })
    }

    /// End a registration. Must happen before the framebuffer is resized.
    pub fn release(&mut self, framebuffer: &mut FrameBuffer, handle: InteropHandle) {
        debug_assert!(
            !self.in_flight.get(),
            "registration released while a pass window is open"
        );
        drop(handle);
        framebuffer.set_registered(false);
        self.released_total += 1;
    }

    /// Open the exclusive device-access window for one pass.
    ///
    /// Fails if a window is already open; the returned guard closes it.
    pub fn map_for_pass<'a>(
        &'a self,
        handle: &'a InteropHandle,
    ) -> Result<PassAccess<'a>, EngineError> {
        if self.in_flight.get() {
            return Err(EngineError::AlreadyMapped);
        }
        self.in_flight.set(true);
        log::trace!("interop buffer mapped for pass ({} texels)", handle.pixel_count);
        Ok(PassAccess { link: self })
    }

    pub fn registered_total(&self) -> u32 {
        self.registered_total
    }

    pub fn released_total(&self) -> u32 {
        self.released_total
    }

    /// Registrations currently alive.
    pub fn outstanding(&self) -> u32 {
        self.registered_total - self.released_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_release_pairing() {
        let Some(gpu) = crate::test_support::gpu() else {
            return;
        };

        let mut link = DisplayLink::new(&gpu);
        let mut framebuffer = FrameBuffer::new(&gpu, 64, 64).unwrap();

        let handle = link.register(&gpu, &mut framebuffer).unwrap();
        assert!(framebuffer.is_registered());
        assert_eq!(link.outstanding(), 1);

        link.release(&mut framebuffer, handle);
        assert!(!framebuffer.is_registered());
        assert_eq!(link.outstanding(), 0);
        assert_eq!(link.registered_total(), 1);
        assert_eq!(link.released_total(), 1);
    }

    #[test]
    fn test_double_register_fails() {
        let Some(gpu) = crate::test_support::gpu() else {
            return;
        };

        let mut link = DisplayLink::new(&gpu);
        let mut framebuffer = FrameBuffer::new(&gpu, 64, 64).unwrap();

        let _handle = link.register(&gpu, &mut framebuffer).unwrap();
        let err = link.register(&gpu, &mut framebuffer).unwrap_err();
        assert!(matches!(err, EngineError::Registration { .. }));
    }

    #[test]
    fn test_pass_window_is_exclusive() {
        let Some(gpu) = crate::test_support::gpu() else {
            return;
        };

        let mut link = DisplayLink::new(&gpu);
        let mut framebuffer = FrameBuffer::new(&gpu, 64, 64).unwrap();
        let handle = link.register(&gpu, &mut framebuffer).unwrap();

        let mapped = link.map_for_pass(&handle).unwrap();
        assert!(matches!(
            link.map_for_pass(&handle),
            Err(EngineError::AlreadyMapped)
        ));

        drop(mapped);
        let remapped = link.map_for_pass(&handle);
        assert!(remapped.is_ok());
    }
}
