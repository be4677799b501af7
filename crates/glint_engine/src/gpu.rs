//! GPU context shared by the engine and the display path.

use crate::error::EngineError;

/// Adapter, device, and queue for one GPU.
///
/// Owned once for the lifetime of the renderer; every buffer, pipeline, and
/// submission goes through this context.
pub struct Gpu {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl Gpu {
    /// Acquire a device, preferring an adapter compatible with `surface`.
    pub fn new(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, EngineError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .ok_or(EngineError::AdapterNotFound)?;

        log::info!("using adapter: {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("glint device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    /// Acquire a device without a surface (tests, offline use).
    pub fn headless() -> Result<Self, EngineError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        Self::new(&instance, None)
    }

    /// Validate a requested allocation against device limits.
    ///
    /// Performed before buffer creation so an oversize request surfaces as a
    /// diagnostic naming the operation and the requested byte count.
    pub(crate) fn check_allocation(&self, what: &'static str, bytes: u64) -> Result<(), EngineError> {
        let limits = self.device.limits();
        if bytes == 0
            || bytes > limits.max_buffer_size
            || bytes > u64::from(limits.max_storage_buffer_binding_size)
        {
            return Err(EngineError::Allocation { what, bytes });
        }
        Ok(())
    }

    /// Create a zero-initialized device storage buffer.
    pub(crate) fn create_storage_buffer(
        &self,
        what: &'static str,
        bytes: u64,
    ) -> Result<wgpu::Buffer, EngineError> {
        self.check_allocation(what, bytes)?;
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(what),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    /// Copy a device buffer back to host memory.
    ///
    /// Synchronous: submits a copy into a staging buffer, blocks until the
    /// device finishes, and maps the staging buffer for reading. The source
    /// must carry `COPY_SRC` usage.
    pub fn read_buffer<T: bytemuck::Pod>(
        &self,
        buffer: &wgpu::Buffer,
    ) -> Result<Vec<T>, EngineError> {
        let size = buffer.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| EngineError::Readback("map callback was dropped".into()))?
            .map_err(|e| EngineError::Readback(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let out = bytemuck::cast_slice(&mapped).to_vec();
        drop(mapped);
        staging.unmap();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_buffer_roundtrip() {
        let Some(gpu) = crate::test_support::gpu() else {
            return;
        };

        let buffer = gpu.create_storage_buffer("roundtrip", 16).unwrap();
        let values = [1.0f32, 2.0, 3.0, 4.0];
        gpu.queue.write_buffer(&buffer, 0, bytemuck::cast_slice(&values));

        let back: Vec<f32> = gpu.read_buffer(&buffer).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn test_oversize_allocation_is_rejected() {
        let Some(gpu) = crate::test_support::gpu() else {
            return;
        };

        let err = gpu.create_storage_buffer("oversize", u64::MAX).unwrap_err();
        match err {
            EngineError::Allocation { what, bytes } => {
                assert_eq!(what, "oversize");
                assert_eq!(bytes, u64::MAX);
            }
            other => panic!("expected allocation error, got {other}"),
        }
    }
}
