//! GPU-resident progressive renderer.
//!
//! The engine owns every device-side resource needed to accumulate per-pixel
//! radiance over successive passes and to present the running average
//! through a framebuffer shared with the display path:
//!
//! - [`FrameBuffer`]: the pixel storage written by the kernel and consumed
//!   by the present blit through an interop registration.
//! - [`RenderEngine`]: pass orchestration, buffer lifecycle, and the
//!   map → compute → unmap window around every kernel dispatch.
//! - [`KernelDispatch`]: the dispatch boundary; [`PathTraceKernel`] is the
//!   WGSL compute implementation.
//! - [`DisplaySurface`]: the window surface plus the blit that presents a
//!   registered framebuffer.

pub mod display;
pub mod engine;
pub mod error;
pub mod framebuffer;
pub mod gpu;
pub mod interop;
pub mod kernel;
pub mod uniforms;

pub use display::DisplaySurface;
pub use engine::{Frame, RenderEngine};
pub use error::EngineError;
pub use framebuffer::FrameBuffer;
pub use gpu::Gpu;
pub use interop::{DisplayLink, InteropHandle, PassAccess};
pub use kernel::{KernelBindings, KernelDispatch, PassArgs, PathTraceKernel};
pub use uniforms::{CameraUniform, PassUniform, RayData};
