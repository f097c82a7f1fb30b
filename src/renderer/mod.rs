//! Renderer module for VobPlayer
//!
//! This module handles presentation of decoded frames: the render loop that
//! paces frames against the audio clock, and the wgpu surface that uploads
//! the three YUV planes and draws them.

use crate::decoder::Frame;
use crate::utils::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod pipeline;
pub mod render_loop;
pub mod texture;
pub mod wgpu_surface;

pub use render_loop::RenderLoop;
pub use wgpu_surface::WgpuSurface;

/// Display seam: accepts planar YUV frames and presents them
///
/// Implementations are moved onto the render thread once and used only from
/// there.
pub trait VideoSurface: Send {
    /// Upload the frame's three planes
    fn upload(&mut self, frame: &Frame) -> Result<()>;

    /// Draw the last uploaded frame and flip
    fn present(&mut self) -> Result<()>;
}

/// Window size shared between the event loop and the render thread
///
/// The event loop stores, the surface picks the new size up on its next
/// present.
#[derive(Debug, Default)]
pub struct SurfaceSize {
    /// Width in the high 32 bits, height in the low 32 bits
    packed: AtomicU64,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        let size = Self::default();
        size.set(width, height);
        size
    }

    pub fn set(&self, width: u32, height: u32) {
        let packed = (u64::from(width) << 32) | u64::from(height);
        self.packed.store(packed, Ordering::Release);
    }

    pub fn get(&self) -> (u32, u32) {
        let packed = self.packed.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }
}

/// Scale factors that fit a video of `video_aspect` inside the window
/// without distortion
pub fn letterbox(window: (u32, u32), video_aspect: f32) -> (f32, f32) {
    if window.0 == 0 || window.1 == 0 || video_aspect <= 0.0 {
        return (1.0, 1.0);
    }

    let window_aspect = window.0 as f32 / window.1 as f32;
    if video_aspect > window_aspect {
        (1.0, window_aspect / video_aspect)
    } else {
        (video_aspect / window_aspect, 1.0)
    }
}
