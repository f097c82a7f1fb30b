//! Texture management for video frames
//!
//! One `R8Unorm` texture per YUV plane. Textures are recreated only when the
//! frame size changes; uploads honor each plane's stride so FFmpeg's padded
//! rows can be copied without repacking.

use crate::decoder::{Frame, Plane};
use crate::utils::error::{Result, VobPlayerError};

/// A plane texture and its cached view
struct PlaneTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl PlaneTexture {
    fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    fn upload(&self, queue: &wgpu::Queue, plane: &Plane) -> Result<()> {
        check_plane(plane)?;

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &plane.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(plane.stride as u32),
                rows_per_image: Some(plane.height),
            },
            wgpu::Extent3d {
                width: plane.width,
                height: plane.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

/// Reject planes whose buffer cannot hold the rows their geometry claims
pub(crate) fn check_plane(plane: &Plane) -> Result<()> {
    if plane.width == 0 || plane.height == 0 {
        return Err(VobPlayerError::Renderer("Empty video plane".to_string()));
    }
    if plane.stride < plane.width as usize {
        return Err(VobPlayerError::Renderer(format!(
            "Plane stride {} narrower than width {}",
            plane.stride, plane.width
        )));
    }

    let needed = plane.stride * (plane.height as usize - 1) + plane.width as usize;
    if plane.data.len() < needed {
        return Err(VobPlayerError::Renderer(format!(
            "Plane holds {} bytes, {} needed for {}x{} at stride {}",
            plane.data.len(),
            needed,
            plane.width,
            plane.height,
            plane.stride
        )));
    }
    Ok(())
}

/// Texture manager for YUV 4:2:0 frames
pub struct TextureManager {
    /// Y, U, V textures; `None` until the first frame
    planes: Option<[PlaneTexture; 3]>,

    /// Texture sampler
    sampler: wgpu::Sampler,

    /// Luma size the textures were created for
    dimensions: Option<(u32, u32)>,
}

impl TextureManager {
    pub fn new(device: &wgpu::Device) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Video Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            planes: None,
            sampler,
            dimensions: None,
        }
    }

    /// Upload a frame; returns true if the textures were recreated
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: &Frame) -> Result<bool> {
        let dimensions = (frame.width, frame.height);
        let recreated = self.dimensions != Some(dimensions);

        if recreated {
            let [y, u, v] = &frame.planes;
            self.planes = Some([
                PlaneTexture::new(device, "Y Plane Texture", y.width, y.height),
                PlaneTexture::new(device, "U Plane Texture", u.width, u.height),
                PlaneTexture::new(device, "V Plane Texture", v.width, v.height),
            ]);
            self.dimensions = Some(dimensions);
            log::debug!("Video textures resized to {}x{}", frame.width, frame.height);
        }

        if let Some(textures) = &self.planes {
            for (texture, plane) in textures.iter().zip(frame.planes.iter()) {
                texture.upload(queue, plane)?;
            }
        }

        Ok(recreated)
    }

    /// Y, U, V views, once a frame has been uploaded
    pub fn views(&self) -> Option<[&wgpu::TextureView; 3]> {
        self.planes.as_ref().map(|[y, u, v]| [&y.view, &u.view, &v.view])
    }

    /// Sampler shared by all three planes
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Display aspect of the current video
    pub fn aspect_ratio(&self) -> Option<f32> {
        self.dimensions
            .filter(|(_, h)| *h > 0)
            .map(|(w, h)| w as f32 / h as f32)
    }
}
