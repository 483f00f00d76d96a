// src/gpu/wgpu_device.rs
//! [`GpuDevice`] on top of wgpu.
//!
//! wgpu textures are immutable in size and format, so the wgpu texture behind
//! a handle is created on the first level-0 upload (or re-created when a later
//! level-0 upload changes its shape). Byte formats without a wgpu equivalent
//! (luminance, RGB) are widened to RGBA8 on the way in.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    CompressedUpload, CubeFace, DataType, Filter, GpuCaps, GpuDevice, ImageTarget, ImageUpload,
    InternalFormat, PixelFormat, SamplerParams, TexTarget, TextureHandle, Wrap,
};
use crate::texture::max_mip_levels;

struct GpuTexture {
    target: TexTarget,
    params: SamplerParams,
    sampler: Option<wgpu::Sampler>,
    texture: Option<wgpu::Texture>,
    view: Option<wgpu::TextureView>,
    format: Option<wgpu::TextureFormat>,
    size: (u32, u32),
    mip_level_count: u32,
}

impl GpuTexture {
    fn new() -> Self {
        Self {
            target: TexTarget::Tex2D,
            params: SamplerParams::default(),
            sampler: None,
            texture: None,
            view: None,
            format: None,
            size: (0, 0),
            mip_level_count: 1,
        }
    }
}

pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    caps: GpuCaps,
    next_handle: u32,
    textures: HashMap<TextureHandle, GpuTexture>,
}

impl WgpuDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let limits = device.limits();
        let bc = device.features().contains(wgpu::Features::TEXTURE_COMPRESSION_BC);
        let caps = GpuCaps {
            max_texture_size: limits.max_texture_dimension_2d,
            max_cube_texture_size: limits.max_texture_dimension_2d,
            max_anisotropy: 16,
            hw_mipmap: false,
            // wgpu cannot compress on upload; only pre-compressed BCn data is usable.
            texture_compression: false,
            s3tc: bc,
            npot: true,
            texture_env_combine: true,
        };
        Self {
            device,
            queue,
            caps,
            next_handle: 0,
            textures: HashMap::new(),
        }
    }

    pub fn view(&self, handle: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures.get(&handle)?.view.as_ref()
    }

    pub fn sampler(&self, handle: TextureHandle) -> Option<&wgpu::Sampler> {
        self.textures.get(&handle)?.sampler.as_ref()
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&wgpu::Texture> {
        self.textures.get(&handle)?.texture.as_ref()
    }

    fn create_sampler(&self, handle: TextureHandle, params: &SamplerParams) -> wgpu::Sampler {
        let address = |wrap: Wrap| match wrap {
            Wrap::Repeat => wgpu::AddressMode::Repeat,
            Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        };
        let filter = |f: Filter| match f {
            Filter::Nearest => wgpu::FilterMode::Nearest,
            Filter::Linear => wgpu::FilterMode::Linear,
        };
        let all_linear = params.mag_filter == Filter::Linear
            && params.min_filter == Filter::Linear
            && params.mip_filter == Some(Filter::Linear);
        let anisotropy_clamp = if params.anisotropy > 1 && all_linear {
            params.anisotropy.min(16) as u16
        } else {
            1
        };
        let label = format!("texture {}", handle.0);

        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&label),
            address_mode_u: address(params.wrap_s),
            address_mode_v: address(params.wrap_t),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter(params.mag_filter),
            min_filter: filter(params.min_filter),
            mipmap_filter: filter(params.mip_filter.unwrap_or(Filter::Nearest)),
            lod_min_clamp: 0.0,
            lod_max_clamp: if params.mip_filter.is_some() { 32.0 } else { 0.0 },
            anisotropy_clamp,
            ..Default::default()
        })
    }

    /// Make sure `handle` has a wgpu texture matching a level-0 upload.
    fn ensure_storage(
        &mut self,
        handle: TextureHandle,
        target: ImageTarget,
        format: wgpu::TextureFormat,
        (w, h): (u32, u32),
    ) -> bool {
        let Some(entry) = self.textures.get(&handle) else {
            log::warn!("upload to unknown texture handle {}", handle.0);
            return false;
        };
        if entry.texture.is_some() && entry.format == Some(format) && entry.size == (w, h) {
            return true;
        }

        let cube = target.target() == TexTarget::CubeMap || entry.target == TexTarget::CubeMap;
        let mip_level_count = if entry.params.mip_filter.is_some() {
            max_mip_levels(w, h)
        } else {
            1
        };
        let label = format!("texture {}", handle.0);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size: wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: if cube { 6 } else { 1 },
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(if cube {
                wgpu::TextureViewDimension::Cube
            } else {
                wgpu::TextureViewDimension::D2
            }),
            array_layer_count: Some(if cube { 6 } else { 1 }),
            ..Default::default()
        });

        if let Some(entry) = self.textures.get_mut(&handle) {
            entry.texture = Some(texture);
            entry.view = Some(view);
            entry.format = Some(format);
            entry.size = (w, h);
            entry.mip_level_count = mip_level_count;
        }
        true
    }

    /// The wgpu texture for a level upload, if that level exists.
    fn level_target(&self, handle: TextureHandle, level: u32) -> Option<&wgpu::Texture> {
        let entry = self.textures.get(&handle)?;
        if level >= entry.mip_level_count {
            log::debug!("texture {}: dropping mip level {}", handle.0, level);
            return None;
        }
        entry.texture.as_ref()
    }
}

fn layer(target: ImageTarget) -> u32 {
    match target {
        ImageTarget::CubeFace(face) => face.layer(),
        _ => CubeFace::PosX.layer(),
    }
}

#[derive(Clone, Copy)]
enum Channel {
    Src(usize),
    Zero,
    One,
}

fn channel_map(format: PixelFormat) -> Option<[Channel; 4]> {
    use Channel::*;
    Some(match format {
        PixelFormat::Luminance => [Src(0), Src(0), Src(0), One],
        PixelFormat::LuminanceAlpha => [Src(0), Src(0), Src(0), Src(1)],
        PixelFormat::Red => [Src(0), Zero, Zero, One],
        PixelFormat::Rg => [Src(0), Src(1), Zero, One],
        PixelFormat::Rgb => [Src(0), Src(1), Src(2), One],
        PixelFormat::Rgba => [Src(0), Src(1), Src(2), Src(3)],
        PixelFormat::DepthComponent => return None,
    })
}

/// Widen rows of `format` pixels to tightly packed 4-channel pixels.
fn expand_to_rgba(upload: &ImageUpload<'_>) -> Option<(Vec<u8>, wgpu::TextureFormat)> {
    let map = channel_map(upload.format)?;
    let cs = upload.data_type.size() as usize;
    let (one, wgpu_format): (Vec<u8>, _) = match upload.data_type {
        DataType::UnsignedByte => (vec![0xff], wgpu::TextureFormat::Rgba8Unorm),
        DataType::Float => (1.0f32.to_ne_bytes().to_vec(), wgpu::TextureFormat::Rgba32Float),
    };
    let zero = vec![0u8; cs];
    let src_bpp = upload.format.components() as usize * cs;
    let stride = upload.store.row_stride(upload.width, src_bpp as u32);

    let mut out = Vec::with_capacity(upload.width as usize * upload.height as usize * 4 * cs);
    for y in 0..upload.height as usize {
        let start = y * stride;
        let row = upload.data.get(start..start + upload.width as usize * src_bpp)?;
        for px in row.chunks_exact(src_bpp) {
            for ch in map {
                match ch {
                    Channel::Src(i) => out.extend_from_slice(&px[i * cs..(i + 1) * cs]),
                    Channel::Zero => out.extend_from_slice(&zero),
                    Channel::One => out.extend_from_slice(&one),
                }
            }
        }
    }
    Some((out, wgpu_format))
}

fn block_format(format: InternalFormat) -> Option<wgpu::TextureFormat> {
    match format {
        InternalFormat::Dxt1Rgb | InternalFormat::Dxt1Rgba => Some(wgpu::TextureFormat::Bc1RgbaUnorm),
        InternalFormat::Dxt3 => Some(wgpu::TextureFormat::Bc2RgbaUnorm),
        InternalFormat::Dxt5 => Some(wgpu::TextureFormat::Bc3RgbaUnorm),
        _ => None,
    }
}

impl GpuDevice for WgpuDevice {
    fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    fn gen_texture(&mut self) -> TextureHandle {
        self.next_handle += 1;
        let handle = TextureHandle(self.next_handle);
        self.textures.insert(handle, GpuTexture::new());
        handle
    }

    fn delete_texture(&mut self, handle: TextureHandle) {
        if let Some(entry) = self.textures.remove(&handle) {
            if let Some(texture) = entry.texture {
                texture.destroy();
            }
        }
    }

    fn set_parameters(&mut self, handle: TextureHandle, target: TexTarget, params: &SamplerParams) {
        let sampler = self.create_sampler(handle, params);
        match self.textures.get_mut(&handle) {
            Some(entry) => {
                entry.target = target;
                entry.params = *params;
                entry.sampler = Some(sampler);
            }
            None => log::warn!("parameters for unknown texture handle {}", handle.0),
        }
    }

    fn tex_image(&mut self, upload: &ImageUpload<'_>) {
        if upload.format == PixelFormat::DepthComponent {
            log::warn!("texture {}: depth uploads are not supported", upload.handle.0);
            return;
        }
        let wgpu_format = match upload.data_type {
            DataType::UnsignedByte => wgpu::TextureFormat::Rgba8Unorm,
            DataType::Float => wgpu::TextureFormat::Rgba32Float,
        };
        if upload.level == 0
            && !self.ensure_storage(upload.handle, upload.target, wgpu_format, (upload.width, upload.height))
        {
            return;
        }
        if upload.data.is_empty() {
            return;
        }
        let Some((pixels, format)) = expand_to_rgba(upload) else {
            log::warn!("texture {}: pixel data shorter than declared size", upload.handle.0);
            return;
        };
        let Some(texture) = self.level_target(upload.handle, upload.level) else {
            return;
        };
        let bytes_per_pixel = format.block_copy_size(None).unwrap_or(4);

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: upload.level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer(upload.target),
                },
            },
            &pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_pixel * upload.width),
                rows_per_image: Some(upload.height),
            },
            wgpu::Extent3d {
                width: upload.width,
                height: upload.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn compressed_tex_image(&mut self, upload: &CompressedUpload<'_>) {
        let Some(format) = block_format(upload.format) else {
            log::warn!("texture {}: unsupported compressed format {:?}", upload.handle.0, upload.format);
            return;
        };
        if !self.caps.s3tc {
            log::warn!("texture {}: device lacks BC texture support", upload.handle.0);
            return;
        }
        let (bw, bh) = (upload.width.div_ceil(4), upload.height.div_ceil(4));
        if upload.level == 0 && !self.ensure_storage(upload.handle, upload.target, format, (bw * 4, bh * 4)) {
            return;
        }
        let Some(texture) = self.level_target(upload.handle, upload.level) else {
            return;
        };
        let block_bytes = format.block_copy_size(None).unwrap_or(16);

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: upload.level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer(upload.target),
                },
            },
            upload.data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bw * block_bytes),
                rows_per_image: Some(bh),
            },
            wgpu::Extent3d {
                width: bw * 4,
                height: bh * 4,
                depth_or_array_layers: 1,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::PixelStore;

    fn upload<'a>(format: PixelFormat, data_type: DataType, width: u32, store: PixelStore, data: &'a [u8]) -> ImageUpload<'a> {
        ImageUpload {
            handle: TextureHandle(1),
            target: ImageTarget::Tex2D,
            level: 0,
            internal: InternalFormat::Rgba8,
            width,
            height: 1,
            format,
            data_type,
            store,
            data,
        }
    }

    #[test]
    fn test_expand_luminance_alpha() {
        let store = PixelStore { alignment: 1, row_length: 0 };
        let (px, fmt) = expand_to_rgba(&upload(PixelFormat::LuminanceAlpha, DataType::UnsignedByte, 2, store, &[10, 20, 30, 40])).unwrap();
        assert_eq!(fmt, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(px, vec![10, 10, 10, 20, 30, 30, 30, 40]);
    }

    #[test]
    fn test_expand_float_rgb() {
        let store = PixelStore { alignment: 4, row_length: 0 };
        let src: Vec<u8> = bytemuck::cast_slice(&[0.5f32, 0.25, 0.125]).to_vec();
        let (px, fmt) = expand_to_rgba(&upload(PixelFormat::Rgb, DataType::Float, 1, store, &src)).unwrap();
        assert_eq!(fmt, wgpu::TextureFormat::Rgba32Float);
        let floats: Vec<f32> = px
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(floats, vec![0.5, 0.25, 0.125, 1.0]);
    }

    #[test]
    fn test_expand_rejects_short_rows() {
        let store = PixelStore { alignment: 1, row_length: 0 };
        assert!(expand_to_rgba(&upload(PixelFormat::Rgb, DataType::UnsignedByte, 2, store, &[1, 2, 3])).is_none());
    }
}
