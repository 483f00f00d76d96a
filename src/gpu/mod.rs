// src/gpu/mod.rs
//! GPU driver boundary.
//!
//! The registry and upload engine never talk to a graphics API directly. They
//! issue a small set of texture calls through [`GpuDevice`]:
//! allocate/free a handle, set sampling state, upload one level of pixel data or
//! one level of pre-compressed blocks. [`HeadlessDevice`] records the calls for
//! tests and tooling; [`WgpuDevice`] maps them onto wgpu.

pub mod format;
pub mod headless;
pub mod upload;
pub mod wgpu_device;

pub use format::{resolve_format, DataType, InternalFormat, PixelFormat};
pub use headless::{GpuCall, HeadlessDevice};
pub use wgpu_device::WgpuDevice;

/// Opaque device texture name. `0` means "not allocated".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    pub const NONE: TextureHandle = TextureHandle(0);

    #[inline]
    pub fn is_allocated(self) -> bool {
        self.0 != 0
    }
}

/// Binding target of a texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexTarget {
    Tex1D,
    Tex2D,
    CubeMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    /// Array layer of the face in a cube texture.
    pub fn layer(self) -> u32 {
        match self {
            CubeFace::PosX => 0,
            CubeFace::NegX => 1,
            CubeFace::PosY => 2,
            CubeFace::NegY => 3,
            CubeFace::PosZ => 4,
            CubeFace::NegZ => 5,
        }
    }
}

/// Image target of an upload: the whole texture, or one cube face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageTarget {
    Tex1D,
    Tex2D,
    CubeFace(CubeFace),
}

impl ImageTarget {
    pub fn target(self) -> TexTarget {
        match self {
            ImageTarget::Tex1D => TexTarget::Tex1D,
            ImageTarget::Tex2D => TexTarget::Tex2D,
            ImageTarget::CubeFace(_) => TexTarget::CubeMap,
        }
    }
}

/// What the device can do. Reported once, read by the upload policy.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuCaps {
    pub max_texture_size: u32,
    pub max_cube_texture_size: u32,
    /// 0 when anisotropic filtering is unavailable.
    pub max_anisotropy: u32,
    pub hw_mipmap: bool,
    pub texture_compression: bool,
    pub s3tc: bool,
    pub npot: bool,
    pub texture_env_combine: bool,
}

impl Default for GpuCaps {
    fn default() -> Self {
        Self {
            max_texture_size: 4096,
            max_cube_texture_size: 4096,
            max_anisotropy: 16,
            hw_mipmap: false,
            texture_compression: true,
            s3tc: true,
            npot: true,
            texture_env_combine: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Sampling state for one texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerParams {
    pub wrap_s: Wrap,
    pub wrap_t: Wrap,
    pub mag_filter: Filter,
    pub min_filter: Filter,
    /// Filter between mip levels; `None` disables mipmapping.
    pub mip_filter: Option<Filter>,
    pub anisotropy: u32,
    pub generate_mipmap: bool,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            wrap_s: Wrap::Repeat,
            wrap_t: Wrap::Repeat,
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mip_filter: None,
            anisotropy: 0,
            generate_mipmap: false,
        }
    }
}

/// Unpack state for a pixel upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelStore {
    /// Row start alignment in bytes (1, 2, 4 or 8).
    pub alignment: u32,
    /// Pixels per source row; 0 means rows are exactly `width` pixels.
    pub row_length: u32,
}

impl PixelStore {
    /// Byte distance between consecutive source rows.
    pub fn row_stride(&self, width: u32, bytes_per_pixel: u32) -> usize {
        let pixels = if self.row_length > 0 { self.row_length } else { width };
        let row = (pixels * bytes_per_pixel) as usize;
        let align = self.alignment.max(1) as usize;
        row.div_ceil(align) * align
    }
}

/// One level of uncompressed pixel data.
#[derive(Debug, Clone, Copy)]
pub struct ImageUpload<'a> {
    pub handle: TextureHandle,
    pub target: ImageTarget,
    pub level: u32,
    pub internal: InternalFormat,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data_type: DataType,
    pub store: PixelStore,
    pub data: &'a [u8],
}

/// One level of pre-compressed blocks.
#[derive(Debug, Clone, Copy)]
pub struct CompressedUpload<'a> {
    pub handle: TextureHandle,
    pub target: ImageTarget,
    pub level: u32,
    pub format: InternalFormat,
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// The texture half of a graphics driver.
///
/// Uploads address the texture by handle; implementations track whatever
/// per-texture state they need.
pub trait GpuDevice {
    fn caps(&self) -> &GpuCaps;

    fn gen_texture(&mut self) -> TextureHandle;

    fn delete_texture(&mut self, handle: TextureHandle);

    fn set_parameters(&mut self, handle: TextureHandle, target: TexTarget, params: &SamplerParams);

    fn tex_image(&mut self, upload: &ImageUpload<'_>);

    fn compressed_tex_image(&mut self, upload: &CompressedUpload<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_stride() {
        let tight = PixelStore { alignment: 1, row_length: 0 };
        assert_eq!(tight.row_stride(3, 3), 9);

        let padded = PixelStore { alignment: 4, row_length: 0 };
        assert_eq!(padded.row_stride(3, 3), 12);

        let long = PixelStore { alignment: 1, row_length: 5 };
        assert_eq!(long.row_stride(3, 4), 20);
    }

    #[test]
    fn test_cube_layers_are_distinct() {
        let faces = [
            CubeFace::PosX,
            CubeFace::NegX,
            CubeFace::PosY,
            CubeFace::NegY,
            CubeFace::PosZ,
            CubeFace::NegZ,
        ];
        let mut layers: Vec<u32> = faces.iter().map(|f| f.layer()).collect();
        layers.sort_unstable();
        assert_eq!(layers, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(ImageTarget::CubeFace(CubeFace::NegY).target(), TexTarget::CubeMap);
    }
}
