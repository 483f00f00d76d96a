// src/gpu/format.rs
//! Pixel formats, data types and internal (storage) formats.

/// Layout of client-side pixel rows handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Luminance,
    LuminanceAlpha,
    Red,
    Rg,
    Rgb,
    Rgba,
    DepthComponent,
}

impl PixelFormat {
    /// Byte format for an uncompressed image with `bpp` bytes per pixel.
    pub fn from_bpp(bpp: u32) -> Option<Self> {
        match bpp {
            1 => Some(Self::Luminance),
            2 => Some(Self::LuminanceAlpha),
            3 => Some(Self::Rgb),
            4 => Some(Self::Rgba),
            _ => None,
        }
    }

    pub fn components(self) -> u32 {
        match self {
            Self::Luminance | Self::Red | Self::DepthComponent => 1,
            Self::LuminanceAlpha | Self::Rg => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, Self::LuminanceAlpha | Self::Rgba)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UnsignedByte,
    Float,
}

impl DataType {
    pub fn size(self) -> u32 {
        match self {
            Self::UnsignedByte => 1,
            Self::Float => 4,
        }
    }
}

/// Storage format requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalFormat {
    Luminance8,
    LuminanceAlpha8,
    R8,
    Rg8,
    Rgb5,
    Rgb8,
    Rgb16,
    Rgba8,
    Rgba16,
    R32F,
    Rg16F,
    Rgb16F,
    Rgb32F,
    Rgba16F,
    Rgba32F,
    Depth16,
    Depth24,
    Depth32,
    /// Driver-chosen compression.
    CompressedRgb,
    CompressedRgba,
    Dxt1Rgb,
    Dxt1Rgba,
    Dxt3,
    Dxt5,
}

impl InternalFormat {
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            Self::CompressedRgb
                | Self::CompressedRgba
                | Self::Dxt1Rgb
                | Self::Dxt1Rgba
                | Self::Dxt3
                | Self::Dxt5
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            Self::R32F | Self::Rg16F | Self::Rgb16F | Self::Rgb32F | Self::Rgba16F | Self::Rgba32F
        )
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth16 | Self::Depth24 | Self::Depth32)
    }

    /// Pixel format a compressed format decodes to, `None` for uncompressed ones.
    pub fn uncompressed(self) -> Option<PixelFormat> {
        match self {
            Self::CompressedRgb | Self::Dxt1Rgb => Some(PixelFormat::Rgb),
            Self::CompressedRgba | Self::Dxt1Rgba | Self::Dxt3 | Self::Dxt5 => {
                Some(PixelFormat::Rgba)
            }
            _ => None,
        }
    }

    /// Edge length of one compression block and bytes per block.
    pub fn block_info(self) -> Option<(u32, u32)> {
        match self {
            Self::Dxt1Rgb | Self::Dxt1Rgba => Some((4, 8)),
            Self::Dxt3 | Self::Dxt5 => Some((4, 16)),
            _ => None,
        }
    }
}

impl From<PixelFormat> for InternalFormat {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Luminance => Self::Luminance8,
            PixelFormat::LuminanceAlpha => Self::LuminanceAlpha8,
            PixelFormat::Red => Self::R8,
            PixelFormat::Rg => Self::Rg8,
            PixelFormat::Rgb => Self::Rgb8,
            PixelFormat::Rgba => Self::Rgba8,
            PixelFormat::DepthComponent => Self::Depth24,
        }
    }
}

/// Client format and data type used to upload into `internal`.
///
/// Float storage always takes float data and depth storage takes depth
/// components; a caller-supplied `format` overrides the derived layout but
/// never the data type.
pub fn resolve_format(internal: InternalFormat, format: Option<PixelFormat>) -> (PixelFormat, DataType) {
    use InternalFormat::*;

    let (derived, ty) = match internal {
        R32F | Rg16F | Rgb16F | Rgb32F => (PixelFormat::Rgb, DataType::Float),
        Rgba16F | Rgba32F => (PixelFormat::Rgba, DataType::Float),
        Depth16 | Depth24 | Depth32 => (PixelFormat::DepthComponent, DataType::UnsignedByte),
        Rgb5 | Rgb8 | Rgb16 | CompressedRgb | Dxt1Rgb => (PixelFormat::Rgb, DataType::UnsignedByte),
        Rgba8 | Rgba16 | CompressedRgba | Dxt1Rgba | Dxt3 | Dxt5 => {
            (PixelFormat::Rgba, DataType::UnsignedByte)
        }
        Luminance8 => (PixelFormat::Luminance, DataType::UnsignedByte),
        LuminanceAlpha8 => (PixelFormat::LuminanceAlpha, DataType::UnsignedByte),
        R8 => (PixelFormat::Red, DataType::UnsignedByte),
        Rg8 => (PixelFormat::Rg, DataType::UnsignedByte),
    };
    (format.unwrap_or(derived), ty)
}
