// src/texture.rs
//! Registry records for loaded textures.

use bitflags::bitflags;

use crate::gpu::TextureHandle;
use crate::image_data::ImageData;

/// Index of a row in the texture registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl TextureId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Image,
    Cubemap,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u8 {
        /// Dropped from the registry on cleanup and never reloaded.
        const TRANSIENT  = 1 << 0;
        /// Registered but holding no pixel data.
        const STUB       = 1 << 1;
        const ALPHA      = 1 << 2;
        const COMPRESSED = 1 << 3;
        /// Loaded with `can_reduce`; reloads keep the reduced size.
        const REDUCIBLE  = 1 << 4;
        /// Decoded as a normal map.
        const NORMAL_MAP = 1 << 5;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Texture
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    /// Normalized name, the registry key.
    pub name: String,
    pub handle: TextureHandle,
    /// Uploaded size.
    pub w: u32,
    pub h: u32,
    /// Size of the decoded source image.
    pub xs: u32,
    pub ys: u32,
    pub bpp: u32,
    pub kind: TextureKind,
    pub flags: TextureFlags,
    /// `CLAMP_S` / `CLAMP_T` bits.
    pub clamp: u8,
    pub mipmap: bool,
    /// One bit per source pixel, rows padded to whole bytes.
    pub alpha_mask: Option<Vec<u8>>,
}

impl Texture {
    /// An empty stub row.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: TextureHandle::NONE,
            w: 0,
            h: 0,
            xs: 0,
            ys: 0,
            bpp: 0,
            kind: TextureKind::Image,
            flags: TextureFlags::STUB,
            clamp: 0,
            mipmap: false,
            alpha_mask: None,
        }
    }

    #[inline]
    pub fn is_stub(&self) -> bool {
        self.flags.contains(TextureFlags::STUB)
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.flags.contains(TextureFlags::TRANSIENT)
    }

    #[inline]
    pub fn has_alpha(&self) -> bool {
        self.flags.contains(TextureFlags::ALPHA)
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(TextureFlags::COMPRESSED)
    }

    /// Whether a device texture currently backs this row.
    #[inline]
    pub fn is_resident(&self) -> bool {
        self.handle.is_allocated()
    }

    /// Alpha-mask lookup in source pixel coordinates. `None` without a mask.
    pub fn alpha_at(&self, x: u32, y: u32) -> Option<bool> {
        let mask = self.alpha_mask.as_ref()?;
        if x >= self.xs || y >= self.ys {
            return Some(false);
        }
        let stride = self.xs.div_ceil(8) as usize;
        let byte = mask.get(y as usize * stride + (x / 8) as usize)?;
        Some(byte & (1 << (x % 8)) != 0)
    }
}

/// Mip levels of a full chain down to 1×1.
#[inline]
pub fn max_mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// 1-bit coverage mask of a raw image: bit set where the last channel is non-zero.
pub fn build_alpha_mask(img: &ImageData) -> Option<Vec<u8>> {
    if img.is_empty() || img.is_compressed() || img.bpp == 0 {
        return None;
    }
    let stride = img.w.div_ceil(8) as usize;
    let bpp = img.bpp as usize;
    let mut mask = vec![0u8; stride * img.h as usize];
    for y in 0..img.h {
        let row = img.row(y);
        let dst = &mut mask[y as usize * stride..(y as usize + 1) * stride];
        for (x, px) in row.chunks_exact(bpp).take(img.w as usize).enumerate() {
            if px[bpp - 1] != 0 {
                dst[x / 8] |= 1 << (x % 8);
            }
        }
    }
    Some(mask)
}

// ─────────────────────────────────────────────────────────────────────────────
// Procedural textures
// ─────────────────────────────────────────────────────────────────────────────

pub struct TextureGenerator;

impl TextureGenerator {
    /// Checkerboard pattern, used when the missing-texture image itself is missing.
    pub fn checkerboard(size: u32, tile_size: u32, color_a: [u8; 3], color_b: [u8; 3]) -> ImageData {
        let tile_size = tile_size.max(1);
        let mut img = ImageData::new(size, size, 3);
        for y in 0..size {
            let row = img.row_mut(y);
            for x in 0..size {
                let checker = ((x / tile_size) + (y / tile_size)) % 2 == 0;
                let color = if checker { color_a } else { color_b };
                let idx = (x * 3) as usize;
                row[idx..idx + 3].copy_from_slice(&color);
            }
        }
        img
    }

    /// The 64×64 magenta/black fallback.
    pub fn missing() -> ImageData {
        Self::checkerboard(64, 8, [255, 0, 255], [0, 0, 0])
    }
}
