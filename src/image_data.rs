// src/image_data.rs
//! CPU-side image buffers: raw pixel rows or pre-compressed block levels.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};

use crate::gpu::{InternalFormat, PixelFormat};

// ─────────────────────────────────────────────────────────────────────────────
// Block formats
// ─────────────────────────────────────────────────────────────────────────────

/// S3TC block formats a container can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockFormat {
    Dxt1Rgb,
    Dxt1Rgba,
    Dxt3,
    Dxt5,
}

impl BlockFormat {
    pub fn block_bytes(self) -> u32 {
        match self {
            BlockFormat::Dxt1Rgb | BlockFormat::Dxt1Rgba => 8,
            BlockFormat::Dxt3 | BlockFormat::Dxt5 => 16,
        }
    }

    pub fn internal_format(self) -> InternalFormat {
        match self {
            BlockFormat::Dxt1Rgb => InternalFormat::Dxt1Rgb,
            BlockFormat::Dxt1Rgba => InternalFormat::Dxt1Rgba,
            BlockFormat::Dxt3 => InternalFormat::Dxt3,
            BlockFormat::Dxt5 => InternalFormat::Dxt5,
        }
    }

    pub fn pixel_format(self) -> PixelFormat {
        match self {
            BlockFormat::Dxt1Rgb => PixelFormat::Rgb,
            _ => PixelFormat::Rgba,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ImageData
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded image.
///
/// Raw images store `h` rows of `pitch` bytes with `bpp` bytes per pixel.
/// Compressed images store `levels` mip levels back to back; `bpp` is then the
/// byte size of one `align`×`align` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageData {
    pub w: u32,
    pub h: u32,
    pub bpp: u32,
    pub pitch: u32,
    pub levels: u32,
    pub align: u32,
    pub compressed: Option<BlockFormat>,
    pub data: Vec<u8>,
}

impl ImageData {
    /// Zero-filled, tightly packed raw image.
    pub fn new(w: u32, h: u32, bpp: u32) -> Self {
        Self {
            w,
            h,
            bpp,
            pitch: w * bpp,
            levels: 1,
            align: 0,
            compressed: None,
            data: vec![0; (w * bpp * h) as usize],
        }
    }

    pub fn from_raw(w: u32, h: u32, bpp: u32, pitch: u32, data: Vec<u8>) -> Self {
        Self {
            w,
            h,
            bpp,
            pitch,
            levels: 1,
            align: 0,
            compressed: None,
            data,
        }
    }

    pub fn from_blocks(w: u32, h: u32, format: BlockFormat, levels: u32, data: Vec<u8>) -> Self {
        Self {
            w,
            h,
            bpp: format.block_bytes(),
            pitch: 0,
            levels: levels.max(1),
            align: 4,
            compressed: Some(format),
            data,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compressed.is_some()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Byte size of mip level `level`, or the whole raw image at level 0.
    pub fn level_size(&self, level: u32) -> usize {
        let w = self.w.checked_shr(level).unwrap_or(0).max(1);
        let h = self.h.checked_shr(level).unwrap_or(0).max(1);
        if self.compressed.is_some() {
            let a = self.align.max(1);
            w.div_ceil(a) as usize * h.div_ceil(a) as usize * self.bpp as usize
        } else {
            self.pitch as usize * h as usize
        }
    }

    /// Byte offset of mip level `level` in a compressed payload.
    pub fn level_offset(&self, level: u32) -> usize {
        (0..level).map(|l| self.level_size(l)).sum()
    }

    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = (y * self.pitch) as usize;
        &self.data[start..start + (self.w * self.bpp) as usize]
    }

    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = (y * self.pitch) as usize;
        let len = (self.w * self.bpp) as usize;
        &mut self.data[start..start + len]
    }

    /// Raw pixel slice at (x, y).
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = (y * self.pitch + x * self.bpp) as usize;
        &self.data[start..start + self.bpp as usize]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let start = (y * self.pitch + x * self.bpp) as usize;
        let bpp = self.bpp as usize;
        &mut self.data[start..start + bpp]
    }

    /// Run `f` on every pixel in row order.
    pub fn for_each_pixel_mut(&mut self, mut f: impl FnMut(&mut [u8])) {
        let (w, bpp) = (self.w as usize, self.bpp as usize);
        let pitch = self.pitch as usize;
        for y in 0..self.h as usize {
            let row = &mut self.data[y * pitch..y * pitch + w * bpp];
            for px in row.chunks_exact_mut(bpp) {
                f(px);
            }
        }
    }

    /// Build a new tightly packed image of `bpp` bytes per pixel from this
    /// one, writing each destination pixel from its source pixel.
    pub fn map_pixels(&self, bpp: u32, mut f: impl FnMut(&[u8], &mut [u8])) -> ImageData {
        let mut out = ImageData::new(self.w, self.h, bpp);
        for y in 0..self.h {
            let src = self.row(y);
            let dst = out.row_mut(y);
            for (s, d) in src
                .chunks_exact(self.bpp as usize)
                .zip(dst.chunks_exact_mut(bpp as usize))
            {
                f(s, d);
            }
        }
        out
    }

    /// Expand luminance to colour: 1 → 3 and 2 → 4 bytes per pixel.
    pub fn swizzle(&mut self) {
        let dst_bpp = match self.bpp {
            1 => 3,
            2 => 4,
            _ => return,
        };
        *self = self.map_pixels(dst_bpp, |s, d| {
            d[0] = s[0];
            d[1] = s[0];
            d[2] = s[0];
            if dst_bpp == 4 {
                d[3] = s[1];
            }
        });
    }

    /// Resample to `w`×`h` in place.
    pub fn scale(&mut self, w: u32, h: u32) {
        if self.is_compressed() || (w == self.w && h == self.h) {
            return;
        }
        let data = scale_pixels(&self.data, self.w, self.h, self.bpp, self.pitch, w, h);
        *self = ImageData::from_raw(w, h, self.bpp, w * self.bpp, data);
    }

    /// Copy with every row tightly packed.
    pub fn tight(&self) -> Vec<u8> {
        repack_rows(&self.data, self.w, self.h, self.bpp, self.pitch)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pixel-row helpers shared with the upload engine
// ─────────────────────────────────────────────────────────────────────────────

/// Copy `h` rows of `w` pixels out of a padded buffer.
pub fn repack_rows(src: &[u8], w: u32, h: u32, bpp: u32, pitch: u32) -> Vec<u8> {
    let row = (w * bpp) as usize;
    let mut out = Vec::with_capacity(row * h as usize);
    for y in 0..h as usize {
        let start = y * pitch as usize;
        out.extend_from_slice(&src[start..start + row]);
    }
    out
}

/// Resample a pixel buffer to `tw`×`th`, tightly packed.
///
/// Integer reductions use a box filter; everything else goes through the
/// `image` crate's triangle filter.
pub fn scale_pixels(src: &[u8], sw: u32, sh: u32, bpp: u32, pitch: u32, tw: u32, th: u32) -> Vec<u8> {
    if tw == 0 || th == 0 {
        return Vec::new();
    }
    if tw <= sw && th <= sh && sw % tw == 0 && sh % th == 0 {
        return box_downsample(src, sw, sh, bpp, pitch, tw, th);
    }
    let tight = repack_rows(src, sw, sh, bpp, pitch);
    match bpp {
        1 => resize_buffer::<Luma<u8>>(sw, sh, tight, tw, th),
        2 => resize_buffer::<LumaA<u8>>(sw, sh, tight, tw, th),
        3 => resize_buffer::<Rgb<u8>>(sw, sh, tight, tw, th),
        4 => resize_buffer::<Rgba<u8>>(sw, sh, tight, tw, th),
        _ => {
            log::warn!("cannot resample {}-byte pixels", bpp);
            vec![0; (tw * th * bpp) as usize]
        }
    }
}

fn resize_buffer<P>(w: u32, h: u32, data: Vec<u8>, tw: u32, th: u32) -> Vec<u8>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    match ImageBuffer::<P, Vec<u8>>::from_raw(w, h, data) {
        Some(buf) => imageops::resize(&buf, tw, th, FilterType::Triangle).into_raw(),
        None => vec![0; (tw * th * P::CHANNEL_COUNT as u32) as usize],
    }
}

/// Average `sw/tw`×`sh/th` blocks into single pixels. Used for mip levels.
pub fn box_downsample(src: &[u8], sw: u32, sh: u32, bpp: u32, pitch: u32, tw: u32, th: u32) -> Vec<u8> {
    let xs = (sw / tw.max(1)).max(1) as usize;
    let ys = (sh / th.max(1)).max(1) as usize;
    let (bpp, pitch) = (bpp as usize, pitch as usize);
    let area = (xs * ys) as u32;
    let mut out = Vec::with_capacity(tw as usize * th as usize * bpp);
    let mut acc = [0u32; 4];

    for y in 0..th as usize {
        for x in 0..tw as usize {
            acc[..bpp].fill(0);
            for dy in 0..ys {
                let row = (y * ys + dy) * pitch;
                for dx in 0..xs {
                    let px = row + (x * xs + dx) * bpp;
                    for (c, a) in acc[..bpp].iter_mut().enumerate() {
                        *a += src[px + c] as u32;
                    }
                }
            }
            out.extend(acc[..bpp].iter().map(|&a| (a / area) as u8));
        }
    }
    out
}

/// Size of the next mip level.
#[inline]
pub fn half_size(w: u32, h: u32) -> (u32, u32) {
    ((w / 2).max(1), (h / 2).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_downsample_averages() {
        // 2x2 single channel -> 1x1
        let src = [0u8, 100, 200, 100];
        assert_eq!(box_downsample(&src, 2, 2, 1, 2, 1, 1), vec![100]);
    }

    #[test]
    fn test_box_downsample_respects_pitch() {
        // 2x1 RGB with 2 bytes of row padding
        let src = [10u8, 20, 30, 30, 40, 50, 0xff, 0xff];
        let out = box_downsample(&src, 2, 1, 3, 8, 1, 1);
        assert_eq!(out, vec![20, 30, 40]);
    }

    #[test]
    fn test_swizzle_expands_luminance() {
        let mut img = ImageData::from_raw(2, 1, 2, 4, vec![10, 200, 20, 100]);
        img.swizzle();
        assert_eq!(img.bpp, 4);
        assert_eq!(img.data, vec![10, 10, 10, 200, 20, 20, 20, 100]);
    }

    #[test]
    fn test_scale_non_integer() {
        let mut img = ImageData::new(3, 3, 4);
        img.scale(2, 2);
        assert_eq!((img.w, img.h, img.pitch), (2, 2, 8));
        assert_eq!(img.data.len(), 16);
    }

    #[test]
    fn test_compressed_level_sizes() {
        let img = ImageData::from_blocks(8, 8, BlockFormat::Dxt5, 4, vec![0; 64 + 16 + 16 + 16]);
        assert_eq!(img.level_size(0), 64);
        assert_eq!(img.level_size(1), 16);
        assert_eq!(img.level_size(3), 16);
        assert_eq!(img.level_offset(2), 80);
    }
}
