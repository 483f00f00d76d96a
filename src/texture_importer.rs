// src/texture_importer.rs
//! Image decode gateway.
//!
//! Turns a path into either a raw pixel surface or a pre-compressed block
//! payload. Implementations must be reentrant: the decode phase of a texture
//! set calls them from worker threads, and nothing here ever touches the GPU.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;

use crate::image_data::{BlockFormat, ImageData};
use crate::settings::MAX_IMAGE_SIZE;
use crate::texture::max_mip_levels;

/// Unified error type for texture importing.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image Decode Error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Corrupt container: {0}")]
    Corrupt(String),
    #[error("Unsupported format or missing data: {0}")]
    Unsupported(String),
}

/// A decoded, uncompressed picture as the file stored it.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    /// Source bit depth; not necessarily a whole number of bytes.
    pub bits_per_pixel: u32,
    pub pitch: u32,
    pub pixels: Vec<u8>,
}

impl Surface {
    /// Tightly packed surface of `bpp` bytes per pixel.
    pub fn packed(width: u32, height: u32, bpp: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bits_per_pixel: bpp * 8,
            pitch: width * bpp,
            pixels,
        }
    }
}

/// Path → pixels.
pub trait ImageDecoder: Send + Sync {
    /// Decode a regular image file.
    fn load_surface(&self, path: &Path) -> Result<Surface, ImportError>;

    /// Load a block-compressed container. With `force_raw` the caller cannot
    /// use compressed data and only uncompressed containers succeed.
    fn load_blocks(&self, path: &Path, force_raw: bool) -> Result<ImageData, ImportError>;

    fn exists(&self, path: &Path) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// File system decoder
// ─────────────────────────────────────────────────────────────────────────────

/// Decodes files below a media root with the `image` crate, plus a DDS reader.
#[derive(Debug, Clone, Default)]
pub struct FileDecoder {
    root: PathBuf,
}

impl FileDecoder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || self.root.as_os_str().is_empty() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ImageDecoder for FileDecoder {
    fn load_surface(&self, path: &Path) -> Result<Surface, ImportError> {
        let img = image::open(self.resolve(path))?;
        let (width, height) = (img.width(), img.height());

        let surface = match img {
            DynamicImage::ImageLuma8(buf) => Surface::packed(width, height, 1, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => Surface::packed(width, height, 2, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => Surface::packed(width, height, 3, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => Surface::packed(width, height, 4, buf.into_raw()),
            // Float pixels are passed through as-is; they have no byte format.
            DynamicImage::ImageRgb32F(buf) => {
                let pixels: Vec<u8> = bytemuck::cast_slice(buf.as_raw()).to_vec();
                Surface {
                    width,
                    height,
                    bits_per_pixel: 96,
                    pitch: width * 12,
                    pixels,
                }
            }
            DynamicImage::ImageRgba32F(buf) => {
                let pixels: Vec<u8> = bytemuck::cast_slice(buf.as_raw()).to_vec();
                Surface {
                    width,
                    height,
                    bits_per_pixel: 128,
                    pitch: width * 16,
                    pixels,
                }
            }
            other if other.color().has_alpha() => {
                Surface::packed(width, height, 4, other.to_rgba8().into_raw())
            }
            other => Surface::packed(width, height, 3, other.to_rgb8().into_raw()),
        };
        Ok(surface)
    }

    fn load_blocks(&self, path: &Path, force_raw: bool) -> Result<ImageData, ImportError> {
        let bytes = fs::read(self.resolve(path))?;
        parse_dds(&bytes, force_raw)
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DDS container
// ─────────────────────────────────────────────────────────────────────────────

const DDS_MAGIC: u32 = 0x2053_4444; // "DDS "
const DDS_HEADER_BYTES: usize = 128;
const DDSD_MIPMAPCOUNT: u32 = 0x0002_0000;
const DDPF_ALPHAPIXELS: u32 = 0x1;
const DDPF_FOURCC: u32 = 0x4;
const DDPF_RGB: u32 = 0x40;
const DDPF_LUMINANCE: u32 = 0x0002_0000;

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

// Word offsets into the 128-byte header (magic included).
const W_FLAGS: usize = 2;
const W_HEIGHT: usize = 3;
const W_WIDTH: usize = 4;
const W_PITCH: usize = 5;
const W_MIPCOUNT: usize = 7;
const W_PF_FLAGS: usize = 20;
const W_PF_FOURCC: usize = 21;
const W_PF_BITS: usize = 22;
const W_PF_RMASK: usize = 23;
const W_PF_AMASK: usize = 26;

/// Parse a DDS file: DXT1/3/5 block payloads, or 8/24/32-bit uncompressed data.
pub fn parse_dds(bytes: &[u8], force_raw: bool) -> Result<ImageData, ImportError> {
    if bytes.len() < DDS_HEADER_BYTES {
        return Err(ImportError::Corrupt("truncated DDS header".into()));
    }
    let header: [u32; 32] = bytemuck::pod_read_unaligned(&bytes[..DDS_HEADER_BYTES]);
    let word = |i: usize| u32::from_le(header[i]);

    if word(0) != DDS_MAGIC {
        return Err(ImportError::Corrupt("missing DDS magic".into()));
    }

    let (w, h) = (word(W_WIDTH), word(W_HEIGHT));
    if w == 0 || h == 0 {
        return Err(ImportError::Corrupt(format!("bad DDS size {}x{}", w, h)));
    }
    if w.max(h) > MAX_IMAGE_SIZE {
        return Err(ImportError::Corrupt(format!(
            "DDS size {}x{} exceeds {}x{}",
            w, h, MAX_IMAGE_SIZE, MAX_IMAGE_SIZE
        )));
    }
    let levels = if word(W_FLAGS) & DDSD_MIPMAPCOUNT != 0 {
        word(W_MIPCOUNT).clamp(1, max_mip_levels(w, h))
    } else {
        1
    };
    let payload = &bytes[DDS_HEADER_BYTES..];
    let pf_flags = word(W_PF_FLAGS);

    if pf_flags & DDPF_FOURCC != 0 {
        let format = match word(W_PF_FOURCC) {
            f if f == fourcc(b"DXT1") => {
                if pf_flags & DDPF_ALPHAPIXELS != 0 {
                    BlockFormat::Dxt1Rgba
                } else {
                    BlockFormat::Dxt1Rgb
                }
            }
            f if f == fourcc(b"DXT3") => BlockFormat::Dxt3,
            f if f == fourcc(b"DXT5") => BlockFormat::Dxt5,
            f => {
                return Err(ImportError::Unsupported(format!(
                    "DDS four-cc {:?}",
                    String::from_utf8_lossy(&f.to_le_bytes())
                )))
            }
        };
        if force_raw {
            return Err(ImportError::Unsupported(
                "block-compressed DDS where raw pixels are required".into(),
            ));
        }

        let mut image = ImageData::from_blocks(w, h, format, levels, Vec::new());
        // Keep only the levels actually present in the file.
        let mut size = 0;
        let mut present = 0;
        for level in 0..levels {
            let next = size + image.level_size(level);
            if next > payload.len() {
                break;
            }
            size = next;
            present += 1;
        }
        if present == 0 {
            return Err(ImportError::Corrupt("DDS payload shorter than level 0".into()));
        }
        if present < levels {
            log::warn!("DDS declares {} levels, only {} present", levels, present);
        }
        image.levels = present;
        image.data = payload[..size].to_vec();
        return Ok(image);
    }

    let bits = word(W_PF_BITS);
    let bpp = match (pf_flags & (DDPF_RGB | DDPF_LUMINANCE) != 0, bits) {
        (true, 8) | (true, 24) | (true, 32) => bits / 8,
        _ => {
            return Err(ImportError::Unsupported(format!(
                "DDS pixel format flags {:#x} / {} bits",
                pf_flags, bits
            )))
        }
    };
    let row_bytes = (w as usize) * (bpp as usize);
    let pitch = match word(W_PITCH) as usize {
        p if p >= row_bytes => p,
        _ => row_bytes,
    };
    let size = pitch
        .checked_mul(h as usize)
        .ok_or_else(|| ImportError::Corrupt(format!("DDS pitch {} overflows", pitch)))?;
    if payload.len() < size {
        return Err(ImportError::Corrupt("DDS payload shorter than level 0".into()));
    }

    let mut image = ImageData::from_raw(w, h, bpp, w * bpp, Vec::with_capacity(row_bytes * h as usize));
    // Blue in the low byte means BGR(A) order on disk.
    let bgr = bpp >= 3 && word(W_PF_RMASK) == 0x00ff_0000;
    let keep_alpha = bpp == 4 && word(W_PF_AMASK) != 0;
    for y in 0..h as usize {
        let row = &payload[y * pitch..y * pitch + row_bytes];
        for px in row.chunks_exact(bpp as usize) {
            match bpp {
                1 => image.data.push(px[0]),
                _ if bgr => image.data.extend_from_slice(&[px[2], px[1], px[0]]),
                _ => image.data.extend_from_slice(&px[..3]),
            }
            if bpp == 4 {
                image.data.push(if keep_alpha { px[3] } else { 0xff });
            }
        }
    }
    Ok(image)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn dds_header(w: u32, h: u32, levels: u32, pf_flags: u32, fourcc_or_bits: (u32, u32)) -> Vec<u8> {
        let mut words = [0u32; 32];
        words[0] = DDS_MAGIC;
        words[1] = 124;
        words[W_FLAGS] = 0x1007 | if levels > 1 { DDSD_MIPMAPCOUNT } else { 0 };
        words[W_HEIGHT] = h;
        words[W_WIDTH] = w;
        words[W_MIPCOUNT] = levels;
        words[19] = 32;
        words[W_PF_FLAGS] = pf_flags;
        words[W_PF_FOURCC] = fourcc_or_bits.0;
        words[W_PF_BITS] = fourcc_or_bits.1;
        words[W_PF_RMASK] = 0x00ff_0000;
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_dds_dxt5_levels() {
        let mut bytes = dds_header(8, 8, 4, DDPF_FOURCC, (fourcc(b"DXT5"), 0));
        bytes.extend(std::iter::repeat(0u8).take(64 + 16 + 16 + 16));

        let img = parse_dds(&bytes, false).unwrap();
        assert_eq!(img.compressed, Some(BlockFormat::Dxt5));
        assert_eq!(img.levels, 4);
        assert_eq!(img.data.len(), 112);

        assert!(matches!(parse_dds(&bytes, true), Err(ImportError::Unsupported(_))));
    }

    #[test]
    fn test_dds_truncated_levels_are_dropped() {
        let mut bytes = dds_header(8, 8, 4, DDPF_FOURCC, (fourcc(b"DXT1"), 0));
        bytes.extend(std::iter::repeat(0u8).take(32 + 8));
        let img = parse_dds(&bytes, false).unwrap();
        assert_eq!(img.levels, 2);
        assert_eq!(img.compressed, Some(BlockFormat::Dxt1Rgb));
    }

    #[test]
    fn test_dds_oversized_dimensions_rejected() {
        let mut bytes = dds_header(65536, 65536, 1, DDPF_FOURCC, (fourcc(b"DXT5"), 0));
        bytes.extend(std::iter::repeat(0u8).take(64));
        assert!(matches!(parse_dds(&bytes, false), Err(ImportError::Corrupt(_))));

        let mut bytes = dds_header(0x4000_0000, 2, 1, DDPF_RGB, (0, 32));
        bytes.extend(std::iter::repeat(0u8).take(64));
        assert!(matches!(parse_dds(&bytes, true), Err(ImportError::Corrupt(_))));
    }

    #[test]
    fn test_dds_invalid_dimensions_rejected() {
        let bytes = dds_header(0, 4, 1, DDPF_FOURCC, (fourcc(b"DXT1"), 0));
        assert!(matches!(parse_dds(&bytes, false), Err(ImportError::Corrupt(_))));

        let mut bytes = dds_header(2, 2, 1, DDPF_RGB, (0, 24));
        bytes[W_PITCH * 4..W_PITCH * 4 + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend(std::iter::repeat(0u8).take(12));
        assert!(matches!(parse_dds(&bytes, true), Err(ImportError::Corrupt(_))));

        assert!(matches!(parse_dds(&[0u8; 16], false), Err(ImportError::Corrupt(_))));
    }

    #[test]
    fn test_dds_level_count_capped_by_size() {
        let mut bytes = dds_header(8, 8, 0xffff, DDPF_FOURCC, (fourcc(b"DXT1"), 0));
        bytes.extend(std::iter::repeat(0u8).take(32 + 8 + 8 + 8 + 64));
        let img = parse_dds(&bytes, false).unwrap();
        assert_eq!(img.levels, 4);
        assert_eq!(img.data.len(), 56);
    }

    #[test]
    fn test_dds_missing_first_level() {
        let mut bytes = dds_header(8, 8, 4, DDPF_FOURCC, (fourcc(b"DXT5"), 0));
        bytes.extend(std::iter::repeat(0u8).take(63));
        assert!(matches!(parse_dds(&bytes, false), Err(ImportError::Corrupt(_))));

        let mut bytes = dds_header(4, 4, 1, DDPF_RGB, (0, 24));
        bytes.extend(std::iter::repeat(0u8).take(47));
        assert!(matches!(parse_dds(&bytes, true), Err(ImportError::Corrupt(_))));
    }

    #[test]
    fn test_dds_uncompressed_bgr() {
        let mut bytes = dds_header(2, 1, 1, DDPF_RGB, (0, 24));
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        let img = parse_dds(&bytes, true).unwrap();
        assert!(!img.is_compressed());
        assert_eq!(img.bpp, 3);
        assert_eq!(img.data, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_file_decoder_png() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbaImage::from_pixel(4, 2, image::Rgba([1, 2, 3, 4]));
        img.save(dir.path().join("a.png")).unwrap();

        let decoder = FileDecoder::new(dir.path());
        assert!(decoder.exists(Path::new("a.png")));
        assert!(!decoder.exists(Path::new("b.png")));

        let surface = decoder.load_surface(Path::new("a.png")).unwrap();
        assert_eq!((surface.width, surface.height, surface.bits_per_pixel), (4, 2, 32));
        assert_eq!(&surface.pixels[..4], &[1, 2, 3, 4]);
    }
}
