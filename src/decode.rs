// src/decode.rs
//! Texture decode: command chain + image file → CPU image and upload hints.
//!
//! This is phase 1 of every texture load. [`TextureDecoder`] is `Send + Sync`
//! and only takes `&self`, so background loaders can run it on worker threads;
//! it never touches the GPU or the registry.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::gpu::{GpuCaps, PixelFormat};
use crate::image_data::ImageData;
use crate::materials::TexRole;
use crate::modifiers;
use crate::paths::normalize_name;
use crate::settings::{RenderPath, TextureSettings, MAX_IMAGE_SIZE};
use crate::texcmd::{TexCommand, TexName};
use crate::texture_importer::{ImageDecoder, ImportError};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("could not load texture {0}")]
    Malformed(String),
    #[error("could not load texture {path}: {source}")]
    Import {
        path: String,
        #[source]
        source: ImportError,
    },
    #[error("texture must be 8, 16, 24, or 32 bpp: {path} ({bits} bits)")]
    UnsupportedDepth { path: String, bits: u32 },
    #[error("texture size exceeded {max}x{max} pixels: {path} ({w}x{h})")]
    TooLarge { path: String, w: u32, h: u32, max: u32 },
    #[error("could not find texture {0}")]
    Missing(String),
    #[error("cube map face {path} {reason}")]
    CubeFace { path: String, reason: &'static str },
}

/// Compression hint produced by the command chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Compress if the texture is big enough.
    #[default]
    Auto,
    /// Compress, and downscale by this factor when compression is unavailable.
    Scale(u32),
    /// Never compress.
    Disabled,
}

/// Decoded image ready for upload. An empty image marks a stub.
#[derive(Debug, Clone, Default)]
pub struct DecodedTexture {
    pub image: ImageData,
    pub compress: Compression,
}

impl DecodedTexture {
    pub fn is_stub(&self) -> bool {
        self.image.is_empty()
    }
}

/// What to decode and how.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    pub name: &'a str,
    /// Role of the slot texture being decoded; normal maps reorient differently.
    pub role: Option<TexRole>,
    /// Compressed containers and compression hints are only honoured when set.
    pub allow_compress: bool,
    pub show_progress: bool,
}

impl<'a> DecodeRequest<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            role: None,
            allow_compress: true,
            show_progress: false,
        }
    }

    /// Raw pixels only (used for alpha masks).
    pub fn raw(name: &'a str) -> Self {
        Self {
            allow_compress: false,
            ..Self::new(name)
        }
    }

    pub fn with_role(mut self, role: TexRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

/// The settings and device facts the decode passes depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub render_path: RenderPath,
    pub use_dds: bool,
    pub scale_dds: u32,
    pub texture_env_combine: bool,
}

impl DecodeOptions {
    pub fn new(settings: &TextureSettings, caps: &GpuCaps) -> Self {
        Self {
            render_path: settings.render_path,
            use_dds: settings.use_dds,
            scale_dds: settings.scale_dds.max(1),
            texture_env_combine: caps.texture_env_combine,
        }
    }

    #[inline]
    fn fixed_function(&self) -> bool {
        self.render_path == RenderPath::FixedFunction
    }
}

#[derive(Clone)]
pub struct TextureDecoder {
    source: Arc<dyn ImageDecoder>,
    options: DecodeOptions,
}

impl std::fmt::Debug for TextureDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureDecoder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TextureDecoder {
    pub fn new(source: Arc<dyn ImageDecoder>, options: DecodeOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn source(&self) -> &dyn ImageDecoder {
        self.source.as_ref()
    }

    /// Decode one texture name.
    pub fn decode(&self, req: &DecodeRequest<'_>) -> Result<DecodedTexture, DecodeError> {
        let parsed = TexName::parse(req.name).ok_or_else(|| {
            if req.show_progress {
                log::warn!("could not load texture {}", req.name);
            }
            DecodeError::Malformed(req.name.to_string())
        })?;
        let file = normalize_name(&parsed.file);
        let ff = self.options.fixed_function();

        // Pass 1: commands that decide what to read at all.
        let mut raw = !self.options.use_dds || !req.allow_compress;
        let mut want_dds = false;
        for cmd in &parsed.commands {
            match cmd {
                TexCommand::NoFf if ff => return Ok(DecodedTexture::default()),
                TexCommand::FfMask { .. } | TexCommand::FfSkip if ff => raw = true,
                TexCommand::Decal if ff && !self.options.texture_env_combine => raw = true,
                TexCommand::Dds { .. } => want_dds = true,
                TexCommand::Thumbnail { .. } => raw = true,
                TexCommand::Stub => {
                    return if self.source.exists(Path::new(&file)) {
                        Ok(DecodedTexture::default())
                    } else {
                        Err(DecodeError::Missing(file))
                    };
                }
                _ => {}
            }
        }

        if req.show_progress {
            log::info!("loading texture {}", file);
        }

        let mut out = DecodedTexture::default();
        let is_dds = file.len() >= 4 && file[file.len() - 4..].eq_ignore_ascii_case(".dds");
        if is_dds || (want_dds && !raw) {
            let dds_path = Path::new(&file).with_extension("dds");
            match self.source.load_blocks(&dds_path, raw) {
                Ok(image) => {
                    if !image.is_compressed() && !want_dds && req.allow_compress {
                        out.compress = Compression::Scale(self.options.scale_dds);
                    }
                    out.image = image;
                }
                Err(source) if !want_dds || raw => {
                    if req.show_progress {
                        log::warn!("could not load texture {}", dds_path.display());
                    }
                    return Err(DecodeError::Import {
                        path: dds_path.display().to_string(),
                        source,
                    });
                }
                Err(e) => log::debug!("no block container for {} ({}), using surface", file, e),
            }
        }

        if out.image.is_empty() {
            out.image = self.load_surface(&file, req.show_progress)?;
        }

        if !out.image.is_compressed() {
            self.apply_commands(&parsed.commands, req, &mut out);
        }
        Ok(out)
    }

    fn load_surface(&self, file: &str, msg: bool) -> Result<ImageData, DecodeError> {
        let surface = self.source.load_surface(Path::new(file)).map_err(|source| {
            if msg {
                log::warn!("could not load texture {}", file);
            }
            DecodeError::Import {
                path: file.to_string(),
                source,
            }
        })?;

        let bits = surface.bits_per_pixel;
        if bits % 8 != 0 || PixelFormat::from_bpp(bits / 8).is_none() {
            log::warn!("texture must be 8, 16, 24, or 32 bpp: {}", file);
            return Err(DecodeError::UnsupportedDepth {
                path: file.to_string(),
                bits,
            });
        }
        if surface.width.max(surface.height) > MAX_IMAGE_SIZE {
            log::warn!(
                "texture size exceeded {}x{} pixels: {}",
                MAX_IMAGE_SIZE,
                MAX_IMAGE_SIZE,
                file
            );
            return Err(DecodeError::TooLarge {
                path: file.to_string(),
                w: surface.width,
                h: surface.height,
                max: MAX_IMAGE_SIZE,
            });
        }
        Ok(ImageData::from_raw(
            surface.width,
            surface.height,
            bits / 8,
            surface.pitch,
            surface.pixels,
        ))
    }

    /// Pass 2: pixel transforms and hints, in chain order.
    fn apply_commands(&self, commands: &[TexCommand], req: &DecodeRequest<'_>, out: &mut DecodedTexture) {
        let ff = self.options.fixed_function();
        let normals = req.role == Some(TexRole::Normal);
        let d = &mut out.image;

        for cmd in commands {
            if d.is_empty() {
                break;
            }
            match *cmd {
                TexCommand::Mad { mul, add } => modifiers::mad(d, mul, add),
                TexCommand::Colorify { color, weights } => modifiers::colorify(d, color, weights),
                TexCommand::ColorMask { c1, c2 } => modifiers::colormask(d, c1, c2),
                TexCommand::FfMask { glow, envmap } => {
                    if ff {
                        modifiers::ffmask(d, glow, envmap);
                    }
                }
                TexCommand::Normal { emphasis } => modifiers::normal_map(d, emphasis),
                TexCommand::Dup { src, dst } => modifiers::dup(d, src, dst),
                TexCommand::Decal => {
                    if ff && !self.options.texture_env_combine {
                        modifiers::decal(d);
                    }
                }
                TexCommand::Offset { x, y } => modifiers::offset(d, x, y),
                TexCommand::Rotate { turns } => modifiers::rotate(d, turns, normals),
                TexCommand::Reorient {
                    flip_x,
                    flip_y,
                    swap_xy,
                } => modifiers::reorient(d, flip_x, flip_y, swap_xy, normals),
                TexCommand::Mix { channels } => modifiers::mix(d, channels),
                TexCommand::Grey => modifiers::grey(d),
                TexCommand::Blur { emphasis, repeat } => modifiers::blur(d, emphasis, repeat),
                TexCommand::Premul => modifiers::premultiply(d),
                TexCommand::AlphaGradient { x2, y2, x1, y1 } => {
                    modifiers::alpha_gradient(d, x2, y2, x1, y1)
                }
                TexCommand::Compress { scale } | TexCommand::Dds { scale } => {
                    if req.allow_compress {
                        out.compress = Compression::Scale(scale.unwrap_or(self.options.scale_dds));
                    }
                }
                TexCommand::NoCompress => {
                    if req.allow_compress {
                        out.compress = Compression::Disabled;
                    }
                }
                TexCommand::Thumbnail { w, h } => {
                    if d.w > w || d.h > h {
                        d.scale(w, h);
                    }
                }
                TexCommand::FfSkip if ff => break,
                TexCommand::FfSkip | TexCommand::NoFf | TexCommand::Stub => {}
                TexCommand::Unknown(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_data::BlockFormat;
    use crate::texture_importer::testing::MemoryDecoder;
    use crate::texture_importer::Surface;

    fn decoder(mem: MemoryDecoder, ff: bool) -> TextureDecoder {
        let settings = if ff {
            TextureSettings::fixed_function()
        } else {
            TextureSettings::default()
        };
        TextureDecoder::new(
            Arc::new(mem),
            DecodeOptions::new(&settings, &GpuCaps::default()),
        )
    }

    #[test]
    fn test_mad_chain_halves_pixels() {
        let dec = decoder(MemoryDecoder::new().with_solid("a.png", 2, 2, &[200, 100, 50]), false);
        let out = dec
            .decode(&DecodeRequest::new("<mad:0.5,0.5,0.5/0,0,0>a.png"))
            .unwrap();
        assert!(out.image.data.chunks(3).all(|p| p == [100, 50, 25]));
        assert_eq!(out.compress, Compression::Auto);
    }

    #[test]
    fn test_bad_depth_rejected() {
        let odd = Surface {
            width: 2,
            height: 2,
            bits_per_pixel: 12,
            pitch: 3,
            pixels: vec![0; 6],
        };
        let wide = Surface::packed(1, 1, 5, vec![0; 5]);
        let dec = decoder(
            MemoryDecoder::new()
                .with_surface("odd.png", odd)
                .with_surface("wide.png", wide),
            false,
        );
        assert!(matches!(
            dec.decode(&DecodeRequest::new("odd.png")),
            Err(DecodeError::UnsupportedDepth { bits: 12, .. })
        ));
        assert!(matches!(
            dec.decode(&DecodeRequest::new("wide.png")),
            Err(DecodeError::UnsupportedDepth { bits: 40, .. })
        ));
    }

    #[test]
    fn test_too_large_rejected() {
        let big = Surface::packed(MAX_IMAGE_SIZE + 1, 1, 1, vec![0; (MAX_IMAGE_SIZE + 1) as usize]);
        let dec = decoder(MemoryDecoder::new().with_surface("big.png", big), false);
        assert!(matches!(
            dec.decode(&DecodeRequest::new("big.png")),
            Err(DecodeError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_malformed_and_missing() {
        let dec = decoder(MemoryDecoder::new(), false);
        assert!(matches!(
            dec.decode(&DecodeRequest::new("<mad:1")),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            dec.decode(&DecodeRequest::new("nothere.png")),
            Err(DecodeError::Import { .. })
        ));
    }

    #[test]
    fn test_stub_checks_existence_only() {
        let mem = MemoryDecoder::new().with_solid("a.png", 1, 1, &[1, 2, 3]);
        let dec = decoder(mem, false);
        let out = dec.decode(&DecodeRequest::new("<stub>a.png")).unwrap();
        assert!(out.is_stub());
        assert!(matches!(
            dec.decode(&DecodeRequest::new("<stub>b.png")),
            Err(DecodeError::Missing(_))
        ));
    }

    #[test]
    fn test_noff_only_on_fixed_function() {
        let mem = || MemoryDecoder::new().with_solid("a.png", 1, 1, &[1, 2, 3]);
        assert!(decoder(mem(), true)
            .decode(&DecodeRequest::new("<noff>a.png"))
            .unwrap()
            .is_stub());
        assert!(!decoder(mem(), false)
            .decode(&DecodeRequest::new("<noff>a.png"))
            .unwrap()
            .is_stub());
    }

    #[test]
    fn test_dds_preferred_then_surface_fallback() {
        let blocks = ImageData::from_blocks(4, 4, BlockFormat::Dxt1Rgb, 1, vec![0; 8]);
        let mem = MemoryDecoder::new()
            .with_blocks("a.dds", blocks)
            .with_solid("b.png", 1, 1, &[1, 2, 3]);
        let dec = decoder(mem, false);

        let a = dec.decode(&DecodeRequest::new("<dds>a.png")).unwrap();
        assert!(a.image.is_compressed());

        // no b.dds: the dds request quietly falls back to the surface
        let b = dec.decode(&DecodeRequest::new("<dds>b.png")).unwrap();
        assert!(!b.image.is_compressed());
        assert_eq!(b.compress, Compression::Scale(2));

        // a raw request never reads the block container
        assert!(dec.decode(&DecodeRequest::raw("<dds>a.png")).is_err());
    }

    #[test]
    fn test_uncompressed_dds_gets_scale_hint() {
        let raw = ImageData::from_raw(2, 2, 3, 6, vec![0; 12]);
        let dec = decoder(MemoryDecoder::new().with_blocks("u.dds", raw), false);
        let out = dec.decode(&DecodeRequest::new("u.dds")).unwrap();
        assert_eq!(out.compress, Compression::Scale(2));
    }

    #[test]
    fn test_hints_and_thumbnail() {
        let dec = decoder(MemoryDecoder::new().with_solid("a.png", 128, 128, &[9]), false);
        let out = dec
            .decode(&DecodeRequest::new("<compress:4><thumbnail:32>a.png"))
            .unwrap();
        assert_eq!(out.compress, Compression::Scale(4));
        assert_eq!((out.image.w, out.image.h), (32, 32));

        let out = dec.decode(&DecodeRequest::new("<nocompress>a.png")).unwrap();
        assert_eq!(out.compress, Compression::Disabled);

        let out = dec.decode(&DecodeRequest::raw("<compress:4>a.png")).unwrap();
        assert_eq!(out.compress, Compression::Auto);
    }

    #[test]
    fn test_ffskip_stops_chain_on_fixed_function() {
        let mem = || MemoryDecoder::new().with_solid("a.png", 1, 1, &[200, 200, 200]);
        let ff = decoder(mem(), true)
            .decode(&DecodeRequest::new("<ffskip><mad:0.5>a.png"))
            .unwrap();
        assert_eq!(ff.image.data, vec![200, 200, 200]);

        let sh = decoder(mem(), false)
            .decode(&DecodeRequest::new("<ffskip><mad:0.5>a.png"))
            .unwrap();
        assert_eq!(sh.image.data, vec![100, 100, 100]);
    }
}
