// src/registry.rs
//! Texture registry: the name → texture cache and its GPU lifetimes.
//!
//! Every texture the engine ever loads has exactly one row here, keyed by its
//! normalized name (command prefix included). Rows are handed out as
//! [`TextureId`]s; slot textures, the sentinel and cube maps all go through
//! the same table. Decoding is delegated to [`TextureDecoder`], uploading to
//! [`crate::gpu::upload`].

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::decode::{DecodeError, DecodeOptions, DecodeRequest, DecodedTexture, TextureDecoder};
use crate::gpu::upload::{
    compressed_format, create_compressed_texture, create_texture, reduce_compressed_levels,
    resize_texture, CreateTexture, PixelSource, CLAMP_S, CLAMP_T,
};
use crate::gpu::{CubeFace, GpuDevice, ImageTarget, InternalFormat, PixelFormat, TexTarget, TextureHandle};
use crate::materials::TexRole;
use crate::paths::normalize_name;
use crate::settings::TextureSettings;
use crate::texture::{build_alpha_mask, Texture, TextureFlags, TextureGenerator, TextureId, TextureKind};
use crate::texture_importer::ImageDecoder;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("texture {0} is not loaded")]
    NotLoaded(String),
    #[error("can't reload transient texture {0}")]
    Transient(String),
    #[error("failed to reload texture {name}: {source}")]
    Failed {
        name: String,
        #[source]
        source: DecodeError,
    },
}

/// How a texture is loaded and sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// `CLAMP_S` / `CLAMP_T` bits.
    pub clamp: u8,
    pub mipmap: bool,
    pub show_progress: bool,
    /// Skip the cache lookup and replace any existing row in place.
    pub background: bool,
    /// Let `tex_reduce` shrink the texture.
    pub can_reduce: bool,
    /// Slot role of the texture; normal maps transform differently.
    pub role: Option<TexRole>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            clamp: 0,
            mipmap: true,
            show_progress: false,
            background: false,
            can_reduce: false,
            role: None,
        }
    }
}

impl LoadOptions {
    /// Slot textures: repeating, mipmapped, reducible.
    pub fn slot() -> Self {
        Self {
            can_reduce: true,
            ..Self::default()
        }
    }

    pub fn with_clamp(mut self, clamp: u8) -> Self {
        self.clamp = clamp;
        self
    }

    pub fn with_mipmap(mut self, mipmap: bool) -> Self {
        self.mipmap = mipmap;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_role(mut self, role: TexRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }
}

/// Cube faces in file-suffix order.
const CUBE_SIDES: [(&str, CubeFace); 6] = [
    ("lf", CubeFace::NegX),
    ("rt", CubeFace::PosX),
    ("ft", CubeFace::NegY),
    ("bk", CubeFace::PosY),
    ("dn", CubeFace::NegZ),
    ("up", CubeFace::PosZ),
];

pub struct TextureRegistry<D: GpuDevice> {
    device: D,
    decoder: TextureDecoder,
    settings: TextureSettings,
    /// Rows never move; removed transient rows leave a hole.
    textures: Vec<Option<Texture>>,
    by_name: HashMap<String, TextureId>,
    missing: TextureId,
}

impl<D: GpuDevice> TextureRegistry<D> {
    /// Build the registry and load the sentinel texture.
    ///
    /// If `settings.missing_texture` cannot be decoded a procedural
    /// checkerboard takes its place under the same name.
    pub fn new(device: D, source: Arc<dyn ImageDecoder>, settings: TextureSettings) -> Self {
        let decoder = TextureDecoder::new(source, DecodeOptions::new(&settings, device.caps()));
        let mut registry = Self {
            device,
            decoder,
            settings,
            textures: Vec::new(),
            by_name: HashMap::new(),
            missing: TextureId(0),
        };

        let name = registry.settings.missing_texture.clone();
        registry.missing = match registry.try_load(&name, &LoadOptions::default()) {
            Ok(id) => id,
            Err(e) => {
                warn!("{}, using a generated placeholder", e);
                let decoded = DecodedTexture {
                    image: TextureGenerator::missing(),
                    ..Default::default()
                };
                registry.commit(&name, decoded, 0, true)
            }
        };
        registry
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn decoder(&self) -> &TextureDecoder {
        &self.decoder
    }

    pub fn settings(&self) -> &TextureSettings {
        &self.settings
    }

    /// The sentinel returned for every failed load.
    pub fn missing(&self) -> TextureId {
        self.missing
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id.index()).and_then(Option::as_ref)
    }

    /// Number of live rows.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureId, &Texture)> {
        self.textures
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (TextureId(i as u32), t)))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookup and loading
    // ─────────────────────────────────────────────────────────────────────

    /// Lookup only.
    pub fn get(&self, name: &str) -> Option<TextureId> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    /// Existing row for `name`, or a new empty stub. Never decodes.
    pub fn register(&mut self, name: &str) -> TextureId {
        let key = normalize_name(name);
        if let Some(&id) = self.by_name.get(&key) {
            return id;
        }
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(Some(Texture::new(key.clone())));
        self.by_name.insert(key, id);
        id
    }

    /// Cached row, or decode and upload. Failures yield [`Self::missing`].
    pub fn load(&mut self, name: &str, opts: &LoadOptions) -> TextureId {
        match self.try_load(name, opts) {
            Ok(id) => id,
            Err(e) => {
                warn!("{}", e);
                self.missing
            }
        }
    }

    pub fn try_load(&mut self, name: &str, opts: &LoadOptions) -> Result<TextureId, DecodeError> {
        let key = normalize_name(name);
        if !opts.background {
            if let Some(&id) = self.by_name.get(&key) {
                return Ok(id);
            }
        }
        let mut req = DecodeRequest::new(&key).with_progress(opts.show_progress && !opts.background);
        req.role = opts.role;
        let decoded = self.decoder.decode(&req)?;
        Ok(self.commit_with(&key, &decoded, opts))
    }

    /// Load with mipmaps; `false` when only the sentinel could be had.
    pub fn bind(&mut self, name: &str, clamp: u8) -> bool {
        self.load(name, &LoadOptions::default().with_clamp(clamp)) != self.missing
    }

    /// Upload already decoded data as `name`, replacing any existing row in place.
    pub fn commit(&mut self, name: &str, decoded: DecodedTexture, clamp: u8, mipmap: bool) -> TextureId {
        let opts = LoadOptions {
            clamp,
            mipmap,
            ..LoadOptions::default()
        };
        self.commit_with(name, &decoded, &opts)
    }

    pub fn commit_with(&mut self, name: &str, decoded: &DecodedTexture, opts: &LoadOptions) -> TextureId {
        let id = self.register(name);
        self.upload_into(id, decoded, opts.clamp, opts.mipmap, opts.can_reduce);
        if let Some(Some(row)) = self.textures.get_mut(id.index()) {
            row.flags.set(TextureFlags::REDUCIBLE, opts.can_reduce);
            row.flags.set(TextureFlags::NORMAL_MAP, opts.role == Some(TexRole::Normal));
        }
        id
    }

    /// Fill row `id` from `decoded`. An allocated handle already on the row is freed.
    fn upload_into(&mut self, id: TextureId, decoded: &DecodedTexture, clamp: u8, mipmap: bool, can_reduce: bool) {
        let Some(Some(row)) = self.textures.get_mut(id.index()) else {
            return;
        };
        let old = std::mem::take(&mut row.handle);
        if old.is_allocated() {
            self.device.delete_texture(old);
        }

        let s = &decoded.image;
        let format = match s.compressed {
            Some(block) => Some(block.pixel_format()),
            None => PixelFormat::from_bpp(s.bpp),
        };
        let Some(row) = self.textures[id.index()].as_mut() else {
            return;
        };
        row.clamp = clamp;
        row.mipmap = mipmap;
        row.kind = TextureKind::Image;
        row.flags &= TextureFlags::TRANSIENT;
        row.alpha_mask = None;
        let (Some(format), false) = (format, s.is_empty()) else {
            row.flags |= TextureFlags::STUB;
            row.w = 0;
            row.h = 0;
            row.xs = 0;
            row.ys = 0;
            row.bpp = 0;
            return;
        };
        row.bpp = format.components();
        if s.is_compressed() {
            row.flags |= TextureFlags::COMPRESSED;
        }
        if format.has_alpha() {
            row.flags |= TextureFlags::ALPHA;
        }
        row.xs = s.w;
        row.ys = s.h;

        let filter = if !can_reduce || self.settings.reduce_filter {
            if mipmap {
                2
            } else {
                1
            }
        } else {
            0
        };
        let caps = self.device.caps().clone();
        let handle = self.device.gen_texture();
        let (w, h) = match s.compressed {
            Some(block) => {
                let sel = reduce_compressed_levels(&self.settings, &caps, s, can_reduce, mipmap);
                create_compressed_texture(
                    &mut self.device,
                    &self.settings,
                    handle,
                    (sel.w, sel.h),
                    &s.data[sel.offset.min(s.data.len())..],
                    (s.align, s.bpp),
                    sel.levels,
                    clamp,
                    filter,
                    block.internal_format(),
                    ImageTarget::Tex2D,
                    true,
                );
                (sel.w, sel.h)
            }
            None => {
                let size = resize_texture(
                    &self.settings,
                    &caps,
                    (s.w, s.h),
                    mipmap,
                    can_reduce,
                    TexTarget::Tex2D,
                    decoded.compress,
                );
                let component =
                    compressed_format(&self.settings, &caps, InternalFormat::from(format), size, decoded.compress);
                create_texture(
                    &mut self.device,
                    &self.settings,
                    &CreateTexture {
                        handle,
                        setup: true,
                        w: size.0,
                        h: size.1,
                        pixels: Some(PixelSource::from_image(s)),
                        clamp,
                        filter,
                        component,
                        target: ImageTarget::Tex2D,
                        resize: false,
                        format: Some(format),
                    },
                );
                size
            }
        };

        if let Some(row) = self.textures[id.index()].as_mut() {
            row.handle = handle;
            row.w = w;
            row.h = h;
            debug!("uploaded {} ({}x{} from {}x{})", row.name, w, h, row.xs, row.ys);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cube maps
    // ─────────────────────────────────────────────────────────────────────

    /// Load a six-face cube map. `*` in `name` stands for the face suffix.
    pub fn load_cubemap(&mut self, name: &str, mipmap: bool, transient: bool) -> Result<TextureId, DecodeError> {
        let key = normalize_name(name);
        if let Some(&id) = self.by_name.get(&key) {
            if self.texture(id).is_some_and(|t| t.kind == TextureKind::Cubemap) {
                return Ok(id);
            }
        }
        let faces = self.decode_cube_faces(&key)?;
        let id = self.register(&key);
        self.upload_cube(id, &faces, mipmap, transient);
        Ok(id)
    }

    fn decode_cube_faces(&self, key: &str) -> Result<Vec<DecodedTexture>, DecodeError> {
        let mut faces: Vec<DecodedTexture> = Vec::with_capacity(CUBE_SIDES.len());
        for (suffix, _) in CUBE_SIDES {
            let face_name = cube_face_name(key, suffix);
            let face = self.decoder.decode(&DecodeRequest::new(&face_name))?;
            let img = &face.image;
            let reject = |reason| DecodeError::CubeFace {
                path: face_name.clone(),
                reason,
            };
            if img.is_empty() {
                return Err(reject("has no pixel data"));
            }
            if img.w != img.h {
                return Err(reject("is not square"));
            }
            if let Some(first) = faces.first() {
                let f = &first.image;
                if (img.w, img.h) != (f.w, f.h) {
                    return Err(reject("size does not match the other faces"));
                }
                if img.compressed != f.compressed || (f.compressed.is_none() && img.bpp != f.bpp) {
                    return Err(reject("format does not match the other faces"));
                }
            }
            faces.push(face);
        }
        Ok(faces)
    }

    fn upload_cube(&mut self, id: TextureId, faces: &[DecodedTexture], mipmap: bool, transient: bool) {
        let Some(first) = faces.first().map(|f| &f.image) else {
            return;
        };
        let format = match first.compressed {
            Some(block) => Some(block.pixel_format()),
            None => PixelFormat::from_bpp(first.bpp),
        };
        let Some(format) = format else {
            return;
        };
        let clamp = CLAMP_S | CLAMP_T;
        let filter = if mipmap { 2 } else { 1 };
        let caps = self.device.caps().clone();

        if let Some(Some(row)) = self.textures.get_mut(id.index()) {
            let old = std::mem::take(&mut row.handle);
            if old.is_allocated() {
                self.device.delete_texture(old);
            }
        }
        let handle = self.device.gen_texture();

        let (w, h) = if let Some(block) = first.compressed {
            let mut size = (first.w, first.h);
            for (i, (face, (_, side))) in faces.iter().zip(CUBE_SIDES).enumerate() {
                let sel = reduce_compressed_levels(&self.settings, &caps, &face.image, false, mipmap);
                create_compressed_texture(
                    &mut self.device,
                    &self.settings,
                    handle,
                    (sel.w, sel.h),
                    &face.image.data[sel.offset.min(face.image.data.len())..],
                    (face.image.align, face.image.bpp),
                    sel.levels,
                    clamp,
                    filter,
                    block.internal_format(),
                    ImageTarget::CubeFace(side),
                    i == 0,
                );
                size = (sel.w, sel.h);
            }
            size
        } else {
            let compress = faces[0].compress;
            let size = resize_texture(
                &self.settings,
                &caps,
                (first.w, first.h),
                mipmap,
                false,
                TexTarget::CubeMap,
                compress,
            );
            let component =
                compressed_format(&self.settings, &caps, InternalFormat::from(format), size, compress);
            for (i, (face, (_, side))) in faces.iter().zip(CUBE_SIDES).enumerate() {
                create_texture(
                    &mut self.device,
                    &self.settings,
                    &CreateTexture {
                        handle,
                        setup: i == 0,
                        w: size.0,
                        h: size.1,
                        pixels: Some(PixelSource::from_image(&face.image)),
                        clamp,
                        filter,
                        component,
                        target: ImageTarget::CubeFace(side),
                        resize: false,
                        format: Some(format),
                    },
                );
            }
            size
        };

        if let Some(Some(row)) = self.textures.get_mut(id.index()) {
            row.handle = handle;
            row.kind = TextureKind::Cubemap;
            row.flags = if transient {
                TextureFlags::TRANSIENT
            } else {
                TextureFlags::empty()
            };
            if first.is_compressed() {
                row.flags |= TextureFlags::COMPRESSED;
            }
            if format.has_alpha() {
                row.flags |= TextureFlags::ALPHA;
            }
            row.bpp = format.components();
            row.clamp = clamp;
            row.mipmap = mipmap;
            row.alpha_mask = None;
            row.xs = first.w;
            row.ys = first.h;
            row.w = w;
            row.h = h;
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reload
    // ─────────────────────────────────────────────────────────────────────

    /// Re-decode and re-upload `name` in place.
    ///
    /// On failure the row is restored exactly as it was before the call
    /// (minus its alpha mask) and any freshly allocated handle is freed.
    pub fn reload(&mut self, name: &str) -> Result<(), ReloadError> {
        let key = normalize_name(name);
        let id = *self
            .by_name
            .get(&key)
            .ok_or_else(|| ReloadError::NotLoaded(key.clone()))?;
        let Some(row) = self.textures[id.index()].as_mut() else {
            return Err(ReloadError::NotLoaded(key));
        };
        if row.is_transient() {
            return Err(ReloadError::Transient(key));
        }
        row.alpha_mask = None;
        let snapshot = row.clone();
        row.handle = TextureHandle::NONE;

        match self.recreate(id) {
            Ok(()) => {
                if snapshot.handle.is_allocated() {
                    self.device.delete_texture(snapshot.handle);
                }
                info!("reloaded texture {}", key);
                Ok(())
            }
            Err(source) => {
                if let Some(row) = self.textures[id.index()].as_mut() {
                    let fresh = std::mem::replace(row, snapshot);
                    if fresh.handle.is_allocated() {
                        self.device.delete_texture(fresh.handle);
                    }
                }
                error!("failed to reload texture {}: {}", key, source);
                Err(ReloadError::Failed { name: key, source })
            }
        }
    }

    /// Rebuild row `id` from its source files with its recorded options.
    fn recreate(&mut self, id: TextureId) -> Result<(), DecodeError> {
        let Some(row) = self.texture(id) else {
            return Ok(());
        };
        let (name, kind, clamp, mipmap) = (row.name.clone(), row.kind, row.clamp, row.mipmap);
        let transient = row.is_transient();
        let reducible = row.flags.contains(TextureFlags::REDUCIBLE);
        let normals = row.flags.contains(TextureFlags::NORMAL_MAP);
        match kind {
            TextureKind::Image => {
                let mut req = DecodeRequest::new(&name).with_progress(true);
                if normals {
                    req = req.with_role(TexRole::Normal);
                }
                let decoded = match self.decoder.decode(&req) {
                    Ok(decoded) => decoded,
                    Err(e) if id == self.missing => {
                        debug!("{}, regenerating placeholder", e);
                        DecodedTexture {
                            image: TextureGenerator::missing(),
                            ..Default::default()
                        }
                    }
                    Err(e) => return Err(e),
                };
                self.upload_into(id, &decoded, clamp, mipmap, reducible);
                if let Some(Some(row)) = self.textures.get_mut(id.index()) {
                    row.flags.set(TextureFlags::REDUCIBLE, reducible);
                    row.flags.set(TextureFlags::NORMAL_MAP, normals);
                }
            }
            TextureKind::Cubemap => {
                let faces = self.decode_cube_faces(&name)?;
                self.upload_cube(id, &faces, mipmap, transient);
            }
        }
        Ok(())
    }

    /// Re-create every row that has no device texture. Returns how many succeeded.
    pub fn reload_all(&mut self) -> usize {
        let pending: Vec<TextureId> = self
            .iter()
            .filter(|(_, t)| !t.is_resident())
            .map(|(id, _)| id)
            .collect();
        let total = pending.len();
        let mut reloaded = 0;
        for (i, id) in pending.into_iter().enumerate() {
            debug!("reloading textures: {}/{}", i + 1, total);
            match self.recreate(id) {
                Ok(()) => reloaded += 1,
                Err(e) => warn!("{}", e),
            }
        }
        reloaded
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cleanup
    // ─────────────────────────────────────────────────────────────────────

    /// Free the device texture and alpha mask of `id`; transient rows are dropped.
    pub fn cleanup(&mut self, id: TextureId) {
        let Some(slot) = self.textures.get_mut(id.index()) else {
            return;
        };
        let Some(row) = slot.as_mut() else {
            return;
        };
        row.alpha_mask = None;
        let handle = std::mem::take(&mut row.handle);
        if handle.is_allocated() {
            self.device.delete_texture(handle);
        }
        if row.is_transient() {
            if let Some(row) = slot.take() {
                self.by_name.remove(&row.name);
            }
        }
    }

    pub fn cleanup_all(&mut self) {
        for i in 0..self.textures.len() {
            self.cleanup(TextureId(i as u32));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Alpha masks
    // ─────────────────────────────────────────────────────────────────────

    /// Build the 1-bit coverage mask of an alpha texture from a raw decode.
    /// Returns whether the row has a mask afterwards.
    pub fn load_alpha_mask(&mut self, id: TextureId) -> bool {
        let Some(row) = self.texture(id) else {
            return false;
        };
        if row.alpha_mask.is_some() {
            return true;
        }
        if !row.has_alpha() || row.is_compressed() {
            return false;
        }
        let mask = match self.decoder.decode(&DecodeRequest::raw(&row.name)) {
            Ok(decoded) => build_alpha_mask(&decoded.image),
            Err(e) => {
                debug!("no alpha mask for {}: {}", row.name, e);
                None
            }
        };
        match self.textures[id.index()].as_mut() {
            Some(row) => {
                row.alpha_mask = mask;
                row.alpha_mask.is_some()
            }
            None => false,
        }
    }
}

/// File name of one cube face: `*` is replaced by the suffix, otherwise
/// `_suffix` goes in front of the extension.
fn cube_face_name(name: &str, suffix: &str) -> String {
    if let Some(star) = name.find('*') {
        return format!("{}{}{}", &name[..star], suffix, &name[star + 1..]);
    }
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    match name[file_start..].rfind('.') {
        Some(dot) => {
            let dot = file_start + dot;
            format!("{}_{}{}", &name[..dot], suffix, &name[dot..])
        }
        None => format!("{}_{}", name, suffix),
    }
}

impl<D: GpuDevice> std::fmt::Debug for TextureRegistry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureRegistry")
            .field("textures", &self.by_name.len())
            .field("missing", &self.missing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, HeadlessDevice};
    use crate::image_data::{BlockFormat, ImageData};
    use crate::texture_importer::testing::MemoryDecoder;

    const MISSING: &str = "packages/textures/notexture.png";

    fn registry(mem: MemoryDecoder) -> (TextureRegistry<HeadlessDevice>, Arc<MemoryDecoder>) {
        let mem = Arc::new(mem);
        let reg = TextureRegistry::new(HeadlessDevice::new(), mem.clone(), TextureSettings::default());
        (reg, mem)
    }

    fn with_missing() -> MemoryDecoder {
        MemoryDecoder::new().with_solid(MISSING, 2, 2, &[255, 0, 255])
    }

    #[test]
    fn test_sentinel_from_file() {
        let (reg, _) = registry(with_missing());
        let t = reg.texture(reg.missing()).unwrap();
        assert_eq!(t.name, MISSING);
        assert_eq!((t.w, t.h), (2, 2));
        assert!(t.is_resident());
    }

    #[test]
    fn test_sentinel_falls_back_to_checkerboard() {
        let (reg, _) = registry(MemoryDecoder::new());
        let t = reg.texture(reg.missing()).unwrap();
        assert_eq!((t.xs, t.ys), (64, 64));
        assert!(!t.is_stub());
        assert!(t.is_resident());
    }

    #[test]
    fn test_cache_identity() {
        let (mut reg, mem) = registry(with_missing().with_solid("wall.png", 4, 4, &[1, 2, 3]));
        let before = mem.decode_count();
        let a = reg.load("wall.png", &LoadOptions::default());
        let b = reg.load("./wall.png", &LoadOptions::default());
        assert_eq!(a, b);
        assert_eq!(mem.decode_count(), before + 1);
        assert_eq!(reg.get("wall.png"), Some(a));
        assert!(reg.bind("wall.png", 0));
    }

    #[test]
    fn test_failure_yields_sentinel() {
        let (mut reg, _) = registry(with_missing());
        let id = reg.load("nothere.png", &LoadOptions::default());
        assert_eq!(id, reg.missing());
        assert!(reg.get("nothere.png").is_none());
        assert!(!reg.bind("nothere.png", 0));
    }

    #[test]
    fn test_register_is_stub_and_never_decodes() {
        let (mut reg, mem) = registry(with_missing().with_solid("a.png", 1, 1, &[1]));
        let before = mem.decode_count();
        let id = reg.register("a.png");
        assert!(reg.texture(id).unwrap().is_stub());
        assert_eq!(reg.register("a.png"), id);
        assert_eq!(mem.decode_count(), before);
    }

    #[test]
    fn test_background_load_replaces_in_place() {
        let (mut reg, _) = registry(with_missing().with_solid("a.png", 2, 2, &[1, 2, 3, 4]));
        let id = reg.load("a.png", &LoadOptions::default());
        let old = reg.texture(id).unwrap().handle;
        let again = reg.load("a.png", &LoadOptions::default().background());
        assert_eq!(id, again);
        let t = reg.texture(id).unwrap();
        assert_ne!(t.handle, old);
        assert!(t.has_alpha());
        assert!(!reg.device().is_live(old));
    }

    #[test]
    fn test_reload_errors() {
        let (mut reg, _) = registry(with_missing().with_solid("a.png", 2, 2, &[1, 2, 3]));
        assert!(matches!(reg.reload("b.png"), Err(ReloadError::NotLoaded(_))));

        let decoded = DecodedTexture {
            image: ImageData::new(1, 1, 3),
            ..Default::default()
        };
        let id = reg.commit("tmp.png", decoded, 0, false);
        reg.textures[id.index()].as_mut().unwrap().flags |= TextureFlags::TRANSIENT;
        assert!(matches!(reg.reload("tmp.png"), Err(ReloadError::Transient(_))));
    }

    #[test]
    fn test_reload_failure_restores_row() {
        let decoded = DecodedTexture {
            image: ImageData::new(2, 2, 3),
            ..Default::default()
        };
        let (mut reg, _) = registry(with_missing());
        let id = reg.commit("gone.png", decoded, CLAMP_S, true);
        let before = reg.texture(id).unwrap().clone();
        let live = reg.device().live_textures();

        assert!(matches!(reg.reload("gone.png"), Err(ReloadError::Failed { .. })));
        assert_eq!(reg.texture(id).unwrap(), &before);
        assert_eq!(reg.device().live_textures(), live);
    }

    #[test]
    fn test_reload_success_frees_old_handle() {
        let (mut reg, _) = registry(with_missing().with_solid("a.png", 2, 2, &[1, 2, 3]));
        let id = reg.load("a.png", &LoadOptions::default());
        let old = reg.texture(id).unwrap().handle;
        reg.reload("a.png").unwrap();
        let t = reg.texture(id).unwrap();
        assert!(t.is_resident());
        assert_ne!(t.handle, old);
        assert!(!reg.device().is_live(old));
    }

    #[test]
    fn test_cleanup_and_reload_all() {
        let (mut reg, _) = registry(with_missing().with_solid("a.png", 2, 2, &[1, 2, 3]));
        let a = reg.load("a.png", &LoadOptions::default());
        let decoded = DecodedTexture {
            image: ImageData::new(1, 1, 3),
            ..Default::default()
        };
        let tmp = reg.commit("tmp.png", decoded, 0, false);
        reg.textures[tmp.index()].as_mut().unwrap().flags |= TextureFlags::TRANSIENT;

        reg.cleanup_all();
        assert_eq!(reg.device().live_textures(), 0);
        assert!(reg.texture(tmp).is_none());
        assert!(reg.get("tmp.png").is_none());
        assert!(!reg.texture(a).unwrap().is_resident());

        assert_eq!(reg.reload_all(), 2);
        assert!(reg.texture(a).unwrap().is_resident());
        assert!(reg.texture(reg.missing()).unwrap().is_resident());
    }

    #[test]
    fn test_compressed_commit_skips_levels() {
        let settings = TextureSettings::default().with_max_tex_size(4);
        let mem = Arc::new(with_missing());
        let mut reg = TextureRegistry::new(HeadlessDevice::new(), mem, settings);

        // 16x16 DXT1 with 5 levels: 128 + 32 + 8 + 8 + 8 bytes
        let blocks = ImageData::from_blocks(16, 16, BlockFormat::Dxt1Rgb, 5, vec![0; 184]);
        let decoded = DecodedTexture {
            image: blocks,
            ..Default::default()
        };
        let id = reg.commit("c.dds", decoded, 0, true);
        let t = reg.texture(id).unwrap();
        assert!(t.is_compressed());
        assert_eq!((t.w, t.h), (4, 4));
        assert_eq!((t.xs, t.ys), (16, 16));
        assert_eq!(t.bpp, 3);
        let levels = reg.device().uploads_for(t.handle);
        assert_eq!(levels.first(), Some(&(0, 4, 4)));
    }

    #[test]
    fn test_alpha_mask() {
        let mem = with_missing().with_surface(
            "leaf.png",
            crate::texture_importer::Surface::packed(2, 1, 4, vec![0, 0, 0, 0, 9, 9, 9, 255]),
        );
        let (mut reg, _) = registry(mem);
        let id = reg.load("leaf.png", &LoadOptions::default());
        assert!(reg.load_alpha_mask(id));
        let t = reg.texture(id).unwrap();
        assert_eq!(t.alpha_at(0, 0), Some(false));
        assert_eq!(t.alpha_at(1, 0), Some(true));

        // no alpha channel, no mask
        assert!(!reg.load_alpha_mask(reg.missing()));
    }

    #[test]
    fn test_cubemap() {
        let mut mem = with_missing();
        for side in ["lf", "rt", "ft", "bk", "dn", "up"] {
            mem = mem.with_solid(&format!("sky/day_{}.png", side), 4, 4, &[1, 2, 3]);
        }
        let (mut reg, _) = registry(mem);
        let id = reg.load_cubemap("sky/day_*.png", true, false).unwrap();
        let t = reg.texture(id).unwrap();
        assert_eq!(t.kind, TextureKind::Cubemap);
        assert_eq!((t.w, t.h), (4, 4));

        let faces: Vec<ImageTarget> = reg
            .device()
            .calls()
            .iter()
            .filter_map(|c| match c {
                GpuCall::Image { handle, target, level: 0, .. } if *handle == t.handle => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(faces.len(), 6);
        assert_eq!(faces[0], ImageTarget::CubeFace(CubeFace::NegX));
        assert_eq!(faces[5], ImageTarget::CubeFace(CubeFace::PosZ));

        assert_eq!(reg.load_cubemap("sky/day_*.png", true, false).unwrap(), id);
        reg.reload("sky/day_*.png").unwrap();
        assert_eq!(reg.texture(id).unwrap().kind, TextureKind::Cubemap);
    }

    #[test]
    fn test_cubemap_rejects_mismatched_faces() {
        let mut mem = with_missing();
        for side in ["lf", "rt", "ft", "bk", "dn"] {
            mem = mem.with_solid(&format!("sky_{}.png", side), 4, 4, &[1, 2, 3]);
        }
        mem = mem.with_solid("sky_up.png", 8, 8, &[1, 2, 3]);
        let (mut reg, _) = registry(mem);
        assert!(matches!(
            reg.load_cubemap("sky.png", false, false),
            Err(DecodeError::CubeFace { .. })
        ));
        assert!(reg.get("sky.png").is_none());
    }

    #[test]
    fn test_cube_face_names() {
        assert_eq!(cube_face_name("sky/a_*.png", "lf"), "sky/a_lf.png");
        assert_eq!(cube_face_name("sky/a.png", "up"), "sky/a_up.png");
        assert_eq!(cube_face_name("sky.d/a", "dn"), "sky.d/a_dn");
    }
}
