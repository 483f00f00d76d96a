// src/gpu/upload.rs
//! Upload policy: sizes, formats, row alignment, mip chains and compressed
//! level selection. Everything reaches the driver through [`GpuDevice`].

use crate::decode::Compression;
use crate::image_data::{box_downsample, half_size, repack_rows, scale_pixels, ImageData};
use crate::settings::TextureSettings;

use super::{
    resolve_format, CompressedUpload, DataType, Filter, GpuCaps, GpuDevice, ImageTarget,
    ImageUpload, InternalFormat, PixelFormat, PixelStore, SamplerParams, TexTarget, TextureHandle,
    Wrap,
};

/// Clamp bit for the S (u) axis.
pub const CLAMP_S: u8 = 1;
/// Clamp bit for the T (v) axis.
pub const CLAMP_T: u8 = 2;

/// Client pixels as handed to the upload engine.
#[derive(Debug, Clone, Copy)]
pub struct PixelSource<'a> {
    pub data: &'a [u8],
    pub w: u32,
    pub h: u32,
    /// Bytes per row; 0 means tightly packed.
    pub pitch: u32,
}

impl<'a> PixelSource<'a> {
    pub fn from_image(img: &'a ImageData) -> Self {
        Self {
            data: &img.data,
            w: img.w,
            h: img.h,
            pitch: img.pitch,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row layout
// ─────────────────────────────────────────────────────────────────────────────

/// Largest power of two up to 8 dividing `pitch`.
pub fn tex_align(pitch: u32) -> u32 {
    match pitch {
        p if p & 1 != 0 => 1,
        p if p & 2 != 0 => 2,
        p if p & 4 != 0 => 4,
        _ => 8,
    }
}

/// How a padded source row reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    Tight,
    /// Upload directly with a row length and alignment reproducing the pitch.
    RowLength { row: u32, alignment: u32 },
    /// No alignment fits; copy rows into a tight buffer first.
    Repack,
}

pub fn row_layout(w: u32, bpp: u32, pitch: u32) -> RowLayout {
    if w * bpp == pitch {
        return RowLayout::Tight;
    }
    let row = pitch / bpp;
    let mut alignment = tex_align(pitch);
    while alignment > 0 && (row * bpp).div_ceil(alignment) * alignment != pitch {
        alignment >>= 1;
    }
    if alignment == 0 {
        RowLayout::Repack
    } else {
        RowLayout::RowLength { row, alignment }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Uploads
// ─────────────────────────────────────────────────────────────────────────────

/// Upload `src` as a `tw`×`th` texture, resampling or repacking as needed, and
/// build the mip chain in software unless the driver generates it.
#[allow(clippy::too_many_arguments)]
pub fn upload_texture<D: GpuDevice + ?Sized>(
    device: &mut D,
    handle: TextureHandle,
    target: ImageTarget,
    internal: InternalFormat,
    (mut tw, mut th): (u32, u32),
    format: PixelFormat,
    data_type: DataType,
    src: PixelSource<'_>,
    mipmap: bool,
    hw_mipmap: bool,
) {
    let bpp = format.components() * data_type.size();
    let mut pitch = if src.pitch == 0 { src.w * bpp } else { src.pitch };
    let mut buf: Option<Vec<u8>> = None;
    let mut row = 0;
    let mut row_align = 0;

    if src.w != tw || src.h != th {
        buf = Some(scale_pixels(src.data, src.w, src.h, bpp, pitch, tw, th));
    } else {
        match row_layout(tw, bpp, pitch) {
            RowLayout::Tight => {}
            RowLayout::RowLength { row: r, alignment } => {
                row = r;
                row_align = alignment;
            }
            RowLayout::Repack => buf = Some(repack_rows(src.data, tw, th, bpp, pitch)),
        }
    }

    let mut level = 0;
    loop {
        if buf.is_some() {
            pitch = tw * bpp;
        }
        let next = {
            let data: &[u8] = buf.as_deref().unwrap_or(src.data);
            let alignment = if row > 0 { row_align } else { tex_align(pitch) };
            device.tex_image(&ImageUpload {
                handle,
                target,
                level,
                internal,
                width: tw,
                height: if target == ImageTarget::Tex1D { 1 } else { th },
                format,
                data_type,
                store: PixelStore {
                    alignment,
                    row_length: row,
                },
                data,
            });
            row = 0;

            if !mipmap || hw_mipmap || tw.max(th) <= 1 {
                break;
            }
            let (srcw, srch) = (tw, th);
            (tw, th) = half_size(tw, th);
            box_downsample(data, srcw, srch, bpp, pitch, tw, th)
        };
        buf = Some(next);
        level += 1;
    }
}

/// Upload pre-compressed levels. Levels above the size limit are skipped but
/// still consumed from `data`. Returns the number of levels issued.
#[allow(clippy::too_many_arguments)]
pub fn upload_compressed<D: GpuDevice + ?Sized>(
    device: &mut D,
    handle: TextureHandle,
    target: ImageTarget,
    format: InternalFormat,
    (mut w, mut h): (u32, u32),
    data: &[u8],
    (align, block_size): (u32, u32),
    levels: u32,
    mipmap: bool,
    max_tex_size: u32,
) -> u32 {
    let caps = device.caps();
    let hw_limit = hw_limit(caps, target.target());
    let size_limit = if levels > 1 && max_tex_size > 0 {
        max_tex_size.min(hw_limit)
    } else {
        hw_limit
    };

    let align = align.max(1);
    let mut cursor = 0usize;
    let mut issued = 0;
    for _ in 0..levels {
        let size = (w.div_ceil(align) * h.div_ceil(align) * block_size) as usize;
        if w <= size_limit && h <= size_limit {
            let Some(level_data) = data.get(cursor..cursor + size) else {
                log::warn!("compressed texture data ends before level {}", issued);
                break;
            };
            device.compressed_tex_image(&CompressedUpload {
                handle,
                target,
                level: issued,
                format,
                width: w,
                height: h,
                data: level_data,
            });
            issued += 1;
            if !mipmap {
                break;
            }
        }
        if w.max(h) <= 1 {
            break;
        }
        (w, h) = half_size(w, h);
        cursor += size;
    }
    issued
}

fn hw_limit(caps: &GpuCaps, target: TexTarget) -> u32 {
    match target {
        TexTarget::CubeMap => caps.max_cube_texture_size,
        _ => caps.max_texture_size,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sampling state
// ─────────────────────────────────────────────────────────────────────────────

/// Sampling parameters for `filter` = 0 (nearest), 1 (filtered) or 2 (mipmapped).
pub fn sampler_params(
    settings: &TextureSettings,
    caps: &GpuCaps,
    target: TexTarget,
    clamp: u8,
    filter: u8,
    generate_mipmap: bool,
) -> SamplerParams {
    let wrap = |bit: u8| {
        if clamp & bit != 0 {
            Wrap::ClampToEdge
        } else {
            Wrap::Repeat
        }
    };
    let smooth = if filter > 0 && settings.bilinear {
        Filter::Linear
    } else {
        Filter::Nearest
    };
    let aniso = settings.aniso.min(caps.max_anisotropy);

    SamplerParams {
        wrap_s: wrap(CLAMP_S),
        wrap_t: if target == TexTarget::Tex1D {
            Wrap::Repeat
        } else {
            wrap(CLAMP_T)
        },
        mag_filter: smooth,
        min_filter: smooth,
        mip_filter: (filter > 1).then_some(if settings.trilinear {
            Filter::Linear
        } else {
            Filter::Nearest
        }),
        anisotropy: if target == TexTarget::Tex2D && filter > 1 { aniso } else { 0 },
        generate_mipmap: generate_mipmap && filter > 1 && settings.hw_mipmap && caps.hw_mipmap,
    }
}

pub fn setup_parameters<D: GpuDevice + ?Sized>(
    device: &mut D,
    settings: &TextureSettings,
    handle: TextureHandle,
    target: TexTarget,
    clamp: u8,
    filter: u8,
    generate_mipmap: bool,
) {
    let params = sampler_params(settings, device.caps(), target, clamp, filter, generate_mipmap);
    device.set_parameters(handle, target, &params);
}

// ─────────────────────────────────────────────────────────────────────────────
// Size and format policy
// ─────────────────────────────────────────────────────────────────────────────

/// Final upload size for a `w`×`h` image.
pub fn resize_texture(
    settings: &TextureSettings,
    caps: &GpuCaps,
    (mut w, mut h): (u32, u32),
    mipmap: bool,
    can_reduce: bool,
    target: TexTarget,
    compress: Compression,
) -> (u32, u32) {
    let hw = hw_limit(caps, target);
    let size_limit = if mipmap && settings.max_tex_size > 0 {
        settings.max_tex_size.min(hw)
    } else {
        hw
    };

    if let Compression::Scale(scale) = compress {
        if scale > 0 && !uses_compression(settings, caps) {
            w = (w / scale).max(1);
            h = (h / scale).max(1);
        }
    }
    if can_reduce && settings.tex_reduce > 0 {
        w = (w >> settings.tex_reduce.min(31)).max(1);
        h = (h >> settings.tex_reduce.min(31)).max(1);
    }
    w = w.min(size_limit);
    h = h.min(size_limit);

    if !caps.npot && (!w.is_power_of_two() || !h.is_power_of_two()) {
        let mut tw = w.next_power_of_two();
        let mut th = h.next_power_of_two();
        // round down when the image is much closer to the smaller power
        if w < tw - tw / 4 {
            tw /= 2;
        }
        if h < th - th / 4 {
            th /= 2;
        }
        (tw, th)
    } else {
        (w, h)
    }
}

#[inline]
fn uses_compression(settings: &TextureSettings, caps: &GpuCaps) -> bool {
    settings.use_tex_compress && caps.texture_compression
}

/// Storage format for an uncompressed upload, possibly swapped for a
/// compressed one.
pub fn compressed_format(
    settings: &TextureSettings,
    caps: &GpuCaps,
    format: InternalFormat,
    (w, h): (u32, u32),
    force: Compression,
) -> InternalFormat {
    let wanted = match force {
        Compression::Disabled => false,
        Compression::Scale(_) => true,
        Compression::Auto => w.max(h) >= settings.tex_compress,
    };
    if !uses_compression(settings, caps) || settings.tex_compress == 0 || !wanted {
        return format;
    }
    match format {
        InternalFormat::Rgb5 | InternalFormat::Rgb8 => {
            if caps.s3tc {
                InternalFormat::Dxt1Rgb
            } else {
                InternalFormat::CompressedRgb
            }
        }
        InternalFormat::Rgba8 => {
            if caps.s3tc {
                InternalFormat::Dxt5
            } else {
                InternalFormat::CompressedRgba
            }
        }
        other => other,
    }
}

/// Which part of a pre-compressed payload gets uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSelection {
    pub offset: usize,
    pub levels: u32,
    pub w: u32,
    pub h: u32,
}

/// Drop leading levels of a compressed image: `tex_reduce` of them when the
/// texture is reducible, then as many as needed to fit the size ceiling.
pub fn reduce_compressed_levels(
    settings: &TextureSettings,
    caps: &GpuCaps,
    image: &ImageData,
    can_reduce: bool,
    mipmap: bool,
) -> LevelSelection {
    let mut sel = LevelSelection {
        offset: 0,
        levels: image.levels.max(1),
        w: image.w,
        h: image.h,
    };
    let mut level = 0;
    let mut drop_level = |sel: &mut LevelSelection| {
        sel.offset += image.level_size(level);
        level += 1;
        sel.levels -= 1;
        (sel.w, sel.h) = half_size(sel.w, sel.h);
    };

    if can_reduce && settings.tex_reduce > 0 {
        for _ in 0..settings.tex_reduce.min(sel.levels - 1) {
            drop_level(&mut sel);
        }
    }
    let size_limit = if mipmap && settings.max_tex_size > 0 {
        settings.max_tex_size.min(caps.max_texture_size)
    } else {
        caps.max_texture_size
    };
    while (sel.w > size_limit || sel.h > size_limit) && sel.levels > 1 {
        drop_level(&mut sel);
    }
    sel
}

// ─────────────────────────────────────────────────────────────────────────────
// Texture creation
// ─────────────────────────────────────────────────────────────────────────────

/// Everything [`create_texture`] needs.
#[derive(Debug, Clone, Copy)]
pub struct CreateTexture<'a> {
    pub handle: TextureHandle,
    /// Set sampling parameters (only the first face of a cube map does).
    pub setup: bool,
    pub w: u32,
    pub h: u32,
    pub pixels: Option<PixelSource<'a>>,
    pub clamp: u8,
    pub filter: u8,
    pub component: InternalFormat,
    pub target: ImageTarget,
    /// Apply the resize/compression policy before uploading.
    pub resize: bool,
    pub format: Option<PixelFormat>,
}

pub fn create_texture<D: GpuDevice + ?Sized>(
    device: &mut D,
    settings: &TextureSettings,
    spec: &CreateTexture<'_>,
) {
    let target = spec.target.target();
    let (format, data_type) = resolve_format(spec.component, spec.format);
    if spec.setup {
        setup_parameters(
            device,
            settings,
            spec.handle,
            target,
            spec.clamp,
            spec.filter,
            spec.pixels.is_some(),
        );
    }
    let hw_mipmap = settings.hw_mipmap && device.caps().hw_mipmap;

    let Some(src) = spec.pixels else {
        // storage only
        device.tex_image(&ImageUpload {
            handle: spec.handle,
            target: spec.target,
            level: 0,
            internal: spec.component,
            width: spec.w,
            height: spec.h,
            format,
            data_type,
            store: PixelStore {
                alignment: 1,
                row_length: 0,
            },
            data: &[],
        });
        return;
    };

    let mipmap = spec.filter > 1;
    let mut size = (spec.w, spec.h);
    let mut component = spec.component;
    if spec.resize {
        let caps = device.caps().clone();
        size = resize_texture(settings, &caps, size, mipmap, false, target, Compression::Auto);
        if mipmap {
            component = compressed_format(settings, &caps, component, size, Compression::Auto);
        }
    }
    upload_texture(
        device,
        spec.handle,
        spec.target,
        component,
        size,
        format,
        data_type,
        src,
        mipmap,
        hw_mipmap,
    );
}

#[allow(clippy::too_many_arguments)]
pub fn create_compressed_texture<D: GpuDevice + ?Sized>(
    device: &mut D,
    settings: &TextureSettings,
    handle: TextureHandle,
    (w, h): (u32, u32),
    data: &[u8],
    (align, block_size): (u32, u32),
    levels: u32,
    clamp: u8,
    filter: u8,
    format: InternalFormat,
    target: ImageTarget,
    setup: bool,
) -> u32 {
    if setup {
        setup_parameters(device, settings, handle, target.target(), clamp, filter, false);
    }
    upload_compressed(
        device,
        handle,
        target,
        format,
        (w, h),
        data,
        (align, block_size),
        levels,
        filter > 1,
        settings.max_tex_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, HeadlessDevice};
    use crate::image_data::BlockFormat;

    #[test]
    fn test_row_layout() {
        assert_eq!(row_layout(4, 4, 16), RowLayout::Tight);
        assert_eq!(row_layout(3, 3, 12), RowLayout::RowLength { row: 4, alignment: 4 });
        assert_eq!(row_layout(3, 3, 10), RowLayout::RowLength { row: 3, alignment: 2 });
        assert_eq!(row_layout(3, 4, 13), RowLayout::Repack);
    }

    #[test]
    fn test_software_mip_chain() {
        let mut dev = HeadlessDevice::new();
        let h = dev.gen_texture();
        let data = vec![0u8; 8 * 4 * 4];
        upload_texture(
            &mut dev,
            h,
            ImageTarget::Tex2D,
            InternalFormat::Rgba8,
            (8, 4),
            PixelFormat::Rgba,
            DataType::UnsignedByte,
            PixelSource { data: &data, w: 8, h: 4, pitch: 0 },
            true,
            false,
        );
        assert_eq!(
            dev.uploads_for(h),
            vec![(0, 8, 4), (1, 4, 2), (2, 2, 1), (3, 1, 1)]
        );
    }

    #[test]
    fn test_hw_mipmap_uploads_one_level() {
        let mut dev = HeadlessDevice::new();
        let h = dev.gen_texture();
        let data = vec![0u8; 4 * 4 * 3];
        upload_texture(
            &mut dev,
            h,
            ImageTarget::Tex2D,
            InternalFormat::Rgb8,
            (4, 4),
            PixelFormat::Rgb,
            DataType::UnsignedByte,
            PixelSource { data: &data, w: 4, h: 4, pitch: 0 },
            true,
            true,
        );
        assert_eq!(dev.uploads_for(h), vec![(0, 4, 4)]);
    }

    #[test]
    fn test_padded_rows_use_row_length() {
        let mut dev = HeadlessDevice::new();
        let h = dev.gen_texture();
        let data = vec![0u8; 12 * 3];
        upload_texture(
            &mut dev,
            h,
            ImageTarget::Tex2D,
            InternalFormat::Rgb8,
            (3, 3),
            PixelFormat::Rgb,
            DataType::UnsignedByte,
            PixelSource { data: &data, w: 3, h: 3, pitch: 12 },
            false,
            false,
        );
        match dev.calls().last() {
            Some(GpuCall::Image { store, bytes, .. }) => {
                assert_eq!(*store, PixelStore { alignment: 4, row_length: 4 });
                assert_eq!(*bytes, 36);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_compressed_levels_skip_oversized() {
        // 16x16 DXT1 with 5 levels; the device caps textures at 8
        let caps = GpuCaps {
            max_texture_size: 8,
            ..GpuCaps::default()
        };
        let mut dev = HeadlessDevice::with_caps(caps);
        let h = dev.gen_texture();
        let img = ImageData::from_blocks(16, 16, BlockFormat::Dxt1Rgb, 5, vec![0; 128 + 32 + 8 + 8 + 8]);

        let issued = upload_compressed(
            &mut dev,
            h,
            ImageTarget::Tex2D,
            InternalFormat::Dxt1Rgb,
            (16, 16),
            &img.data,
            (4, 8),
            5,
            true,
            0,
        );
        assert_eq!(issued, 4);
        assert_eq!(
            dev.uploads_for(h),
            vec![(0, 8, 8), (1, 4, 4), (2, 2, 2), (3, 1, 1)]
        );
        // first issued level comes from byte 128, after the skipped 16x16 level
        match &dev.calls()[1] {
            GpuCall::Compressed { bytes, .. } => assert_eq!(*bytes, 32),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_compressed_without_mipmap_stops_after_first() {
        let mut dev = HeadlessDevice::new();
        let h = dev.gen_texture();
        let data = vec![0u8; 64 + 16 + 16];
        let issued = upload_compressed(
            &mut dev,
            h,
            ImageTarget::Tex2D,
            InternalFormat::Dxt5,
            (8, 8),
            &data,
            (4, 16),
            3,
            false,
            0,
        );
        assert_eq!(issued, 1);
    }

    #[test]
    fn test_resize_policy() {
        let settings = TextureSettings::default().with_tex_reduce(1).with_max_tex_size(256);
        let caps = GpuCaps::default();
        let size = resize_texture(&settings, &caps, (1024, 512), true, true, TexTarget::Tex2D, Compression::Auto);
        assert_eq!(size, (256, 256));

        let size = resize_texture(&settings, &caps, (1024, 512), false, false, TexTarget::Tex2D, Compression::Auto);
        assert_eq!(size, (1024, 512));

        let no_tc = TextureSettings::default().with_compression(false);
        let size = resize_texture(&no_tc, &caps, (512, 512), true, false, TexTarget::Tex2D, Compression::Scale(2));
        assert_eq!(size, (256, 256));

        let npot = GpuCaps { npot: false, ..GpuCaps::default() };
        let size = resize_texture(&TextureSettings::default(), &npot, (100, 60), false, false, TexTarget::Tex2D, Compression::Auto);
        assert_eq!(size, (128, 64));
    }

    #[test]
    fn test_compressed_format_choice() {
        let settings = TextureSettings::default();
        let caps = GpuCaps::default();
        assert_eq!(
            compressed_format(&settings, &caps, InternalFormat::Rgb8, (2048, 2048), Compression::Auto),
            InternalFormat::Dxt1Rgb
        );
        assert_eq!(
            compressed_format(&settings, &caps, InternalFormat::Rgba8, (64, 64), Compression::Auto),
            InternalFormat::Rgba8
        );
        assert_eq!(
            compressed_format(&settings, &caps, InternalFormat::Rgba8, (64, 64), Compression::Scale(1)),
            InternalFormat::Dxt5
        );
        assert_eq!(
            compressed_format(&settings, &caps, InternalFormat::Rgb8, (4096, 4096), Compression::Disabled),
            InternalFormat::Rgb8
        );
    }

    #[test]
    fn test_level_reduction() {
        let settings = TextureSettings::default().with_tex_reduce(1);
        let caps = GpuCaps {
            max_texture_size: 4,
            ..GpuCaps::default()
        };
        let img = ImageData::from_blocks(16, 16, BlockFormat::Dxt5, 5, vec![0; 256 + 64 + 16 + 16 + 16]);
        let sel = reduce_compressed_levels(&settings, &caps, &img, true, true);
        assert_eq!(sel, LevelSelection { offset: 256 + 64, levels: 3, w: 4, h: 4 });

        let sel = reduce_compressed_levels(&settings, &GpuCaps::default(), &img, false, true);
        assert_eq!(sel.levels, 5);
        assert_eq!(sel.offset, 0);
    }

    #[test]
    fn test_sampler_params() {
        let settings = TextureSettings::default().with_aniso(8);
        let caps = GpuCaps::default();
        let p = sampler_params(&settings, &caps, TexTarget::Tex2D, CLAMP_T, 2, true);
        assert_eq!(p.wrap_s, Wrap::Repeat);
        assert_eq!(p.wrap_t, Wrap::ClampToEdge);
        assert_eq!(p.mip_filter, Some(Filter::Linear));
        assert_eq!(p.anisotropy, 8);
        assert!(!p.generate_mipmap);

        let p = sampler_params(&settings, &caps, TexTarget::Tex2D, 0, 0, false);
        assert_eq!(p.mag_filter, Filter::Nearest);
        assert_eq!(p.mip_filter, None);
        assert_eq!(p.anisotropy, 0);
    }
}
