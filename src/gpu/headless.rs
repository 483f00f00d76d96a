// src/gpu/headless.rs
//! A device that uploads nothing and remembers everything.

use std::collections::HashSet;

use super::{
    CompressedUpload, DataType, GpuCaps, GpuDevice, ImageTarget, ImageUpload, InternalFormat,
    PixelFormat, PixelStore, SamplerParams, TexTarget, TextureHandle,
};

/// One recorded driver call. Pixel payloads are recorded by size only.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    Gen(TextureHandle),
    Delete(TextureHandle),
    Parameters {
        handle: TextureHandle,
        target: TexTarget,
        params: SamplerParams,
    },
    Image {
        handle: TextureHandle,
        target: ImageTarget,
        level: u32,
        internal: InternalFormat,
        width: u32,
        height: u32,
        format: PixelFormat,
        data_type: DataType,
        store: PixelStore,
        bytes: usize,
    },
    Compressed {
        handle: TextureHandle,
        target: ImageTarget,
        level: u32,
        format: InternalFormat,
        width: u32,
        height: u32,
        bytes: usize,
    },
}

#[derive(Debug, Default)]
pub struct HeadlessDevice {
    caps: GpuCaps,
    next_handle: u32,
    live: HashSet<TextureHandle>,
    calls: Vec<GpuCall>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_caps(GpuCaps::default())
    }

    pub fn with_caps(caps: GpuCaps) -> Self {
        Self {
            caps,
            next_handle: 0,
            live: HashSet::new(),
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn live_textures(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: TextureHandle) -> bool {
        self.live.contains(&handle)
    }

    /// `(level, width, height)` of every upload (plain or compressed) to `handle`.
    pub fn uploads_for(&self, handle: TextureHandle) -> Vec<(u32, u32, u32)> {
        self.calls
            .iter()
            .filter_map(|call| match *call {
                GpuCall::Image { handle: h, level, width, height, .. }
                | GpuCall::Compressed { handle: h, level, width, height, .. }
                    if h == handle =>
                {
                    Some((level, width, height))
                }
                _ => None,
            })
            .collect()
    }

    pub fn upload_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, GpuCall::Image { .. } | GpuCall::Compressed { .. }))
            .count()
    }
}

impl GpuDevice for HeadlessDevice {
    fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    fn gen_texture(&mut self) -> TextureHandle {
        self.next_handle += 1;
        let handle = TextureHandle(self.next_handle);
        self.live.insert(handle);
        self.calls.push(GpuCall::Gen(handle));
        handle
    }

    fn delete_texture(&mut self, handle: TextureHandle) {
        if !self.live.remove(&handle) {
            log::warn!("deleting unknown texture handle {}", handle.0);
        }
        self.calls.push(GpuCall::Delete(handle));
    }

    fn set_parameters(&mut self, handle: TextureHandle, target: TexTarget, params: &SamplerParams) {
        self.calls.push(GpuCall::Parameters {
            handle,
            target,
            params: *params,
        });
    }

    fn tex_image(&mut self, upload: &ImageUpload<'_>) {
        self.calls.push(GpuCall::Image {
            handle: upload.handle,
            target: upload.target,
            level: upload.level,
            internal: upload.internal,
            width: upload.width,
            height: upload.height,
            format: upload.format,
            data_type: upload.data_type,
            store: upload.store,
            bytes: upload.data.len(),
        });
    }

    fn compressed_tex_image(&mut self, upload: &CompressedUpload<'_>) {
        self.calls.push(GpuCall::Compressed {
            handle: upload.handle,
            target: upload.target,
            level: upload.level,
            format: upload.format,
            width: upload.width,
            height: upload.height,
            bytes: upload.data.len(),
        });
    }
}
