// src/settings.rs
//! Texture quality and loading settings.
//!
//! These are the knobs a renderer exposes to the user (size caps, reduction,
//! compression, filtering). Hardware limits are *not* here; they come from
//! [`crate::gpu::GpuCaps`] reported by the device.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Images larger than this (in either dimension) are rejected at decode time.
pub const MAX_IMAGE_SIZE: u32 = 1 << 12;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read settings {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Which rendering path the textures are prepared for. A handful of texture
/// commands only act on (or only skip on) the fixed-function path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPath {
    #[default]
    Shader,
    FixedFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureSettings {
    pub render_path: RenderPath,
    /// User cap on mipmapped texture size; 0 means "hardware limit only".
    pub max_tex_size: u32,
    /// Number of times reducible textures are halved.
    pub tex_reduce: u32,
    /// Keep filtering on reducible textures.
    pub reduce_filter: bool,
    pub use_tex_compress: bool,
    /// Minimum edge length for automatic compression; 0 disables it.
    pub tex_compress: u32,
    pub use_dds: bool,
    /// Downscale factor applied to uncompressed `.dds` sources.
    pub scale_dds: u32,
    /// Use driver mipmap generation when the device supports it.
    pub hw_mipmap: bool,
    pub bilinear: bool,
    pub trilinear: bool,
    pub aniso: u32,
    /// Fallback image, also the cache key of the sentinel texture.
    pub missing_texture: String,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            render_path: RenderPath::Shader,
            max_tex_size: 0,
            tex_reduce: 0,
            reduce_filter: true,
            use_tex_compress: true,
            tex_compress: 1 << 10,
            use_dds: true,
            scale_dds: 2,
            hw_mipmap: false,
            bilinear: true,
            trilinear: true,
            aniso: 0,
            missing_texture: "packages/textures/notexture.png".to_string(),
        }
    }
}

impl TextureSettings {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SettingsError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn fixed_function() -> Self {
        Self {
            render_path: RenderPath::FixedFunction,
            ..Default::default()
        }
    }

    pub fn with_max_tex_size(mut self, size: u32) -> Self {
        self.max_tex_size = size;
        self
    }

    pub fn with_tex_reduce(mut self, reduce: u32) -> Self {
        self.tex_reduce = reduce;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.use_tex_compress = enabled;
        self
    }

    pub fn with_hw_mipmap(mut self, enabled: bool) -> Self {
        self.hw_mipmap = enabled;
        self
    }

    pub fn with_aniso(mut self, aniso: u32) -> Self {
        self.aniso = aniso;
        self
    }

    pub fn with_missing_texture(mut self, name: &str) -> Self {
        self.missing_texture = name.to_string();
        self
    }

    pub fn is_fixed_function(&self) -> bool {
        self.render_path == RenderPath::FixedFunction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "tex_reduce": 2, "render_path": "fixed_function" }}"#).unwrap();

        let settings = TextureSettings::from_json_file(file.path()).unwrap();
        assert_eq!(settings.tex_reduce, 2);
        assert!(settings.is_fixed_function());
        assert_eq!(settings.scale_dds, 2);
        assert!(settings.use_dds);
    }

    #[test]
    fn bad_json_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ tex_reduce: ").unwrap();
        let err = TextureSettings::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Json { .. }));
    }
}
