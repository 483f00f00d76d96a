// src/lib.rs
//! Texture resource pipeline.
//!
//! - [`registry`]: the name → texture cache and device lifetimes
//! - [`materials`]: slots, their render variants and the legacy definition commands
//! - [`texcmd`] / [`decode`] / [`modifiers`]: texture command strings and their pixel transforms
//! - [`gpu`]: the upload policy and the device boundary (headless and wgpu)
//! - [`textureset`]: batches of slots loaded in three phases
//!
//! [`TextureEngine`] ties the registry and the slot graph together.

pub mod decode;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod image_data;
pub mod materials;
pub mod modifiers;
pub mod paths;
pub mod registry;
pub mod settings;
pub mod texcmd;
pub mod texture;
pub mod texture_importer;
pub mod textureset;

pub use decode::{Compression, DecodeError, DecodeRequest, DecodedTexture, TextureDecoder};
pub use engine::{EngineStats, TextureEngine};
pub use error::{Context, Error, Result};
pub use gpu::{GpuCaps, GpuDevice, HeadlessDevice, WgpuDevice};
pub use materials::{SlotGraph, SlotId, TexRole, VSlotId};
pub use registry::{LoadOptions, ReloadError, TextureRegistry};
pub use settings::TextureSettings;
pub use texture::{Texture, TextureId};
pub use texture_importer::{FileDecoder, ImageDecoder};
pub use textureset::{decode_parallel, TextureSet};
