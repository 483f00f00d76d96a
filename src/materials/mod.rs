// src/materials/mod.rs
//! Texture slots and their render variants.
//!
//! A [`Slot`] is what a mapper picks in the texture browser: a diffuse image
//! plus optional normal/glow/spec/... layers. Every slot owns a chain of
//! [`VSlot`] variants carrying the tweakable render parameters. Both live in
//! the arena inside [`SlotGraph`] and refer to each other by index.

mod graph;
mod slot;
mod vslot;

pub use graph::{SlotGraph, MAX_SLOTS};
pub use slot::{LayerMask, RoleMask, Slot, SlotId, Tex, TexRole, MAX_SLOT_TEXTURES};
pub use vslot::{ShaderParam, VSlot, VSlotChanges, VSlotId};
