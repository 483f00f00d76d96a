// src/engine.rs
//! The texture engine context.
//!
//! Owns the one texture registry and the one slot graph, so every mutation of
//! either goes through `&mut TextureEngine`. Background work only ever sees a
//! [`TextureDecoder`] clone.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use crate::decode::TextureDecoder;
use crate::error::{Context, Error, Result};
use crate::gpu::GpuDevice;
use crate::materials::{SlotGraph, SlotId};
use crate::registry::{LoadOptions, TextureRegistry};
use crate::settings::TextureSettings;
use crate::texture_importer::ImageDecoder;
use crate::textureset::{decode_parallel, TextureSet};

/// Snapshot of what is loaded, for logs and tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub textures: usize,
    pub resident: usize,
    pub slots: usize,
    pub active_slots: usize,
    pub variants: usize,
}

pub struct TextureEngine<D: GpuDevice> {
    registry: TextureRegistry<D>,
    slots: SlotGraph,
}

impl<D: GpuDevice> TextureEngine<D> {
    pub fn new(device: D, source: Arc<dyn ImageDecoder>, settings: TextureSettings) -> Self {
        Self {
            registry: TextureRegistry::new(device, source, settings),
            slots: SlotGraph::new(),
        }
    }

    pub fn registry(&self) -> &TextureRegistry<D> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TextureRegistry<D> {
        &mut self.registry
    }

    pub fn slots(&self) -> &SlotGraph {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut SlotGraph {
        &mut self.slots
    }

    pub fn decoder(&self) -> TextureDecoder {
        self.registry.decoder().clone()
    }

    /// Resolve every texture of `slot` through the registry.
    ///
    /// Returns whether all of them loaded (none fell back to the sentinel).
    pub fn load_slot(&mut self, slot: SlotId) -> Result<bool> {
        let textures: Vec<_> = self
            .slots
            .slot(slot)
            .ok_or_else(|| Error::custom(format!("no texture slot {}", slot.0)))?
            .sts
            .iter()
            .map(|t| (t.name.clone(), t.role, t.t))
            .collect();

        let missing = self.registry.missing();
        let mut ids = Vec::with_capacity(textures.len());
        for (name, role, resolved) in textures {
            let id = match resolved {
                Some(id) => id,
                None => self.registry.load(&name, &LoadOptions::slot().with_role(role)),
            };
            ids.push(id);
        }

        let loaded = ids.iter().all(|&id| id != missing);
        if let Some(s) = self.slots.slot_mut(slot) {
            for (tex, id) in s.sts.iter_mut().zip(ids) {
                tex.t = Some(id);
            }
            s.loaded = loaded;
        }
        Ok(loaded)
    }

    /// Load every active slot; returns how many loaded completely.
    pub fn load_active(&mut self) -> Result<usize> {
        let active = self.slots.active().to_vec();
        let mut complete = 0;
        for slot in active {
            if self.load_slot(slot)? {
                complete += 1;
            }
        }
        debug!("loaded {}/{} active slots", complete, self.slots.active().len());
        Ok(complete)
    }

    /// Read texture set descriptor files, creating their slots.
    pub fn open_sets<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Vec<TextureSet>> {
        let mut sets = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let set = TextureSet::from_file(path, &mut self.slots)
                .with_context(|| format!("reading texture set {}", path.display()))?;
            sets.push(set);
        }
        Ok(sets)
    }

    /// Run all three load phases for `sets`, decoding them in parallel.
    pub fn load_sets(&mut self, sets: &mut [TextureSet]) -> Result<()> {
        for (i, set) in sets.iter_mut().enumerate() {
            set.checkload(&mut self.slots, &self.registry)
                .with_context(|| format!("texture set {}", i))?;
        }
        let decoder = self.decoder();
        decode_parallel(sets, &decoder).context("decoding texture sets")?;
        for (i, set) in sets.iter_mut().enumerate() {
            set.registerload(&mut self.slots, &mut self.registry)
                .with_context(|| format!("texture set {}", i))?;
        }
        Ok(())
    }

    /// Mount `sets` in order; the first one replaces the active list.
    pub fn mount_sets(&mut self, sets: &mut [TextureSet]) -> Result<()> {
        for (i, set) in sets.iter_mut().enumerate() {
            set.mount(&mut self.slots, i == 0)
                .with_context(|| format!("mounting texture set {}", i))?;
        }
        Ok(())
    }

    /// Free every device texture and forget every resolved slot texture.
    pub fn cleanup_all(&mut self) {
        self.slots.cleanup();
        self.registry.cleanup_all();
        info!("texture engine cleaned up");
    }

    /// Re-create device textures after a [`Self::cleanup_all`].
    pub fn reload_all(&mut self) -> usize {
        self.registry.reload_all()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            textures: self.registry.len(),
            resident: self.registry.iter().filter(|(_, t)| t.is_resident()).count(),
            slots: self.slots.slot_count(),
            active_slots: self.slots.active().len(),
            variants: self.slots.vslot_count(),
        }
    }
}
