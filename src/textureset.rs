// src/textureset.rs
//! Texture sets: batches of slots loaded in three phases.
//!
//! ```text
//!   checkload   (main thread)   resolve names already in the registry
//!   load        (any thread)    decode everything else, CPU only
//!   registerload(main thread)   upload and hand the ids to the slots
//! ```
//!
//! Only `load` runs off the main thread. It takes `&TextureDecoder` and touches
//! nothing but the set itself, so a set can be moved to a worker (or several
//! sets decoded at once with [`decode_parallel`]) while the registry and slot
//! graph stay single-writer. Calling a phase out of order is an error and
//! leaves the set untouched.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decode::{DecodeError, DecodeRequest, DecodedTexture, TextureDecoder};
use crate::gpu::GpuDevice;
use crate::materials::{RoleMask, SlotGraph, SlotId, TexRole, VSlotChanges, MAX_SLOTS};
use crate::paths::{has_separator, make_rel_path, normalize_name, parent_dir, split_commands};
use crate::registry::{LoadOptions, TextureRegistry};

// ═══════════════════════════════════════════════════════════════════════════════
// Section 1 — Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("could not load texture definition {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid texture definition {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum LoadPhaseError {
    #[error("texture set is {found:?}, {phase} needs {expected:?}")]
    OutOfOrder {
        phase: &'static str,
        expected: LoadPhase,
        found: LoadPhase,
    },
    #[error("a texture decode worker panicked")]
    DecodePanicked,
}

#[derive(Debug, Error)]
pub enum MountError {
    #[error("texture set is not the last mounted block of slots")]
    NotSuffix,
    #[error("texture set is not mounted")]
    NotMounted,
    #[error("texture set is already mounted")]
    AlreadyMounted,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Section 2 — Descriptors
// ═══════════════════════════════════════════════════════════════════════════════

/// One slot as written in a descriptor file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotDescriptor {
    pub diffuse: Option<String>,
    pub other: Option<String>,
    pub decal: Option<String>,
    pub normal: Option<String>,
    pub glow: Option<String>,
    pub spec: Option<String>,
    pub depth: Option<String>,
    pub envmap: Option<String>,
    pub shader: Option<String>,
    pub scale: Option<f32>,
    pub rotation: Option<i32>,
    pub xoffset: Option<i32>,
    pub yoffset: Option<i32>,
}

impl SlotDescriptor {
    pub fn texture(&self, role: TexRole) -> Option<&str> {
        let name = match role {
            TexRole::Diffuse => &self.diffuse,
            TexRole::Unknown => &self.other,
            TexRole::Decal => &self.decal,
            TexRole::Normal => &self.normal,
            TexRole::Glow => &self.glow,
            TexRole::Spec => &self.spec,
            TexRole::Depth => &self.depth,
            TexRole::Envmap => &self.envmap,
        };
        name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Entry of a set's `textures` list: a slot file or an inline slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextureRef {
    Path(String),
    Inline(SlotDescriptor),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureSetDescriptor {
    #[serde(default)]
    pub textures: Vec<TextureRef>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DescriptorError> {
    let text = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| DescriptorError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// `name` as seen from a file in `dir`: names with a directory part are
/// relative to it, bare names are taken as they are.
fn resolve_in(dir: &str, name: &str) -> String {
    if !dir.is_empty() && has_separator(split_commands(name).1) {
        make_rel_path(dir, name)
    } else {
        normalize_name(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Section 3 — Texture sets
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct TexEntry {
    pub slot: SlotId,
    /// Roles whose texture has been resolved. Only ever grows.
    pub loadmask: RoleMask,
    pub mounted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Empty,
    Scanned,
    Decoded,
    Committed,
}

/// A texture that `checkload` could not resolve, with every slot texture using it.
#[derive(Debug)]
struct PendingTex {
    name: String,
    role: TexRole,
    /// `(entry index, index into the slot's texture list)`
    users: Vec<(usize, usize)>,
    result: Option<Result<DecodedTexture, DecodeError>>,
}

#[derive(Debug)]
pub struct TextureSet {
    entries: Vec<TexEntry>,
    phase: LoadPhase,
    pending: Vec<PendingTex>,
}

impl Default for TextureSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            phase: LoadPhase::Empty,
            pending: Vec::new(),
        }
    }

    /// Build a set from a parsed descriptor. Relative names resolve against `dir`.
    pub fn from_descriptor(desc: &TextureSetDescriptor, dir: &str, graph: &mut SlotGraph) -> Self {
        let mut set = Self::new();
        for entry in &desc.textures {
            match entry {
                TextureRef::Inline(slot) => {
                    set.add_slot(graph, slot, dir);
                }
                TextureRef::Path(name) => {
                    let file = resolve_in(dir, name);
                    match read_json::<SlotDescriptor>(Path::new(&file)) {
                        Ok(slot) => {
                            set.add_slot(graph, &slot, parent_dir(&file));
                        }
                        Err(e) => warn!("{}", e),
                    }
                }
            }
        }
        set
    }

    /// Load a descriptor file (`{"textures": [...]}`).
    pub fn from_file(path: impl AsRef<Path>, graph: &mut SlotGraph) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        let desc: TextureSetDescriptor = read_json(path)?;
        let path_str = path.to_string_lossy().replace('\\', "/");
        let set = Self::from_descriptor(&desc, parent_dir(&path_str), graph);
        info!("texture set {}: {} slots", path.display(), set.len());
        Ok(set)
    }

    /// Create a slot (and its variant) from `desc`. Slots without any texture
    /// are dropped.
    pub fn add_slot(&mut self, graph: &mut SlotGraph, desc: &SlotDescriptor, dir: &str) -> Option<SlotId> {
        if self.entries.len() >= MAX_SLOTS {
            warn!("texture set is full, dropping slot");
            return None;
        }
        let textures: Vec<(TexRole, String)> = TexRole::ALL
            .iter()
            .filter_map(|&role| desc.texture(role).map(|name| (role, resolve_in(dir, name))))
            .collect();
        if textures.is_empty() {
            debug!("slot without textures dropped");
            return None;
        }

        let slot = graph.new_slot();
        for (role, name) in textures {
            graph.add_tex(slot, role, name);
        }
        if let Some(s) = graph.slot_mut(slot) {
            s.shader = desc.shader.clone();
        }

        let vs = graph.empty_variant(slot);
        if let Some(v) = graph.vslot_mut(vs) {
            v.reset();
            v.rotation = desc.rotation.unwrap_or(0).clamp(0, 5);
            v.xoffset = desc.xoffset.unwrap_or(0).max(0);
            v.yoffset = desc.yoffset.unwrap_or(0).max(0);
            v.scale = match desc.scale {
                Some(s) if s > 0.0 => s,
                _ => 1.0,
            };
        }
        graph.propagate(vs, VSlotChanges::all());

        self.entries.push(TexEntry {
            slot,
            loadmask: RoleMask::empty(),
            mounted: false,
        });
        Some(slot)
    }

    pub fn entries(&self) -> &[TexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    /// Number of distinct textures waiting for the decode phase.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn slot_ids(&self) -> Vec<SlotId> {
        self.entries.iter().map(|e| e.slot).collect()
    }

    fn expect_phase(&self, phase: &'static str, allowed: &[LoadPhase], expected: LoadPhase) -> Result<(), LoadPhaseError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(LoadPhaseError::OutOfOrder {
                phase,
                expected,
                found: self.phase,
            })
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Phase 1: scan
    // ───────────────────────────────────────────────────────────────────────

    /// Resolve every texture already in the registry and queue the rest.
    ///
    /// Runs on a fresh set or again after a commit (to pick up slots added since).
    pub fn checkload<D: GpuDevice>(
        &mut self,
        graph: &mut SlotGraph,
        registry: &TextureRegistry<D>,
    ) -> Result<(), LoadPhaseError> {
        self.expect_phase("checkload", &[LoadPhase::Empty, LoadPhase::Committed], LoadPhase::Empty)?;

        let mut pending: Vec<PendingTex> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for (e, entry) in self.entries.iter_mut().enumerate() {
            let Some(slot) = graph.slot_mut(entry.slot) else {
                continue;
            };
            let diff = slot.texmask - entry.loadmask;
            if diff.is_empty() {
                continue;
            }
            for (t, tex) in slot.sts.iter_mut().enumerate() {
                if !diff.contains(tex.role.bit()) {
                    continue;
                }
                if let Some(id) = registry.get(&tex.name) {
                    tex.t = Some(id);
                    entry.loadmask |= tex.role.bit();
                    continue;
                }
                match by_name.get(&tex.name) {
                    Some(&p) => pending[p].users.push((e, t)),
                    None => {
                        by_name.insert(tex.name.clone(), pending.len());
                        pending.push(PendingTex {
                            name: tex.name.clone(),
                            role: tex.role,
                            users: vec![(e, t)],
                            result: None,
                        });
                    }
                }
            }
        }
        debug!("texture set scan: {} textures to decode", pending.len());
        self.pending = pending;
        self.phase = LoadPhase::Scanned;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Phase 2: decode
    // ───────────────────────────────────────────────────────────────────────

    /// Decode everything `checkload` queued. Safe to run on any thread.
    pub fn load(&mut self, decoder: &TextureDecoder) -> Result<(), LoadPhaseError> {
        self.expect_phase("load", &[LoadPhase::Scanned], LoadPhase::Scanned)?;
        for tex in &mut self.pending {
            let req = DecodeRequest::new(&tex.name).with_role(tex.role);
            tex.result = Some(decoder.decode(&req));
        }
        self.phase = LoadPhase::Decoded;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Phase 3: commit
    // ───────────────────────────────────────────────────────────────────────

    /// Upload decoded textures and hand their ids to the slots.
    ///
    /// A texture registered meanwhile (by another set, say) is reused instead
    /// of uploaded twice. Failed decodes get the sentinel and leave their
    /// loadmask bit clear.
    pub fn registerload<D: GpuDevice>(
        &mut self,
        graph: &mut SlotGraph,
        registry: &mut TextureRegistry<D>,
    ) -> Result<(), LoadPhaseError> {
        self.expect_phase("registerload", &[LoadPhase::Decoded], LoadPhase::Decoded)?;

        let missing = registry.missing();
        for tex in std::mem::take(&mut self.pending) {
            let (id, ok) = match tex.result {
                Some(Ok(decoded)) => match registry.get(&tex.name) {
                    Some(id) => (id, true),
                    None => (registry.commit_with(&tex.name, &decoded, &LoadOptions::slot()), true),
                },
                Some(Err(e)) => {
                    warn!("{}", e);
                    (missing, false)
                }
                None => (missing, false),
            };
            for (e, t) in tex.users {
                let Some(entry) = self.entries.get_mut(e) else {
                    continue;
                };
                let Some(slot) = graph.slot_mut(entry.slot) else {
                    continue;
                };
                if let Some(st) = slot.sts.get_mut(t) {
                    st.t = Some(id);
                    if ok {
                        entry.loadmask |= st.role.bit();
                    }
                }
            }
        }

        for entry in &self.entries {
            if let Some(slot) = graph.slot_mut(entry.slot) {
                slot.loaded = entry.loadmask.contains(slot.texmask);
            }
        }
        self.phase = LoadPhase::Committed;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Mounting
    // ───────────────────────────────────────────────────────────────────────

    /// Append the set's slots to the active list; `initial` replaces the list.
    ///
    /// A set is mounted at most once; unmount it before mounting it again.
    pub fn mount(&mut self, graph: &mut SlotGraph, initial: bool) -> Result<(), MountError> {
        if self.is_mounted() {
            return Err(MountError::AlreadyMounted);
        }
        graph.mount_slots(&self.slot_ids(), initial);
        for entry in &mut self.entries {
            entry.mounted = true;
        }
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.entries.iter().any(|e| e.mounted)
    }

    /// Remove the set's slots from the active list.
    ///
    /// They must be the last block of the list; anything else is refused and
    /// the list left untouched.
    pub fn unmount(&mut self, graph: &mut SlotGraph) -> Result<(), MountError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        if !self.is_mounted() {
            return Err(MountError::NotMounted);
        }
        let ids = self.slot_ids();
        let active = graph.active();
        if !active.ends_with(&ids) {
            return Err(if ids.iter().any(|id| active.contains(id)) {
                MountError::NotSuffix
            } else {
                MountError::NotMounted
            });
        }
        let start = active.len() - ids.len();
        graph.truncate_active(start);
        for entry in &mut self.entries {
            entry.mounted = false;
        }
        Ok(())
    }
}

/// Run the decode phase of several sets on scoped worker threads.
///
/// Every set must be `Scanned`; otherwise nothing is decoded.
pub fn decode_parallel(sets: &mut [TextureSet], decoder: &TextureDecoder) -> Result<(), LoadPhaseError> {
    for set in sets.iter() {
        set.expect_phase("load", &[LoadPhase::Scanned], LoadPhase::Scanned)?;
    }
    let results = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = sets
            .iter_mut()
            .map(|set| s.spawn(move |_| set.load(decoder)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| LoadPhaseError::DecodePanicked))
            .collect::<Vec<_>>()
    })
    .map_err(|_| LoadPhaseError::DecodePanicked)?;

    for result in results {
        result??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use crate::settings::TextureSettings;
    use crate::texture_importer::testing::MemoryDecoder;
    use std::sync::Arc;

    fn setup(mem: MemoryDecoder) -> (SlotGraph, TextureRegistry<HeadlessDevice>, Arc<MemoryDecoder>) {
        let mem = Arc::new(mem.with_solid("packages/textures/notexture.png", 1, 1, &[255, 0, 255]));
        let reg = TextureRegistry::new(HeadlessDevice::new(), mem.clone(), TextureSettings::default());
        (SlotGraph::new(), reg, mem)
    }

    fn slot(diffuse: &str, normal: Option<&str>) -> SlotDescriptor {
        SlotDescriptor {
            diffuse: Some(diffuse.into()),
            normal: normal.map(Into::into),
            ..Default::default()
        }
    }

    fn run_phases(set: &mut TextureSet, graph: &mut SlotGraph, reg: &mut TextureRegistry<HeadlessDevice>) {
        set.checkload(graph, reg).unwrap();
        let decoder = reg.decoder().clone();
        set.load(&decoder).unwrap();
        set.registerload(graph, reg).unwrap();
    }

    #[test]
    fn test_three_phases_fill_loadmask() {
        let mem = MemoryDecoder::new()
            .with_solid("d.png", 2, 2, &[1, 2, 3])
            .with_solid("n.png", 2, 2, &[128, 128, 255])
            .with_solid("e.png", 2, 2, &[9, 9, 9]);
        let (mut graph, mut reg, _) = setup(mem);
        let mut set = TextureSet::new();
        set.add_slot(&mut graph, &slot("d.png", Some("n.png")), "");
        set.add_slot(&mut graph, &slot("e.png", None), "");

        run_phases(&mut set, &mut graph, &mut reg);
        assert_eq!(set.phase(), LoadPhase::Committed);
        for entry in set.entries() {
            let s = graph.slot(entry.slot).unwrap();
            assert_eq!(entry.loadmask, s.texmask);
            assert!(s.loaded);
            assert!(s.sts.iter().all(|t| t.t.is_some() && t.t != Some(reg.missing())));
        }
        assert!(reg.get("n.png").is_some());
    }

    #[test]
    fn test_checkload_uses_registry() {
        let mem = MemoryDecoder::new()
            .with_solid("d.png", 2, 2, &[1, 2, 3])
            .with_solid("n.png", 2, 2, &[1, 2, 3]);
        let (mut graph, mut reg, mem) = setup(mem);
        let d = reg.load("d.png", &LoadOptions::default());

        let mut set = TextureSet::new();
        let s = set.add_slot(&mut graph, &slot("d.png", Some("n.png")), "").unwrap();
        set.checkload(&mut graph, &reg).unwrap();
        assert_eq!(set.pending(), 1);
        assert_eq!(set.entries()[0].loadmask, RoleMask::DIFFUSE);
        assert_eq!(graph.slot(s).unwrap().sts[0].t, Some(d));

        let before = mem.decode_count();
        set.load(reg.decoder()).unwrap();
        assert_eq!(mem.decode_count(), before + 1);
    }

    #[test]
    fn test_phases_out_of_order() {
        let (mut graph, mut reg, _) = setup(MemoryDecoder::new());
        let mut set = TextureSet::new();
        set.add_slot(&mut graph, &slot("d.png", None), "");
        let decoder = reg.decoder().clone();

        assert!(matches!(
            set.load(&decoder),
            Err(LoadPhaseError::OutOfOrder { found: LoadPhase::Empty, .. })
        ));
        assert!(set.registerload(&mut graph, &mut reg).is_err());
        assert_eq!(set.phase(), LoadPhase::Empty);

        set.checkload(&mut graph, &reg).unwrap();
        assert!(set.checkload(&mut graph, &reg).is_err());
        assert!(set.registerload(&mut graph, &mut reg).is_err());
        assert_eq!(set.phase(), LoadPhase::Scanned);
        assert_eq!(set.pending(), 1);
    }

    #[test]
    fn test_failed_decode_gets_sentinel() {
        let (mut graph, mut reg, _) = setup(MemoryDecoder::new().with_solid("d.png", 1, 1, &[1, 2, 3]));
        let mut set = TextureSet::new();
        let s = set.add_slot(&mut graph, &slot("d.png", Some("gone_nm.png")), "").unwrap();
        run_phases(&mut set, &mut graph, &mut reg);

        let slot = graph.slot(s).unwrap();
        assert_eq!(set.entries()[0].loadmask, RoleMask::DIFFUSE);
        assert_eq!(slot.sts[1].t, Some(reg.missing()));
        assert!(!slot.loaded);
        assert!(reg.get("gone_nm.png").is_none());
    }

    #[test]
    fn test_shared_texture_decoded_once() {
        let (mut graph, mut reg, mem) = setup(MemoryDecoder::new().with_solid("d.png", 1, 1, &[1, 2, 3]));
        let mut set = TextureSet::new();
        let a = set.add_slot(&mut graph, &slot("d.png", None), "").unwrap();
        let b = set.add_slot(&mut graph, &slot("./d.png", None), "").unwrap();

        let before = mem.decode_count();
        run_phases(&mut set, &mut graph, &mut reg);
        assert_eq!(mem.decode_count(), before + 1);
        assert_eq!(graph.slot(a).unwrap().sts[0].t, graph.slot(b).unwrap().sts[0].t);
    }

    #[test]
    fn test_name_shared_across_roles_is_one_texture() {
        let mem = MemoryDecoder::new()
            .with_solid("d.png", 1, 1, &[1, 2, 3])
            .with_solid("e.png", 1, 1, &[4, 5, 6]);
        let (mut graph, mut reg, mem) = setup(mem);
        let mut set = TextureSet::new();
        let a = set.add_slot(&mut graph, &slot("d.png", None), "").unwrap();
        let b = set.add_slot(&mut graph, &slot("e.png", Some("d.png")), "").unwrap();

        set.checkload(&mut graph, &reg).unwrap();
        assert_eq!(set.pending(), 2);
        let before = mem.decode_count();
        set.load(&reg.decoder().clone()).unwrap();
        set.registerload(&mut graph, &mut reg).unwrap();
        assert_eq!(mem.decode_count(), before + 2);

        let id = reg.get("d.png");
        assert!(id.is_some());
        assert_eq!(graph.slot(a).unwrap().sts[0].t, id);
        assert_eq!(graph.slot(b).unwrap().sts[1].t, id);
    }

    #[test]
    fn test_commit_reuses_row_registered_meanwhile() {
        let (mut graph, mut reg, _) = setup(MemoryDecoder::new().with_solid("d.png", 1, 1, &[1, 2, 3]));
        let mut set = TextureSet::new();
        let s = set.add_slot(&mut graph, &slot("d.png", None), "").unwrap();
        set.checkload(&mut graph, &reg).unwrap();
        set.load(&reg.decoder().clone()).unwrap();

        let id = reg.load("d.png", &LoadOptions::default());
        let live = reg.device().live_textures();
        set.registerload(&mut graph, &mut reg).unwrap();
        assert_eq!(graph.slot(s).unwrap().sts[0].t, Some(id));
        assert_eq!(reg.device().live_textures(), live);
    }

    #[test]
    fn test_mount_unmount_restores_active() {
        let (mut graph, _, _) = setup(MemoryDecoder::new());
        let legacy = graph.define_texture("c", "base.png", 0, 0, 0, 1.0).unwrap();

        let mut first = TextureSet::new();
        first.add_slot(&mut graph, &slot("a.png", None), "");
        first.add_slot(&mut graph, &slot("b.png", None), "");
        let mut second = TextureSet::new();
        second.add_slot(&mut graph, &slot("c.png", None), "");

        first.mount(&mut graph, false).unwrap();
        second.mount(&mut graph, false).unwrap();
        assert_eq!(graph.active().len(), 4);

        assert!(matches!(first.unmount(&mut graph), Err(MountError::NotSuffix)));
        assert_eq!(graph.active().len(), 4);

        second.unmount(&mut graph).unwrap();
        first.unmount(&mut graph).unwrap();
        assert_eq!(graph.active(), &[legacy]);
        assert!(matches!(first.unmount(&mut graph), Err(MountError::NotMounted)));

        // mounted variants survive the round trip
        first.mount(&mut graph, true).unwrap();
        assert_eq!(graph.active(), first.slot_ids().as_slice());
        for id in first.slot_ids() {
            assert!(graph.slot(id).unwrap().variants.is_some());
        }
    }

    #[test]
    fn test_mount_twice_is_refused() {
        let (mut graph, _, _) = setup(MemoryDecoder::new());
        let mut set = TextureSet::new();
        set.add_slot(&mut graph, &slot("a.png", None), "");
        set.add_slot(&mut graph, &slot("b.png", None), "");

        set.mount(&mut graph, false).unwrap();
        assert!(matches!(set.mount(&mut graph, false), Err(MountError::AlreadyMounted)));
        assert!(matches!(set.mount(&mut graph, true), Err(MountError::AlreadyMounted)));
        assert_eq!(graph.active(), set.slot_ids().as_slice());

        set.unmount(&mut graph).unwrap();
        set.mount(&mut graph, false).unwrap();
        assert_eq!(graph.active().len(), 2);
    }

    #[test]
    fn test_slot_values_and_empty_slots() {
        let (mut graph, _, _) = setup(MemoryDecoder::new());
        let mut set = TextureSet::new();
        let desc = SlotDescriptor {
            diffuse: Some("sub/d.png".into()),
            normal: Some("<normal:2>sub/n.png".into()),
            glow: Some(String::new()),
            shader: Some("bumpworld".into()),
            scale: Some(0.0),
            rotation: Some(7),
            xoffset: Some(-1),
            yoffset: Some(16),
            ..Default::default()
        };
        let s = set.add_slot(&mut graph, &desc, "sets/stone").unwrap();
        assert!(set.add_slot(&mut graph, &SlotDescriptor::default(), "").is_none());
        assert_eq!(set.len(), 1);

        let slot = graph.slot(s).unwrap();
        assert_eq!(slot.sts[0].name, "sets/stone/sub/d.png");
        assert_eq!(slot.sts[1].name, "<normal:2>sets/stone/sub/n.png");
        assert_eq!(slot.texmask, RoleMask::DIFFUSE | RoleMask::NORMAL);
        assert_eq!(slot.shader.as_deref(), Some("bumpworld"));

        let v = graph.vslot(slot.variants.unwrap()).unwrap();
        assert_eq!((v.rotation, v.xoffset, v.yoffset, v.scale), (5, 0, 16, 1.0));
    }

    #[test]
    fn test_descriptor_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("stone")).unwrap();
        std::fs::write(
            root.join("stone/slot.json"),
            r#"{ "diffuse": "tex/d.png", "normal": "n.png", "scale": 2.0 }"#,
        )
        .unwrap();
        std::fs::write(
            root.join("set.json"),
            r#"{ "textures": [
                "stone/slot.json",
                { "diffuse": "inline.png", "rotation": 1 },
                { "shader": "stdworld" },
                "missing/slot.json"
            ] }"#,
        )
        .unwrap();

        let mut graph = SlotGraph::new();
        let set = TextureSet::from_file(root.join("set.json"), &mut graph).unwrap();
        assert_eq!(set.len(), 2);

        let root_str = root.to_string_lossy().replace('\\', "/");
        let first = graph.slot(set.entries()[0].slot).unwrap();
        assert_eq!(first.sts[0].name, normalize_name(&format!("{}/stone/tex/d.png", root_str)));
        assert_eq!(first.sts[1].name, "n.png");
        let v = graph.vslot(first.variants.unwrap()).unwrap();
        assert_eq!(v.scale, 2.0);

        let second = graph.slot(set.entries()[1].slot).unwrap();
        assert_eq!(second.sts[0].name, "inline.png");

        assert!(matches!(
            TextureSet::from_file(root.join("nope.json"), &mut graph),
            Err(DescriptorError::Io { .. })
        ));
    }

    #[test]
    fn test_decode_parallel() {
        let mem = MemoryDecoder::new()
            .with_solid("a.png", 2, 2, &[1, 2, 3])
            .with_solid("b.png", 2, 2, &[4, 5, 6]);
        let (mut graph, mut reg, _) = setup(mem);
        let mut sets = vec![TextureSet::new(), TextureSet::new()];
        sets[0].add_slot(&mut graph, &slot("a.png", None), "");
        sets[1].add_slot(&mut graph, &slot("b.png", None), "");

        assert!(decode_parallel(&mut sets, reg.decoder()).is_err());
        for set in &mut sets {
            set.checkload(&mut graph, &reg).unwrap();
        }
        let decoder = reg.decoder().clone();
        decode_parallel(&mut sets, &decoder).unwrap();
        for set in &mut sets {
            assert_eq!(set.phase(), LoadPhase::Decoded);
            set.registerload(&mut graph, &mut reg).unwrap();
            let e = &set.entries()[0];
            assert_eq!(e.loadmask, RoleMask::DIFFUSE);
        }
    }
}
