// src/materials/graph.rs
//
// Slot / variant arena.
//
// Slots and variants are never freed: ids stay valid for the lifetime of the
// graph, retired slots simply lose their chain and the chain's variants become
// orphans (owner = None). Orphaned variants that were never customized are
// recycled by `empty_variant`, trailing ones are popped by `reset`.
//
// The `active` list is the ordered set of slots visible to the editor and the
// renderer. Texture sets push their slots onto it when mounted.

use log::{debug, warn};

use crate::materials::{
    LayerMask, Slot, SlotId, Tex, TexRole, VSlot, VSlotChanges, VSlotId, MAX_SLOT_TEXTURES,
};
use crate::paths::normalize_name;

/// Upper bound on active slots.
pub const MAX_SLOTS: usize = 0x10000;

const AUTOGRASS_PREFIX: &str = "<ffskip><premul>";

#[derive(Debug, Default)]
pub struct SlotGraph {
    slots: Vec<Slot>,
    vslots: Vec<VSlot>,
    active: Vec<SlotId>,
}

impl SlotGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Section 1 — Arena access
    // ═══════════════════════════════════════════════════════════════════════

    /// Allocate a fresh, unmounted slot.
    pub fn new_slot(&mut self) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(Slot::new(id));
        id
    }

    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(id.index())
    }

    pub fn slot_mut(&mut self, id: SlotId) -> Option<&mut Slot> {
        self.slots.get_mut(id.index())
    }

    pub fn vslot(&self, id: VSlotId) -> Option<&VSlot> {
        self.vslots.get(id.index())
    }

    pub fn vslot_mut(&mut self, id: VSlotId) -> Option<&mut VSlot> {
        self.vslots.get_mut(id.index())
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn vslot_count(&self) -> usize {
        self.vslots.len()
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// Append a texture to `slot`. Returns its index in the slot's list.
    pub fn add_tex(&mut self, slot: SlotId, role: TexRole, name: impl Into<String>) -> Option<usize> {
        let s = self.slots.get_mut(slot.index())?;
        if s.sts.len() >= MAX_SLOT_TEXTURES {
            warn!("too many textures in slot {}", slot.0);
        }
        s.loaded = false;
        s.texmask |= role.bit();
        s.sts.push(Tex::new(role, name));
        Some(s.sts.len() - 1)
    }

    /// Variant ids of `slot`, head first.
    pub fn variants_of(&self, slot: SlotId) -> Vec<VSlotId> {
        let mut out = Vec::new();
        let mut cur = self.slot(slot).and_then(|s| s.variants);
        while let Some(id) = cur {
            if out.contains(&id) {
                break;
            }
            out.push(id);
            cur = self.vslots.get(id.index()).and_then(|v| v.next);
        }
        out
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Section 2 — Active list
    // ═══════════════════════════════════════════════════════════════════════

    pub fn active(&self) -> &[SlotId] {
        &self.active
    }

    pub fn last_active(&self) -> Option<SlotId> {
        self.active.last().copied()
    }

    pub fn position(&self, slot: SlotId) -> Option<usize> {
        self.active.iter().position(|&s| s == slot)
    }

    /// Push `ids` onto the active list, replacing it when `initial`.
    pub fn mount_slots(&mut self, ids: &[SlotId], initial: bool) {
        if initial {
            self.active.clear();
        }
        self.active.extend_from_slice(ids);
    }

    /// Drop active entries from `len` on without touching their variants.
    pub fn truncate_active(&mut self, len: usize) {
        self.active.truncate(len);
    }

    /// Retire every active slot from `limit` on.
    ///
    /// Their variants are orphaned; trailing orphans nobody customized are
    /// popped off the variant table.
    pub fn reset(&mut self, limit: usize) {
        let limit = limit.min(self.active.len());
        let removed: Vec<SlotId> = self.active.drain(limit..).collect();
        for id in &removed {
            let chain = self.variants_of(*id);
            if let Some(slot) = self.slots.get_mut(id.index()) {
                slot.variants = None;
                slot.loaded = false;
            }
            for vs in chain {
                self.vslots[vs.index()].owner = None;
            }
        }

        let before = self.vslots.len();
        while let Some(last) = self.vslots.last() {
            if last.owner.is_some() || !last.changed.is_empty() {
                break;
            }
            self.vslots.pop();
        }
        let len = self.vslots.len();
        if len != before {
            for vs in &mut self.vslots {
                if vs.next.is_some_and(|n| n.index() >= len) {
                    vs.next = None;
                }
            }
        }
        debug!(
            "slot reset to {}: retired {} slots, popped {} variants",
            limit,
            removed.len(),
            before - len
        );
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Section 3 — Variants
    // ═══════════════════════════════════════════════════════════════════════

    /// One past the highest chain head of any slot, 0 when no slot owns one.
    pub fn high_water_mark(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.variants)
            .map(|v| v.index() + 1)
            .max()
            .unwrap_or(0)
    }

    /// A variant for `owner`: a recycled orphan above the high-water mark when
    /// one is unchanged, a new one otherwise. Either way it ends up on
    /// `owner`'s chain.
    pub fn empty_variant(&mut self, owner: SlotId) -> VSlotId {
        let mark = self.high_water_mark();
        let recycled = (mark..self.vslots.len())
            .find(|&i| self.vslots[i].owner.is_none() && self.vslots[i].changed.is_empty());

        match recycled {
            Some(i) => {
                let id = VSlotId(i as u32);
                self.reassign(owner, id);
                id
            }
            None => {
                let id = VSlotId(self.vslots.len() as u32);
                self.vslots.push(VSlot::new(id, Some(owner)));
                self.append_chain(owner, id);
                id
            }
        }
    }

    /// Detach `vs` from whatever precedes it and hand it, with its tail, to `owner`.
    fn reassign(&mut self, owner: SlotId, vs: VSlotId) {
        for v in &mut self.vslots {
            if v.next == Some(vs) {
                v.next = None;
            }
        }
        let mut cur = Some(vs);
        let mut seen = 0;
        while let Some(id) = cur {
            let v = &mut self.vslots[id.index()];
            v.owner = Some(owner);
            v.linked = false;
            cur = v.next;
            seen += 1;
            if seen > self.vslots.len() {
                break;
            }
        }
        self.append_chain(owner, vs);
    }

    fn append_chain(&mut self, owner: SlotId, vs: VSlotId) {
        match self.variants_of(owner).last() {
            Some(&tail) if tail != vs => self.vslots[tail.index()].next = Some(vs),
            Some(_) => {}
            None => {
                if let Some(slot) = self.slots.get_mut(owner.index()) {
                    slot.variants = Some(vs);
                }
            }
        }
    }

    /// Copy the `mask` groups of `root` into every later variant of its chain
    /// that has not customized them.
    pub fn propagate(&mut self, root: VSlotId, mask: VSlotChanges) {
        let Some(src) = self.vslots.get(root.index()).cloned() else {
            return;
        };
        let mut cur = src.next;
        let mut seen = 0;
        while let Some(id) = cur {
            let vs = &mut self.vslots[id.index()];
            let diff = mask & !vs.changed;
            if !diff.is_empty() {
                vs.copy_groups(&src, diff);
            }
            cur = vs.next;
            seen += 1;
            if seen > self.vslots.len() {
                break;
            }
        }
    }

    /// New variant of `src`'s slot carrying the groups `delta.changed` from
    /// `delta` and everything else from `src`.
    pub fn clone_variant(&mut self, src: VSlotId, delta: &VSlot) -> Option<VSlotId> {
        let base = self.vslots.get(src.index())?.clone();
        let id = VSlotId(self.vslots.len() as u32);
        let mut vs = VSlot::new(id, base.owner);
        vs.changed = base.changed | delta.changed;
        vs.copy_groups(&base, VSlotChanges::all() - delta.changed);
        vs.copy_groups(delta, delta.changed);
        self.vslots.push(vs);
        if let Some(owner) = base.owner {
            self.append_chain(owner, id);
        }
        Some(id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Section 4 — Legacy definition commands
    // ═══════════════════════════════════════════════════════════════════════

    /// `texture <role> <name> [rot xoff yoff scale]`.
    ///
    /// A diffuse starts a new active slot; every other role attaches to the
    /// last one and is ignored when there is none.
    pub fn define_texture(
        &mut self,
        code: &str,
        name: &str,
        rotation: i32,
        xoffset: i32,
        yoffset: i32,
        scale: f32,
    ) -> Option<SlotId> {
        if self.active.len() >= MAX_SLOTS {
            warn!("slot limit reached, ignoring texture {}", name);
            return None;
        }
        let Some(role) = TexRole::from_code(code) else {
            warn!("unknown texture role {:?} for {}", code, name);
            return None;
        };
        let slot = if role == TexRole::Diffuse {
            let id = self.new_slot();
            self.active.push(id);
            id
        } else {
            self.last_active()?
        };
        self.add_tex(slot, role, normalize_name(name));

        if role == TexRole::Diffuse {
            let vs = self.empty_variant(slot);
            let v = &mut self.vslots[vs.index()];
            v.reset();
            v.rotation = rotation.clamp(0, 5);
            v.xoffset = xoffset.max(0);
            v.yoffset = yoffset.max(0);
            v.scale = if scale <= 0.0 { 1.0 } else { scale };
            self.propagate(vs, VSlotChanges::all());
        }
        Some(slot)
    }

    /// Edit the head variant of the last active slot and push `mask` down its chain.
    fn edit_last(&mut self, mask: VSlotChanges, edit: impl FnOnce(&mut VSlot, usize)) -> bool {
        let count = self.active.len();
        let Some(head) = self.last_active().and_then(|s| self.slots[s.index()].variants) else {
            return false;
        };
        edit(&mut self.vslots[head.index()], count);
        self.propagate(head, mask);
        true
    }

    /// Scroll speeds are given in thousandths.
    pub fn set_scroll(&mut self, s: f32, t: f32) -> bool {
        self.edit_last(VSlotChanges::SCROLL, |v, _| {
            v.scroll = glam::Vec2::new(s / 1000.0, t / 1000.0);
        })
    }

    pub fn set_offset(&mut self, x: i32, y: i32) -> bool {
        self.edit_last(VSlotChanges::OFFSET, |v, _| {
            v.xoffset = x.max(0);
            v.yoffset = y.max(0);
        })
    }

    pub fn set_rotation(&mut self, rotation: i32) -> bool {
        self.edit_last(VSlotChanges::ROTATION, |v, _| v.rotation = rotation.clamp(0, 5))
    }

    pub fn set_scale(&mut self, scale: f32) -> bool {
        self.edit_last(VSlotChanges::SCALE, |v, _| {
            v.scale = if scale <= 0.0 { 1.0 } else { scale };
        })
    }

    /// A negative layer counts back from the last slot.
    pub fn set_layer(&mut self, layer: i32, mask_name: &str, mode: i32, scale: f32) -> bool {
        let applied = self.edit_last(VSlotChanges::LAYER, |v, count| {
            v.layer = if layer < 0 {
                (count as i32 - 1 + layer).max(0)
            } else {
                layer
            };
        });
        if applied {
            if let Some(slot) = self.last_active() {
                self.slots[slot.index()].layer_mask = Some(LayerMask {
                    name: (!mask_name.is_empty()).then(|| normalize_name(mask_name)),
                    mode,
                    scale: if scale <= 0.0 { 1.0 } else { scale },
                });
            }
        }
        applied
    }

    pub fn set_alpha(&mut self, front: f32, back: f32) -> bool {
        self.edit_last(VSlotChanges::ALPHA, |v, _| {
            v.alpha_front = front.clamp(0.0, 1.0);
            v.alpha_back = back.clamp(0.0, 1.0);
        })
    }

    pub fn set_color(&mut self, r: f32, g: f32, b: f32) -> bool {
        self.edit_last(VSlotChanges::COLOR, |v, _| {
            v.color_scale = glam::Vec3::new(r, g, b).clamp(glam::Vec3::ZERO, glam::Vec3::ONE);
        })
    }

    /// Grass texture drawn on top of the last slot; an empty name clears it.
    pub fn set_autograss(&mut self, name: &str) -> bool {
        let Some(slot) = self.last_active() else {
            return false;
        };
        self.slots[slot.index()].autograss =
            (!name.is_empty()).then(|| format!("{}{}", AUTOGRASS_PREFIX, normalize_name(name)));
        true
    }

    pub fn set_ffenv(&mut self, ffenv: i32) -> bool {
        let Some(slot) = self.last_active() else {
            return false;
        };
        self.slots[slot.index()].ffenv = ffenv > 0;
        true
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Section 5 — Cleanup
    // ═══════════════════════════════════════════════════════════════════════

    /// Forget every resolved texture and mark all slots unloaded.
    pub fn cleanup(&mut self) {
        for slot in &mut self.slots {
            slot.loaded = false;
            for tex in &mut slot.sts {
                tex.t = None;
                tex.combined = None;
            }
        }
    }
}
