// src/materials/vslot.rs
//! Render variants of a slot.

use bitflags::bitflags;
use glam::{Vec2, Vec3};

use crate::materials::SlotId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VSlotId(pub u32);

impl VSlotId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Parameter groups a variant has customized.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct VSlotChanges: u8 {
        const SHPARAM  = 1 << 0;
        const SCALE    = 1 << 1;
        const ROTATION = 1 << 2;
        const OFFSET   = 1 << 3;
        const SCROLL   = 1 << 4;
        const LAYER    = 1 << 5;
        const ALPHA    = 1 << 6;
        const COLOR    = 1 << 7;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShaderParam {
    pub name: String,
    pub value: [f32; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub struct VSlot {
    pub index: VSlotId,
    /// `None` once the owning slot has been retired.
    pub owner: Option<SlotId>,
    pub next: Option<VSlotId>,
    pub changed: VSlotChanges,
    pub linked: bool,

    pub params: Vec<ShaderParam>,
    pub scale: f32,
    pub rotation: i32,
    pub xoffset: i32,
    pub yoffset: i32,
    pub scroll: Vec2,
    pub layer: i32,
    pub alpha_front: f32,
    pub alpha_back: f32,
    pub color_scale: Vec3,
}

impl VSlot {
    pub fn new(index: VSlotId, owner: Option<SlotId>) -> Self {
        Self {
            index,
            owner,
            next: None,
            changed: VSlotChanges::empty(),
            linked: false,
            params: Vec::new(),
            scale: 1.0,
            rotation: 0,
            xoffset: 0,
            yoffset: 0,
            scroll: Vec2::ZERO,
            layer: 0,
            alpha_front: 0.5,
            alpha_back: 0.0,
            color_scale: Vec3::ONE,
        }
    }

    /// Restore every parameter group to its default. Linkage is untouched.
    pub fn reset(&mut self) {
        self.params.clear();
        self.scale = 1.0;
        self.rotation = 0;
        self.xoffset = 0;
        self.yoffset = 0;
        self.scroll = Vec2::ZERO;
        self.layer = 0;
        self.alpha_front = 0.5;
        self.alpha_back = 0.0;
        self.color_scale = Vec3::ONE;
    }

    /// Copy the groups in `mask` from `src`.
    pub fn copy_groups(&mut self, src: &VSlot, mask: VSlotChanges) {
        if mask.contains(VSlotChanges::SHPARAM) {
            self.params.clone_from(&src.params);
        }
        if mask.contains(VSlotChanges::SCALE) {
            self.scale = src.scale;
        }
        if mask.contains(VSlotChanges::ROTATION) {
            self.rotation = src.rotation;
        }
        if mask.contains(VSlotChanges::OFFSET) {
            self.xoffset = src.xoffset;
            self.yoffset = src.yoffset;
        }
        if mask.contains(VSlotChanges::SCROLL) {
            self.scroll = src.scroll;
        }
        if mask.contains(VSlotChanges::LAYER) {
            self.layer = src.layer;
        }
        if mask.contains(VSlotChanges::ALPHA) {
            self.alpha_front = src.alpha_front;
            self.alpha_back = src.alpha_back;
        }
        if mask.contains(VSlotChanges::COLOR) {
            self.color_scale = src.color_scale;
        }
    }

    pub fn is_orphaned(&self) -> bool {
        self.owner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_groups_only_masked() {
        let mut src = VSlot::new(VSlotId(0), None);
        src.scale = 2.0;
        src.rotation = 3;
        src.color_scale = Vec3::new(0.5, 0.5, 0.5);

        let mut dst = VSlot::new(VSlotId(1), None);
        dst.copy_groups(&src, VSlotChanges::SCALE | VSlotChanges::COLOR);
        assert_eq!(dst.scale, 2.0);
        assert_eq!(dst.rotation, 0);
        assert_eq!(dst.color_scale, Vec3::splat(0.5));
    }

    #[test]
    fn test_reset_keeps_links() {
        let mut vs = VSlot::new(VSlotId(4), Some(SlotId(1)));
        vs.next = Some(VSlotId(7));
        vs.scale = 3.0;
        vs.alpha_front = 1.0;
        vs.reset();
        assert_eq!(vs.scale, 1.0);
        assert_eq!(vs.alpha_front, 0.5);
        assert_eq!(vs.next, Some(VSlotId(7)));
        assert_eq!(vs.owner, Some(SlotId(1)));
    }
}
