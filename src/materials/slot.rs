// src/materials/slot.rs
//! Slot records and texture roles.

use bitflags::bitflags;

use crate::materials::VSlotId;
use crate::texture::TextureId;

/// More textures than this in one slot is allowed but logged.
pub const MAX_SLOT_TEXTURES: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl SlotId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

/// What a texture inside a slot is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TexRole {
    Diffuse = 0,
    Unknown = 1,
    Decal = 2,
    Normal = 3,
    Glow = 4,
    Spec = 5,
    Depth = 6,
    Envmap = 7,
}

impl TexRole {
    pub const COUNT: usize = 8;

    pub const ALL: [TexRole; Self::COUNT] = [
        TexRole::Diffuse,
        TexRole::Unknown,
        TexRole::Decal,
        TexRole::Normal,
        TexRole::Glow,
        TexRole::Spec,
        TexRole::Depth,
        TexRole::Envmap,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<TexRole> {
        Self::ALL.get(i).copied()
    }

    /// Key used in texture-set descriptor files.
    pub fn key(self) -> &'static str {
        match self {
            TexRole::Diffuse => "diffuse",
            TexRole::Unknown => "other",
            TexRole::Decal => "decal",
            TexRole::Normal => "normal",
            TexRole::Glow => "glow",
            TexRole::Spec => "spec",
            TexRole::Depth => "depth",
            TexRole::Envmap => "envmap",
        }
    }

    /// One-letter code of the legacy `texture` command.
    pub fn code(self) -> char {
        match self {
            TexRole::Diffuse => 'c',
            TexRole::Unknown => 'u',
            TexRole::Decal => 'd',
            TexRole::Normal => 'n',
            TexRole::Glow => 'g',
            TexRole::Spec => 's',
            TexRole::Depth => 'z',
            TexRole::Envmap => 'e',
        }
    }

    /// Accepts a letter code or a numeric role index.
    pub fn from_code(code: &str) -> Option<TexRole> {
        if let Some(role) = Self::ALL.iter().find(|r| {
            let mut buf = [0u8; 4];
            r.code().encode_utf8(&mut buf) == code
        }) {
            return Some(*role);
        }
        code.trim().parse::<usize>().ok().and_then(Self::from_index)
    }

    #[inline]
    pub fn bit(self) -> RoleMask {
        RoleMask::from_bits_truncate(1 << self as u8)
    }
}

bitflags! {
    /// Set of roles present in a slot.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RoleMask: u8 {
        const DIFFUSE = 1 << 0;
        const UNKNOWN = 1 << 1;
        const DECAL   = 1 << 2;
        const NORMAL  = 1 << 3;
        const GLOW    = 1 << 4;
        const SPEC    = 1 << 5;
        const DEPTH   = 1 << 6;
        const ENVMAP  = 1 << 7;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Slot
// ─────────────────────────────────────────────────────────────────────────────

/// One texture of a slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Tex {
    pub role: TexRole,
    pub name: String,
    /// Resolved registry entry, filled in lazily.
    pub t: Option<TextureId>,
    /// Index of the `Tex` this one is packed into, if any.
    pub combined: Option<usize>,
}

impl Tex {
    pub fn new(role: TexRole, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            t: None,
            combined: None,
        }
    }
}

/// Blend-layer mask set by `texlayer`.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerMask {
    pub name: Option<String>,
    pub mode: i32,
    pub scale: f32,
}

#[derive(Clone, Debug)]
pub struct Slot {
    pub index: SlotId,
    pub sts: Vec<Tex>,
    pub texmask: RoleMask,
    pub loaded: bool,
    /// Head of this slot's variant chain.
    pub variants: Option<VSlotId>,
    pub shader: Option<String>,
    pub layer_mask: Option<LayerMask>,
    pub autograss: Option<String>,
    pub ffenv: bool,
}

impl Slot {
    pub fn new(index: SlotId) -> Self {
        Self {
            index,
            sts: Vec::new(),
            texmask: RoleMask::empty(),
            loaded: false,
            variants: None,
            shader: None,
            layer_mask: None,
            autograss: None,
            ffenv: false,
        }
    }

    /// First texture with the given role.
    pub fn find(&self, role: TexRole) -> Option<&Tex> {
        self.sts.iter().find(|t| t.role == role)
    }

    pub fn diffuse(&self) -> Option<&Tex> {
        self.find(TexRole::Diffuse)
    }

    pub fn has_role(&self, role: TexRole) -> bool {
        self.texmask.contains(role.bit())
    }

    pub fn is_empty(&self) -> bool {
        self.sts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_codes() {
        assert_eq!(TexRole::from_code("c"), Some(TexRole::Diffuse));
        assert_eq!(TexRole::from_code("z"), Some(TexRole::Depth));
        assert_eq!(TexRole::from_code("3"), Some(TexRole::Normal));
        assert_eq!(TexRole::from_code("9"), None);
        assert_eq!(TexRole::from_code("x"), None);
        for role in TexRole::ALL {
            assert_eq!(TexRole::from_index(role.index()), Some(role));
        }
    }

    #[test]
    fn test_role_bits() {
        assert_eq!(TexRole::Diffuse.bit(), RoleMask::DIFFUSE);
        assert_eq!(TexRole::Envmap.bit(), RoleMask::ENVMAP);
        assert_eq!(TexRole::Unknown.key(), "other");
    }
}
