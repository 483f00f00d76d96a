// src/texcmd.rs
//! Texture command strings.
//!
//! A texture name may carry a chain of bracketed commands in front of the file
//! name, e.g. `<mad:0.5/0.1><rotate:1>stone.png`. The chain is tokenized once
//! into a typed [`TexCommand`] list; the decode passes only ever see the enum.
//!
//! Vector arguments separate vectors with `/` and components with `,`, so a
//! full multiply-add reads `<mad:0.5,0.5,0.5/0,0,0.1>`. Names written with the
//! opposite convention (`,` between vectors) do not round-trip: `<mad:2/1,1,1>`
//! is a broadcast multiplier of 2 and an add of `(1, 1, 1)`.

use glam::Vec3;

/// Grey-scale weights used by `colorify` when none are given.
pub const DEFAULT_LUMA_WEIGHTS: Vec3 = Vec3::new(0.21, 0.72, 0.07);

const MAX_ARGS: usize = 4;
const MAX_THUMBNAIL: i32 = 1 << 12;

/// One parsed command.
#[derive(Debug, Clone, PartialEq)]
pub enum TexCommand {
    /// `<mad:mul/add>` per-channel multiply-add.
    Mad { mul: Vec3, add: Vec3 },
    Colorify { color: Vec3, weights: Vec3 },
    ColorMask { c1: Vec3, c2: Vec3 },
    /// Fixed-function glow/envmap alpha packing.
    FfMask { glow: f32, envmap: f32 },
    Normal { emphasis: i32 },
    Dup { src: i32, dst: i32 },
    Decal,
    Offset { x: i32, y: i32 },
    Rotate { turns: i32 },
    Reorient { flip_x: bool, flip_y: bool, swap_xy: bool },
    /// Per destination channel, the source channel to copy (`None` = keep).
    Mix { channels: [Option<usize>; 4] },
    Grey,
    Blur { emphasis: u32, repeat: u32 },
    Premul,
    AlphaGradient { x2: f32, y2: f32, x1: f32, y1: f32 },
    /// `<compress>`; `scale: None` means the configured default.
    Compress { scale: Option<u32> },
    /// `<dds>` both selects the block container and acts like `compress`.
    Dds { scale: Option<u32> },
    NoCompress,
    Thumbnail { w: u32, h: u32 },
    FfSkip,
    /// `<noff>`: nothing to load on the fixed-function path.
    NoFf,
    Stub,
    Unknown(String),
}

/// A texture name split into its command chain and file part.
#[derive(Debug, Clone, PartialEq)]
pub struct TexName {
    pub commands: Vec<TexCommand>,
    pub file: String,
}

impl TexName {
    /// Tokenize `name`. Returns `None` for a chain with no closing `>` at all.
    pub fn parse(name: &str) -> Option<TexName> {
        if !name.starts_with('<') {
            return Some(TexName {
                commands: Vec::new(),
                file: name.to_string(),
            });
        }
        let file_start = name.rfind('>')? + 1;

        let mut commands = Vec::new();
        let mut rest = Some(name);
        while let Some(cur) = rest {
            let body = &cur[1..];
            let Some(end) = body.find('>') else { break };
            rest = body.find('<').map(|i| &body[i..]);

            let inner = &body[..end];
            let name_len = inner.find([':', ',', '<']).unwrap_or(inner.len());
            let args = match inner.find(':') {
                Some(i) => &inner[i + 1..],
                None => "",
            };
            commands.push(TexCommand::from_parts(&inner[..name_len], args));
        }

        Some(TexName {
            commands,
            file: name[file_start..].to_string(),
        })
    }
}

impl TexCommand {
    /// Build a typed command from its name and raw argument text.
    pub fn from_parts(cmd: &str, raw_args: &str) -> TexCommand {
        let mut args = [""; MAX_ARGS];
        if !raw_args.is_empty() {
            for (slot, arg) in args.iter_mut().zip(raw_args.split(',')) {
                *slot = arg;
            }
        }
        let int = |i: usize| parse_int(args[i]);
        let float = |i: usize| parse_float(args[i]);
        let compress_scale = || match int(0) {
            s if s > 0 => Some(s as u32),
            _ => None,
        };

        match cmd {
            "mad" => {
                let v = parse_vectors(raw_args);
                TexCommand::Mad {
                    mul: vec_or(&v, 0, Vec3::ZERO),
                    add: vec_or(&v, 1, Vec3::ZERO),
                }
            }
            "colorify" => {
                let v = parse_vectors(raw_args);
                let weights = vec_or(&v, 1, Vec3::ZERO);
                TexCommand::Colorify {
                    color: vec_or(&v, 0, Vec3::ZERO),
                    weights: if weights == Vec3::ZERO {
                        DEFAULT_LUMA_WEIGHTS
                    } else {
                        weights
                    },
                }
            }
            "colormask" => {
                let v = parse_vectors(raw_args);
                TexCommand::ColorMask {
                    c1: vec_or(&v, 0, Vec3::ZERO),
                    c2: vec_or(&v, 1, Vec3::ONE),
                }
            }
            "ffmask" => TexCommand::FfMask {
                glow: float(0),
                envmap: float(1),
            },
            "normal" => TexCommand::Normal {
                emphasis: match int(0) {
                    e if e > 0 => e,
                    _ => 3,
                },
            },
            "dup" => TexCommand::Dup { src: int(0), dst: int(1) },
            "decal" => TexCommand::Decal,
            "offset" => TexCommand::Offset { x: int(0), y: int(1) },
            "rotate" => TexCommand::Rotate { turns: int(0) },
            "reorient" => TexCommand::Reorient {
                flip_x: int(0) > 0,
                flip_y: int(1) > 0,
                swap_xy: int(2) > 0,
            },
            "mix" => {
                let mut channels = [None; 4];
                for (i, ch) in channels.iter_mut().enumerate() {
                    if !args[i].is_empty() {
                        let c = int(i);
                        *ch = if c >= 0 { Some(c as usize) } else { None };
                    }
                }
                TexCommand::Mix { channels }
            }
            "grey" => TexCommand::Grey,
            "blur" => TexCommand::Blur {
                emphasis: int(0).clamp(1, 2) as u32,
                repeat: int(1).max(1) as u32,
            },
            "premul" => TexCommand::Premul,
            "agrad" => TexCommand::AlphaGradient {
                x2: float(0),
                y2: float(1),
                x1: float(2),
                y1: float(3),
            },
            "compress" => TexCommand::Compress { scale: compress_scale() },
            "dds" => TexCommand::Dds { scale: compress_scale() },
            "nocompress" => TexCommand::NoCompress,
            "thumbnail" => {
                let mut w = int(0);
                if w <= 0 || w > MAX_THUMBNAIL {
                    w = 64;
                }
                let mut h = int(1);
                if h <= 0 || h > MAX_THUMBNAIL {
                    h = w;
                }
                TexCommand::Thumbnail { w: w as u32, h: h as u32 }
            }
            "ffskip" => TexCommand::FfSkip,
            "noff" => TexCommand::NoFf,
            "stub" => TexCommand::Stub,
            other => TexCommand::Unknown(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument parsing
// ─────────────────────────────────────────────────────────────────────────────

/// `"a,b,c/d,e,f"` → one vector per `/` group; a single component broadcasts.
/// Components are `,`-separated inside a group, never between groups.
pub fn parse_vectors(text: &str) -> Vec<Vec3> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    text.split('/')
        .map(|group| {
            let comps: Vec<f32> = group.split(',').map(parse_float).collect();
            match comps.as_slice() {
                [] => Vec3::ZERO,
                [v] => Vec3::splat(*v),
                [x, y] => Vec3::new(*x, *y, 0.0),
                [x, y, z, ..] => Vec3::new(*x, *y, *z),
            }
        })
        .collect()
}

fn vec_or(v: &[Vec3], i: usize, default: Vec3) -> Vec3 {
    v.get(i).copied().unwrap_or(default)
}

/// Length of the longest numeric-looking prefix of `s`.
fn numeric_prefix(s: &str, allow_float: bool) -> &str {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {}
            b'.' if allow_float && !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if allow_float && !seen_exp && end > 0 => {
                seen_exp = true;
                if matches!(bytes.get(end + 1), Some(b'+') | Some(b'-')) {
                    end += 1;
                }
            }
            _ => break,
        }
        end += 1;
    }
    &s[..end]
}

/// Lenient integer: leading digits only, anything unparsable is 0.
pub fn parse_int(s: &str) -> i32 {
    numeric_prefix(s.trim_start(), false).parse().unwrap_or(0)
}

/// Lenient float: longest parsable prefix, anything unparsable is 0.
pub fn parse_float(s: &str) -> f32 {
    let mut prefix = numeric_prefix(s.trim_start(), true);
    while !prefix.is_empty() {
        if let Ok(v) = prefix.parse() {
            return v;
        }
        prefix = &prefix[..prefix.len() - 1];
    }
    0.0
}
