// src/modifiers.rs
//! Pixel transforms applied by texture commands.
//!
//! All of these operate on raw (uncompressed) [`ImageData`] and either edit in
//! place or replace the image with a re-laid-out copy.

use glam::Vec3;

use crate::image_data::ImageData;

#[inline]
fn to_byte(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

// ─────────────────────────────────────────────────────────────────────────────
// Colour
// ─────────────────────────────────────────────────────────────────────────────

/// `dst = src * mul + 255 * add`, per colour channel.
pub fn mad(img: &mut ImageData, mul: Vec3, add: Vec3) {
    let uniform = mul == Vec3::splat(mul.x) && add == Vec3::splat(add.x);
    if img.bpp < 3 && !uniform {
        img.swizzle();
    }
    let channels = img.bpp.min(3) as usize;
    img.for_each_pixel_mut(|px| {
        for k in 0..channels {
            px[k] = to_byte(px[k] as f32 * mul[k] + 255.0 * add[k]);
        }
    });
}

/// Replace colour with `color` scaled by the weighted luminance.
pub fn colorify(img: &mut ImageData, color: Vec3, weights: Vec3) {
    if img.bpp < 3 {
        return;
    }
    img.for_each_pixel_mut(|px| {
        let lum = Vec3::new(px[0] as f32, px[1] as f32, px[2] as f32).dot(weights);
        for k in 0..3 {
            px[k] = to_byte(lum * color[k]);
        }
    });
}

/// Tint by a colour picked from the alpha channel: alpha 255 → `c1`, 0 → `c2`.
/// The alpha channel is consumed.
pub fn colormask(img: &mut ImageData, c1: Vec3, c2: Vec3) {
    if img.bpp < 4 {
        return;
    }
    *img = img.map_pixels(3, |s, d| {
        let tint = c2.lerp(c1, s[3] as f32 / 255.0);
        for k in 0..3 {
            d[k] = to_byte(tint[k] * s[k] as f32);
        }
    });
}

/// Pack a glow (G) / envmap (B) mask into one channel for fixed-function
/// rendering. Empties the image when neither mask contributes anything.
pub fn ffmask(img: &mut ImageData, glow_scale: f32, env_scale: f32) {
    if img.bpp < 3 {
        img.clear();
        return;
    }
    let mut any = false;
    let masked = img.map_pixels(1, |s, d| {
        let v = (s[1] as f32 * glow_scale).max(s[2] as f32 * env_scale);
        d[0] = to_byte(v);
        any |= d[0] != 0;
    });
    if any {
        *img = masked;
    } else {
        img.clear();
    }
}

/// Grey-scale from the first channel, alpha kept.
pub fn grey(img: &mut ImageData) {
    match img.bpp {
        3 => *img = img.map_pixels(1, |s, d| d[0] = s[0]),
        4 => {
            *img = img.map_pixels(2, |s, d| {
                d[0] = s[0];
                d[1] = s[3];
            })
        }
        _ => {}
    }
}

pub fn premultiply(img: &mut ImageData) {
    match img.bpp {
        2 => img.for_each_pixel_mut(|px| px[0] = ((px[0] as u32 * px[1] as u32) / 255) as u8),
        4 => img.for_each_pixel_mut(|px| {
            let a = px[3] as u32;
            px[0] = ((px[0] as u32 * a) / 255) as u8;
            px[1] = ((px[1] as u32 * a) / 255) as u8;
            px[2] = ((px[2] as u32 * a) / 255) as u8;
        }),
        _ => {}
    }
}

/// Fade alpha along a linear gradient; coordinates are in texture space,
/// y pointing up.
pub fn alpha_gradient(img: &mut ImageData, x2: f32, y2: f32, x1: f32, y1: f32) {
    if img.bpp != 2 && img.bpp != 4 {
        return;
    }
    let (y1, y2) = (1.0 - y1, 1.0 - y2);
    let (mut minx, mut maxx, mut miny, mut maxy) = (1.0f32, 1.0f32, 1.0f32, 1.0f32);
    if x1 != x2 {
        minx = -x1 / (x2 - x1);
        maxx = (1.0 - x1) / (x2 - x1);
    }
    if y1 != y2 {
        miny = -y1 / (y2 - y1);
        maxy = (1.0 - y1) / (y2 - y1);
    }
    let dx = (maxx - minx) / img.w.saturating_sub(1).max(1) as f32;
    let dy = (maxy - miny) / img.h.saturating_sub(1).max(1) as f32;
    let a = img.bpp as usize - 1;

    let mut cury = miny;
    for y in 0..img.h {
        let mut curx = minx;
        for px in img.row_mut(y).chunks_exact_mut(a + 1) {
            px[a] = (px[a] as f32 * curx.clamp(0.0, 1.0) * cury.clamp(0.0, 1.0)) as u8;
            curx += dx;
        }
        cury += dy;
    }
}

/// Flatten a decal over white using its alpha. Only needed when the fixed
/// function path cannot blend it.
pub fn decal(img: &mut ImageData) {
    if img.bpp != 4 {
        return;
    }
    *img = img.map_pixels(3, |s, d| {
        let a = s[3] as u32;
        for k in 0..3 {
            d[k] = ((s[k] as u32 * a + 255 * (255 - a)) / 255) as u8;
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Copy channel `src` over channel `dst`.
pub fn dup(img: &mut ImageData, src: i32, dst: i32) {
    if src == dst || src < 0 || dst < 0 || src.max(dst) as u32 >= img.bpp {
        return;
    }
    let (src, dst) = (src as usize, dst as usize);
    img.for_each_pixel_mut(|px| px[dst] = px[src]);
}

/// Rebuild the pixel from source channels; the first `None` ends the list.
pub fn mix(img: &mut ImageData, channels: [Option<usize>; 4]) {
    let picks: Vec<usize> = channels.iter().map_while(|c| *c).collect();
    if picks.is_empty() {
        return;
    }
    *img = img.map_pixels(picks.len() as u32, |s, d| {
        for (out, &c) in d.iter_mut().zip(&picks) {
            *out = s.get(c).copied().unwrap_or(0);
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Shift with wrap-around by whole pixels.
pub fn offset(img: &mut ImageData, x: i32, y: i32) {
    if img.w == 0 || img.h == 0 {
        return;
    }
    let xo = x.max(0) as u32 % img.w;
    let yo = y.max(0) as u32 % img.h;
    if xo == 0 && yo == 0 {
        return;
    }
    let src = img.clone();
    let mut out = ImageData::new(src.w, src.h, src.bpp);
    for sy in 0..src.h {
        for sx in 0..src.w {
            let (dx, dy) = ((sx + xo) % src.w, (sy + yo) % src.h);
            out.pixel_mut(dx, dy).copy_from_slice(src.pixel(sx, sy));
        }
    }
    *img = out;
}

/// Quarter-turn rotations (1..=3) and the two mirrored variants (4, 5).
pub fn rotate(img: &mut ImageData, turns: i32, normal_map: bool) {
    if (1..=5).contains(&turns) {
        reorient(
            img,
            (2..=4).contains(&turns),
            turns <= 2 || turns == 5,
            (turns & 5) == 1,
            normal_map,
        );
    }
}

/// Flip and/or transpose. Normal maps have their X/Y vectors fixed up to match.
pub fn reorient(img: &mut ImageData, flip_x: bool, flip_y: bool, swap_xy: bool, normal_map: bool) {
    let (sw, sh) = (img.w, img.h);
    let (dw, dh) = if swap_xy { (sh, sw) } else { (sw, sh) };
    let mut out = ImageData::new(dw, dh, img.bpp);
    let fix_normals = normal_map && img.bpp >= 3;

    for y in 0..sh {
        for x in 0..sw {
            let fx = if flip_x { sw - 1 - x } else { x };
            let fy = if flip_y { sh - 1 - y } else { y };
            let (dx, dy) = if swap_xy { (fy, fx) } else { (fx, fy) };
            let src = img.pixel(x, y);
            let dst = out.pixel_mut(dx, dy);
            dst.copy_from_slice(src);
            if fix_normals {
                let mut nx = src[0];
                let mut ny = src[1];
                if flip_x {
                    nx = 255 - nx;
                }
                if flip_y {
                    ny = 255 - ny;
                }
                if swap_xy {
                    std::mem::swap(&mut nx, &mut ny);
                }
                dst[0] = nx;
                dst[1] = ny;
            }
        }
    }
    *img = out;
}

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

/// Height map (first channel) → tangent-space normal map, tiling at the edges.
pub fn normal_map(img: &mut ImageData, emphasis: i32) {
    let (w, h) = (img.w, img.h);
    let mut out = ImageData::new(w, h, 3);
    let height = |x: u32, y: u32| img.pixel(x, y)[0] as f32;
    for y in 0..h {
        for x in 0..w {
            let n = Vec3::new(
                height((x + w - 1) % w, y) - height((x + 1) % w, y),
                height(x, (y + h - 1) % h) - height(x, (y + 1) % h),
                255.0 / emphasis.max(1) as f32,
            )
            .normalize();
            let px = out.pixel_mut(x, y);
            px[0] = (127.5 + n.x * 127.5) as u8;
            px[1] = (127.5 + n.y * 127.5) as u8;
            px[2] = (127.5 + n.z * 127.5) as u8;
        }
    }
    *img = out;
}

/// Separable binomial blur of radius `emphasis` (1 or 2), `repeat` times.
/// Edges wrap so tiling textures stay seamless.
pub fn blur(img: &mut ImageData, emphasis: u32, repeat: u32) {
    let kernel: &[u32] = if emphasis >= 2 { &[1, 4, 6, 4, 1] } else { &[1, 2, 1] };
    let radius = (kernel.len() / 2) as i64;
    let total: u32 = kernel.iter().sum();
    let (w, h, bpp) = (img.w as i64, img.h as i64, img.bpp as usize);
    if w == 0 || h == 0 {
        return;
    }

    for _ in 0..repeat {
        for horizontal in [true, false] {
            let src = img.clone();
            let mut out = ImageData::new(img.w, img.h, img.bpp);
            for y in 0..h {
                for x in 0..w {
                    let mut acc = [0u32; 4];
                    for (i, &k) in kernel.iter().enumerate() {
                        let off = i as i64 - radius;
                        let (sx, sy) = if horizontal {
                            ((x + off).rem_euclid(w), y)
                        } else {
                            (x, (y + off).rem_euclid(h))
                        };
                        let px = src.pixel(sx as u32, sy as u32);
                        for c in 0..bpp {
                            acc[c] += px[c] as u32 * k;
                        }
                    }
                    let dst = out.pixel_mut(x as u32, y as u32);
                    for c in 0..bpp {
                        dst[c] = (acc[c] / total) as u8;
                    }
                }
            }
            *img = out;
        }
    }
}
