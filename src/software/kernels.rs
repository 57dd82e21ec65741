//! CPU versions of the fragment kernels in `shaders/`.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use super::texture::Bindings;
use crate::program::{Keywords, ShaderKind, Uniforms};

/// Interpolated vertex outputs for one fragment.
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub uv: Vec2,
    pub l: Vec2,
    pub r: Vec2,
    pub t: Vec2,
    pub b: Vec2,
}

impl Fragment {
    pub fn new(uv: Vec2, texel_size: Vec2) -> Self {
        Self {
            uv,
            l: uv - Vec2::new(texel_size.x, 0.0),
            r: uv + Vec2::new(texel_size.x, 0.0),
            t: uv + Vec2::new(0.0, texel_size.y),
            b: uv - Vec2::new(0.0, texel_size.y),
        }
    }
}

pub fn shade(kind: ShaderKind, keywords: Keywords, frag: &Fragment, params: &Uniforms, tex: &Bindings) -> Vec4 {
    match kind {
        ShaderKind::BaseVertex => Vec4::ZERO,
        ShaderKind::Copy => tex.sample(0, frag.uv),
        ShaderKind::Clear => params.value * tex.sample(0, frag.uv),
        ShaderKind::Splat => splat(frag, params, tex),
        ShaderKind::Advection => advection(keywords, frag, params, tex),
        ShaderKind::Divergence => divergence(frag, tex),
        ShaderKind::Curl => curl(frag, tex),
        ShaderKind::Vorticity => vorticity(frag, params, tex),
        ShaderKind::Pressure => pressure(frag, tex),
        ShaderKind::GradientSubtract => gradient_subtract(frag, tex),
        ShaderKind::Display => display(keywords, frag, params, tex),
    }
}

fn splat(frag: &Fragment, params: &Uniforms, tex: &Bindings) -> Vec4 {
    let mut p = frag.uv - params.point_vec();
    p.x *= params.aspect_ratio;
    let splat = (-p.dot(p) / params.radius).exp() * params.color_vec();
    let base = tex.sample(0, frag.uv).xyz();
    (base + splat).extend(1.0)
}

fn bilerp(tex: &Bindings, unit: usize, uv: Vec2, texel_size: Vec2) -> Vec4 {
    let st = uv / texel_size - 0.5;
    let iuv = st.floor();
    let fuv = st - iuv;

    let a = tex.sample(unit, (iuv + Vec2::new(0.5, 0.5)) * texel_size);
    let b = tex.sample(unit, (iuv + Vec2::new(1.5, 0.5)) * texel_size);
    let c = tex.sample(unit, (iuv + Vec2::new(0.5, 1.5)) * texel_size);
    let d = tex.sample(unit, (iuv + Vec2::new(1.5, 1.5)) * texel_size);

    a.lerp(b, fuv.x).lerp(c.lerp(d, fuv.x), fuv.y)
}

fn advection(keywords: Keywords, frag: &Fragment, params: &Uniforms, tex: &Bindings) -> Vec4 {
    let texel_size = params.texel_size_vec();
    let result = if keywords.contains(Keywords::MANUAL_FILTERING) {
        let velocity = bilerp(tex, 0, frag.uv, texel_size).xy();
        let coord = frag.uv - params.dt * velocity * texel_size;
        bilerp(tex, 1, coord, params.dye_texel_size_vec())
    } else {
        let velocity = tex.sample(0, frag.uv).xy();
        let coord = frag.uv - params.dt * velocity * texel_size;
        tex.sample(1, coord)
    };
    result / (1.0 + params.dissipation * params.dt)
}

fn divergence(frag: &Fragment, tex: &Bindings) -> Vec4 {
    let mut l = tex.sample(0, frag.l).x;
    let mut r = tex.sample(0, frag.r).x;
    let mut t = tex.sample(0, frag.t).y;
    let mut b = tex.sample(0, frag.b).y;

    let c = tex.sample(0, frag.uv).xy();
    if frag.l.x < 0.0 {
        l = -c.x;
    }
    if frag.r.x > 1.0 {
        r = -c.x;
    }
    if frag.t.y > 1.0 {
        t = -c.y;
    }
    if frag.b.y < 0.0 {
        b = -c.y;
    }

    Vec4::new(0.5 * (r - l + t - b), 0.0, 0.0, 1.0)
}

fn curl(frag: &Fragment, tex: &Bindings) -> Vec4 {
    let l = tex.sample(0, frag.l).y;
    let r = tex.sample(0, frag.r).y;
    let t = tex.sample(0, frag.t).x;
    let b = tex.sample(0, frag.b).x;
    Vec4::new(0.5 * (r - l - t + b), 0.0, 0.0, 1.0)
}

fn vorticity(frag: &Fragment, params: &Uniforms, tex: &Bindings) -> Vec4 {
    let l = tex.sample(1, frag.l).x;
    let r = tex.sample(1, frag.r).x;
    let t = tex.sample(1, frag.t).x;
    let b = tex.sample(1, frag.b).x;
    let c = tex.sample(1, frag.uv).x;

    let mut force = 0.5 * Vec2::new(t.abs() - b.abs(), r.abs() - l.abs());
    force /= force.length() + 0.0001;
    force *= params.curl * c;
    force.y = -force.y;

    let velocity = tex.sample(0, frag.uv).xy() + force * params.dt;
    velocity
        .clamp(Vec2::splat(-1000.0), Vec2::splat(1000.0))
        .extend(0.0)
        .extend(1.0)
}

fn pressure(frag: &Fragment, tex: &Bindings) -> Vec4 {
    let mut l = tex.sample(0, frag.l).x;
    let mut r = tex.sample(0, frag.r).x;
    let mut t = tex.sample(0, frag.t).x;
    let mut b = tex.sample(0, frag.b).x;
    let c = tex.sample(0, frag.uv).x;

    if frag.l.x < 0.0 {
        l = -c;
    }
    if frag.r.x > 1.0 {
        r = -c;
    }
    if frag.t.y > 1.0 {
        t = -c;
    }
    if frag.b.y < 0.0 {
        b = -c;
    }

    let divergence = tex.sample(1, frag.uv).x;
    Vec4::new((l + r + b + t - divergence) * 0.25, 0.0, 0.0, 1.0)
}

fn gradient_subtract(frag: &Fragment, tex: &Bindings) -> Vec4 {
    let l = tex.sample(0, frag.l).x;
    let r = tex.sample(0, frag.r).x;
    let t = tex.sample(0, frag.t).x;
    let b = tex.sample(0, frag.b).x;
    let velocity = tex.sample(1, frag.uv).xy() - Vec2::new(r - l, t - b);
    velocity.extend(0.0).extend(1.0)
}

fn display(keywords: Keywords, frag: &Fragment, params: &Uniforms, tex: &Bindings) -> Vec4 {
    let mut c = tex.sample(0, frag.uv).xyz();
    if keywords.contains(Keywords::SHADING) {
        let lc = tex.sample(0, frag.l).xyz();
        let rc = tex.sample(0, frag.r).xyz();
        let tc = tex.sample(0, frag.t).xyz();
        let bc = tex.sample(0, frag.b).xyz();

        let dx = rc.length() - lc.length();
        let dy = tc.length() - bc.length();

        let n = Vec3::new(dx, dy, params.texel_size_vec().length()).normalize_or_zero();
        let diffuse = (n.dot(Vec3::Z) + 0.7).clamp(0.7, 1.0);
        c *= diffuse;
    }

    let a = c.x.max(c.y).max(c.z);
    c.extend(a)
}
