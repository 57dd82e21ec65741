use glam::{IVec2, Vec2, Vec4};

use crate::context::{Channels, FilterMode, TextureFormat};

/// How a render target keeps fragment output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Storage {
    channels: Channels,
    unorm: bool,
}

impl Storage {
    pub fn store(self, value: Vec4) -> Vec4 {
        let value = match self.channels {
            Channels::R => Vec4::new(value.x, 0.0, 0.0, 1.0),
            Channels::Rg => Vec4::new(value.x, value.y, 0.0, 1.0),
            Channels::Rgba => value,
        };
        if self.unorm {
            value.clamp(Vec4::ZERO, Vec4::ONE)
        } else {
            value
        }
    }
}

/// CPU-side texture storage. Row 0 is the bottom row (`uv.y` near 0).
#[derive(Debug, Clone, PartialEq)]
pub struct TexelBuffer {
    width: u32,
    height: u32,
    format: TextureFormat,
    filter: FilterMode,
    /// Drawing buffers hold normalized 8-bit color, so stores clamp to `[0, 1]`.
    unorm: bool,
    texels: Vec<Vec4>,
}

impl TexelBuffer {
    pub fn new(width: u32, height: u32, format: TextureFormat, filter: FilterMode) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            format,
            filter,
            unorm: false,
            texels: vec![Vec4::ZERO; width as usize * height as usize],
        }
    }

    pub fn drawing_buffer(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            unorm: true,
            ..Self::new(width, height, format, FilterMode::Nearest)
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    pub(crate) fn texels_mut(&mut self) -> &mut [Vec4] {
        &mut self.texels
    }

    pub fn storage(&self) -> Storage {
        Storage {
            channels: self.format.channels,
            unorm: self.unorm,
        }
    }

    pub fn store(&self, value: Vec4) -> Vec4 {
        self.storage().store(value)
    }

    pub fn fill(&mut self, value: Vec4) {
        let value = self.store(value);
        self.texels.fill(value);
    }

    pub fn upload(&mut self, texels: &[Vec4]) {
        for (index, texel) in texels.iter().take(self.texels.len()).enumerate() {
            let stored = self.store(*texel);
            self.texels[index] = stored;
        }
    }

    /// Clamp-to-edge texel fetch.
    pub fn fetch(&self, at: IVec2) -> Vec4 {
        let x = at.x.clamp(0, self.width as i32 - 1) as u32;
        let y = at.y.clamp(0, self.height as i32 - 1) as u32;
        self.texels[y as usize * self.width as usize + x as usize]
    }

    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let size = Vec2::new(self.width as f32, self.height as f32);
        match self.filter {
            FilterMode::Nearest => self.fetch((uv * size).floor().as_ivec2()),
            FilterMode::Linear => {
                let st = uv * size - 0.5;
                let base = st.floor();
                let f = st - base;
                let i = base.as_ivec2();
                let a = self.fetch(i);
                let b = self.fetch(i + IVec2::new(1, 0));
                let c = self.fetch(i + IVec2::new(0, 1));
                let d = self.fetch(i + IVec2::new(1, 1));
                a.lerp(b, f.x).lerp(c.lerp(d, f.x), f.y)
            }
        }
    }
}

/// Texture units bound for one draw; unbound units sample as zero.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    units: [Option<&'a TexelBuffer>; 2],
}

impl<'a> Bindings<'a> {
    pub fn new(units: [Option<&'a TexelBuffer>; 2]) -> Self {
        Self { units }
    }

    pub fn sample(&self, unit: usize, uv: Vec2) -> Vec4 {
        self.units
            .get(unit)
            .copied()
            .flatten()
            .map_or(Vec4::ZERO, |texture| texture.sample(uv))
    }

    pub fn texture(&self, unit: usize) -> Option<&'a TexelBuffer> {
        self.units.get(unit).copied().flatten()
    }
}
