//! Color-grading lookup tables, baked once at init.

use crate::error::{Error, ErrorKind, Result};
use crate::track::ClassGuard;
use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutPreset {
    Identity,
    Sepia,
    Cool,
    Warm,
}

impl LutPreset {
    pub fn name(self) -> &'static str {
        match self {
            LutPreset::Identity => "identity",
            LutPreset::Sepia => "sepia",
            LutPreset::Cool => "cool",
            LutPreset::Warm => "warm",
        }
    }

    fn grade(self, rgb: Vec3) -> Vec3 {
        match self {
            LutPreset::Identity => rgb,
            LutPreset::Sepia => {
                let l = rgb.dot(Vec3::new(0.299, 0.587, 0.114));
                Vec3::new(l * 1.07, l * 0.74, l * 0.43).min(Vec3::ONE)
            }
            LutPreset::Cool => (rgb * Vec3::new(0.9, 0.95, 1.1)).min(Vec3::ONE),
            LutPreset::Warm => (rgb * Vec3::new(1.1, 1.0, 0.85)).min(Vec3::ONE),
        }
    }
}

/// A baked `side`^3 RGB table, handed to the renderer as-is.
pub struct Lut {
    pub name: &'static str,
    pub side: u32,
    pub table: Vec<Vec3>,
    _class: ClassGuard,
}

impl Lut {
    pub fn generate(preset: LutPreset, side: u32) -> Result<Self> {
        if side < 2 {
            return Err(Error::new(ErrorKind::InvalidArguments));
        }

        let n = side as usize;
        let mut table = Vec::with_capacity(n * n * n);
        let scale = 1.0 / (side - 1) as f32;
        for b in 0..n {
            for g in 0..n {
                for r in 0..n {
                    let rgb = Vec3::new(r as f32, g as f32, b as f32) * scale;
                    table.push(preset.grade(rgb));
                }
            }
        }

        Ok(Self {
            name: preset.name(),
            side,
            table,
            _class: ClassGuard::new("lut"),
        })
    }
}

/// Finds a baked LUT by preset name.
pub fn lut_find<'a>(luts: &'a [Lut], name: &str) -> Result<&'a Lut> {
    luts.iter()
        .find(|lut| lut.name == name)
        .ok_or_else(|| Error::new(ErrorKind::NotFound))
}
