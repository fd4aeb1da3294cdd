//! Terrain height queries.
//!
//! The scene only ever asks one question of terrain: the ground height under
//! an (x, z) position. Characters snap to it, the camera auto-offsets from
//! it. The generated grid variant mirrors the classic jittered-grid ground
//! plane; anything fancier plugs in through the same trait.

use crate::track::ClassGuard;
use rand::Rng;

pub trait Terrain {
    fn height(&self, x: f32, z: f32) -> f32;
}

/// Ground at a constant height everywhere.
pub struct FlatTerrain(pub f32);

impl Terrain for FlatTerrain {
    fn height(&self, _x: f32, _z: f32) -> f32 {
        self.0
    }
}

/// A square grid of jittered height samples, bilinearly interpolated.
pub struct GridTerrain {
    x: f32,
    z: f32,
    side: f32,
    nr_vert: usize,
    map: Vec<f32>,
    _class: ClassGuard,
}

impl GridTerrain {
    /// Generates a `side` x `side` terrain centered at `(x, z)`, with
    /// `nr_vert` samples per edge at `y` plus at most `jitter` of noise.
    pub fn generate(
        x: f32,
        y: f32,
        z: f32,
        side: f32,
        nr_vert: usize,
        jitter: f32,
        rng: &mut impl Rng,
    ) -> Self {
        assert!(nr_vert >= 2, "terrain needs at least a 2x2 grid");
        let map = (0..nr_vert * nr_vert)
            .map(|_| y + rng.gen_range(-1.0f32..1.0) * jitter)
            .collect();
        Self {
            x,
            z,
            side,
            nr_vert,
            map,
            _class: ClassGuard::new("terrain"),
        }
    }

    pub fn side(&self) -> f32 {
        self.side
    }

    fn sample(&self, i: usize, j: usize) -> f32 {
        self.map[i * self.nr_vert + j]
    }
}

impl Terrain for GridTerrain {
    fn height(&self, x: f32, z: f32) -> f32 {
        let cell = self.side / (self.nr_vert - 1) as f32;
        // grid-space coordinates, clamped to the edge
        let gx = ((x - self.x + self.side / 2.0) / cell)
            .clamp(0.0, (self.nr_vert - 1) as f32);
        let gz = ((z - self.z + self.side / 2.0) / cell)
            .clamp(0.0, (self.nr_vert - 1) as f32);

        let j0 = (gx as usize).min(self.nr_vert - 2);
        let i0 = (gz as usize).min(self.nr_vert - 2);
        let fx = gx - j0 as f32;
        let fz = gz - i0 as f32;

        let h00 = self.sample(i0, j0);
        let h01 = self.sample(i0, j0 + 1);
        let h10 = self.sample(i0 + 1, j0);
        let h11 = self.sample(i0 + 1, j0 + 1);

        let top = h00 + (h01 - h00) * fx;
        let bottom = h10 + (h11 - h10) * fx;
        top + (bottom - top) * fz
    }
}
