//! Cameras: free or following a character.

use crate::scene::model::CharHandle;
use glam::{Mat4, Vec3};

/// Pitch and yaw are kept in degrees (inputs adjust them in whole-degree
/// steps); converted at matrix build time.
pub struct Camera {
    pub pos: Vec3,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub zoom: bool,
    /// Dirty counter; the view matrix is only rebuilt when non-zero.
    pub moved: u32,
    /// The character this camera follows, if any ("camera carrier").
    pub ch: Option<CharHandle>,
    /// Follow distance behind the carrier.
    pub dist: f32,
    pub view_mx: Mat4,
    pub inv_view_mx: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            zoom: false,
            moved: 1,
            ch: None,
            dist: 8.0,
            view_mx: Mat4::IDENTITY,
            inv_view_mx: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    /// Places the camera relative to its carrier's position using the
    /// pitch/yaw offset. Called by the scene before [`Camera::calc`] when a
    /// carrier is set.
    pub fn follow(&mut self, target: Vec3) {
        let pitch = self.pitch.to_radians();
        let yaw = self.yaw.to_radians();
        let offset = Vec3::new(
            pitch.cos() * yaw.sin(),
            -pitch.sin(),
            pitch.cos() * yaw.cos(),
        ) * self.dist;
        self.pos = target - offset;
        self.moved += 1;
    }

    /// Rebuilds the view matrices if the camera moved since the last call.
    pub fn calc(&mut self) {
        if self.moved == 0 {
            return;
        }
        self.moved = 0;

        let scale = if self.zoom { 3.0 } else { 1.0 };
        let view = Mat4::from_rotation_x(self.pitch.to_radians())
            * Mat4::from_rotation_y(self.yaw.to_radians())
            * Mat4::from_scale(Vec3::splat(scale))
            * Mat4::from_translation(-self.pos);
        self.view_mx = view;
        self.inv_view_mx = view.inverse();
    }
}
