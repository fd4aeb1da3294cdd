//! Call boundaries to the engine's external collaborators.
//!
//! The renderer, physics integrator, audio device and host display are not
//! part of the core; the core drives them through these traits. The headless
//! implementations below back the dedicated server, the test suite and the
//! default launcher configuration.

use crate::bus::DebugDraw;
use crate::error::{Error, ErrorKind, Result};
use crate::scene::model::{Model, TextureSet};
use crate::scene::RenderOptions;
use ahash::AHashMap;
use glam::{Mat4, Vec3, Vec4};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlProfile {
    Core,
    Compat,
    Es,
}

/// One draw submission: a textured model instance with its resolved
/// transform.
pub struct RenderItem {
    pub model: Arc<Model>,
    pub texture: Arc<TextureSet>,
    pub transform: Mat4,
    pub color: Vec4,
}

/// Everything the scene hands to the renderer for one frame.
#[derive(Default)]
pub struct RenderQueue {
    pub items: Vec<RenderItem>,
    pub debug: Vec<DebugDraw>,
}

/// The GPU renderer, treated as opaque by the core.
pub trait Renderer {
    fn set_viewport(&mut self, vp: Viewport);
    fn viewport(&self) -> Viewport;
    fn set_version(&mut self, major: u32, minor: u32, profile: GlProfile) -> Result<()>;
    fn frame_begin(&mut self);
    fn models_render(&mut self, queue: &RenderQueue, options: &RenderOptions);
    fn frame_end(&mut self);
    /// Renderer-side debug output (overlays, wireframes).
    fn debug(&mut self, options: &RenderOptions) {
        let _ = options;
    }
}

/// Discards everything; remembers the viewport and counts submissions so
/// tests can observe the render phase happening.
#[derive(Default)]
pub struct NullRenderer {
    vp: Viewport,
    pub frames: u64,
    pub items_rendered: u64,
}

impl Renderer for NullRenderer {
    fn set_viewport(&mut self, vp: Viewport) {
        self.vp = vp;
    }

    fn viewport(&self) -> Viewport {
        self.vp
    }

    fn set_version(&mut self, _major: u32, _minor: u32, _profile: GlProfile) -> Result<()> {
        Ok(())
    }

    fn frame_begin(&mut self) {}

    fn models_render(&mut self, queue: &RenderQueue, _options: &RenderOptions) {
        self.items_rendered += queue.items.len() as u64;
    }

    fn frame_end(&mut self) {
        self.frames += 1;
    }
}

pub type BodyId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyPose {
    pub position: Vec3,
    /// Euler rotation, radians.
    pub rotation: Vec3,
}

pub type GroundContactFn = Box<dyn FnMut(f32, f32, f32)>;

/// The physics integrator boundary. The core steps it once per frame and
/// reads/writes body poses around entity updates.
pub trait Physics {
    fn step(&mut self, dt_seconds: f64);
    fn body_new(&mut self, pose: BodyPose) -> BodyId;
    fn body_done(&mut self, body: BodyId);
    fn body_pose(&self, body: BodyId) -> Option<BodyPose>;
    fn set_body_pose(&mut self, body: BodyId, pose: BodyPose);
    fn set_ground_contact(&mut self, callback: GroundContactFn);
}

/// Pose storage without any dynamics. Bodies keep whatever pose was last
/// written, which is exactly what the update-protocol tests need.
#[derive(Default)]
pub struct HeadlessPhysics {
    bodies: AHashMap<BodyId, BodyPose>,
    next_id: BodyId,
    ground_contact: Option<GroundContactFn>,
    pub steps: u64,
}

impl HeadlessPhysics {
    /// Test hook: reports a ground contact at the given point through the
    /// registered callback, the way an integrator would from its collision
    /// pass.
    pub fn trigger_ground_contact(&mut self, x: f32, y: f32, z: f32) {
        if let Some(callback) = &mut self.ground_contact {
            callback(x, y, z);
        }
    }
}

impl Physics for HeadlessPhysics {
    fn step(&mut self, _dt_seconds: f64) {
        self.steps += 1;
    }

    fn body_new(&mut self, pose: BodyPose) -> BodyId {
        self.next_id += 1;
        self.bodies.insert(self.next_id, pose);
        self.next_id
    }

    fn body_done(&mut self, body: BodyId) {
        self.bodies.remove(&body);
    }

    fn body_pose(&self, body: BodyId) -> Option<BodyPose> {
        self.bodies.get(&body).copied()
    }

    fn set_body_pose(&mut self, body: BodyId, pose: BodyPose) {
        self.bodies.insert(body, pose);
    }

    fn set_ground_contact(&mut self, callback: GroundContactFn) {
        self.ground_contact = Some(callback);
    }
}

pub type FontId = u32;

/// The font rasterizer boundary. The core only loads fonts by name and
/// releases them; shaping and rasterization happen outside.
pub trait Font {
    fn font_new(&mut self, name: &str) -> Result<FontId>;
    fn font_done(&mut self, font: FontId);
}

/// Remembers what was loaded; enough for headless builds and tests.
#[derive(Default)]
pub struct NullFont {
    loaded: AHashMap<FontId, String>,
    next_id: FontId,
}

impl Font for NullFont {
    fn font_new(&mut self, name: &str) -> Result<FontId> {
        if name.is_empty() {
            return Err(Error::new(ErrorKind::FontNotLoaded));
        }
        self.next_id += 1;
        self.loaded.insert(self.next_id, name.to_string());
        Ok(self.next_id)
    }

    fn font_done(&mut self, font: FontId) {
        self.loaded.remove(&font);
    }
}

pub type SoundId = u32;

pub trait Audio {
    fn sound_new(&mut self, name: &str) -> Result<SoundId>;
    fn set_gain(&mut self, sound: SoundId, gain: f32);
    fn get_gain(&self, sound: SoundId) -> f32;
    fn set_looping(&mut self, sound: SoundId, looping: bool);
    fn play(&mut self, sound: SoundId);
}

#[derive(Default)]
pub struct NullAudio {
    gains: AHashMap<SoundId, f32>,
    next_id: SoundId,
}

impl Audio for NullAudio {
    fn sound_new(&mut self, name: &str) -> Result<SoundId> {
        if name.is_empty() {
            return Err(Error::new(ErrorKind::SoundNotLoaded));
        }
        self.next_id += 1;
        self.gains.insert(self.next_id, 1.0);
        Ok(self.next_id)
    }

    fn set_gain(&mut self, sound: SoundId, gain: f32) {
        self.gains.insert(sound, gain);
    }

    fn get_gain(&self, sound: SoundId) -> f32 {
        self.gains.get(&sound).copied().unwrap_or(0.0)
    }

    fn set_looping(&mut self, _sound: SoundId, _looping: bool) {}

    fn play(&mut self, _sound: SoundId) {}
}

/// The host display surface: framebuffer sizes, buffer swaps and the exit
/// request the main loop polls.
pub trait Display {
    fn get_sizes(&self) -> (u32, u32);
    fn swap_buffers(&mut self);
    fn request_exit(&mut self);
    fn exit_requested(&self) -> bool;
    fn enter_fullscreen(&mut self);
    fn leave_fullscreen(&mut self);
    fn set_window_pos_size(&mut self, x: i32, y: i32, width: u32, height: u32);
    fn get_window_pos_size(&self) -> (i32, i32, u32, u32);
}

pub struct HeadlessDisplay {
    pos: (i32, i32),
    size: (u32, u32),
    fullscreen: bool,
    exit: bool,
    pub swaps: u64,
}

impl HeadlessDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pos: (0, 0),
            size: (width, height),
            fullscreen: false,
            exit: false,
            swaps: 0,
        }
    }
}

impl Display for HeadlessDisplay {
    fn get_sizes(&self) -> (u32, u32) {
        self.size
    }

    fn swap_buffers(&mut self) {
        self.swaps += 1;
    }

    fn request_exit(&mut self) {
        self.exit = true;
    }

    fn exit_requested(&self) -> bool {
        self.exit
    }

    fn enter_fullscreen(&mut self) {
        self.fullscreen = true;
    }

    fn leave_fullscreen(&mut self) {
        self.fullscreen = false;
    }

    fn set_window_pos_size(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.pos = (x, y);
        self.size = (width, height);
    }

    fn get_window_pos_size(&self) -> (i32, i32, u32, u32) {
        (self.pos.0, self.pos.1, self.size.0, self.size.1)
    }
}

/// The bundle of collaborator implementations handed to the engine at init.
pub struct GlueParts {
    pub renderer: Box<dyn Renderer>,
    pub physics: Box<dyn Physics>,
    pub audio: Option<Box<dyn Audio>>,
    pub font: Option<Box<dyn Font>>,
    pub display: Box<dyn Display>,
}

impl GlueParts {
    pub fn headless(width: u32, height: u32) -> Self {
        Self {
            renderer: Box::new(NullRenderer::default()),
            physics: Box::new(HeadlessPhysics::default()),
            audio: Some(Box::new(NullAudio::default())),
            font: Some(Box::new(NullFont::default())),
            display: Box::new(HeadlessDisplay::new(width, height)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn null_font_tracks_loads() {
        let mut font = NullFont::default();
        let id = font.font_new("mono.ttf").unwrap();
        assert!(font.font_new("").is_err());
        font.font_done(id);
        assert!(font.loaded.is_empty());
    }

    #[test]
    fn headless_physics_reports_ground_contact() {
        let mut physics = HeadlessPhysics::default();
        let hits = Rc::new(RefCell::new(Vec::new()));
        let sink = hits.clone();
        physics.set_ground_contact(Box::new(move |x, y, z| {
            sink.borrow_mut().push((x, y, z));
        }));
        physics.trigger_ground_contact(1.0, 2.0, 3.0);
        assert_eq!(*hits.borrow(), vec![(1.0, 2.0, 3.0)]);
    }
}
