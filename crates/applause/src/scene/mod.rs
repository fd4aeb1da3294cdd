//! The scene: cameras, characters, textured models, lights, debug geometry,
//! and the per-frame update protocol binding them together.

use crate::bus::{
    Bus, CommandFlags, CommandMsg, DebugDraw, Flow, InputEvent, Message, Payload, SubToken,
};
use crate::error::{Error, ErrorKind, Result};
use crate::glue::{Physics, RenderItem, RenderQueue};
use crate::track::ClassGuard;
use applause_utils::Pool;
use glam::Vec3;
use log::*;
use std::{cell::RefCell, rc::Rc};

pub mod camera;
pub mod character;
pub mod model;
pub mod terrain;

pub use camera::Camera;
pub use character::Character;
pub use model::{CharHandle, Entity, EntityHandle, EntityKind, Model, TexturedModel, TextureSet, TxmHandle};
pub use terrain::{FlatTerrain, GridTerrain, Terrain};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Light {
    pub pos: Vec3,
    pub color: Vec3,
}

/// Render feature switches passed through to the external renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    pub bloom: bool,
    pub ssao: bool,
    pub fog: bool,
    pub msaa: bool,
    pub lut: Option<String>,
}

/// Side effects of input handling that only the engine can act on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SceneRequests {
    pub exit: bool,
    pub fullscreen_toggle: bool,
    pub resize: Option<(u32, u32)>,
}

impl SceneRequests {
    fn merge(&mut self, other: &SceneRequests) {
        self.exit |= other.exit;
        self.fullscreen_toggle ^= other.fullscreen_toggle;
        if other.resize.is_some() {
            self.resize = other.resize;
        }
    }
}

pub struct Scene {
    pub name: String,
    pub width: u32,
    pub height: u32,

    txmodels: Pool<TexturedModel>,
    entities: Pool<Entity>,
    characters: Pool<Character>,

    pub cameras: Vec<Camera>,
    pub camera_idx: usize,
    /// The character driven by input.
    pub control: Option<CharHandle>,
    pub focus: Option<EntityHandle>,

    pub terrain: Option<Box<dyn Terrain>>,
    pub light: Light,
    pub options: RenderOptions,

    /// Debug geometry accumulated during update, consumed at render.
    debug_draws: Vec<DebugDraw>,

    pub frames_total: u64,
    /// Control character speed, units per second.
    pub speed: f32,
    /// Below this height a character has fallen out of the world.
    pub limbo_height: f32,
    pub autopilot: bool,
    paused: bool,

    bus: Bus,
    inputs: Rc<RefCell<Vec<InputEvent>>>,
    ddraws: Rc<RefCell<Vec<DebugDraw>>>,
    requests: SceneRequests,
    tokens: [SubToken; 2],
    _class: ClassGuard,
}

impl Scene {
    pub fn new(bus: &Bus) -> Self {
        let inputs: Rc<RefCell<Vec<InputEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let ddraws: Rc<RefCell<Vec<DebugDraw>>> = Rc::new(RefCell::new(Vec::new()));

        let mailbox = inputs.clone();
        let input_token = bus.subscribe(crate::bus::Topic::Input, move |message| {
            if let Payload::Input(event) = &message.payload {
                mailbox.borrow_mut().push(*event);
            }
            Flow::Handled
        });
        let mailbox = ddraws.clone();
        let ddraw_token = bus.subscribe(crate::bus::Topic::DebugDraw, move |message| {
            if let Payload::DebugDraw(draw) = &message.payload {
                mailbox.borrow_mut().push(draw.clone());
            }
            Flow::Handled
        });

        Self {
            name: String::new(),
            width: 0,
            height: 0,
            txmodels: Pool::new(),
            entities: Pool::new(),
            characters: Pool::new(),
            cameras: vec![Camera::default()],
            camera_idx: 0,
            control: None,
            focus: None,
            terrain: None,
            light: Light::default(),
            options: RenderOptions::default(),
            debug_draws: Vec::new(),
            frames_total: 0,
            speed: 1.0,
            limbo_height: -100.0,
            autopilot: false,
            paused: false,
            bus: bus.clone(),
            inputs,
            ddraws,
            requests: SceneRequests::default(),
            tokens: [input_token, ddraw_token],
            _class: ClassGuard::new("scene"),
        }
    }

    // Composition

    pub fn add_model(
        &mut self,
        model: std::sync::Arc<Model>,
        texture: std::sync::Arc<TextureSet>,
    ) -> TxmHandle {
        debug!("adding model '{}'", model.name);
        self.txmodels.allocate(TexturedModel {
            model,
            texture,
            entities: smallvec::SmallVec::new(),
            _class: ClassGuard::new("txmodel"),
        })
    }

    pub fn entity_new(&mut self, txm: TxmHandle) -> Result<EntityHandle> {
        self.txmodels
            .validate(txm)
            .map_err(|_| Error::new(ErrorKind::NotFound))?;
        let handle = self.entities.allocate(Entity::new(txm));
        self.txmodels.get_mut(txm).unwrap().entities.push(handle);
        Ok(handle)
    }

    /// Removes an entity, unlinking the textured model's back-reference. A
    /// character entity takes its character along.
    pub fn entity_remove(&mut self, handle: EntityHandle) -> Result<()> {
        let entity = self
            .entities
            .free(handle)
            .map_err(|_| Error::new(ErrorKind::NotFound))?;

        if let Some(txm) = self.txmodels.get_mut(entity.txmodel) {
            txm.entities.retain(|e| *e != handle);
        }
        if let EntityKind::Character(ch) = entity.kind {
            let _ = self.characters.free(ch);
            if self.control == Some(ch) {
                self.control = None;
            }
            for camera in &mut self.cameras {
                if camera.ch == Some(ch) {
                    camera.ch = None;
                }
            }
        }
        if self.focus == Some(handle) {
            self.focus = None;
        }
        Ok(())
    }

    pub fn character_new(&mut self, txm: TxmHandle) -> Result<CharHandle> {
        let entity = self.entity_new(txm)?;
        let ch = self.characters.allocate(Character::new(entity));
        self.entities.get_mut(entity).unwrap().kind = EntityKind::Character(ch);
        Ok(ch)
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&Entity> {
        self.entities.get(handle)
    }

    pub fn entity_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.entities.get_mut(handle)
    }

    pub fn character(&self, handle: CharHandle) -> Option<&Character> {
        self.characters.get(handle)
    }

    pub fn character_mut(&mut self, handle: CharHandle) -> Option<&mut Character> {
        self.characters.get_mut(handle)
    }

    pub fn txmodel(&self, handle: TxmHandle) -> Option<&TexturedModel> {
        self.txmodels.get(handle)
    }

    pub fn camera(&self) -> &Camera {
        &self.cameras[self.camera_idx]
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.cameras[self.camera_idx]
    }

    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // Focus cycling

    /// All entities in registry order: textured models in insertion order,
    /// each model's entities in placement order.
    fn entity_order(&self) -> Vec<EntityHandle> {
        self.txmodels
            .iter()
            .flat_map(|(_, txm)| txm.entities.iter().copied())
            .collect()
    }

    pub fn focus_next(&mut self) {
        let order = self.entity_order();
        if order.is_empty() {
            self.focus = None;
            return;
        }
        let at = self.focus.and_then(|f| order.iter().position(|e| *e == f));
        self.focus = Some(match at {
            Some(i) => order[(i + 1) % order.len()],
            None => order[0],
        });
    }

    pub fn focus_prev(&mut self) {
        let order = self.entity_order();
        if order.is_empty() {
            self.focus = None;
            return;
        }
        let at = self.focus.and_then(|f| order.iter().position(|e| *e == f));
        self.focus = Some(match at {
            Some(i) => order[(i + order.len() - 1) % order.len()],
            None => order[order.len() - 1],
        });
    }

    pub fn focus_cancel(&mut self) {
        self.focus = None;
    }

    // Input handling

    /// Applies the input events accumulated on the bus since the last frame.
    /// Returns the requests only the engine can act on.
    pub fn drain_inputs(&mut self) -> SceneRequests {
        let events: Vec<InputEvent> = self.inputs.borrow_mut().drain(..).collect();
        for event in events {
            self.apply_input(&event);
        }
        std::mem::take(&mut self.requests)
    }

    fn apply_input(&mut self, event: &InputEvent) {
        let mut requests = SceneRequests::default();

        if event.exit {
            requests.exit = true;
        }
        if event.resize {
            requests.resize = Some((event.x, event.y));
            self.set_dimensions(event.x, event.y);
        }
        if event.fullscreen {
            requests.fullscreen_toggle = true;
        }
        if event.autopilot {
            self.autopilot = !self.autopilot;
        }
        if event.focus_next {
            self.focus_next();
        }
        if event.focus_prev {
            self.focus_prev();
        }
        if event.focus_cancel {
            self.focus_cancel();
        }
        if event.verboser {
            info!("toggle noise");
            self.bus.send(Message::command(CommandMsg {
                flags: CommandFlags::TOGGLE_NOISE,
                ..CommandMsg::default()
            }));
        }

        // Directional input: drives the control character when there is one,
        // nudges the focused entity otherwise, pans the camera as a last
        // resort.
        let mut dir = Vec3::ZERO;
        if event.right {
            dir.x += 1.0;
        }
        if event.left {
            dir.x -= 1.0;
        }
        if event.up {
            dir.z += 1.0;
        }
        if event.down {
            dir.z -= 1.0;
        }
        dir.x += event.delta_lx;
        dir.z -= event.delta_ly;

        if let Some(control) = self.control {
            if dir != Vec3::ZERO {
                let speed = self.speed;
                if let Some(character) = self.characters.get_mut(control) {
                    character.motion += dir * speed;
                }
            }
        } else if let Some(focus) = self.focus {
            if let Some(entity) = self.entities.get_mut(focus) {
                entity.pos.x += 0.1 * dir.x;
                entity.pos.z += 0.1 * dir.z;
            }
        } else {
            let camera = self.camera_mut();
            camera.pos.x += 0.1 * dir.x;
            camera.pos.z += 0.1 * dir.z;
        }

        let camera = self.camera_mut();
        if event.pitch_up && camera.pitch < 90.0 {
            camera.pitch += 5.0;
        }
        if event.pitch_down && camera.pitch > -90.0 {
            camera.pitch -= 5.0;
        }
        if event.yaw_right {
            camera.yaw += 10.0;
            if camera.yaw > 180.0 {
                camera.yaw -= 360.0;
            }
        }
        if event.yaw_left {
            camera.yaw -= 10.0;
            if camera.yaw <= -180.0 {
                camera.yaw += 360.0;
            }
        }
        camera.zoom = event.zoom;
        camera.pos.y += event.delta_ry / 100.0;
        camera.moved += 1;

        self.requests.merge(&requests);
    }

    // Per-frame update protocol

    /// The character move step. Converts the motion vector from units per
    /// second to a per-frame increment, faces the character along it, snaps
    /// non-carrier characters to the terrain, and zeroes the motion.
    pub fn character_move(&mut self, ch: CharHandle, fps_fine: f64) {
        let carrier = self.cameras.get(self.camera_idx).and_then(|c| c.ch);

        let Some(character) = self.characters.get_mut(ch) else {
            return;
        };
        let entity_handle = character.entity;
        let mut entity_xz = None;
        let mut entity_yaw = None;

        if character.motion.length_squared() > 0.0 {
            let inc = character.motion / fps_fine as f32;
            character.pos += inc;
            entity_xz = Some((character.pos.x, character.pos.z));

            let n = inc.normalize();
            entity_yaw = Some(n.x.atan2(n.z));
            character.moved += 1;
        }

        if let Some(terrain) = self.terrain.as_deref() {
            let height = terrain.height(character.pos.x, character.pos.z);
            if carrier != Some(ch) && character.pos.y != height {
                character.pos.y = height;
                character.moved += 1;
            }
        }
        let entity_y = character.pos.y;
        character.motion = Vec3::ZERO;

        if let Some(entity) = self.entities.get_mut(entity_handle) {
            if let Some((x, z)) = entity_xz {
                entity.pos.x = x;
                entity.pos.z = z;
            }
            if let Some(yaw) = entity_yaw {
                entity.rot.y = yaw;
            }
            entity.pos.y = entity_y;
        }
    }

    /// Runs the move step for every character; the orchestrator calls this
    /// before the physics step when a control character exists.
    pub fn characters_move(&mut self, fps_fine: f64) {
        if self.paused {
            return;
        }
        for ch in self.characters.handles() {
            self.character_move(ch, fps_fine);
        }
    }

    fn light_update(&mut self) {
        let angle = (self.frames_total as f32 / 4.0).to_radians();
        self.light.pos.x = 30.0 * angle.cos();
        self.light.pos.y = 30.0 * angle.sin();
        self.light.pos.z = 0.0;
    }

    fn entity_update(&mut self, handle: EntityHandle, physics: &mut dyn Physics, fps_fine: f64) {
        let Some(entity) = self.entities.get(handle) else {
            return;
        };
        let kind = entity.kind;
        let body = entity.body;

        match kind {
            EntityKind::Generic => {
                self.entities.get_mut(handle).unwrap().recompute_base();
            }
            EntityKind::Character(ch) => {
                // Pull the authoritative position out of the physics body,
                // run the move step, push the result back.
                if let Some(body) = body {
                    if let Some(pose) = physics.body_pose(body) {
                        let entity = self.entities.get_mut(handle).unwrap();
                        entity.pos = pose.position;
                    }
                    if let Some(character) = self.characters.get_mut(ch) {
                        character.pos = self.entities.get(handle).unwrap().pos;
                    }
                }

                self.character_move(ch, fps_fine);

                if let Some(body) = body {
                    if let Some(character) = self.characters.get(ch) {
                        let mut pose = physics.body_pose(body).unwrap_or_default();
                        pose.position = character.pos;
                        physics.set_body_pose(body, pose);
                    }
                }

                self.entities.get_mut(handle).unwrap().recompute_base();
            }
        }
    }

    /// The entity update pass. Observes post-step physics state; runs after
    /// the physics step and the network poll.
    pub fn update(&mut self, physics: &mut dyn Physics, fps_fine: f64) {
        self.light_update();

        if !self.paused {
            for txm in self.txmodels.handles() {
                let entities = match self.txmodels.get(txm) {
                    Some(txm) => txm.entities.clone(),
                    None => continue,
                };
                for entity in entities {
                    self.entity_update(entity, physics, fps_fine);
                }
            }
        }

        self.frames_total += 1;
    }

    /// Recomputes every camera's view matrices; follow cameras are first
    /// re-anchored to their carrier.
    pub fn cameras_calc(&mut self) {
        if self.autopilot {
            self.camera_autopilot();
        }

        for i in 0..self.cameras.len() {
            let target = self.cameras[i]
                .ch
                .and_then(|ch| self.characters.get(ch))
                .map(|character| character.pos);
            let camera = &mut self.cameras[i];
            if let Some(target) = target {
                camera.follow(target);
            }
            camera.calc();
        }
    }

    fn camera_autopilot(&mut self) {
        let t = self.frames_total as f32;
        let camera = &mut self.cameras[self.camera_idx];
        camera.pos.x = 12.0 * (t.to_radians() / 4.0).cos();
        camera.pos.y = 2.0 * (t.to_radians() / 10.0).sin() + 4.0;
        camera.pos.z = 12.0 * (t.to_radians() / 4.0).sin() + 9.0;
        camera.yaw = -((self.frames_total % 1440) as f32) / 4.0 + 90.0;
        camera.moved += 1;
    }

    // Render handoff

    /// Collects debug draws sent over the bus into the scene queue.
    pub fn collect_debug_draws(&mut self) {
        self.debug_draws.extend(self.ddraws.borrow_mut().drain(..));
    }

    pub fn debug_draw_count(&self) -> usize {
        self.debug_draws.len()
    }

    /// Builds the frame's render queue. Debug geometry is moved out: it
    /// lives exactly one frame.
    pub fn build_render_queue(&mut self) -> RenderQueue {
        self.collect_debug_draws();

        let mut queue = RenderQueue::default();
        for (_, txm) in self.txmodels.iter() {
            for entity_handle in &txm.entities {
                let Some(entity) = self.entities.get(*entity_handle) else {
                    continue;
                };
                if !entity.visible {
                    continue;
                }
                queue.items.push(RenderItem {
                    model: txm.model.clone(),
                    texture: txm.texture.clone(),
                    transform: entity.mx,
                    color: entity.color,
                });
            }
        }
        queue.debug = std::mem::take(&mut self.debug_draws);
        queue
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        for token in self.tokens {
            let _ = self.bus.unsubscribe(token);
        }
    }
}
