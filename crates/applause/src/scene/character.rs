//! Characters: entities with motion and orientation state.

use crate::scene::model::EntityHandle;
use crate::track::ClassGuard;
use glam::Vec3;

/// A character wraps an entity and adds what it takes to be driven around:
/// a motion vector written by input (units per second), orientation angles
/// and turn rates. The entity's update is overridden to integrate motion and
/// synchronize the physics body; see the scene's update protocol.
pub struct Character {
    pub entity: EntityHandle,
    pub pos: Vec3,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    /// Requested motion in units per second; consumed (and zeroed) once per
    /// frame by the move step.
    pub motion: Vec3,
    pub angle: Vec3,
    pub yaw_turn: f32,
    pub pitch_turn: f32,
    /// Bumped whenever the move step changed the character's position.
    pub moved: u32,
    pub(crate) _class: ClassGuard,
}

impl Character {
    pub(crate) fn new(entity: EntityHandle) -> Self {
        Self {
            entity,
            pos: Vec3::ZERO,
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            motion: Vec3::ZERO,
            angle: Vec3::ZERO,
            yaw_turn: 0.0,
            pitch_turn: 0.0,
            moved: 0,
            _class: ClassGuard::new("character"),
        }
    }
}
