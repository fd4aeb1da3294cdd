//! Textured models and entities.
//!
//! A [`Model`] is a geometry resource and a [`TextureSet`] its textures; both
//! are opaque to the core (mesh and image loading live outside) and shared
//! through [`Arc`]. A [`TexturedModel`] pairs them into a rendering group and
//! keeps back-references to the entities placed with it; the entities
//! themselves hold the strong link, the scene unlinks the back-reference when
//! an entity is removed.

use crate::glue::BodyId;
use crate::track::ClassGuard;
use applause_utils::PoolHandle;
use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};
use smallvec::SmallVec;
use std::sync::Arc;

pub struct Model {
    pub name: String,
    _class: ClassGuard,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            _class: ClassGuard::new("model"),
        })
    }
}

pub struct TextureSet {
    pub name: String,
    _class: ClassGuard,
}

impl TextureSet {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            _class: ClassGuard::new("texture_set"),
        })
    }
}

pub type TxmHandle = PoolHandle<TexturedModel>;
pub type EntityHandle = PoolHandle<Entity>;
pub type CharHandle = PoolHandle<crate::scene::character::Character>;

pub struct TexturedModel {
    pub model: Arc<Model>,
    pub texture: Arc<TextureSet>,
    /// Back-references only; removal happens through
    /// [`Scene::entity_remove`](crate::scene::Scene::entity_remove).
    pub entities: SmallVec<[EntityHandle; 8]>,
    pub(crate) _class: ClassGuard,
}

impl TexturedModel {
    pub fn name(&self) -> &str {
        &self.model.name
    }
}

/// The polymorphism point of the per-frame update: what else an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Generic,
    Character(CharHandle),
}

/// An instance of a textured model placed in the scene.
pub struct Entity {
    pub txmodel: TxmHandle,
    pub pos: Vec3,
    /// Euler rotation (radians) around x/y/z.
    pub rot: Vec3,
    pub scale: f32,
    pub visible: bool,
    pub color: Vec4,
    pub body: Option<BodyId>,
    pub base_mx: Mat4,
    pub mx: Mat4,
    pub kind: EntityKind,
    pub(crate) _class: ClassGuard,
}

impl Entity {
    pub(crate) fn new(txmodel: TxmHandle) -> Self {
        Self {
            txmodel,
            pos: Vec3::ZERO,
            rot: Vec3::ZERO,
            scale: 1.0,
            visible: true,
            color: Vec4::ONE,
            body: None,
            base_mx: Mat4::IDENTITY,
            mx: Mat4::IDENTITY,
            kind: EntityKind::Generic,
            _class: ClassGuard::new("entity"),
        }
    }

    /// The default update: rebuild the base transform from position,
    /// rotation and scale.
    pub fn recompute_base(&mut self) {
        let rotation = Quat::from_euler(EulerRot::XYZ, self.rot.x, self.rot.y, self.rot.z);
        self.base_mx =
            Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), rotation, self.pos);
        self.mx = self.base_mx;
    }
}
