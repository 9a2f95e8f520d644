//! Box-shaped physical parts
//!
//! A [`Part`] is owned by the scene (`Arc<Part>`). The physics core only keeps
//! [`PartId`] keys and `Weak<Part>` references, so dropping a part from the
//! scene is always safe: the core skips it on its next drain.

use crate::core::{Pose, Signal};
use crate::physics::BodyHandle;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

static NEXT_PART_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier of a part, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartId(u64);

impl PartId {
    fn next() -> Self {
        Self(NEXT_PART_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl std::fmt::Display for PartId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "part#{}", self.0)
    }
}

/// Surface finish of one face; decides whether contacts dock into joints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SurfaceType {
    #[default]
    Smooth,
    Glue,
    Weld,
    Studs,
    Inlets,
    Universal,
    Hinge,
    Motor,
    SteppingMotor,
}

/// The six faces of a box, in part-local space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    /// +Y
    Top,
    /// -Y
    Bottom,
    /// -X
    Left,
    /// +X
    Right,
    /// -Z
    Front,
    /// +Z
    Back,
}

impl Face {
    /// Face whose outward normal is closest to `normal` (dominant axis wins)
    pub fn from_local_normal(normal: DVec3) -> Face {
        let abs = normal.abs();
        if abs.y >= abs.x && abs.y >= abs.z {
            if normal.y >= 0.0 {
                Face::Top
            } else {
                Face::Bottom
            }
        } else if abs.x >= abs.z {
            if normal.x >= 0.0 {
                Face::Right
            } else {
                Face::Left
            }
        } else if normal.z >= 0.0 {
            Face::Back
        } else {
            Face::Front
        }
    }
}

/// Per-face surface types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Surfaces {
    pub top: SurfaceType,
    pub bottom: SurfaceType,
    pub left: SurfaceType,
    pub right: SurfaceType,
    pub front: SurfaceType,
    pub back: SurfaceType,
}

impl Surfaces {
    /// Classic brick: studs on top, inlets underneath, smooth sides
    pub fn brick() -> Self {
        Self {
            top: SurfaceType::Studs,
            bottom: SurfaceType::Inlets,
            ..Default::default()
        }
    }

    pub fn get(&self, face: Face) -> SurfaceType {
        match face {
            Face::Top => self.top,
            Face::Bottom => self.bottom,
            Face::Left => self.left,
            Face::Right => self.right,
            Face::Front => self.front,
            Face::Back => self.back,
        }
    }
}

/// Scene-visible properties of a part
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartProperties {
    /// World pose
    pub pose: Pose,
    /// Full box dimensions
    pub size: DVec3,
    /// Anchored parts never move; any anchored member makes its assembly static
    pub anchored: bool,
    pub surfaces: Surfaces,
    /// Last velocity synced from the simulation
    pub linear_velocity: DVec3,
    /// Last angular velocity synced from the simulation
    pub angular_velocity: DVec3,
}

impl Default for PartProperties {
    fn default() -> Self {
        Self {
            pose: Pose::IDENTITY,
            size: DVec3::new(4.0, 1.2, 2.0),
            anchored: false,
            surfaces: Surfaces::default(),
            linear_velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
        }
    }
}

impl PartProperties {
    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_position(mut self, position: DVec3) -> Self {
        self.pose.position = position;
        self
    }

    pub fn with_size(mut self, size: DVec3) -> Self {
        self.size = size;
        self
    }

    pub fn with_anchored(mut self, anchored: bool) -> Self {
        self.anchored = anchored;
        self
    }

    pub fn with_surfaces(mut self, surfaces: Surfaces) -> Self {
        self.surfaces = surfaces;
        self
    }
}

/// A box-shaped physical object
pub struct Part {
    id: PartId,
    name: String,
    properties: RwLock<PartProperties>,
    body: RwLock<Option<BodyHandle>>,
    /// Fired on the consuming thread with the other part when contact begins
    pub touched: Signal<Arc<Part>>,
}

impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Part")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("properties", &self.properties())
            .field("body", &self.body_handle())
            .finish()
    }
}

impl Part {
    /// Create a new part with a fresh id
    pub fn new(name: impl Into<String>, properties: PartProperties) -> Arc<Part> {
        Arc::new(Part {
            id: PartId::next(),
            name: name.into(),
            properties: RwLock::new(properties),
            body: RwLock::new(None),
            touched: Signal::new(),
        })
    }

    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of all properties
    pub fn properties(&self) -> PartProperties {
        *self.properties.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pose(&self) -> Pose {
        self.properties().pose
    }

    pub fn size(&self) -> DVec3 {
        self.properties().size
    }

    pub fn is_anchored(&self) -> bool {
        self.properties().anchored
    }

    pub fn volume(&self) -> f64 {
        let size = self.size();
        size.x * size.y * size.z
    }

    pub fn surface(&self, face: Face) -> SurfaceType {
        self.properties().surfaces.get(face)
    }

    /// Surface on the face pointed at by a part-local normal
    pub fn surface_for_normal(&self, local_normal: DVec3) -> SurfaceType {
        self.surface(Face::from_local_normal(local_normal))
    }

    pub fn linear_velocity(&self) -> DVec3 {
        self.properties().linear_velocity
    }

    pub fn angular_velocity(&self) -> DVec3 {
        self.properties().angular_velocity
    }

    /// Engine body currently simulating this part, if registered and built
    pub fn body_handle(&self) -> Option<BodyHandle> {
        *self.body.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edit properties in place. Callers owning the scene must report the edit
    /// to the physics service (see `Workspace`), otherwise the simulation keeps
    /// the old values.
    pub fn update<F>(&self, edit: F)
    where
        F: FnOnce(&mut PartProperties),
    {
        let mut properties = self.properties.write().unwrap_or_else(PoisonError::into_inner);
        edit(&mut properties);
    }

    pub(crate) fn set_body_handle(&self, handle: Option<BodyHandle>) {
        *self.body.write().unwrap_or_else(PoisonError::into_inner) = handle;
    }

    pub(crate) fn apply_sync(&self, pose: Pose, linear_velocity: DVec3, angular_velocity: DVec3) {
        self.update(|properties| {
            properties.pose = pose;
            properties.linear_velocity = linear_velocity;
            properties.angular_velocity = angular_velocity;
        });
    }
}
