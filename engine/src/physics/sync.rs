//! Hand-off buffers from the simulation thread to the consuming thread
//!
//! Each buffer is a plain container behind a `Mutex`. Producers append; the
//! consumer swaps the whole content out and processes it without holding the
//! lock.

use crate::core::Pose;
use crate::scene::{Joint, Part, PartId};
use glam::DVec3;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Append-only event lane
#[derive(Debug)]
pub struct EventQueue<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> EventQueue<T> {
    pub fn push(&self, item: T) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(items);
    }

    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Latest simulated state of one part
#[derive(Debug, Clone)]
pub struct TransformUpdate {
    pub id: PartId,
    pub part: Weak<Part>,
    pub pose: Pose,
    pub linear_velocity: DVec3,
    pub angular_velocity: DVec3,
}

/// Two parts that started touching
#[derive(Debug, Clone)]
pub struct ContactEvent {
    pub part0: Weak<Part>,
    pub part1: Weak<Part>,
}

/// A part caught inside an explosion radius
#[derive(Debug, Clone)]
pub struct ExplosionHit {
    pub id: PartId,
    pub part: Weak<Part>,
    pub distance: f64,
}

impl ExplosionHit {
    pub fn part(&self) -> Option<Arc<Part>> {
        self.part.upgrade()
    }
}

/// Pose buffer keeping only the newest update per part, so a slow consumer
/// never sees unbounded growth
#[derive(Debug, Default)]
pub struct TransformBuffer {
    latest: Mutex<HashMap<PartId, TransformUpdate>>,
}

impl TransformBuffer {
    pub fn publish(&self, updates: Vec<TransformUpdate>) {
        if updates.is_empty() {
            return;
        }
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        for update in updates {
            latest.insert(update.id, update);
        }
    }

    pub fn take(&self) -> Vec<TransformUpdate> {
        let latest = std::mem::take(&mut *self.latest.lock().unwrap_or_else(PoisonError::into_inner));
        latest.into_values().collect()
    }

    /// Forget a part's pending update, e.g. after it was unregistered
    pub fn discard(&self, part: PartId) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&part);
    }

    pub fn len(&self) -> usize {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All per-purpose lanes read by the consuming thread
#[derive(Debug, Default)]
pub struct SyncBuffers {
    pub transforms: TransformBuffer,
    pub contacts: EventQueue<ContactEvent>,
    /// Authored joints removed by the simulation (breaks and explosions)
    pub broken_joints: EventQueue<Arc<Joint>>,
    pub explosion_hits: EventQueue<ExplosionHit>,
}

impl SyncBuffers {
    pub fn new() -> Self {
        Self::default()
    }
}
