//! Structural commands queued for the simulation loop
//!
//! Any thread may enqueue; the loop swaps the whole queue out at tick start
//! and applies it on the simulation thread. Explosions travel in their own
//! lane because they are resolved before every other mutation.

use crate::scene::{Joint, JointId, Part, PartId};
use glam::DVec3;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::debug;

/// Pending structural change
#[derive(Debug, Clone)]
pub enum Mutation {
    Register(Weak<Part>),
    BulkRegister(Vec<Weak<Part>>),
    Unregister(PartId),
    AddConstraint(Arc<Joint>),
    RemoveConstraint(JointId),
    /// Proposed by the join detector; the pair is already claimed in the registry
    AutoJoin {
        part0: Weak<Part>,
        part1: Weak<Part>,
    },
    AssemblyRebuild(PartId),
    BreakJoints(PartId),
    BreakJointsInRadius {
        center: DVec3,
        radius: f64,
    },
    /// Move the part's assembly so the part lands on its scene pose
    SetPose(PartId),
    SetVelocity {
        part: PartId,
        linear: DVec3,
        angular: DVec3,
    },
    /// Push a joint's current motor parameters into its engine constraint
    RetuneMotor(JointId),
    SetGravity(DVec3),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Explosion {
    pub position: DVec3,
    pub radius: f64,
    pub pressure: f64,
}

#[derive(Debug, Default)]
struct QueueState {
    mutations: Vec<Mutation>,
    explosions: Vec<Explosion>,
    deferring: bool,
    deferred: Vec<Weak<Part>>,
}

/// Thread-safe queue of pending mutations
#[derive(Debug, Default)]
pub struct MutationQueue {
    state: Mutex<QueueState>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, mutation: Mutation) {
        self.lock().mutations.push(mutation);
    }

    pub fn push_explosion(&self, explosion: Explosion) {
        self.lock().explosions.push(explosion);
    }

    /// Queue a registration, or buffer it while deferral is on
    pub fn register(&self, part: &Arc<Part>) {
        let mut state = self.lock();
        if state.deferring {
            state.deferred.push(Arc::downgrade(part));
        } else {
            state.mutations.push(Mutation::Register(Arc::downgrade(part)));
        }
    }

    pub fn bulk_register(&self, parts: &[Arc<Part>]) {
        let weak: Vec<Weak<Part>> = parts.iter().map(Arc::downgrade).collect();
        let mut state = self.lock();
        if state.deferring {
            state.deferred.extend(weak);
        } else if !weak.is_empty() {
            state.mutations.push(Mutation::BulkRegister(weak));
        }
    }

    /// Queue an unregistration. A part still waiting in the deferral buffer
    /// is simply dropped from it.
    pub fn unregister(&self, part: PartId) {
        let mut state = self.lock();
        state
            .deferred
            .retain(|weak| weak.upgrade().is_some_and(|p| p.id() != part));
        state.mutations.push(Mutation::Unregister(part));
    }

    /// Toggle deferred registration. Turning it off flushes the buffer as a
    /// single batch.
    pub fn set_defer(&self, defer: bool) {
        let mut state = self.lock();
        if state.deferring == defer {
            return;
        }
        state.deferring = defer;
        if !defer {
            let deferred = std::mem::take(&mut state.deferred);
            if !deferred.is_empty() {
                debug!(count = deferred.len(), "Flushing deferred registrations");
                state.mutations.push(Mutation::BulkRegister(deferred));
            }
        }
    }

    pub fn is_deferring(&self) -> bool {
        self.lock().deferring
    }

    pub fn deferred_len(&self) -> usize {
        self.lock().deferred.len()
    }

    pub fn take_mutations(&self) -> Vec<Mutation> {
        std::mem::take(&mut self.lock().mutations)
    }

    pub fn take_explosions(&self) -> Vec<Explosion> {
        std::mem::take(&mut self.lock().explosions)
    }

    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.mutations.len() + state.explosions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
