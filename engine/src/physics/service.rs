//! Physics service: the public entry point of the physics core
//!
//! Every operation here is non-blocking with respect to the engine. Scene
//! code enqueues work; the simulation loop applies it at the start of its
//! next tick; [`PhysicsService::step`] brings results back on the consuming
//! thread.

use crate::config::PhysicsConfig;
use crate::physics::simulation::{Shared, Simulation};
use crate::physics::{AssemblyInfo, Explosion, ExplosionHit, Mutation, PhysicsError};
use crate::scene::{Joint, Part};
use glam::DVec3;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Scene property edits the physics core reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartProperty {
    Pose,
    Anchored,
    Size,
    Surfaces,
}

/// What happened since the previous [`PhysicsService::step`]
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Parts that fell below the destroy height; already unregistered, the
    /// scene should drop them
    pub fallen: Vec<Arc<Part>>,
    /// Authored joints removed by breaks or explosions
    pub broken_joints: Vec<Arc<Joint>>,
    pub explosion_hits: Vec<ExplosionHit>,
    /// Number of part poses updated from the simulation
    pub synced: usize,
    /// Number of contact pairs delivered to `touched` subscribers
    pub contacts: usize,
}

/// Control handle for the simulation thread
struct LoopControlHandle {
    stop_sender: Sender<()>,
    thread_handle: thread::JoinHandle<()>,
}

pub struct PhysicsService {
    shared: Arc<Shared>,
    simulation: Arc<Mutex<Simulation>>,
    control_handle: Mutex<Option<LoopControlHandle>>,
    destroy_height: RwLock<f64>,
}

impl std::fmt::Debug for PhysicsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsService")
            .field("running", &self.is_running())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl PhysicsService {
    /// Create the service and its engine; fails only on invalid configuration
    pub fn new(config: PhysicsConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        let destroy_height = config.destroy_height;
        let shared = Arc::new(Shared::new(config));
        let simulation = Arc::new(Mutex::new(Simulation::new(shared.clone())));
        info!("Physics service created");
        Ok(Self {
            shared,
            simulation,
            control_handle: Mutex::new(None),
            destroy_height: RwLock::new(destroy_height),
        })
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.shared.config
    }

    /// Start the background simulation thread. Starting twice is a no-op.
    pub fn start(&self) -> Result<(), PhysicsError> {
        let mut control = self.control_handle.lock().unwrap_or_else(PoisonError::into_inner);
        if control.is_some() {
            warn!("Physics simulation already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let simulation = self.simulation.clone();
        let interval = Duration::from_micros(self.shared.config.tick_interval_micros);
        let thread_handle = thread::Builder::new()
            .name("physics".to_string())
            .spawn(move || {
                info!("Physics simulation loop started");
                let mut last = Instant::now();
                loop {
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f64();
                    last = now;
                    simulation
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .tick(dt);

                    match stop_rx.recv_timeout(interval) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => continue,
                    }
                }
                info!("Physics simulation loop stopped");
            })
            .map_err(PhysicsError::ThreadSpawn)?;

        *control = Some(LoopControlHandle {
            stop_sender: stop_tx,
            thread_handle,
        });
        Ok(())
    }

    /// Stop the background thread and wait for it. Queued work stays queued.
    pub fn stop(&self) {
        let control = self
            .control_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(control) = control {
            let _ = control.stop_sender.send(());
            if control.thread_handle.join().is_err() {
                error!("Physics simulation thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.control_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run one simulation tick on the calling thread
    pub fn tick(&self, dt: f64) {
        self.simulation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tick(dt);
    }

    pub fn register(&self, part: &Arc<Part>) {
        self.shared.mutations.register(part);
    }

    pub fn unregister(&self, part: &Part) {
        self.shared.mutations.unregister(part.id());
    }

    pub fn bulk_register(&self, parts: &[Arc<Part>]) {
        self.shared.mutations.bulk_register(parts);
    }

    pub fn bulk_unregister(&self, parts: &[Arc<Part>]) {
        for part in parts {
            self.shared.mutations.unregister(part.id());
        }
    }

    /// Buffer registrations while a scene streams in; turning deferral off
    /// queues the buffer as one batch
    pub fn set_defer_registration(&self, defer: bool) {
        self.shared.mutations.set_defer(defer);
    }

    pub fn register_constraint(&self, joint: &Arc<Joint>) {
        self.shared.mutations.push(Mutation::AddConstraint(joint.clone()));
    }

    pub fn unregister_constraint(&self, joint: &Joint) {
        self.shared.mutations.push(Mutation::RemoveConstraint(joint.id()));
    }

    pub fn request_assembly_update(&self, part: &Part) {
        self.shared.mutations.push(Mutation::AssemblyRebuild(part.id()));
    }

    pub fn break_joints(&self, part: &Part) {
        self.shared.mutations.push(Mutation::BreakJoints(part.id()));
    }

    pub fn break_joints_in_radius(&self, center: DVec3, radius: f64) {
        self.shared
            .mutations
            .push(Mutation::BreakJointsInRadius { center, radius });
    }

    pub fn queue_explosion(&self, position: DVec3, radius: f64, pressure: f64) {
        self.shared.mutations.push_explosion(Explosion {
            position,
            radius,
            pressure,
        });
    }

    /// Last synced linear and angular velocity of a part
    pub fn velocity(&self, part: &Part) -> (DVec3, DVec3) {
        (part.linear_velocity(), part.angular_velocity())
    }

    /// Set a part's velocity; the whole assembly takes it on the next tick
    pub fn set_velocity(&self, part: &Part, linear: DVec3, angular: DVec3) {
        part.update(|properties| {
            properties.linear_velocity = linear;
            properties.angular_velocity = angular;
        });
        self.shared.mutations.push(Mutation::SetVelocity {
            part: part.id(),
            linear,
            angular,
        });
    }

    /// React to an edit of a registered part's properties
    pub fn notify_property_changed(&self, part: &Arc<Part>, property: PartProperty) {
        debug!(part = %part.id(), ?property, "Part property changed");
        match property {
            PartProperty::Pose => self.shared.mutations.push(Mutation::SetPose(part.id())),
            PartProperty::Anchored => self.request_assembly_update(part),
            PartProperty::Size => {
                self.unregister(part);
                self.register(part);
            }
            // Surfaces are read live by the join detector
            PartProperty::Surfaces => {}
        }
    }

    /// Change a velocity motor's speed and push it into the running
    /// constraint. Returns false for every other joint kind.
    pub fn set_motor_velocity(&self, joint: &Joint, velocity: f64) -> bool {
        if !joint.set_motor_velocity(velocity) {
            return false;
        }
        self.shared.mutations.push(Mutation::RetuneMotor(joint.id()));
        true
    }

    pub fn set_gravity(&self, gravity: DVec3) {
        self.shared.mutations.push(Mutation::SetGravity(gravity));
    }

    pub fn destroy_height(&self) -> f64 {
        *self.destroy_height.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_destroy_height(&self, height: f64) {
        *self.destroy_height.write().unwrap_or_else(PoisonError::into_inner) = height;
    }

    /// Consumer-side frame: apply synced transforms, unregister parts below
    /// the destroy height and fire `touched` for new contacts. `dt` is the
    /// consumer's frame time; the simulation keeps its own clock.
    pub fn step(&self, dt: f64) -> FrameReport {
        trace!(dt, "Physics consumer step");
        let destroy_height = self.destroy_height();
        let mut report = FrameReport::default();

        let updates = self.shared.sync.transforms.take();
        {
            let maps = self.shared.snapshot();
            for update in updates {
                if !maps.is_registered(update.id) {
                    continue;
                }
                let Some(part) = update.part.upgrade() else {
                    continue;
                };
                if update.pose.position.y < destroy_height {
                    report.fallen.push(part);
                } else {
                    part.apply_sync(update.pose, update.linear_velocity, update.angular_velocity);
                    report.synced += 1;
                }
            }
        }

        for part in &report.fallen {
            info!(part = %part.id(), name = part.name(), "Part fell out of the world");
            self.unregister(part);
        }

        for contact in self.shared.sync.contacts.take() {
            let (Some(part0), Some(part1)) = (contact.part0.upgrade(), contact.part1.upgrade())
            else {
                continue;
            };
            part0.touched.fire(&part1);
            part1.touched.fire(&part0);
            report.contacts += 1;
        }

        report.broken_joints = self.shared.sync.broken_joints.take();
        report.explosion_hits = self.shared.sync.explosion_hits.take();
        report
    }

    pub fn is_registered(&self, part: &Part) -> bool {
        self.shared.snapshot().is_registered(part.id())
    }

    pub fn assembly_of(&self, part: &Part) -> Option<AssemblyInfo> {
        self.shared
            .snapshot()
            .assembly_of(part.id())
            .map(|assembly| assembly.info())
    }

    pub fn assemblies(&self) -> Vec<AssemblyInfo> {
        self.shared
            .snapshot()
            .assemblies()
            .map(|assembly| assembly.info())
            .collect()
    }

    /// Whether the two parts are currently rigidly joined
    pub fn has_joint_between(&self, a: &Part, b: &Part) -> bool {
        self.shared.registry.contains(a.id(), b.id())
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn simulation(&self) -> &Arc<Mutex<Simulation>> {
        &self.simulation
    }
}

impl Drop for PhysicsService {
    fn drop(&mut self) {
        self.stop();
    }
}
