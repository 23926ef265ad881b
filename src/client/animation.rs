//! Roll Animation
//!
//! Client-side lifecycle of one animated roll:
//!
//! ```text
//! Idle -> Thrown -> Settling -> Reconciled -> Idle
//! ```
//!
//! The physics engine is an external collaborator reached through
//! [`PhysicsWorld`]. This module plans the throw, polls for settle once
//! per frame, reads each die's face and relabels it to the authoritative
//! value when one was supplied. Nothing here blocks: the host calls
//! [`RollAnimation::frame`] from its render loop.

use std::f64::consts::{PI, TAU};

use tracing::{debug, warn};

use crate::core::rng::RandomSource;
use crate::core::vec3::{Quat, Vec3};
use crate::dice::{DieKind, RollOutcome};
use crate::network::protocol::ThrowVector;
use super::reconcile::{read_value, reconcile_all, FaceLabels, ReconcileError};

/// Damping applied to every die body.
pub const LINEAR_DAMPING: f64 = 0.1;
pub const ANGULAR_DAMPING: f64 = 0.1;

/// Height thrown dice start from, before the random lift.
const THROW_HEIGHT: f64 = 600.0;
/// Upward launch speed, before the random lift.
const THROW_LIFT: f64 = 800.0;
/// Height of resting dice.
const REST_HEIGHT: f64 = 150.0;

// =============================================================================
// Physics seam
// =============================================================================

/// Handle of a body inside a [`PhysicsWorld`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub usize);

/// Everything needed to insert one die into the simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodySpec {
    pub kind: DieKind,
    pub mass: f64,
    pub position: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub orientation: Quat,
    pub linear_damping: f64,
    pub angular_damping: f64,
}

impl BodySpec {
    /// A die at rest at `position`.
    pub fn resting(kind: DieKind, position: Vec3, orientation: Quat) -> Self {
        Self {
            kind,
            mass: kind.mass(),
            position,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            orientation,
            linear_damping: LINEAR_DAMPING,
            angular_damping: ANGULAR_DAMPING,
        }
    }
}

/// Snapshot of one body after a step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
}

/// The physics engine, as far as a roll is concerned.
pub trait PhysicsWorld {
    /// Remove every body.
    fn clear(&mut self);

    /// Insert a body.
    fn add_body(&mut self, spec: &BodySpec) -> BodyHandle;

    /// Advance the simulation by `dt` seconds.
    fn step(&mut self, dt: f64);

    /// Current state of a body, `None` if the handle is stale.
    fn body(&self, handle: BodyHandle) -> Option<BodyState>;
}

// =============================================================================
// Settle detection
// =============================================================================

/// Settle tuning. Empirical values, not physical constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SettleConfig {
    /// Every velocity component must stay below this.
    pub velocity_threshold: f64,
    /// Frames a die must stay still, after the first still one.
    pub settle_frames: u32,
    /// Simulated seconds before the roll is forced to finish.
    pub budget_secs: f64,
    /// Simulated seconds per frame at speed 1.
    pub frame_step: f64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            velocity_threshold: 6.0,
            settle_frames: 3,
            budget_secs: 10.0,
            frame_step: 1.0 / 60.0,
        }
    }
}

impl SettleConfig {
    /// Simulation time advanced per frame.
    pub fn step_dt(&self, speed: f64) -> f64 {
        self.frame_step * speed
    }

    /// Frame count after which the roll finishes regardless of motion.
    pub fn max_iterations(&self, speed: f64) -> u32 {
        let dt = self.step_dt(speed);
        if dt <= 0.0 || !dt.is_finite() {
            return 0;
        }
        // Tolerate the rounding of 1/60 so 10 s at speed 1 is 600 frames.
        (self.budget_secs / dt - 1e-9).ceil().max(0.0) as u32
    }

    fn is_still(&self, state: &BodyState) -> bool {
        state.velocity.max_abs() < self.velocity_threshold
            && state.angular_velocity.max_abs() < self.velocity_threshold
    }
}

/// Per-die settle progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StopMarker {
    #[default]
    Moving,
    /// Still since this iteration.
    StoppedAt(u32),
    Settled,
}

impl StopMarker {
    /// Advance the marker for one observation.
    pub fn observe(self, still: bool, iteration: u32, settle_frames: u32) -> Self {
        match (self, still) {
            (StopMarker::Settled, _) => StopMarker::Settled,
            (_, false) => StopMarker::Moving,
            (StopMarker::StoppedAt(since), true) if iteration - since > settle_frames => {
                StopMarker::Settled
            }
            (StopMarker::StoppedAt(since), true) => StopMarker::StoppedAt(since),
            (StopMarker::Moving, true) => StopMarker::StoppedAt(iteration),
        }
    }
}

// =============================================================================
// Throw planning
// =============================================================================

/// Half extents of the throwing area, in world units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThrowArea {
    pub half_width: f64,
    pub half_height: f64,
}

/// Rotate a unit direction by a random angle within ±18°.
fn spread(direction: (f64, f64), rng: &mut dyn RandomSource) -> (f64, f64) {
    let angle = rng.next_unit() * PI / 5.0 - PI / 10.0;
    let (sin, cos) = angle.sin_cos();
    let mut x = direction.0 * cos - direction.1 * sin;
    let mut y = direction.0 * sin + direction.1 * cos;
    if x == 0.0 {
        x = 0.01;
    }
    if y == 0.0 {
        y = 0.01;
    }
    (x, y)
}

fn random_orientation(rng: &mut dyn RandomSource) -> Quat {
    let axis = Vec3::new(rng.next_unit(), rng.next_unit(), rng.next_unit());
    Quat::from_axis_angle(axis, rng.next_unit() * TAU)
}

/// Initial bodies for a throw.
///
/// Uses `gesture` when given, otherwise a random swipe across the area.
/// Returns `None` for an empty set or a zero-length gesture.
pub fn plan_throw(
    kinds: &[DieKind],
    area: ThrowArea,
    gesture: Option<ThrowVector>,
    rng: &mut dyn RandomSource,
) -> Option<Vec<BodySpec>> {
    if kinds.is_empty() {
        return None;
    }
    let gesture = match gesture {
        Some(g) => g,
        None => ThrowVector {
            x: (rng.next_unit() * 2.0 - 1.0) * area.half_width,
            y: -(rng.next_unit() * 2.0 - 1.0) * area.half_height,
        },
    };
    if !gesture.is_usable() {
        return None;
    }

    let dist = (gesture.x * gesture.x + gesture.y * gesture.y).sqrt();
    let boost = (rng.next_unit() + 3.0) * dist;
    let direction = (gesture.x / dist, gesture.y / dist);

    let specs = kinds
        .iter()
        .map(|&kind| {
            let (px, py) = spread(direction, rng);
            let mut position = Vec3::new(
                area.half_width * if px > 0.0 { -1.0 } else { 1.0 } * 0.9,
                area.half_height * if py > 0.0 { -1.0 } else { 1.0 } * 0.9,
                rng.next_unit() * 200.0 + THROW_HEIGHT,
            );
            // Start from the edge the throw points away from.
            let projector = (px / py).abs();
            if projector > 1.0 {
                position.y /= projector;
            } else {
                position.x *= projector;
            }

            let (vx, vy) = spread(direction, rng);
            let velocity = Vec3::new(vx * boost, vy * boost, rng.next_unit() * 200.0 + THROW_LIFT);

            let inertia = kind.inertia();
            let angular_velocity = Vec3::new(
                -(rng.next_unit() * py * 5.0 + inertia * py),
                rng.next_unit() * px * 5.0 + inertia * px,
                0.0,
            );

            BodySpec {
                kind,
                mass: kind.mass(),
                position,
                velocity,
                angular_velocity,
                orientation: random_orientation(rng),
                linear_damping: LINEAR_DAMPING,
                angular_damping: ANGULAR_DAMPING,
            }
        })
        .collect();
    Some(specs)
}

/// Idle display: one die centred, several on a circle.
pub fn resting_layout(kinds: &[DieKind], scale: f64, rng: &mut dyn RandomSource) -> Vec<BodySpec> {
    let n = kinds.len();
    kinds
        .iter()
        .enumerate()
        .map(|(i, &kind)| {
            let position = if n <= 1 {
                Vec3::new(0.0, 0.0, REST_HEIGHT)
            } else {
                let radius = scale * 1.2 + n as f64 * 8.0;
                let angle = i as f64 * TAU / n as f64;
                Vec3::new(radius * angle.cos(), radius * angle.sin(), REST_HEIGHT + i as f64 * 5.0)
            };
            BodySpec::resting(kind, position, random_orientation(rng))
        })
        .collect()
}

// =============================================================================
// Animation state machine
// =============================================================================

/// Animation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnimationError {
    /// A roll is already animating and cannot be cancelled.
    #[error("a roll is already in progress")]
    Busy,

    #[error("no roll in progress")]
    NotThrown,

    #[error("{results} results for {dice} dice")]
    ResultCount { dice: usize, results: usize },

    /// The world lost a body mid-roll.
    #[error("body {0} missing from the simulation")]
    MissingBody(usize),

    /// No labelled face could be selected.
    #[error("die {0} shows no readable face")]
    Unreadable(usize),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Phase of the current roll animation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationPhase {
    Idle,
    /// Bodies inserted, not yet stepped.
    Thrown,
    Settling { iteration: u32 },
    /// Faces final; returns to idle on the next frame.
    Reconciled,
}

#[derive(Clone, Debug)]
struct AnimatedDie {
    handle: BodyHandle,
    labels: FaceLabels,
    marker: StopMarker,
}

/// Result handed to the completion callback.
#[derive(Clone, Debug, PartialEq)]
pub struct RollCompletion {
    /// Authoritative outcome when one was supplied, else the physical one.
    pub outcome: RollOutcome,
    /// Values the physics produced before relabelling.
    pub physical: Vec<i32>,
    /// Whether faces were relabelled.
    pub reconciled: bool,
    /// Whether the iteration budget cut the roll short.
    pub timed_out: bool,
}

/// One client's roll animation.
pub struct RollAnimation {
    config: SettleConfig,
    speed: f64,
    phase: AnimationPhase,
    dice: Vec<AnimatedDie>,
    constant: i32,
    authoritative: Option<Vec<i32>>,
}

impl RollAnimation {
    pub fn new(config: SettleConfig, speed: f64) -> Self {
        Self {
            config,
            speed,
            phase: AnimationPhase::Idle,
            dice: Vec::new(),
            constant: 0,
            authoritative: None,
        }
    }

    pub fn phase(&self) -> AnimationPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, AnimationPhase::Thrown | AnimationPhase::Settling { .. })
    }

    /// Change the simulation speed for future rolls.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    /// Current labelling of each die, for the renderer.
    pub fn labels(&self) -> impl Iterator<Item = &FaceLabels> {
        self.dice.iter().map(|d| &d.labels)
    }

    /// Insert the planned bodies and start the roll.
    ///
    /// `authoritative` carries the server's values, one per body.
    pub fn throw(
        &mut self,
        world: &mut dyn PhysicsWorld,
        bodies: &[BodySpec],
        constant: i32,
        authoritative: Option<Vec<i32>>,
    ) -> Result<(), AnimationError> {
        if self.is_running() {
            return Err(AnimationError::Busy);
        }
        if let Some(values) = &authoritative {
            if values.len() != bodies.len() {
                return Err(AnimationError::ResultCount { dice: bodies.len(), results: values.len() });
            }
            if let Some((spec, value)) = bodies.iter().zip(values).find(|(b, v)| !b.kind.is_valid_value(**v)) {
                return Err(ReconcileError::OutOfRange { kind: spec.kind, value: *value }.into());
            }
        }

        world.clear();
        self.dice = bodies
            .iter()
            .map(|spec| AnimatedDie {
                handle: world.add_body(spec),
                labels: FaceLabels::new(spec.kind),
                marker: StopMarker::Moving,
            })
            .collect();
        self.constant = constant;
        self.authoritative = authoritative;
        self.phase = AnimationPhase::Thrown;
        debug!(dice = bodies.len(), "roll thrown");
        Ok(())
    }

    /// Advance one frame. Returns the completion on the frame the roll
    /// settles.
    pub fn frame(&mut self, world: &mut dyn PhysicsWorld) -> Result<Option<RollCompletion>, AnimationError> {
        let iteration = match self.phase {
            AnimationPhase::Idle => return Ok(None),
            AnimationPhase::Reconciled => {
                self.phase = AnimationPhase::Idle;
                return Ok(None);
            }
            AnimationPhase::Thrown => 1,
            AnimationPhase::Settling { iteration } => iteration + 1,
        };

        world.step(self.config.step_dt(self.speed));
        self.phase = AnimationPhase::Settling { iteration };

        let timed_out = iteration >= self.config.max_iterations(self.speed);
        if !timed_out && !self.observe(world, iteration)? {
            return Ok(None);
        }
        if timed_out {
            warn!(iteration, "roll did not settle within budget");
        }

        match self.finish(world, timed_out) {
            Ok(completion) => Ok(Some(completion)),
            Err(e) => {
                // A failed read-out abandons the roll.
                self.phase = AnimationPhase::Idle;
                Err(e)
            }
        }
    }

    /// Step until the roll completes. Bounded by the iteration budget.
    pub fn run_to_completion(&mut self, world: &mut dyn PhysicsWorld) -> Result<RollCompletion, AnimationError> {
        loop {
            if let Some(completion) = self.frame(world)? {
                return Ok(completion);
            }
            if !self.is_running() {
                return Err(AnimationError::NotThrown);
            }
        }
    }

    /// Update stop markers. True once every die has settled.
    fn observe(&mut self, world: &dyn PhysicsWorld, iteration: u32) -> Result<bool, AnimationError> {
        let mut all_settled = true;
        for (i, die) in self.dice.iter_mut().enumerate() {
            if die.marker == StopMarker::Settled {
                continue;
            }
            let state = world.body(die.handle).ok_or(AnimationError::MissingBody(i))?;
            die.marker = die.marker.observe(self.config.is_still(&state), iteration, self.config.settle_frames);
            #[cfg(feature = "debug-tracing")]
            tracing::trace!(die = i, iteration, marker = ?die.marker, "settle check");
            all_settled &= die.marker == StopMarker::Settled;
        }
        Ok(all_settled)
    }

    fn finish(&mut self, world: &dyn PhysicsWorld, timed_out: bool) -> Result<RollCompletion, AnimationError> {
        let mut physical = Vec::with_capacity(self.dice.len());
        for (i, die) in self.dice.iter().enumerate() {
            let state = world.body(die.handle).ok_or(AnimationError::MissingBody(i))?;
            let value = read_value(&die.labels, state.orientation).ok_or(AnimationError::Unreadable(i))?;
            physical.push(value);
        }

        let kinds: Vec<DieKind> = self.dice.iter().map(|d| d.labels.kind()).collect();
        let (values, reconciled) = match self.authoritative.take() {
            Some(values) => {
                let mut labels: Vec<FaceLabels> = self.dice.iter().map(|d| d.labels.clone()).collect();
                reconcile_all(&mut labels, &physical, &values)?;
                for (die, relabelled) in self.dice.iter_mut().zip(labels) {
                    die.labels = relabelled;
                }
                (values, true)
            }
            None => (physical.clone(), false),
        };

        self.phase = AnimationPhase::Reconciled;
        let outcome = RollOutcome::from_values(kinds, self.constant, values);
        debug!(result = %outcome.result_string, reconciled, "roll settled");
        Ok(RollCompletion { outcome, physical, reconciled, timed_out })
    }
}
