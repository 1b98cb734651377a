use crate::common::{ArbiterHandle, BodyHandle, ConstraintHandle, ShapeHandle};
use crate::error::{PhysicsError, Result};
use crate::integration::{integrate_position, integrate_velocity};
use crate::math::{Transform, Vec2};

/// How a body takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyType {
    /// Finite mass, moved by forces, gravity and contacts.
    Dynamic,
    /// Infinite mass, moved only by its own velocity. Never sleeps and
    /// keeps touching dynamic bodies awake.
    Kinematic,
    /// Infinite mass, never moves unless repositioned by hand.
    Static,
}

/// Island bookkeeping. A body is asleep exactly when `root` is set
/// outside of component processing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct SleepingState {
    pub root: Option<BodyHandle>,
    pub next: Option<BodyHandle>,
    pub idle_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    body_type: BodyType,

    // Mass properties, kept in sync with their inverses.
    mass: f64,
    inv_mass: f64,
    inertia: f64,
    inv_inertia: f64,
    /// Center of gravity in body-local coordinates.
    local_center_of_mass: Vec2,

    // World position of the center of gravity, angle and its rotation vector.
    pub(crate) position: Vec2,
    pub(crate) angle: f64,
    pub(crate) rot: Vec2,
    pub(crate) transform: Transform,

    pub linear_velocity: Vec2,
    pub angular_velocity: f64,
    pub force: Vec2,
    pub torque: f64,
    /// Speed limits applied after each velocity integration.
    pub velocity_limit: f64,
    pub angular_velocity_limit: f64,

    // Position-correction velocities, cleared after every position update.
    pub(crate) v_bias: Vec2,
    pub(crate) w_bias: f64,

    pub(crate) sleeping: SleepingState,
    pub(crate) shapes: Vec<ShapeHandle>,
    pub(crate) constraints: Vec<ConstraintHandle>,
    pub(crate) arbiters: Vec<ArbiterHandle>,
}

impl RigidBody {
    fn with_type(body_type: BodyType, mass: f64, inertia: f64) -> Self {
        let mut body = RigidBody {
            body_type,
            mass,
            inv_mass: inverse(mass),
            inertia,
            inv_inertia: inverse(inertia),
            local_center_of_mass: Vec2::ZERO,
            position: Vec2::ZERO,
            angle: 0.0,
            rot: Vec2::X,
            transform: Transform::identity(),
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
            velocity_limit: f64::INFINITY,
            angular_velocity_limit: f64::INFINITY,
            v_bias: Vec2::ZERO,
            w_bias: 0.0,
            sleeping: SleepingState::default(),
            shapes: Vec::new(),
            constraints: Vec::new(),
            arbiters: Vec::new(),
        };
        body.update_transform();
        body
    }

    /// Dynamic body with the given mass and moment of inertia. An infinite
    /// moment makes a body that never rotates.
    pub fn new_dynamic(mass: f64, inertia: f64) -> Result<Self> {
        validate_mass(mass)?;
        validate_inertia(inertia)?;
        Ok(Self::with_type(BodyType::Dynamic, mass, inertia))
    }

    pub fn new_kinematic() -> Self {
        Self::with_type(BodyType::Kinematic, f64::INFINITY, f64::INFINITY)
    }

    pub fn new_static() -> Self {
        Self::with_type(BodyType::Static, f64::INFINITY, f64::INFINITY)
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping.root.is_some()
    }

    /// Seconds this body has stayed below the idle-speed threshold.
    pub fn idle_time(&self) -> f64 {
        self.sleeping.idle_time
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    pub fn inv_inertia(&self) -> f64 {
        self.inv_inertia
    }

    pub fn set_mass(&mut self, mass: f64) -> Result<()> {
        if !self.is_dynamic() {
            return Err(PhysicsError::InvalidMass(mass));
        }
        validate_mass(mass)?;
        self.mass = mass;
        self.inv_mass = inverse(mass);
        Ok(())
    }

    pub fn set_inertia(&mut self, inertia: f64) -> Result<()> {
        if !self.is_dynamic() {
            return Err(PhysicsError::InvalidMoment(inertia));
        }
        validate_inertia(inertia)?;
        self.inertia = inertia;
        self.inv_inertia = inverse(inertia);
        Ok(())
    }

    pub fn local_center_of_mass(&self) -> Vec2 {
        self.local_center_of_mass
    }

    /// Moves the center of gravity within the body, keeping the body
    /// origin where it is.
    pub fn set_local_center_of_mass(&mut self, cog: Vec2) {
        let origin = self.origin();
        self.local_center_of_mass = cog;
        self.position = origin + cog.rotate_by(self.rot);
        self.update_transform();
    }

    /// World position of the center of gravity.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.update_transform();
    }

    /// World position of the body's local origin.
    pub fn origin(&self) -> Vec2 {
        self.transform.position
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Unit rotation vector `(cos a, sin a)`.
    pub fn rotation_vector(&self) -> Vec2 {
        self.rot
    }

    pub fn set_angle(&mut self, angle: f64) {
        self.angle = angle;
        self.rot = Vec2::for_angle(angle);
        self.update_transform();
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn shapes(&self) -> &[ShapeHandle] {
        &self.shapes
    }

    pub fn constraints(&self) -> &[ConstraintHandle] {
        &self.constraints
    }

    pub(crate) fn update_transform(&mut self) {
        self.transform = Transform {
            position: self.position - self.local_center_of_mass.rotate_by(self.rot),
            rot: self.rot,
        };
    }

    pub fn local_to_world(&self, point: Vec2) -> Vec2 {
        self.transform.apply(point)
    }

    pub fn world_to_local(&self, point: Vec2) -> Vec2 {
        self.transform.apply_inverse(point)
    }

    pub fn velocity_at_world_point(&self, point: Vec2) -> Vec2 {
        let r = point - self.position;
        self.linear_velocity + r.perpendicular() * self.angular_velocity
    }

    pub fn velocity_at_local_point(&self, point: Vec2) -> Vec2 {
        self.velocity_at_world_point(self.local_to_world(point))
    }

    pub fn apply_force_at_world_point(&mut self, force: Vec2, point: Vec2) {
        self.force += force;
        let r = point - self.position;
        self.torque += r.cross(force);
    }

    pub fn apply_force_at_local_point(&mut self, force: Vec2, point: Vec2) {
        self.apply_force_at_world_point(
            self.transform.apply_vector(force),
            self.local_to_world(point),
        );
    }

    pub fn apply_impulse_at_world_point(&mut self, impulse: Vec2, point: Vec2) {
        let r = point - self.position;
        self.apply_impulse(impulse, r);
    }

    pub fn apply_impulse_at_local_point(&mut self, impulse: Vec2, point: Vec2) {
        self.apply_impulse_at_world_point(
            self.transform.apply_vector(impulse),
            self.local_to_world(point),
        );
    }

    /// Twice the kinetic energy, `m v^2 + I w^2`. The sleep test compares
    /// this against `m * threshold^2`.
    pub fn kinetic_energy(&self) -> f64 {
        let vsq = self.linear_velocity.dot(self.linear_velocity);
        let wsq = self.angular_velocity * self.angular_velocity;
        let linear = if vsq != 0.0 { vsq * self.mass } else { 0.0 };
        let angular = if wsq != 0.0 { wsq * self.inertia } else { 0.0 };
        linear + angular
    }

    /// Applies impulse `j` at offset `r` from the center of gravity.
    pub(crate) fn apply_impulse(&mut self, j: Vec2, r: Vec2) {
        self.linear_velocity += j * self.inv_mass;
        self.angular_velocity += self.inv_inertia * r.cross(j);
    }

    pub(crate) fn apply_bias_impulse(&mut self, j: Vec2, r: Vec2) {
        self.v_bias += j * self.inv_mass;
        self.w_bias += self.inv_inertia * r.cross(j);
    }

    /// Integrates gravity, damping and the accumulated force and torque
    /// into the velocity. See [`integrate_velocity`].
    pub fn update_velocity(&mut self, gravity: Vec2, damping: f64, dt: f64) {
        integrate_velocity(self, gravity, damping, dt);
    }

    /// Moves the body by its velocity plus any position correction.
    pub fn update_position(&mut self, dt: f64) {
        integrate_position(self, dt);
    }

    pub fn clear_accumulators(&mut self) {
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }
}

fn inverse(value: f64) -> f64 {
    if value.is_infinite() {
        0.0
    } else {
        1.0 / value
    }
}

fn validate_mass(mass: f64) -> Result<()> {
    if mass > 0.0 && mass.is_finite() {
        Ok(())
    } else {
        Err(PhysicsError::InvalidMass(mass))
    }
}

fn validate_inertia(inertia: f64) -> Result<()> {
    // Infinite inertia is allowed: the body just never rotates.
    if inertia > 0.0 && !inertia.is_nan() {
        Ok(())
    } else {
        Err(PhysicsError::InvalidMoment(inertia))
    }
}

/// Relative velocity of the points at `r1` on `a` and `r2` on `b`.
pub(crate) fn relative_velocity(a: &RigidBody, b: &RigidBody, r1: Vec2, r2: Vec2) -> Vec2 {
    let v1 = a.linear_velocity + r1.perpendicular() * a.angular_velocity;
    let v2 = b.linear_velocity + r2.perpendicular() * b.angular_velocity;
    v2 - v1
}

pub(crate) fn normal_relative_velocity(
    a: &RigidBody,
    b: &RigidBody,
    r1: Vec2,
    r2: Vec2,
    n: Vec2,
) -> f64 {
    relative_velocity(a, b, r1, r2).dot(n)
}

/// Applies `j` to `b` and `-j` to `a`.
pub(crate) fn apply_impulses(a: &mut RigidBody, b: &mut RigidBody, r1: Vec2, r2: Vec2, j: Vec2) {
    a.apply_impulse(-j, r1);
    b.apply_impulse(j, r2);
}

pub(crate) fn apply_bias_impulses(
    a: &mut RigidBody,
    b: &mut RigidBody,
    r1: Vec2,
    r2: Vec2,
    j: Vec2,
) {
    a.apply_bias_impulse(-j, r1);
    b.apply_bias_impulse(j, r2);
}

fn k_scalar_body(body: &RigidBody, r: Vec2, n: Vec2) -> f64 {
    let rcn = r.cross(n);
    body.inv_mass + body.inv_inertia * rcn * rcn
}

/// Inverse effective mass along `n` for offsets `r1`, `r2`.
pub(crate) fn k_scalar(a: &RigidBody, b: &RigidBody, r1: Vec2, r2: Vec2, n: Vec2) -> f64 {
    let value = k_scalar_body(a, r1, n) + k_scalar_body(b, r2, n);
    debug_assert!(value != 0.0, "unsolvable collision or constraint");
    value
}

/// Reciprocal that yields zero for an unsolvable (zero) input, so the
/// affected row applies no impulse.
pub(crate) fn safe_inverse(value: f64) -> f64 {
    if value != 0.0 {
        1.0 / value
    } else {
        0.0
    }
}

/// Row-major 2x2 matrix.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Mat2 {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Mat2 {
    pub fn transform(&self, v: Vec2) -> Vec2 {
        Vec2::new(v.x * self.a + v.y * self.b, v.x * self.c + v.y * self.d)
    }
}

/// Inverse of the 2x2 effective mass matrix for a point-to-point
/// constraint. A singular matrix yields zeros.
pub(crate) fn k_tensor(a: &RigidBody, b: &RigidBody, r1: Vec2, r2: Vec2) -> Mat2 {
    let m_sum = a.inv_mass + b.inv_mass;

    let mut k11 = m_sum;
    let mut k12 = 0.0;
    let mut k21 = 0.0;
    let mut k22 = m_sum;

    let a_i_inv = a.inv_inertia;
    let r1xsq = r1.x * r1.x * a_i_inv;
    let r1ysq = r1.y * r1.y * a_i_inv;
    let r1nxy = -r1.x * r1.y * a_i_inv;
    k11 += r1ysq;
    k12 += r1nxy;
    k21 += r1nxy;
    k22 += r1xsq;

    let b_i_inv = b.inv_inertia;
    let r2xsq = r2.x * r2.x * b_i_inv;
    let r2ysq = r2.y * r2.y * b_i_inv;
    let r2nxy = -r2.x * r2.y * b_i_inv;
    k11 += r2ysq;
    k12 += r2nxy;
    k21 += r2nxy;
    k22 += r2xsq;

    let det = k11 * k22 - k12 * k21;
    debug_assert!(det != 0.0, "unsolvable constraint");
    let det_inv = safe_inverse(det);
    Mat2 {
        a: k22 * det_inv,
        b: -k12 * det_inv,
        c: -k21 * det_inv,
        d: k11 * det_inv,
    }
}
