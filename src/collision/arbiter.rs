//! Persistent contact between two shapes.

use crate::common::{BodyHandle, ShapeHandle};
use crate::math::Vec2;
use crate::objects::rigid_body::{
    apply_bias_impulses, apply_impulses, k_scalar, normal_relative_velocity, relative_velocity,
    safe_inverse, RigidBody,
};
use crate::shapes::Shape;

use super::manifold::{CollisionInfo, Contact, ContactPoint, MAX_CONTACTS_PER_ARBITER};

/// Lifecycle of an arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArbiterState {
    /// The shapes started touching this step.
    FirstCollision,
    /// The shapes have been touching for more than one step.
    Normal,
    /// A `begin` or `pre_solve` handler rejected the pair. It stays
    /// rejected until the shapes separate.
    Ignore,
    /// The shapes stopped touching. The arbiter is kept for a few steps
    /// so a brief separation does not lose its cached impulses.
    Cached,
    /// One of the shapes was removed while still touching.
    Invalidated,
}

/// Contact record for a pair of shapes, reused across steps while the
/// shapes keep touching.
///
/// Shapes, bodies and the normal are stored in the order the narrow phase
/// collided them. Accessors report them in the order the pair's collision
/// handler was registered with.
#[derive(Debug, Clone)]
pub struct Arbiter {
    /// Restitution of the pair, the product of both shapes' values.
    /// Handlers may override it in `begin` or `pre_solve`.
    pub elasticity: f64,
    /// Friction of the pair, the product of both shapes' values.
    pub friction: f64,
    /// Relative surface velocity, tangent to the normal.
    pub surface_velocity: Vec2,

    pub(crate) shape_a: ShapeHandle,
    pub(crate) shape_b: ShapeHandle,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    // Centers of gravity when the contacts were found.
    origin_a: Vec2,
    origin_b: Vec2,

    pub(crate) normal: Vec2,
    contacts: [Contact; MAX_CONTACTS_PER_ARBITER],
    count: usize,

    pub(crate) state: ArbiterState,
    /// Step in which the shapes last touched.
    pub(crate) stamp: u64,
    /// True when the registered handler lists the collision types in the
    /// reverse of the collided order.
    pub(crate) swapped: bool,
    /// Registered collision-type pair of the handler, `None` for the
    /// space's default handler.
    pub(crate) handler: Option<(u32, u32)>,
    /// Closest-feature cache fed back into the narrow phase.
    pub(crate) collision_id: u32,
}

impl Arbiter {
    pub(crate) fn new(
        shape_a: ShapeHandle,
        body_a: BodyHandle,
        shape_b: ShapeHandle,
        body_b: BodyHandle,
    ) -> Self {
        Arbiter {
            elasticity: 0.0,
            friction: 0.0,
            surface_velocity: Vec2::ZERO,
            shape_a,
            shape_b,
            body_a,
            body_b,
            origin_a: Vec2::ZERO,
            origin_b: Vec2::ZERO,
            normal: Vec2::ZERO,
            contacts: [Contact::default(); MAX_CONTACTS_PER_ARBITER],
            count: 0,
            state: ArbiterState::FirstCollision,
            stamp: 0,
            swapped: false,
            handler: None,
            collision_id: 0,
        }
    }

    /// Reinitializes a pooled arbiter for a new pair.
    pub(crate) fn reuse(
        &mut self,
        shape_a: ShapeHandle,
        body_a: BodyHandle,
        shape_b: ShapeHandle,
        body_b: BodyHandle,
    ) {
        *self = Arbiter {
            contacts: self.contacts,
            ..Arbiter::new(shape_a, body_a, shape_b, body_b)
        };
        self.count = 0;
    }

    /// Replaces the contact set with a fresh narrow-phase result.
    ///
    /// `a` and `b` are the shapes in collided order, `origin_a` and
    /// `origin_b` their bodies' centers of gravity. Contacts whose hash
    /// matches one from the previous step inherit its accumulated
    /// impulses.
    pub(crate) fn update(
        &mut self,
        info: &CollisionInfo,
        (handle_a, a): (ShapeHandle, &Shape),
        (handle_b, b): (ShapeHandle, &Shape),
        origin_a: Vec2,
        origin_b: Vec2,
    ) {
        // Similar shape kinds may come back in either order.
        self.shape_a = handle_a;
        self.body_a = a.body;
        self.shape_b = handle_b;
        self.body_b = b.body;
        self.origin_a = origin_a;
        self.origin_b = origin_b;

        let previous = self.contacts;
        let previous = &previous[..self.count];
        for (slot, fresh) in self.contacts.iter_mut().zip(info.contacts()) {
            let mut con = *fresh;
            con.r_a = fresh.r_a - origin_a;
            con.r_b = fresh.r_b - origin_b;
            con.jn_acc = 0.0;
            con.jt_acc = 0.0;
            if let Some(old) = previous.iter().find(|old| old.hash == con.hash) {
                con.jn_acc = old.jn_acc;
                con.jt_acc = old.jt_acc;
            }
            *slot = con;
        }
        self.count = info.count();
        self.normal = info.normal;
        self.collision_id = info.id;

        let material = a.material.combine(b.material);
        self.elasticity = material.restitution;
        self.friction = material.friction;
        let surface_vr = b.surface_velocity - a.surface_velocity;
        self.surface_velocity = surface_vr - info.normal * surface_vr.dot(info.normal);

        if self.state == ArbiterState::Cached {
            self.state = ArbiterState::FirstCollision;
        }
    }

    /// Precomputes effective masses and the bias and bounce targets.
    pub(crate) fn prestep(&mut self, a: &RigidBody, b: &RigidBody, dt: f64, slop: f64, bias: f64) {
        let n = self.normal;
        let body_delta = b.position - a.position;
        let elasticity = self.elasticity;

        for con in &mut self.contacts[..self.count] {
            con.n_mass = safe_inverse(k_scalar(a, b, con.r_a, con.r_b, n));
            con.t_mass = safe_inverse(k_scalar(a, b, con.r_a, con.r_b, n.perpendicular()));

            let dist = (con.r_b - con.r_a + body_delta).dot(n);
            con.bias = -bias * (dist + slop).min(0.0) / dt;
            con.j_bias = 0.0;

            con.bounce = normal_relative_velocity(a, b, con.r_a, con.r_b, n) * elasticity;
        }
    }

    /// Warm start. The accumulated impulses are rescaled by `dt_coef`
    /// (the ratio of this step's length to the previous one) and
    /// reapplied.
    pub(crate) fn apply_cached_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt_coef: f64) {
        if self.is_first_contact() {
            return;
        }
        let n = self.normal;
        for con in &mut self.contacts[..self.count] {
            con.jn_acc *= dt_coef;
            con.jt_acc *= dt_coef;
            let j = n.rotate_by(Vec2::new(con.jn_acc, con.jt_acc));
            apply_impulses(a, b, con.r_a, con.r_b, j);
        }
    }

    /// One solver iteration over the contacts.
    pub(crate) fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody) {
        let n = self.normal;
        let surface_vr = self.surface_velocity;
        let friction = self.friction;

        for con in &mut self.contacts[..self.count] {
            let (r1, r2) = (con.r_a, con.r_b);

            let vb1 = a.v_bias + r1.perpendicular() * a.w_bias;
            let vb2 = b.v_bias + r2.perpendicular() * b.w_bias;
            let vr = relative_velocity(a, b, r1, r2) + surface_vr;

            let vbn = (vb2 - vb1).dot(n);
            let vrn = vr.dot(n);
            let vrt = vr.dot(n.perpendicular());

            let jbn = (con.bias - vbn) * con.n_mass;
            let jbn_old = con.j_bias;
            con.j_bias = (jbn_old + jbn).max(0.0);

            let jn = -(con.bounce + vrn) * con.n_mass;
            let jn_old = con.jn_acc;
            con.jn_acc = (jn_old + jn).max(0.0);

            // Friction is bounded by this iteration's normal impulse.
            let jt_max = friction * con.jn_acc;
            let jt = -vrt * con.t_mass;
            let jt_old = con.jt_acc;
            con.jt_acc = (jt_old + jt).clamp(-jt_max, jt_max);

            apply_bias_impulses(a, b, r1, r2, n * (con.j_bias - jbn_old));
            apply_impulses(
                a,
                b,
                r1,
                r2,
                n.rotate_by(Vec2::new(con.jn_acc - jn_old, con.jt_acc - jt_old)),
            );
        }
    }

    /// Shapes in handler order.
    pub fn shapes(&self) -> (ShapeHandle, ShapeHandle) {
        if self.swapped {
            (self.shape_b, self.shape_a)
        } else {
            (self.shape_a, self.shape_b)
        }
    }

    /// Bodies in handler order.
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        if self.swapped {
            (self.body_b, self.body_a)
        } else {
            (self.body_a, self.body_b)
        }
    }

    /// Collision normal, pointing from the first shape in handler order
    /// towards the second.
    pub fn normal(&self) -> Vec2 {
        if self.swapped {
            -self.normal
        } else {
            self.normal
        }
    }

    pub fn state(&self) -> ArbiterState {
        self.state
    }

    /// Contacts in collided order, with offsets relative to each body's
    /// center of gravity.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts[..self.count]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// World-space contact points in handler order.
    pub fn contact_points(&self) -> impl Iterator<Item = ContactPoint> + '_ {
        self.contacts().iter().map(move |con| {
            let point_a = self.origin_a + con.r_a;
            let point_b = self.origin_b + con.r_b;
            let (point_a, point_b) = if self.swapped {
                (point_b, point_a)
            } else {
                (point_a, point_b)
            };
            ContactPoint {
                point_a,
                point_b,
                distance: con.distance,
            }
        })
    }

    pub fn is_first_contact(&self) -> bool {
        self.state == ArbiterState::FirstCollision
    }

    /// True inside a `separate` callback fired because a shape was removed.
    pub fn is_removal(&self) -> bool {
        self.state == ArbiterState::Invalidated
    }

    /// Impulse, friction included, applied to the first body in handler
    /// order by the last solve.
    pub fn total_impulse(&self) -> Vec2 {
        let n = self.normal;
        let sum = self
            .contacts()
            .iter()
            .fold(Vec2::ZERO, |sum, con| sum + n.rotate_by(Vec2::new(con.jn_acc, con.jt_acc)));
        if self.swapped {
            sum
        } else {
            -sum
        }
    }

    /// Energy lost to the collision during the last step, counting both
    /// the inelastic part of the normal response and friction.
    pub fn total_kinetic_energy(&self) -> f64 {
        let e_coef = (1.0 - self.elasticity) / (1.0 + self.elasticity);
        self.contacts()
            .iter()
            .map(|con| {
                e_coef * con.jn_acc * con.jn_acc * safe_inverse(con.n_mass)
                    + con.jt_acc * con.jt_acc * safe_inverse(con.t_mass)
            })
            .sum()
    }

    /// Rejects the pair until the shapes separate. Always returns `false`
    /// so a `begin` handler can end with `return arb.ignore()`.
    pub fn ignore(&mut self) -> bool {
        self.state = ArbiterState::Ignore;
        false
    }

    /// Drops the contacts of a pair that will not be solved this step.
    pub(crate) fn clear_contacts(&mut self) {
        self.count = 0;
    }

    /// The other body of the pair.
    pub(crate) fn other_body(&self, body: BodyHandle) -> BodyHandle {
        if self.body_a == body {
            self.body_b
        } else {
            self.body_a
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Arena, Material};
    use crate::math::Transform;
    use approx::assert_abs_diff_eq;

    const EPSILON: f64 = 1e-9;

    struct Pair {
        bodies: Arena<RigidBody>,
        shapes: Arena<Shape>,
        a: (BodyHandle, ShapeHandle),
        b: (BodyHandle, ShapeHandle),
    }

    fn pair(pos_a: Vec2, pos_b: Vec2, material: Material) -> Pair {
        let mut bodies = Arena::new();
        let mut shapes = Arena::new();
        let mut make = |pos: Vec2, hash_id: u64| {
            let mut body = RigidBody::new_dynamic(1.0, 1.0).unwrap();
            body.set_position(pos);
            let handle = BodyHandle(bodies.insert(body));
            let mut shape = Shape::circle(handle, 1.0, Vec2::ZERO)
                .unwrap()
                .with_material(material);
            shape.hash_id = hash_id;
            shape.update(Transform::new(pos, 0.0));
            (handle, ShapeHandle(shapes.insert(shape)))
        };
        let a = make(pos_a, 1);
        let b = make(pos_b, 2);
        Pair {
            bodies,
            shapes,
            a,
            b,
        }
    }

    fn collide_pair(p: &Pair, arb: &mut Arbiter) {
        let sa = &p.shapes[p.a.1 .0];
        let sb = &p.shapes[p.b.1 .0];
        let mut info = CollisionInfo::new(arb.collision_id);
        crate::collision::collide(sa, sb, 0, Default::default(), &mut info);
        let origin_a = p.bodies[p.a.0 .0].position();
        let origin_b = p.bodies[p.b.0 .0].position();
        arb.update(&info, (p.a.1, sa), (p.b.1, sb), origin_a, origin_b);
    }

    fn solve(p: &mut Pair, arb: &mut Arbiter, dt: f64, iterations: usize) {
        let (a, b) = p.bodies.get2_mut(p.a.0 .0, p.b.0 .0).unwrap();
        arb.prestep(a, b, dt, 0.0, 0.0);
        arb.apply_cached_impulse(a, b, 1.0);
        for _ in 0..iterations {
            arb.apply_impulse(a, b);
        }
    }

    #[test]
    fn test_arbiter_update_converts_to_offsets_and_combines_material() {
        let p = pair(Vec2::new(0.0, 0.0), Vec2::new(1.5, 0.0), Material::new(0.5, 0.4));
        let mut arb = Arbiter::new(p.a.1, p.a.0, p.b.1, p.b.0);
        collide_pair(&p, &mut arb);

        assert_eq!(arb.count(), 1);
        let con = arb.contacts()[0];
        assert_abs_diff_eq!(con.r_a.x, 1.0, epsilon = EPSILON);
        assert_abs_diff_eq!(con.r_b.x, -1.0, epsilon = EPSILON);
        assert_abs_diff_eq!(arb.elasticity, 0.25, epsilon = EPSILON);
        assert_abs_diff_eq!(arb.friction, 0.16, epsilon = EPSILON);
        assert!(arb.is_first_contact());
    }

    #[test]
    fn test_arbiter_equal_masses_exchange_velocity() {
        let mut p = pair(Vec2::new(0.0, 0.0), Vec2::new(1.99, 0.0), Material::new(1.0, 0.0));
        p.bodies[p.a.0 .0].linear_velocity = Vec2::new(1.0, 0.0);
        p.bodies[p.b.0 .0].linear_velocity = Vec2::new(-1.0, 0.0);
        let mut arb = Arbiter::new(p.a.1, p.a.0, p.b.1, p.b.0);
        collide_pair(&p, &mut arb);
        solve(&mut p, &mut arb, 1.0 / 60.0, 10);

        let va = p.bodies[p.a.0 .0].linear_velocity;
        let vb = p.bodies[p.b.0 .0].linear_velocity;
        assert_abs_diff_eq!(va.x, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(vb.x, 1.0, epsilon = 1e-6);
        let energy = p.bodies[p.a.0 .0].kinetic_energy() + p.bodies[p.b.0 .0].kinetic_energy();
        assert_abs_diff_eq!(energy, 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(arb.total_impulse().x, -2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_arbiter_contacts_only_push() {
        let mut p = pair(Vec2::new(0.0, 0.0), Vec2::new(1.9, 0.0), Material::new(0.0, 0.0));
        // Already separating: no impulse may pull them together.
        p.bodies[p.a.0 .0].linear_velocity = Vec2::new(-1.0, 0.0);
        let mut arb = Arbiter::new(p.a.1, p.a.0, p.b.1, p.b.0);
        collide_pair(&p, &mut arb);
        solve(&mut p, &mut arb, 1.0 / 60.0, 5);
        assert_eq!(arb.contacts()[0].normal_impulse(), 0.0);
        assert_eq!(p.bodies[p.a.0 .0].linear_velocity, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn test_arbiter_carries_impulse_by_hash() {
        let mut p = pair(Vec2::new(0.0, 0.0), Vec2::new(1.9, 0.0), Material::default());
        p.bodies[p.a.0 .0].linear_velocity = Vec2::new(1.0, 0.0);
        let mut arb = Arbiter::new(p.a.1, p.a.0, p.b.1, p.b.0);
        collide_pair(&p, &mut arb);
        solve(&mut p, &mut arb, 1.0 / 60.0, 10);
        let jn = arb.contacts()[0].normal_impulse();
        assert!(jn > 0.0);

        arb.state = ArbiterState::Normal;
        collide_pair(&p, &mut arb);
        assert_eq!(arb.contacts()[0].normal_impulse(), jn);

        // Warm starting rescales the accumulator by the step ratio.
        let (a, b) = p.bodies.get2_mut(p.a.0 .0, p.b.0 .0).unwrap();
        arb.apply_cached_impulse(a, b, 0.5);
        assert_abs_diff_eq!(arb.contacts()[0].normal_impulse(), jn * 0.5, epsilon = EPSILON);
    }

    #[test]
    fn test_arbiter_bias_separates_without_velocity() {
        let mut p = pair(Vec2::new(0.0, 0.0), Vec2::new(1.5, 0.0), Material::default());
        let mut arb = Arbiter::new(p.a.1, p.a.0, p.b.1, p.b.0);
        collide_pair(&p, &mut arb);
        let (a, b) = p.bodies.get2_mut(p.a.0 .0, p.b.0 .0).unwrap();
        arb.prestep(a, b, 1.0 / 60.0, 0.1, 0.5);
        for _ in 0..10 {
            arb.apply_impulse(a, b);
        }
        assert_eq!(a.linear_velocity, Vec2::ZERO);
        assert!(a.v_bias.x < 0.0);
        assert!(b.v_bias.x > 0.0);
    }

    #[test]
    fn test_arbiter_swapped_reports_handler_order() {
        let p = pair(Vec2::new(0.0, 0.0), Vec2::new(1.5, 0.0), Material::default());
        let mut arb = Arbiter::new(p.a.1, p.a.0, p.b.1, p.b.0);
        collide_pair(&p, &mut arb);
        arb.swapped = true;
        assert_eq!(arb.shapes(), (p.b.1, p.a.1));
        assert_eq!(arb.bodies(), (p.b.0, p.a.0));
        assert_eq!(arb.normal(), Vec2::new(-1.0, 0.0));
        let point = arb.contact_points().next().unwrap();
        assert_abs_diff_eq!(point.point_a.x, 0.5, epsilon = EPSILON);
        assert_abs_diff_eq!(point.point_b.x, 1.0, epsilon = EPSILON);
        assert!(!arb.ignore());
        assert_eq!(arb.state(), ArbiterState::Ignore);
    }
}
