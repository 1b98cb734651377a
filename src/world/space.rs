//! The simulation container and its step loop.

use log::{debug, trace, warn};
use rustc_hash::FxHashMap;

use crate::collision::{collide, Arbiter, ArbiterState, BBTree, CollisionInfo, AABB};
use crate::common::{Arena, ArbiterHandle, BodyHandle, ConstraintHandle, ShapeHandle};
use crate::constraints::Constraint;
use crate::error::{PhysicsError, Result};
use crate::math::Vec2;
use crate::objects::rigid_body::RigidBody;
use crate::shapes::Shape;

use super::config::SpaceConfig;
use super::handlers::{CollisionHandler, PostStepQueue};

/// Owns every body, shape and constraint of a simulation and advances
/// them together.
///
/// Structural changes are refused while a step is running. Collision
/// callbacks schedule them on the [`PostStepQueue`] instead.
#[derive(Debug)]
pub struct Space {
    pub(crate) config: SpaceConfig,

    pub(crate) bodies: Arena<RigidBody>,
    pub(crate) shapes: Arena<Shape>,
    pub(crate) constraints: Arena<Constraint>,
    pub(crate) arbiters: Arena<Arbiter>,
    arbiter_pool: Vec<Arbiter>,
    /// Arbiters of touching (or recently touching) pairs, keyed by the
    /// ordered shape pair.
    pub(crate) cached_arbiters: FxHashMap<(ShapeHandle, ShapeHandle), ArbiterHandle>,

    static_body: BodyHandle,
    /// Awake dynamic and kinematic bodies.
    pub(crate) active_bodies: Vec<BodyHandle>,
    /// Arbiters solved this step.
    pub(crate) active_arbiters: Vec<ArbiterHandle>,
    pub(crate) active_constraints: Vec<ConstraintHandle>,
    /// Root body of every sleeping component.
    pub(crate) sleeping_components: Vec<BodyHandle>,
    /// Bodies woken while the space was locked.
    pub(crate) roused_bodies: Vec<BodyHandle>,

    /// Shapes of awake bodies live in the dynamic tree; shapes of static
    /// and sleeping bodies in the static one.
    pub(crate) tree: BBTree<ShapeHandle>,
    pairs: Vec<(ShapeHandle, ShapeHandle)>,
    info: CollisionInfo,
    pub(crate) flood_stack: Vec<BodyHandle>,

    pub(crate) handlers: FxHashMap<(u32, u32), CollisionHandler>,
    pub(crate) default_handler: CollisionHandler,
    pub(crate) post_step: PostStepQueue,
    skip_post_step: bool,

    pub(crate) stamp: u64,
    curr_dt: f64,
    locked: u32,
    next_hash_id: u64,
}

impl Default for Space {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache key of a shape pair, independent of argument order.
pub(crate) fn arbiter_key(a: ShapeHandle, b: ShapeHandle) -> (ShapeHandle, ShapeHandle) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Registered handler for `key`, or the default one.
pub(crate) fn handler_for<'a>(
    handlers: &'a mut FxHashMap<(u32, u32), CollisionHandler>,
    default: &'a mut CollisionHandler,
    key: Option<(u32, u32)>,
) -> &'a mut CollisionHandler {
    match key.and_then(|key| handlers.get_mut(&key)) {
        Some(handler) => handler,
        None => default,
    }
}

/// Cheap rejection tests run before the narrow phase.
fn query_reject(a: &Shape, b: &Shape) -> bool {
    a.body == b.body || a.filter.reject(&b.filter) || !a.bb.intersects(&b.bb)
}

impl Space {
    pub fn new() -> Self {
        let mut bodies = Arena::new();
        let static_body = BodyHandle(bodies.insert(RigidBody::new_static()));
        Space {
            config: SpaceConfig::default(),
            bodies,
            shapes: Arena::new(),
            constraints: Arena::new(),
            arbiters: Arena::new(),
            arbiter_pool: Vec::new(),
            cached_arbiters: FxHashMap::default(),
            static_body,
            active_bodies: Vec::new(),
            active_arbiters: Vec::new(),
            active_constraints: Vec::new(),
            sleeping_components: Vec::new(),
            roused_bodies: Vec::new(),
            tree: BBTree::new(),
            pairs: Vec::new(),
            info: CollisionInfo::default(),
            flood_stack: Vec::new(),
            handlers: FxHashMap::default(),
            default_handler: CollisionHandler::default(),
            post_step: PostStepQueue::new(),
            skip_post_step: false,
            stamp: 0,
            curr_dt: 0.0,
            locked: 0,
            next_hash_id: 1,
        }
    }

    pub fn with_config(config: SpaceConfig) -> Result<Self> {
        config.validate()?;
        let mut space = Self::new();
        space.config = config;
        Ok(space)
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    /// Replaces the configuration and wakes every body so the new
    /// settings take effect.
    pub fn set_config(&mut self, config: SpaceConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.wake_all();
        Ok(())
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
        self.wake_all();
    }

    /// The space's own static body, for level geometry.
    pub fn static_body(&self) -> BodyHandle {
        self.static_body
    }

    /// True while a step is running.
    pub fn is_locked(&self) -> bool {
        self.locked > 0
    }

    /// Length of the step in progress, or of the last one.
    pub fn current_time_step(&self) -> f64 {
        self.curr_dt
    }

    fn assert_unlocked(&self) -> Result<()> {
        if self.locked > 0 {
            Err(PhysicsError::SpaceLocked)
        } else {
            Ok(())
        }
    }

    pub fn add_body(&mut self, mut body: RigidBody) -> Result<BodyHandle> {
        self.assert_unlocked()?;
        body.sleeping = Default::default();
        body.shapes.clear();
        body.constraints.clear();
        body.arbiters.clear();
        let is_static = body.is_static();

        let handle = BodyHandle(self.bodies.insert(body));
        if !is_static {
            self.active_bodies.push(handle);
        }
        Ok(handle)
    }

    /// Removes a body together with its shapes and constraints and hands
    /// it back.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<RigidBody> {
        self.assert_unlocked()?;
        if handle == self.static_body {
            return Err(PhysicsError::StaticBodyRemoval);
        }
        if !self.bodies.contains(handle.0) {
            return Err(PhysicsError::StaleHandle("body"));
        }
        self.wake(handle);

        let (shapes, constraints) = match self.bodies.get(handle.0) {
            Some(body) => (body.shapes.clone(), body.constraints.clone()),
            None => return Err(PhysicsError::StaleHandle("body")),
        };
        for shape in shapes {
            self.detach_shape(shape);
        }
        for constraint in constraints {
            if let Some((a, b)) = self.constraints.get(constraint.0).map(Constraint::bodies) {
                self.wake(if a == handle { b } else { a });
            }
            self.detach_constraint(constraint);
        }

        self.active_bodies.retain(|&h| h != handle);
        self.roused_bodies.retain(|&h| h != handle);
        let mut body = self
            .bodies
            .remove(handle.0)
            .ok_or(PhysicsError::StaleHandle("body"))?;
        body.sleeping = Default::default();
        body.shapes.clear();
        body.constraints.clear();
        body.arbiters.clear();

        self.run_post_step();
        Ok(body)
    }

    /// Attaches a shape to the body it was created for. Its world
    /// geometry is computed right away.
    pub fn add_shape(&mut self, mut shape: Shape) -> Result<ShapeHandle> {
        self.assert_unlocked()?;
        let body_handle = shape.body;
        let (transform, velocity, is_static) = match self.bodies.get(body_handle.0) {
            Some(body) => (body.transform, body.linear_velocity, body.is_static()),
            None => return Err(PhysicsError::StaleHandle("body")),
        };
        if !is_static {
            self.wake(body_handle);
        }

        shape.hash_id = self.next_hash_id;
        self.next_hash_id += 1;
        let bb = shape.update(transform);

        let handle = ShapeHandle(self.shapes.insert(shape));
        if is_static {
            self.tree.insert_static(handle, bb);
        } else {
            self.tree.insert(handle, bb, velocity);
        }
        if let Some(body) = self.bodies.get_mut(body_handle.0) {
            body.shapes.push(handle);
        }
        Ok(handle)
    }

    /// Removes a shape. Pairs it was touching get a `separate` callback
    /// with [`Arbiter::is_removal`] set.
    pub fn remove_shape(&mut self, handle: ShapeHandle) -> Result<Shape> {
        self.assert_unlocked()?;
        let (body_handle, bb) = match self.shapes.get(handle.0) {
            Some(shape) => (shape.body, shape.bb),
            None => return Err(PhysicsError::StaleHandle("shape")),
        };
        let is_static = self
            .bodies
            .get(body_handle.0)
            .map_or(true, |body| body.is_static());

        if is_static {
            self.wake_touching(bb);
        } else {
            self.wake(body_handle);
        }
        let shape = self.detach_shape(handle).ok_or(PhysicsError::StaleHandle("shape"))?;
        self.run_post_step();
        Ok(shape)
    }

    /// Unlinks a shape from its body, its arbiters and the index.
    fn detach_shape(&mut self, handle: ShapeHandle) -> Option<Shape> {
        self.locked += 1;
        let Space {
            cached_arbiters,
            arbiters,
            bodies,
            active_arbiters,
            arbiter_pool,
            handlers,
            default_handler,
            post_step,
            ..
        } = self;
        cached_arbiters.retain(|_, &mut arb_handle| {
            let Some(arb) = arbiters.get_mut(arb_handle.0) else {
                return false;
            };
            if arb.shape_a != handle && arb.shape_b != handle {
                return true;
            }
            if arb.state != ArbiterState::Cached {
                arb.state = ArbiterState::Invalidated;
                handler_for(handlers, default_handler, arb.handler).separate(arb, post_step);
            }
            for body in [arb.body_a, arb.body_b] {
                if let Some(body) = bodies.get_mut(body.0) {
                    body.arbiters.retain(|&h| h != arb_handle);
                }
            }
            active_arbiters.retain(|&h| h != arb_handle);
            if let Some(mut arb) = arbiters.remove(arb_handle.0) {
                arb.clear_contacts();
                arbiter_pool.push(arb);
            }
            false
        });
        self.locked -= 1;

        self.tree.remove(handle);
        let shape = self.shapes.remove(handle.0)?;
        if let Some(body) = self.bodies.get_mut(shape.body.0) {
            body.shapes.retain(|&h| h != handle);
        }
        Some(shape)
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintHandle> {
        self.assert_unlocked()?;
        let (a, b) = constraint.bodies();
        if !self.bodies.contains(a.0) || !self.bodies.contains(b.0) {
            return Err(PhysicsError::StaleHandle("body"));
        }
        self.wake(a);
        self.wake(b);

        let handle = ConstraintHandle(self.constraints.insert(constraint));
        self.active_constraints.push(handle);
        for body in [a, b] {
            if let Some(body) = self.bodies.get_mut(body.0) {
                body.constraints.push(handle);
            }
        }
        Ok(handle)
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Result<Constraint> {
        self.assert_unlocked()?;
        let (a, b) = match self.constraints.get(handle.0) {
            Some(constraint) => constraint.bodies(),
            None => return Err(PhysicsError::StaleHandle("constraint")),
        };
        self.wake(a);
        self.wake(b);
        self.detach_constraint(handle)
            .ok_or(PhysicsError::StaleHandle("constraint"))
    }

    fn detach_constraint(&mut self, handle: ConstraintHandle) -> Option<Constraint> {
        let constraint = self.constraints.remove(handle.0)?;
        self.active_constraints.retain(|&h| h != handle);
        let (a, b) = constraint.bodies();
        for body in [a, b] {
            if let Some(body) = self.bodies.get_mut(body.0) {
                body.constraints.retain(|&h| h != handle);
            }
        }
        Some(constraint)
    }

    pub fn body(&self, handle: BodyHandle) -> Result<&RigidBody> {
        self.bodies.get(handle.0).ok_or(PhysicsError::StaleHandle("body"))
    }

    /// Mutable access to a body. Wakes it, since any change may set it
    /// moving.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody> {
        if !self.bodies.contains(handle.0) {
            return Err(PhysicsError::StaleHandle("body"));
        }
        self.wake(handle);
        self.bodies
            .get_mut(handle.0)
            .ok_or(PhysicsError::StaleHandle("body"))
    }

    pub fn shape(&self, handle: ShapeHandle) -> Result<&Shape> {
        self.shapes.get(handle.0).ok_or(PhysicsError::StaleHandle("shape"))
    }

    /// Mutable access to a shape, waking its body. Geometry edits take
    /// effect in the index after [`Space::reindex_shape`] or the next step.
    pub fn shape_mut(&mut self, handle: ShapeHandle) -> Result<&mut Shape> {
        let body = self.shape(handle)?.body;
        self.wake(body);
        self.shapes
            .get_mut(handle.0)
            .ok_or(PhysicsError::StaleHandle("shape"))
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Result<&Constraint> {
        self.constraints
            .get(handle.0)
            .ok_or(PhysicsError::StaleHandle("constraint"))
    }

    pub fn constraint_mut(&mut self, handle: ConstraintHandle) -> Result<&mut Constraint> {
        let (a, b) = self.constraint(handle)?.bodies();
        self.wake(a);
        self.wake(b);
        self.constraints
            .get_mut(handle.0)
            .ok_or(PhysicsError::StaleHandle("constraint"))
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.bodies.iter().map(|(index, body)| (BodyHandle(index), body))
    }

    pub fn shapes(&self) -> impl Iterator<Item = (ShapeHandle, &Shape)> {
        self.shapes.iter().map(|(index, shape)| (ShapeHandle(index), shape))
    }

    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintHandle, &Constraint)> {
        self.constraints
            .iter()
            .map(|(index, constraint)| (ConstraintHandle(index), constraint))
    }

    /// Applies an impulse at a world point and wakes the body.
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec2, point: Vec2) -> Result<()> {
        self.body_mut(handle)?
            .apply_impulse_at_world_point(impulse, point);
        Ok(())
    }

    /// Adds a force at a world point for the next step and wakes the body.
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec2, point: Vec2) -> Result<()> {
        self.body_mut(handle)?.apply_force_at_world_point(force, point);
        Ok(())
    }

    /// Wakes a body and every body in its sleeping component.
    pub fn activate_body(&mut self, handle: BodyHandle) -> Result<()> {
        if !self.bodies.contains(handle.0) {
            return Err(PhysicsError::StaleHandle("body"));
        }
        self.wake(handle);
        Ok(())
    }

    pub fn is_sleeping(&self, handle: BodyHandle) -> Result<bool> {
        Ok(self.body(handle)?.is_sleeping())
    }

    /// Contact points solved in the last step.
    pub fn contact_count(&self) -> usize {
        self.active_arbiters
            .iter()
            .filter_map(|h| self.arbiters.get(h.0))
            .map(Arbiter::count)
            .sum()
    }

    /// Arbiters solved in the last step.
    pub fn arbiters(&self) -> impl Iterator<Item = &Arbiter> {
        self.active_arbiters
            .iter()
            .filter_map(move |h| self.arbiters.get(h.0))
    }

    /// Arbiters touching `handle` as of the last step, including those
    /// kept while its component sleeps.
    pub fn arbiters_for_body(&self, handle: BodyHandle) -> Result<Vec<&Arbiter>> {
        let body = self.body(handle)?;
        let arbiters = if body.is_static() {
            self.arbiters()
                .filter(|arb| arb.body_a == handle || arb.body_b == handle)
                .collect()
        } else {
            body.arbiters
                .iter()
                .filter_map(|h| self.arbiters.get(h.0))
                .collect()
        };
        Ok(arbiters)
    }

    /// Registers callbacks for shapes of collision types `a` and `b`.
    /// Arbiters report their shapes in `(a, b)` order to these callbacks.
    pub fn add_collision_handler(&mut self, a: u32, b: u32, handler: CollisionHandler) {
        self.handlers.insert((a, b), handler);
    }

    /// Callbacks for every pair with no registered handler.
    pub fn set_default_collision_handler(&mut self, handler: CollisionHandler) {
        self.default_handler = handler;
    }

    /// Schedules `f` to run at the end of the current step. A callback
    /// with a `key` that is already pending is dropped and `false`
    /// returned.
    pub fn add_post_step_callback(
        &mut self,
        key: Option<u64>,
        f: impl FnOnce(&mut Space) + 'static,
    ) -> bool {
        if self.locked == 0 {
            warn!("post-step callback added while the space is unlocked; it runs after the next step");
        }
        self.post_step.add(key, f)
    }

    /// Recomputes the boxes of static and sleeping shapes after they were
    /// moved by hand.
    pub fn reindex_static(&mut self) -> Result<()> {
        self.assert_unlocked()?;
        let Space {
            bodies,
            shapes,
            tree,
            ..
        } = self;
        for (_, body) in bodies.iter() {
            if !(body.is_static() || body.is_sleeping()) {
                continue;
            }
            for &handle in &body.shapes {
                if let Some(shape) = shapes.get_mut(handle.0) {
                    shape.update(body.transform);
                }
            }
        }
        tree.reindex_static(|handle| {
            shapes
                .get(handle.0)
                .map_or(AABB::for_circle(Vec2::ZERO, 0.0), |shape| shape.bb)
        });
        Ok(())
    }

    pub fn reindex_shape(&mut self, handle: ShapeHandle) -> Result<()> {
        self.assert_unlocked()?;
        let body_handle = self.shape(handle)?.body;
        let (transform, velocity) = {
            let body = self.body(body_handle)?;
            (body.transform, body.linear_velocity)
        };
        let bb = match self.shapes.get_mut(handle.0) {
            Some(shape) => shape.update(transform),
            None => return Err(PhysicsError::StaleHandle("shape")),
        };
        self.tree.reindex_object(handle, bb, velocity);
        Ok(())
    }

    pub fn reindex_shapes_for_body(&mut self, handle: BodyHandle) -> Result<()> {
        let shapes = self.body(handle)?.shapes.clone();
        for shape in shapes {
            self.reindex_shape(shape)?;
        }
        Ok(())
    }

    pub(crate) fn lock(&mut self) {
        self.locked += 1;
    }

    /// Releases one lock. At zero, bodies woken during the lock are
    /// reactivated and, with `run_post_step`, queued callbacks run.
    pub(crate) fn unlock(&mut self, run_post_step: bool) {
        debug_assert!(self.locked > 0, "space lock underflow");
        self.locked = self.locked.saturating_sub(1);
        if self.locked > 0 {
            return;
        }

        let roused = std::mem::take(&mut self.roused_bodies);
        for &body in &roused {
            self.reactivate(body);
        }
        self.roused_bodies = roused;
        self.roused_bodies.clear();

        if run_post_step {
            self.run_post_step();
        }
    }

    /// Drains the post-step queue, including callbacks scheduled by the
    /// callbacks themselves.
    fn run_post_step(&mut self) {
        if self.locked > 0 || self.skip_post_step {
            return;
        }
        self.skip_post_step = true;
        while let Some(callback) = self.post_step.pop() {
            callback(self);
        }
        self.skip_post_step = false;
    }

    /// Advances the simulation by `dt` seconds. A zero `dt` does nothing.
    pub fn step(&mut self, dt: f64) {
        if dt == 0.0 {
            return;
        }
        self.stamp += 1;
        let prev_dt = self.curr_dt;
        self.curr_dt = dt;

        for &handle in &self.active_arbiters {
            if let Some(arb) = self.arbiters.get_mut(handle.0) {
                arb.state = ArbiterState::Normal;
            }
        }
        self.active_arbiters.clear();
        for &handle in &self.active_bodies {
            if let Some(body) = self.bodies.get_mut(handle.0) {
                body.arbiters.clear();
            }
        }

        self.lock();
        {
            for &handle in &self.active_bodies {
                if let Some(body) = self.bodies.get_mut(handle.0) {
                    body.update_position(dt);
                }
            }
            for &handle in &self.active_bodies {
                let Some(body) = self.bodies.get(handle.0) else {
                    continue;
                };
                for &shape in &body.shapes {
                    if let Some(shape) = self.shapes.get_mut(shape.0) {
                        shape.update(body.transform);
                    }
                }
            }
            self.find_pairs();
            for i in 0..self.pairs.len() {
                let (a, b) = self.pairs[i];
                self.collide_shapes(a, b);
            }
        }
        self.unlock(false);

        self.process_components(dt);

        self.lock();
        {
            self.filter_cached_arbiters();

            let slop = self.config.collision_slop;
            let bias_coef = 1.0 - self.config.collision_bias.powf(dt);
            for &handle in &self.active_arbiters {
                let Some(arb) = self.arbiters.get_mut(handle.0) else {
                    continue;
                };
                if let (Some(a), Some(b)) = (self.bodies.get(arb.body_a.0), self.bodies.get(arb.body_b.0)) {
                    arb.prestep(a, b, dt, slop, bias_coef);
                }
            }
            for &handle in &self.active_constraints {
                let Some(constraint) = self.constraints.get_mut(handle.0) else {
                    continue;
                };
                if let Some((a, b)) = self.bodies.get2_mut(constraint.body_a.0, constraint.body_b.0) {
                    constraint.pre_step(a, b, dt);
                }
            }

            let damping = self.config.damping.powf(dt);
            let gravity = self.config.gravity;
            for &handle in &self.active_bodies {
                if let Some(body) = self.bodies.get_mut(handle.0) {
                    body.update_velocity(gravity, damping, dt);
                }
            }

            let dt_coef = if prev_dt == 0.0 { 0.0 } else { dt / prev_dt };
            for &handle in &self.active_arbiters {
                let Some(arb) = self.arbiters.get_mut(handle.0) else {
                    continue;
                };
                if let Some((a, b)) = self.bodies.get2_mut(arb.body_a.0, arb.body_b.0) {
                    arb.apply_cached_impulse(a, b, dt_coef);
                }
            }
            for &handle in &self.active_constraints {
                let Some(constraint) = self.constraints.get_mut(handle.0) else {
                    continue;
                };
                if let Some((a, b)) = self.bodies.get2_mut(constraint.body_a.0, constraint.body_b.0) {
                    constraint.apply_cached_impulse(a, b, dt_coef);
                }
            }

            for _ in 0..self.config.iterations {
                for &handle in &self.active_arbiters {
                    let Some(arb) = self.arbiters.get_mut(handle.0) else {
                        continue;
                    };
                    if let Some((a, b)) = self.bodies.get2_mut(arb.body_a.0, arb.body_b.0) {
                        arb.apply_impulse(a, b);
                    }
                }
                for &handle in &self.active_constraints {
                    let Some(constraint) = self.constraints.get_mut(handle.0) else {
                        continue;
                    };
                    if let Some((a, b)) = self.bodies.get2_mut(constraint.body_a.0, constraint.body_b.0) {
                        constraint.apply_impulse(a, b, dt);
                    }
                }
            }

            for &handle in &self.active_arbiters {
                if let Some(arb) = self.arbiters.get(handle.0) {
                    handler_for(&mut self.handlers, &mut self.default_handler, arb.handler)
                        .post_solve(arb, &mut self.post_step);
                }
            }

            trace!(
                "step {}: {} active bodies, {} arbiters, {} constraints, {} sleeping components",
                self.stamp,
                self.active_bodies.len(),
                self.active_arbiters.len(),
                self.active_constraints.len(),
                self.sleeping_components.len()
            );
        }
        self.unlock(true);
    }

    /// Refits the dynamic tree and collects overlapping shape pairs.
    fn find_pairs(&mut self) {
        let Space {
            tree,
            shapes,
            bodies,
            pairs,
            ..
        } = self;
        pairs.clear();
        tree.reindex_query(
            |handle| match shapes.get(handle.0) {
                Some(shape) => {
                    let velocity = bodies
                        .get(shape.body.0)
                        .map_or(Vec2::ZERO, |body| body.linear_velocity);
                    (shape.bb, velocity)
                }
                None => (AABB::for_circle(Vec2::ZERO, 0.0), Vec2::ZERO),
            },
            |a, b| pairs.push((a, b)),
        );
    }

    /// True when a constraint between the bodies disables their collisions.
    fn joint_blocks(&self, a: BodyHandle, b: BodyHandle) -> bool {
        let Some(body) = self.bodies.get(a.0) else {
            return false;
        };
        body.constraints
            .iter()
            .filter_map(|h| self.constraints.get(h.0))
            .any(|c| !c.collide_bodies && c.other_body(a) == b)
    }

    /// Narrow phase for one candidate pair: updates or creates its
    /// arbiter and decides whether it is solved this step.
    fn collide_shapes(&mut self, ha: ShapeHandle, hb: ShapeHandle) {
        let (Some(a), Some(b)) = (self.shapes.get(ha.0), self.shapes.get(hb.0)) else {
            return;
        };
        if query_reject(a, b) || self.joint_blocks(a.body, b.body) {
            return;
        }

        let key = arbiter_key(ha, hb);
        let cached = self.cached_arbiters.get(&key).copied();
        let cached_id = cached
            .and_then(|h| self.arbiters.get(h.0))
            .map_or(0, |arb| arb.collision_id);
        collide(a, b, cached_id, self.config.narrow_phase, &mut self.info);

        if self.info.is_empty() {
            // Keep the feature cache warm for the next overlap test.
            if let Some(arb) = cached.and_then(|h| self.arbiters.get_mut(h.0)) {
                arb.collision_id = self.info.id;
            }
            return;
        }

        let ((ha, a), (hb, b)) = if self.info.swapped {
            ((hb, b), (ha, a))
        } else {
            ((ha, a), (hb, b))
        };
        let (Some(body_a), Some(body_b)) = (self.bodies.get(a.body.0), self.bodies.get(b.body.0)) else {
            return;
        };

        let handle = match cached {
            Some(handle) => handle,
            None => {
                let arb = match self.arbiter_pool.pop() {
                    Some(mut arb) => {
                        arb.reuse(ha, a.body, hb, b.body);
                        arb
                    }
                    None => Arbiter::new(ha, a.body, hb, b.body),
                };
                let handle = ArbiterHandle(self.arbiters.insert(arb));
                self.cached_arbiters.insert(key, handle);
                handle
            }
        };
        let Some(arb) = self.arbiters.get_mut(handle.0) else {
            return;
        };
        arb.update(&self.info, (ha, a), (hb, b), body_a.position, body_b.position);

        let (ta, tb) = (a.collision_type, b.collision_type);
        let (handler_key, swapped) = if self.handlers.contains_key(&(ta, tb)) {
            (Some((ta, tb)), false)
        } else if self.handlers.contains_key(&(tb, ta)) {
            (Some((tb, ta)), true)
        } else {
            (None, false)
        };
        arb.handler = handler_key;
        arb.swapped = swapped;

        let handler = handler_for(&mut self.handlers, &mut self.default_handler, handler_key);
        if arb.state == ArbiterState::FirstCollision && !handler.begin(arb, &mut self.post_step) {
            arb.ignore();
            debug!("begin callback rejected the pair {:?}", key);
        }

        let solve = arb.state != ArbiterState::Ignore
            && handler.pre_solve(arb, &mut self.post_step)
            && arb.state != ArbiterState::Ignore
            && !(a.sensor || b.sensor)
            && !(body_a.inv_mass() == 0.0 && body_b.inv_mass() == 0.0);
        if solve {
            self.active_arbiters.push(handle);
        } else {
            arb.clear_contacts();
            if arb.state != ArbiterState::Ignore {
                arb.state = ArbiterState::Normal;
            }
        }
        arb.stamp = self.stamp;
    }

    /// Ages arbiters whose shapes stopped touching: fires `separate` once
    /// and returns them to the pool after `collision_persistence` steps.
    fn filter_cached_arbiters(&mut self) {
        let persistence = u64::from(self.config.collision_persistence);
        let stamp = self.stamp;
        let Space {
            cached_arbiters,
            arbiters,
            arbiter_pool,
            bodies,
            handlers,
            default_handler,
            post_step,
            ..
        } = self;
        let resting = |body: BodyHandle| {
            bodies
                .get(body.0)
                .map_or(true, |body| body.is_static() || body.is_sleeping())
        };

        cached_arbiters.retain(|_, &mut handle| {
            let Some(arb) = arbiters.get_mut(handle.0) else {
                return false;
            };
            // Keep pairs between sleeping or static bodies so waking them
            // does not report a separation.
            if resting(arb.body_a) && resting(arb.body_b) {
                return true;
            }

            let ticks = stamp - arb.stamp;
            if ticks >= 1 && arb.state != ArbiterState::Cached {
                arb.state = ArbiterState::Cached;
                handler_for(handlers, default_handler, arb.handler).separate(arb, post_step);
            }
            if ticks >= persistence {
                if let Some(mut arb) = arbiters.remove(handle.0) {
                    arb.clear_contacts();
                    arbiter_pool.push(arb);
                }
                return false;
            }
            true
        });
    }
}
