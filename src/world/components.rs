//! Contact graph, idle tracking and island sleeping.

use log::debug;

use crate::collision::AABB;
use crate::common::{ArbiterHandle, BodyHandle};
use crate::objects::rigid_body::RigidBody;

use super::space::{arbiter_key, Space};

impl Space {
    /// Rebuilds each body's arbiter list from the pairs solved this step,
    /// then, with sleeping enabled, puts idle components to sleep.
    pub(crate) fn process_components(&mut self, dt: f64) {
        let sleep = self.config.sleeping_enabled();

        if sleep {
            let dv = self.config.idle_speed_threshold;
            let dvsq = if dv != 0.0 {
                dv * dv
            } else {
                self.config.gravity.magnitude_squared() * dt * dt
            };
            for &handle in &self.active_bodies {
                let Some(body) = self.bodies.get_mut(handle.0) else {
                    continue;
                };
                if !body.is_dynamic() {
                    continue;
                }
                let threshold = if dvsq != 0.0 { body.mass() * dvsq } else { 0.0 };
                body.sleeping.idle_time = if body.kinetic_energy() > threshold {
                    0.0
                } else {
                    body.sleeping.idle_time + dt
                };
            }
        }

        // Bodies woken here append their arbiters; those are already
        // threaded onto their bodies.
        let count = self.active_arbiters.len();
        for i in 0..count {
            let handle = self.active_arbiters[i];
            let Some(arb) = self.arbiters.get(handle.0) else {
                continue;
            };
            let (a, b) = (arb.body_a, arb.body_b);
            if sleep {
                if self.body_is(b, RigidBody::is_kinematic) || self.body_is(a, RigidBody::is_sleeping) {
                    self.wake(a);
                }
                if self.body_is(a, RigidBody::is_kinematic) || self.body_is(b, RigidBody::is_sleeping) {
                    self.wake(b);
                }
            }
            self.push_arbiter(a, handle);
            self.push_arbiter(b, handle);
        }

        if !sleep {
            return;
        }

        // A joint to a kinematic body holds the other body awake.
        let mut i = 0;
        while i < self.active_constraints.len() {
            if let Some(constraint) = self.constraints.get(self.active_constraints[i].0) {
                let (a, b) = constraint.bodies();
                if self.body_is(b, RigidBody::is_kinematic) {
                    self.wake(a);
                }
                if self.body_is(a, RigidBody::is_kinematic) {
                    self.wake(b);
                }
            }
            i += 1;
        }

        let threshold = self.config.sleep_time_threshold;
        let mut i = 0;
        while i < self.active_bodies.len() {
            let handle = self.active_bodies[i];
            let unvisited = self
                .bodies
                .get(handle.0)
                .map_or(false, |body| body.is_dynamic() && body.sleeping.root.is_none());
            if unvisited {
                self.flood_fill(handle);
                if !self.component_active(handle, threshold) {
                    // Removes `handle` from the active list.
                    self.sleep_component(handle);
                    continue;
                }
            }
            i += 1;

            // Only sleeping bodies keep their component links.
            if let Some(body) = self.bodies.get_mut(handle.0) {
                body.sleeping.root = None;
                body.sleeping.next = None;
            }
        }
    }

    fn body_is(&self, handle: BodyHandle, test: fn(&RigidBody) -> bool) -> bool {
        self.bodies.get(handle.0).map_or(false, test)
    }

    /// Threads an arbiter onto a body's list. Static bodies keep no list.
    fn push_arbiter(&mut self, body: BodyHandle, arb: ArbiterHandle) {
        if let Some(body) = self.bodies.get_mut(body.0) {
            if !body.is_static() && !body.arbiters.contains(&arb) {
                body.arbiters.push(arb);
            }
        }
    }

    /// Marks every dynamic body reachable from `root` through arbiters
    /// and constraints as a member of `root`'s component.
    fn flood_fill(&mut self, root: BodyHandle) {
        let mut stack = std::mem::take(&mut self.flood_stack);
        stack.clear();
        stack.push(root);

        while let Some(handle) = stack.pop() {
            let root_next = if handle == root {
                None
            } else {
                self.bodies.get(root.0).and_then(|body| body.sleeping.next)
            };
            let Some(body) = self.bodies.get_mut(handle.0) else {
                continue;
            };
            // Kinematic and static bodies never join a component.
            if !body.is_dynamic() {
                continue;
            }
            if let Some(other) = body.sleeping.root {
                debug_assert_eq!(other, root, "inconsistent contact graph");
                continue;
            }

            body.sleeping.root = Some(root);
            if handle != root {
                body.sleeping.next = root_next;
                if let Some(root_body) = self.bodies.get_mut(root.0) {
                    root_body.sleeping.next = Some(handle);
                }
            }

            let Some(body) = self.bodies.get(handle.0) else {
                continue;
            };
            for arb in body.arbiters.iter().filter_map(|h| self.arbiters.get(h.0)) {
                stack.push(arb.other_body(handle));
            }
            for constraint in body.constraints.iter().filter_map(|h| self.constraints.get(h.0)) {
                stack.push(constraint.other_body(handle));
            }
        }

        self.flood_stack = stack;
    }

    fn component_members(&self, root: BodyHandle) -> Vec<BodyHandle> {
        let mut members = Vec::new();
        let mut next = Some(root);
        while let Some(handle) = next {
            members.push(handle);
            next = self.bodies.get(handle.0).and_then(|body| body.sleeping.next);
        }
        members
    }

    fn component_active(&self, root: BodyHandle, threshold: f64) -> bool {
        self.component_members(root).iter().any(|h| {
            self.bodies
                .get(h.0)
                .map_or(false, |body| body.sleeping.idle_time < threshold)
        })
    }

    /// True when `body` restores (or stores) the arbiter or constraint
    /// whose first body is `body_a`. Each one is owned by exactly one of
    /// the two bodies.
    fn owns(&self, body: BodyHandle, body_a: BodyHandle) -> bool {
        body == body_a || self.body_is(body_a, RigidBody::is_static)
    }

    /// Takes a whole component out of the simulation. Its shapes move to
    /// the static tree; its arbiters and constraints leave the solver
    /// lists but stay threaded on the bodies.
    fn sleep_component(&mut self, root: BodyHandle) {
        self.sleeping_components.push(root);
        let members = self.component_members(root);

        let bodies = &self.bodies;
        self.active_bodies.retain(|h| {
            bodies
                .get(h.0)
                .map_or(true, |body| body.sleeping.root != Some(root))
        });

        for &member in &members {
            let Some(body) = self.bodies.get(member.0) else {
                continue;
            };
            for &shape in &body.shapes {
                if let Some(s) = self.shapes.get(shape.0) {
                    self.tree.insert_static(shape, s.bb);
                }
            }

            for &handle in &body.arbiters {
                let Some(arb) = self.arbiters.get(handle.0) else {
                    continue;
                };
                if self.owns(member, arb.body_a) {
                    self.cached_arbiters.remove(&arbiter_key(arb.shape_a, arb.shape_b));
                    self.active_arbiters.retain(|&h| h != handle);
                }
            }
            for &handle in &body.constraints {
                let Some(constraint) = self.constraints.get(handle.0) else {
                    continue;
                };
                if self.owns(member, constraint.body_a) {
                    self.active_constraints.retain(|&h| h != handle);
                }
            }
        }

        debug!("component of {} bodies fell asleep", members.len());
    }

    /// Returns a woken body to the simulation. Deferred until the lock is
    /// released when called during a step.
    pub(crate) fn reactivate(&mut self, handle: BodyHandle) {
        if self.is_locked() {
            if !self.roused_bodies.contains(&handle) {
                self.roused_bodies.push(handle);
            }
            return;
        }
        if self.active_bodies.contains(&handle) {
            return;
        }
        let Some(body) = self.bodies.get(handle.0) else {
            return;
        };
        self.active_bodies.push(handle);

        let velocity = body.linear_velocity;
        for &shape in &body.shapes {
            if let Some(s) = self.shapes.get(shape.0) {
                self.tree.insert(shape, s.bb, velocity);
            }
        }

        for &arb_handle in &body.arbiters {
            let Some(body_a) = self.arbiters.get(arb_handle.0).map(|arb| arb.body_a) else {
                continue;
            };
            if !self.owns(handle, body_a) {
                continue;
            }
            let Some(arb) = self.arbiters.get_mut(arb_handle.0) else {
                continue;
            };
            self.cached_arbiters
                .entry(arbiter_key(arb.shape_a, arb.shape_b))
                .or_insert(arb_handle);
            arb.stamp = self.stamp;
            self.active_arbiters.push(arb_handle);
        }

        for &c in &body.constraints {
            let Some(constraint) = self.constraints.get(c.0) else {
                continue;
            };
            if self.owns(handle, constraint.body_a) && !self.active_constraints.contains(&c) {
                self.active_constraints.push(c);
            }
        }
    }

    /// Resets a dynamic body's idle timer and wakes its whole component
    /// if it was asleep. Bodies it touches get their idle timers reset
    /// too.
    pub(crate) fn wake(&mut self, handle: BodyHandle) {
        let root = match self.bodies.get_mut(handle.0) {
            Some(body) if body.is_dynamic() => {
                body.sleeping.idle_time = 0.0;
                body.sleeping.root
            }
            _ => return,
        };

        if let Some(root) = root.filter(|&root| self.body_is(root, RigidBody::is_sleeping)) {
            let members = self.component_members(root);
            for &member in &members {
                if let Some(body) = self.bodies.get_mut(member.0) {
                    body.sleeping = Default::default();
                }
                self.reactivate(member);
            }
            self.sleeping_components.retain(|&h| h != root);
            debug!("component of {} bodies woke up", members.len());
        }

        let mut i = 0;
        while let Some(arb) = self
            .bodies
            .get(handle.0)
            .and_then(|body| body.arbiters.get(i))
            .and_then(|h| self.arbiters.get(h.0))
        {
            let other = arb.other_body(handle);
            if let Some(body) = self.bodies.get_mut(other.0) {
                if !body.is_static() {
                    body.sleeping.idle_time = 0.0;
                }
            }
            i += 1;
        }
    }

    /// Wakes every sleeping component.
    pub(crate) fn wake_all(&mut self) {
        let roots = self.sleeping_components.clone();
        for root in roots {
            self.wake(root);
        }
    }

    /// Wakes the bodies whose shapes overlap `bb`.
    pub(crate) fn wake_touching(&mut self, bb: AABB) {
        let mut touching = Vec::new();
        self.tree.query(bb, |shape| {
            if let Some(shape) = self.shapes.get(shape.0) {
                touching.push(shape.body);
            }
        });
        for body in touching {
            self.wake(body);
        }
    }
}
