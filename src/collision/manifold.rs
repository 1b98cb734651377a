use crate::math::vec2::Vec2;

/// Upper bound on contacts produced for one shape pair.
pub const MAX_CONTACTS_PER_ARBITER: usize = 4;

/// Order-independent hash of two feature or shape ids.
#[inline]
pub fn hash_pair(a: u64, b: u64) -> u64 {
    const HASH_COEF: u64 = 3_344_921_057;
    a.wrapping_mul(HASH_COEF) ^ b.wrapping_mul(HASH_COEF)
}

/// One contact of a shape pair.
///
/// The narrow phase fills `r_a` and `r_b` with world-space surface points;
/// the arbiter rewrites them as offsets from each body's center of gravity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Contact {
    pub r_a: Vec2,
    pub r_b: Vec2,
    /// Separation along the normal, negative while overlapping.
    pub distance: f64,
    /// Identifies the pair of features that produced the contact.
    pub hash: u64,

    pub(crate) n_mass: f64,
    pub(crate) t_mass: f64,
    pub(crate) bias: f64,
    pub(crate) bounce: f64,
    pub(crate) jn_acc: f64,
    pub(crate) jt_acc: f64,
    pub(crate) j_bias: f64,
}

impl Contact {
    pub(crate) fn new(p_a: Vec2, p_b: Vec2, distance: f64, hash: u64) -> Self {
        Contact {
            r_a: p_a,
            r_b: p_b,
            distance,
            hash,
            ..Default::default()
        }
    }

    /// Accumulated normal impulse from the last solve.
    pub fn normal_impulse(&self) -> f64 {
        self.jn_acc
    }

    /// Accumulated friction impulse from the last solve.
    pub fn tangent_impulse(&self) -> f64 {
        self.jt_acc
    }
}

/// Contact point pair in world space, as reported to callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactPoint {
    /// Point on the surface of the first shape.
    pub point_a: Vec2,
    /// Point on the surface of the second shape.
    pub point_b: Vec2,
    /// Negative while the shapes overlap.
    pub distance: f64,
}

/// Output buffer of the narrow phase for one shape pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionInfo {
    /// Normal pointing from the first shape towards the second.
    pub normal: Vec2,
    /// True when the shapes were collided in the reverse of the order
    /// they were passed in.
    pub swapped: bool,
    /// Closest-feature cache. Seeds the next query between the same pair.
    pub id: u32,
    contacts: [Contact; MAX_CONTACTS_PER_ARBITER],
    count: usize,
}

impl Default for CollisionInfo {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CollisionInfo {
    pub fn new(id: u32) -> Self {
        CollisionInfo {
            normal: Vec2::ZERO,
            swapped: false,
            id,
            contacts: [Contact::default(); MAX_CONTACTS_PER_ARBITER],
            count: 0,
        }
    }

    /// Clears the contacts and seeds the feature cache.
    pub fn reset(&mut self, id: u32) {
        self.normal = Vec2::ZERO;
        self.swapped = false;
        self.id = id;
        self.count = 0;
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts[..self.count]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Pushes a contact between surface points `p_a` and `p_b`. The
    /// separation is measured along the current normal.
    pub(crate) fn push(&mut self, p_a: Vec2, p_b: Vec2, hash: u64) {
        let distance = (p_b - p_a).dot(self.normal);
        self.push_with_distance(p_a, p_b, distance, hash);
    }

    pub(crate) fn push_with_distance(&mut self, p_a: Vec2, p_b: Vec2, distance: f64, hash: u64) {
        debug_assert!(self.count < MAX_CONTACTS_PER_ARBITER, "too many contacts");
        if self.count < MAX_CONTACTS_PER_ARBITER {
            self.contacts[self.count] = Contact::new(p_a, p_b, distance, hash);
            self.count += 1;
        }
    }

    /// Drops every contact from index `count` on.
    pub(crate) fn reset_to(&mut self, count: usize) {
        self.count = self.count.min(count);
    }

    pub(crate) fn contains_hash(&self, hash: u64) -> bool {
        self.contacts().iter().any(|c| c.hash == hash)
    }
}
