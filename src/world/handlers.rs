//! Collision callbacks and the deferred-mutation queue they write to.

use std::collections::VecDeque;
use std::fmt;

use log::warn;

use crate::collision::Arbiter;

use super::Space;

/// Runs once the step has finished and the space is unlocked.
pub type PostStepFn = Box<dyn FnOnce(&mut Space)>;

/// Return `false` to reject the contact. From `begin` the pair stays
/// ignored until the shapes separate; from `pre_solve` only for this step.
pub type FilterFn = Box<dyn FnMut(&mut Arbiter, &mut PostStepQueue) -> bool>;

pub type NotifyFn = Box<dyn FnMut(&Arbiter, &mut PostStepQueue)>;

/// Callbacks for one pair of collision types. Missing callbacks accept
/// the contact and do nothing.
#[derive(Default)]
pub struct CollisionHandler {
    /// First step the shapes touch.
    pub begin: Option<FilterFn>,
    /// Every step the shapes touch, before solving.
    pub pre_solve: Option<FilterFn>,
    /// Every step the contact was solved. Impulses are final here.
    pub post_solve: Option<NotifyFn>,
    /// Once, when the shapes stop touching or one of them is removed.
    pub separate: Option<NotifyFn>,
}

impl CollisionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_begin(mut self, f: impl FnMut(&mut Arbiter, &mut PostStepQueue) -> bool + 'static) -> Self {
        self.begin = Some(Box::new(f));
        self
    }

    pub fn on_pre_solve(
        mut self,
        f: impl FnMut(&mut Arbiter, &mut PostStepQueue) -> bool + 'static,
    ) -> Self {
        self.pre_solve = Some(Box::new(f));
        self
    }

    pub fn on_post_solve(mut self, f: impl FnMut(&Arbiter, &mut PostStepQueue) + 'static) -> Self {
        self.post_solve = Some(Box::new(f));
        self
    }

    pub fn on_separate(mut self, f: impl FnMut(&Arbiter, &mut PostStepQueue) + 'static) -> Self {
        self.separate = Some(Box::new(f));
        self
    }

    pub(crate) fn begin(&mut self, arb: &mut Arbiter, queue: &mut PostStepQueue) -> bool {
        self.begin.as_mut().map_or(true, |f| f(arb, queue))
    }

    pub(crate) fn pre_solve(&mut self, arb: &mut Arbiter, queue: &mut PostStepQueue) -> bool {
        self.pre_solve.as_mut().map_or(true, |f| f(arb, queue))
    }

    pub(crate) fn post_solve(&mut self, arb: &Arbiter, queue: &mut PostStepQueue) {
        if let Some(f) = self.post_solve.as_mut() {
            f(arb, queue);
        }
    }

    pub(crate) fn separate(&mut self, arb: &Arbiter, queue: &mut PostStepQueue) {
        if let Some(f) = self.separate.as_mut() {
            f(arb, queue);
        }
    }
}

impl fmt::Debug for CollisionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollisionHandler")
            .field("begin", &self.begin.is_some())
            .field("pre_solve", &self.pre_solve.is_some())
            .field("post_solve", &self.post_solve.is_some())
            .field("separate", &self.separate.is_some())
            .finish()
    }
}

/// FIFO of callbacks that may mutate the space. Keyed callbacks are
/// scheduled at most once until they run.
#[derive(Default)]
pub struct PostStepQueue {
    callbacks: VecDeque<(Option<u64>, PostStepFn)>,
}

impl PostStepQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `f`. Returns `false`, dropping `f`, when a callback with
    /// the same key is already pending.
    pub fn add(&mut self, key: Option<u64>, f: impl FnOnce(&mut Space) + 'static) -> bool {
        if let Some(key) = key {
            if self.callbacks.iter().any(|(k, _)| *k == Some(key)) {
                warn!("post-step callback with key {key} is already scheduled");
                return false;
            }
        }
        self.callbacks.push_back((key, Box::new(f)));
        true
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub(crate) fn pop(&mut self) -> Option<PostStepFn> {
        self.callbacks.pop_front().map(|(_, f)| f)
    }
}

impl fmt::Debug for PostStepQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostStepQueue")
            .field("pending", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_step_queue_dedupes_keys() {
        let mut queue = PostStepQueue::new();
        assert!(queue.add(Some(7), |_| {}));
        assert!(!queue.add(Some(7), |_| {}));
        assert!(queue.add(None, |_| {}));
        assert!(queue.add(None, |_| {}));
        assert_eq!(queue.len(), 3);

        assert!(queue.pop().is_some());
        // Once the keyed callback has been taken the key is free again.
        assert!(queue.add(Some(7), |_| {}));
    }

    #[test]
    fn test_post_step_queue_is_fifo() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let order = Rc::new(RefCell::new(Vec::new()));
        let mut queue = PostStepQueue::new();
        for i in 0..3 {
            let order = order.clone();
            queue.add(None, move |_| order.borrow_mut().push(i));
        }
        let mut space = Space::new();
        while let Some(f) = queue.pop() {
            f(&mut space);
        }
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_callbacks_accept() {
        use crate::common::{Arena, BodyHandle, ShapeHandle};

        let mut arena = Arena::new();
        let (b1, b2) = (BodyHandle(arena.insert(())), BodyHandle(arena.insert(())));
        let (s1, s2) = (ShapeHandle(arena.insert(())), ShapeHandle(arena.insert(())));
        let mut arb = Arbiter::new(s1, b1, s2, b2);
        let mut queue = PostStepQueue::new();

        let mut handler = CollisionHandler::new();
        assert!(handler.begin(&mut arb, &mut queue));
        assert!(handler.pre_solve(&mut arb, &mut queue));

        let mut rejecting = CollisionHandler::new().on_pre_solve(|arb, _| arb.ignore());
        assert!(!rejecting.pre_solve(&mut arb, &mut queue));
        assert!(format!("{rejecting:?}").contains("pre_solve: true"));
    }
}
