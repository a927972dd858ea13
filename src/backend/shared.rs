//! Ownership handoff for buffers shared between the graphics and compute
//! sides of a device.
//!
//! Legal cycle: `GraphicsOwned → ComputeAcquiring → ComputeOwned →
//! ComputeReleasing → GraphicsOwned`. Any other transition is a programming
//! error and trips a debug assertion.

use std::collections::HashMap;

use super::SharedBufferHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    GraphicsOwned,
    ComputeAcquiring,
    ComputeOwned,
    ComputeReleasing,
}

impl Ownership {
    /// The only state reachable from `self`
    pub fn successor(self) -> Ownership {
        match self {
            Ownership::GraphicsOwned => Ownership::ComputeAcquiring,
            Ownership::ComputeAcquiring => Ownership::ComputeOwned,
            Ownership::ComputeOwned => Ownership::ComputeReleasing,
            Ownership::ComputeReleasing => Ownership::GraphicsOwned,
        }
    }

    fn advance(&mut self, to: Ownership, buffer: SharedBufferHandle) {
        debug_assert_eq!(
            self.successor(),
            to,
            "illegal ownership transition {:?} -> {:?} for shared buffer {}",
            self,
            to,
            buffer.id()
        );
        *self = to;
    }
}

/// Ownership state of every live shared buffer
#[derive(Debug, Default)]
pub struct OwnershipTracker {
    states: HashMap<SharedBufferHandle, Ownership>,
}

impl OwnershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// New buffers start out owned by graphics
    pub fn register(&mut self, buffer: SharedBufferHandle) {
        self.states.insert(buffer, Ownership::GraphicsOwned);
    }

    pub fn unregister(&mut self, buffer: SharedBufferHandle) {
        if let Some(state) = self.states.remove(&buffer) {
            debug_assert_eq!(
                state,
                Ownership::GraphicsOwned,
                "shared buffer {} released while held by compute",
                buffer.id()
            );
        }
    }

    pub fn state(&self, buffer: SharedBufferHandle) -> Ownership {
        match self.states.get(&buffer) {
            Some(state) => *state,
            None => panic!("unknown shared buffer {}", buffer.id()),
        }
    }

    pub fn begin_acquire(&mut self, buffer: SharedBufferHandle) {
        self.entry(buffer).advance(Ownership::ComputeAcquiring, buffer);
    }

    pub fn finish_acquire(&mut self, buffer: SharedBufferHandle) {
        self.entry(buffer).advance(Ownership::ComputeOwned, buffer);
    }

    pub fn begin_release(&mut self, buffer: SharedBufferHandle) {
        self.entry(buffer).advance(Ownership::ComputeReleasing, buffer);
    }

    /// Complete every pending release (called when compute work is flushed)
    pub fn finish_releases(&mut self) {
        for state in self.states.values_mut() {
            if *state == Ownership::ComputeReleasing {
                *state = Ownership::GraphicsOwned;
            }
        }
    }

    pub fn assert_compute_owned(&self, buffer: SharedBufferHandle) {
        debug_assert_eq!(
            self.state(buffer),
            Ownership::ComputeOwned,
            "kernel uses shared buffer {} without acquiring it",
            buffer.id()
        );
    }

    pub fn assert_graphics_owned(&self, buffer: SharedBufferHandle) {
        debug_assert_eq!(
            self.state(buffer),
            Ownership::GraphicsOwned,
            "draw reads shared buffer {} while compute holds it",
            buffer.id()
        );
    }

    /// Compute must not hold a shared buffer across a frame boundary
    pub fn assert_none_held(&self) {
        debug_assert!(
            self.states
                .values()
                .all(|state| *state == Ownership::GraphicsOwned),
            "shared buffer held by compute across a frame boundary"
        );
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn entry(&mut self, buffer: SharedBufferHandle) -> &mut Ownership {
        match self.states.get_mut(&buffer) {
            Some(state) => state,
            None => panic!("unknown shared buffer {}", buffer.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked() -> (OwnershipTracker, SharedBufferHandle) {
        let mut tracker = OwnershipTracker::new();
        let buffer = SharedBufferHandle::new(7);
        tracker.register(buffer);
        (tracker, buffer)
    }

    #[test]
    fn test_full_cycle_returns_to_graphics() {
        let (mut tracker, buffer) = tracked();
        assert_eq!(tracker.state(buffer), Ownership::GraphicsOwned);

        tracker.begin_acquire(buffer);
        assert_eq!(tracker.state(buffer), Ownership::ComputeAcquiring);
        tracker.finish_acquire(buffer);
        tracker.assert_compute_owned(buffer);
        tracker.begin_release(buffer);
        assert_eq!(tracker.state(buffer), Ownership::ComputeReleasing);
        tracker.finish_releases();

        tracker.assert_graphics_owned(buffer);
        tracker.assert_none_held();
    }

    #[test]
    fn test_successor_cycle_has_period_four() {
        let mut state = Ownership::GraphicsOwned;
        for _ in 0..4 {
            state = state.successor();
        }
        assert_eq!(state, Ownership::GraphicsOwned);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "illegal ownership transition")]
    fn test_release_without_acquire_panics() {
        let (mut tracker, buffer) = tracked();
        tracker.begin_release(buffer);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "while compute holds it")]
    fn test_draw_during_compute_panics() {
        let (mut tracker, buffer) = tracked();
        tracker.begin_acquire(buffer);
        tracker.finish_acquire(buffer);
        tracker.assert_graphics_owned(buffer);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "across a frame boundary")]
    fn test_unflushed_release_trips_frame_check() {
        let (mut tracker, buffer) = tracked();
        tracker.begin_acquire(buffer);
        tracker.finish_acquire(buffer);
        tracker.begin_release(buffer);
        tracker.assert_none_held();
    }
}
