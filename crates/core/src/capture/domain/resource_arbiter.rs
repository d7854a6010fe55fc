use std::sync::{Mutex, MutexGuard, PoisonError};

/// Who holds the shared camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Idle,
    OwnedBySelf,
    OwnedExternally,
}

#[derive(Debug)]
struct ArbiterState {
    resource: ResourceState,
    paused: bool,
}

/// Tracks camera ownership against other consumers on the device and
/// derives the paused signal the detection pipeline obeys.
///
/// Every method takes the lock for a single read-modify-write and calls
/// nothing while holding it, so hardware callbacks can never deadlock on it.
pub struct ResourceArbiter {
    state: Mutex<ArbiterState>,
}

impl ResourceArbiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ArbiterState {
                resource: ResourceState::Idle,
                paused: false,
            }),
        }
    }

    /// The camera became unavailable. Ignored while we hold it ourselves:
    /// the event is then our own open echoing back.
    pub fn on_external_unavailable(&self) {
        let paused = {
            let mut state = self.lock();
            if state.resource == ResourceState::OwnedBySelf {
                false
            } else {
                let newly = !state.paused;
                state.resource = ResourceState::OwnedExternally;
                state.paused = true;
                newly
            }
        };
        if paused {
            log::info!("Camera claimed by another client; pausing detection");
        }
    }

    /// The camera became available again. Always clears the pause.
    pub fn on_external_available(&self) {
        let resumed = {
            let mut state = self.lock();
            if state.resource == ResourceState::OwnedExternally {
                state.resource = ResourceState::Idle;
            }
            std::mem::replace(&mut state.paused, false)
        };
        if resumed {
            log::info!("Camera available; resuming detection");
        }
    }

    /// Another client took the camera away from us mid-session.
    pub fn on_external_reclaim(&self) {
        let mut state = self.lock();
        state.resource = ResourceState::OwnedExternally;
        state.paused = true;
    }

    pub fn on_self_opened(&self) {
        self.lock().resource = ResourceState::OwnedBySelf;
    }

    pub fn on_self_closed(&self) {
        let mut state = self.lock();
        if state.resource == ResourceState::OwnedBySelf {
            state.resource = ResourceState::Idle;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn state(&self) -> ResourceState {
        self.lock().resource
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResourceArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_idle_and_active() {
        let arbiter = ResourceArbiter::new();
        assert_eq!(arbiter.state(), ResourceState::Idle);
        assert!(!arbiter.is_paused());
    }

    #[test]
    fn test_external_unavailable_pauses_when_not_self_owned() {
        let arbiter = ResourceArbiter::new();
        arbiter.on_external_unavailable();
        assert_eq!(arbiter.state(), ResourceState::OwnedExternally);
        assert!(arbiter.is_paused());
    }

    #[test]
    fn test_external_unavailable_ignored_while_self_owned() {
        let arbiter = ResourceArbiter::new();
        arbiter.on_self_opened();
        arbiter.on_external_unavailable();
        assert_eq!(arbiter.state(), ResourceState::OwnedBySelf);
        assert!(!arbiter.is_paused());
    }

    #[test]
    fn test_external_available_resumes() {
        let arbiter = ResourceArbiter::new();
        arbiter.on_external_unavailable();
        arbiter.on_external_available();
        assert_eq!(arbiter.state(), ResourceState::Idle);
        assert!(!arbiter.is_paused());
    }

    #[test]
    fn test_external_available_keeps_self_ownership() {
        let arbiter = ResourceArbiter::new();
        arbiter.on_self_opened();
        arbiter.on_external_available();
        assert_eq!(arbiter.state(), ResourceState::OwnedBySelf);
        assert!(!arbiter.is_paused());
    }

    #[test]
    fn test_self_close_returns_to_idle() {
        let arbiter = ResourceArbiter::new();
        arbiter.on_self_opened();
        arbiter.on_self_closed();
        assert_eq!(arbiter.state(), ResourceState::Idle);
    }

    #[test]
    fn test_self_close_leaves_external_claim_alone() {
        let arbiter = ResourceArbiter::new();
        arbiter.on_external_unavailable();
        arbiter.on_self_closed();
        assert_eq!(arbiter.state(), ResourceState::OwnedExternally);
        assert!(arbiter.is_paused());
    }

    #[test]
    fn test_reclaim_marks_external_and_pauses() {
        let arbiter = ResourceArbiter::new();
        arbiter.on_self_opened();
        arbiter.on_self_closed();
        arbiter.on_external_reclaim();
        assert_eq!(arbiter.state(), ResourceState::OwnedExternally);
        assert!(arbiter.is_paused());

        arbiter.on_external_available();
        assert!(!arbiter.is_paused());
    }

    #[test]
    fn test_concurrent_callbacks_keep_state_consistent() {
        let arbiter = Arc::new(ResourceArbiter::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let arbiter = arbiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if i % 2 == 0 {
                            arbiter.on_external_unavailable();
                        } else {
                            arbiter.on_external_available();
                        }
                        let _ = arbiter.is_paused();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        arbiter.on_external_available();
        assert!(!arbiter.is_paused());
        assert_eq!(arbiter.state(), ResourceState::Idle);
    }
}
