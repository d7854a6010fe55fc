use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug)]
struct Epoch {
    current: u64,
    live: bool,
}

/// Decides whether detector completions may still act.
///
/// Every submission takes a [`DetectionTicket`] stamped with the current
/// epoch. [`shut_down`](Self::shut_down) advances the epoch under the write
/// lock while tickets deliver under the read lock, so once `shut_down`
/// returns no earlier ticket can deliver again.
#[derive(Debug)]
pub struct PipelineLiveness {
    epoch: RwLock<Epoch>,
}

impl PipelineLiveness {
    /// Starts shut down; call [`begin`](Self::begin) to go live.
    pub fn new() -> Self {
        Self {
            epoch: RwLock::new(Epoch {
                current: 0,
                live: false,
            }),
        }
    }

    pub fn begin(&self) {
        let mut epoch = self.epoch.write().unwrap_or_else(PoisonError::into_inner);
        epoch.live = true;
    }

    /// Invalidates every outstanding ticket. Blocks until deliveries already
    /// in progress have finished.
    pub fn shut_down(&self) {
        let mut epoch = self.epoch.write().unwrap_or_else(PoisonError::into_inner);
        epoch.current += 1;
        epoch.live = false;
    }

    pub fn is_live(&self) -> bool {
        self.epoch.read().unwrap_or_else(PoisonError::into_inner).live
    }

    /// A ticket for the current epoch, or `None` while shut down.
    pub fn ticket(self: &Arc<Self>) -> Option<DetectionTicket> {
        let epoch = self.epoch.read().unwrap_or_else(PoisonError::into_inner);
        epoch.live.then(|| DetectionTicket {
            liveness: Arc::clone(self),
            epoch: epoch.current,
        })
    }
}

impl Default for PipelineLiveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Permission for one detector completion to act on its result.
#[derive(Debug)]
pub struct DetectionTicket {
    liveness: Arc<PipelineLiveness>,
    epoch: u64,
}

impl DetectionTicket {
    /// Runs `action` if the ticket's epoch is still live. Returns whether it
    /// ran. `action` must not shut the pipeline down.
    pub fn deliver(self, action: impl FnOnce()) -> bool {
        let epoch = self
            .liveness
            .epoch
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if !epoch.live || epoch.current != self.epoch {
            return false;
        }
        action();
        true
    }
}
