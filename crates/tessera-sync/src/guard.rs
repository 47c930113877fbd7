//! Echo suppression for the bridge's own document writes.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tessera_doc::{ChangeEvent, Origin};

/// Recognizes document changes the bridge caused itself.
///
/// A change is an echo when it arrives while the bridge is writing (a
/// [`GuardToken`] is alive) or when it carries the bridge's own origin.
/// The origin check still holds if change delivery is deferred past the
/// end of the write.
#[derive(Debug)]
pub struct FeedbackGuard {
    origin: Origin,
    depth: AtomicUsize,
    generation: AtomicU64,
}

impl FeedbackGuard {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            depth: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Mark the start of an outgoing write. The guard stays active until
    /// the returned token is dropped.
    pub fn enter(&self) -> GuardToken<'_> {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.depth.fetch_add(1, Ordering::AcqRel);
        GuardToken { guard: self }
    }

    pub fn is_active(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }

    /// Number of outgoing writes started so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_echo(&self, event: &ChangeEvent) -> bool {
        self.is_active() || event.origin == Some(self.origin)
    }
}

/// Keeps a [`FeedbackGuard`] active while alive.
#[must_use = "the guard is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a FeedbackGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.depth.fetch_sub(1, Ordering::AcqRel);
    }
}
