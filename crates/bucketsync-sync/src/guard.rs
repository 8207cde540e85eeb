//! Transient path guard sets
//!
//! Two sets keyed by local path keep the change watcher and the engine
//! from tripping over each other:
//!
//! - **write guard**: paths the synchronizer is writing (downloads). The
//!   watcher ignores notifications for them. Reference-counted, so two
//!   overlapping writes keep a path guarded until both tokens are gone.
//!   A dropped token releases after a delay that absorbs late
//!   notifications from the kernel.
//! - **in flight**: paths being uploaded or deleted. Exclusive; a second
//!   acquisition fails while the first token lives. Released on drop.
//!
//! Neither set is persisted.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::trace;

#[derive(Debug, Default)]
struct GuardSets {
    write: DashMap<PathBuf, usize>,
    in_flight: DashMap<PathBuf, ()>,
    release_delay: Duration,
}

impl GuardSets {
    fn release_write(&self, path: &Path) {
        if let Entry::Occupied(mut entry) = self.write.entry(path.to_path_buf()) {
            if *entry.get() <= 1 {
                entry.remove();
                trace!(path = %path.display(), "Write guard released");
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }
}

/// Shared handle to the guard sets
#[derive(Debug, Clone, Default)]
pub struct PathGuards {
    sets: Arc<GuardSets>,
}

impl PathGuards {
    /// Creates empty guard sets whose write guards linger for `release_delay`
    pub fn new(release_delay: Duration) -> Self {
        Self {
            sets: Arc::new(GuardSets {
                release_delay,
                ..GuardSets::default()
            }),
        }
    }

    /// Registers `path` as written by the synchronizer
    pub fn guard_write(&self, path: &Path) -> WriteGuardToken {
        *self.sets.write.entry(path.to_path_buf()).or_insert(0) += 1;
        trace!(path = %path.display(), "Write guard acquired");
        WriteGuardToken {
            sets: Arc::clone(&self.sets),
            path: path.to_path_buf(),
        }
    }

    pub fn is_write_guarded(&self, path: &Path) -> bool {
        self.sets.write.contains_key(path)
    }

    /// Claims `path` for one upload or delete
    ///
    /// Returns `None` if another flow already holds it.
    pub fn try_acquire_in_flight(&self, path: &Path) -> Option<InFlightToken> {
        match self.sets.in_flight.entry(path.to_path_buf()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightToken {
                    sets: Arc::clone(&self.sets),
                    path: path.to_path_buf(),
                })
            }
        }
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.sets.in_flight.contains_key(path)
    }

    /// Returns `true` if the watcher must not act on `path`
    pub fn is_suppressed(&self, path: &Path) -> bool {
        self.is_write_guarded(path) || self.is_in_flight(path)
    }
}

/// Keeps a path write-guarded until dropped, plus the release delay
#[derive(Debug)]
pub struct WriteGuardToken {
    sets: Arc<GuardSets>,
    path: PathBuf,
}

impl WriteGuardToken {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriteGuardToken {
    fn drop(&mut self) {
        let delay = self.sets.release_delay;
        let path = std::mem::take(&mut self.path);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !delay.is_zero() => {
                let sets = Arc::clone(&self.sets);
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    sets.release_write(&path);
                });
            }
            _ => self.sets.release_write(&path),
        }
    }
}

/// Exclusive claim on a path; released on drop
#[derive(Debug)]
pub struct InFlightToken {
    sets: Arc<GuardSets>,
    path: PathBuf,
}

impl InFlightToken {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.sets.in_flight.remove(&self.path);
        trace!(path = %self.path.display(), "In-flight claim released");
    }
}
