//! Run serialization keyed by output path
//!
//! A working tree and its archive are derived from the token alone, so two
//! live runs must never share either path. Claims live in one process-wide
//! registry, so separate generators pointed at the same directories still
//! exclude each other. A claim is held from the start of `generate()` until
//! that run's cleanup.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

static GLOBAL: OnceLock<Arc<PathLocks>> = OnceLock::new();

#[derive(Debug, Default)]
pub struct PathLocks {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl PathLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The registry shared by every generator in this process.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(Self::new))
    }

    fn held(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // The set stays consistent even if a holder panicked.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim every path in `paths`, waiting at most `timeout` for live runs
    /// to release them.
    ///
    /// All or nothing: returns `None` if any path is still held when the
    /// timeout runs out. A zero timeout never waits.
    pub fn acquire(self: &Arc<Self>, paths: &[&Path], timeout: Duration) -> Option<PathClaim> {
        let keys: Vec<PathBuf> = paths.iter().map(|path| lock_key(path)).collect();
        let deadline = Instant::now().checked_add(timeout);

        let mut held = self.held();
        while keys.iter().any(|key| held.contains(key)) {
            debug!("Waiting for in-flight run on {}", keys[0].display());
            held = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    self.released
                        .wait_timeout(held, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .released
                    .wait(held)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        held.extend(keys.iter().cloned());

        Some(PathClaim {
            locks: Arc::clone(self),
            keys,
        })
    }

    /// Claim `paths` only if no live run holds any of them.
    pub fn try_acquire(self: &Arc<Self>, paths: &[&Path]) -> Option<PathClaim> {
        self.acquire(paths, Duration::ZERO)
    }

    pub fn is_held(&self, path: &Path) -> bool {
        self.held().contains(&lock_key(path))
    }
}

/// Absolute form of `path` with its longest existing prefix canonicalized.
///
/// Stays the same whether or not the path itself exists yet, so a claim
/// taken before a tree is built still matches after.
pub fn lock_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    for ancestor in absolute.ancestors() {
        if let (Ok(real), Ok(rest)) = (ancestor.canonicalize(), absolute.strip_prefix(ancestor)) {
            return real.join(rest);
        }
    }
    absolute
}

/// Exclusive hold on a run's paths. Released on drop.
#[derive(Debug)]
pub struct PathClaim {
    locks: Arc<PathLocks>,
    keys: Vec<PathBuf>,
}

impl PathClaim {
    pub fn paths(&self) -> &[PathBuf] {
        &self.keys
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        let mut held = self.locks.held();
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
