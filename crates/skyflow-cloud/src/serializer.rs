//! Mutual exclusion for provider-mutating calls
//!
//! Attaching or detaching an IP, patching a server and deleting a server all
//! read and then write state the provider shares between resources (the IP
//! pool above all). Reconcilers sharing one [`MutationSerializer`] never have
//! two such calls in flight at once. Reads are not serialized.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Process-wide gate for shared-capacity mutations.
///
/// Cloning is cheap and every clone guards the same lock, so one instance is
/// created by the caller and handed to every reconciler.
#[derive(Debug, Clone, Default)]
pub struct MutationSerializer {
    lock: Arc<Mutex<()>>,
}

/// Proof of exclusive access.
///
/// Functions that mutate shared provider state take a `&MutationToken`, so
/// they cannot be called without holding the gate. The lock is released when
/// the token is dropped, on every exit path.
#[derive(Debug)]
pub struct MutationToken {
    _guard: OwnedMutexGuard<()>,
}

impl MutationSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access.
    pub async fn acquire(&self) -> MutationToken {
        let guard = self.lock.clone().lock_owned().await;
        tracing::trace!("Acquired mutation lock");
        MutationToken { _guard: guard }
    }

    /// Run `block` while holding exclusive access.
    pub async fn with_exclusive_access<F, Fut, T>(&self, block: F) -> T
    where
        F: FnOnce(MutationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.acquire().await;
        block(token).await
    }

    /// Whether some caller currently holds the gate.
    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
