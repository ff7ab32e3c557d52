//! Task-scoped storage credential.

use tokio::task::futures::TaskLocalFuture;

tokio::task_local! {
    static CURRENT: StorageCredential;
}

/// A bearer credential for a single storage account, bound to the request
/// that acquired it.
///
/// Cheap to clone: readers that spawn blocking work (e.g. `spawn_blocking`
/// for a COG read) can clone this out of the task-local scope and carry it
/// across the blocking boundary, since task-locals don't survive a move to
/// a different task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCredential {
    pub storage_account: String,
    pub bearer_token: String,
}

impl StorageCredential {
    pub fn new(storage_account: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            storage_account: storage_account.into(),
            bearer_token: bearer_token.into(),
        }
    }
}

/// Handle onto the task-local storage credential slot.
///
/// There is no constructible instance of this type — it is a namespace for
/// [`RequestCredential::scope`] and [`RequestCredential::current`].
pub struct RequestCredential;

impl RequestCredential {
    /// Run `future` with `credential` bound to the current task.
    ///
    /// The binding is visible to everything `future` awaits, including
    /// work spawned and joined from within it, but never leaks to sibling
    /// tasks or the caller after the returned future completes — when the
    /// future is dropped (normal completion, error, or cancellation) the
    /// task-local scope ends and the credential is gone.
    pub fn scope<F>(credential: StorageCredential, future: F) -> TaskLocalFuture<StorageCredential, F>
    where
        F: Future,
    {
        CURRENT.scope(credential, future)
    }

    /// Read the credential bound to the current task, if any.
    ///
    /// Returns `None` when called outside a [`RequestCredential::scope`]
    /// future — e.g. storage auth is disabled, or the reader was invoked
    /// from a context the middleware never wrapped.
    pub fn current() -> Option<StorageCredential> {
        CURRENT.try_with(|c| c.clone()).ok()
    }
}
