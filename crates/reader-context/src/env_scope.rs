//! Process-global environment variable scoping for reader backends that
//! cannot be handed a credential any other way (GDAL-style C bindings read
//! `AZURE_STORAGE_*`/`AWS_*` env vars at open() time, not via an API).
//!
//! Only one scope may be live at a time; `scoped_env` serializes callers on
//! a process-wide mutex and the returned guard restores whatever the
//! variables held before it ran (usually nothing) when it drops — on every
//! exit path, including a panic unwind.

use std::collections::HashMap;
use std::env;
use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard holding the process-wide environment lock for the lifetime
/// of a scoped credential injection.
///
/// Dropping the guard restores the previous value of every variable this
/// scope touched (removing it if it was previously unset), then releases
/// the lock.
pub struct ScopedEnvGuard {
    previous: HashMap<&'static str, Option<String>>,
    _lock: MutexGuard<'static, ()>,
}

impl Drop for ScopedEnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain() {
            // SAFETY: exclusive access to the environment is held for the
            // lifetime of this guard via `ENV_LOCK`.
            unsafe {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Set `vars` in the process environment for the duration of the returned
/// guard's lifetime, blocking until any other scope has released the lock.
///
/// Intended for short-lived use immediately before invoking a reader
/// backend's open/read call, held only across that call.
pub fn scoped_env(vars: &[(&'static str, &str)]) -> ScopedEnvGuard {
    let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let mut previous = HashMap::with_capacity(vars.len());
    for (key, value) in vars {
        previous.insert(*key, env::var(key).ok());
        // SAFETY: `lock` guarantees no other thread is reading or writing
        // process environment variables through this module concurrently.
        unsafe {
            env::set_var(key, value);
        }
    }

    ScopedEnvGuard {
        previous,
        _lock: lock,
    }
}
