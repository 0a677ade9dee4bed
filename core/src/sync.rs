use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock `mutex`, taking the guard even if a holder panicked. The guarded
/// values are plain data that stay consistent across a panic.
pub(crate) fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
