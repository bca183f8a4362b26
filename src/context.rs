//! Ambient "current profile" for the request being handled.
//!
//! Backed by a tokio task-local, so the value follows one request's task
//! across every `.await` and is invisible to sibling tasks. Work moved onto
//! another task or a blocking thread has to carry the handle explicitly
//! ([`propagate`], [`sync_scope`]).

use std::cell::RefCell;
use std::future::Future;

use crate::error::NotInScope;
use crate::profile::ProfileHandle;

tokio::task_local! {
    static CURRENT: RefCell<Option<ProfileHandle>>;
}

/// Previous context value returned by [`set`], consumed by [`reset`].
#[must_use = "pass the token to context::reset to restore the previous profile"]
pub struct ContextToken {
    previous: Option<ProfileHandle>,
}

/// Run `fut` with `handle` installed as the current profile.
///
/// The handle is activated before the future is first polled. The value is
/// removed when the returned future completes or is dropped.
pub fn scope<F>(handle: ProfileHandle, fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    handle.activate();
    CURRENT.scope(RefCell::new(Some(handle)), fut)
}

/// Synchronous counterpart of [`scope`]. `None` runs `f` with an empty slot,
/// so `set` still works inside it.
pub fn sync_scope<R>(handle: Option<ProfileHandle>, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(RefCell::new(handle), f)
}

/// Capture the caller's profile so `fut` sees it after being spawned.
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    CURRENT.scope(RefCell::new(current()), fut)
}

/// The profile of the request currently executing, if any.
pub fn current() -> Option<ProfileHandle> {
    CURRENT.try_with(|slot| slot.borrow().clone()).ok().flatten()
}

/// Replace the current profile inside an existing scope.
///
/// A task-local needs a scope to live in, so outside [`scope`] or
/// [`sync_scope`] nothing can be installed and this returns
/// [`NotInScope`]. `sync_scope(None, ..)` opens an empty one.
pub fn set(handle: ProfileHandle) -> Result<ContextToken, NotInScope> {
    let installed = CURRENT.try_with(|slot| slot.replace(Some(handle.clone())));
    match installed {
        Ok(previous) => {
            handle.activate();
            Ok(ContextToken { previous })
        }
        Err(_) => {
            tracing::warn!(profile = %handle.id(), "context::set called outside a profiling scope");
            Err(NotInScope)
        }
    }
}

/// Restore whatever was current before the matching [`set`].
pub fn reset(token: ContextToken) {
    let _ = CURRENT.try_with(|slot| {
        slot.replace(token.previous);
    });
}
