//! Exception registration.
//!
//! The [`ExceptionHandler`] logs a failure once per call. Layers that see the
//! same error on its way up (each repeat attempt, the timeout guard, the
//! service itself) can all register it without producing duplicate log lines.
//! Registration has no effect on control flow.
//!
//! ```rust
//! use kit::exceptions::ExceptionHandler;
//! use kit::KitError;
//!
//! let handler = ExceptionHandler::new();
//! let scope = handler.scope();
//! assert!(handler.register(scope.id(), &KitError::Canceled));
//! assert!(!handler.register(scope.id(), &KitError::Canceled));
//! drop(scope);
//! assert_eq!(handler.open_calls(), 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::errors::KitError;

/// Identifies one logical call whose failures are deduplicated together.
pub type CallId = u64;

#[derive(Debug, Default)]
pub struct ExceptionHandler {
    next_call: AtomicU64,
    seen: Mutex<HashMap<CallId, HashSet<String>>>,
}

impl ExceptionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new registration scope.
    pub fn open_call(&self) -> CallId {
        let call = self.next_call.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(call, HashSet::new());
        call
    }

    /// Opens a call that is closed when the returned guard is dropped, also
    /// when the future holding it is dropped halfway.
    pub fn scope(&self) -> CallScope<'_> {
        CallScope {
            handler: self,
            call: self.open_call(),
        }
    }

    /// Number of calls opened and not yet closed.
    pub fn open_calls(&self) -> usize {
        self.lock().len()
    }

    /// Ends a registration scope and forgets what was registered in it.
    pub fn close_call(&self, call: CallId) {
        self.lock().remove(&call);
    }

    /// Logs `err` unless the same failure was already registered for `call`.
    ///
    /// Returns true when this call produced the log line.
    pub fn register(&self, call: CallId, err: &KitError) -> bool {
        let fresh = self.lock().entry(call).or_default().insert(fingerprint(err));
        if !fresh {
            return false;
        }

        if err.is_cancellation() {
            log::info!("[call {call}] {err}");
        } else {
            log::error!("[call {call}] {err}");
        }
        true
    }

    /// True when `err` has been registered for `call`.
    pub fn is_registered(&self, call: CallId, err: &KitError) -> bool {
        self.lock()
            .get(&call)
            .is_some_and(|set| set.contains(&fingerprint(err)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CallId, HashSet<String>>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard returned by [`ExceptionHandler::scope`].
#[derive(Debug)]
pub struct CallScope<'a> {
    handler: &'a ExceptionHandler,
    call: CallId,
}

impl CallScope<'_> {
    pub fn id(&self) -> CallId {
        self.call
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.handler.close_call(self.call);
    }
}

fn fingerprint(err: &KitError) -> String {
    format!("{err:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn same_failure_is_registered_once_per_call() {
        let handler = ExceptionHandler::new();
        let call = handler.open_call();
        let err = KitError::Timeout(Duration::from_secs(2));

        assert!(handler.register(call, &err));
        assert!(!handler.register(call, &err));
        assert!(handler.is_registered(call, &KitError::Timeout(Duration::from_secs(2))));
    }

    #[test]
    fn distinct_failures_are_all_registered() {
        let handler = ExceptionHandler::new();
        let call = handler.open_call();
        assert!(handler.register(call, &KitError::Timeout(Duration::from_secs(1))));
        assert!(handler.register(call, &KitError::Timeout(Duration::from_secs(2))));
        assert!(handler.register(call, &KitError::Canceled));
    }

    #[test]
    fn other_calls_report_again() {
        let handler = ExceptionHandler::new();
        let first = handler.open_call();
        let second = handler.open_call();
        assert_ne!(first, second);

        assert!(handler.register(first, &KitError::Canceled));
        assert!(handler.register(second, &KitError::Canceled));
    }

    #[test]
    fn closing_a_call_forgets_it() {
        let handler = ExceptionHandler::new();
        let call = handler.open_call();
        handler.register(call, &KitError::Canceled);
        handler.close_call(call);
        assert!(!handler.is_registered(call, &KitError::Canceled));
        assert_eq!(handler.open_calls(), 0);
    }

    #[test]
    fn dropping_a_scope_closes_its_call() {
        let handler = ExceptionHandler::new();
        let scope = handler.scope();
        let call = scope.id();
        handler.register(call, &KitError::Canceled);
        assert_eq!(handler.open_calls(), 1);

        drop(scope);
        assert_eq!(handler.open_calls(), 0);
        assert!(!handler.is_registered(call, &KitError::Canceled));
    }

    #[tokio::test]
    async fn abandoned_futures_close_their_call() {
        let handler = ExceptionHandler::new();
        let pending = async {
            let _scope = handler.scope();
            std::future::pending::<()>().await;
        };

        let out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(out.is_err());
        assert_eq!(handler.open_calls(), 0);
    }
}
