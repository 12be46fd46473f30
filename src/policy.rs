//! Failure policies wrapped around network actions.
//!
//! - [`retry`]: repeat a failing action a bounded number of times, pausing in
//!   between, and stop at once on cancellation.
//! - [`timeout`]: race an action against a timer on a linked cancellation scope,
//!   telling "timed out" apart from "caller canceled".
//!
//! Both layers observe a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! that the caller threads through explicitly.

pub mod retry;
pub mod timeout;

pub use retry::{repeat, RetryPolicy};
pub use timeout::with_timeout;
