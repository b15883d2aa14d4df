//! Caller-supplied cancellation and deadlines.
//!
//! Every blocking session call takes a [`CancelToken`]. The session never
//! imposes its own timeout: a call waits until the awaited event arrives or
//! the token fires, whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a [`CancelToken`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
	/// [`CancelToken::cancel`] was called.
	Cancelled,
	/// The token's deadline passed.
	DeadlineExceeded,
}

impl std::fmt::Display for CancelCause {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CancelCause::Cancelled => f.write_str("operation cancelled"),
			CancelCause::DeadlineExceeded => f.write_str("deadline exceeded"),
		}
	}
}

struct Inner {
	state: watch::Sender<Option<CancelCause>>,
	deadline: Option<Instant>,
}

/// A cloneable cancellation signal with an optional deadline.
///
/// Clones share state: cancelling one cancels all of them.
#[derive(Clone)]
pub struct CancelToken {
	inner: Arc<Inner>,
}

impl Default for CancelToken {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for CancelToken {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CancelToken")
			.field("cause", &self.cause())
			.field("deadline", &self.inner.deadline)
			.finish()
	}
}

impl CancelToken {
	/// A token that fires only when cancelled.
	pub fn new() -> Self {
		Self::build(None)
	}

	/// A token that fires after `timeout` or when cancelled.
	pub fn with_timeout(timeout: Duration) -> Self {
		Self::build(Some(Instant::now() + timeout))
	}

	/// A token that fires at `deadline` or when cancelled.
	pub fn with_deadline(deadline: Instant) -> Self {
		Self::build(Some(deadline))
	}

	fn build(deadline: Option<Instant>) -> Self {
		let (state, _) = watch::channel(None);
		Self {
			inner: Arc::new(Inner { state, deadline }),
		}
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.inner.deadline
	}

	/// Fires the token. Has no effect if it already fired.
	pub fn cancel(&self) {
		self.inner.state.send_if_modified(|cause| {
			if cause.is_some() {
				return false;
			}
			*cause = Some(CancelCause::Cancelled);
			true
		});
	}

	/// Returns the cause if the token has fired.
	pub fn cause(&self) -> Option<CancelCause> {
		if let Some(cause) = *self.inner.state.borrow() {
			return Some(cause);
		}
		match self.inner.deadline {
			Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
			_ => None,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		self.cause().is_some()
	}

	/// Completes when the token fires.
	pub async fn cancelled(&self) -> CancelCause {
		let mut rx = self.inner.state.subscribe();
		let explicit = async move {
			loop {
				if let Some(cause) = *rx.borrow_and_update() {
					return cause;
				}
				if rx.changed().await.is_err() {
					// Sender lives in `inner`, which we hold; unreachable in practice.
					std::future::pending::<()>().await;
				}
			}
		};

		match self.inner.deadline {
			Some(deadline) => tokio::select! {
				biased;
				cause = explicit => cause,
				_ = tokio::time::sleep_until(deadline) => CancelCause::DeadlineExceeded,
			},
			None => explicit.await,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_cancel_wakes_waiter() {
		let token = CancelToken::new();
		let waiter = tokio::spawn({
			let token = token.clone();
			async move { token.cancelled().await }
		});

		tokio::task::yield_now().await;
		token.cancel();

		assert_eq!(waiter.await.unwrap(), CancelCause::Cancelled);
		assert!(token.is_cancelled());
	}

	#[tokio::test(start_paused = true)]
	async fn test_deadline_fires() {
		let token = CancelToken::with_timeout(Duration::from_secs(5));
		assert_eq!(token.cause(), None);

		assert_eq!(token.cancelled().await, CancelCause::DeadlineExceeded);
		assert_eq!(token.cause(), Some(CancelCause::DeadlineExceeded));
	}

	#[tokio::test]
	async fn test_already_cancelled_returns_immediately() {
		let token = CancelToken::with_timeout(Duration::from_secs(3600));
		token.cancel();
		token.cancel();
		assert_eq!(token.cancelled().await, CancelCause::Cancelled);
	}

	#[test]
	fn test_cause_display() {
		assert_eq!(CancelCause::Cancelled.to_string(), "operation cancelled");
		assert_eq!(
			CancelCause::DeadlineExceeded.to_string(),
			"deadline exceeded"
		);
	}
}
