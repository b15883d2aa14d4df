//! Ordered teardown of everything a session registered.

use std::sync::Arc;

use spp_runtime::Daemon;
use tracing::{debug, warn};

/// One resource to release on close.
pub(crate) enum Teardown {
	/// Close the bus connection. Pushed first, so it runs last.
	CloseBus(Arc<dyn Daemon>),
	/// Unregister the profile at `path`, then unexport its object.
	Profile { bus: Arc<dyn Daemon>, path: String },
}

impl std::fmt::Debug for Teardown {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Teardown::CloseBus(_) => f.write_str("CloseBus"),
			Teardown::Profile { path, .. } => f.debug_struct("Profile").field("path", path).finish(),
		}
	}
}

impl Teardown {
	/// Releases the resource. Failures are logged and swallowed.
	pub(crate) async fn run(self) {
		match self {
			Teardown::CloseBus(bus) => {
				if let Err(e) = bus.close().await {
					warn!("closing bus failed: {}", e);
				}
			}
			Teardown::Profile { bus, path } => {
				if let Err(e) = bus.unregister_profile(&path).await {
					warn!(path = %path, "UnregisterProfile failed: {}", e);
				}
				if let Err(e) = bus.unexport_profile(&path).await {
					warn!(path = %path, "unexport failed: {}", e);
				}
			}
		}
	}
}

/// Teardown actions in registration order.
#[derive(Debug, Default)]
pub(crate) struct CleanupStack {
	actions: Vec<Teardown>,
}

impl CleanupStack {
	pub(crate) fn push(&mut self, action: Teardown) {
		debug!(?action, "registered teardown");
		self.actions.push(action);
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.actions.is_empty()
	}

	/// Detaches every action, leaving the stack empty.
	pub(crate) fn take(&mut self) -> CleanupStack {
		std::mem::take(self)
	}

	/// Runs every action in reverse registration order.
	pub(crate) async fn run(self) {
		for action in self.actions.into_iter().rev() {
			action.run().await;
		}
	}
}
