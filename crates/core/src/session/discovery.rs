//! SPP device discovery: registry snapshot merged with live announcements.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use spp_protocol::Device;
use spp_protocol::bluez::SPP_UUID;
use spp_runtime::{Daemon, DaemonObject};
use tracing::{debug, info};

use super::{SessionManager, closed};
use crate::cancel::{CancelCause, CancelToken};
use crate::error::{Error, Result};

/// Adapters with discovery running. Stops them on drop if
/// [`stop`](Self::stop) was never reached.
struct DiscoveryGuard {
	bus: Arc<dyn Daemon>,
	adapters: Vec<String>,
}

impl DiscoveryGuard {
	fn new(bus: Arc<dyn Daemon>) -> Self {
		Self {
			bus,
			adapters: Vec::new(),
		}
	}

	/// Best-effort: a refusing adapter is skipped.
	async fn start(&mut self, adapter: &str) {
		match self.bus.start_discovery(adapter).await {
			Ok(()) => self.adapters.push(adapter.to_string()),
			Err(e) => debug!(adapter, "StartDiscovery failed: {}", e),
		}
	}

	async fn stop(mut self) {
		for adapter in std::mem::take(&mut self.adapters) {
			if let Err(e) = self.bus.stop_discovery(&adapter).await {
				debug!(adapter = %adapter, "StopDiscovery failed: {}", e);
			}
		}
	}
}

impl Drop for DiscoveryGuard {
	fn drop(&mut self) {
		if self.adapters.is_empty() {
			return;
		}

		let bus = Arc::clone(&self.bus);
		let adapters = std::mem::take(&mut self.adapters);
		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			handle.spawn(async move {
				for adapter in adapters {
					let _ = bus.stop_discovery(&adapter).await;
				}
				debug!("DiscoveryGuard: stopped orphaned discovery");
			});
		}
	}
}

/// Records `object` if it is a device advertising SPP. A later entry for the
/// same path replaces the earlier one.
fn merge(found: &mut HashMap<String, Device>, object: DaemonObject) {
	let Some(props) = object.device_properties() else {
		return;
	};
	if !props.advertises(SPP_UUID) {
		return;
	}
	let device = props.clone().into_device(object.path.clone());
	debug!(path = %device.path, name = device.display_name(), "found SPP device");
	found.insert(object.path, device);
}

impl SessionManager {
	/// Collects devices offering SPP until `token` fires.
	///
	/// Starts discovery on every known adapter, seeds the result from the
	/// daemon's registry, then adds devices as the daemon announces them.
	/// Reaching the token's deadline is the normal end of a scan and returns
	/// the devices found; an explicit [`CancelToken::cancel`] returns
	/// [`Error::Cancelled`].
	pub async fn scan_spp(&self, token: &CancelToken) -> Result<Vec<Device>> {
		let bus = self.ensure_bus().await?;

		// Subscribe before the snapshot so nothing announced in between is lost.
		let mut announced = bus
			.objects_added()
			.await
			.map_err(|e| Error::rpc("InterfacesAdded subscription", e))?;
		let snapshot = bus
			.managed_objects()
			.await
			.map_err(|e| Error::rpc("GetManagedObjects", e))?;

		let mut discovery = DiscoveryGuard::new(Arc::clone(&bus));
		for adapter in snapshot.iter().filter(|o| o.is_adapter()) {
			discovery.start(&adapter.path).await;
		}

		let mut found = HashMap::new();
		for object in snapshot {
			merge(&mut found, object);
		}

		let shutdown = closed(self.shutdown.subscribe());
		tokio::pin!(shutdown);
		let mut live = true;
		let outcome = loop {
			tokio::select! {
				biased;
				cause = token.cancelled() => {
					debug!(%cause, "scan window ended");
					break match cause {
						CancelCause::DeadlineExceeded => Ok(()),
						CancelCause::Cancelled => Err(Error::Cancelled { op: "scan", cause }),
					};
				}
				_ = &mut shutdown => break Err(Error::Closed),
				next = announced.next(), if live => match next {
					Some(object) => merge(&mut found, object),
					None => {
						debug!("InterfacesAdded stream ended");
						live = false;
					}
				},
			}
		};

		drop(announced);
		discovery.stop().await;
		outcome?;

		info!(count = found.len(), "SPP scan finished");
		Ok(found.into_values().collect())
	}
}
