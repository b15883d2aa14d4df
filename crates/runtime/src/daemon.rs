//! Object-safe view of the Bluetooth daemon.
//!
//! The session manager never names zbus types. It talks to an
//! `Arc<dyn Daemon>` obtained lazily from a [`BusConnector`], which keeps the
//! state machine testable against [`FakeDaemon`](crate::testing::FakeDaemon).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use spp_protocol::{DeviceProperties, ProfileOptions};

use crate::error::Result;
use crate::profile::ProfileHandler;

/// Boxed future returned by every [`Daemon`] call.
pub type DaemonFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Stream of objects announced by the daemon after subscription.
///
/// Dropping the stream unsubscribes.
pub type ObjectStream = BoxStream<'static, DaemonObject>;

/// One entry of the daemon's object registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonObject {
	pub path: String,
	pub kind: ObjectKind,
}

/// What an object in the registry represents, as far as the manager cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
	/// Implements `org.bluez.Adapter1`.
	Adapter,
	/// Implements `org.bluez.Device1`.
	Device(DeviceProperties),
	/// Anything else (GATT services, media endpoints, ...).
	Other,
}

impl DaemonObject {
	pub fn adapter(path: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			kind: ObjectKind::Adapter,
		}
	}

	pub fn device(path: impl Into<String>, props: DeviceProperties) -> Self {
		Self {
			path: path.into(),
			kind: ObjectKind::Device(props),
		}
	}

	pub fn is_adapter(&self) -> bool {
		matches!(self.kind, ObjectKind::Adapter)
	}

	/// Returns the device properties if this object is a device.
	pub fn device_properties(&self) -> Option<&DeviceProperties> {
		match &self.kind {
			ObjectKind::Device(props) => Some(props),
			_ => None,
		}
	}
}

/// The daemon calls the connection manager issues.
///
/// Each method maps to a single BlueZ D-Bus call (see [`BluezDaemon`](crate::BluezDaemon)).
pub trait Daemon: Send + Sync {
	/// Exports `handler` as an `org.bluez.Profile1` object at `path`.
	fn export_profile(&self, path: &str, handler: Arc<ProfileHandler>) -> DaemonFuture<'_, ()>;

	/// Removes the profile object at `path` from the bus.
	fn unexport_profile(&self, path: &str) -> DaemonFuture<'_, ()>;

	/// `ProfileManager1.RegisterProfile(path, uuid, options)`.
	fn register_profile(
		&self,
		path: &str,
		uuid: &str,
		options: &ProfileOptions,
	) -> DaemonFuture<'_, ()>;

	/// `ProfileManager1.UnregisterProfile(path)`.
	fn unregister_profile(&self, path: &str) -> DaemonFuture<'_, ()>;

	/// Snapshot of `ObjectManager.GetManagedObjects` on the root object.
	fn managed_objects(&self) -> DaemonFuture<'_, Vec<DaemonObject>>;

	/// Subscribes to `ObjectManager.InterfacesAdded`.
	fn objects_added(&self) -> DaemonFuture<'_, ObjectStream>;

	/// `Adapter1.StartDiscovery`.
	fn start_discovery(&self, adapter: &str) -> DaemonFuture<'_, ()>;

	/// `Adapter1.StopDiscovery`.
	fn stop_discovery(&self, adapter: &str) -> DaemonFuture<'_, ()>;

	/// Reads `Device1.Paired`.
	fn device_paired(&self, device: &str) -> DaemonFuture<'_, bool>;

	/// Reads every `Device1` property of `device`.
	fn device_properties(&self, device: &str) -> DaemonFuture<'_, DeviceProperties>;

	/// `Device1.Pair`. Consent is handled by an externally registered agent.
	fn pair(&self, device: &str) -> DaemonFuture<'_, ()>;

	/// `Device1.ConnectProfile(uuid)`.
	fn connect_profile(&self, device: &str, uuid: &str) -> DaemonFuture<'_, ()>;

	/// Closes the bus connection. Later calls fail.
	fn close(&self) -> DaemonFuture<'_, ()>;
}

/// Opens a bus connection on demand.
pub trait BusConnector: Send + Sync {
	fn connect(&self) -> DaemonFuture<'_, Arc<dyn Daemon>>;
}
