//! In-memory daemon for testing the session manager without BlueZ.
//!
//! # Example
//!
//! ```ignore
//! let (connector, controller) = FakeDaemonBuilder::new()
//!     .adapter("/org/bluez/hci0")
//!     .device("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF", props)
//!     .build();
//! let manager = SessionManager::new(connector);
//!
//! manager.start_server(&ServerOptions::new("chat")).await?;
//! controller.deliver(ProfileRole::Server, peer_path, fd)?;
//! let accepted = manager.accept(&token).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use parking_lot::Mutex;
use spp_protocol::{DeviceProperties, ProfileOptions, ProfileRole};
use tokio::sync::{Notify, mpsc};

use crate::daemon::{BusConnector, Daemon, DaemonFuture, DaemonObject, ObjectStream};
use crate::error::{Error, Result};
use crate::profile::{ProfileHandler, Rejection};

/// A call the fake daemon received, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCall {
	ExportProfile { path: String },
	UnexportProfile { path: String },
	RegisterProfile { path: String, uuid: String, options: ProfileOptions },
	UnregisterProfile { path: String },
	ManagedObjects,
	SubscribeObjectsAdded,
	StartDiscovery { adapter: String },
	StopDiscovery { adapter: String },
	DevicePaired { device: String },
	DeviceProperties { device: String },
	Pair { device: String },
	ConnectProfile { device: String, uuid: String },
	Close,
}

impl DaemonCall {
	/// Method name used as the key for failure injection.
	pub fn method(&self) -> &'static str {
		match self {
			DaemonCall::ExportProfile { .. } => "ExportProfile",
			DaemonCall::UnexportProfile { .. } => "UnexportProfile",
			DaemonCall::RegisterProfile { .. } => "RegisterProfile",
			DaemonCall::UnregisterProfile { .. } => "UnregisterProfile",
			DaemonCall::ManagedObjects => "GetManagedObjects",
			DaemonCall::SubscribeObjectsAdded => "InterfacesAdded",
			DaemonCall::StartDiscovery { .. } => "StartDiscovery",
			DaemonCall::StopDiscovery { .. } => "StopDiscovery",
			DaemonCall::DevicePaired { .. } => "GetPaired",
			DaemonCall::DeviceProperties { .. } => "GetAll",
			DaemonCall::Pair { .. } => "Pair",
			DaemonCall::ConnectProfile { .. } => "ConnectProfile",
			DaemonCall::Close => "Close",
		}
	}
}

/// A registered profile as the daemon sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredProfile {
	pub path: String,
	pub uuid: String,
	pub options: ProfileOptions,
}

#[derive(Default)]
struct State {
	calls: Vec<DaemonCall>,
	objects: Vec<DaemonObject>,
	exported: HashMap<String, Arc<ProfileHandler>>,
	registered: Vec<RegisteredProfile>,
	paired: HashMap<String, bool>,
	failures: HashMap<&'static str, (String, String)>,
	stalled: HashSet<&'static str>,
	subscribers: Vec<mpsc::UnboundedSender<DaemonObject>>,
	/// Remote ends of sockets delivered on `ConnectProfile`.
	connect_peers: Vec<UnixStream>,
	deliver_on_connect: bool,
	connect_fails: bool,
	closed: bool,
}

struct Shared {
	state: Mutex<State>,
	subscribed: Notify,
}

/// Builder for a [`FakeConnector`] and its [`FakeDaemonController`].
#[derive(Default)]
pub struct FakeDaemonBuilder {
	state: State,
}

impl FakeDaemonBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds an `org.bluez.Adapter1` object to the registry.
	pub fn adapter(mut self, path: &str) -> Self {
		self.state.objects.push(DaemonObject::adapter(path));
		self
	}

	/// Adds an `org.bluez.Device1` object to the registry.
	pub fn device(mut self, path: &str, props: DeviceProperties) -> Self {
		if let Some(paired) = props.paired {
			self.state.paired.insert(path.to_string(), paired);
		}
		self.state.objects.push(DaemonObject::device(path, props));
		self
	}

	/// Makes `ConnectProfile` hand a fresh socket to the exported client profile.
	pub fn deliver_on_connect(mut self) -> Self {
		self.state.deliver_on_connect = true;
		self
	}

	/// Makes the connector fail, as if the system bus were unreachable.
	pub fn unreachable(mut self) -> Self {
		self.state.connect_fails = true;
		self
	}

	pub fn build(self) -> (Arc<FakeConnector>, FakeDaemonController) {
		let shared = Arc::new(Shared {
			state: Mutex::new(self.state),
			subscribed: Notify::new(),
		});
		let daemon = Arc::new(FakeDaemon {
			shared: Arc::clone(&shared),
		});
		let connector = Arc::new(FakeConnector {
			daemon,
			connects: Mutex::new(0),
		});
		let controller = FakeDaemonController { shared };
		(connector, controller)
	}
}

/// [`BusConnector`] handing out one shared [`FakeDaemon`].
pub struct FakeConnector {
	daemon: Arc<FakeDaemon>,
	connects: Mutex<usize>,
}

impl FakeConnector {
	/// Number of times a bus connection was opened.
	pub fn connects(&self) -> usize {
		*self.connects.lock()
	}
}

impl BusConnector for FakeConnector {
	fn connect(&self) -> DaemonFuture<'_, Arc<dyn Daemon>> {
		Box::pin(async move {
			if self.daemon.shared.state.lock().connect_fails {
				return Err(Error::ConnectionFailed(
					"org.freedesktop.DBus.Error.FileNotFound: no system bus".into(),
				));
			}
			*self.connects.lock() += 1;
			Ok(Arc::clone(&self.daemon) as Arc<dyn Daemon>)
		})
	}
}

/// Controller for injecting registry changes, deliveries, and failures, and
/// for inspecting the calls the daemon received.
#[derive(Clone)]
pub struct FakeDaemonController {
	shared: Arc<Shared>,
}

impl FakeDaemonController {
	/// Makes the next call to `method` (see [`DaemonCall::method`]) fail with
	/// a remote error.
	pub fn fail_next(&self, method: &'static str, name: &str, message: &str) {
		self.shared
			.state
			.lock()
			.failures
			.insert(method, (name.to_string(), message.to_string()));
	}

	/// Makes every later call to `method` hang without answering.
	///
	/// Honoured by `GetAll`.
	pub fn stall(&self, method: &'static str) {
		self.shared.state.lock().stalled.insert(method);
	}

	/// Announces an object to every live `InterfacesAdded` subscriber.
	pub fn inject_object_added(&self, object: DaemonObject) {
		let mut state = self.shared.state.lock();
		state.subscribers.retain(|tx| tx.send(object.clone()).is_ok());
	}

	/// Waits until at least one `InterfacesAdded` subscription is live.
	pub async fn wait_for_subscriber(&self) {
		loop {
			let notified = self.shared.subscribed.notified();
			if self.subscriber_count() > 0 {
				return;
			}
			notified.await;
		}
	}

	/// Number of live `InterfacesAdded` subscriptions.
	pub fn subscriber_count(&self) -> usize {
		let mut state = self.shared.state.lock();
		state.subscribers.retain(|tx| !tx.is_closed());
		state.subscribers.len()
	}

	/// Simulates BlueZ calling `NewConnection` on the exported profile of `role`.
	pub fn deliver(
		&self,
		role: ProfileRole,
		device_path: &str,
		fd: OwnedFd,
	) -> std::result::Result<(), Rejection> {
		let handler = self.handler(role).ok_or(Rejection::NoReceiver)?;
		handler.new_connection(device_path, fd)
	}

	/// Returns the exported handler serving `role`, if any.
	pub fn handler(&self, role: ProfileRole) -> Option<Arc<ProfileHandler>> {
		self.shared
			.state
			.lock()
			.exported
			.values()
			.find(|h| h.role() == role)
			.cloned()
	}

	/// Sets the value returned for `Device1.Paired`.
	pub fn set_paired(&self, device_path: &str, paired: bool) {
		self.shared
			.state
			.lock()
			.paired
			.insert(device_path.to_string(), paired);
	}

	pub fn calls(&self) -> Vec<DaemonCall> {
		self.shared.state.lock().calls.clone()
	}

	/// Takes all recorded calls, clearing the buffer.
	pub fn take_calls(&self) -> Vec<DaemonCall> {
		std::mem::take(&mut self.shared.state.lock().calls)
	}

	/// Number of recorded calls to `method`.
	pub fn count(&self, method: &str) -> usize {
		self.shared
			.state
			.lock()
			.calls
			.iter()
			.filter(|c| c.method() == method)
			.count()
	}

	pub fn registered_profiles(&self) -> Vec<RegisteredProfile> {
		self.shared.state.lock().registered.clone()
	}

	pub fn exported_paths(&self) -> Vec<String> {
		let mut paths: Vec<_> = self.shared.state.lock().exported.keys().cloned().collect();
		paths.sort();
		paths
	}

	/// Takes the remote ends of sockets delivered on `ConnectProfile`.
	pub fn take_connect_peers(&self) -> Vec<UnixStream> {
		std::mem::take(&mut self.shared.state.lock().connect_peers)
	}

	pub fn is_closed(&self) -> bool {
		self.shared.state.lock().closed
	}
}

/// The in-memory [`Daemon`].
pub struct FakeDaemon {
	shared: Arc<Shared>,
}

impl FakeDaemon {
	/// Records `call` and returns the injected failure for it, if any.
	fn record(&self, call: DaemonCall) -> Result<()> {
		let mut state = self.shared.state.lock();
		let method = call.method();
		state.calls.push(call);
		if state.closed {
			return Err(Error::TransportError("connection closed".into()));
		}
		match state.failures.remove(method) {
			Some((name, message)) => Err(Error::remote(name, message)),
			None => Ok(()),
		}
	}

	/// Never resolves while `method` is stalled.
	async fn stall_point(&self, method: &'static str) {
		let stalled = self.shared.state.lock().stalled.contains(method);
		if stalled {
			std::future::pending::<()>().await;
		}
	}
}

impl Daemon for FakeDaemon {
	fn export_profile(&self, path: &str, handler: Arc<ProfileHandler>) -> DaemonFuture<'_, ()> {
		let path = path.to_string();
		Box::pin(async move {
			self.record(DaemonCall::ExportProfile { path: path.clone() })?;
			let mut state = self.shared.state.lock();
			if state.exported.contains_key(&path) {
				return Err(Error::AlreadyExported(path));
			}
			state.exported.insert(path, handler);
			Ok(())
		})
	}

	fn unexport_profile(&self, path: &str) -> DaemonFuture<'_, ()> {
		let path = path.to_string();
		Box::pin(async move {
			self.record(DaemonCall::UnexportProfile { path: path.clone() })?;
			self.shared.state.lock().exported.remove(&path);
			Ok(())
		})
	}

	fn register_profile(
		&self,
		path: &str,
		uuid: &str,
		options: &ProfileOptions,
	) -> DaemonFuture<'_, ()> {
		let profile = RegisteredProfile {
			path: path.to_string(),
			uuid: uuid.to_string(),
			options: options.clone(),
		};
		Box::pin(async move {
			self.record(DaemonCall::RegisterProfile {
				path: profile.path.clone(),
				uuid: profile.uuid.clone(),
				options: profile.options.clone(),
			})?;
			let mut state = self.shared.state.lock();
			let channel_taken = profile.options.channel.is_some()
				&& state
					.registered
					.iter()
					.any(|p| p.options.channel == profile.options.channel);
			if channel_taken {
				return Err(Error::remote(
					"org.bluez.Error.NotPermitted",
					"RFCOMM channel already in use",
				));
			}
			state.registered.push(profile);
			Ok(())
		})
	}

	fn unregister_profile(&self, path: &str) -> DaemonFuture<'_, ()> {
		let path = path.to_string();
		Box::pin(async move {
			self.record(DaemonCall::UnregisterProfile { path: path.clone() })?;
			let mut state = self.shared.state.lock();
			let before = state.registered.len();
			state.registered.retain(|p| p.path != path);
			if state.registered.len() == before {
				return Err(Error::remote(
					"org.bluez.Error.DoesNotExist",
					"Profile not registered",
				));
			}
			Ok(())
		})
	}

	fn managed_objects(&self) -> DaemonFuture<'_, Vec<DaemonObject>> {
		Box::pin(async move {
			self.record(DaemonCall::ManagedObjects)?;
			Ok(self.shared.state.lock().objects.clone())
		})
	}

	fn objects_added(&self) -> DaemonFuture<'_, ObjectStream> {
		Box::pin(async move {
			self.record(DaemonCall::SubscribeObjectsAdded)?;
			let (tx, rx) = mpsc::unbounded_channel();
			self.shared.state.lock().subscribers.push(tx);
			self.shared.subscribed.notify_waiters();
			let stream = futures_util::stream::unfold(rx, |mut rx| async move {
				rx.recv().await.map(|object| (object, rx))
			});
			Ok(Box::pin(stream) as ObjectStream)
		})
	}

	fn start_discovery(&self, adapter: &str) -> DaemonFuture<'_, ()> {
		let adapter = adapter.to_string();
		Box::pin(async move { self.record(DaemonCall::StartDiscovery { adapter }) })
	}

	fn stop_discovery(&self, adapter: &str) -> DaemonFuture<'_, ()> {
		let adapter = adapter.to_string();
		Box::pin(async move { self.record(DaemonCall::StopDiscovery { adapter }) })
	}

	fn device_paired(&self, device: &str) -> DaemonFuture<'_, bool> {
		let device = device.to_string();
		Box::pin(async move {
			self.record(DaemonCall::DevicePaired {
				device: device.clone(),
			})?;
			self.shared
				.state
				.lock()
				.paired
				.get(&device)
				.copied()
				.ok_or_else(|| Error::remote("org.freedesktop.DBus.Error.UnknownObject", device))
		})
	}

	fn device_properties(&self, device: &str) -> DaemonFuture<'_, DeviceProperties> {
		let device = device.to_string();
		Box::pin(async move {
			self.record(DaemonCall::DeviceProperties {
				device: device.clone(),
			})?;
			self.stall_point("GetAll").await;
			self.shared
				.state
				.lock()
				.objects
				.iter()
				.find(|o| o.path == device)
				.and_then(|o| o.device_properties().cloned())
				.ok_or_else(|| Error::remote("org.freedesktop.DBus.Error.UnknownObject", device))
		})
	}

	fn pair(&self, device: &str) -> DaemonFuture<'_, ()> {
		let device = device.to_string();
		Box::pin(async move {
			self.record(DaemonCall::Pair {
				device: device.clone(),
			})?;
			self.shared.state.lock().paired.insert(device, true);
			Ok(())
		})
	}

	fn connect_profile(&self, device: &str, uuid: &str) -> DaemonFuture<'_, ()> {
		let device = device.to_string();
		let uuid = uuid.to_string();
		Box::pin(async move {
			self.record(DaemonCall::ConnectProfile {
				device: device.clone(),
				uuid,
			})?;
			let mut state = self.shared.state.lock();
			if !state.deliver_on_connect {
				return Ok(());
			}
			let handler = state
				.exported
				.values()
				.find(|h| h.role() == ProfileRole::Client)
				.cloned();
			if let Some(handler) = handler {
				let (ours, theirs) = UnixStream::pair()?;
				if handler.new_connection(&device, OwnedFd::from(ours)).is_ok() {
					state.connect_peers.push(theirs);
				}
			}
			Ok(())
		})
	}

	fn close(&self) -> DaemonFuture<'_, ()> {
		Box::pin(async move {
			self.record(DaemonCall::Close)?;
			let mut state = self.shared.state.lock();
			state.closed = true;
			state.subscribers.clear();
			state.exported.clear();
			Ok(())
		})
	}
}
