//! The session manager: one role, one connection, ordered teardown.

mod cleanup;
mod connect;
mod discovery;

use std::future::Future;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use spp_protocol::bluez::{EXPORT_ROOT, SPP_UUID};
use spp_protocol::{Device, ProfileOptions, ProfileRole, ServerOptions};
use spp_runtime::{BusConnector, Daemon, Delivery, DeliveryReceiver, ProfileHandler, SystemBus};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

use cleanup::{CleanupStack, Teardown};

/// A connection handed over by [`SessionManager::accept`].
#[derive(Debug)]
pub struct Accepted {
	/// The RFCOMM socket. The caller owns it from here on.
	pub fd: OwnedFd,
	/// The remote device, as much as the daemon could tell us.
	pub peer: Device,
}

/// The role a session has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	None,
	Server,
	Client,
}

/// An exported and registered profile object.
struct Endpoint {
	path: String,
	/// Taken by the single wait that consumes the delivery.
	rx: Option<DeliveryReceiver>,
}

enum RoleState {
	None,
	/// Claimed while the profile RPCs are in flight.
	Registering(ProfileRole),
	Server(Endpoint),
	Client(Endpoint),
}

struct State {
	closed: bool,
	role: RoleState,
	accept_used: bool,
	connect_used: bool,
	bus: Option<Arc<dyn Daemon>>,
	cleanup: CleanupStack,
}

impl State {
	fn check_open(&self) -> Result<()> {
		if self.closed {
			return Err(Error::Closed);
		}
		Ok(())
	}
}

/// Result of the export + register sequence, before it is committed.
struct Registered {
	bus: Arc<dyn Daemon>,
	path: String,
	rx: DeliveryReceiver,
}

/// Manages one SPP session against the Bluetooth daemon.
///
/// A session is either a server ([`start_server`](Self::start_server) then
/// [`accept`](Self::accept)) or a client ([`connect`](Self::connect)), never
/// both. [`scan_spp`](Self::scan_spp) works in either role. Every resource the
/// session registers is released by [`close`](Self::close), in reverse order.
///
/// Operations other than `close` must not run concurrently on one session.
/// `close` may be called from any task, including while another call waits.
///
/// # Example
///
/// ```ignore
/// let session = Arc::new(SessionManager::system());
/// session.start_server(&ServerOptions::new("MyChatService")).await?;
///
/// let token = CancelToken::with_timeout(Duration::from_secs(30));
/// let Accepted { fd, peer } = session.accept(&token).await?;
/// println!("{} connected", peer.display_name());
///
/// session.close().await?;
/// ```
pub struct SessionManager {
	connector: Arc<dyn BusConnector>,
	state: Mutex<State>,
	next_path: AtomicU64,
	shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for SessionManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionManager")
			.field("role", &self.role())
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl SessionManager {
	/// Creates a session that opens its bus through `connector` on first use.
	pub fn new(connector: Arc<dyn BusConnector>) -> Self {
		let (shutdown, _) = watch::channel(false);
		Self {
			connector,
			state: Mutex::new(State {
				closed: false,
				role: RoleState::None,
				accept_used: false,
				connect_used: false,
				bus: None,
				cleanup: CleanupStack::default(),
			}),
			next_path: AtomicU64::new(0),
			shutdown,
		}
	}

	/// Creates a session against BlueZ on the system bus.
	pub fn system() -> Self {
		Self::new(Arc::new(SystemBus))
	}

	pub fn role(&self) -> Role {
		match &self.state.lock().role {
			RoleState::None => Role::None,
			RoleState::Registering(ProfileRole::Server) | RoleState::Server(_) => Role::Server,
			RoleState::Registering(ProfileRole::Client) | RoleState::Client(_) => Role::Client,
		}
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	/// Registers the SPP server profile on channel 22.
	///
	/// All precondition checks happen before the daemon is contacted.
	pub async fn start_server(&self, options: &ServerOptions) -> Result<()> {
		{
			let mut state = self.state.lock();
			state.check_open()?;
			match state.role {
				RoleState::None => {}
				RoleState::Registering(ProfileRole::Server) | RoleState::Server(_) => {
					return Err(Error::AlreadyStarted);
				}
				RoleState::Registering(ProfileRole::Client) | RoleState::Client(_) => {
					return Err(Error::RoleConflict(ProfileRole::Client));
				}
			}
			if state.connect_used {
				return Err(Error::RoleConflict(ProfileRole::Client));
			}
			options.validate().map_err(Error::InvalidArgument)?;
			state.role = RoleState::Registering(ProfileRole::Server);
		}

		let registered = match self
			.register(ProfileRole::Server, ProfileOptions::server(options))
			.await
		{
			Ok(registered) => registered,
			Err(e) => {
				self.release_claim(ProfileRole::Server);
				return Err(e);
			}
		};
		let path = registered.path.clone();
		self.commit(ProfileRole::Server, registered).await?;
		info!(path = %path, service = %options.service_name, "SPP server registered");
		Ok(())
	}

	/// Waits for the first incoming connection on the server profile.
	///
	/// One-shot: a second call fails without contacting the daemon, whether
	/// or not the first one succeeded.
	pub async fn accept(&self, token: &CancelToken) -> Result<Accepted> {
		let (bus, mut rx) = {
			let mut state = self.state.lock();
			state.check_open()?;
			match state.role {
				RoleState::Server(_) => {}
				RoleState::Registering(ProfileRole::Client) | RoleState::Client(_) => {
					return Err(Error::RoleConflict(ProfileRole::Client));
				}
				_ => return Err(Error::NotStarted),
			}
			if state.accept_used {
				return Err(Error::AlreadyUsed("accept"));
			}
			state.accept_used = true;
			let rx = match &mut state.role {
				RoleState::Server(endpoint) => endpoint.rx.take(),
				_ => None,
			};
			(state.bus.clone(), rx.ok_or(Error::Closed)?)
		};

		let delivery = self.wait_delivery(&mut rx, token, "accept").await;
		drop(rx);
		let Delivery { fd, mut peer } = delivery?;
		info!(peer = %peer.path, "accepted connection");

		if let Some(bus) = bus {
			let lookup = cancellable(token, "accept", bus.device_properties(&peer.path));
			tokio::select! {
				biased;
				_ = closed(self.shutdown.subscribe()) => {
					debug!(peer = %peer.path, "session closed during peer lookup");
				}
				result = lookup => match result {
					Ok(Ok(props)) => peer.merge_properties(&props),
					Ok(Err(e)) => debug!(peer = %peer.path, "peer properties unavailable: {}", e),
					Err(e) => debug!(peer = %peer.path, "skipped peer lookup: {}", e),
				},
			}
		}
		Ok(Accepted { fd, peer })
	}

	/// Closes the session, releasing everything it registered.
	///
	/// Idempotent. Pending waits return [`Error::Closed`]; a connection
	/// delivered after this point is rejected and its descriptor closed.
	pub async fn close(&self) -> Result<()> {
		let cleanup = {
			let mut state = self.state.lock();
			if state.closed {
				return Ok(());
			}
			state.closed = true;
			match &mut state.role {
				RoleState::Server(endpoint) | RoleState::Client(endpoint) => {
					if endpoint.rx.take().is_some() {
						debug!(path = %endpoint.path, "detached idle delivery queue");
					}
				}
				_ => {}
			}
			state.bus = None;
			state.cleanup.take()
		};
		self.shutdown.send_replace(true);

		info!("closing session");
		cleanup.run().await;
		Ok(())
	}

	/// Returns the session's bus, opening it on first use.
	async fn ensure_bus(&self) -> Result<Arc<dyn Daemon>> {
		{
			let state = self.state.lock();
			state.check_open()?;
			if let Some(bus) = &state.bus {
				return Ok(Arc::clone(bus));
			}
		}

		let bus = self.connector.connect().await.map_err(Error::Bus)?;
		let (result, surplus) = {
			let mut state = self.state.lock();
			if state.closed {
				(Err(Error::Closed), Some(bus))
			} else if let Some(existing) = &state.bus {
				(Ok(Arc::clone(existing)), Some(bus))
			} else {
				state.bus = Some(Arc::clone(&bus));
				state.cleanup.push(Teardown::CloseBus(Arc::clone(&bus)));
				(Ok(bus), None)
			}
		};
		if let Some(bus) = surplus {
			Teardown::CloseBus(bus).run().await;
		}
		result
	}

	/// Generates a fresh object path for a profile of `role`.
	fn next_path(&self, role: ProfileRole) -> String {
		let n = self.next_path.fetch_add(1, Ordering::Relaxed) + 1;
		format!("{}/{}/p{}", EXPORT_ROOT, role, n)
	}

	/// Exports a handler for `role` and registers it with the daemon.
	///
	/// A failed registration unexports the object again.
	async fn register(&self, role: ProfileRole, options: ProfileOptions) -> Result<Registered> {
		let bus = self.ensure_bus().await?;
		let path = self.next_path(role);
		let (handler, rx) = ProfileHandler::new(role);

		bus.export_profile(&path, handler)
			.await
			.map_err(|e| Error::rpc("export profile", e))?;

		if let Err(e) = bus.register_profile(&path, SPP_UUID, &options).await {
			if let Err(unexport) = bus.unexport_profile(&path).await {
				warn!(path = %path, "unexport after failed registration: {}", unexport);
			}
			let op = match role {
				ProfileRole::Server => "RegisterProfile(server)",
				ProfileRole::Client => "RegisterProfile(client)",
			};
			return Err(Error::rpc(op, e));
		}
		debug!(path = %path, %role, "profile registered");
		Ok(Registered { bus, path, rx })
	}

	/// Commits a registration to the session state, or rolls it back if the
	/// session was closed in the meantime.
	async fn commit(&self, role: ProfileRole, registered: Registered) -> Result<()> {
		let Registered { bus, path, rx } = registered;
		let teardown = Teardown::Profile {
			bus,
			path: path.clone(),
		};
		let rollback = {
			let mut state = self.state.lock();
			if state.closed {
				Some(teardown)
			} else {
				state.cleanup.push(teardown);
				let endpoint = Endpoint { path, rx: Some(rx) };
				state.role = match role {
					ProfileRole::Server => RoleState::Server(endpoint),
					ProfileRole::Client => RoleState::Client(endpoint),
				};
				None
			}
		};
		match rollback {
			Some(teardown) => {
				teardown.run().await;
				Err(Error::Closed)
			}
			None => Ok(()),
		}
	}

	/// Drops a `Registering` claim after a failed registration.
	fn release_claim(&self, role: ProfileRole) {
		let mut state = self.state.lock();
		if matches!(state.role, RoleState::Registering(r) if r == role) {
			state.role = RoleState::None;
		}
	}

	/// Waits for the handler to deliver a connection.
	///
	/// Cancellation wins over a delivery that arrives at the same time; the
	/// caller drops `rx` afterwards so nothing delivered later is kept.
	async fn wait_delivery(
		&self,
		rx: &mut DeliveryReceiver,
		token: &CancelToken,
		op: &'static str,
	) -> Result<Delivery> {
		let shutdown = self.shutdown.subscribe();
		tokio::select! {
			biased;
			cause = token.cancelled() => {
				debug!(op, %cause, "wait cancelled");
				Err(Error::Cancelled { op, cause })
			}
			_ = closed(shutdown) => Err(Error::Closed),
			delivery = rx.recv() => delivery.ok_or(Error::Closed),
		}
	}
}

impl Drop for SessionManager {
	fn drop(&mut self) {
		let cleanup = {
			let mut state = self.state.lock();
			if state.closed {
				return;
			}
			state.closed = true;
			state.cleanup.take()
		};
		if cleanup.is_empty() {
			return;
		}

		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			handle.spawn(async move {
				cleanup.run().await;
				debug!("SessionManager: released resources of dropped session");
			});
		} else {
			warn!("SessionManager dropped outside a runtime; daemon registrations leaked");
		}
	}
}

/// Completes once the session is closed.
async fn closed(mut shutdown: watch::Receiver<bool>) {
	let _ = shutdown.wait_for(|closed| *closed).await;
}

/// Runs `fut` unless `token` fires first.
async fn cancellable<F: Future>(token: &CancelToken, op: &'static str, fut: F) -> Result<F::Output> {
	tokio::select! {
		biased;
		cause = token.cancelled() => Err(Error::Cancelled { op, cause }),
		output = fut => Ok(output),
	}
}
