//! Profile handler - the object BlueZ calls back with connected sockets.
//!
//! BlueZ invokes `NewConnection` on whatever thread the bus dispatcher runs,
//! while the caller waits in `accept`/`connect`. The two sides meet on a
//! capacity-1 queue guarded by a "delivered" flag:
//!
//! 1. The first delivery claims the flag and is enqueued without blocking
//! 2. Any later delivery, or one that finds the queue full or the receiver
//!    gone, has its descriptor closed and is answered with
//!    `org.bluez.Error.Rejected`
//!
//! Descriptors are carried as [`OwnedFd`], so a rejected delivery is closed
//! by dropping it before the rejection is returned to the daemon.

use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use spp_protocol::{Device, ProfileRole};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// A connected RFCOMM socket and the peer it belongs to.
#[derive(Debug)]
pub struct Delivery {
	pub fd: OwnedFd,
	pub peer: Device,
}

/// Receiving half of a handler's delivery queue.
pub type DeliveryReceiver = mpsc::Receiver<Delivery>;

/// Why a `NewConnection` call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
	/// A connection was already handed off by this handler.
	#[error("already accepted")]
	AlreadyDelivered,
	/// Nobody can take the connection (queue full or receiver dropped).
	#[error("no receiver")]
	NoReceiver,
}

/// `org.bluez.Profile1` behaviour for one role.
pub struct ProfileHandler {
	role: ProfileRole,
	tx: mpsc::Sender<Delivery>,
	delivered: AtomicBool,
}

impl ProfileHandler {
	/// Creates a handler and the receiving half of its capacity-1 queue.
	pub fn new(role: ProfileRole) -> (Arc<Self>, DeliveryReceiver) {
		let (tx, rx) = mpsc::channel(1);
		let handler = Arc::new(Self {
			role,
			tx,
			delivered: AtomicBool::new(false),
		});
		(handler, rx)
	}

	pub fn role(&self) -> ProfileRole {
		self.role
	}

	/// Returns true once a connection has been handed off.
	pub fn has_delivered(&self) -> bool {
		self.delivered.load(Ordering::Acquire)
	}

	/// Handles `NewConnection(device, fd, properties)`.
	///
	/// Never blocks. On rejection `fd` has already been closed when this
	/// returns.
	pub fn new_connection(&self, device_path: &str, fd: OwnedFd) -> Result<(), Rejection> {
		debug!(role = %self.role, device = device_path, "NewConnection");

		if self
			.delivered
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			drop(fd);
			warn!(role = %self.role, device = device_path, "rejecting connection: already accepted");
			return Err(Rejection::AlreadyDelivered);
		}

		let delivery = Delivery {
			fd,
			peer: Device::from_path(device_path),
		};

		match self.tx.try_send(delivery) {
			Ok(()) => Ok(()),
			Err(TrySendError::Full(rejected) | TrySendError::Closed(rejected)) => {
				self.delivered.store(false, Ordering::Release);
				drop(rejected);
				warn!(role = %self.role, device = device_path, "rejecting connection: no receiver");
				Err(Rejection::NoReceiver)
			}
		}
	}

	/// Handles `Release()`.
	pub fn release(&self) {
		debug!(role = %self.role, "Release");
	}

	/// Handles `Cancel()`.
	pub fn cancel(&self) {
		debug!(role = %self.role, "Cancel");
	}

	/// Handles `RequestDisconnection(device)`. Disconnect orchestration is not supported.
	pub fn request_disconnection(&self, device_path: &str) {
		debug!(role = %self.role, device = device_path, "RequestDisconnection ignored");
	}
}
