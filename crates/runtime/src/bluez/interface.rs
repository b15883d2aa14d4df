//! `org.bluez.Profile1` object served on the bus.

use std::collections::HashMap;
use std::sync::Arc;

use zbus::interface;
use zbus::zvariant::{OwnedFd, OwnedObjectPath, OwnedValue};

use crate::profile::{ProfileHandler, Rejection};

/// D-Bus errors returned to BlueZ from profile callbacks.
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.bluez.Error")]
pub enum ProfileError {
	#[zbus(error)]
	ZBus(zbus::Error),
	/// Serialized as `org.bluez.Error.Rejected`.
	Rejected(String),
}

impl From<Rejection> for ProfileError {
	fn from(rejection: Rejection) -> Self {
		ProfileError::Rejected(rejection.to_string())
	}
}

/// Bus-facing wrapper around a [`ProfileHandler`].
pub struct ProfileInterface {
	handler: Arc<ProfileHandler>,
}

impl ProfileInterface {
	pub fn new(handler: Arc<ProfileHandler>) -> Self {
		Self { handler }
	}
}

#[interface(name = "org.bluez.Profile1")]
impl ProfileInterface {
	async fn release(&self) {
		self.handler.release();
	}

	async fn cancel(&self) {
		self.handler.cancel();
	}

	async fn request_disconnection(&self, device: OwnedObjectPath) {
		self.handler.request_disconnection(device.as_str());
	}

	async fn new_connection(
		&self,
		device: OwnedObjectPath,
		fd: OwnedFd,
		properties: HashMap<String, OwnedValue>,
	) -> Result<(), ProfileError> {
		tracing::trace!(
			device = device.as_str(),
			properties = ?properties.keys().collect::<Vec<_>>(),
			"fd properties"
		);
		self.handler
			.new_connection(device.as_str(), fd.into())
			.map_err(ProfileError::from)
	}
}
