//! zbus implementation of [`Daemon`] against `org.bluez` on the system bus.

mod decode;
mod interface;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use spp_protocol::bluez::{
	ADAPTER_INTERFACE, DEVICE_INTERFACE, OBJECT_MANAGER_PATH, PROFILE_MANAGER_INTERFACE,
	PROFILE_MANAGER_PATH, SERVICE,
};
use spp_protocol::{DeviceProperties, ProfileOptions};
use tracing::{debug, warn};
use zbus::Connection;
use zbus::fdo::ObjectManagerProxy;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

use crate::daemon::{BusConnector, Daemon, DaemonFuture, DaemonObject, ObjectStream};
use crate::error::{Error, Result};
use crate::profile::ProfileHandler;

use decode::{PropertyMap, decode_device, decode_object};
pub use interface::{ProfileError, ProfileInterface};

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// BlueZ reached over a zbus [`Connection`].
#[derive(Clone)]
pub struct BluezDaemon {
	conn: Connection,
}

impl BluezDaemon {
	/// Connects to the system bus.
	pub async fn system() -> Result<Self> {
		let conn = Connection::system()
			.await
			.map_err(|e| Error::ConnectionFailed(e.to_string()))?;
		debug!(unique_name = ?conn.unique_name(), "connected to system bus");
		Ok(Self { conn })
	}

	/// Calls `interface.method(body)` on a BlueZ object and returns the reply.
	async fn call<B>(
		&self,
		path: &str,
		interface: &str,
		method: &str,
		body: &B,
	) -> Result<zbus::Message>
	where
		B: serde::Serialize + zbus::zvariant::DynamicType,
	{
		debug!(path, interface, method, "calling daemon");
		let reply = self
			.conn
			.call_method(Some(SERVICE), path, Some(interface), method, body)
			.await?;
		Ok(reply)
	}

	async fn object_manager(&self) -> Result<ObjectManagerProxy<'static>> {
		Ok(ObjectManagerProxy::builder(&self.conn)
			.destination(SERVICE)?
			.path(OBJECT_MANAGER_PATH)?
			.build()
			.await?)
	}
}

fn object_path(path: &str) -> Result<ObjectPath<'_>> {
	ObjectPath::try_from(path).map_err(|_| Error::InvalidPath(path.to_string()))
}

/// Builds the `a{sv}` options dictionary for `RegisterProfile`.
fn profile_options_dict(options: &ProfileOptions) -> HashMap<&'static str, Value<'_>> {
	let mut dict = HashMap::new();
	dict.insert("Role", Value::from(options.role.as_str()));
	if let Some(channel) = options.channel {
		dict.insert("Channel", Value::from(channel));
	}
	if let Some(name) = options.name.as_deref() {
		dict.insert("Name", Value::from(name));
	}
	dict
}

impl Daemon for BluezDaemon {
	fn export_profile(&self, path: &str, handler: Arc<ProfileHandler>) -> DaemonFuture<'_, ()> {
		let path = path.to_string();
		Box::pin(async move {
			let object = object_path(&path)?;
			let added = self
				.conn
				.object_server()
				.at(object, ProfileInterface::new(handler))
				.await?;
			if !added {
				return Err(Error::AlreadyExported(path));
			}
			debug!(path = %path, "exported profile object");
			Ok(())
		})
	}

	fn unexport_profile(&self, path: &str) -> DaemonFuture<'_, ()> {
		let path = path.to_string();
		Box::pin(async move {
			let object = object_path(&path)?;
			let removed = self
				.conn
				.object_server()
				.remove::<ProfileInterface, _>(object)
				.await?;
			debug!(path = %path, removed, "unexported profile object");
			Ok(())
		})
	}

	fn register_profile(
		&self,
		path: &str,
		uuid: &str,
		options: &ProfileOptions,
	) -> DaemonFuture<'_, ()> {
		let path = path.to_string();
		let uuid = uuid.to_string();
		let options = options.clone();
		Box::pin(async move {
			let object = object_path(&path)?;
			let dict = profile_options_dict(&options);
			self.call(
				PROFILE_MANAGER_PATH,
				PROFILE_MANAGER_INTERFACE,
				"RegisterProfile",
				&(object, uuid.as_str(), dict),
			)
			.await?;
			Ok(())
		})
	}

	fn unregister_profile(&self, path: &str) -> DaemonFuture<'_, ()> {
		let path = path.to_string();
		Box::pin(async move {
			let object = object_path(&path)?;
			self.call(
				PROFILE_MANAGER_PATH,
				PROFILE_MANAGER_INTERFACE,
				"UnregisterProfile",
				&(object,),
			)
			.await?;
			Ok(())
		})
	}

	fn managed_objects(&self) -> DaemonFuture<'_, Vec<DaemonObject>> {
		Box::pin(async move {
			let objects = self.object_manager().await?.get_managed_objects().await?;
			Ok(objects
				.into_iter()
				.map(|(path, interfaces)| decode_object(path.to_string(), interfaces))
				.collect())
		})
	}

	fn objects_added(&self) -> DaemonFuture<'_, ObjectStream> {
		Box::pin(async move {
			let signals = self.object_manager().await?.receive_interfaces_added().await?;
			let objects = signals.filter_map(|signal| async move {
				let body = signal.message().body();
				match body.deserialize::<(OwnedObjectPath, HashMap<String, PropertyMap>)>() {
					Ok((path, interfaces)) => Some(decode_object(path.to_string(), interfaces)),
					Err(e) => {
						warn!("malformed InterfacesAdded signal: {}", e);
						None
					}
				}
			});
			Ok(objects.boxed())
		})
	}

	fn start_discovery(&self, adapter: &str) -> DaemonFuture<'_, ()> {
		let adapter = adapter.to_string();
		Box::pin(async move {
			self.call(&adapter, ADAPTER_INTERFACE, "StartDiscovery", &())
				.await?;
			Ok(())
		})
	}

	fn stop_discovery(&self, adapter: &str) -> DaemonFuture<'_, ()> {
		let adapter = adapter.to_string();
		Box::pin(async move {
			self.call(&adapter, ADAPTER_INTERFACE, "StopDiscovery", &())
				.await?;
			Ok(())
		})
	}

	fn device_paired(&self, device: &str) -> DaemonFuture<'_, bool> {
		let device = device.to_string();
		Box::pin(async move {
			let reply = self
				.call(
					&device,
					PROPERTIES_INTERFACE,
					"Get",
					&(DEVICE_INTERFACE, "Paired"),
				)
				.await?;
			let value: OwnedValue = reply.body().deserialize()?;
			Ok(bool::try_from(value)?)
		})
	}

	fn device_properties(&self, device: &str) -> DaemonFuture<'_, DeviceProperties> {
		let device = device.to_string();
		Box::pin(async move {
			let reply = self
				.call(&device, PROPERTIES_INTERFACE, "GetAll", &(DEVICE_INTERFACE,))
				.await?;
			let props: PropertyMap = reply.body().deserialize()?;
			Ok(decode_device(props))
		})
	}

	fn pair(&self, device: &str) -> DaemonFuture<'_, ()> {
		let device = device.to_string();
		Box::pin(async move {
			self.call(&device, DEVICE_INTERFACE, "Pair", &()).await?;
			Ok(())
		})
	}

	fn connect_profile(&self, device: &str, uuid: &str) -> DaemonFuture<'_, ()> {
		let device = device.to_string();
		let uuid = uuid.to_string();
		Box::pin(async move {
			self.call(&device, DEVICE_INTERFACE, "ConnectProfile", &(uuid.as_str(),))
				.await?;
			Ok(())
		})
	}

	fn close(&self) -> DaemonFuture<'_, ()> {
		Box::pin(async move {
			self.conn.clone().close().await?;
			debug!("system bus connection closed");
			Ok(())
		})
	}
}

/// Connects to BlueZ on the system bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBus;

impl BusConnector for SystemBus {
	fn connect(&self) -> DaemonFuture<'_, Arc<dyn Daemon>> {
		Box::pin(async move {
			let daemon = BluezDaemon::system().await?;
			Ok(Arc::new(daemon) as Arc<dyn Daemon>)
		})
	}
}
