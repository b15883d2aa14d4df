//! Peer device types.

use serde::{Deserialize, Serialize};

/// A remote device as seen by the connection manager.
///
/// `path` is the BlueZ object path (for example
/// `/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF`) and is the identity of the device.
/// Every other field is best-effort display metadata and may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
	pub path: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub alias: Option<String>,
	/// SDP `ServiceName` attribute, when the daemon exposes it.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub service_name: Option<String>,
}

impl Device {
	/// Builds a device from its object path alone.
	///
	/// The address is recovered from the `dev_XX_XX_XX_XX_XX_XX` path segment
	/// when present.
	pub fn from_path(path: impl Into<String>) -> Self {
		let path = path.into();
		let address = address_from_path(&path);
		Self {
			path,
			address,
			..Self::default()
		}
	}

	/// Human-friendly label: alias, then name, then address, then path.
	pub fn display_name(&self) -> &str {
		self.alias
			.as_deref()
			.or(self.name.as_deref())
			.or(self.address.as_deref())
			.unwrap_or(&self.path)
	}

	/// Fills absent fields from `props`, keeping values already present.
	pub fn merge_properties(&mut self, props: &DeviceProperties) {
		if self.address.is_none() {
			self.address = props.address.clone();
		}
		if self.name.is_none() {
			self.name = props.name.clone();
		}
		if self.alias.is_none() {
			self.alias = props.alias.clone();
		}
	}
}

/// The subset of `org.bluez.Device1` properties the manager reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
	pub address: Option<String>,
	pub name: Option<String>,
	pub alias: Option<String>,
	pub uuids: Vec<String>,
	pub paired: Option<bool>,
}

impl DeviceProperties {
	/// Returns true if the service UUID set contains `uuid` (case-insensitive).
	pub fn advertises(&self, uuid: &str) -> bool {
		self.uuids.iter().any(|u| u.eq_ignore_ascii_case(uuid))
	}

	/// Converts into a [`Device`] at `path`.
	///
	/// Empty strings are treated as absent; a missing address falls back to
	/// the one encoded in the path.
	pub fn into_device(self, path: impl Into<String>) -> Device {
		let path = path.into();
		let address = non_empty(self.address).or_else(|| address_from_path(&path));
		Device {
			path,
			address,
			name: non_empty(self.name),
			alias: non_empty(self.alias),
			service_name: None,
		}
	}
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|s| !s.is_empty())
}

/// Extracts `XX:XX:XX:XX:XX:XX` from a `.../dev_XX_XX_XX_XX_XX_XX` object path.
pub fn address_from_path(path: &str) -> Option<String> {
	let idx = path.rfind("/dev_")?;
	let tail = &path[idx + "/dev_".len()..];
	if tail.is_empty() {
		return None;
	}
	Some(tail.replace('_', ":"))
}
