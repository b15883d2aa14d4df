//! Conversion of BlueZ property dictionaries into protocol types.

use std::collections::HashMap;

use spp_protocol::DeviceProperties;
use spp_protocol::bluez::{ADAPTER_INTERFACE, DEVICE_INTERFACE};
use zbus::zvariant::OwnedValue;

use crate::daemon::{DaemonObject, ObjectKind};

/// `a{sv}` property dictionary of one interface.
pub(crate) type PropertyMap = HashMap<String, OwnedValue>;

/// Classifies an object by the interfaces it implements.
///
/// `Device1` wins over `Adapter1`; BlueZ never puts both on one object.
pub(crate) fn decode_object<K: ToString>(
	path: String,
	interfaces: HashMap<K, PropertyMap>,
) -> DaemonObject {
	let mut device = None;
	let mut adapter = false;

	for (name, props) in interfaces {
		match name.to_string().as_str() {
			DEVICE_INTERFACE => device = Some(decode_device(props)),
			ADAPTER_INTERFACE => adapter = true,
			_ => {}
		}
	}

	let kind = match (device, adapter) {
		(Some(props), _) => ObjectKind::Device(props),
		(None, true) => ObjectKind::Adapter,
		(None, false) => ObjectKind::Other,
	};

	DaemonObject { path, kind }
}

/// Reads the `Device1` properties the manager uses; missing or mistyped
/// entries become `None`.
pub(crate) fn decode_device(mut props: PropertyMap) -> DeviceProperties {
	DeviceProperties {
		address: take(&mut props, "Address"),
		name: take(&mut props, "Name"),
		alias: take(&mut props, "Alias"),
		uuids: take(&mut props, "UUIDs").unwrap_or_default(),
		paired: take(&mut props, "Paired"),
	}
}

fn take<T>(props: &mut PropertyMap, key: &str) -> Option<T>
where
	T: TryFrom<OwnedValue>,
{
	props.remove(key).and_then(|value| T::try_from(value).ok())
}

#[cfg(test)]
mod tests {
	use super::*;
	use spp_protocol::SPP_UUID;
	use zbus::zvariant::Value;

	fn owned(value: Value<'_>) -> OwnedValue {
		value.try_to_owned().unwrap()
	}

	fn device_props() -> PropertyMap {
		let mut props = PropertyMap::new();
		props.insert("Address".into(), owned(Value::from("AA:BB:CC:DD:EE:FF")));
		props.insert("Name".into(), owned(Value::from("Headset")));
		props.insert("Paired".into(), owned(Value::from(true)));
		props.insert("UUIDs".into(), owned(Value::from(vec![SPP_UUID.to_string()])));
		props.insert("RSSI".into(), owned(Value::from(-60i16)));
		props
	}

	#[test]
	fn test_decode_device_properties() {
		let props = decode_device(device_props());
		assert_eq!(props.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
		assert_eq!(props.name.as_deref(), Some("Headset"));
		assert_eq!(props.alias, None);
		assert_eq!(props.paired, Some(true));
		assert!(props.advertises(SPP_UUID));
	}

	#[test]
	fn test_mistyped_property_is_ignored() {
		let mut raw = PropertyMap::new();
		raw.insert("Name".into(), owned(Value::from(7u32)));
		assert_eq!(decode_device(raw).name, None);
	}

	#[test]
	fn test_decode_object_classifies_interfaces() {
		let mut interfaces = HashMap::new();
		interfaces.insert(DEVICE_INTERFACE.to_string(), device_props());
		interfaces.insert("org.freedesktop.DBus.Properties".to_string(), PropertyMap::new());
		let obj = decode_object("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF".into(), interfaces);
		assert!(obj.device_properties().is_some());

		let mut interfaces = HashMap::new();
		interfaces.insert(ADAPTER_INTERFACE.to_string(), PropertyMap::new());
		assert!(decode_object("/org/bluez/hci0".into(), interfaces).is_adapter());

		let obj = decode_object::<String>("/org/bluez".into(), HashMap::new());
		assert_eq!(obj.kind, ObjectKind::Other);
	}
}
