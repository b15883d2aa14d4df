//! BlueZ service, object, and interface names.

/// Serial Port Profile UUID used for RFCOMM connections.
pub const SPP_UUID: &str = "00001101-0000-1000-8000-00805f9b34fb";

/// Fixed RFCOMM channel for the server-side profile.
///
/// BlueZ reads `Channel` as a `u16`.
pub const DEFAULT_RFCOMM_CHANNEL: u16 = 22;

/// Well-known bus name of the Bluetooth daemon.
pub const SERVICE: &str = "org.bluez";

/// Object implementing `org.bluez.ProfileManager1`.
pub const PROFILE_MANAGER_PATH: &str = "/org/bluez";

/// Root object implementing `org.freedesktop.DBus.ObjectManager`.
pub const OBJECT_MANAGER_PATH: &str = "/";

pub const PROFILE_MANAGER_INTERFACE: &str = "org.bluez.ProfileManager1";
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";

/// Prefix for object paths exported by this process.
pub const EXPORT_ROOT: &str = "/org/bluez_spp/connmgr";
