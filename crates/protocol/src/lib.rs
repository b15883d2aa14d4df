//! Wire-level vocabulary for Serial Port Profile connections brokered by BlueZ.
//!
//! This crate has no I/O. It names the D-Bus objects and interfaces the
//! connection manager talks to and defines the value types that cross the
//! daemon boundary.
//!
//! # Main Types
//!
//! - [`Device`] - A discovered or connected peer, keyed by its object path
//! - [`DeviceProperties`] - The `org.bluez.Device1` properties the manager reads
//! - [`ServerOptions`] - Server-side profile registration input
//! - [`ProfileOptions`] - Options map passed to `RegisterProfile`

pub mod bluez;
pub mod device;
pub mod profile;

pub use bluez::{DEFAULT_RFCOMM_CHANNEL, SPP_UUID};
pub use device::{Device, DeviceProperties, address_from_path};
pub use profile::{ProfileOptions, ProfileRole, ServerOptions};
