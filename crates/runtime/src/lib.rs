//! SPP Runtime - the boundary between the connection manager and BlueZ
//!
//! This crate owns everything that touches the system bus:
//!
//! - **Daemon**: object-safe view of the BlueZ calls the manager needs
//! - **Profile handler**: the `org.bluez.Profile1` object BlueZ calls back
//!   with connected RFCOMM sockets, enforcing at-most-once delivery
//! - **BlueZ backend**: the zbus implementation of [`Daemon`]
//! - **Fake daemon** (`testing` feature): an in-memory [`Daemon`] with a
//!   controller for injecting objects, deliveries, and failures
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ spp-connmgr │  Session state machine
//! └──────┬──────┘
//!        │ Arc<dyn Daemon>
//! ┌──────▼──────┐
//! │ spp-runtime │  This crate
//! │  ┌────────┐ │
//! │  │ Bluez  │ │  zbus method calls + signal streams
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │Profile │ │  NewConnection → capacity-1 queue
//! │  └────────┘ │
//! └─────────────┘
//! ```

pub mod bluez;
pub mod daemon;
pub mod error;
pub mod profile;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types at crate root
pub use bluez::{BluezDaemon, SystemBus};
pub use daemon::{BusConnector, Daemon, DaemonFuture, DaemonObject, ObjectKind, ObjectStream};
pub use error::{Error, Result};
pub use profile::{Delivery, DeliveryReceiver, ProfileHandler, Rejection};
