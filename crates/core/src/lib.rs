//! SPP connection manager
//!
//! Establishes one Serial Port Profile connection over BlueZ and hands the
//! resulting RFCOMM socket to the caller.
//!
//! - **Server**: [`SessionManager::start_server`] registers a named SPP service
//!   on RFCOMM channel 22; [`SessionManager::accept`] waits for a peer.
//! - **Client**: [`SessionManager::scan_spp`] finds devices advertising SPP;
//!   [`SessionManager::connect`] pairs if needed and connects to one.
//!
//! Every blocking call takes a [`CancelToken`]. [`SessionManager::close`]
//! releases what the session registered, in reverse order, and may be called
//! from another task while a call is waiting.
//!
//! The delivered [`OwnedFd`](std::os::fd::OwnedFd) belongs to the caller;
//! the session never touches it again.

pub mod cancel;
pub mod error;
pub mod session;

pub use cancel::{CancelCause, CancelToken};
pub use error::{Error, Result};
pub use session::{Accepted, Role, SessionManager};
pub use spp_protocol::{Device, ServerOptions};
