//! Error types for the session manager.

use spp_protocol::ProfileRole;
use thiserror::Error;

use crate::cancel::CancelCause;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`SessionManager`](crate::SessionManager).
///
/// Three families:
///
/// - usage errors, detected locally before any daemon call
///   ([`is_usage`](Self::is_usage))
/// - daemon errors, returned unmodified inside [`Error::Bus`],
///   [`Error::Rpc`], or [`Error::Pairing`] ([`is_rpc`](Self::is_rpc))
/// - cancellation, when the caller's token fired first
///   ([`is_cancelled`](Self::is_cancelled))
#[derive(Debug, Error)]
pub enum Error {
	/// The session was closed.
	#[error("Session closed")]
	Closed,

	/// A required input was missing or malformed.
	#[error("Invalid argument: {0}")]
	InvalidArgument(&'static str),

	/// The session is already committed to the other role.
	#[error("Session already used as {0}")]
	RoleConflict(ProfileRole),

	/// `start_server` was called more than once.
	#[error("Server already started")]
	AlreadyStarted,

	/// `accept` was called without a running server.
	#[error("Server not started")]
	NotStarted,

	/// A one-shot operation (`accept` or `connect`) was called again.
	#[error("{0} already used")]
	AlreadyUsed(&'static str),

	/// The caller's token fired while the operation was waiting.
	#[error("{op} cancelled: {cause}")]
	Cancelled {
		op: &'static str,
		cause: CancelCause,
	},

	/// The system bus could not be opened.
	#[error("Failed to open system bus: {0}")]
	Bus(#[source] spp_runtime::Error),

	/// A daemon call failed.
	#[error("{op} failed: {source}")]
	Rpc {
		op: &'static str,
		#[source]
		source: spp_runtime::Error,
	},

	/// `Device1.Pair` failed.
	#[error("Pairing failed: {0}")]
	Pairing(#[source] spp_runtime::Error),
}

impl Error {
	pub(crate) fn rpc(op: &'static str, source: spp_runtime::Error) -> Self {
		Error::Rpc { op, source }
	}

	/// Returns true for precondition violations detected before any daemon call.
	pub fn is_usage(&self) -> bool {
		matches!(
			self,
			Error::Closed
				| Error::InvalidArgument(_)
				| Error::RoleConflict(_)
				| Error::AlreadyStarted
				| Error::NotStarted
				| Error::AlreadyUsed(_)
		)
	}

	/// Returns true if the caller's token fired.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled { .. })
	}

	/// Returns the cancellation cause, if this is a cancellation.
	pub fn cancel_cause(&self) -> Option<CancelCause> {
		match self {
			Error::Cancelled { cause, .. } => Some(*cause),
			_ => None,
		}
	}

	/// Returns true if the daemon refused or could not be reached.
	pub fn is_rpc(&self) -> bool {
		matches!(self, Error::Bus(_) | Error::Rpc { .. } | Error::Pairing(_))
	}

	/// Returns the daemon's D-Bus error name, if the daemon refused the call.
	pub fn remote_name(&self) -> Option<&str> {
		match self {
			Error::Bus(source) | Error::Rpc { source, .. } | Error::Pairing(source) => {
				source.error_name()
			}
			_ => None,
		}
	}
}
