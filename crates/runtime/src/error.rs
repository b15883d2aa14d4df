//! Error types for the daemon boundary.

use thiserror::Error;
use zbus::DBusError;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to the Bluetooth daemon.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to establish the system bus connection.
	#[error("Failed to connect to system bus: {0}")]
	ConnectionFailed(String),

	/// The daemon answered a call with a D-Bus error.
	#[error("{name}: {message}")]
	Remote {
		/// D-Bus error name (e.g., "org.bluez.Error.NotReady")
		name: String,
		/// Human-readable error message
		message: String,
	},

	/// Bus-level failure (disconnected, malformed message, ...).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// A reply or signal did not have the expected shape.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// An object path was rejected by the bus.
	#[error("Invalid object path: {0}")]
	InvalidPath(String),

	/// The object path is already exported on this connection.
	#[error("Object already exported: {0}")]
	AlreadyExported(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Builds a [`Error::Remote`] from a D-Bus error name and message.
	pub fn remote(name: impl Into<String>, message: impl Into<String>) -> Self {
		Error::Remote {
			name: name.into(),
			message: message.into(),
		}
	}

	/// Returns the D-Bus error name if the daemon refused the call.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			_ => None,
		}
	}
}

impl From<zbus::Error> for Error {
	fn from(err: zbus::Error) -> Self {
		match err {
			zbus::Error::MethodError(name, message, _) => Error::Remote {
				name: name.to_string(),
				message: message.unwrap_or_default(),
			},
			zbus::Error::FDO(fdo) => Error::from(*fdo),
			zbus::Error::InputOutput(io) => Error::TransportError(io.to_string()),
			other => Error::TransportError(other.to_string()),
		}
	}
}

impl From<zbus::fdo::Error> for Error {
	fn from(err: zbus::fdo::Error) -> Self {
		match err {
			zbus::fdo::Error::ZBus(inner) => Error::from(inner),
			other => Error::Remote {
				name: other.name().to_string(),
				message: other.description().unwrap_or_default().to_string(),
			},
		}
	}
}

impl From<zbus::zvariant::Error> for Error {
	fn from(err: zbus::zvariant::Error) -> Self {
		Error::ProtocolError(err.to_string())
	}
}
