//! Result envelope and human-readable rendering.
//!
//! With `--format json`, every command prints exactly one envelope on stdout:
//!
//! ```json
//! { "ok": true, "command": "scan", "data": { "devices": [ ... ] } }
//! ```
//!
//! or on failure:
//!
//! ```json
//! { "ok": false, "command": "connect", "error": { "code": "PAIRING_FAILED", "message": "..." } }
//! ```

use std::io::{self, Write};

use serde::Serialize;
use spp_protocol::Device;

/// Output format for CLI results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON envelope
	Json,
}

/// The result envelope printed in JSON mode.
#[derive(Debug, Serialize)]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
}

impl<T: Serialize> CommandResult<T> {
	pub fn success(command: &'static str, data: T) -> Self {
		Self {
			ok: true,
			command,
			data: Some(data),
			error: None,
		}
	}
}

impl CommandResult<()> {
	pub fn failure(command: &'static str, error: CommandError) -> Self {
		Self {
			ok: false,
			command,
			data: None,
			error: Some(error),
		}
	}
}

/// Error information for failed commands.
#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub remote: Option<String>,
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Missing or conflicting input
	InvalidInput,
	/// The session refused the call in its current state
	SessionError,
	/// Deadline passed or Ctrl-C
	Cancelled,
	/// The system bus could not be opened
	BusUnavailable,
	/// The daemon refused a call
	DaemonError,
	/// `Pair` failed
	PairingFailed,
	/// Reading stdin failed
	IoError,
	InternalError,
}

/// Payload of `scan`.
#[derive(Debug, Serialize)]
pub struct ScanData {
	pub devices: Vec<Device>,
}

/// Payload of `start`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartData {
	pub service_name: String,
	pub channel: u16,
}

/// Payload of `server` and `connect`.
#[derive(Debug, Serialize)]
pub struct ConnectionData {
	pub fd: i32,
	pub peer: Device,
}

pub fn print_result<T: Serialize>(result: &CommandResult<T>) {
	let mut stdout = io::stdout().lock();
	match serde_json::to_string_pretty(result) {
		Ok(json) => {
			let _ = writeln!(stdout, "{json}");
		}
		Err(e) => {
			let _ = writeln!(stdout, r#"{{"ok":false,"error":{{"message":"serialize: {e}"}}}}"#);
		}
	}
}

pub fn print_error_stderr(error: &CommandError) {
	eprintln!("error: {}", error.message);
}

/// One line per device: `[i] Path=... MAC=... Name=... Alias=...`.
pub fn device_line(index: usize, device: &Device) -> String {
	format!(
		"[{index}] Path={} MAC={} Name={} Alias={}",
		device.path,
		device.address.as_deref().unwrap_or(""),
		device.name.as_deref().unwrap_or(""),
		device.alias.as_deref().unwrap_or(""),
	)
}
