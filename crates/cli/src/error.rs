use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Session(#[from] connmgr::Error),

	#[error("reading device choice: {0}")]
	Stdin(#[source] std::io::Error),

	#[error("no device chosen")]
	NoChoice,

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let code = match self {
			CliError::Session(err) => session_code(err),
			CliError::Stdin(_) => ErrorCode::IoError,
			CliError::NoChoice => ErrorCode::InvalidInput,
			CliError::Anyhow(_) => ErrorCode::InternalError,
		};
		let remote = match self {
			CliError::Session(err) => err.remote_name().map(str::to_string),
			_ => None,
		};
		CommandError {
			code,
			message: self.to_string(),
			remote,
		}
	}
}

fn session_code(err: &connmgr::Error) -> ErrorCode {
	use connmgr::Error;

	match err {
		Error::InvalidArgument(_) => ErrorCode::InvalidInput,
		_ if err.is_usage() => ErrorCode::SessionError,
		_ if err.is_cancelled() => ErrorCode::Cancelled,
		Error::Bus(_) => ErrorCode::BusUnavailable,
		Error::Pairing(_) => ErrorCode::PairingFailed,
		_ if err.is_rpc() => ErrorCode::DaemonError,
		_ => ErrorCode::InternalError,
	}
}
