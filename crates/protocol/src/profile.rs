//! Profile registration options.

use serde::{Deserialize, Serialize};

use crate::bluez::DEFAULT_RFCOMM_CHANNEL;

/// Server-side profile registration input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOptions {
	/// Advertised SDP service name; sent as `RegisterProfile` option `Name`.
	pub service_name: String,
}

impl ServerOptions {
	pub fn new(service_name: impl Into<String>) -> Self {
		Self {
			service_name: service_name.into(),
		}
	}

	/// Returns the reason these options cannot be registered, if any.
	pub fn validate(&self) -> Result<(), &'static str> {
		if self.service_name.is_empty() {
			return Err("service name required");
		}
		Ok(())
	}
}

/// Value of the `Role` registration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileRole {
	Server,
	Client,
}

impl ProfileRole {
	pub fn as_str(self) -> &'static str {
		match self {
			ProfileRole::Server => "server",
			ProfileRole::Client => "client",
		}
	}
}

impl std::fmt::Display for ProfileRole {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Options dictionary for `org.bluez.ProfileManager1.RegisterProfile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileOptions {
	pub role: ProfileRole,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub channel: Option<u16>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

impl ProfileOptions {
	/// `{Role: "server", Channel: 22, Name: <service name>}`.
	pub fn server(opts: &ServerOptions) -> Self {
		Self {
			role: ProfileRole::Server,
			channel: Some(DEFAULT_RFCOMM_CHANNEL),
			name: Some(opts.service_name.clone()),
		}
	}

	/// `{Role: "client"}`.
	pub fn client() -> Self {
		Self {
			role: ProfileRole::Client,
			channel: None,
			name: None,
		}
	}
}
