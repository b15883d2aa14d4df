//! Client side: register, pair if needed, connect, wait for the socket.

use std::os::fd::OwnedFd;

use spp_protocol::bluez::SPP_UUID;
use spp_protocol::{Device, ProfileOptions, ProfileRole};
use tracing::{debug, info};

use super::{RoleState, SessionManager, cancellable};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};

impl SessionManager {
	/// Connects to the SPP service of `device` and returns the socket.
	///
	/// Registers the client profile on first use, pairs the device if the
	/// daemon reports it unpaired, then asks the daemon to connect and waits
	/// for it to hand over the socket. One-shot, like [`accept`](Self::accept).
	pub async fn connect(&self, device: &Device, token: &CancelToken) -> Result<OwnedFd> {
		if device.path.is_empty() {
			return Err(Error::InvalidArgument("device path required"));
		}

		let needs_registration = {
			let mut state = self.state.lock();
			state.check_open()?;
			let needs_registration = match state.role {
				RoleState::None => true,
				RoleState::Client(_) => false,
				RoleState::Registering(ProfileRole::Client) => {
					return Err(Error::AlreadyUsed("connect"));
				}
				RoleState::Registering(ProfileRole::Server) | RoleState::Server(_) => {
					return Err(Error::RoleConflict(ProfileRole::Server));
				}
			};
			if state.accept_used {
				return Err(Error::RoleConflict(ProfileRole::Server));
			}
			if state.connect_used {
				return Err(Error::AlreadyUsed("connect"));
			}
			if needs_registration {
				state.role = RoleState::Registering(ProfileRole::Client);
			}
			needs_registration
		};

		if needs_registration {
			match self
				.register(ProfileRole::Client, ProfileOptions::client())
				.await
			{
				Ok(registered) => self.commit(ProfileRole::Client, registered).await?,
				Err(e) => {
					self.release_claim(ProfileRole::Client);
					return Err(e);
				}
			}
		}

		let (bus, mut rx) = {
			let mut state = self.state.lock();
			state.check_open()?;
			if state.connect_used {
				return Err(Error::AlreadyUsed("connect"));
			}
			let rx = match &mut state.role {
				RoleState::Client(endpoint) => endpoint.rx.take(),
				_ => None,
			};
			let rx = rx.ok_or(Error::Closed)?;
			state.connect_used = true;
			let bus = state.bus.clone().ok_or(Error::Closed)?;
			(bus, rx)
		};

		match cancellable(token, "connect", bus.device_paired(&device.path)).await? {
			Ok(true) => debug!(device = %device.path, "device already paired"),
			Ok(false) => {
				info!(device = %device.path, "pairing");
				cancellable(token, "connect", bus.pair(&device.path))
					.await?
					.map_err(Error::Pairing)?;
			}
			Err(e) => debug!(device = %device.path, "paired state unknown, not pairing: {}", e),
		}

		cancellable(token, "connect", bus.connect_profile(&device.path, SPP_UUID))
			.await?
			.map_err(|e| Error::rpc("ConnectProfile", e))?;

		let delivery = self.wait_delivery(&mut rx, token, "connect").await;
		drop(rx);
		let delivery = delivery?;
		info!(device = %device.path, "connected");
		Ok(delivery.fd)
	}
}
