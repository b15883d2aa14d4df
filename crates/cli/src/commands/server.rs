use std::os::fd::AsRawFd;

use connmgr::{Accepted, ServerOptions};
use spp_protocol::DEFAULT_RFCOMM_CHANNEL;

use super::{CommandContext, remaining};
use crate::error::Result;
use crate::output::{self, CommandResult, ConnectionData, OutputFormat, StartData};

/// `start`: register and hold the server without accepting.
pub async fn start(ctx: &CommandContext<'_>, name: &str) -> Result<()> {
	ctx.session.start_server(&ServerOptions::new(name)).await?;
	let token = ctx.token();
	eprintln!("SPP server registered: Name={name} Channel={DEFAULT_RFCOMM_CHANNEL}");
	eprintln!(
		"Now waiting (no accept). Use sdptool or dbus-monitor to verify. Timeout={}",
		remaining(&token)
	);

	let cause = token.cancelled().await;
	eprintln!("done waiting: {cause}");

	if ctx.format == OutputFormat::Json {
		output::print_result(&CommandResult::success(
			"start",
			StartData {
				service_name: name.to_string(),
				channel: DEFAULT_RFCOMM_CHANNEL,
			},
		));
	}
	Ok(())
}

/// `server`: register, accept one connection, report it, close it.
pub async fn serve(ctx: &CommandContext<'_>, name: &str) -> Result<()> {
	ctx.session.start_server(&ServerOptions::new(name)).await?;
	let token = ctx.token();
	eprintln!("SPP server started: Name={name} Channel={DEFAULT_RFCOMM_CHANNEL}");
	eprintln!("Waiting for incoming connection (timeout={})...", remaining(&token));

	let Accepted { fd, peer } = ctx.session.accept(&token).await?;
	let raw = fd.as_raw_fd();
	match ctx.format {
		OutputFormat::Json => output::print_result(&CommandResult::success(
			"server",
			ConnectionData { fd: raw, peer },
		)),
		OutputFormat::Text => println!(
			"ACCEPTED: fd={raw} peer.Path={} peer.MAC={} peer.Name={} peer.Alias={}",
			peer.path,
			peer.address.as_deref().unwrap_or(""),
			peer.name.as_deref().unwrap_or(""),
			peer.alias.as_deref().unwrap_or(""),
		),
	}
	drop(fd);
	Ok(())
}
