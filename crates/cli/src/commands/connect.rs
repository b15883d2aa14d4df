use std::io::{BufRead, Write};
use std::os::fd::AsRawFd;

use anyhow::Context;
use connmgr::Device;

use super::{CommandContext, remaining, scan};
use crate::error::{CliError, Result};
use crate::output::{self, CommandResult, ConnectionData, OutputFormat};

/// `connect`: to `--device` directly, or to a device chosen from a scan.
pub async fn run(ctx: &CommandContext<'_>, device: Option<&str>) -> Result<()> {
	let device = match device {
		Some(path) => Device::from_path(path),
		None => {
			let devices = scan::discover(ctx).await?;
			scan::print_devices(&devices);
			if devices.is_empty() {
				return Ok(());
			}
			let index = choose(devices.len()).await?;
			devices.into_iter().nth(index).ok_or(CliError::NoChoice)?
		}
	};

	let token = ctx.token();
	eprintln!("Connecting to {} (timeout={})...", device.path, remaining(&token));
	let fd = ctx.session.connect(&device, &token).await?;
	let raw = fd.as_raw_fd();
	match ctx.format {
		OutputFormat::Json => output::print_result(&CommandResult::success(
			"connect",
			ConnectionData { fd: raw, peer: device },
		)),
		OutputFormat::Text => println!("CONNECTED: fd={raw} dev.Path={}", device.path),
	}
	drop(fd);
	Ok(())
}

/// Prompts on stderr until stdin yields a valid index below `count`.
async fn choose(count: usize) -> Result<usize> {
	tokio::task::spawn_blocking(move || {
		let stdin = std::io::stdin();
		let mut lines = stdin.lock().lines();
		eprint!("Choose index: ");
		loop {
			let _ = std::io::stderr().flush();
			let Some(line) = lines.next() else {
				return Err(CliError::NoChoice);
			};
			let line = line.map_err(CliError::Stdin)?;
			if let Some(index) = parse_choice(&line, count) {
				return Ok(index);
			}
			eprint!("enter 0..{}: ", count - 1);
		}
	})
	.await
	.context("device prompt task")?
}

fn parse_choice(line: &str, count: usize) -> Option<usize> {
	line.trim().parse().ok().filter(|&i| i < count)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_choice() {
		assert_eq!(parse_choice("0\n", 3), Some(0));
		assert_eq!(parse_choice("  2 ", 3), Some(2));
		assert_eq!(parse_choice("3", 3), None);
		assert_eq!(parse_choice("-1", 3), None);
		assert_eq!(parse_choice("first", 3), None);
	}
}
