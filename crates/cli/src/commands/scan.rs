use connmgr::Device;

use super::{CommandContext, remaining};
use crate::error::Result;
use crate::output::{self, CommandResult, OutputFormat, ScanData};

pub async fn run(ctx: &CommandContext<'_>) -> Result<()> {
	let devices = discover(ctx).await?;
	match ctx.format {
		OutputFormat::Json => output::print_result(&CommandResult::success("scan", ScanData { devices })),
		OutputFormat::Text => print_devices(&devices),
	}
	Ok(())
}

/// Scans for the configured timeout.
pub(super) async fn discover(ctx: &CommandContext<'_>) -> Result<Vec<Device>> {
	let token = ctx.token();
	eprintln!("Scanning for SPP devices (timeout={})...", remaining(&token));
	let mut devices = ctx.session.scan_spp(&token).await?;
	devices.sort_by(|a, b| a.path.cmp(&b.path));
	Ok(devices)
}

pub(super) fn print_devices(devices: &[Device]) {
	if devices.is_empty() {
		println!("no SPP devices found");
		return;
	}
	for (i, device) in devices.iter().enumerate() {
		println!("{}", output::device_line(i, device));
	}
}
