use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

const DEFAULT_SERVICE_NAME: &str = "MyChatService";

#[derive(Parser, Debug)]
#[command(name = "sppctl")]
#[command(about = "Serial Port Profile connections over BlueZ")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Operation timeout: seconds, or a number with an `s`, `ms` or `m` suffix
	#[arg(short, long, global = true, value_parser = parse_timeout, default_value = "15")]
	pub timeout: Duration,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// List nearby devices offering SPP until the timeout
	Scan,

	/// Register the SPP server and hold it until the timeout, without accepting
	#[command(alias = "startserver")]
	Start {
		/// SDP service name
		#[arg(short, long, default_value = DEFAULT_SERVICE_NAME)]
		name: String,
	},

	/// Register the SPP server and accept one connection
	Server {
		/// SDP service name
		#[arg(short, long, default_value = DEFAULT_SERVICE_NAME)]
		name: String,
	},

	/// Connect to a device's SPP service
	Connect {
		/// Device object path (e.g. /org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF).
		/// Without it, scan and choose interactively.
		#[arg(short, long)]
		device: Option<String>,
	},
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Scan => "scan",
			Commands::Start { .. } => "start",
			Commands::Server { .. } => "server",
			Commands::Connect { .. } => "connect",
		}
	}
}

/// Parses `15`, `15s`, `500ms` or `2m`.
pub fn parse_timeout(s: &str) -> Result<Duration, String> {
	let s = s.trim();
	let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
		Some(idx) => s.split_at(idx),
		None => (s, "s"),
	};
	let value: u64 = digits
		.parse()
		.map_err(|_| format!("invalid timeout: {s:?}"))?;
	let duration = match unit {
		"s" => Duration::from_secs(value),
		"ms" => Duration::from_millis(value),
		"m" => Duration::from_secs(value * 60),
		_ => return Err(format!("unknown timeout unit {unit:?} (use s, ms or m)")),
	};
	if duration.is_zero() {
		return Err("timeout must be greater than zero".to_string());
	}
	Ok(duration)
}
