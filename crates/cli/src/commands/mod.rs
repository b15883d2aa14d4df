//! Command dispatch.

mod connect;
mod scan;
mod server;

use std::sync::Arc;
use std::time::Duration;

use connmgr::{CancelToken, SessionManager};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::output::OutputFormat;

/// Hands out operation tokens and cancels all of them on Ctrl-C.
#[derive(Clone, Default)]
pub struct Interrupt {
	inner: Arc<Mutex<InterruptState>>,
}

#[derive(Default)]
struct InterruptState {
	fired: bool,
	tokens: Vec<CancelToken>,
}

impl Interrupt {
	/// A token that fires after `timeout` or on interrupt.
	pub fn token(&self, timeout: Duration) -> CancelToken {
		let token = CancelToken::with_timeout(timeout);
		let mut state = self.inner.lock();
		if state.fired {
			token.cancel();
		} else {
			state.tokens.push(token.clone());
		}
		token
	}

	pub fn fire(&self) {
		let mut state = self.inner.lock();
		state.fired = true;
		for token in state.tokens.drain(..) {
			token.cancel();
		}
	}

	/// Fires on Ctrl-C for the rest of the process.
	fn listen(&self) {
		let interrupt = self.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				info!("interrupted");
				interrupt.fire();
			}
		});
	}
}

/// Everything a command needs.
pub struct CommandContext<'a> {
	pub session: &'a SessionManager,
	pub interrupt: Interrupt,
	pub timeout: Duration,
	pub format: OutputFormat,
}

impl CommandContext<'_> {
	pub fn token(&self) -> CancelToken {
		self.interrupt.token(self.timeout)
	}
}

/// Runs the parsed command against a system-bus session, closing the session
/// on every exit path.
pub async fn dispatch(cli: Cli) -> Result<()> {
	let interrupt = Interrupt::default();
	interrupt.listen();

	let session = SessionManager::system();
	let ctx = CommandContext {
		session: &session,
		interrupt,
		timeout: cli.timeout,
		format: cli.format,
	};

	let result = match cli.command {
		Commands::Scan => scan::run(&ctx).await,
		Commands::Start { name } => server::start(&ctx, &name).await,
		Commands::Server { name } => server::serve(&ctx, &name).await,
		Commands::Connect { device } => connect::run(&ctx, device.as_deref()).await,
	};

	if let Err(e) = session.close().await {
		warn!("close error: {}", e);
	}
	result
}

/// Formats the remaining time on `token` the way the prompts show it.
fn remaining(token: &CancelToken) -> String {
	match token.deadline() {
		Some(deadline) => {
			let left = deadline.saturating_duration_since(tokio::time::Instant::now());
			format!("{}s", left.as_secs())
		}
		None => "none".to_string(),
	}
}
