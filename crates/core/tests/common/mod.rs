// Shared fixtures for session tests.

#![allow(dead_code)]

use std::io::{ErrorKind, Read};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use connmgr::SessionManager;
use spp_protocol::{DeviceProperties, SPP_UUID};
use spp_runtime::testing::{FakeConnector, FakeDaemonBuilder, FakeDaemonController};

pub const ADAPTER: &str = "/org/bluez/hci0";
pub const PEER: &str = "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF";
pub const OTHER_PEER: &str = "/org/bluez/hci0/dev_11_22_33_44_55_66";

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing::Level::DEBUG)
		.try_init();
}

/// Device properties advertising SPP.
pub fn spp_props(address: &str, name: &str, paired: bool) -> DeviceProperties {
	DeviceProperties {
		address: Some(address.to_string()),
		name: Some(name.to_string()),
		alias: None,
		uuids: vec![
			"0000110a-0000-1000-8000-00805f9b34fb".to_string(),
			SPP_UUID.to_string(),
		],
		paired: Some(paired),
	}
}

/// Device properties advertising audio only.
pub fn audio_props(address: &str, name: &str) -> DeviceProperties {
	DeviceProperties {
		address: Some(address.to_string()),
		name: Some(name.to_string()),
		alias: None,
		uuids: vec!["0000110b-0000-1000-8000-00805f9b34fb".to_string()],
		paired: Some(true),
	}
}

/// A session over a fake daemon with one adapter and one paired SPP peer.
pub fn session() -> (Arc<SessionManager>, Arc<FakeConnector>, FakeDaemonController) {
	session_with(
		FakeDaemonBuilder::new()
			.adapter(ADAPTER)
			.device(PEER, spp_props("AA:BB:CC:DD:EE:FF", "Chat Peer", true))
			.deliver_on_connect(),
	)
}

pub fn session_with(
	builder: FakeDaemonBuilder,
) -> (Arc<SessionManager>, Arc<FakeConnector>, FakeDaemonController) {
	init_tracing();
	let (connector, controller) = builder.build();
	let manager = Arc::new(SessionManager::new(connector.clone()));
	(manager, connector, controller)
}

/// A connected socket pair: the fd to deliver, and the remote end to observe.
pub fn socket() -> (OwnedFd, UnixStream) {
	let (ours, theirs) = UnixStream::pair().unwrap();
	theirs.set_nonblocking(true).unwrap();
	(OwnedFd::from(ours), theirs)
}

/// True once the other end of `stream` has been closed.
pub fn is_closed(stream: &mut UnixStream) -> bool {
	let mut buf = [0u8; 16];
	match stream.read(&mut buf) {
		Ok(0) => true,
		Ok(_) => false,
		Err(e) if e.kind() == ErrorKind::WouldBlock => false,
		Err(e) => panic!("unexpected read error: {e}"),
	}
}
