// Client role: discovery, pairing, connect.

mod common;

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use common::{
	ADAPTER, OTHER_PEER, PEER, audio_props, is_closed, session, session_with, socket, spp_props,
};
use connmgr::{CancelToken, Device, Error, Role, ServerOptions};
use spp_protocol::{ProfileOptions, ProfileRole, SPP_UUID};
use spp_runtime::{DaemonObject, Rejection};
use spp_runtime::testing::{DaemonCall, FakeDaemonBuilder};

const LATE_PEER: &str = "/org/bluez/hci0/dev_DE_AD_BE_EF_00_01";

#[tokio::test]
async fn test_scan_merges_snapshot_and_announced_devices() {
	let (session, _, controller) = session_with(
		FakeDaemonBuilder::new()
			.adapter(ADAPTER)
			.device(PEER, spp_props("AA:BB:CC:DD:EE:FF", "D1", true))
			.device(OTHER_PEER, audio_props("11:22:33:44:55:66", "D2")),
	);

	let token = CancelToken::with_timeout(Duration::from_millis(300));
	let scan = tokio::spawn({
		let session = Arc::clone(&session);
		let token = token.clone();
		async move { session.scan_spp(&token).await }
	});

	controller.wait_for_subscriber().await;
	controller.inject_object_added(DaemonObject::device(
		LATE_PEER,
		spp_props("DE:AD:BE:EF:00:01", "D3", false),
	));

	let devices = scan.await.unwrap().unwrap();
	let mut paths: Vec<_> = devices.iter().map(|d| d.path.as_str()).collect();
	paths.sort();
	assert_eq!(paths, vec![PEER, LATE_PEER]);

	let late = devices.iter().find(|d| d.path == LATE_PEER).unwrap();
	assert_eq!(late.name.as_deref(), Some("D3"));
	assert_eq!(late.address.as_deref(), Some("DE:AD:BE:EF:00:01"));

	assert_eq!(controller.count("StartDiscovery"), 1);
	assert_eq!(controller.count("StopDiscovery"), 1);
	assert_eq!(controller.subscriber_count(), 0);
}

#[tokio::test]
async fn test_scan_announcement_replaces_same_path() {
	let (session, _, controller) = session();

	let token = CancelToken::with_timeout(Duration::from_millis(300));
	let scan = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.scan_spp(&token).await }
	});

	controller.wait_for_subscriber().await;
	let mut renamed = spp_props("AA:BB:CC:DD:EE:FF", "Renamed", true);
	renamed.alias = Some("Kitchen".to_string());
	controller.inject_object_added(DaemonObject::device(PEER, renamed));

	let devices = scan.await.unwrap().unwrap();
	assert_eq!(devices.len(), 1);
	assert_eq!(devices[0].display_name(), "Kitchen");
}

#[tokio::test]
async fn test_scan_cancel_stops_discovery() {
	let (session, _, controller) = session();

	let token = CancelToken::new();
	let scan = tokio::spawn({
		let session = Arc::clone(&session);
		let token = token.clone();
		async move { session.scan_spp(&token).await }
	});

	controller.wait_for_subscriber().await;
	token.cancel();

	let err = scan.await.unwrap().unwrap_err();
	assert!(err.is_cancelled());
	assert_eq!(
		controller
			.calls()
			.into_iter()
			.filter(|c| matches!(c, DaemonCall::StopDiscovery { .. }))
			.count(),
		1
	);
}

#[tokio::test]
async fn test_scan_snapshot_failure_is_rpc_error() {
	let (session, _, controller) = session();
	controller.fail_next("GetManagedObjects", "org.freedesktop.DBus.Error.AccessDenied", "no");

	let err = session
		.scan_spp(&CancelToken::with_timeout(Duration::from_secs(5)))
		.await
		.unwrap_err();

	assert!(err.is_rpc());
	assert_eq!(controller.count("StartDiscovery"), 0);
}

#[tokio::test]
async fn test_scan_ignores_refused_start_discovery() {
	let (session, _, controller) = session();
	controller.fail_next("StartDiscovery", "org.bluez.Error.NotReady", "powered off");

	let devices = session
		.scan_spp(&CancelToken::with_timeout(Duration::from_millis(50)))
		.await
		.unwrap();

	assert_eq!(devices.len(), 1);
	// Nothing was started, so nothing is stopped.
	assert_eq!(controller.count("StopDiscovery"), 0);
}

#[tokio::test]
async fn test_connect_registers_client_and_returns_socket() {
	let (session, _, controller) = session();

	let fd = session
		.connect(&Device::from_path(PEER), &CancelToken::new())
		.await
		.unwrap();

	assert_eq!(session.role(), Role::Client);
	let profiles = controller.registered_profiles();
	assert_eq!(profiles.len(), 1);
	assert_eq!(profiles[0].options, ProfileOptions::client());
	assert!(profiles[0].path.starts_with("/org/bluez_spp/connmgr/client/"));
	assert_eq!(controller.count("Pair"), 0);
	assert!(controller.calls().contains(&DaemonCall::ConnectProfile {
		device: PEER.to_string(),
		uuid: SPP_UUID.to_string(),
	}));

	let mut remote = controller.take_connect_peers().pop().unwrap();
	let mut local = UnixStream::from(fd);
	local.write_all(b"ping").unwrap();
	let mut buf = [0u8; 4];
	remote.read_exact(&mut buf).unwrap();
	assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_connect_pairs_unpaired_device_first() {
	let (session, _, controller) = session_with(
		FakeDaemonBuilder::new()
			.adapter(ADAPTER)
			.device(PEER, spp_props("AA:BB:CC:DD:EE:FF", "Chat Peer", false))
			.deliver_on_connect(),
	);

	session
		.connect(&Device::from_path(PEER), &CancelToken::new())
		.await
		.unwrap();

	let methods: Vec<_> = controller
		.calls()
		.iter()
		.map(|c| c.method())
		.filter(|m| matches!(*m, "GetPaired" | "Pair" | "ConnectProfile"))
		.collect();
	assert_eq!(methods, vec!["GetPaired", "Pair", "ConnectProfile"]);
}

#[tokio::test]
async fn test_pairing_failure_skips_connect_profile() {
	let (session, _, controller) = session_with(
		FakeDaemonBuilder::new()
			.device(PEER, spp_props("AA:BB:CC:DD:EE:FF", "Chat Peer", false))
			.deliver_on_connect(),
	);
	controller.fail_next("Pair", "org.bluez.Error.AuthenticationFailed", "rejected");

	let err = session
		.connect(&Device::from_path(PEER), &CancelToken::new())
		.await
		.unwrap_err();

	assert!(matches!(err, Error::Pairing(_)));
	assert_eq!(err.remote_name(), Some("org.bluez.Error.AuthenticationFailed"));
	assert_eq!(controller.count("Pair"), 1);
	assert_eq!(controller.count("ConnectProfile"), 0);
}

#[tokio::test]
async fn test_unknown_paired_state_connects_without_pairing() {
	let (session, _, controller) = session_with(FakeDaemonBuilder::new().deliver_on_connect());

	session
		.connect(&Device::from_path(PEER), &CancelToken::new())
		.await
		.unwrap();

	assert_eq!(controller.count("GetPaired"), 1);
	assert_eq!(controller.count("Pair"), 0);
	assert_eq!(controller.count("ConnectProfile"), 1);
}

#[tokio::test]
async fn test_connect_profile_failure_returns_without_waiting() {
	let (session, _, controller) = session();
	controller.fail_next("ConnectProfile", "org.bluez.Error.Failed", "host is down");

	// The token never fires: only an immediate error can end this call.
	let err = tokio::time::timeout(
		Duration::from_secs(5),
		session.connect(&Device::from_path(PEER), &CancelToken::new()),
	)
	.await
	.unwrap()
	.unwrap_err();

	assert!(matches!(err, Error::Rpc { op: "ConnectProfile", .. }));
	assert_eq!(err.remote_name(), Some("org.bluez.Error.Failed"));
}

#[tokio::test]
async fn test_connect_cancelled_while_waiting() {
	// No deliver_on_connect: the daemon accepts the call but never hands over a socket.
	let (session, _, _) = session_with(
		FakeDaemonBuilder::new().device(PEER, spp_props("AA:BB:CC:DD:EE:FF", "Chat Peer", true)),
	);

	let err = session
		.connect(
			&Device::from_path(PEER),
			&CancelToken::with_timeout(Duration::from_millis(50)),
		)
		.await
		.unwrap_err();

	assert!(err.is_cancelled());
	let err = session
		.connect(&Device::from_path(PEER), &CancelToken::new())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::AlreadyUsed("connect")));
}

#[tokio::test]
async fn test_late_delivery_after_cancelled_connect_is_closed() {
	let (session, _, controller) = session_with(
		FakeDaemonBuilder::new().device(PEER, spp_props("AA:BB:CC:DD:EE:FF", "Chat Peer", true)),
	);

	let err = session
		.connect(
			&Device::from_path(PEER),
			&CancelToken::with_timeout(Duration::from_millis(50)),
		)
		.await
		.unwrap_err();
	assert!(err.is_cancelled());

	// The client profile stays exported until close; the socket has nowhere to go.
	let handler = controller.handler(ProfileRole::Client).unwrap();
	let (fd, mut remote) = socket();
	assert_eq!(handler.new_connection(PEER, fd), Err(Rejection::NoReceiver));
	assert!(is_closed(&mut remote));
}

#[tokio::test]
async fn test_connect_requires_device_path() {
	let (session, connector, _) = session();

	let err = session
		.connect(&Device::default(), &CancelToken::new())
		.await
		.unwrap_err();

	assert!(matches!(err, Error::InvalidArgument(_)));
	assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_roles_are_exclusive() {
	let (server, _, _) = session();
	server
		.start_server(&ServerOptions::new("MyChatService"))
		.await
		.unwrap();
	let err = server
		.connect(&Device::from_path(PEER), &CancelToken::new())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::RoleConflict(ProfileRole::Server)));

	let (client, _, _) = session();
	client
		.connect(&Device::from_path(PEER), &CancelToken::new())
		.await
		.unwrap();
	let err = client
		.start_server(&ServerOptions::new("MyChatService"))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::RoleConflict(ProfileRole::Client)));
	let err = client.accept(&CancelToken::new()).await.unwrap_err();
	assert!(matches!(err, Error::RoleConflict(ProfileRole::Client)));
}

#[tokio::test]
async fn test_scan_allowed_in_client_session() {
	let (session, _, _) = session();
	let devices = session
		.scan_spp(&CancelToken::with_timeout(Duration::from_millis(20)))
		.await
		.unwrap();
	let device = devices.into_iter().next().unwrap();

	session.connect(&device, &CancelToken::new()).await.unwrap();
	assert_eq!(session.role(), Role::Client);
}
