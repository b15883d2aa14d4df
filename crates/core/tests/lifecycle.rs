// Close, teardown order, and behaviour after close.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{PEER, is_closed, session, session_with, socket, spp_props};
use connmgr::{CancelToken, Device, Error, ServerOptions};
use spp_protocol::ProfileRole;
use spp_runtime::Rejection;
use spp_runtime::testing::{DaemonCall, FakeDaemonBuilder};

#[tokio::test]
async fn test_close_tears_down_in_reverse_order() {
	let (session, _, controller) = session();
	session
		.start_server(&ServerOptions::new("MyChatService"))
		.await
		.unwrap();
	let path = controller.registered_profiles()[0].path.clone();
	controller.take_calls();

	session.close().await.unwrap();

	assert_eq!(
		controller.take_calls(),
		vec![
			DaemonCall::UnregisterProfile { path: path.clone() },
			DaemonCall::UnexportProfile { path },
			DaemonCall::Close,
		]
	);
	assert!(controller.registered_profiles().is_empty());
	assert!(controller.is_closed());
}

#[tokio::test]
async fn test_close_is_idempotent() {
	let (session, _, controller) = session();
	session
		.start_server(&ServerOptions::new("MyChatService"))
		.await
		.unwrap();

	session.close().await.unwrap();
	session.close().await.unwrap();
	session.close().await.unwrap();

	assert!(session.is_closed());
	assert_eq!(controller.count("UnregisterProfile"), 1);
	assert_eq!(controller.count("Close"), 1);
}

#[tokio::test]
async fn test_close_without_bus_makes_no_calls() {
	let (session, connector, controller) = session();

	session.close().await.unwrap();

	assert_eq!(connector.connects(), 0);
	assert!(controller.calls().is_empty());
}

#[tokio::test]
async fn test_operations_fail_after_close() {
	let (session, _, _) = session();
	session.close().await.unwrap();

	let token = CancelToken::new();
	assert!(matches!(
		session.start_server(&ServerOptions::new("MyChatService")).await,
		Err(Error::Closed)
	));
	assert!(matches!(session.accept(&token).await, Err(Error::Closed)));
	assert!(matches!(session.scan_spp(&token).await, Err(Error::Closed)));
	assert!(matches!(
		session.connect(&Device::from_path(PEER), &token).await,
		Err(Error::Closed)
	));
}

#[tokio::test]
async fn test_teardown_failure_does_not_stop_the_rest() {
	let (session, _, controller) = session();
	session
		.start_server(&ServerOptions::new("MyChatService"))
		.await
		.unwrap();
	controller.fail_next("UnregisterProfile", "org.bluez.Error.DoesNotExist", "gone");

	session.close().await.unwrap();

	assert_eq!(controller.count("UnexportProfile"), 1);
	assert!(controller.is_closed());
}

#[tokio::test]
async fn test_close_from_another_task_ends_pending_accept() {
	let (session, _, _) = session();
	session
		.start_server(&ServerOptions::new("MyChatService"))
		.await
		.unwrap();

	let accept = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.accept(&CancelToken::new()).await }
	});
	tokio::time::sleep(Duration::from_millis(20)).await;

	session.close().await.unwrap();

	let result = tokio::time::timeout(Duration::from_secs(5), accept)
		.await
		.unwrap()
		.unwrap();
	assert!(matches!(result, Err(Error::Closed)));
}

#[tokio::test]
async fn test_close_from_another_task_ends_pending_scan() {
	let (session, _, controller) = session();

	let scan = tokio::spawn({
		let session = Arc::clone(&session);
		async move { session.scan_spp(&CancelToken::new()).await }
	});
	controller.wait_for_subscriber().await;

	session.close().await.unwrap();

	let result = tokio::time::timeout(Duration::from_secs(5), scan)
		.await
		.unwrap()
		.unwrap();
	assert!(matches!(result, Err(Error::Closed)));
}

#[tokio::test]
async fn test_close_from_another_task_ends_pending_connect() {
	// No deliver_on_connect: the connect parks waiting for a socket.
	let (session, _, controller) = session_with(
		FakeDaemonBuilder::new().device(PEER, spp_props("AA:BB:CC:DD:EE:FF", "Chat Peer", true)),
	);

	let connect = tokio::spawn({
		let session = Arc::clone(&session);
		async move {
			session
				.connect(&Device::from_path(PEER), &CancelToken::new())
				.await
		}
	});
	tokio::time::timeout(Duration::from_secs(5), async {
		while controller.count("ConnectProfile") == 0 {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.unwrap();

	session.close().await.unwrap();

	let result = tokio::time::timeout(Duration::from_secs(5), connect)
		.await
		.unwrap()
		.unwrap();
	assert!(matches!(result, Err(Error::Closed)));
}

#[tokio::test]
async fn test_delivery_after_close_is_rejected_and_closed() {
	let (session, _, controller) = session();
	session
		.start_server(&ServerOptions::new("MyChatService"))
		.await
		.unwrap();
	let handler = controller.handler(ProfileRole::Server).unwrap();

	session.close().await.unwrap();

	let (fd, mut remote) = socket();
	assert_eq!(handler.new_connection(PEER, fd), Err(Rejection::NoReceiver));
	assert!(is_closed(&mut remote));
}

#[tokio::test]
async fn test_dropping_session_releases_registrations() {
	let (session, _, controller) = session();
	session
		.start_server(&ServerOptions::new("MyChatService"))
		.await
		.unwrap();

	drop(session);

	tokio::time::timeout(Duration::from_secs(5), async {
		while !controller.is_closed() {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();
	assert!(controller.registered_profiles().is_empty());
}
