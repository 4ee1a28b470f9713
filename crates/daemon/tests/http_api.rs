//! The daemon's HTTP API served over its Unix socket.

mod support;

use std::sync::Arc;

use http::StatusCode;

use arbor_daemon::http_server::api::client::{ApiClient, ApiError};
use arbor_daemon::http_server::api::v0::mounts::{
    CreateMountRequest, GetMountRequest, ListMountsRequest, UnmountRequest,
};
use arbor_daemon::http_server::api::v0::stats::StatsRequest;
use arbor_daemon::http_server::health::liveness::LivezRequest;
use arbor_daemon::http_server::health::version::VersionRequest;
use arbor_daemon::process::{ListenAddress, ProcessLock};
use arbor_daemon::server::stats::MOUNTS_STOPPED;
use arbor_daemon::{spawn_service_with_driver, ShutdownHandle};

use support::{FakeDriver, Fixture};

async fn start(fixture: &Fixture, driver: &Arc<FakeDriver>) -> (ShutdownHandle, ApiClient) {
    let handle = spawn_service_with_driver(&fixture.config, driver.clone())
        .await
        .unwrap();
    let client = ApiClient::new(handle.address().clone()).unwrap();
    (handle, client)
}

fn status(err: &ApiError) -> StatusCode {
    err.status()
        .unwrap_or_else(|| panic!("expected an HTTP status, got: {err}"))
}

#[tokio::test]
async fn test_health_endpoints() {
    let fixture = Fixture::new();
    let driver = FakeDriver::new();
    let (handle, mut client) = start(&fixture, &driver).await;

    assert_eq!(
        handle.address(),
        &ListenAddress::Unix(fixture.config.data_dir.join("socket"))
    );

    let livez = client.call(LivezRequest {}).await.unwrap();
    assert_eq!(livez.status, "ok");

    let version = client.call(VersionRequest {}).await.unwrap();
    assert_eq!(version, arbor_daemon::build_info());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_mount_lifecycle_over_api() {
    let fixture = Fixture::new();
    let driver = FakeDriver::new();
    let (handle, mut client) = start(&fixture, &driver).await;
    let client_dir = fixture.client_dir("c1", "null", "");

    let listed = client.call(ListMountsRequest {}).await.unwrap();
    assert!(listed.mounts.is_empty());

    let created = client
        .call(CreateMountRequest {
            mount_point: "/m1".to_string(),
            client_dir: client_dir.clone(),
        })
        .await
        .unwrap();
    assert_eq!(created.mount.mount_point, "/m1");
    assert_eq!(created.mount.repo_type, "null");
    assert_eq!(created.mount.stage, "running");

    let listed = client.call(ListMountsRequest {}).await.unwrap();
    assert_eq!(listed.mounts, vec![created.mount.clone()]);

    let info = client
        .call(GetMountRequest {
            mount_point: "/m1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(info.mount.client_dir, client_dir);

    let err = client
        .call(CreateMountRequest {
            mount_point: "/m1".to_string(),
            client_dir,
        })
        .await
        .unwrap_err();
    assert_eq!(status(&err), StatusCode::CONFLICT);

    let unmounted = client
        .call(UnmountRequest {
            mount_point: "/m1".to_string(),
        })
        .await
        .unwrap();
    assert!(unmounted.unmounted);

    let err = client
        .call(UnmountRequest {
            mount_point: "/m1".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status(&err), StatusCode::NOT_FOUND);
    assert!(err.to_string().contains("/m1"));

    let stats = client.call(StatsRequest {}).await.unwrap();
    assert_eq!(stats.mounts, 0);
    assert_eq!(stats.counters.get(MOUNTS_STOPPED), Some(&1));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_error_statuses() {
    let fixture = Fixture::new();
    let driver = FakeDriver::new();
    let (handle, mut client) = start(&fixture, &driver).await;

    let err = client
        .call(GetMountRequest {
            mount_point: "/nowhere".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status(&err), StatusCode::NOT_FOUND);
    assert!(err.to_string().contains("/nowhere"));

    let err = client
        .call(CreateMountRequest {
            mount_point: "/m1".to_string(),
            client_dir: fixture.client_dir("bad", "foo", "/repo"),
        })
        .await
        .unwrap_err();
    assert_eq!(status(&err), StatusCode::BAD_REQUEST);
    assert!(err.to_string().contains("foo"));

    let err = client
        .call(GetMountRequest {
            mount_point: "relative".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status(&err), StatusCode::BAD_REQUEST);

    driver.fail_start("/m2");
    let err = client
        .call(CreateMountRequest {
            mount_point: "/m2".to_string(),
            client_dir: fixture.client_dir("c2", "null", ""),
        })
        .await
        .unwrap_err();
    assert_eq!(status(&err), StatusCode::INTERNAL_SERVER_ERROR);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_startup_remounts_and_shutdown_cleans_up() {
    let fixture = Fixture::new();
    let driver = FakeDriver::new();

    let client_dir = fixture.config.clients_dir().join("one");
    std::fs::create_dir_all(&client_dir).unwrap();
    std::fs::write(
        client_dir.join("config.toml"),
        "[repository]\ntype = \"null\"\npath = \"\"\n",
    )
    .unwrap();
    std::fs::write(
        fixture.config.directory_map_path(),
        r#"{"/mnt/one": "one"}"#,
    )
    .unwrap();

    let (handle, mut client) = start(&fixture, &driver).await;
    let listed = client.call(ListMountsRequest {}).await.unwrap();
    assert_eq!(listed.mounts.len(), 1);
    assert_eq!(listed.mounts[0].mount_point, "/mnt/one");

    // One daemon per data directory.
    let second = spawn_service_with_driver(&fixture.config, FakeDriver::new()).await;
    assert!(second.is_err());

    let socket = fixture.config.data_dir.join("socket");
    assert!(socket.exists());
    handle.shutdown().await.unwrap();

    assert_eq!(driver.serving(), 0);
    assert_eq!(driver.unmounted().len(), 1);
    assert!(!socket.exists());
    ProcessLock::acquire(&fixture.config.data_dir).unwrap();
}
