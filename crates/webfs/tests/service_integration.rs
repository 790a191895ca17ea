//! Integration tests for the WebFS service.
//!
//! Everything runs against the in-memory backend. The test thread is the
//! service's foreground thread; calls that must stay off it go through
//! `common::off_foreground`.

mod common;

use common::{FlakyRemote, Gate, block_on, mount_share, off_foreground, service_for, team_server, url};
use webfs::{
    ListMode, MountSpec, ObserverId, Operation, TransferState, VolumeChangeReason, WebFileService,
    WebFsConfig, WebFsError, WebFsFlow,
};

fn listing(service: &WebFileService, folder: &str) -> Option<Vec<String>> {
    service
        .root()
        .new_iterator(&url(folder), ListMode::ALL)
        .map(|items| items.map(|item| item.name).collect())
}

async fn fetch(service: &WebFileService, folder: &str) -> webfs::WebFsResult<()> {
    service
        .request_directory(ObserverId::new(), &url(folder))?
        .completion()
        .await
        .expect("request was not cancelled")
}

// ============================================================================
// Mounting
// ============================================================================

#[tokio::test]
async fn test_mount_collision_naming() {
    let server = team_server();
    let service = service_for(&server);
    let mut sub = service.subscribe("volumes.*");

    let names: Vec<(String, String)> = (0..3)
        .map(|_| {
            let volume = service
                .mount_file_server(MountSpec::new("mem://files/team", "A", "Files"), None)
                .unwrap();
            (volume.name().to_string(), volume.label().to_string())
        })
        .collect();

    assert_eq!(
        names,
        vec![
            ("A".to_string(), "Files".to_string()),
            ("A1".to_string(), "Files (2)".to_string()),
            ("A2".to_string(), "Files (3)".to_string()),
        ]
    );

    let mounted: Vec<String> = sub
        .drain()
        .into_iter()
        .map(|msg| msg.payload.volume_name().unwrap_or_default().to_string())
        .collect();
    assert_eq!(mounted, vec!["A", "A1", "A2"]);
    service.terminate();
}

#[test]
fn test_mount_rejects_bad_arguments() {
    let server = team_server();
    let service = service_for(&server);

    assert!(matches!(
        service.mount_file_server(MountSpec::new("mem://files/team", "", "Label"), None),
        Err(WebFsError::InvalidArgument(_))
    ));
    assert!(matches!(
        service.mount_file_server(MountSpec::new("mem://files/team", "x", ""), None),
        Err(WebFsError::InvalidArgument(_))
    ));
    assert!(matches!(
        service.mount_file_server(MountSpec::new("not a url", "x", "X"), None),
        Err(WebFsError::InvalidUrl(_))
    ));
    assert!(matches!(
        service.mount_file_server(MountSpec::new("gopher://host/x", "x", "X"), None),
        Err(WebFsError::InvalidArgument(_))
    ));
    assert!(service.volumes().is_empty());
    service.terminate();
}

#[test]
fn test_mount_and_unmount_are_foreground_only() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);

    let (mount, unmount) = off_foreground(|| {
        (
            service.mount_file_server(MountSpec::new("mem://files/team", "b", "B"), None),
            service.unmount_file_server("share", false),
        )
    });
    assert!(matches!(mount, Err(WebFsError::WrongThread(_))));
    assert!(matches!(unmount, Err(WebFsError::WrongThread(_))));
    assert!(service.volumes().open_volume("share").is_some());

    assert!(matches!(
        service.unmount_file_server("ghost", false),
        Err(WebFsError::NotMounted(_))
    ));
    service.terminate();
}

#[test]
fn test_deferred_unmount() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);
    let mut sub = service.subscribe("volumes.unmounted");

    off_foreground(|| service.unmount_file_server("share", true)).unwrap();
    assert!(service.volumes().open_volume("share").is_some());

    assert_eq!(service.dispatch_deferred().unwrap(), 1);
    assert!(service.volumes().open_volume("share").is_none());
    assert_eq!(sub.try_recv().unwrap().payload.volume_name(), Some("share"));
    assert_eq!(service.dispatch_deferred().unwrap(), 0);
    service.terminate();
}

#[test]
fn test_remount_keeps_name_and_position() {
    let server = team_server();
    let service = service_for(&server);
    for name in ["a", "b", "c"] {
        let location = if name == "b" { "" } else { "mem://files/team" };
        service
            .mount_file_server(MountSpec::new(location, name, name.to_uppercase()), None)
            .unwrap();
    }
    assert!(!service.volumes().open_volume("b").unwrap().can_connect());
    let mut sub = service.subscribe("volumes.*");

    let volume = service
        .remount_file_server("b", None, Some("mem://files/team/docs"))
        .unwrap();
    assert_eq!(volume.name(), "b");
    assert_eq!(volume.label(), "B");
    assert!(volume.can_connect());
    assert_eq!(service.volumes().volume_position("b"), Some(1));

    // Listeners see a mount, never the unmount in between.
    let seen: Vec<WebFsFlow> = sub.drain().into_iter().map(|m| m.payload).collect();
    assert_eq!(seen.len(), 1);
    assert!(matches!(
        &seen[0],
        WebFsFlow::VolumesChanged { name, reason: VolumeChangeReason::Mounted } if name == "b"
    ));

    assert!(matches!(
        service.remount_file_server("ghost", None, None),
        Err(WebFsError::NotMounted(_))
    ));
    service.terminate();
}

#[test]
fn test_failed_remount_keeps_volume() {
    let server = team_server();
    let service = service_for(&server);
    for name in ["a", "b", "c"] {
        service
            .mount_file_server(MountSpec::new("mem://files/team", name, name.to_uppercase()), None)
            .unwrap();
    }
    let before = service.volumes().open_volume("b").unwrap();
    let mut sub = service.subscribe("volumes.*");

    assert!(matches!(
        service.remount_file_server("b", None, Some("not a url")),
        Err(WebFsError::InvalidUrl(_))
    ));
    assert!(matches!(
        service.remount_file_server("b", None, Some("ftp://elsewhere/")),
        Err(WebFsError::InvalidArgument(_))
    ));

    let after = service.volumes().open_volume("b").unwrap();
    assert!(std::sync::Arc::ptr_eq(&before, &after));
    assert_eq!(service.volumes().volume_position("b"), Some(1));
    assert!(sub.drain().is_empty());
    service.terminate();
}

#[test]
fn test_mount_configured() -> anyhow::Result<()> {
    let server = team_server();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("webfs.ron");
    std::fs::write(
        &path,
        r#"(
            max_attempts: 3,
            volumes: [
                (location: "mem://files/team", name: "share", label: "Share", kind: "webdav"),
                (location: "mem://files/team/docs", name: "docs", label: "Docs", hidden: true),
            ],
        )"#,
    )?;
    let config = WebFsConfig::load(&path)?;
    let service = common::service_with(config, &server);

    let volumes = service.mount_configured()?;
    let names: Vec<&str> = volumes.iter().map(|v| v.name()).collect();
    assert_eq!(names, vec!["share", "docs"]);
    assert_eq!(volumes[0].kind(), "webdav");
    assert!(volumes[1].is_hidden());
    assert_eq!(service.config().max_attempts, 3);
    service.terminate();
    Ok(())
}

// ============================================================================
// Translation
// ============================================================================

#[test]
fn test_url_translation() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);

    assert!(service.is_mounted("mem://files/team", None));
    assert!(!service.is_mounted("mem://files/other", None));
    assert!(!service.is_mounted("mem://files/team", Some(&webfs::Credentials::new("bob"))));

    let translated = service
        .translate_server_url("mem://files/team/docs/a%20b.txt", None)
        .unwrap();
    assert_eq!(translated, url("webfs://share/docs/a b.txt"));

    let full = service.translate_webfs_url(&url("webfs://share/docs/")).unwrap();
    assert_eq!(full.as_str(), "mem://files/team/docs/");
    assert!(service.translate_webfs_url(&url("webfs://ghost/")).is_none());
    service.terminate();
}

#[test]
fn test_server_handler_lookup() {
    let server = team_server();
    let service = service_for(&server);
    let handler: webfs::ServerHandler = std::sync::Arc::new(42u32);
    service
        .mount_file_server(MountSpec::new("mem://files/team", "share", "Share"), Some(handler))
        .unwrap();

    let found = service.open_handler(&url("webfs://share/docs/a.txt")).unwrap();
    assert_eq!(found.downcast_ref::<u32>(), Some(&42));
    assert!(service.open_handler(&url("webfs://ghost/")).is_none());
    service.terminate();
}

// ============================================================================
// Directory requests
// ============================================================================

#[tokio::test]
async fn test_request_then_list() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);

    assert_eq!(listing(&service, "webfs://share/"), None);
    fetch(&service, "webfs://share/").await.unwrap();
    assert_eq!(
        listing(&service, "webfs://share/"),
        Some(vec![
            "docs".to_string(),
            "empty".to_string(),
            "p".to_string(),
            "readme.md".to_string()
        ])
    );

    fetch(&service, "webfs://share/empty/").await.unwrap();
    assert_eq!(listing(&service, "webfs://share/empty/"), Some(vec![]));

    let item = service.open_file_item(&url("webfs://share/readme.md")).unwrap();
    assert_eq!(item.content_length, 10);
    service.terminate();
}

#[tokio::test]
async fn test_discard_then_list() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);
    fetch(&service, "webfs://share/").await.unwrap();

    let discarded = service
        .discard_directory(ObserverId::new(), &url("webfs://share/"))
        .unwrap()
        .completion()
        .await
        .unwrap()
        .unwrap();
    assert!(discarded);
    assert_eq!(listing(&service, "webfs://share/"), None);

    fetch(&service, "webfs://share/").await.unwrap();
    assert!(service.discard_directory_now(&url("webfs://share/")).unwrap());
    assert_eq!(listing(&service, "webfs://share/"), None);
    assert!(!service.discard_directory_now(&url("webfs://share/nowhere/")).unwrap());
    service.terminate();
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);

    fetch(&service, "webfs://share/").await.unwrap();
    fetch(&service, "webfs://share/docs/").await.unwrap();
    fetch(&service, "webfs://share/docs/").await.unwrap();
    assert_eq!(server.handshakes(), 1);
    assert_eq!(server.listings(), 3);
    service.terminate();
}

#[tokio::test]
async fn test_request_on_unknown_volume() {
    let server = team_server();
    let service = service_for(&server);

    let result = fetch(&service, "webfs://ghost/").await;
    assert!(matches!(result, Err(WebFsError::NotMounted(_))));
    service.terminate();
}

#[tokio::test]
async fn test_unreachable_server_fails_after_retry() {
    let server = team_server();
    server.set_reachable(false);
    let service = service_for(&server);
    mount_share(&service);

    let result = fetch(&service, "webfs://share/").await;
    assert!(matches!(result, Err(WebFsError::ConnectFailed(_))));
    assert_eq!(listing(&service, "webfs://share/"), None);

    server.set_reachable(true);
    fetch(&service, "webfs://share/").await.unwrap();
    assert!(listing(&service, "webfs://share/").is_some());
    service.terminate();
}

#[tokio::test]
async fn test_null_listing_retried_once() {
    let server = team_server();
    let flaky = FlakyRemote::new(&server);
    let service = WebFileService::new(WebFsConfig::default(), flaky.registry(&server)).unwrap();
    service
        .mount_file_server(MountSpec::new("flaky://files/team", "share", "Share"), None)
        .unwrap();

    flaky.fail_listings(1);
    fetch(&service, "webfs://share/").await.unwrap();
    assert_eq!(flaky.listing_calls(), 2);
    assert!(listing(&service, "webfs://share/").is_some());

    flaky.fail_listings(2);
    let result = fetch(&service, "webfs://share/docs/").await;
    assert!(matches!(result, Err(WebFsError::NoListing(_))));
    assert_eq!(flaky.listing_calls(), 4);
    assert_eq!(listing(&service, "webfs://share/docs/"), None);
    service.terminate();
}

#[tokio::test]
async fn test_single_attempt_config() {
    let server = team_server();
    let flaky = FlakyRemote::new(&server);
    let config = WebFsConfig {
        max_attempts: 1,
        ..Default::default()
    };
    let service = WebFileService::new(config, flaky.registry(&server)).unwrap();
    service
        .mount_file_server(MountSpec::new("flaky://files/team", "share", "Share"), None)
        .unwrap();

    flaky.fail_transiently(1);
    let result = fetch(&service, "webfs://share/").await;
    assert!(matches!(result, Err(WebFsError::Remote { transient: true, .. })));
    assert_eq!(flaky.listing_calls(), 1);
    service.terminate();
}

#[test]
fn test_inline_request_off_foreground() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);

    let on_foreground = block_on(service.request_directory_inline(&url("webfs://share/")));
    assert!(matches!(on_foreground, Err(WebFsError::WrongThread(_))));

    off_foreground(|| block_on(service.request_directory_inline(&url("webfs://share/docs/"))))
        .unwrap();
    assert_eq!(
        listing(&service, "webfs://share/docs/"),
        Some(vec!["notes.txt".to_string(), "old".to_string()])
    );
    service.terminate();
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancelled_request_never_completes() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);

    let (gate, release) = Gate::new();
    let holder = ObserverId::new();
    let gated = service
        .schedule_task(holder, &url("webfs://share/"), gate)
        .unwrap();

    let observer = ObserverId::new();
    let pending = service
        .request_directory(observer, &url("webfs://share/"))
        .unwrap();
    assert_eq!(service.cancel_operation(observer), 1);
    assert_eq!(service.cancel_operation(observer), 0);

    release.send(()).unwrap();
    assert!(gated.completion().await.unwrap().is_ok());
    assert!(pending.completion().await.is_none());
    assert_eq!(listing(&service, "webfs://share/"), None);
    service.terminate();
}

// ============================================================================
// Operations
// ============================================================================

#[tokio::test]
async fn test_sibling_move_notifies_parent_once() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);
    fetch(&service, "webfs://share/p/").await.unwrap();
    let mut sub = service.subscribe("directory.changed");

    service
        .root()
        .move_file(ObserverId::new(), &url("webfs://share/p/x/"), &url("webfs://share/p/y/"))
        .unwrap()
        .completion()
        .await
        .unwrap()
        .unwrap();

    let changed: Vec<String> = sub
        .drain()
        .into_iter()
        .filter_map(|m| m.payload.url().map(|u| u.to_string()))
        .collect();
    assert_eq!(changed, vec!["webfs://share/p/"]);
    assert!(server.exists("/team/p/y"));
    assert!(!server.exists("/team/p/x"));

    // The old listing stays readable until the folder is fetched again.
    assert_eq!(listing(&service, "webfs://share/p/"), Some(vec!["x".to_string()]));
    fetch(&service, "webfs://share/p/").await.unwrap();
    assert_eq!(listing(&service, "webfs://share/p/"), Some(vec!["y".to_string()]));
    service.terminate();
}

#[tokio::test]
async fn test_move_between_folders_notifies_both() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);
    let mut sub = service.subscribe("directory.changed");

    service
        .root()
        .move_file(
            ObserverId::new(),
            &url("webfs://share/docs/notes.txt"),
            &url("webfs://share/empty/notes.txt"),
        )
        .unwrap()
        .completion()
        .await
        .unwrap()
        .unwrap();

    let changed: Vec<String> = sub
        .drain()
        .into_iter()
        .filter_map(|m| m.payload.url().map(|u| u.to_string()))
        .collect();
    assert_eq!(changed, vec!["webfs://share/docs/", "webfs://share/empty/"]);
    assert!(server.exists("/team/empty/notes.txt"));
    service.terminate();
}

#[tokio::test]
async fn test_create_and_remove() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);
    let root = service.root();

    root.create_folder(ObserverId::new(), &url("webfs://share/new/"))
        .unwrap()
        .completion()
        .await
        .unwrap()
        .unwrap();
    assert!(server.exists("/team/new"));

    root.remove_file(ObserverId::new(), &url("webfs://share/readme.md"))
        .unwrap()
        .completion()
        .await
        .unwrap()
        .unwrap();
    assert!(!server.exists("/team/readme.md"));

    // Failures from the backend are not retried unless recoverable.
    let result = root
        .create_folder(ObserverId::new(), &url("webfs://share/new/"))
        .unwrap()
        .completion()
        .await
        .unwrap();
    assert!(matches!(result, Err(WebFsError::Remote { transient: false, .. })));
    service.terminate();
}

#[tokio::test]
async fn test_transient_task_failure_retried() {
    let server = team_server();
    let flaky = FlakyRemote::new(&server);
    let service = WebFileService::new(WebFsConfig::default(), flaky.registry(&server)).unwrap();
    service
        .mount_file_server(MountSpec::new("flaky://files/team", "share", "Share"), None)
        .unwrap();

    flaky.fail_transiently(1);
    service
        .schedule_task(
            ObserverId::new(),
            &url("webfs://share/made/"),
            std::sync::Arc::new(Operation::CreateFolder),
        )
        .unwrap()
        .completion()
        .await
        .unwrap()
        .unwrap();
    assert!(server.exists("/team/made"));
    service.terminate();
}

#[tokio::test]
async fn test_directory_changed_action() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);
    let mut sub = service.subscribe("directory.changed");

    let action = service.create_directory_changed_action(&url("webfs://share/docs/upload.bin"));
    assert_eq!(action.folder(), &url("webfs://share/docs/"));
    assert!(!action.on_transfer_state(TransferState::Failed));
    assert!(action.on_transfer_state(TransferState::Completed));
    assert_eq!(
        sub.recv().await.unwrap().payload.url(),
        Some(&url("webfs://share/docs/"))
    );
    service.terminate();
}

// ============================================================================
// Sessions and search
// ============================================================================

#[test]
fn test_open_session_uses_own_connection() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);

    let on_foreground = block_on(service.open_session(&url("webfs://share/docs/")));
    assert!(matches!(on_foreground, Err(WebFsError::WrongThread(_))));

    let session =
        off_foreground(|| block_on(service.open_session(&url("webfs://share/docs/")))).unwrap();
    assert_eq!(session.remote_path(), "/team/docs/");
    assert!(session.client().is_connected());
    assert_eq!(server.handshakes(), 1);

    // The volume's own client is untouched.
    let volume = service.volumes().open_volume("share").unwrap();
    assert!(!volume.client().unwrap().is_connected());

    let client = std::sync::Arc::clone(session.client());
    block_on(session.close());
    assert!(!client.is_connected());
    service.terminate();
}

#[tokio::test]
async fn test_search_by_traversal() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);

    let searcher = webfs::FileSearcher::new(url("webfs://share/"), webfs::SearchQuery::contains("NOTES"));
    let results = service
        .search(ObserverId::new(), searcher)
        .unwrap()
        .completion()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        results,
        vec![
            url("webfs://share/docs/notes.txt"),
            url("webfs://share/docs/old/notes-2019.txt")
        ]
    );
    assert!(service.open_file_item(&results[1]).is_some());
    service.terminate();
}

#[tokio::test]
async fn test_search_on_server() {
    let server = team_server();
    server.enable_search(true);
    let service = service_for(&server);
    mount_share(&service);

    let searcher = webfs::FileSearcher::new(url("webfs://share/"), webfs::SearchQuery::contains("old"));
    let results = service
        .search(ObserverId::new(), searcher)
        .unwrap()
        .completion()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(results, vec![url("webfs://share/docs/old/")]);
    assert_eq!(server.listings(), 0);
    assert!(service.root().file_info(&results[0]).unwrap().directory);
    service.terminate();
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_unmount_disconnects_on_worker() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);
    service
        .request_directory(ObserverId::new(), &url("webfs://share/"))
        .unwrap()
        .blocking_completion()
        .unwrap()
        .unwrap();

    let volume = service.volumes().open_volume("share").unwrap();
    assert!(volume.client().unwrap().is_connected());
    service.unmount_file_server("share", false).unwrap();

    // Terminate drains the queue, including the disconnect.
    service.terminate();
    assert!(!volume.client().unwrap().is_connected());
}

#[test]
fn test_terminate() {
    let server = team_server();
    let service = service_for(&server);
    mount_share(&service);
    let mut sub = service.subscribe("volumes.changed");

    service.terminate();
    assert!(!service.is_running());
    assert!(service.volumes().is_empty());
    assert!(sub.try_recv().is_some());

    assert!(matches!(
        service.request_directory(ObserverId::new(), &url("webfs://share/")),
        Err(WebFsError::Terminated)
    ));
    assert!(matches!(
        service.mount_file_server(MountSpec::new("mem://files/team", "x", "X"), None),
        Err(WebFsError::Terminated)
    ));
    // A second terminate is a no-op.
    service.terminate();
}
