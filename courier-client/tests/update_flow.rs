//! End-to-end update flows against a real registry daemon

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use courier_client::{UpdateReport, Updater};
use courier_net::{Connection, Dispatcher, Listener};
use courier_protocol::{BuildRecord, BuildStatus, ManifestEntry, Version};
use courier_server::{register_commands, ReleaseStore};
use courier_utils::{checksum, CourierError, ErrorKind};

const TIMEOUT: Duration = Duration::from_secs(5);

fn seed_version(root: &Path, version: &str, status: BuildStatus, files: &[(&str, &[u8])]) {
    let dir = root.join(version);
    let mut entries = Vec::new();
    for (rel, content) in files {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        entries.push(ManifestEntry {
            path: rel.to_string(),
            size: content.len() as u64,
            checksum: checksum::bytes_checksum(content),
        });
    }
    let mut record = BuildRecord::draft(Version::parse(version).unwrap(), "linux".into(), entries);
    record.status = status;
    fs::write(
        dir.join("status.json"),
        serde_json::to_string_pretty(&record).unwrap(),
    )
    .unwrap();
}

async fn start_registry(root: &Path) -> (String, broadcast::Sender<()>) {
    let store = Arc::new(ReleaseStore::open(root).unwrap());
    let dispatcher = Dispatcher::new();
    register_commands(&dispatcher, store, 8 * 1024).unwrap();

    let listener = Listener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().to_string();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(listener.run(dispatcher, shutdown_rx));
    (addr, shutdown_tx)
}

async fn updater_for(addr: &str, local: &str, staging_root: &Path) -> Updater {
    let conn = Connection::connect(addr, Dispatcher::new()).await.unwrap();
    Updater::new(
        conn,
        Version::parse(local).unwrap(),
        staging_root,
        TIMEOUT,
    )
}

#[tokio::test]
async fn test_full_update_skips_draft_and_stages_approved() {
    let releases = tempfile::tempdir().unwrap();
    seed_version(
        releases.path(),
        "0.9.0",
        BuildStatus::Draft,
        &[("bin/agent", b"draft build")],
    );
    seed_version(
        releases.path(),
        "1.0.0",
        BuildStatus::Approved,
        &[
            ("bin/agent", b"release build".as_slice()),
            ("lib/module_1.bin", b"module one"),
            ("notes.txt", b"hello"),
        ],
    );

    let (addr, _shutdown) = start_registry(releases.path()).await;
    let staging = tempfile::tempdir().unwrap();
    let updater = updater_for(&addr, "0.8.0", staging.path()).await;

    // The draft 0.9.0 never appears, even though it is newer than 0.8.0
    assert_eq!(
        updater.available_versions().await.unwrap(),
        vec![Version::new(1, 0, 0)]
    );

    let report = updater.update().await.unwrap();
    let outcome = match report {
        UpdateReport::Updated(outcome) => outcome,
        other => panic!("expected staged update, got {other:?}"),
    };
    assert_eq!(outcome.new_version, Version::new(1, 0, 0));
    assert_eq!(outcome.staging_path, staging.path().join("1.0.0"));

    // Directory layout survives, contents byte-exact
    assert_eq!(
        fs::read(outcome.staging_path.join("bin/agent")).unwrap(),
        b"release build"
    );
    assert_eq!(
        fs::read(outcome.staging_path.join("lib/module_1.bin")).unwrap(),
        b"module one"
    );
    assert_eq!(
        fs::read(outcome.staging_path.join("notes.txt")).unwrap(),
        b"hello"
    );
}

#[tokio::test]
async fn test_up_to_date_transfers_nothing() {
    let releases = tempfile::tempdir().unwrap();
    seed_version(
        releases.path(),
        "1.0.0",
        BuildStatus::Approved,
        &[("bin/agent", b"x")],
    );

    let (addr, _shutdown) = start_registry(releases.path()).await;
    let staging = tempfile::tempdir().unwrap();

    // Same version
    let updater = updater_for(&addr, "1.0.0", staging.path()).await;
    assert_eq!(updater.update().await.unwrap(), UpdateReport::UpToDate);

    // Local is ahead of the registry
    let updater = updater_for(&addr, "2.0.0", staging.path()).await;
    assert_eq!(updater.update().await.unwrap(), UpdateReport::UpToDate);

    assert!(!staging.path().join("1.0.0").exists());
}

#[tokio::test]
async fn test_empty_registry_is_up_to_date() {
    let releases = tempfile::tempdir().unwrap();
    let (addr, _shutdown) = start_registry(releases.path()).await;
    let staging = tempfile::tempdir().unwrap();

    let updater = updater_for(&addr, "1.0.0", staging.path()).await;
    assert_eq!(updater.check().await.unwrap(), None);
    assert_eq!(updater.update().await.unwrap(), UpdateReport::UpToDate);
}

#[tokio::test]
async fn test_corrupted_file_aborts_and_cleans_staging() {
    let releases = tempfile::tempdir().unwrap();
    seed_version(
        releases.path(),
        "1.1.0",
        BuildStatus::Approved,
        &[("ok.bin", b"fine".as_slice()), ("bad.bin", b"original")],
    );
    // Corrupt one artifact after the record was written, so its stored
    // checksum no longer matches what the server streams.
    fs::write(releases.path().join("1.1.0").join("bad.bin"), b"tampered").unwrap();

    let (addr, _shutdown) = start_registry(releases.path()).await;
    let staging = tempfile::tempdir().unwrap();
    let updater = updater_for(&addr, "1.0.0", staging.path()).await;

    let err = updater.update().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);

    // Nothing is left behind, including files fetched before the failure
    assert!(!staging.path().join("1.1.0").exists());
}

#[tokio::test]
async fn test_pre_release_is_older_than_final() {
    let releases = tempfile::tempdir().unwrap();
    seed_version(
        releases.path(),
        "2.0.0-rc.1",
        BuildStatus::Approved,
        &[("a", b"x")],
    );

    let (addr, _shutdown) = start_registry(releases.path()).await;
    let staging = tempfile::tempdir().unwrap();

    // A 2.0.0 install is already past the release candidate
    let updater = updater_for(&addr, "2.0.0", staging.path()).await;
    assert_eq!(updater.check().await.unwrap(), None);

    // A 1.x install should move to it
    let updater = updater_for(&addr, "1.9.0", staging.path()).await;
    assert_eq!(
        updater.check().await.unwrap(),
        Some(Version::parse("2.0.0-rc.1").unwrap())
    );
}

#[tokio::test]
async fn test_explicit_download_of_unapproved_is_refused() {
    let releases = tempfile::tempdir().unwrap();
    seed_version(
        releases.path(),
        "0.9.0",
        BuildStatus::Draft,
        &[("a", b"x")],
    );

    let (addr, _shutdown) = start_registry(releases.path()).await;
    let staging = tempfile::tempdir().unwrap();
    let updater = updater_for(&addr, "0.1.0", staging.path()).await;

    let err = updater
        .download(&Version::parse("0.9.0").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::NotApproved(_)));
    assert!(!staging.path().join("0.9.0").exists());
}
