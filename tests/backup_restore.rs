//! End-to-end backup and restore behaviour

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use appstate_backup::archive::ArchiveContents;
use appstate_backup::crypto::KeyDerivationParams;
use appstate_backup::{
    BackupError, BackupManager, BackupOptions, BackupPaths, BackupRecord, BackupSettings,
    ComponentKind, LiveLayout, RestoreManager, RestoreOptions, RestoreStatus,
};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use walkdir::WalkDir;

const PASSPHRASE: &str = "integration-test-passphrase";

/// Low Argon2 costs so each key derivation is fast
fn fast_key_params() -> KeyDerivationParams {
    KeyDerivationParams::with_values(KeyDerivationParams::generate().salt, 8, 1, 1)
}

struct TestEnv {
    _temp: TempDir,
    paths: BackupPaths,
    backups: BackupManager,
    restores: RestoreManager,
}

impl TestEnv {
    fn app(&self, relative: &str) -> PathBuf {
        self.paths.layout().resolve(relative)
    }
}

fn create_test_app(root: &Path) {
    let write = |rel: &str, data: &[u8]| {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    };

    write("prisma/dev.db", b"SQLite format 3\0original rows");
    write("prisma/migrations/0001_init/migration.sql", b"CREATE TABLE users (id INTEGER);");
    write(".env", b"DATABASE_URL=file:./dev.db\nSECRET=original");
    write("package.json", br#"{"name":"app"}"#);
    write("cache/pages/index.html", b"<html>cached</html>");
    write("public/logo.svg", b"<svg/>");
    write("uploads/avatars/alice.png", &[0x89, b'P', b'N', b'G', 0, 1, 2, 3]);
    write("uploads/report.pdf", b"%PDF-1.7 original");
}

fn create_test_env() -> TestEnv {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("app");
    create_test_app(&root);

    let paths = BackupPaths::with_base_dir(temp.path().join("state"), LiveLayout::with_app_root(root));
    let settings = BackupSettings::default()
        .with_key_params(fast_key_params())
        .with_encryption_key(PASSPHRASE);
    let backups = BackupManager::new(paths.clone(), settings);
    let restores = RestoreManager::new(backups.clone());

    TestEnv {
        _temp: temp,
        paths,
        backups,
        restores,
    }
}

/// Every regular file under `dir`, keyed by relative path
fn snapshot_tree(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap().to_path_buf();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

fn mutate_live_state(env: &TestEnv) {
    std::fs::write(env.app("prisma/dev.db"), b"SQLite format 3\0changed rows").unwrap();
    std::fs::write(env.app(".env"), b"SECRET=changed").unwrap();
    std::fs::write(env.app("cache/pages/index.html"), b"<html>stale</html>").unwrap();
    std::fs::write(env.app("uploads/report.pdf"), b"%PDF-1.7 changed").unwrap();
    std::fs::remove_file(env.app("uploads/avatars/alice.png")).unwrap();
}

#[tokio::test]
async fn test_round_trip_every_compress_encrypt_combination() {
    for (compress, encrypt) in [(true, true), (true, false), (false, true), (false, false)] {
        let env = create_test_env();
        let root = env.paths.layout().app_root.clone();
        let original = snapshot_tree(&root);

        let backup = env
            .backups
            .create(
                BackupOptions::full("admin")
                    .with_compression(compress)
                    .with_encryption(encrypt),
            )
            .await
            .unwrap();
        assert_eq!(backup.compressed, compress);
        assert_eq!(backup.encrypted, encrypt);

        mutate_live_state(&env);

        let restore = env
            .restores
            .create(RestoreOptions::new(&backup.id, "admin").with_overwrite(true))
            .await
            .unwrap();

        assert_eq!(restore.status, RestoreStatus::Completed, "compress={} encrypt={}", compress, encrypt);
        assert!(restore.results.iter().all(|r| r.success));
        assert_eq!(snapshot_tree(&root), original, "compress={} encrypt={}", compress, encrypt);
    }
}

#[tokio::test]
async fn test_component_checksums_independent_of_encryption() {
    let env = create_test_env();

    let plain = env
        .backups
        .create(BackupOptions::partial(vec![ComponentKind::Database], "admin"))
        .await
        .unwrap();
    let encrypted = env
        .backups
        .create(BackupOptions::partial(vec![ComponentKind::Database], "admin").with_encryption(true))
        .await
        .unwrap();

    assert_eq!(plain.components, encrypted.components);
    assert_ne!(plain.checksum, encrypted.checksum);
}

#[tokio::test]
async fn test_tampered_archive_is_rejected_before_extraction() {
    let env = create_test_env();
    let backup = env.backups.create(BackupOptions::full("admin")).await.unwrap();

    let archive = env.paths.archive_file(&backup.name);
    let mut bytes = std::fs::read(&archive).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    std::fs::write(&archive, bytes).unwrap();

    mutate_live_state(&env);
    let before = snapshot_tree(&env.paths.layout().app_root);

    let err = env
        .restores
        .create(RestoreOptions::new(&backup.id, "admin").with_overwrite(true))
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::ChecksumMismatch { .. }));

    let record = &env.restores.list().await.unwrap()[0];
    assert_eq!(record.status, RestoreStatus::Failed);
    assert!(!record.validated);
    assert!(record.completed_at.is_some());
    assert_eq!(snapshot_tree(&env.paths.layout().app_root), before);
}

#[tokio::test]
async fn test_wrong_key_fails_without_touching_live_state() {
    let env = create_test_env();
    let backup = env
        .backups
        .create(BackupOptions::full("admin").with_encryption(true))
        .await
        .unwrap();

    let same_salt = env.backups.settings().key_params.clone().unwrap();
    let other_key = BackupManager::new(
        env.paths.clone(),
        BackupSettings::default()
            .with_key_params(same_salt)
            .with_encryption_key("a different passphrase"),
    );
    let restores = RestoreManager::new(other_key);

    mutate_live_state(&env);
    let before = snapshot_tree(&env.paths.layout().app_root);

    let err = restores
        .create(RestoreOptions::new(&backup.id, "admin").with_overwrite(true))
        .await
        .unwrap_err();
    assert!(err.is_decryption());

    let record = &restores.list().await.unwrap()[0];
    assert_eq!(record.status, RestoreStatus::Failed);
    assert!(record.error_message.as_deref().unwrap().contains("Decryption failed"));
    assert_eq!(snapshot_tree(&env.paths.layout().app_root), before);
}

#[tokio::test]
async fn test_component_failure_is_isolated_and_can_be_rolled_back() {
    let env = create_test_env();
    let backup = env.backups.create(BackupOptions::full("admin")).await.unwrap();

    // A directory where the config restore wants to write a file
    std::fs::remove_file(env.app(".env")).unwrap();
    std::fs::create_dir_all(env.app(".env")).unwrap();
    std::fs::write(env.app("uploads/report.pdf"), b"%PDF-1.7 edited after backup").unwrap();

    let restore = env
        .restores
        .create(RestoreOptions::new(&backup.id, "admin").with_overwrite(true))
        .await
        .unwrap();

    assert_eq!(restore.status, RestoreStatus::Failed);
    assert_eq!(
        restore.error_message.as_deref(),
        Some("Failed to restore components: config")
    );
    assert_eq!(restore.results.len(), 4);
    let files = restore
        .results
        .iter()
        .find(|r| r.component == ComponentKind::Files)
        .unwrap();
    assert!(files.success);
    assert_eq!(std::fs::read(env.app("uploads/report.pdf")).unwrap(), b"%PDF-1.7 original");

    let rolled_back = env.restores.rollback(&restore.id, "admin").await.unwrap();
    assert_eq!(rolled_back.status, RestoreStatus::RolledBack);
    assert!(rolled_back.rollback_performed);
    assert_eq!(
        std::fs::read(env.app("uploads/report.pdf")).unwrap(),
        b"%PDF-1.7 edited after backup"
    );
    assert!(!env.paths.rollback_dir().join(&restore.id).exists());

    let err = env.restores.rollback(&restore.id, "admin").await.unwrap_err();
    assert!(matches!(err, BackupError::InvalidState(_)));
}

#[tokio::test]
async fn test_overwrite_false_keeps_existing_files() {
    let env = create_test_env();
    let backup = env
        .backups
        .create(BackupOptions::partial(vec![ComponentKind::Files], "admin"))
        .await
        .unwrap();

    std::fs::write(env.app("uploads/report.pdf"), b"local edit").unwrap();
    std::fs::remove_file(env.app("uploads/avatars/alice.png")).unwrap();

    let restore = env
        .restores
        .create(RestoreOptions::new(&backup.id, "admin"))
        .await
        .unwrap();
    assert_eq!(restore.status, RestoreStatus::Completed);
    assert_eq!(std::fs::read(env.app("uploads/report.pdf")).unwrap(), b"local edit");
    assert!(env.app("uploads/avatars/alice.png").exists());

    let restore = env
        .restores
        .create(RestoreOptions::new(&backup.id, "admin").with_overwrite(true))
        .await
        .unwrap();
    assert_eq!(restore.status, RestoreStatus::Completed);
    assert_eq!(std::fs::read(env.app("uploads/report.pdf")).unwrap(), b"%PDF-1.7 original");
}

/// Rewrite a sidecar so its retention ended yesterday
fn expire_backup(env: &TestEnv, name: &str, auto_delete: bool) {
    let sidecar = env.paths.sidecar_file(name);
    let mut json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&sidecar).unwrap()).unwrap();
    json["retention"]["keepUntil"] =
        serde_json::Value::String((Utc::now() - Duration::days(1)).to_rfc3339());
    json["retention"]["autoDelete"] = serde_json::Value::Bool(auto_delete);
    std::fs::write(&sidecar, serde_json::to_vec_pretty(&json).unwrap()).unwrap();
}

async fn create_named_backups(env: &TestEnv, names: &[&str]) -> Vec<BackupRecord> {
    let mut records = Vec::new();
    for name in names {
        let record = env
            .backups
            .create(BackupOptions::partial(vec![ComponentKind::Config], "admin").with_name(*name))
            .await
            .unwrap();
        records.push(record);
    }
    records
}

#[tokio::test]
async fn test_retention_sweep_keeps_expired_backup_without_auto_delete() {
    let env = create_test_env();
    let records = create_named_backups(&env, &["old-a", "old-b", "pinned"]).await;

    expire_backup(&env, "old-a", true);
    expire_backup(&env, "old-b", true);
    expire_backup(&env, "pinned", false);

    assert_eq!(env.backups.cleanup().await.unwrap(), 2);

    for record in &records[..2] {
        assert!(!env.paths.archive_file(&record.name).exists());
        assert!(!env.paths.sidecar_file(&record.name).exists());
    }
    assert!(env.paths.archive_file("pinned").exists());
    assert!(env.paths.sidecar_file("pinned").exists());

    let remaining = env.backups.list().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, records[2].id);
}

#[tokio::test]
async fn test_retention_sweep_continues_after_failed_delete() {
    let env = create_test_env();
    let records = create_named_backups(&env, &["stuck", "eligible"]).await;

    expire_backup(&env, "stuck", true);
    expire_backup(&env, "eligible", true);

    // A non-empty directory where the archive file should be cannot be unlinked
    let stuck = env.paths.archive_file("stuck");
    std::fs::remove_file(&stuck).unwrap();
    std::fs::create_dir_all(&stuck).unwrap();
    std::fs::write(stuck.join("keep"), b"x").unwrap();

    assert_eq!(env.backups.cleanup().await.unwrap(), 1);

    assert!(!env.paths.archive_file("eligible").exists());
    assert!(!env.paths.sidecar_file("eligible").exists());
    assert!(env.backups.get(&records[1].id).await.unwrap().is_none());

    // The sidecar goes first, so the half-deleted backup is no longer listed
    assert!(stuck.is_dir());
    assert!(!env.paths.sidecar_file("stuck").exists());
    assert!(env.backups.get(&records[0].id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_retention_sweep_removes_only_expired() {
    let env = create_test_env();

    let records = create_named_backups(&env, &["expired-a", "expired-b", "current"]).await;

    for record in &records[..2] {
        expire_backup(&env, &record.name, true);
    }

    assert_eq!(env.backups.cleanup().await.unwrap(), 2);

    for record in &records[..2] {
        assert!(!env.paths.archive_file(&record.name).exists());
        assert!(!env.paths.sidecar_file(&record.name).exists());
    }
    let remaining = env.backups.list().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "current");

    assert_eq!(env.backups.cleanup().await.unwrap(), 0);
}

#[tokio::test]
async fn test_validate_only_writes_nothing_outside_restore_records() {
    let env = create_test_env();
    let backup = env
        .backups
        .create(BackupOptions::full("admin").with_encryption(true))
        .await
        .unwrap();

    mutate_live_state(&env);
    let app_before = snapshot_tree(&env.paths.layout().app_root);
    let archives_before = snapshot_tree(&env.paths.archive_dir());

    let restore = env
        .restores
        .create(RestoreOptions::new(&backup.id, "admin").validate_only())
        .await
        .unwrap();

    assert_eq!(restore.status, RestoreStatus::Completed);
    assert!(restore.validated);
    assert!(restore.completed_at.is_some());
    assert!(restore.results.is_empty());
    assert!(restore.restore_path.is_none());

    assert_eq!(snapshot_tree(&env.paths.layout().app_root), app_before);
    assert_eq!(snapshot_tree(&env.paths.archive_dir()), archives_before);
    assert!(!env.paths.scratch_dir().exists());
    assert!(!env.paths.rollback_dir().exists());
}

#[tokio::test]
async fn test_partial_database_and_files_backup() {
    let env = create_test_env();
    let backup = env
        .backups
        .create(BackupOptions::partial(
            vec![ComponentKind::Database, ComponentKind::Files],
            "admin",
        ))
        .await
        .unwrap();

    assert_eq!(
        backup.component_kinds(),
        vec![ComponentKind::Database, ComponentKind::Files]
    );

    let (_, bytes) = env.backups.read_archive(&backup.id).await.unwrap();
    let contents = ArchiveContents::parse(bytes).unwrap();
    assert_eq!(
        contents.entry_names(),
        &[
            "database.db".to_string(),
            "files.zip".to_string(),
            "metadata.json".to_string()
        ]
    );

    let err = env
        .restores
        .create(RestoreOptions::new(&backup.id, "admin").with_components(vec![ComponentKind::Config]))
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_listing_skips_corrupt_sidecars() {
    let env = create_test_env();
    env.backups
        .create(BackupOptions::full("admin").with_name("good"))
        .await
        .unwrap();

    std::fs::write(env.paths.archive_dir().join("broken.metadata.json"), b"{ not json").unwrap();

    let listed = env.backups.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "good");
}

#[tokio::test]
async fn test_imported_archive_can_be_restored() {
    let env = create_test_env();
    let backup = env
        .backups
        .create(BackupOptions::full("admin").with_encryption(true))
        .await
        .unwrap();
    let (_, bytes) = env.backups.read_archive(&backup.id).await.unwrap();
    env.backups.delete(&backup.id).await.unwrap();

    let imported = env
        .backups
        .import_archive("weekly.backup", bytes, "operator")
        .await
        .unwrap();

    mutate_live_state(&env);
    let restore = env
        .restores
        .create(RestoreOptions::new(&imported.id, "operator").with_overwrite(true))
        .await
        .unwrap();

    assert_eq!(restore.status, RestoreStatus::Completed);
    assert_eq!(std::fs::read(env.app(".env")).unwrap(), b"DATABASE_URL=file:./dev.db\nSECRET=original");
}

#[tokio::test]
async fn test_concurrent_backups_of_disjoint_components() {
    let env = create_test_env();

    let (a, b) = tokio::join!(
        env.backups
            .create(BackupOptions::partial(vec![ComponentKind::Database], "admin").with_name("db-only")),
        env.backups
            .create(BackupOptions::partial(vec![ComponentKind::Files], "admin").with_name("files-only")),
    );

    assert!(a.unwrap().is_completed());
    assert!(b.unwrap().is_completed());
    assert_eq!(env.backups.list().await.unwrap().len(), 2);
}
