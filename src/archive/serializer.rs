//! Component serializers
//!
//! Each serializer captures one component of the live application state as a
//! byte payload. The database is captured as its raw backing file; config,
//! cache and files are captured as nested zip archives whose entry names are
//! paths relative to the application root.

use std::path::{Path, PathBuf};

use tokio::fs;
use walkdir::WalkDir;

use super::codec::{build_nested, entry_name};
use crate::config::LiveLayout;
use crate::crypto::checksum;
use crate::error::{BackupError, BackupResult};
use crate::models::{ComponentKind, ComponentRecord};

/// A captured component payload
#[derive(Debug, Clone)]
pub struct SerializedComponent {
    pub kind: ComponentKind,
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`
    pub checksum: String,
    pub size: u64,
}

impl SerializedComponent {
    fn new(kind: ComponentKind, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            checksum: checksum(&bytes),
            size: bytes.len() as u64,
            bytes,
        }
    }

    /// The integrity record stored in the backup metadata
    pub fn record(&self) -> ComponentRecord {
        ComponentRecord {
            name: self.kind.as_str().to_string(),
            kind: self.kind,
            size: self.size,
            checksum: self.checksum.clone(),
        }
    }
}

/// Capture one component from the live layout
pub async fn serialize(
    kind: ComponentKind,
    layout: &LiveLayout,
    compress: bool,
) -> BackupResult<SerializedComponent> {
    let component = match kind {
        ComponentKind::Database => serialize_database(layout).await?,
        ComponentKind::Config => serialize_config(layout, compress).await?,
        ComponentKind::Cache | ComponentKind::Files => {
            serialize_directories(kind, layout, compress).await?
        }
    };

    tracing::debug!(
        component = %kind,
        size = component.size,
        "Component serialized"
    );

    Ok(component)
}

async fn serialize_database(layout: &LiveLayout) -> BackupResult<SerializedComponent> {
    let path = layout.database_path();
    let bytes = fs::read(&path).await.map_err(|e| {
        BackupError::component_serialization(
            ComponentKind::Database.as_str(),
            format!("Failed to read {}: {}", path.display(), e),
        )
    })?;

    Ok(SerializedComponent::new(ComponentKind::Database, bytes))
}

async fn serialize_config(layout: &LiveLayout, compress: bool) -> BackupResult<SerializedComponent> {
    let mut files = Vec::with_capacity(layout.config_files.len());

    for relative in &layout.config_files {
        if relative.is_absolute() {
            tracing::warn!(path = %relative.display(), "Config path is not relative to the app root, skipping");
            continue;
        }

        let path = layout.resolve(relative);
        match fs::read(&path).await {
            Ok(bytes) => files.push((entry_name(relative), bytes)),
            Err(e) => {
                tracing::warn!(
                    component = "config",
                    path = %path.display(),
                    error = %e,
                    "Config file not captured"
                );
            }
        }
    }

    let bytes = tokio::task::spawn_blocking(move || build_nested(&files, compress))
        .await?
        .map_err(|e| {
            BackupError::component_serialization(ComponentKind::Config.as_str(), e.to_string())
        })?;

    Ok(SerializedComponent::new(ComponentKind::Config, bytes))
}

async fn serialize_directories(
    kind: ComponentKind,
    layout: &LiveLayout,
    compress: bool,
) -> BackupResult<SerializedComponent> {
    let app_root = layout.app_root.clone();
    let dirs = layout.dirs_for(kind).to_vec();

    let bytes = tokio::task::spawn_blocking(move || {
        let files = collect_dir_files(kind, &app_root, &dirs)?;
        build_nested(&files, compress)
    })
    .await?
    .map_err(|e| match e {
        BackupError::ComponentSerialization { .. } => e,
        other => BackupError::component_serialization(kind.as_str(), other.to_string()),
    })?;

    Ok(SerializedComponent::new(kind, bytes))
}

/// Walk every directory and read its regular files
///
/// Runs on the blocking pool. Missing directories are skipped.
fn collect_dir_files(
    kind: ComponentKind,
    app_root: &Path,
    dirs: &[PathBuf],
) -> BackupResult<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();

    for dir in dirs {
        let full = app_root.join(dir);
        if !full.is_dir() {
            tracing::warn!(component = %kind, path = %full.display(), "Directory not found, skipping");
            continue;
        }

        for entry in WalkDir::new(&full).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                BackupError::component_serialization(
                    kind.as_str(),
                    format!("Failed to walk {}: {}", full.display(), e),
                )
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(app_root).map_err(|e| {
                BackupError::component_serialization(
                    kind.as_str(),
                    format!("Failed to compute relative path for {}: {}", path.display(), e),
                )
            })?;

            let bytes = std::fs::read(path).map_err(|e| {
                BackupError::component_serialization(
                    kind.as_str(),
                    format!("Failed to read {}: {}", path.display(), e),
                )
            })?;

            files.push((entry_name(relative), bytes));
        }
    }

    Ok(files)
}
