//! Path management for the backup subsystem
//!
//! Two groups of paths are configured here: the backup subsystem's own
//! directories (archives, scratch space, restore records, rollback snapshots)
//! and the [`LiveLayout`] describing where the live application state is read
//! from during backup and written to during restore.
//!
//! ## Path Resolution Order
//!
//! 1. `APPSTATE_BACKUP_DIR` environment variable (if set)
//! 2. The current working directory

use std::path::{Path, PathBuf};

use crate::error::BackupError;
use crate::models::ComponentKind;

/// Default database location, relative to the application root
const DEFAULT_DATABASE_FILE: &str = "prisma/dev.db";

/// Configuration files captured by the config component
const DEFAULT_CONFIG_FILES: &[&str] = &[".env", "email-config.json", "next.config.ts", "package.json"];

/// Directories captured by the cache component
const DEFAULT_CACHE_DIRS: &[&str] = &["cache", "prisma/migrations"];

/// Directories captured by the files component
const DEFAULT_FILE_DIRS: &[&str] = &["public", "uploads"];

/// Where the live application state lives
///
/// All relative paths are resolved against `app_root`. Archive entry names
/// for config, cache and files components are paths relative to `app_root`,
/// so a restore writes each entry back to `app_root.join(entry)`.
#[derive(Debug, Clone)]
pub struct LiveLayout {
    /// Root directory of the application
    pub app_root: PathBuf,
    /// Database backing file
    pub database_file: PathBuf,
    /// Individual configuration files
    pub config_files: Vec<PathBuf>,
    /// Cache directories, walked recursively
    pub cache_dirs: Vec<PathBuf>,
    /// User file directories, walked recursively
    pub file_dirs: Vec<PathBuf>,
}

impl LiveLayout {
    /// Create a layout with the default file set rooted at `app_root`
    pub fn with_app_root(app_root: PathBuf) -> Self {
        Self {
            app_root,
            database_file: PathBuf::from(DEFAULT_DATABASE_FILE),
            config_files: DEFAULT_CONFIG_FILES.iter().map(PathBuf::from).collect(),
            cache_dirs: DEFAULT_CACHE_DIRS.iter().map(PathBuf::from).collect(),
            file_dirs: DEFAULT_FILE_DIRS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Create the default layout, honouring a `DATABASE_URL` of the form `file:<path>`
    pub fn from_env(app_root: PathBuf) -> Self {
        let mut layout = Self::with_app_root(app_root);
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if let Some(path) = url.strip_prefix("file:") {
                layout.database_file = PathBuf::from(path);
            }
        }
        layout
    }

    /// Absolute path of the live database file
    pub fn database_path(&self) -> PathBuf {
        self.app_root.join(&self.database_file)
    }

    /// Resolve a path relative to the application root
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.app_root.join(relative)
    }

    /// The directories walked for an archive-based component
    pub fn dirs_for(&self, kind: ComponentKind) -> &[PathBuf] {
        match kind {
            ComponentKind::Cache => &self.cache_dirs,
            ComponentKind::Files => &self.file_dirs,
            ComponentKind::Database | ComponentKind::Config => &[],
        }
    }
}

/// Manages all paths used by the backup subsystem
#[derive(Debug, Clone)]
pub struct BackupPaths {
    /// Base directory for archives, scratch space and records
    base_dir: PathBuf,
    /// Live application layout
    layout: LiveLayout,
}

impl BackupPaths {
    /// Create a new BackupPaths instance
    ///
    /// The base directory is `APPSTATE_BACKUP_DIR` when set, otherwise the
    /// current directory. The live layout is rooted at the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self, BackupError> {
        let cwd = std::env::current_dir()
            .map_err(|e| BackupError::Config(format!("Could not determine current directory: {}", e)))?;

        let base_dir = match std::env::var("APPSTATE_BACKUP_DIR") {
            Ok(custom) => PathBuf::from(custom),
            Err(_) => cwd.clone(),
        };

        Ok(Self {
            base_dir,
            layout: LiveLayout::from_env(cwd),
        })
    }

    /// Create BackupPaths with explicit directories (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf, layout: LiveLayout) -> Self {
        Self { base_dir, layout }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the live application layout
    pub fn layout(&self) -> &LiveLayout {
        &self.layout
    }

    /// Directory holding `<name>.backup` archives and their sidecars
    pub fn archive_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Scratch directory for transient extraction, empty at rest
    pub fn scratch_dir(&self) -> PathBuf {
        self.base_dir.join("temp")
    }

    /// Directory holding one `<restoreId>.json` record per restore attempt
    pub fn restore_dir(&self) -> PathBuf {
        self.base_dir.join("restore")
    }

    /// Directory holding pre-restore snapshots used by rollback
    pub fn rollback_dir(&self) -> PathBuf {
        self.base_dir.join("rollback")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("backup-settings.json")
    }

    /// Path of the archive file for a backup name
    pub fn archive_file(&self, name: &str) -> PathBuf {
        self.archive_dir().join(format!("{}.backup", name))
    }

    /// Path of the sidecar metadata file for a backup name
    pub fn sidecar_file(&self, name: &str) -> PathBuf {
        self.archive_dir().join(format!("{}.metadata.json", name))
    }
}
