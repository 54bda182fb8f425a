//! Archive container codec
//!
//! Backups are zip containers. The outer archive holds one entry per captured
//! component (`database.db`, `config.zip`, `cache.zip`, `files.zip`) plus a
//! `metadata.json` entry with the serialized [`BackupRecord`]. The config,
//! cache and files payloads are themselves nested zip archives whose entry
//! names are paths relative to the application root.
//!
//! Everything here is synchronous and operates on in-memory buffers; callers
//! run it on the blocking pool.

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{BackupError, BackupResult};
use crate::models::{BackupRecord, ComponentKind};

/// Name of the entry holding the serialized backup record
pub const METADATA_ENTRY: &str = "metadata.json";

/// Largest decompressed entry read when the caller sets no limit (500 MiB)
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 500 * 1024 * 1024;

fn file_options(compress: bool) -> SimpleFileOptions {
    let method = if compress {
        CompressionMethod::Deflated
    } else {
        CompressionMethod::Stored
    };
    SimpleFileOptions::default().compression_method(method)
}

/// Build a zip archive from `(entry name, bytes)` pairs
pub fn build_archive<'a, I>(entries: I, compress: bool) -> BackupResult<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let options = file_options(compress);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, data) in entries {
        writer
            .start_file(name, options)
            .map_err(|e| BackupError::Archive(format!("Failed to add {}: {}", name, e)))?;
        writer
            .write_all(data)
            .map_err(|e| BackupError::Archive(format!("Failed to write {}: {}", name, e)))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| BackupError::Archive(format!("Failed to finish archive: {}", e)))?;
    Ok(cursor.into_inner())
}

/// Build a nested component archive from owned `(entry name, bytes)` pairs
pub fn build_nested(files: &[(String, Vec<u8>)], compress: bool) -> BackupResult<Vec<u8>> {
    build_archive(
        files.iter().map(|(name, data)| (name.as_str(), data.as_slice())),
        compress,
    )
}

/// Assemble the outer backup archive
///
/// `components` are `(kind, payload)` pairs in archive order; `metadata` is
/// embedded as `metadata.json` after them.
pub fn assemble(
    components: &[(ComponentKind, &[u8])],
    metadata: &BackupRecord,
    compress: bool,
) -> BackupResult<Vec<u8>> {
    let metadata_json = serde_json::to_vec_pretty(metadata)?;

    let entries = components
        .iter()
        .map(|(kind, data)| (kind.archive_entry(), *data))
        .chain(std::iter::once((METADATA_ENTRY, metadata_json.as_slice())));

    build_archive(entries, compress)
}

/// Convert a relative path into a zip entry name with forward slashes
pub fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read an entry without trusting its declared size
///
/// At most `limit` bytes are accepted; anything longer is a structural error.
fn read_limited<R: Read>(reader: R, name: &str, limit: u64) -> BackupResult<Vec<u8>> {
    let mut data = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut data)
        .map_err(|e| BackupError::ArchiveStructure(format!("Corrupt entry {}: {}", name, e)))?;

    if data.len() as u64 > limit {
        return Err(BackupError::ArchiveStructure(format!(
            "Entry {} exceeds {} bytes",
            name, limit
        )));
    }
    Ok(data)
}

/// A parsed (plaintext) backup archive
pub struct ArchiveContents {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    names: Vec<String>,
    max_entry_bytes: u64,
}

impl ArchiveContents {
    /// Parse an archive buffer
    ///
    /// Unparsable data and archives without entries are structural errors.
    pub fn parse(bytes: Vec<u8>) -> BackupResult<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            BackupError::ArchiveStructure(format!("Invalid backup archive format: {}", e))
        })?;

        if archive.len() == 0 {
            return Err(BackupError::ArchiveStructure(
                "Backup archive is empty".to_string(),
            ));
        }

        let names = archive.file_names().map(str::to_string).collect();

        Ok(Self {
            archive,
            names,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        })
    }

    /// Cap the decompressed size of any single entry
    pub fn with_entry_limit(mut self, max_entry_bytes: u64) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    /// Parse and require the entries every backup archive carries
    pub fn parse_validated(bytes: Vec<u8>) -> BackupResult<Self> {
        let contents = Self::parse(bytes)?;
        contents.validate_structure()?;
        Ok(contents)
    }

    /// Check that the archive carries a metadata entry
    pub fn validate_structure(&self) -> BackupResult<()> {
        if !self.contains(METADATA_ENTRY) {
            return Err(BackupError::ArchiveStructure(format!(
                "Missing {} in backup",
                METADATA_ENTRY
            )));
        }
        Ok(())
    }

    /// Entry names in archive order
    pub fn entry_names(&self) -> &[String] {
        &self.names
    }

    /// Check if an entry exists
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Components present in the archive, in archive order
    pub fn components(&self) -> Vec<ComponentKind> {
        ComponentKind::ALL
            .into_iter()
            .filter(|k| self.contains(k.archive_entry()))
            .collect()
    }

    /// Read one entry fully
    pub fn read_entry(&mut self, name: &str) -> BackupResult<Vec<u8>> {
        let mut file = self.archive.by_name(name).map_err(|e| {
            BackupError::ArchiveStructure(format!("Cannot read entry {}: {}", name, e))
        })?;

        read_limited(&mut file, name, self.max_entry_bytes)
    }

    /// Deserialize the embedded backup record
    pub fn read_metadata(&mut self) -> BackupResult<BackupRecord> {
        let data = self.read_entry(METADATA_ENTRY)?;
        serde_json::from_slice(&data).map_err(|e| {
            BackupError::ArchiveStructure(format!("Invalid {}: {}", METADATA_ENTRY, e))
        })
    }

    /// Write every top-level entry into `dir`
    ///
    /// Returns the paths written. Entry names containing path separators are
    /// rejected; the outer archive only ever has flat names.
    pub fn extract_to(&mut self, dir: &Path) -> BackupResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .map_err(|e| BackupError::Io(format!("Failed to create {}: {}", dir.display(), e)))?;

        let mut written = Vec::with_capacity(self.names.len());
        for name in self.names.clone() {
            if name.contains('/') || name.contains('\\') || name == ".." {
                return Err(BackupError::ArchiveStructure(format!(
                    "Unexpected entry in backup: {}",
                    name
                )));
            }
            let data = self.read_entry(&name)?;
            let target = dir.join(&name);
            std::fs::write(&target, data).map_err(|e| {
                BackupError::Io(format!("Failed to extract {}: {}", target.display(), e))
            })?;
            written.push(target);
        }

        Ok(written)
    }
}

/// One regular file inside a nested component archive
#[derive(Debug, Clone)]
pub struct NestedEntry {
    /// Entry name as stored
    pub name: String,
    /// Sanitized path relative to the application root
    pub relative: PathBuf,
    pub data: Vec<u8>,
}

/// Read every regular-file entry of a nested archive
///
/// Entries whose names would escape the restore root, or that decompress to
/// more than `max_entry_bytes`, are rejected.
pub fn nested_entries(bytes: Vec<u8>, max_entry_bytes: u64) -> BackupResult<Vec<NestedEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| BackupError::ArchiveStructure(format!("Invalid nested archive: {}", e)))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let relative = file.enclosed_name().ok_or_else(|| {
            BackupError::ArchiveStructure(format!("Unsafe entry path in nested archive: {}", name))
        })?;

        let data = read_limited(&mut file, &name, max_entry_bytes)?;

        entries.push(NestedEntry {
            name,
            relative,
            data,
        });
    }

    Ok(entries)
}
