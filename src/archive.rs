//! Archiver - bundles a working tree into a zip
//!
//! Entries are added in file-name order with a fixed timestamp and mode, so
//! identical trees produce identical archives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::hashing::sha256_hex;
use crate::layout::remove_path;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot create archive {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot walk working tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("cannot add entry {entry}: {source}")]
    AddEntry {
        entry: String,
        #[source]
        source: ZipError,
    },

    #[error("cannot finish archive {}: {source}", path.display())]
    Finish {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("cannot read archive {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("archive entries {actual:?} do not match expected {expected:?}")]
    EntryMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Deflated => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        }
    }
}

/// One archive entry as seen by a consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntrySummary {
    pub name: String,
    pub size: u64,
    pub sha256: String,
}

/// Archive every regular file under `base_path` into `archive_path`.
///
/// Overwrites an existing archive. Returns the entry names in the order they
/// were written. On failure the partial archive is removed.
pub fn create_archive(
    base_path: &Path,
    archive_path: &Path,
    compression: Compression,
) -> Result<Vec<String>, ArchiveError> {
    let result = write_archive(base_path, archive_path, compression);
    if result.is_err() {
        if let Err(e) = remove_path(archive_path) {
            warn!(
                "Failed to remove partial archive {}: {}",
                archive_path.display(),
                e
            );
        }
    }
    result
}

fn write_archive(
    base_path: &Path,
    archive_path: &Path,
    compression: Compression,
) -> Result<Vec<String>, ArchiveError> {
    let file = File::create(archive_path).map_err(|source| ArchiveError::Create {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(file);
    let mut entries = Vec::new();

    for entry in WalkDir::new(base_path).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.path() == archive_path {
            continue;
        }

        let name = entry_name(base_path, entry.path());
        zip.start_file(name.as_str(), entry_options(compression))
            .map_err(|source| ArchiveError::AddEntry {
                entry: name.clone(),
                source,
            })?;

        let copied = File::open(entry.path()).and_then(|mut src| io::copy(&mut src, &mut zip));
        if let Err(e) = copied {
            return Err(ArchiveError::AddEntry {
                entry: name,
                source: ZipError::Io(e),
            });
        }

        debug!("Archived {}", name);
        entries.push(name);
    }

    zip.finish().map_err(|source| ArchiveError::Finish {
        path: archive_path.to_path_buf(),
        source,
    })?;

    Ok(entries)
}

fn entry_options(compression: Compression) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(compression.method())
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Path of `path` relative to `base`, `/`-joined, without leading separators.
fn entry_name(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn open(archive_path: &Path) -> Result<ZipArchive<File>, ArchiveError> {
    let read_error = |source| ArchiveError::Read {
        path: archive_path.to_path_buf(),
        source,
    };
    let file = File::open(archive_path).map_err(|e| read_error(ZipError::Io(e)))?;
    ZipArchive::new(file).map_err(read_error)
}

/// Names of all file entries, sorted.
pub fn list_entries(archive_path: &Path) -> Result<Vec<String>, ArchiveError> {
    let archive = open(archive_path)?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(str::to_string)
        .collect();
    names.sort();
    Ok(names)
}

/// Entry name -> contents for every file entry.
pub fn read_entries(archive_path: &Path) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let mut archive = open(archive_path)?;
    let read_error = |source| ArchiveError::Read {
        path: archive_path.to_path_buf(),
        source,
    };

    let mut entries = BTreeMap::new();
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(read_error)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| read_error(ZipError::Io(e)))?;
        entries.insert(name, contents);
    }
    Ok(entries)
}

/// Sizes and digests of every file entry.
pub fn summarize(archive_path: &Path) -> Result<Vec<EntrySummary>, ArchiveError> {
    Ok(read_entries(archive_path)?
        .into_iter()
        .map(|(name, contents)| EntrySummary {
            size: contents.len() as u64,
            sha256: sha256_hex(&contents),
            name,
        })
        .collect())
}

/// Check that the archive holds exactly `expected` file entries.
pub fn verify_entries(archive_path: &Path, expected: &[&str]) -> Result<(), ArchiveError> {
    let actual = list_entries(archive_path)?;
    let mut expected: Vec<String> = expected.iter().map(|e| e.to_string()).collect();
    expected.sort();

    if actual == expected {
        Ok(())
    } else {
        Err(ArchiveError::EntryMismatch { expected, actual })
    }
}
