//! Container codec
//!
//! A container (`.rr`) is a ZIP archive with exactly three members:
//!
//! - `manifest.json` - format name, version and creation time (deflated)
//! - `document.pdf` - the source document, stored byte-for-byte (no compression)
//! - `data.sqlite` - the annotation database (deflated)
//!
//! The codec moves containers to and from a working directory. It never
//! re-encodes the source document, and it never writes a container in place:
//! new archives are assembled in a temporary sibling and renamed over the
//! destination.

pub mod atomic;

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::META_TITLE;
use crate::storage::{AnnotationStore, StorageError};

use self::atomic::{write_atomically, Placement};

/// Archive member holding the manifest
pub const MANIFEST_ENTRY: &str = "manifest.json";
/// Archive member holding the source document
pub const DOCUMENT_ENTRY: &str = "document.pdf";
/// Archive member holding the annotation database
pub const DATABASE_ENTRY: &str = "data.sqlite";

/// Format name recorded in every manifest
pub const FORMAT_NAME: &str = "research-reader";
/// Format version written by this build
pub const FORMAT_VERSION: &str = "1.0.0";

/// File extension of containers
pub const CONTAINER_EXTENSION: &str = "rr";
/// File extension of importable source documents
pub const SOURCE_EXTENSION: &str = "pdf";

const WORK_DIR_PREFIX: &str = "rr-session-";

/// What a path handed to `open` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// An existing or to-be-opened container
    Container,
    /// A bare source document to import
    SourceDocument,
}

impl PathKind {
    /// Classify a path by extension (case-insensitive)
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            CONTAINER_EXTENSION => Some(PathKind::Container),
            SOURCE_EXTENSION => Some(PathKind::SourceDocument),
            _ => None,
        }
    }
}

/// Container path used when importing `source`
pub fn container_path_for(source: &Path) -> PathBuf {
    source.with_extension(CONTAINER_EXTENSION)
}

/// Manifest stored in every container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Semantic version of the container layout
    pub version: String,
    /// Always `research-reader`
    pub format: String,
    /// When the container was first created
    pub created_at: DateTime<Utc>,
    /// Fields added by newer minor versions, written back unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// A manifest for a container created now
    pub fn new() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            format: FORMAT_NAME.to_string(),
            created_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Major component of `version`, if it parses
    pub fn major_version(&self) -> Option<u64> {
        self.version.split('.').next()?.trim().parse().ok()
    }

    /// Parse and validate a manifest read from `path`
    fn parse(path: &Path, bytes: &[u8]) -> EngineResult<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::malformed(path, format!("invalid manifest: {}", e)))?;

        if manifest.format != FORMAT_NAME {
            return Err(EngineError::malformed(
                path,
                format!("unexpected format '{}'", manifest.format),
            ));
        }

        let major = manifest.major_version().ok_or_else(|| {
            EngineError::malformed(path, format!("invalid version '{}'", manifest.version))
        })?;
        if major > supported_major() {
            return Err(EngineError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: manifest.version.clone(),
                supported: FORMAT_VERSION.to_string(),
            });
        }

        Ok(manifest)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

fn supported_major() -> u64 {
    FORMAT_VERSION
        .split('.')
        .next()
        .and_then(|m| m.parse().ok())
        .unwrap_or(1)
}

/// An unpacked container on disk
///
/// The working directory belongs to this value alone. It is removed by
/// `ContainerCodec::cleanup`, or when the value is dropped.
#[derive(Debug)]
pub struct WorkingSet {
    dir: Option<TempDir>,
    root: PathBuf,
    manifest: Manifest,
}

impl WorkingSet {
    fn new(dir: TempDir, manifest: Manifest) -> Self {
        let root = dir.path().to_path_buf();
        Self {
            dir: Some(dir),
            root,
            manifest,
        }
    }

    /// Manifest the container was unpacked with
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Working directory
    pub fn dir(&self) -> &Path {
        &self.root
    }

    /// Extracted source document
    pub fn document_path(&self) -> PathBuf {
        self.root.join(DOCUMENT_ENTRY)
    }

    /// Extracted annotation database
    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_ENTRY)
    }

    /// Whether `cleanup` already ran
    pub fn is_cleaned_up(&self) -> bool {
        self.dir.is_none()
    }
}

/// Packs and unpacks containers
#[derive(Debug, Clone)]
pub struct ContainerCodec {
    work_root: PathBuf,
}

impl ContainerCodec {
    /// Create a codec that places working directories under `work_root`
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
        }
    }

    /// Create a codec from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.work_dir.clone())
    }

    /// Directory working sets are created in
    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Extract a container into a fresh working directory
    pub fn unpack(&self, archive_path: &Path) -> EngineResult<WorkingSet> {
        let file = File::open(archive_path)
            .map_err(|e| StorageError::from_read(e, archive_path.to_path_buf()))?;
        let mut archive = ZipArchive::new(file).map_err(|e| {
            EngineError::malformed(archive_path, format!("not a readable archive: {}", e))
        })?;

        for member in [MANIFEST_ENTRY, DOCUMENT_ENTRY, DATABASE_ENTRY] {
            if archive.index_for_name(member).is_none() {
                return Err(EngineError::malformed(
                    archive_path,
                    format!("missing member '{}'", member),
                ));
            }
        }

        let mut manifest_bytes = Vec::new();
        copy_member(&mut archive, archive_path, MANIFEST_ENTRY, &mut manifest_bytes)?;
        let manifest = Manifest::parse(archive_path, &manifest_bytes)?;

        let dir = self.create_working_dir()?;
        let working_set = WorkingSet::new(dir, manifest);

        extract_member(
            &mut archive,
            archive_path,
            DOCUMENT_ENTRY,
            &working_set.document_path(),
        )?;
        extract_member(
            &mut archive,
            archive_path,
            DATABASE_ENTRY,
            &working_set.database_path(),
        )?;

        debug!(
            archive = %archive_path.display(),
            work_dir = %working_set.dir().display(),
            "container unpacked"
        );
        Ok(working_set)
    }

    /// Create a container next to a bare source document
    ///
    /// Returns the new container's path. Fails with `DestinationExists`
    /// rather than replacing a container that is already there.
    pub fn import_raw_document(&self, source_path: &Path) -> EngineResult<PathBuf> {
        let archive_path = container_path_for(source_path);
        if archive_path.exists() {
            return Err(EngineError::DestinationExists { path: archive_path });
        }

        let mut staging = WorkingSet::new(self.create_working_dir()?, Manifest::new());

        fs::copy(source_path, staging.document_path())
            .map_err(|e| StorageError::from_read(e, source_path.to_path_buf()))?;

        let store = AnnotationStore::open(&staging.database_path())?;
        if let Some(stem) = source_path.file_stem().and_then(|s| s.to_str()) {
            store.set_metadata(META_TITLE, stem)?;
        }
        store.close()?;

        write_container(&staging, &archive_path, Placement::NoClobber)?;

        if let Err(err) = self.cleanup(&mut staging) {
            warn!(error = %err, "failed to remove import staging directory");
        }

        info!(
            source = %source_path.display(),
            archive = %archive_path.display(),
            "source document imported"
        );
        Ok(archive_path)
    }

    /// Write the working set to `destination`, replacing it atomically
    pub fn pack(&self, working_set: &WorkingSet, destination: &Path) -> EngineResult<()> {
        write_container(working_set, destination, Placement::Replace)?;
        debug!(archive = %destination.display(), "container packed");
        Ok(())
    }

    /// Remove a working directory; safe to call more than once
    pub fn cleanup(&self, working_set: &mut WorkingSet) -> EngineResult<()> {
        let Some(dir) = working_set.dir.take() else {
            return Ok(());
        };

        match dir.close() {
            Ok(()) => {
                debug!(work_dir = %working_set.root.display(), "working directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(e, working_set.root.clone()).into()),
        }
    }

    fn create_working_dir(&self) -> EngineResult<TempDir> {
        fs::create_dir_all(&self.work_root)
            .map_err(|e| StorageError::from_io(e, self.work_root.clone()))?;

        tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(&self.work_root)
            .map_err(|e| StorageError::from_io(e, self.work_root.clone()).into())
    }
}

/// Assemble a container from a working set and place it at `destination`
fn write_container(
    working_set: &WorkingSet,
    destination: &Path,
    placement: Placement,
) -> EngineResult<()> {
    let manifest_json =
        serde_json::to_vec_pretty(working_set.manifest()).map_err(StorageError::from)?;
    let document_path = working_set.document_path();
    let database_path = working_set.database_path();

    let document_len = fs::metadata(&document_path)
        .map_err(|e| StorageError::from_read(e, document_path.clone()))?
        .len();

    write_atomically(destination, placement, |file| {
        let archive_err = |e: ZipError| zip_write_error(e, destination);

        let stored = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(document_len >= u64::from(u32::MAX));

        let mut zip = ZipWriter::new(file);

        zip.start_file(MANIFEST_ENTRY, deflated())
            .map_err(archive_err)?;
        zip.write_all(&manifest_json)
            .map_err(|e| StorageError::from_io(e, destination.to_path_buf()))?;

        zip.start_file(DOCUMENT_ENTRY, stored).map_err(archive_err)?;
        append_file(&mut zip, &document_path, destination)?;

        zip.start_file(DATABASE_ENTRY, deflated())
            .map_err(archive_err)?;
        append_file(&mut zip, &database_path, destination)?;

        zip.finish().map_err(archive_err)?;
        Ok(())
    })
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Stream a file into the current archive member
fn append_file<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    source: &Path,
    destination: &Path,
) -> EngineResult<()> {
    let mut input =
        File::open(source).map_err(|e| StorageError::from_read(e, source.to_path_buf()))?;
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = input
            .read(&mut buffer)
            .map_err(|e| StorageError::from_read(e, source.to_path_buf()))?;
        if n == 0 {
            return Ok(());
        }
        zip.write_all(&buffer[..n])
            .map_err(|e| StorageError::from_io(e, destination.to_path_buf()))?;
    }
}

fn zip_write_error(err: ZipError, destination: &Path) -> EngineError {
    match err {
        ZipError::Io(e) => StorageError::from_io(e, destination.to_path_buf()).into(),
        other => StorageError::Archive {
            path: destination.to_path_buf(),
            details: other.to_string(),
        }
        .into(),
    }
}

/// Read one member into `out`
fn copy_member<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
    member: &str,
    out: &mut impl Write,
) -> EngineResult<()> {
    let mut entry = archive.by_name(member).map_err(|e| {
        EngineError::malformed(archive_path, format!("unreadable member '{}': {}", member, e))
    })?;

    io::copy(&mut entry, out).map_err(|e| match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            EngineError::malformed(archive_path, format!("corrupt member '{}': {}", member, e))
        }
        _ => StorageError::from_io(e, archive_path.to_path_buf()).into(),
    })?;
    Ok(())
}

/// Extract one member to `target`
fn extract_member<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
    member: &str,
    target: &Path,
) -> EngineResult<()> {
    let mut out =
        File::create(target).map_err(|e| StorageError::from_io(e, target.to_path_buf()))?;
    copy_member(archive, archive_path, member, &mut out)?;
    out.sync_all()
        .map_err(|e| StorageError::from_io(e, target.to_path_buf()))?;
    Ok(())
}
