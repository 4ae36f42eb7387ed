//! Session manager
//!
//! Owns the single active session: the container it came from, its working
//! directory and the attached annotation store. Every call takes one lock
//! for its whole duration, so operations are totally ordered and a save
//! never interleaves with an open.
//!
//! ## States
//!
//! - `Closed` - nothing on disk besides containers
//! - `Open` - one working directory and one database handle
//!
//! ## Usage
//!
//! ```ignore
//! let sessions = SessionManager::new(&Config::load()?);
//! let info = sessions.open(Path::new("paper.pdf"))?;  // imports, then opens paper.rr
//! sessions.create_annotation(&NewAnnotation::bookmark(3))?;
//! sessions.save()?;
//! sessions.close();
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::container::{ContainerCodec, PathKind, WorkingSet};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Annotation, AnnotationPatch, DocumentInfo, NewAnnotation, META_LAST_PAGE, META_PAGE_COUNT,
    META_TITLE,
};
use crate::storage::{AnnotationStore, StorageError};

/// An open document
///
/// Fields drop in order, so the database closes before its directory goes
struct Session {
    archive_path: PathBuf,
    store: AnnotationStore,
    working_set: WorkingSet,
}

impl Session {
    fn info(&self) -> EngineResult<DocumentInfo> {
        let number = |key: &str| -> EngineResult<Option<u32>> {
            Ok(self
                .store
                .get_metadata(key)?
                .and_then(|value| value.trim().parse().ok()))
        };

        Ok(DocumentInfo {
            archive_path: self.archive_path.clone(),
            source_path: self.working_set.document_path(),
            title: self.store.get_metadata(META_TITLE)?,
            page_count: number(META_PAGE_COUNT)?,
            last_page: number(META_LAST_PAGE)?,
        })
    }
}

enum SessionState {
    Closed,
    Open(Session),
}

/// Serializes all access to the active session
pub struct SessionManager {
    codec: ContainerCodec,
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Create a manager whose working directories live under `config.work_dir`
    pub fn new(config: &Config) -> Self {
        Self::with_codec(ContainerCodec::from_config(config))
    }

    /// Create a manager around an existing codec
    pub fn with_codec(codec: ContainerCodec) -> Self {
        Self {
            codec,
            state: Mutex::new(SessionState::Closed),
        }
    }

    /// Codec used for unpacking and packing
    pub fn codec(&self) -> &ContainerCodec {
        &self.codec
    }

    /// Whether a document is open
    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), SessionState::Open(_))
    }

    // ==================== Transitions ====================

    /// Open a container, or import and open a bare source document
    ///
    /// Any session that is already open is closed first, exactly as `close`
    /// would: its working set is packed back into its own container
    /// (best-effort, failures logged) before its directory is removed. On
    /// failure the manager is left closed with no working directory on disk.
    pub fn open(&self, path: &Path) -> EngineResult<DocumentInfo> {
        let mut state = self.lock();

        if let SessionState::Open(previous) = std::mem::replace(&mut *state, SessionState::Closed)
        {
            self.retire(previous, true);
        }

        let (session, info) = self
            .start(path)
            .map_err(|err| EngineError::open_failed(path, err))?;

        info!(
            archive = %session.archive_path.display(),
            work_dir = %session.working_set.dir().display(),
            "document opened"
        );
        *state = SessionState::Open(session);
        Ok(info)
    }

    /// Write the open session back to the container it came from
    ///
    /// On failure the container on disk and the session are both unchanged,
    /// so the call can simply be retried.
    pub fn save(&self) -> EngineResult<()> {
        let state = self.lock();
        let session = open_session(&state)?;

        session.store.flush()?;
        self.codec
            .pack(&session.working_set, &session.archive_path)?;

        info!(archive = %session.archive_path.display(), "document saved");
        Ok(())
    }

    /// Persist what can be persisted, then release the session
    ///
    /// Never fails. Problems while saving or removing the working directory
    /// are logged and the manager still ends up closed.
    pub fn close(&self) {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SessionState::Closed) {
            SessionState::Open(session) => self.retire(session, true),
            SessionState::Closed => debug!("close requested with no open document"),
        }
    }

    /// Release the session without writing anything back to its container
    ///
    /// Changes made since the last `save` are dropped.
    pub fn close_without_saving(&self) {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SessionState::Closed) {
            SessionState::Open(session) => self.retire(session, false),
            SessionState::Closed => debug!("close requested with no open document"),
        }
    }

    // ==================== Document ====================

    /// Summary of the open document
    pub fn document_info(&self) -> EngineResult<DocumentInfo> {
        let state = self.lock();
        open_session(&state)?.info()
    }

    /// Full content of the unpacked source document
    pub fn read_source_bytes(&self) -> EngineResult<Vec<u8>> {
        let state = self.lock();
        let path = open_session(&state)?.working_set.document_path();
        fs::read(&path).map_err(|e| StorageError::from_read(e, path).into())
    }

    /// Path of the open session's working directory
    pub fn working_dir(&self) -> Option<PathBuf> {
        match &*self.lock() {
            SessionState::Open(session) => Some(session.working_set.dir().to_path_buf()),
            SessionState::Closed => None,
        }
    }

    // ==================== Annotations ====================

    /// List annotations, optionally only those on `page`
    pub fn list_annotations(&self, page: Option<u32>) -> EngineResult<Vec<Annotation>> {
        let state = self.lock();
        Ok(open_session(&state)?.store.list(page)?)
    }

    /// Create an annotation
    pub fn create_annotation(&self, input: &NewAnnotation) -> EngineResult<Annotation> {
        let state = self.lock();
        Ok(open_session(&state)?.store.create(input)?)
    }

    /// Apply a partial update; `false` when no annotation has that id
    pub fn update_annotation(&self, id: &str, patch: &AnnotationPatch) -> EngineResult<bool> {
        let state = self.lock();
        Ok(open_session(&state)?.store.update(id, patch)?)
    }

    /// Delete an annotation; `false` when no annotation has that id
    pub fn delete_annotation(&self, id: &str) -> EngineResult<bool> {
        let state = self.lock();
        Ok(open_session(&state)?.store.delete(id)?)
    }

    // ==================== Metadata ====================

    pub fn set_metadata(&self, key: &str, value: &str) -> EngineResult<()> {
        let state = self.lock();
        Ok(open_session(&state)?.store.set_metadata(key, value)?)
    }

    pub fn get_metadata(&self, key: &str) -> EngineResult<Option<String>> {
        let state = self.lock();
        Ok(open_session(&state)?.store.get_metadata(key)?)
    }

    // ==================== Internals ====================

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("session lock was poisoned by a panicking caller; continuing");
            poisoned.into_inner()
        })
    }

    /// Build a session for `path` without touching the current state
    fn start(&self, path: &Path) -> EngineResult<(Session, DocumentInfo)> {
        let archive_path = match PathKind::of(path) {
            Some(PathKind::Container) => path.to_path_buf(),
            Some(PathKind::SourceDocument) => self.codec.import_raw_document(path)?,
            None => {
                return Err(EngineError::UnsupportedFileType {
                    path: path.to_path_buf(),
                })
            }
        };

        let mut working_set = self.codec.unpack(&archive_path)?;

        let store = match AnnotationStore::open(&working_set.database_path()) {
            Ok(store) => store,
            Err(err) => {
                self.discard(&mut working_set);
                return Err(err.into());
            }
        };

        let session = Session {
            archive_path,
            store,
            working_set,
        };
        match session.info() {
            Ok(info) => Ok((session, info)),
            Err(err) => {
                let Session {
                    mut working_set,
                    store,
                    ..
                } = session;
                if let Err(close_err) = store.close() {
                    warn!(error = %close_err, "failed to close database of abandoned session");
                }
                self.discard(&mut working_set);
                Err(err)
            }
        }
    }

    /// Teardown, preceded by a best-effort save when `persist` is set
    fn retire(&self, session: Session, persist: bool) {
        let Session {
            archive_path,
            mut working_set,
            store,
        } = session;

        if persist {
            let saved = store
                .flush()
                .map_err(EngineError::from)
                .and_then(|()| self.codec.pack(&working_set, &archive_path));
            if let Err(err) = saved {
                warn!(
                    archive = %archive_path.display(),
                    error = %err,
                    "failed to save document while closing; unsaved changes are lost"
                );
            }
        }

        if let Err(err) = store.close() {
            warn!(error = %err, "failed to close annotation database");
        }
        self.discard(&mut working_set);

        info!(archive = %archive_path.display(), "document closed");
    }

    fn discard(&self, working_set: &mut WorkingSet) {
        if let Err(err) = self.codec.cleanup(working_set) {
            warn!(
                work_dir = %working_set.dir().display(),
                error = %err,
                "failed to remove working directory"
            );
        }
    }
}

fn open_session<'a>(state: &'a MutexGuard<'_, SessionState>) -> EngineResult<&'a Session> {
    match &**state {
        SessionState::Open(session) => Ok(session),
        SessionState::Closed => Err(EngineError::NoOpenSession),
    }
}
