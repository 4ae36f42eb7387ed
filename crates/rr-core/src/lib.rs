//! research-reader core library
//!
//! Keeps a source document (PDF) and everything a reader adds to it in one
//! portable `.rr` container, and manages the single document a reader has
//! open at a time.
//!
//! # Architecture
//!
//! - **Annotation store**: SQLite database of highlights, notes, bookmarks
//!   and document metadata
//! - **Container codec**: ZIP archive holding `manifest.json`,
//!   `document.pdf` and `data.sqlite`, written atomically
//! - **Session manager**: the one open document, behind one lock
//! - **Command surface**: the calls a presentation layer makes
//!
//! # Quick Start
//!
//! ```text
//! let commands = Commands::new(&Config::load()?);
//!
//! let info = commands.open_file("attention.pdf")?;   // creates attention.rr
//! commands.create_annotation(&NewAnnotation::note(3, "check eq. 2"))?;
//! commands.save_file()?;
//! commands.close_file();
//! ```
//!
//! # Modules
//!
//! - `commands`: Command surface and JSON dispatch (main entry point)
//! - `session`: Session manager
//! - `container`: Container codec
//! - `storage`: Annotation store and persistence errors
//! - `models`: Annotations, positions and document summaries
//! - `config`: Application configuration

pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;

pub use commands::{
    CommandError, CommandResult, Commands, CreateAnnotationInput, ErrorKind, Request, Response,
    UpdateAnnotationInput,
};
pub use config::Config;
pub use container::{ContainerCodec, Manifest, PathKind, WorkingSet};
pub use error::{EngineError, EngineResult};
pub use models::{
    Annotation, AnnotationPatch, AnnotationType, DocumentInfo, NewAnnotation, PositionData, Rect,
};
pub use session::SessionManager;
pub use storage::{AnnotationStore, StorageError, StorageResult};
