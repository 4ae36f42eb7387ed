//! Command surface
//!
//! The calls a presentation layer makes, one per user action. Each call
//! delegates to the `SessionManager` and converts failures into a
//! serializable `CommandError` with a stable `kind`.
//!
//! The same calls are reachable as JSON through `Commands::handle_line`:
//!
//! ```text
//! {"command":"open_file","path":"/papers/attention.pdf"}
//! {"command":"create_annotation","input":{"type":"note","page_number":3,"content":"check eq. 2"}}
//! {"command":"get_annotations","page_number":3}
//! ```
//!
//! Every request gets exactly one `Response` back.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::EngineError;
use crate::models::{Annotation, AnnotationPatch, DocumentInfo, NewAnnotation};
use crate::session::SessionManager;
use crate::storage::StorageError;

/// Input for `create_annotation`
pub type CreateAnnotationInput = NewAnnotation;

/// Input for `update_annotation`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateAnnotationInput {
    pub id: String,
    #[serde(flatten)]
    pub patch: AnnotationPatch,
}

/// Stable error categories reported to callers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedContainer,
    UnsupportedVersion,
    DestinationExists,
    Persistence,
    NoOpenSession,
    OpenFailed,
    InvalidInput,
    UnsupportedFileType,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedContainer => "malformed_container",
            ErrorKind::UnsupportedVersion => "unsupported_version",
            ErrorKind::DestinationExists => "destination_exists",
            ErrorKind::Persistence => "persistence",
            ErrorKind::NoOpenSession => "no_open_session",
            ErrorKind::OpenFailed => "open_failed",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UnsupportedFileType => "unsupported_file_type",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CommandError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<EngineError> for CommandError {
    fn from(err: EngineError) -> Self {
        let kind = match &err {
            EngineError::MalformedContainer { .. } => ErrorKind::MalformedContainer,
            EngineError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            EngineError::DestinationExists { .. } => ErrorKind::DestinationExists,
            EngineError::UnsupportedFileType { .. } => ErrorKind::UnsupportedFileType,
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::Persistence(_) => ErrorKind::Persistence,
            EngineError::NoOpenSession => ErrorKind::NoOpenSession,
            EngineError::OpenFailed { .. } => ErrorKind::OpenFailed,
        };
        let message = match err.recovery_suggestion() {
            Some(hint) => format!("{} {}", err, hint),
            None => err.to_string(),
        };
        Self { kind, message }
    }
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// A command as it arrives over JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    OpenFile {
        path: PathBuf,
    },
    SaveFile,
    CloseFile,
    ReadSourceBytes,
    GetAnnotations {
        #[serde(default)]
        page_number: Option<u32>,
    },
    CreateAnnotation {
        input: CreateAnnotationInput,
    },
    UpdateAnnotation {
        input: UpdateAnnotationInput,
    },
    DeleteAnnotation {
        id: String,
    },
    SetMetadata {
        key: String,
        value: String,
    },
    GetMetadata {
        key: String,
    },
}

impl Request {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Request::OpenFile { .. } => "open_file",
            Request::SaveFile => "save_file",
            Request::CloseFile => "close_file",
            Request::ReadSourceBytes => "read_source_bytes",
            Request::GetAnnotations { .. } => "get_annotations",
            Request::CreateAnnotation { .. } => "create_annotation",
            Request::UpdateAnnotation { .. } => "update_annotation",
            Request::DeleteAnnotation { .. } => "delete_annotation",
            Request::SetMetadata { .. } => "set_metadata",
            Request::GetMetadata { .. } => "get_metadata",
        }
    }
}

/// Reply to one `Request`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: CommandError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Entry point for a presentation layer
pub struct Commands {
    sessions: SessionManager,
}

impl Commands {
    pub fn new(config: &Config) -> Self {
        Self::with_sessions(SessionManager::new(config))
    }

    pub fn with_sessions(sessions: SessionManager) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Open a `.rr` container or import a `.pdf`
    pub fn open_file(&self, path: impl AsRef<Path>) -> CommandResult<DocumentInfo> {
        Ok(self.sessions.open(path.as_ref())?)
    }

    pub fn save_file(&self) -> CommandResult<()> {
        Ok(self.sessions.save()?)
    }

    /// Never fails
    pub fn close_file(&self) {
        self.sessions.close();
    }

    /// Close without packing unsaved changes into the container
    pub fn discard_file(&self) {
        self.sessions.close_without_saving();
    }

    pub fn read_source_bytes(&self) -> CommandResult<Vec<u8>> {
        Ok(self.sessions.read_source_bytes()?)
    }

    pub fn get_annotations(&self, page_number: Option<u32>) -> CommandResult<Vec<Annotation>> {
        Ok(self.sessions.list_annotations(page_number)?)
    }

    pub fn create_annotation(&self, input: &CreateAnnotationInput) -> CommandResult<Annotation> {
        Ok(self.sessions.create_annotation(input)?)
    }

    pub fn update_annotation(&self, input: &UpdateAnnotationInput) -> CommandResult<bool> {
        Ok(self.sessions.update_annotation(&input.id, &input.patch)?)
    }

    pub fn delete_annotation(&self, id: &str) -> CommandResult<bool> {
        Ok(self.sessions.delete_annotation(id)?)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> CommandResult<()> {
        Ok(self.sessions.set_metadata(key, value)?)
    }

    pub fn get_metadata(&self, key: &str) -> CommandResult<Option<String>> {
        Ok(self.sessions.get_metadata(key)?)
    }

    // ==================== JSON dispatch ====================

    /// Parse one JSON request and run it
    pub fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => Response::failure(CommandError::new(
                ErrorKind::InvalidInput,
                format!("Invalid request: {}", e),
            )),
        }
    }

    /// Run a request and wrap its outcome
    pub fn handle(&self, request: Request) -> Response {
        debug!(command = request.name(), "handling request");

        let result = match request {
            Request::OpenFile { path } => self.open_file(&path).and_then(encode),
            Request::SaveFile => self.save_file().map(|()| Value::Null),
            Request::CloseFile => {
                self.close_file();
                Ok(Value::Null)
            }
            Request::ReadSourceBytes => self.read_source_bytes().map(|bytes| {
                json!({
                    "length": bytes.len(),
                    "base64": STANDARD.encode(&bytes),
                })
            }),
            Request::GetAnnotations { page_number } => {
                self.get_annotations(page_number).and_then(encode)
            }
            Request::CreateAnnotation { input } => {
                self.create_annotation(&input).and_then(encode)
            }
            Request::UpdateAnnotation { input } => {
                self.update_annotation(&input).map(Value::Bool)
            }
            Request::DeleteAnnotation { id } => self.delete_annotation(&id).map(Value::Bool),
            Request::SetMetadata { key, value } => {
                self.set_metadata(&key, &value).map(|()| Value::Null)
            }
            Request::GetMetadata { key } => self.get_metadata(&key).and_then(encode),
        };

        match result {
            Ok(data) => Response::success(data),
            Err(error) => Response::failure(error),
        }
    }
}

fn encode<T: Serialize>(value: T) -> CommandResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::from(StorageError::Serialization(e)).into())
}
