//! Data models for research-reader
//!
//! Defines the annotation records stored in a container's database, the
//! position descriptor that anchors them to a page, and the summary returned
//! when a document is opened.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the document title (source file stem on import)
pub const META_TITLE: &str = "title";
/// Metadata key holding the cached page count
pub const META_PAGE_COUNT: &str = "page_count";
/// Metadata key holding the last page the reader was on
pub const META_LAST_PAGE: &str = "last_page";

/// Newest position descriptor layout this engine writes
pub const POSITION_VERSION: u32 = 1;

/// Kind of annotation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    /// Marked text; `content` is normally empty
    Highlight,
    /// Free-text note attached to a location
    Note,
    /// Page marker
    Bookmark,
}

impl AnnotationType {
    /// Name used in the database and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::Highlight => "highlight",
            AnnotationType::Note => "note",
            AnnotationType::Bookmark => "bookmark",
        }
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highlight" => Ok(AnnotationType::Highlight),
            "note" => Ok(AnnotationType::Note),
            "bookmark" => Ok(AnnotationType::Bookmark),
            other => Err(format!("unknown annotation type '{}'", other)),
        }
    }
}

/// Rectangle in reference-page coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

fn default_position_version() -> u32 {
    POSITION_VERSION
}

/// Where an annotation sits on its page
///
/// Rectangles are expressed against `page_width` x `page_height`, the page
/// size captured when the annotation was made, never against a viewport.
/// The optional text and character offsets allow re-anchoring when the
/// rendered layout no longer matches the rectangles.
///
/// Fields written by a newer version of the format are kept in `extra` and
/// written back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionData {
    /// Layout version of this payload
    #[serde(default = "default_position_version")]
    pub version: u32,
    /// Highlighted regions
    pub rects: Vec<Rect>,
    /// Reference page width
    pub page_width: f64,
    /// Reference page height
    pub page_height: f64,
    /// Text covered by the selection
    #[serde(default)]
    pub selected_text: Option<String>,
    /// Character offset where the selection starts in the page text
    #[serde(default)]
    pub start_offset: Option<u32>,
    /// Character offset where the selection ends in the page text
    #[serde(default)]
    pub end_offset: Option<u32>,
    /// Unrecognized fields, passed through
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PositionData {
    /// Create a descriptor from rectangles on a page of the given size
    pub fn new(rects: Vec<Rect>, page_width: f64, page_height: f64) -> Self {
        Self {
            version: POSITION_VERSION,
            rects,
            page_width,
            page_height,
            selected_text: None,
            start_offset: None,
            end_offset: None,
            extra: Map::new(),
        }
    }

    /// Attach the selected text and its character range
    pub fn with_text(mut self, text: impl Into<String>, start: u32, end: u32) -> Self {
        self.selected_text = Some(text.into());
        self.start_offset = Some(start);
        self.end_offset = Some(end);
        self
    }

    /// Check that every coordinate and page dimension is a finite number
    ///
    /// JSON has no encoding for NaN or infinity, so such a payload could be
    /// written but never read back.
    pub fn validate(&self) -> Result<(), String> {
        let check = |name: &str, value: f64| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(format!("{} must be a finite number, got {}", name, value))
            }
        };

        check("page_width", self.page_width)?;
        check("page_height", self.page_height)?;
        for (i, rect) in self.rects.iter().enumerate() {
            check(&format!("rects[{}].x", i), rect.x)?;
            check(&format!("rects[{}].y", i), rect.y)?;
            check(&format!("rects[{}].width", i), rect.width)?;
            check(&format!("rects[{}].height", i), rect.height)?;
        }
        Ok(())
    }

    /// Serialize to the text stored in `position_data`
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse the text stored in `position_data`
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Whether the payload was written by a newer layout than this engine knows
    pub fn is_from_newer_writer(&self) -> bool {
        self.version > POSITION_VERSION
    }

    /// Project the rectangles onto a page rendered at `width` x `height`
    ///
    /// Returns the stored rectangles unchanged when the reference size is
    /// degenerate.
    pub fn rects_for_page_size(&self, width: f64, height: f64) -> Vec<Rect> {
        if self.page_width <= 0.0 || self.page_height <= 0.0 {
            return self.rects.clone();
        }
        let sx = width / self.page_width;
        let sy = height / self.page_height;
        self.rects
            .iter()
            .map(|r| Rect::new(r.x * sx, r.y * sy, r.width * sx, r.height * sy))
            .collect()
    }
}

/// A stored highlight, note or bookmark
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    /// Unique identifier within the container
    pub id: String,
    /// Kind of annotation
    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,
    /// 1-based page number
    pub page_number: u32,
    /// Display color (e.g. `#ffd54f`)
    pub color: Option<String>,
    /// Note text; `None` for plain highlights
    pub content: Option<String>,
    /// Location on the page
    pub position_data: Option<PositionData>,
    /// When this annotation was created
    pub created_at: DateTime<Utc>,
    /// When this annotation was last updated
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new annotation; id and timestamps are assigned by the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAnnotation {
    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,
    pub page_number: u32,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub position_data: Option<PositionData>,
}

impl NewAnnotation {
    pub fn new(annotation_type: AnnotationType, page_number: u32) -> Self {
        Self {
            annotation_type,
            page_number,
            color: None,
            content: None,
            position_data: None,
        }
    }

    /// A highlight over the given region
    pub fn highlight(page_number: u32, position: PositionData) -> Self {
        Self::new(AnnotationType::Highlight, page_number).with_position(position)
    }

    /// A note with text
    pub fn note(page_number: u32, content: impl Into<String>) -> Self {
        Self::new(AnnotationType::Note, page_number).with_content(content)
    }

    /// A bookmark on a page
    pub fn bookmark(page_number: u32) -> Self {
        Self::new(AnnotationType::Bookmark, page_number)
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_position(mut self, position: PositionData) -> Self {
        self.position_data = Some(position);
        self
    }
}

/// Partial update; `None` fields are left as they are
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnotationPatch {
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub position_data: Option<PositionData>,
}

impl AnnotationPatch {
    /// True when the patch changes nothing but the update timestamp
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.content.is_none() && self.position_data.is_none()
    }
}

/// Summary of an opened document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentInfo {
    /// Container on disk that saves are written to
    pub archive_path: PathBuf,
    /// Unpacked source document (read-only)
    pub source_path: PathBuf,
    /// Title, when one was recorded
    pub title: Option<String>,
    /// Page count cached by the reader, if known
    pub page_count: Option<u32>,
    /// Page the reader was on when the document was last closed
    pub last_page: Option<u32>,
}
